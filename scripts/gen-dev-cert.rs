//! Dev certificate generator - run with `cargo run --manifest-path scripts/Cargo.toml`
//!
//! Writes a self-signed localhost certificate to `certs/` and prints the
//! hashes browsers need to trust it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use ring::digest::{digest, SHA256};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

const CERT_DIR: &str = "../certs";
const CERT_FILE: &str = "../certs/cert.pem";
const KEY_FILE: &str = "../certs/key.pem";

/// serverCertificateHashes only accepts certificates valid for at most 14 days
const VALIDITY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if Path::new(CERT_FILE).exists() && Path::new(KEY_FILE).exists() {
        println!("Certificates already exist at {}/ (delete them to regenerate)\n", CERT_DIR);
        return print_hashes();
    }

    println!("Generating development certificate for localhost...\n");
    fs::create_dir_all(CERT_DIR)?;

    let mut params = CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, "Cell Arena Dev");

    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + VALIDITY).into();

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    fs::write(CERT_FILE, cert.pem())?;
    fs::write(KEY_FILE, key_pair.serialize_pem())?;
    println!("Certificate saved to {}", CERT_FILE);
    println!("Private key saved to {}\n", KEY_FILE);

    print_hashes()
}

fn sha256_b64(data: &[u8]) -> String {
    STANDARD.encode(digest(&SHA256, data).as_ref())
}

fn print_hashes() -> Result<(), Box<dyn std::error::Error>> {
    let cert = pem::parse(fs::read_to_string(CERT_FILE)?)?;
    let key_pair = KeyPair::from_pem(&fs::read_to_string(KEY_FILE)?)?;

    println!("Certificate hash (serverCertificateHashes):");
    println!("  {}\n", sha256_b64(cert.contents()));
    println!("Chrome flag:");
    println!(
        "  --ignore-certificate-errors-spki-list={}",
        sha256_b64(&key_pair.public_key_der())
    );
    Ok(())
}
