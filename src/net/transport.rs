//! WebTransport server implementation
//!
//! Each session gets one owner id. Reliable bidirectional streams carry
//! framed [`ClientMessage`]s and receive replies plus the per-tick snapshot;
//! datagrams may carry steering intents only.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::game::constants::net::{DEFAULT_NAME, MAX_NAME_LEN};
use crate::game::input_buffer::{InputBufferError, InputSender, Intent};
use crate::game::state::OwnerId;
use crate::metrics::Metrics;
use crate::net::framing::{frame_server_message, read_client_message, FramingError};
use crate::net::game_session::{send_to_observer, start_game_loop, GameSession, SharedWriter};
use crate::net::protocol::{decode, ClientMessage, ServerMessage};
use crate::net::tls::TlsConfig;

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    game_session: Arc<RwLock<GameSession>>,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    pub async fn new(config: ServerConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(&config).await?;
        let game_session = Arc::new(RwLock::new(GameSession::new(&config, metrics.clone())));

        Ok(Self {
            config,
            tls_config,
            game_session,
            metrics,
        })
    }

    pub fn cert_hash(&self) -> &str {
        self.tls_config.cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.config.socket_addr()
    }

    /// Start the tick task and accept sessions until the endpoint fails
    pub async fn run(self) -> anyhow::Result<()> {
        use wtransport::Endpoint;

        let addr = self.config.socket_addr();
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_address(addr)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;

        tracing::info!("WebTransport server listening on {}", addr);

        start_game_loop(self.game_session.clone());

        loop {
            let incoming = server.accept().await;

            let ctx = ConnectionContext {
                owner_id: Uuid::new_v4(),
                game_session: self.game_session.clone(),
                sender: self.game_session.read().await.sender(),
                metrics: self.metrics.clone(),
            };

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, ctx).await {
                    tracing::warn!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Per-session state shared by every stream of one connection
pub struct ConnectionContext<W> {
    pub owner_id: OwnerId,
    pub game_session: Arc<RwLock<GameSession<W>>>,
    pub sender: InputSender,
    pub metrics: Arc<Metrics>,
}

impl<W> Clone for ConnectionContext<W> {
    fn clone(&self) -> Self {
        Self {
            owner_id: self.owner_id,
            game_session: self.game_session.clone(),
            sender: self.sender.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

async fn handle_connection(
    incoming: wtransport::endpoint::IncomingSession,
    ctx: ConnectionContext<wtransport::SendStream>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;

    tracing::debug!(
        "New session from {:?}, path: {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    ctx.metrics.connections_active.fetch_add(1, Ordering::Relaxed);
    tracing::debug!("Session accepted as owner {}", ctx.owner_id);

    loop {
        tokio::select! {
            stream = connection.accept_bi() => {
                match stream {
                    Ok((send, recv)) => {
                        let writer = Arc::new(RwLock::new(Some(send)));
                        tokio::spawn(handle_stream(ctx.clone(), writer, recv));
                    }
                    Err(e) => {
                        tracing::debug!("Stream accept error: {}", e);
                        break;
                    }
                }
            }

            datagram = connection.receive_datagram() => {
                match datagram {
                    Ok(data) => match decode::<ClientMessage>(&data) {
                        Ok(msg @ (ClientMessage::Move { .. } | ClientMessage::Split | ClientMessage::Eject)) => {
                            if let Some(intent) = msg.into_intent() {
                                forward_intent(&ctx, intent);
                            }
                        }
                        Ok(_) => {}
                        Err(e) => tracing::debug!("Failed to decode datagram: {}", e),
                    },
                    Err(e) => {
                        tracing::debug!("Datagram receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    ctx.game_session.write().await.remove_observer(ctx.owner_id);
    ctx.metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
    tracing::debug!("Connection closed for owner {}", ctx.owner_id);
    Ok(())
}

async fn handle_stream(
    ctx: ConnectionContext<wtransport::SendStream>,
    writer: SharedWriter<wtransport::SendStream>,
    mut recv: wtransport::RecvStream,
) {
    loop {
        match read_client_message(&mut recv).await {
            Ok(msg) => {
                if !handle_client_message(&ctx, &writer, msg).await {
                    break;
                }
            }
            Err(FramingError::Decode(e)) => {
                tracing::warn!("Failed to decode client message: {}", e);
            }
            Err(FramingError::ConnectionClosed) => break,
            Err(e) => {
                tracing::debug!("Stream read error: {}", e);
                break;
            }
        }
    }
    // Stream closed: the observer's cells go with it
    ctx.game_session.write().await.remove_observer(ctx.owner_id);
}

/// Apply one client message. Returns false when the stream should close.
pub async fn handle_client_message<W>(
    ctx: &ConnectionContext<W>,
    writer: &SharedWriter<W>,
    msg: ClientMessage,
) -> bool
where
    W: AsyncWrite + Unpin + Send + Sync,
{
    match msg {
        ClientMessage::Join { name } => handle_join(ctx, writer, &name).await,

        ClientMessage::Ping { client_time } => {
            let pong = ServerMessage::Pong {
                client_time,
                server_time: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64,
            };
            if let Err(e) = send_to_observer(writer, &pong).await {
                tracing::debug!("Failed to send Pong: {}", e);
                return false;
            }
            true
        }

        ClientMessage::Leave => {
            tracing::debug!("Owner {} requested to leave", ctx.owner_id);
            ctx.game_session.write().await.remove_observer(ctx.owner_id);
            false
        }

        other => {
            if let Some(intent) = other.into_intent() {
                forward_intent(ctx, intent)
            } else {
                true
            }
        }
    }
}

async fn handle_join<W>(ctx: &ConnectionContext<W>, writer: &SharedWriter<W>, raw_name: &str) -> bool
where
    W: AsyncWrite + Unpin + Send + Sync,
{
    let name = sanitize_name(raw_name);

    // Hold the stream so no snapshot can precede the join reply
    let mut out = writer.write().await;
    let reply = {
        let mut session = ctx.game_session.write().await;
        if session.is_observer(ctx.owner_id) {
            Ok(session.join_accepted(ctx.owner_id))
        } else {
            match session.admit() {
                Ok(()) => {
                    session.add_observer(ctx.owner_id, name.clone(), writer.clone());
                    Ok(session.join_accepted(ctx.owner_id))
                }
                Err(reason) => Err(reason),
            }
        }
    };

    let accepted = reply.is_ok();
    let message = match reply {
        Ok(accepted) => accepted,
        Err(reason) => {
            tracing::warn!("Rejecting '{}': {}", name, reason);
            ctx.metrics.joins_rejected.fetch_add(1, Ordering::Relaxed);
            ServerMessage::JoinRejected { reason }
        }
    };

    if accepted && !forward_intent(ctx, Intent::Join { name }) {
        return false;
    }

    let frame = match frame_server_message(&message) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Failed to encode join reply: {}", e);
            return false;
        }
    };
    let Some(stream) = out.as_mut() else {
        return false;
    };
    if let Err(e) = stream.write_all(&frame).await {
        tracing::warn!("Failed to send join reply to {}: {}", ctx.owner_id, e);
        return false;
    }
    true
}

/// Queue an intent without blocking. Returns false once the tick loop is gone.
fn forward_intent<W>(ctx: &ConnectionContext<W>, intent: Intent) -> bool {
    match ctx.sender.try_send(ctx.owner_id, intent) {
        Ok(()) => {
            ctx.metrics.intents_received.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(InputBufferError::Full) => {
            ctx.metrics.intents_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Input buffer full, dropped intent from {}", ctx.owner_id);
            true
        }
        Err(InputBufferError::Disconnected) => {
            tracing::warn!("Tick loop gone, closing stream for {}", ctx.owner_id);
            false
        }
    }
}

/// Display name as shown to other observers: printable, no markup, single
/// spaced, at most 16 characters
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .filter(|c| !matches!(c, '<' | '>' | '&' | '"' | '\''))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let name: String = collapsed.chars().take(MAX_NAME_LEN).collect();
    let name = name.trim_end();

    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name.to_string()
    }
}
