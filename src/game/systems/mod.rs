pub mod movement;
pub mod collision;
pub mod split;
pub mod merge;
pub mod soft_body;
pub mod food;
pub mod ai;
