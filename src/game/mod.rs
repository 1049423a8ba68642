pub mod constants;
pub mod error;
pub mod schedule;
pub mod state;
pub mod systems;
pub mod input_buffer;
pub mod game_loop;
pub mod performance;
