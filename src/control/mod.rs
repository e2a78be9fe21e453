mod handlers;
mod server;

pub use handlers::{StateBody, StateChange};
pub use server::{router, ControlServer, ControlState};
