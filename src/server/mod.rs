//! Server state and the capability handler.

pub mod handler;
pub mod state;

pub use handler::McpHandler;
pub use state::{DEFAULT_DATABASE_NAME, ServerState, ServerStateBuilder};
