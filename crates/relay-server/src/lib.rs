pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod intake;
pub mod relay;
pub mod server;
pub mod sessions;
pub mod shutdown;

pub use config::ServerConfig;
pub use error::RelayError;
pub use server::{start, ServerHandle};
pub use sessions::{SessionConfig, SessionEntry, SessionManager};
pub use shutdown::ShutdownReport;
