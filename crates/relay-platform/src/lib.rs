//! Messaging-platform client implementations.
//!
//! `NullConnector` backs the binary when no real platform backend is wired
//! in; `mock` provides scriptable clients for tests.

pub mod mock;
pub mod null;

pub use mock::{MockClient, MockConnector};
pub use null::{NullClient, NullConnector};
