//! Connection lifecycle module

pub mod backoff;
pub mod manager;
pub mod state;

pub use backoff::RetryPolicy;
pub use manager::{ConnectionManager, ManagerOptions};
pub use state::{ConnectionSnapshot, ConnectionState};
