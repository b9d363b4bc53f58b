//! Mynofi - connection lifecycle client for hosted auth + realtime services
//!
//! Tracks the authenticated session and the realtime socket through one
//! single-writer state machine with bounded automatic reconnects.

pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod remote;
pub mod ui;

pub use error::{MynofiError, MynofiResult};
