//! Configuration, confirmation channel, and the command service for kubegate.

pub mod channel;
pub mod config;
pub mod service;

pub use channel::{AssumeYes, ChannelError, Confirm};
pub use config::{Config, DEFAULT_CONFIG_PATH, ObservabilityConfig};
pub use service::{CommandService, OPERATION_NAME, Outcome};
