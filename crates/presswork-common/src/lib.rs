//! presswork-common: configuration, errors and telemetry shared by the
//! presswork crates.

pub mod config;
pub mod error;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use crate::config::{
    AssetMode, CompressionConfig, IngestConfig, PressworkConfig, StorageConfig,
};
pub use crate::error::{ConfigError, PressworkError};

/// One mebibyte, the unit every byte ceiling in the config is written in.
pub const MIB: u64 = 1024 * 1024;
