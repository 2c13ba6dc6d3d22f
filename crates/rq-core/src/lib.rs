//! rq-core — configuration shared by the RQ exporter crates.
//!
//! The exporter reads an optional `rq-exporter.toml` file, then the
//! binary overlays command-line flags and environment variables on top.
//! Every section has defaults, so an empty file is a valid config.

pub mod config;

pub use config::{
    CollectorConfig, ConfigError, ConfigResult, ExporterConfig, LogConfig, LogFormat,
    RedisConfig, ServerConfig,
};
