//! # harvest-core
//!
//! Core types for svnharvest, a poller and harvester for Subversion
//! repositories driven through the `svn` command-line tool.
//!
//! - Listing and log data model decoded from `svn ... --xml`
//! - Unified error type
//! - Configuration loaded from `.harvest/config.toml`

mod config;
mod error;
mod types;

pub use config::{ExportConfig, HarvestConfig, SinceConfig, SvnConfig, MAX_LOOKBACK_HOURS};
pub use error::{HarvestError, Result};
pub use types::*;
