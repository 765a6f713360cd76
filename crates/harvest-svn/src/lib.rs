//! # harvest-svn
//!
//! Subversion access layer for svnharvest.
//!
//! This crate provides:
//! - svn command execution abstraction (real and mock executors)
//! - Decoding of `svn list --xml` and `svn log --xml` reports
//! - The export pipeline publishing exported files as they arrive
//! - Checkpoint filtering of listings
//! - The [`Repository`] façade tying these together

mod command;
mod decode;
pub mod export;
mod filter;
mod repository;
mod validate;

pub use command::{
    BoxedReader, ExitFuture, ExitOutcome, MockSvnExecutor, ProcessFeed, SvnCommand, SvnExecutor,
    SvnOutput, SvnProcess,
};
pub use decode::{decode_list, decode_log};
pub use export::export_notifier;
pub use filter::since;
pub use repository::Repository;
pub use validate::{validate_location, validate_operand, validate_revision};
