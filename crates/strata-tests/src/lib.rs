//! Integration and end-to-end tests for strata.
//!
//! This crate provides:
//! - Shared constructors for composed filesystem stacks
//! - Async-backend doubles: a blocking adapter over any synchronous
//!   filesystem and a dead remote whose RPCs always fail

pub mod harness;
pub mod remote;

pub use harness::{init_tracing, memfs, walk};
pub use remote::{BlockingFs, DeadRemoteFs};
