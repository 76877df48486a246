//! # provstore
//!
//! Library half of the `provstore` binary, so the command implementations
//! can be driven from integration tests.

pub mod cli;
