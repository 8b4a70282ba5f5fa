//! MyTools Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared infrastructure for the MyTools workspace members. At the moment this
//! is the process-wide logging setup: every binary in the workspace installs
//! its `tracing` subscriber through [`logging::init_logging`] so console and
//! file output look the same everywhere.

pub mod logging;
