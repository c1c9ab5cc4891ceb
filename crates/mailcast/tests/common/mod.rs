//! Shared test utilities for mailcast integration tests.
//!
//! - `TestHarness`: a file-backed store in a temp directory, a manual clock
//!   and an in-memory mailer wired into a `Dispatcher`
//! - builders for mailings and config files

#![allow(unused_imports)]

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
