//! The `utils` module provides shared definitions used across `tickbus`:
//! the error types every layer returns and the logging bootstrap.

pub mod error;
pub mod logging;
