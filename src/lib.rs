//! Shared plumbing for the DI-2108 command-line tools.

pub mod logging;
