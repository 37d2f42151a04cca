pub mod common;

pub use harness_core::adjust_timeout;
