//! Testing utilities and mock implementations
//!
//! Scriptable collaborators for driving a supervisor tick by tick without a
//! radio, a broker or wall-clock time.

pub mod mocks;

pub use mocks::*;
