//! Testing utilities and mock implementations
//!
//! Lets the protocol engine be exercised without a broker.

pub mod mocks;

pub use mocks::*;
