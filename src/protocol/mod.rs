//! Wire-level protocol pieces: topic layout and response envelopes.

pub mod envelope;
pub mod topics;

pub use envelope::*;
pub use topics::*;
