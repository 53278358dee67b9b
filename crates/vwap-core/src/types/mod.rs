//! Wire-level data types for the Coinbase matches channel.

pub mod enums;
pub mod matches;

pub use enums::*;
pub use matches::*;
