//! Utility functions

mod bits;
mod key;

pub use bits::Log2;
pub use key::Key;
