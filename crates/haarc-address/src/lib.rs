//! haarc address - trivariate hash addressing
//!
//! Every unit of work gets a 48-symbol address made of three 16-symbol
//! segments: semantic (what), context (where/when), unique (which one).
//! Addressing is a routing and deduplication scheme, not a security boundary.

pub mod address;
pub mod alphabet;
pub mod murmur;
pub mod token;

pub use address::{
    generate, segment, validate, AddressConfig, AddressEngine, Segment, TrivariateAddress,
    ADDRESS_LEN, SEGMENT_LEN,
};
pub use token::UniquenessToken;
