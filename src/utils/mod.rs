//! Shared infrastructure: bit vectors and the directed graph substrate.

pub mod bitset;
pub mod graph;

pub use bitset::BitSet;
