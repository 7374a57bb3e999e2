//! Persistence I/O
//!
//! Memory-mapped loading and raw-section writing for the trie engines.

pub mod mmap;

pub use mmap::{MappedFile, MappedSlice};
