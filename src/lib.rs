//! # aoetrie: double-array trie engines
//!
//! An associative map from opaque byte-string keys to positive integer
//! values, built on the Aoe double-array trie and optimized for compact
//! in-memory representation, fast prefix lookup, and a byte-for-byte
//! persisted form loadable by memory mapping.
//!
//! Two engines are provided on top of the basic double-array core:
//!
//! - [`DoubleTrie`] — a *two-trie*: a forward front trie joined to a
//!   reverse rear trie through an index/accept table pair, so keys with a
//!   common suffix share rear states.
//! - [`SingleTrie`] — a *tail trie*: one trie plus a flat suffix array
//!   holding each key's unique tail verbatim.
//!
//! ## Quick start
//!
//! ```rust
//! use aoetrie::{create_trie, Trie, TrieKind};
//!
//! let mut trie = create_trie(TrieKind::DoubleTrie, 0);
//! trie.insert(b"bachelor", 1).unwrap();
//! trie.insert(b"back", 2).unwrap();
//! trie.insert(b"backbone", 3).unwrap();
//!
//! assert_eq!(trie.search(b"back"), Some(2));
//! assert_eq!(trie.search(b"bad"), None);
//!
//! let hits = trie.prefix_search(b"back");
//! assert_eq!(hits.len(), 2); // back, backbone
//! ```
//!
//! Persist with [`Trie::build`] and reload read-only with [`load_trie`]
//! (or the engine-specific `load` constructors); loaded engines alias the
//! file through a memory mapping and reject mutation.

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod io;
pub mod key;
pub mod trie;

pub use error::{Error, Result};
pub use trie::{
    create_trie, load_trie, BasicTrie, DoubleTrie, NullRelocator, Relocator, SingleTrie, Trie,
    TrieKind,
};

/// State identifier inside a trie state array. Positive for live states;
/// the value 0 never names a state.
pub type StateId = i32;

/// Value type stored with each key. Must be positive on insert.
pub type Value = i32;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_re_exports() {
        let _trie = BasicTrie::new();
        let _err = Error::invalid_argument("test");
        let _kind = TrieKind::DoubleTrie;
        assert_eq!(std::mem::size_of::<StateId>(), 4);
        assert_eq!(std::mem::size_of::<Value>(), 4);
    }
}
