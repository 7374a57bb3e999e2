//! Core trie traits
//!
//! The public [`Trie`] interface implemented by both engines, and the
//! [`Relocator`] callback through which a basic trie reports state
//! renumbering to its owner.

use crate::error::Result;
use crate::{StateId, Value};
use std::path::Path;

/// Common interface of the trie engines.
///
/// Keys are opaque byte strings; values are positive integers. Inserting an
/// existing key overwrites its value.
pub trait Trie: std::fmt::Debug {
    /// Insert `(key, value)`. Fails with an invalid-argument error when
    /// `value <= 0`, and with a not-supported error on a memory-mapped
    /// (read-only) engine.
    fn insert(&mut self, key: &[u8], value: Value) -> Result<()>;

    /// Look up a key, returning its value when present.
    fn search(&self, key: &[u8]) -> Option<Value>;

    /// Enumerate every stored key beginning with `prefix`, in the
    /// depth-first order of the underlying trie (terminator sorts first,
    /// then bytes ascending).
    fn prefix_search(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Value)>;

    /// Check if a key exists.
    fn contains(&self, key: &[u8]) -> bool {
        self.search(key).is_some()
    }

    /// Persist the engine to a file loadable by memory mapping.
    fn build(&self, path: &Path) -> Result<()>;
}

/// Callback invoked when a basic trie renumbers a state.
///
/// `relocate` fires once per moved state, after the cell has been copied to
/// its new slot and before the old slot is cleared. `base` is the
/// (verbatim-copied) base value carried by the moved state; the front-trie
/// callback of the two-trie engine uses its sign to recognize separators
/// without reading the trie mid-relocation.
pub trait Relocator {
    /// A state has moved from `old` to `new`, carrying `base`.
    fn relocate(&mut self, old: StateId, new: StateId, base: i32);
}

/// No-op relocator for basic tries used standalone.
#[derive(Debug, Default)]
pub struct NullRelocator;

impl Relocator for NullRelocator {
    fn relocate(&mut self, _old: StateId, _new: StateId, _base: i32) {}
}
