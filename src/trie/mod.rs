//! Trie engines
//!
//! The basic double-array engine plus the two higher-level engines built
//! on it, and the factory that picks between them.

pub mod basic;
pub mod double;
pub mod single;
pub mod traits;

pub use basic::{BasicHeader, BasicTrie, State, ROOT_STATE};
pub use double::{AcceptCell, DoubleTrie, IndexCell, DOUBLE_TRIE_MAGIC};
pub use single::{SingleTrie, SINGLE_TRIE_MAGIC};
pub use traits::{NullRelocator, Relocator, Trie};

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Engine variants the factory can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrieKind {
    /// One trie plus a flat suffix array of verbatim tails.
    SingleTrie,
    /// A front trie and a reverse rear trie sharing common suffixes.
    DoubleTrie,
}

/// Create an empty engine of the chosen kind. A `capacity` of 0 selects
/// the default initial sizes.
pub fn create_trie(kind: TrieKind, capacity: usize) -> Box<dyn Trie> {
    match kind {
        TrieKind::SingleTrie => Box::new(SingleTrie::with_capacity(capacity)),
        TrieKind::DoubleTrie => Box::new(DoubleTrie::with_capacity(capacity)),
    }
}

/// Load a persisted engine, picking the variant by the file magic.
pub fn load_trie<P: AsRef<Path>>(path: P) -> Result<Box<dyn Trie>> {
    let path = path.as_ref();
    let mut magic = [0u8; 16];
    File::open(path)?.read_exact(&mut magic).map_err(|_| {
        Error::corrupted("file too short to hold a trie header")
    })?;
    if magic == DOUBLE_TRIE_MAGIC {
        Ok(Box::new(DoubleTrie::load(path)?))
    } else if magic == SINGLE_TRIE_MAGIC {
        Ok(Box::new(SingleTrie::load(path)?))
    } else {
        Err(Error::corrupted("unknown trie file magic"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_kinds() {
        let mut single = create_trie(TrieKind::SingleTrie, 0);
        let mut double = create_trie(TrieKind::DoubleTrie, 1024);
        for engine in [&mut single, &mut double] {
            engine.insert(b"factory", 11).unwrap();
            assert_eq!(engine.search(b"factory"), Some(11));
            assert_eq!(engine.search(b"fact"), None);
        }
    }

    #[test]
    fn test_load_rejects_unknown_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.trie");
        std::fs::write(&path, b"NOT_A_TRIE_FILE!________________").unwrap();
        let err = load_trie(&path).unwrap_err();
        assert_eq!(err.category(), "corrupted");

        let short = dir.path().join("short.trie");
        std::fs::write(&short, b"abc").unwrap();
        assert!(load_trie(&short).is_err());
    }
}
