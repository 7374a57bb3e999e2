//! Tail trie engine
//!
//! One trie plus a flat suffix array. The trie holds the shortest
//! distinguishing prefix of each key; the unique remainder (its tail) is
//! stored verbatim in the suffix array, terminator included, immediately
//! followed by one cell holding the user value. When a new key diverges
//! from a stored tail, the shared part is expanded into trie states and
//! two twig leaves point at the split remainders; the bytes the old tail
//! abandoned stay dead in the array.

use crate::error::{Error, Result};
use crate::io::mmap::{self, MappedFile, Pod, Table};
use crate::key::{self, Symbol, TERMINATOR};
use crate::trie::basic::{BasicHeader, BasicTrie, Extremum, State, ROOT_STATE};
use crate::trie::traits::{NullRelocator, Trie};
use crate::{StateId, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Magic identifying a persisted tail-trie file.
pub const SINGLE_TRIE_MAGIC: [u8; 16] = *b"TAIL_TRIE\0\0\0\0\0\0\0";

/// Persisted tail-trie header. `reserved` is written as zero.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct SingleHeader {
    /// File magic, NUL-padded.
    pub magic: [u8; 16],
    /// Number of suffix cells.
    pub suffix_size: i32,
    /// Reserved, zero.
    pub reserved: [i32; 3],
}

unsafe impl Pod for SingleHeader {}

/// Double-array trie storing unique key tails in a flat suffix array.
///
/// The tail trie never renumbers anything its side table refers to: tails
/// are addressed by the (sign-flipped) base value, which relocation copies
/// verbatim, so no relocation callback is registered.
pub struct SingleTrie {
    trie: BasicTrie,
    suffix: Table<Symbol>,
}

impl SingleTrie {
    /// Create an empty tail trie with default capacities.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty tail trie sized for about `capacity` states.
    pub fn with_capacity(capacity: usize) -> Self {
        let trie = if capacity == 0 {
            BasicTrie::new()
        } else {
            BasicTrie::with_capacity(capacity)
        };
        let mut suffix = Vec::with_capacity(capacity.max(1));
        suffix.push(0); // cell 0 reserved
        SingleTrie {
            trie,
            suffix: Table::Owned(suffix),
        }
    }

    /// Load a persisted tail trie read-only through a memory mapping.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = MappedFile::open(path)?;
        let header: SingleHeader = file.take_struct()?;
        if header.magic != SINGLE_TRIE_MAGIC {
            return Err(Error::corrupted("not a tail-trie file (magic mismatch)"));
        }
        if header.suffix_size < 1 {
            return Err(Error::corrupted("tail-trie header with empty suffix"));
        }
        let suffix = file.take_slice::<Symbol>(header.suffix_size as usize)?;
        let trie_header: BasicHeader = file.take_struct()?;
        if trie_header.size < 0 {
            return Err(Error::corrupted("negative trie size"));
        }
        let states = file.take_slice::<State>(trie_header.size as usize)?;
        log::debug!(
            "loaded tail trie: {} mapped, suffix = {}",
            mmap::pretty_size(file.len()),
            header.suffix_size
        );
        file.finish()?;
        Ok(SingleTrie {
            trie: BasicTrie::from_mapped(trie_header, states)?,
            suffix: Table::Mapped(suffix),
        })
    }

    /// Whether this engine aliases a read-only mapping.
    pub fn is_mapped(&self) -> bool {
        self.suffix.is_mapped()
    }

    /// Suffix cell at `pos`; 0 (matching no symbol) when out of range.
    #[inline]
    fn suffix_at(&self, pos: usize) -> Symbol {
        self.suffix.as_slice().get(pos).copied().unwrap_or(0)
    }

    /// Store a fresh tail (symbols ending in the terminator, then the
    /// value cell) and point `s` at it.
    fn insert_suffix(&mut self, s: StateId, inputs: &[Symbol], value: Value) -> Result<()> {
        let start = self.suffix.len();
        self.trie.set_base(s, -(start as i32))?;
        let cells = self.suffix.as_vec_mut()?;
        cells.extend_from_slice(inputs);
        cells.push(value);
        Ok(())
    }

    /// Split the tail of leaf `s` against the diverging input `remain`.
    fn create_branch(&mut self, s: StateId, remain: &[Symbol], value: Value) -> Result<()> {
        let mut start = (-self.trie.base(s)) as usize;

        // longest common prefix of the input and the stored tail
        let mut common: Vec<Symbol> = Vec::new();
        let mut extremum = Extremum::default();
        let mut at = 0usize;
        while at < remain.len() {
            let ch = remain[at];
            if self.suffix_at(start) != ch {
                break;
            }
            common.push(ch);
            extremum.update(ch);
            start += 1;
            at += 1;
            if ch == TERMINATOR {
                break;
            }
        }

        if common.last() == Some(&TERMINATOR) {
            // duplicated key; start now sits on the value cell
            self.suffix.as_mut_slice()?[start] = value;
            return Ok(());
        }

        // expand the common part into trie states
        let mut s = s;
        if !common.is_empty() {
            let base = self.trie.find_base(&common, extremum)?;
            self.trie.set_base(s, base)?;
            for &ch in &common {
                s = self.trie.create_transition(s, ch, &mut NullRelocator)?;
            }
        } else {
            self.trie.set_base(s, 0)?;
        }

        // twig for the old tail remainder
        let t = self
            .trie
            .create_transition(s, self.suffix_at(start), &mut NullRelocator)?;
        self.trie.set_base(t, -((start + 1) as i32))?;
        s = self.trie.prev(t); // s may have been renumbered by the create

        // twig for the new tail remainder
        let t = self
            .trie
            .create_transition(s, remain[at], &mut NullRelocator)?;
        if remain[at] == TERMINATOR {
            let pos = self.suffix.len();
            self.trie.set_base(t, -(pos as i32))?;
            self.suffix.as_vec_mut()?.push(value);
        } else {
            self.insert_suffix(t, &remain[at + 1..], value)?;
        }
        Ok(())
    }

    fn insert_impl(&mut self, key: &[u8], value: Value) -> Result<()> {
        if value <= 0 {
            return Err(Error::invalid_argument("insert: value must be > 0"));
        }
        if self.is_mapped() {
            return Err(Error::unsupported("insert on a memory-mapped trie"));
        }
        let symbols = key::encode(key);
        let (s, mismatch) = self.trie.go_forward(ROOT_STATE, &symbols);

        if self.trie.base(s) < 0 {
            match mismatch {
                // duplicated key; the value cell sits right at the slot
                None => {
                    let pos = (-self.trie.base(s)) as usize;
                    self.suffix.as_mut_slice()?[pos] = value;
                    Ok(())
                }
                Some(at) => self.create_branch(s, &symbols[at..], value),
            }
        } else {
            let Some(at) = mismatch else {
                return Err(Error::internal("matched key without a tail leaf"));
            };
            let t = self
                .trie
                .create_transition(s, symbols[at], &mut NullRelocator)?;
            if symbols[at] == TERMINATOR {
                let pos = self.suffix.len();
                self.trie.set_base(t, -(pos as i32))?;
                self.suffix.as_vec_mut()?.push(value);
            } else {
                self.insert_suffix(t, &symbols[at + 1..], value)?;
            }
            Ok(())
        }
    }

    fn search_impl(&self, key: &[u8]) -> Option<Value> {
        let symbols = key::encode(key);
        let (s, mismatch) = self.trie.go_forward(ROOT_STATE, &symbols);
        if self.trie.base(s) >= 0 {
            return None;
        }
        let mut pos = (-self.trie.base(s)) as usize;
        if let Some(at) = mismatch {
            for &ch in &symbols[at..] {
                if self.suffix_at(pos) != ch {
                    return None;
                }
                pos += 1;
            }
        }
        Some(self.suffix_at(pos))
    }

    /// Rebuild a candidate's full key from its stored tail, filtering by
    /// any unmatched prefix remainder.
    fn tail_completion(
        &self,
        key_syms: &mut Vec<Symbol>,
        start: usize,
        miss: Option<&[Symbol]>,
    ) -> Option<Value> {
        let mut pos = start;
        let mut mi = 0usize;
        loop {
            let ch = self.suffix_at(pos);
            if ch == TERMINATOR {
                break;
            }
            if ch == 0 {
                return None; // ran off the stored tails
            }
            if let Some(m) = miss {
                if mi < m.len() && m[mi] != TERMINATOR {
                    if m[mi] != ch {
                        return None;
                    }
                    mi += 1;
                }
            }
            key_syms.push(ch);
            pos += 1;
        }
        if let Some(m) = miss {
            if mi < m.len() && m[mi] != TERMINATOR {
                return None;
            }
        }
        Some(self.suffix_at(pos + 1))
    }

    fn prefix_search_impl(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Value)> {
        let symbols = key::encode(prefix);
        let (mut s, mismatch) = self.trie.go_forward(ROOT_STATE, &symbols);
        if self.trie.check_reverse_transition(s, TERMINATOR) {
            s = self.trie.prev(s);
        }
        let effective_miss: Option<&[Symbol]> = match mismatch {
            None => None,
            Some(at) if symbols[at] == TERMINATOR => Some(&symbols[at..]),
            // a remainder beyond a complete stored key collapses to full
            // enumeration below the matched portion
            Some(at) if self.search_impl(&prefix[..at]).is_some() => None,
            Some(at) => Some(&symbols[at..]),
        };
        let matched = mismatch.map_or(prefix.len(), |at| at.min(prefix.len()));
        let mut store: Vec<Symbol> = symbols[..matched].to_vec();
        let mut raw = Vec::new();
        self.trie
            .prefix_search_aux(s, effective_miss, &mut store, &mut raw);

        let mut results = Vec::new();
        for (mut key_syms, neg_pos) in raw {
            if neg_pos >= 0 {
                continue;
            }
            let pos = (-neg_pos) as usize;
            if key_syms.last() == Some(&TERMINATOR) {
                results.push((key::decode(&key_syms), self.suffix_at(pos)));
                continue;
            }
            if let Some(value) = self.tail_completion(&mut key_syms, pos, effective_miss) {
                results.push((key::decode(&key_syms), value));
            }
        }
        results
    }

    fn build_impl(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        let header = SingleHeader {
            magic: SINGLE_TRIE_MAGIC,
            suffix_size: self.suffix.len() as i32,
            reserved: [0; 3],
        };
        mmap::write_pod(&mut out, &header)?;
        mmap::write_pod_slice(&mut out, self.suffix.as_slice())?;
        let trie_header = self.trie.compact_header();
        mmap::write_pod(&mut out, &trie_header)?;
        mmap::write_pod_slice(&mut out, self.trie.compact_states())?;
        let file = out
            .into_inner()
            .map_err(|e| Error::io_error(format!("flush failed: {}", e)))?;
        file.sync_all()?;

        let suffix_bytes = self.suffix.len() * std::mem::size_of::<Symbol>();
        let trie_bytes = trie_header.size as usize * std::mem::size_of::<State>();
        log::debug!(
            "built tail trie: suffix = {}, trie = {}, total = {}",
            mmap::pretty_size(suffix_bytes),
            mmap::pretty_size(trie_bytes),
            mmap::pretty_size(suffix_bytes + trie_bytes)
        );
        Ok(())
    }
}

impl Default for SingleTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SingleTrie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleTrie")
            .field("trie", &self.trie)
            .field("suffix", &self.suffix.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

impl Trie for SingleTrie {
    fn insert(&mut self, key: &[u8], value: Value) -> Result<()> {
        self.insert_impl(key, value)
    }

    fn search(&self, key: &[u8]) -> Option<Value> {
        self.search_impl(key)
    }

    fn prefix_search(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Value)> {
        self.prefix_search_impl(prefix)
    }

    fn build(&self, path: &Path) -> Result<()> {
        self.build_impl(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDS: &[&[u8]] = &[
        b"bachelor", b"back", b"badge", b"badger", b"badness", b"bcs", b"backbone",
    ];

    fn seeded() -> SingleTrie {
        let mut trie = SingleTrie::new();
        for (i, word) in WORDS.iter().enumerate() {
            trie.insert(word, i as Value + 1).unwrap();
        }
        trie
    }

    #[test]
    fn test_insert_and_search() {
        let trie = seeded();
        for (i, word) in WORDS.iter().enumerate() {
            assert_eq!(trie.search(word), Some(i as Value + 1), "word {:?}", word);
        }
        assert_eq!(trie.search(b"bad"), None);
        assert_eq!(trie.search(b"backb"), None);
        assert_eq!(trie.search(b"badgers"), None);
        assert_eq!(trie.search(b""), None);
    }

    #[test]
    fn test_duplicate_overwrites() {
        let mut trie = seeded();
        // duplicate on a shared-prefix branch and on a pristine tail
        trie.insert(b"badge", 40).unwrap();
        trie.insert(b"bcs", 60).unwrap();
        assert_eq!(trie.search(b"badge"), Some(40));
        assert_eq!(trie.search(b"bcs"), Some(60));
        assert_eq!(trie.search(b"badger"), Some(4));
    }

    #[test]
    fn test_prefix_inserts_both_orders() {
        let mut trie = SingleTrie::new();
        trie.insert(b"backbone", 1).unwrap();
        trie.insert(b"back", 2).unwrap();
        assert_eq!(trie.search(b"backbone"), Some(1));
        assert_eq!(trie.search(b"back"), Some(2));

        let mut trie = SingleTrie::new();
        trie.insert(b"back", 1).unwrap();
        trie.insert(b"backbone", 2).unwrap();
        assert_eq!(trie.search(b"back"), Some(1));
        assert_eq!(trie.search(b"backbone"), Some(2));
    }

    #[test]
    fn test_branch_splitting_keeps_old_tail() {
        let mut trie = SingleTrie::new();
        trie.insert(b"bachelor", 1).unwrap();
        trie.insert(b"back", 2).unwrap(); // splits after "ba c"
        trie.insert(b"badge", 3).unwrap();
        trie.insert(b"badger", 4).unwrap(); // splits inside "ge#"
        assert_eq!(trie.search(b"bachelor"), Some(1));
        assert_eq!(trie.search(b"back"), Some(2));
        assert_eq!(trie.search(b"badge"), Some(3));
        assert_eq!(trie.search(b"badger"), Some(4));
        assert_eq!(trie.search(b"bach"), None);
    }

    #[test]
    fn test_prefix_search_scenarios() {
        let trie = seeded();
        let back = trie.prefix_search(b"back");
        assert_eq!(
            back,
            vec![(b"back".to_vec(), 2), (b"backbone".to_vec(), 7)]
        );
        assert_eq!(trie.prefix_search(b"back!"), back);
        assert_eq!(trie.prefix_search(b"").len(), WORDS.len());
        assert!(trie.prefix_search(b"xyz").is_empty());
        assert!(trie.prefix_search(b"bad!").is_empty());
    }

    #[test]
    fn test_prefix_search_inside_tail() {
        let trie = seeded();
        assert_eq!(
            trie.prefix_search(b"bache"),
            vec![(b"bachelor".to_vec(), 1)]
        );
        let bad = trie.prefix_search(b"bad");
        let keys: Vec<&[u8]> = bad.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(
            keys,
            vec![b"badge".as_ref(), b"badger".as_ref(), b"badness".as_ref()]
        );
    }

    #[test]
    fn test_rejects_non_positive_value() {
        let mut trie = SingleTrie::new();
        assert!(trie.insert(b"key", 0).is_err());
        assert!(trie.insert(b"key", -7).is_err());
    }

    #[test]
    fn test_empty_key() {
        let mut trie = SingleTrie::new();
        trie.insert(b"", 5).unwrap();
        assert_eq!(trie.search(b""), Some(5));
        trie.insert(b"a", 6).unwrap();
        assert_eq!(trie.search(b""), Some(5));
        assert_eq!(trie.search(b"a"), Some(6));
        assert_eq!(trie.search(b"ab"), None);
    }
}
