//! Basic double-array trie
//!
//! The classical Aoe representation: one array of `{base, check}` cells.
//! A transition from state `s` on symbol `c` leads to `t = base(s) + c`,
//! valid iff `check(t) == s`. Adding an edge whose target cell is occupied
//! relocates the smaller of the two conflicting sibling groups to a fresh
//! base found by scanning from a rolling hint.
//!
//! Cell conventions: index 0 is reserved (`check == 0` marks an unused
//! cell), state 1 is the root. `base > 0` is an interior state, `base < 0`
//! a leaf whose side data lives at `-base` in an engine-owned table, and
//! `base == 0` a fresh state.

use crate::error::{Error, Result};
use crate::io::mmap::{MappedSlice, Pod, Table};
use crate::key::{self, Symbol, MAX_SYMBOL, MIN_SYMBOL, TERMINATOR};
use crate::trie::traits::{NullRelocator, Relocator};
use crate::{StateId, Value};

/// The root state of every trie.
pub const ROOT_STATE: StateId = 1;

/// Default number of state cells for a fresh trie.
pub const DEFAULT_STATE_COUNT: usize = 4096;

/// Smallest usable state array: the root plus one full symbol fan.
const MIN_STATE_COUNT: usize = key::CHARSET_SIZE + 2;

/// One double-array cell.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct State {
    /// Transition base (interior), negated side-data slot (leaf), or 0.
    pub base: i32,
    /// Parent state, or 0 for an unused cell.
    pub check: i32,
}

unsafe impl Pod for State {}

/// Persisted basic-trie header. `reserved` is written as zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicHeader {
    /// Number of persisted state cells.
    pub size: i32,
    /// Highest occupied state id.
    pub max_state: i32,
    /// Rolling free-base scan hint.
    pub last_base: i32,
    /// Reserved, zero.
    pub reserved: i32,
}

unsafe impl Pod for BasicHeader {}

/// Smallest and largest symbol of a sibling group, for `find_base`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Extremum {
    /// Smallest symbol, 0 when unset.
    pub min: Symbol,
    /// Largest symbol, 0 when unset.
    pub max: Symbol,
}

impl Extremum {
    #[inline]
    pub(crate) fn update(&mut self, ch: Symbol) {
        if self.max == 0 || ch > self.max {
            self.max = ch;
        }
        if self.min == 0 || ch < self.min {
            self.min = ch;
        }
    }
}

/// The basic double-array trie engine.
///
/// Owns nothing but its state array; the higher-level engines attach side
/// tables through the signed-base convention and observe renumbering
/// through a [`Relocator`] threaded into every mutating call.
pub struct BasicTrie {
    states: Table<State>,
    last_base: i32,
    max_state: StateId,
}

impl BasicTrie {
    /// Create an empty trie with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_STATE_COUNT)
    }

    /// Create an empty trie with room for about `capacity` states.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_STATE_COUNT);
        BasicTrie {
            states: Table::Owned(vec![State::default(); capacity]),
            last_base: 0,
            max_state: ROOT_STATE,
        }
    }

    /// Construct a read-only trie over a mapped section.
    pub fn from_mapped(header: BasicHeader, states: MappedSlice<State>) -> Result<Self> {
        if header.size < 0 || header.size as usize != states.len() {
            return Err(Error::corrupted(format!(
                "trie header size {} does not match section of {} states",
                header.size,
                states.len()
            )));
        }
        Ok(BasicTrie {
            states: Table::Mapped(states),
            last_base: header.last_base,
            max_state: header.max_state,
        })
    }

    /// Number of state cells currently addressable.
    #[inline]
    pub fn size(&self) -> usize {
        self.states.as_slice().len()
    }

    /// Highest occupied state id.
    #[inline]
    pub fn max_state(&self) -> StateId {
        self.max_state
    }

    /// Header describing the compacted persisted form.
    pub fn compact_header(&self) -> BasicHeader {
        BasicHeader {
            size: self.compact_size() as i32,
            max_state: self.max_state,
            last_base: self.last_base,
            reserved: 0,
        }
    }

    /// Number of cells worth persisting (through the highest occupied one).
    pub fn compact_size(&self) -> usize {
        (self.max_state as usize + 1).min(self.size())
    }

    /// The state cells of the compacted persisted form.
    pub fn compact_states(&self) -> &[State] {
        &self.states.as_slice()[..self.compact_size()]
    }

    /// Base value of `s`, 0 for out-of-range states.
    #[inline]
    pub fn base(&self, s: StateId) -> i32 {
        if s > 0 {
            self.states
                .as_slice()
                .get(s as usize)
                .map_or(0, |cell| cell.base)
        } else {
            0
        }
    }

    /// Check value (parent) of `s`, 0 for out-of-range states.
    #[inline]
    pub fn check(&self, s: StateId) -> i32 {
        if s > 0 {
            self.states
                .as_slice()
                .get(s as usize)
                .map_or(0, |cell| cell.check)
        } else {
            0
        }
    }

    pub(crate) fn set_base(&mut self, s: StateId, value: i32) -> Result<()> {
        debug_assert!(s > 0);
        self.ensure_state(s)?;
        self.states.as_vec_mut()?[s as usize].base = value;
        if s > self.max_state {
            self.max_state = s;
        }
        Ok(())
    }

    pub(crate) fn set_check(&mut self, s: StateId, parent: StateId) -> Result<()> {
        debug_assert!(s > 0);
        self.ensure_state(s)?;
        self.states.as_vec_mut()?[s as usize].check = parent;
        if s > self.max_state {
            self.max_state = s;
        }
        Ok(())
    }

    /// Move the free-base scan hint.
    pub(crate) fn set_last_base(&mut self, last_base: i32) {
        self.last_base = last_base;
    }

    /// Child cell of `s` on `ch` (no validity check).
    #[inline]
    pub fn next(&self, s: StateId, ch: Symbol) -> StateId {
        self.base(s) + ch
    }

    /// Parent of `s`.
    #[inline]
    pub fn prev(&self, s: StateId) -> StateId {
        self.check(s)
    }

    /// Is `t` a valid transition target of `s`?
    #[inline]
    pub fn check_transition(&self, s: StateId, t: StateId) -> bool {
        s > 0 && t > 0 && (t as usize) < self.size() && self.check(t) == s
    }

    /// Was `s` entered from its parent on `ch`?
    #[inline]
    pub fn check_reverse_transition(&self, s: StateId, ch: Symbol) -> bool {
        s > ROOT_STATE && self.check(s) > 0 && self.next(self.prev(s), ch) == s
    }

    /// Walk `symbols` from `s` as far as possible.
    ///
    /// Returns the deepest state reached and the index of the first symbol
    /// that could not be consumed (`None` when the whole input matched).
    pub fn go_forward(&self, s: StateId, symbols: &[Symbol]) -> (StateId, Option<usize>) {
        let mut s = s;
        for (i, &ch) in symbols.iter().enumerate() {
            let t = self.next(s, ch);
            if !self.check_transition(s, t) {
                return (s, Some(i));
            }
            s = t;
        }
        (s, None)
    }

    /// Walk `symbols` from `s` toward the root, matching each symbol
    /// against the edge that enters the current state.
    ///
    /// The rear trie of the two-trie engine stores tails reversed, so an
    /// ascent from a tail endpoint reads the tail in forward order.
    pub fn go_backward(&self, s: StateId, symbols: &[Symbol]) -> (StateId, Option<usize>) {
        let mut s = s;
        for (i, &ch) in symbols.iter().enumerate() {
            if !self.check_reverse_transition(s, ch) {
                return (s, Some(i));
            }
            s = self.prev(s);
        }
        (s, None)
    }

    /// Walk `symbols` from `s` back-to-front (last symbol first), going
    /// forward in the trie. Used to append reversed tails.
    ///
    /// Returns the deepest state reached and the index of the first
    /// unconsumed symbol counting from the end (`None` when the whole
    /// input matched).
    pub fn go_forward_reverse(&self, s: StateId, symbols: &[Symbol]) -> (StateId, Option<usize>) {
        let mut s = s;
        for (i, &ch) in symbols.iter().enumerate().rev() {
            let t = self.next(s, ch);
            if !self.check_transition(s, t) {
                return (s, Some(i));
            }
            s = t;
        }
        (s, None)
    }

    /// Real outgoing symbols of `s` with their extremum.
    pub fn find_exist_target(&self, s: StateId) -> (Vec<Symbol>, Extremum) {
        let mut targets = Vec::new();
        let mut extremum = Extremum::default();
        let base = self.base(s);
        if base > 0 {
            for ch in MIN_SYMBOL..=MAX_SYMBOL {
                let t = base + ch;
                if t > 0 && (t as usize) < self.size() && self.check(t) == s {
                    targets.push(ch);
                    extremum.update(ch);
                }
            }
        }
        (targets, extremum)
    }

    /// Number of real outgoing transitions of `s`.
    pub fn outdegree(&self, s: StateId) -> usize {
        self.find_exist_target(s).0.len()
    }

    /// Find a base such that every cell `base + ch` for the given symbols
    /// is unused, growing the state array as needed. Does not write.
    pub(crate) fn find_base(&mut self, symbols: &[Symbol], extremum: Extremum) -> Result<i32> {
        debug_assert!(!symbols.is_empty());
        let mut i = self.last_base;
        loop {
            i += 1;
            if (i + extremum.max) as usize >= self.size() {
                self.ensure_state(i + extremum.max)?;
            }
            if self.check(i + extremum.min) <= 0
                && self.check(i + extremum.max) <= 0
                && symbols.iter().all(|&ch| self.check(i + ch) <= 0)
            {
                break;
            }
        }
        self.last_base = (i - 255).max(1);
        Ok(i)
    }

    /// Move the sibling group `symbols` of `s` to a fresh base.
    ///
    /// Copies each child cell verbatim (preserving the sign of `base`),
    /// re-parents grandchildren, notifies the relocator, and clears the
    /// old cells. `stand` is the state the caller is holding; its possibly
    /// renumbered id is returned.
    pub(crate) fn relocate(
        &mut self,
        stand: StateId,
        s: StateId,
        symbols: &[Symbol],
        extremum: Extremum,
        relocator: &mut dyn Relocator,
    ) -> Result<StateId> {
        let mut stand = stand;
        let obase = self.base(s);
        let nbase = self.find_base(symbols, extremum)?;

        for &ch in symbols {
            let old = obase + ch;
            if self.check(old) != s {
                // symbol present in the group only to reserve its cell
                continue;
            }
            let new = nbase + ch;
            let moved_base = self.base(old);
            self.set_base(new, moved_base)?;
            self.set_check(new, s)?;
            let (grandchildren, _) = self.find_exist_target(old);
            for &gch in &grandchildren {
                self.set_check(moved_base + gch, new)?;
            }
            if stand == old {
                stand = new;
            }
            relocator.relocate(old, new, moved_base);
            self.set_base(old, 0)?;
            self.set_check(old, 0)?;
        }
        self.set_base(s, nbase)?;
        Ok(stand)
    }

    /// Ensure the edge `s --ch--> t` exists, relocating whichever
    /// conflicting sibling group is smaller (ties move `s`'s group).
    pub(crate) fn create_transition(
        &mut self,
        s: StateId,
        ch: Symbol,
        relocator: &mut dyn Relocator,
    ) -> Result<StateId> {
        let mut s = s;
        let mut t = self.next(s, ch);
        if t >= self.size() as StateId {
            self.ensure_state(t)?;
        }

        if !(self.base(s) > 0 && self.check(t) <= 0) {
            let (mut targets, mut extremum) = self.find_exist_target(s);
            let parent = self.check(t);
            let (parent_targets, parent_extremum) = if parent > 0 {
                self.find_exist_target(parent)
            } else {
                (Vec::new(), Extremum::default())
            };
            if !parent_targets.is_empty() && targets.len() + 1 > parent_targets.len() {
                s = self.relocate(s, parent, &parent_targets, parent_extremum, relocator)?;
            } else {
                targets.push(ch);
                extremum.update(ch);
                s = self.relocate(s, s, &targets, extremum, relocator)?;
            }
            t = self.next(s, ch);
            if t >= self.size() as StateId {
                self.ensure_state(t)?;
            }
        }
        self.set_check(t, s)?;
        Ok(t)
    }

    /// Insert an encoded key ending at a value leaf. Internal helper used
    /// by standalone basic tries; the engines drive `create_transition`
    /// themselves.
    pub fn insert(&mut self, key: &[u8], value: Value) -> Result<()> {
        if value <= 0 {
            return Err(Error::invalid_argument("insert: value must be > 0"));
        }
        let symbols = key::encode(key);
        let (mut s, mismatch) = self.go_forward(ROOT_STATE, &symbols);
        if let Some(at) = mismatch {
            let mut relocator = NullRelocator;
            for &ch in &symbols[at..] {
                s = self.create_transition(s, ch, &mut relocator)?;
            }
        }
        self.set_base(s, value)
    }

    /// Look up a key, returning the value stored at its leaf.
    pub fn search(&self, key: &[u8]) -> Option<Value> {
        let symbols = key::encode(key);
        let (s, mismatch) = self.go_forward(ROOT_STATE, &symbols);
        if mismatch.is_none() {
            Some(self.base(s))
        } else {
            None
        }
    }

    /// Enumerate every key beginning with `prefix` together with its value.
    pub fn prefix_search(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Value)> {
        let symbols = key::encode(prefix);
        let (mut s, mismatch) = self.go_forward(ROOT_STATE, &symbols);
        // a fully consumed prefix lands on its own value leaf; step back so
        // the leaf's siblings are enumerated too
        if self.check_reverse_transition(s, TERMINATOR) {
            s = self.prev(s);
        }
        let matched = mismatch.map_or(prefix.len(), |at| at.min(prefix.len()));
        let mut store: Vec<Symbol> = symbols[..matched].to_vec();
        let miss = mismatch.map(|at| &symbols[at..]);
        let mut raw = Vec::new();
        self.prefix_search_aux(s, miss, &mut store, &mut raw);
        raw.into_iter()
            .map(|(syms, value)| (key::decode(&syms), value))
            .collect()
    }

    /// Depth-first enumeration of every leaf below `s`.
    ///
    /// While `miss` holds unconsumed input that has not reached the
    /// terminator, only the matching symbol is explored; afterwards every
    /// symbol is. A state without real transitions emits the accumulated
    /// store and its base value.
    pub(crate) fn prefix_search_aux(
        &self,
        s: StateId,
        miss: Option<&[Symbol]>,
        store: &mut Vec<Symbol>,
        out: &mut Vec<(Vec<Symbol>, i32)>,
    ) {
        let (targets, _) = self.find_exist_target(s);
        if targets.is_empty() {
            out.push((store.clone(), self.base(s)));
            return;
        }
        let pending = miss.and_then(|m| m.first()).copied();
        for ch in targets {
            if let Some(expect) = pending {
                if expect != TERMINATOR && expect != ch {
                    continue;
                }
            }
            let t = self.next(s, ch);
            store.push(ch);
            let deeper = match (miss, pending) {
                (Some(m), Some(expect)) if expect != TERMINATOR => Some(&m[1..]),
                (other, _) => other,
            };
            self.prefix_search_aux(t, deeper, store, out);
            store.pop();
        }
    }

    fn ensure_state(&mut self, s: StateId) -> Result<()> {
        let needed = s as usize + 1;
        if needed <= self.size() {
            return Ok(());
        }
        let target = needed.max(self.size() * 2);
        self.states
            .as_vec_mut()?
            .resize(target, State::default());
        Ok(())
    }
}

impl Default for BasicTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BasicTrie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicTrie")
            .field("size", &self.size())
            .field("max_state", &self.max_state)
            .field("last_base", &self.last_base)
            .field("mapped", &self.states.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_search() {
        let mut trie = BasicTrie::new();
        trie.insert(b"hello", 10).unwrap();
        trie.insert(b"help", 20).unwrap();
        trie.insert(b"world", 30).unwrap();

        assert_eq!(trie.search(b"hello"), Some(10));
        assert_eq!(trie.search(b"help"), Some(20));
        assert_eq!(trie.search(b"world"), Some(30));
        assert_eq!(trie.search(b"he"), None);
        assert_eq!(trie.search(b"helper"), None);
    }

    #[test]
    fn test_rejects_non_positive_value() {
        let mut trie = BasicTrie::new();
        assert!(trie.insert(b"key", 0).is_err());
        assert!(trie.insert(b"key", -3).is_err());
    }

    #[test]
    fn test_prefix_of_key_is_independent() {
        let mut trie = BasicTrie::new();
        trie.insert(b"abc", 1).unwrap();
        trie.insert(b"ab", 2).unwrap();
        assert_eq!(trie.search(b"abc"), Some(1));
        assert_eq!(trie.search(b"ab"), Some(2));
        assert_eq!(trie.search(b"a"), None);
    }

    #[test]
    fn test_duplicate_insert_overwrites() {
        let mut trie = BasicTrie::new();
        trie.insert(b"dup", 1).unwrap();
        trie.insert(b"dup", 9).unwrap();
        assert_eq!(trie.search(b"dup"), Some(9));
    }

    #[test]
    fn test_prefix_search_enumerates() {
        let mut trie = BasicTrie::new();
        trie.insert(b"app", 1).unwrap();
        trie.insert(b"apple", 2).unwrap();
        trie.insert(b"apply", 3).unwrap();
        trie.insert(b"banana", 4).unwrap();

        let hits = trie.prefix_search(b"app");
        let keys: Vec<&[u8]> = hits.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"app".as_ref(), b"apple".as_ref(), b"apply".as_ref()]);

        assert_eq!(trie.prefix_search(b"").len(), 4);
        assert!(trie.prefix_search(b"zzz").is_empty());
    }

    #[test]
    fn test_check_link_invariant() {
        let mut trie = BasicTrie::new();
        let words: &[&[u8]] = &[
            b"bachelor", b"back", b"badge", b"badger", b"badness", b"bcs", b"backbone",
        ];
        for (i, word) in words.iter().enumerate() {
            trie.insert(word, i as Value + 1).unwrap();
        }
        for t in 2..trie.size() as StateId {
            let parent = trie.check(t);
            if parent > 0 {
                let matching: Vec<Symbol> = (MIN_SYMBOL..=MAX_SYMBOL)
                    .filter(|&ch| trie.base(parent) + ch == t)
                    .collect();
                assert_eq!(matching.len(), 1, "state {} has no unique inbound symbol", t);
            }
        }
        for (i, word) in words.iter().enumerate() {
            assert_eq!(trie.search(word), Some(i as Value + 1));
        }
    }

    #[test]
    fn test_relocation_preserves_bindings() {
        // dense fan-out from the root forces repeated group relocations
        let mut trie = BasicTrie::with_capacity(MIN_STATE_COUNT);
        for b in 0u8..=255 {
            trie.insert(&[b, b.wrapping_add(1)], b as Value + 1).unwrap();
        }
        for b in 0u8..=255 {
            assert_eq!(trie.search(&[b, b.wrapping_add(1)]), Some(b as Value + 1));
        }
    }

    #[test]
    fn test_go_forward_reports_mismatch() {
        let mut trie = BasicTrie::new();
        trie.insert(b"abcde", 5).unwrap();
        let symbols = key::encode(b"abxy");
        let (_, mismatch) = trie.go_forward(ROOT_STATE, &symbols);
        assert_eq!(mismatch, Some(2));
        let symbols = key::encode(b"abcde");
        let (_, mismatch) = trie.go_forward(ROOT_STATE, &symbols);
        assert_eq!(mismatch, None);
    }

    #[test]
    fn test_empty_key() {
        let mut trie = BasicTrie::new();
        trie.insert(b"", 7).unwrap();
        assert_eq!(trie.search(b""), Some(7));
        assert_eq!(trie.search(b"x"), None);
    }
}
