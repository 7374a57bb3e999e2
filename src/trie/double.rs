//! Two-trie engine
//!
//! Keys are split between a forward front trie and a reverse rear trie.
//! The front trie holds the shortest distinguishing prefix of each key and
//! ends in a separator state; the rear trie holds the remaining tails,
//! stored reversed so that keys with a common suffix share one chain. An
//! index/accept table pair joins the two sides, and a back-reference map
//! (`refer`) records, for every tail endpoint, the separators pointing at
//! it so links can be rewritten when rear states are renumbered or
//! coalesced.
//!
//! A rear state is either interior (it has real children) or a tail
//! endpoint recorded in `refer`, never both; `rhs_clean` restores that
//! split after every tail rewrite.

use crate::error::{Error, Result};
use crate::io::mmap::{self, MappedFile, Pod, Table};
use crate::key::{self, Symbol, TERMINATOR};
use crate::trie::basic::{BasicHeader, BasicTrie, State, ROOT_STATE};
use crate::trie::traits::{Relocator, Trie};
use crate::{StateId, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Magic identifying a persisted two-trie file.
pub const DOUBLE_TRIE_MAGIC: [u8; 16] = *b"TWO_TRIE\0\0\0\0\0\0\0\0";

/// One slot of the index table. `index == 0` marks a key that terminates
/// at its front-trie leaf; `index > 0` addresses the accept entry of the
/// key's rear tail. `data` is the user value either way.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexCell {
    /// Accept-table slot, or 0 for a front-only key.
    pub index: i32,
    /// User value.
    pub data: i32,
}

unsafe impl Pod for IndexCell {}

/// One slot of the accept table: the rear-trie state where a tail begins
/// (walked backwards toward the rear root).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcceptCell {
    /// Rear-trie tail endpoint, or 0 for a freed slot.
    pub accept: i32,
}

unsafe impl Pod for AcceptCell {}

/// Persisted two-trie header. `reserved` is written as zero.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DoubleHeader {
    /// File magic, NUL-padded.
    pub magic: [u8; 16],
    /// Number of index cells.
    pub index_size: i32,
    /// Number of accept cells.
    pub accept_size: i32,
    /// Reserved, zero.
    pub reserved: [i32; 2],
}

unsafe impl Pod for DoubleHeader {}

/// Back-references of one rear-trie tail endpoint.
#[derive(Clone, Debug, Default)]
struct Referer {
    accept_index: i32,
    referers: BTreeSet<StateId>,
}

/// Front-trie relocation callback: a moved separator must be re-pointed
/// inside the referer set of its accept state.
struct FrontRelocator<'a> {
    index: &'a [IndexCell],
    accept: &'a [AcceptCell],
    refer: &'a mut BTreeMap<StateId, Referer>,
}

impl Relocator for FrontRelocator<'_> {
    fn relocate(&mut self, old: StateId, new: StateId, base: i32) {
        if base >= 0 {
            return;
        }
        let slot = (-base) as usize;
        let Some(cell) = self.index.get(slot) else {
            return;
        };
        if cell.index <= 0 {
            return;
        }
        let Some(accept) = self.accept.get(cell.index as usize) else {
            return;
        };
        if let Some(entry) = self.refer.get_mut(&accept.accept) {
            if entry.referers.remove(&old) {
                entry.referers.insert(new);
            }
        }
    }
}

/// Rear-trie relocation callback: accept entries, the `refer` key and any
/// in-flight watchers follow the renumbered state.
struct RearRelocator<'a> {
    accept: &'a mut [AcceptCell],
    refer: &'a mut BTreeMap<StateId, Referer>,
    watchers: &'a mut [StateId; 2],
}

impl Relocator for RearRelocator<'_> {
    fn relocate(&mut self, old: StateId, new: StateId, _base: i32) {
        if let Some(entry) = self.refer.remove(&old) {
            if let Some(cell) = self.accept.get_mut(entry.accept_index as usize) {
                cell.accept = new;
            }
            self.refer.insert(new, entry);
        }
        for watcher in self.watchers.iter_mut() {
            if *watcher == old {
                *watcher = new;
            }
        }
    }
}

/// Double-array trie storing shared suffixes in a reverse rear trie.
pub struct DoubleTrie {
    lhs: BasicTrie,
    rhs: BasicTrie,
    index: Table<IndexCell>,
    accept: Table<AcceptCell>,
    refer: BTreeMap<StateId, Referer>,
    free_index: Vec<i32>,
    free_accept: Vec<i32>,
    watchers: [StateId; 2],
}

impl DoubleTrie {
    /// Create an empty two-trie with default capacities.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty two-trie sized for about `capacity` states per side.
    pub fn with_capacity(capacity: usize) -> Self {
        let (lhs, rhs) = if capacity == 0 {
            (BasicTrie::new(), BasicTrie::new())
        } else {
            (
                BasicTrie::with_capacity(capacity),
                BasicTrie::with_capacity(capacity),
            )
        };
        DoubleTrie {
            lhs,
            rhs,
            index: Table::Owned(vec![IndexCell::default()]),
            accept: Table::Owned(vec![AcceptCell::default()]),
            refer: BTreeMap::new(),
            free_index: Vec::new(),
            free_accept: Vec::new(),
            watchers: [0, 0],
        }
    }

    /// Load a persisted two-trie read-only through a memory mapping.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = MappedFile::open(path)?;
        let header: DoubleHeader = file.take_struct()?;
        if header.magic != DOUBLE_TRIE_MAGIC {
            return Err(Error::corrupted("not a two-trie file (magic mismatch)"));
        }
        if header.index_size < 1 || header.accept_size < 1 {
            return Err(Error::corrupted("two-trie header with empty tables"));
        }
        let index = file.take_slice::<IndexCell>(header.index_size as usize)?;
        let accept = file.take_slice::<AcceptCell>(header.accept_size as usize)?;
        let front_header: BasicHeader = file.take_struct()?;
        if front_header.size < 0 {
            return Err(Error::corrupted("negative front-trie size"));
        }
        let front_states = file.take_slice::<State>(front_header.size as usize)?;
        let rear_header: BasicHeader = file.take_struct()?;
        if rear_header.size < 0 {
            return Err(Error::corrupted("negative rear-trie size"));
        }
        let rear_states = file.take_slice::<State>(rear_header.size as usize)?;
        log::debug!(
            "loaded two-trie: {} mapped, index = {}, accept = {}",
            mmap::pretty_size(file.len()),
            header.index_size,
            header.accept_size
        );
        file.finish()?;
        Ok(DoubleTrie {
            lhs: BasicTrie::from_mapped(front_header, front_states)?,
            rhs: BasicTrie::from_mapped(rear_header, rear_states)?,
            index: Table::Mapped(index),
            accept: Table::Mapped(accept),
            refer: BTreeMap::new(),
            free_index: Vec::new(),
            free_accept: Vec::new(),
            watchers: [0, 0],
        })
    }

    /// Whether this engine aliases a read-only mapping.
    pub fn is_mapped(&self) -> bool {
        self.index.is_mapped()
    }

    #[inline]
    fn check_separator(&self, s: StateId) -> bool {
        self.lhs.base(s) < 0
    }

    /// Rear tail endpoint linked from separator `s`.
    fn link_state(&self, s: StateId) -> StateId {
        let slot = (-self.lhs.base(s)) as usize;
        let k = self.index.as_slice()[slot].index as usize;
        self.accept.as_slice()[k].accept
    }

    fn count_referer(&self, t: StateId) -> usize {
        self.refer.get(&t).map_or(0, |entry| entry.referers.len())
    }

    fn lhs_create_transition(&mut self, s: StateId, ch: Symbol) -> Result<StateId> {
        let mut relocator = FrontRelocator {
            index: self.index.as_slice(),
            accept: self.accept.as_slice(),
            refer: &mut self.refer,
        };
        self.lhs.create_transition(s, ch, &mut relocator)
    }

    fn rhs_create_transition(&mut self, s: StateId, ch: Symbol) -> Result<StateId> {
        let mut relocator = RearRelocator {
            accept: self.accept.as_mut_slice()?,
            refer: &mut self.refer,
            watchers: &mut self.watchers,
        };
        self.rhs.create_transition(s, ch, &mut relocator)
    }

    /// Allocate (or reuse) an index slot and attach it to front state `s`.
    fn find_index_entry(&mut self, s: StateId) -> Result<i32> {
        let slot = match self.free_index.pop() {
            Some(slot) => slot,
            None => {
                let cells = self.index.as_vec_mut()?;
                cells.push(IndexCell::default());
                (cells.len() - 1) as i32
            }
        };
        self.lhs.set_base(s, -slot)?;
        Ok(slot)
    }

    /// Accept entry for rear state `t`, allocating one if `t` is not yet a
    /// recorded tail endpoint.
    fn find_accept_entry(&mut self, t: StateId) -> Result<i32> {
        if let Some(entry) = self.refer.get(&t) {
            return Ok(entry.accept_index);
        }
        let slot = match self.free_accept.pop() {
            Some(slot) => slot,
            None => {
                let cells = self.accept.as_vec_mut()?;
                cells.push(AcceptCell::default());
                (cells.len() - 1) as i32
            }
        };
        self.accept.as_mut_slice()?[slot as usize].accept = t;
        self.refer.insert(
            t,
            Referer {
                accept_index: slot,
                referers: BTreeSet::new(),
            },
        );
        Ok(slot)
    }

    /// Link separator `s` to rear tail endpoint `t`, reusing `s`'s index
    /// slot when it already has one. Returns the index slot.
    fn set_link(&mut self, s: StateId, t: StateId) -> Result<i32> {
        let slot = if self.lhs.base(s) < 0 {
            -self.lhs.base(s)
        } else {
            self.find_index_entry(s)?
        };
        let k = self.find_accept_entry(t)?;
        self.index.as_mut_slice()?[slot as usize].index = k;
        if let Some(entry) = self.refer.get_mut(&t) {
            entry.referers.insert(s);
        }
        Ok(slot)
    }

    /// Drop the accept entry of `t` and forget its back-references.
    fn free_accept_entry(&mut self, t: StateId) -> Result<()> {
        if let Some(entry) = self.refer.remove(&t) {
            self.accept.as_mut_slice()?[entry.accept_index as usize].accept = 0;
            self.free_accept.push(entry.accept_index);
        }
        Ok(())
    }

    /// Remove rear state `t` entirely.
    fn remove_accept_state(&mut self, t: StateId) -> Result<()> {
        self.rhs.set_base(t, 0)?;
        self.rhs.set_check(t, 0)?;
        self.free_accept_entry(t)
    }

    /// Append a tail (symbols ending in the terminator) to the rear trie,
    /// consuming it back-to-front, and return its endpoint.
    ///
    /// When the walk diverges at a state that is currently a tail endpoint,
    /// its accepts migrate onto a fresh dummy terminator child before real
    /// edges grow below it.
    fn rhs_append(&mut self, inputs: &[Symbol]) -> Result<StateId> {
        debug_assert!(!inputs.is_empty());
        let (s, mismatch) = self.rhs.go_forward_reverse(ROOT_STATE, inputs);
        let Some(at) = mismatch else {
            if self.rhs.outdegree(s) == 0 {
                return Ok(s);
            }
            let t = self.rhs.next(s, TERMINATOR);
            if self.rhs.check_transition(s, t) {
                return Ok(t);
            }
            return self.rhs_create_transition(s, TERMINATOR);
        };
        let mut s = s;
        if self.rhs.outdegree(s) == 0 {
            let t = self.rhs_create_transition(s, TERMINATOR)?;
            s = self.rhs.prev(t); // s may have been renumbered by the create
            if self.refer.contains_key(&s) {
                let referers: Vec<StateId> = self
                    .refer
                    .get(&s)
                    .map(|entry| entry.referers.iter().copied().collect())
                    .unwrap_or_default();
                for referer in referers {
                    self.set_link(referer, t)?;
                }
                self.free_accept_entry(s)?;
            }
        }
        for i in (0..=at).rev() {
            s = self.rhs_create_transition(s, inputs[i])?;
        }
        Ok(s)
    }

    /// Extend the front trie below a non-separator state.
    fn lhs_insert(&mut self, s: StateId, inputs: &[Symbol], value: Value) -> Result<()> {
        let t = self.lhs_create_transition(s, inputs[0])?;
        let slot = if inputs[0] == TERMINATOR {
            let slot = self.find_index_entry(t)?;
            self.index.as_mut_slice()?[slot as usize].index = 0;
            slot
        } else {
            let endpoint = self.rhs_append(&inputs[1..])?;
            self.set_link(t, endpoint)?
        };
        self.index.as_mut_slice()?[slot as usize].data = value;
        Ok(())
    }

    /// `true` when the old tail endpoint is still alive after an insert
    /// (another key accepts there) and nothing needs collecting.
    fn rhs_clean_one(&self, u: StateId) -> bool {
        self.rhs.outdegree(u) == 0 && self.count_referer(u) > 0
    }

    /// Collect the dead part of an abandoned tail chain, bottom-up, and
    /// fold a lone dummy terminator child back into its parent.
    fn rhs_clean_more(&mut self, t: StateId) -> Result<()> {
        if t <= ROOT_STATE {
            return Ok(());
        }
        if self.rhs.outdegree(t) == 0 && self.count_referer(t) == 0 {
            debug_assert!(self.rhs.check(t) > 0);
            let parent = self.rhs.prev(t);
            self.remove_accept_state(t)?;
            debug_assert!(parent > 0);
            if parent > 0 {
                self.rhs_clean_more(parent)?;
            }
        } else if self.rhs.outdegree(t) == 1 {
            let r = self.rhs.next(t, TERMINATOR);
            if self.rhs.check_transition(t, r) {
                // the divergence below t is gone; accept directly at t
                if self.refer.contains_key(&r) {
                    let referers: Vec<StateId> = self
                        .refer
                        .get(&r)
                        .map(|entry| entry.referers.iter().copied().collect())
                        .unwrap_or_default();
                    for referer in referers {
                        self.set_link(referer, t)?;
                    }
                    if let Some(entry) = self.refer.get(&t) {
                        let k = entry.accept_index;
                        self.accept.as_mut_slice()?[k as usize].accept = t;
                    }
                }
                if self.rhs.base(r) > 1 {
                    self.rhs.set_last_base(self.rhs.base(r));
                }
                self.remove_accept_state(r)?;
            }
        }
        Ok(())
    }

    /// Split an existing tail: the new key diverged from the stored tail of
    /// separator `s` after the common symbols `exists`.
    ///
    /// `r` is the rear state where the backward walk stopped, `remain` the
    /// unmatched input (terminator included) and `ch` the stored-side
    /// mismatch symbol.
    fn rhs_insert(
        &mut self,
        s: StateId,
        r: StateId,
        exists: &[Symbol],
        remain: &[Symbol],
        ch: Symbol,
        value: Value,
    ) -> Result<()> {
        // R-1: detach the separator from its tail
        let u = self.link_state(s);
        debug_assert!(u > 0 && self.rhs.check(u) > 0);
        let slot = -self.lhs.base(s);
        let old_value = self.index.as_slice()[slot as usize].data;
        self.index.as_mut_slice()?[slot as usize] = IndexCell::default();
        self.free_index.push(slot);
        self.lhs.set_base(s, 0)?;
        // u and r may be renumbered while the tails are rewritten below;
        // the rear relocator keeps the watchers current.
        self.watchers = [u, r];
        let mut last_referer_left = false;
        if let Some(entry) = self.refer.get_mut(&u) {
            entry.referers.remove(&s);
            last_referer_left = entry.referers.is_empty();
        }
        if last_referer_left {
            self.free_accept_entry(u)?;
        }

        // R-2: reinstall the common prefix and attach the new key
        let mut s = s;
        for &existing in exists {
            s = self.lhs_create_transition(s, existing)?;
        }
        let t = self.lhs_create_transition(s, remain[0])?;
        s = self.lhs.prev(t); // s may have been renumbered by the create
        if remain[0] == TERMINATOR {
            let slot = self.find_index_entry(t)?;
            let cells = self.index.as_mut_slice()?;
            cells[slot as usize].index = 0;
            cells[slot as usize].data = value;
        } else {
            let endpoint = self.rhs_append(&remain[1..])?;
            debug_assert!(self.rhs.check(self.watchers[0]) > 0);
            let slot = self.set_link(t, endpoint)?;
            self.index.as_mut_slice()?[slot as usize].data = value;
        }

        // R-3: reinstate the old key under its mismatch symbol
        let t = self.lhs_create_transition(s, ch)?;
        let v = self.rhs.prev(self.watchers[1]);
        let dummy = self.rhs.next(v, TERMINATOR);
        let endpoint = if self.rhs.check_transition(v, dummy) {
            dummy
        } else {
            self.rhs_create_transition(v, TERMINATOR)?
        };
        let slot = self.set_link(t, endpoint)?;
        self.index.as_mut_slice()?[slot as usize].data = old_value;

        // R-4: collect what is left of the old tail
        let u = self.watchers[0];
        if !self.rhs_clean_one(u) {
            self.rhs_clean_more(u)?;
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
        let (s, mismatch) = self.lhs.go_forward(ROOT_STATE, &symbols);

        let Some(at) = mismatch else {
            // key fully present in the front trie
            let slot = -self.lhs.base(s);
            if slot <= 0 {
                return Err(Error::internal("matched key without an index slot"));
            }
            self.index.as_mut_slice()?[slot as usize].data = value;
            return Ok(());
        };

        if !self.check_separator(s) {
            return self.lhs_insert(s, &symbols[at..], value);
        }

        debug_assert!(self.index.as_slice()[(-self.lhs.base(s)) as usize].index > 0);
        let mut r = self.link_state(s);
        // skip a dummy terminator below the endpoint
        if self.rhs.check_reverse_transition(r, TERMINATOR) && self.rhs.prev(r) > ROOT_STATE {
            r = self.rhs.prev(r);
        }

        // walk the stored tail backwards against the remaining input
        let mut exists: Vec<Symbol> = Vec::new();
        let mut at = at;
        while at < symbols.len() {
            let ch = symbols[at];
            if !self.rhs.check_reverse_transition(r, ch) {
                break;
            }
            r = self.rhs.prev(r);
            exists.push(ch);
            if r == ROOT_STATE {
                // duplicated key
                let slot = -self.lhs.base(s);
                self.index.as_mut_slice()?[slot as usize].data = value;
                return Ok(());
            }
            at += 1;
        }
        if at >= symbols.len() {
            // interior terminator edges exist only at chain tops, which the
            // duplicate check above intercepts before the input runs out
            return Err(Error::internal(
                "rear walk consumed the terminator without reaching the root",
            ));
        }
        let mismatch_ch = r - self.rhs.base(self.rhs.prev(r));
        self.rhs_insert(s, r, &exists, &symbols[at..], mismatch_ch, value)
    }

    fn search_impl(&self, key: &[u8]) -> Option<Value> {
        let symbols = key::encode(key);
        let (s, mismatch) = self.lhs.go_forward(ROOT_STATE, &symbols);
        let index = self.index.as_slice();

        let Some(at) = mismatch else {
            let slot = -self.lhs.base(s);
            if slot <= 0 {
                return None;
            }
            return index.get(slot as usize).map(|cell| cell.data);
        };

        if !self.check_separator(s) {
            return None;
        }
        let cell = index.get((-self.lhs.base(s)) as usize)?;
        if cell.index <= 0 {
            return None;
        }
        let mut r = self.accept.as_slice().get(cell.index as usize)?.accept;
        // skip a dummy terminator below the endpoint; an edge straight off
        // the rear root is the tail itself, not a dummy
        if self.rhs.check_reverse_transition(r, TERMINATOR) && self.rhs.prev(r) > ROOT_STATE {
            r = self.rhs.prev(r);
        }
        let (r, tail_mismatch) = self.rhs.go_backward(r, &symbols[at..]);
        if r == ROOT_STATE && tail_mismatch.is_none() {
            Some(cell.data)
        } else {
            None
        }
    }

    /// Rebuild a candidate's full key by ascending the rear trie from its
    /// accept state, filtering by any unmatched prefix remainder.
    fn rear_completion(
        &self,
        key_syms: &mut Vec<Symbol>,
        cell: IndexCell,
        miss: Option<&[Symbol]>,
    ) -> Option<Value> {
        let mut r = self.accept.as_slice().get(cell.index as usize)?.accept;
        if self.rhs.check_reverse_transition(r, TERMINATOR) && self.rhs.prev(r) > ROOT_STATE {
            r = self.rhs.prev(r);
        }
        let mut mi = 0usize;
        while r > ROOT_STATE {
            let parent = self.rhs.prev(r);
            let ch = r - self.rhs.base(parent);
            r = parent;
            if let Some(m) = miss {
                if mi < m.len() && m[mi] != TERMINATOR {
                    if m[mi] != ch {
                        return None;
                    }
                    mi += 1;
                }
            }
            key_syms.push(ch);
        }
        if let Some(m) = miss {
            if mi < m.len() && m[mi] != TERMINATOR {
                return None;
            }
        }
        Some(cell.data)
    }

    fn prefix_search_impl(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Value)> {
        let symbols = key::encode(prefix);
        let (mut s, mismatch) = self.lhs.go_forward(ROOT_STATE, &symbols);
        if self.lhs.check_reverse_transition(s, TERMINATOR) {
            s = self.lhs.prev(s);
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
        self.lhs
            .prefix_search_aux(s, effective_miss, &mut store, &mut raw);

        let index = self.index.as_slice();
        let mut results = Vec::new();
        for (mut key_syms, neg_slot) in raw {
            if neg_slot >= 0 {
                continue;
            }
            let Some(cell) = index.get((-neg_slot) as usize).copied() else {
                continue;
            };
            if cell.index == 0 {
                results.push((key::decode(&key_syms), cell.data));
                continue;
            }
            if let Some(value) = self.rear_completion(&mut key_syms, cell, effective_miss) {
                results.push((key::decode(&key_syms), value));
            }
        }
        results
    }

    fn build_impl(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        let header = DoubleHeader {
            magic: DOUBLE_TRIE_MAGIC,
            index_size: self.index.len() as i32,
            accept_size: self.accept.len() as i32,
            reserved: [0; 2],
        };
        mmap::write_pod(&mut out, &header)?;
        mmap::write_pod_slice(&mut out, self.index.as_slice())?;
        mmap::write_pod_slice(&mut out, self.accept.as_slice())?;
        let front_header = self.lhs.compact_header();
        mmap::write_pod(&mut out, &front_header)?;
        mmap::write_pod_slice(&mut out, self.lhs.compact_states())?;
        let rear_header = self.rhs.compact_header();
        mmap::write_pod(&mut out, &rear_header)?;
        mmap::write_pod_slice(&mut out, self.rhs.compact_states())?;
        let file = out
            .into_inner()
            .map_err(|e| Error::io_error(format!("flush failed: {}", e)))?;
        file.sync_all()?;

        let index_bytes = self.index.len() * std::mem::size_of::<IndexCell>();
        let accept_bytes = self.accept.len() * std::mem::size_of::<AcceptCell>();
        let front_bytes = front_header.size as usize * std::mem::size_of::<State>();
        let rear_bytes = rear_header.size as usize * std::mem::size_of::<State>();
        log::debug!(
            "built two-trie: index = {}, accept = {}, front = {}, rear = {}, total = {}",
            mmap::pretty_size(index_bytes),
            mmap::pretty_size(accept_bytes),
            mmap::pretty_size(front_bytes),
            mmap::pretty_size(rear_bytes),
            mmap::pretty_size(index_bytes + accept_bytes + front_bytes + rear_bytes)
        );
        Ok(())
    }
}

impl Default for DoubleTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DoubleTrie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoubleTrie")
            .field("lhs", &self.lhs)
            .field("rhs", &self.rhs)
            .field("index", &self.index.len())
            .field("accept", &self.accept.len())
            .field("refer", &self.refer.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

impl Trie for DoubleTrie {
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

    fn seeded() -> DoubleTrie {
        let mut trie = DoubleTrie::new();
        for (i, word) in WORDS.iter().enumerate() {
            trie.insert(word, i as Value + 1).unwrap();
            check_structure(&trie);
        }
        trie
    }

    /// Separator/index/accept/refer consistency after a mutation.
    fn check_structure(trie: &DoubleTrie) {
        let index = trie.index.as_slice();
        let accept = trie.accept.as_slice();
        // every separator owns a live index slot and appears among the
        // referers of its accept state
        for s in 2..trie.lhs.size() as StateId {
            if trie.lhs.check(s) <= 0 {
                continue;
            }
            let base = trie.lhs.base(s);
            if base >= 0 {
                continue;
            }
            let slot = (-base) as usize;
            assert!(slot < index.len(), "separator {} slot out of range", s);
            let cell = index[slot];
            if cell.index > 0 {
                let a = accept[cell.index as usize].accept;
                let entry = trie
                    .refer
                    .get(&a)
                    .unwrap_or_else(|| panic!("accept state {} missing from refer", a));
                assert_eq!(entry.accept_index, cell.index);
                assert!(entry.referers.contains(&s), "separator {} not in referers", s);
            }
        }
        // every refer entry matches its accept cell and marks a rear leaf;
        // the rear root's terminator child is exempt, being both the top of
        // every chain and the endpoint of terminator-only tails
        for (&a, entry) in &trie.refer {
            assert_eq!(accept[entry.accept_index as usize].accept, a);
            if trie.rhs.prev(a) != ROOT_STATE {
                assert_eq!(trie.rhs.outdegree(a), 0, "accept state {} has children", a);
            }
            assert!(!entry.referers.is_empty(), "accept state {} unreferenced", a);
        }
    }

    #[test]
    fn test_insert_and_search() {
        let trie = seeded();
        for (i, word) in WORDS.iter().enumerate() {
            assert_eq!(trie.search(word), Some(i as Value + 1), "word {:?}", word);
        }
        assert_eq!(trie.search(b"bad"), None);
        assert_eq!(trie.search(b"backb"), None);
        assert_eq!(trie.search(b"bachelors"), None);
        assert_eq!(trie.search(b""), None);
    }

    #[test]
    fn test_duplicate_overwrites() {
        let mut trie = seeded();
        trie.insert(b"badger", 42).unwrap();
        assert_eq!(trie.search(b"badger"), Some(42));
        trie.insert(b"back", 17).unwrap();
        assert_eq!(trie.search(b"back"), Some(17));
        assert_eq!(trie.search(b"backbone"), Some(7));
        check_structure(&trie);
    }

    #[test]
    fn test_prefix_inserts_both_orders() {
        let mut trie = DoubleTrie::new();
        trie.insert(b"backbone", 1).unwrap();
        trie.insert(b"back", 2).unwrap();
        check_structure(&trie);
        assert_eq!(trie.search(b"backbone"), Some(1));
        assert_eq!(trie.search(b"back"), Some(2));

        let mut trie = DoubleTrie::new();
        trie.insert(b"back", 1).unwrap();
        trie.insert(b"backbone", 2).unwrap();
        check_structure(&trie);
        assert_eq!(trie.search(b"back"), Some(1));
        assert_eq!(trie.search(b"backbone"), Some(2));
    }

    #[test]
    fn test_shared_suffixes() {
        let mut trie = DoubleTrie::new();
        trie.insert(b"ration", 1).unwrap();
        trie.insert(b"nation", 2).unwrap();
        trie.insert(b"station", 3).unwrap();
        trie.insert(b"nations", 4).unwrap();
        check_structure(&trie);
        assert_eq!(trie.search(b"ration"), Some(1));
        assert_eq!(trie.search(b"nation"), Some(2));
        assert_eq!(trie.search(b"station"), Some(3));
        assert_eq!(trie.search(b"nations"), Some(4));
        assert_eq!(trie.search(b"ation"), None);
    }

    #[test]
    fn test_prefix_search_scenarios() {
        let trie = seeded();
        let back: Vec<(Vec<u8>, Value)> = trie.prefix_search(b"back");
        assert_eq!(
            back,
            vec![(b"back".to_vec(), 2), (b"backbone".to_vec(), 7)]
        );
        // a sentinel beyond the stored key collapses to the same set
        assert_eq!(trie.prefix_search(b"back!"), back);
        assert_eq!(trie.prefix_search(b"").len(), WORDS.len());
        assert!(trie.prefix_search(b"xyz").is_empty());
        assert!(trie.prefix_search(b"bad!").is_empty());
    }

    #[test]
    fn test_prefix_search_inside_tail() {
        let trie = seeded();
        let hits = trie.prefix_search(b"bache");
        assert_eq!(hits, vec![(b"bachelor".to_vec(), 1)]);
    }

    #[test]
    fn test_rejects_non_positive_value() {
        let mut trie = DoubleTrie::new();
        assert!(trie.insert(b"key", 0).is_err());
        assert!(trie.insert(b"key", -1).is_err());
    }

    #[test]
    fn test_empty_key() {
        let mut trie = DoubleTrie::new();
        trie.insert(b"", 5).unwrap();
        assert_eq!(trie.search(b""), Some(5));
        assert_eq!(trie.search(b"a"), None);
        trie.insert(b"a", 6).unwrap();
        assert_eq!(trie.search(b""), Some(5));
        assert_eq!(trie.search(b"a"), Some(6));
    }

    #[test]
    fn test_single_symbol_tail_has_no_phantom() {
        // the tail of "a" is just the terminator, so its accept state sits
        // directly below the rear root; junk suffixes must still miss
        let mut trie = DoubleTrie::new();
        trie.insert(b"a", 6).unwrap();
        assert_eq!(trie.search(b"a"), Some(6));
        assert_eq!(trie.search(b"ax"), None);
        assert_eq!(trie.search(b"aa"), None);
        trie.insert(b"ax", 7).unwrap();
        check_structure(&trie);
        assert_eq!(trie.search(b"a"), Some(6));
        assert_eq!(trie.search(b"ax"), Some(7));
        assert_eq!(trie.search(b"axx"), None);
    }

    #[test]
    fn test_many_keys_stay_consistent() {
        let mut trie = DoubleTrie::new();
        let mut keys = Vec::new();
        for a in 0u8..8 {
            for b in 0u8..8 {
                for c in 0u8..4 {
                    keys.push(vec![b'a' + a, b'a' + b, b'a' + c, b'x', b'y']);
                }
            }
        }
        for (i, key) in keys.iter().enumerate() {
            trie.insert(key, i as Value + 1).unwrap();
        }
        check_structure(&trie);
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(trie.search(key), Some(i as Value + 1), "key {:?}", key);
        }
        assert_eq!(trie.prefix_search(b"").len(), keys.len());
    }
}
