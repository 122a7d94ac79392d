//! Chained hash table with incremental rehashing.
//!
//! A `Dict` owns two sub-tables. Normally all entries live in the
//! first; an expansion installs a larger second table and every
//! subsequent mutating or lookup call migrates one non-empty bucket,
//! so no single operation ever pays for a whole-table copy. Key and
//! value semantics are supplied by a [`DictType`] descriptor; the
//! descriptor value carries any state its hooks need.
//!
//! Iteration comes in two shapes. [`Dict::iter`] is a plain borrowing
//! iterator: the borrow checker enforces that nothing mutates the
//! table mid-scan. [`Dict::safe_iter`] returns a detached [`SafeIter`]
//! cursor that registers itself with the dictionary, suppressing
//! rehash steps for its lifetime so interleaved inserts, finds, and
//! deletes cannot skip or duplicate entries.

use core::mem;
use core::sync::atomic::{AtomicBool, Ordering};
use std::marker::PhantomData;
use std::time::Instant;

use rand_core::RngCore;

use crate::byte_string::ByteString;
use crate::hash::{bytes_hash, case_hash, int_hash};

/// Size of a freshly materialized first sub-table.
const INITIAL_SIZE: usize = 4;

/// Load factor past which expansion happens even while resizing is
/// disabled.
const FORCE_RESIZE_RATIO: usize = 5;

/// Process-wide permission for load-factor-1 expansion and for
/// `resize`. Disabled by hosts while a copy-on-write snapshot child is
/// running, to keep bucket arrays from being rewritten under it.
static CAN_RESIZE: AtomicBool = AtomicBool::new(true);

/// Allow automatic resizing (the default).
pub fn enable_resize() {
    CAN_RESIZE.store(true, Ordering::Relaxed);
}

/// Forbid automatic resizing; tables still expand past a 5:1 load
/// factor so lookups stay O(1) expected.
pub fn disable_resize() {
    CAN_RESIZE.store(false, Ordering::Relaxed);
}

fn can_resize() -> bool {
    CAN_RESIZE.load(Ordering::Relaxed)
}

/// Key/value semantics for a dictionary.
///
/// The implementing value is the dictionary's private data: every hook
/// takes `&self`, so a stateful descriptor observes its own fields.
/// The duplication hooks run when an item is stored and default to
/// passing ownership through; the release hooks run when the
/// dictionary destroys an item and default to dropping it.
pub trait DictType {
    type Key;
    type Val;

    /// Hash of a key; indexes are `hash & (size - 1)`.
    fn hash(&self, key: &Self::Key) -> u32;

    /// Key equality under this configuration.
    fn key_eq(&self, a: &Self::Key, b: &Self::Key) -> bool;

    /// Transform a key before it is stored.
    fn dup_key(&self, key: Self::Key) -> Self::Key {
        key
    }

    /// Transform a value before it is stored.
    fn dup_val(&self, val: Self::Val) -> Self::Val {
        val
    }

    /// Release a key the dictionary is done with.
    fn free_key(&self, key: Self::Key) {
        drop(key);
    }

    /// Release a value the dictionary is done with.
    fn free_val(&self, val: Self::Val) {
        drop(val);
    }
}

/// An entry's value slot: a caller-typed payload or a bare 64-bit
/// integer, chosen by whichever setter ran last. The dictionary never
/// interprets the variant; only `Val` payloads pass through the
/// descriptor's `dup_val`/`free_val` hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<V> {
    Val(V),
    Signed(i64),
    Unsigned(u64),
}

impl<V> Value<V> {
    pub fn as_val(&self) -> Option<&V> {
        match self {
            Value::Val(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_val(self) -> Option<V> {
        match self {
            Value::Val(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_signed(&self) -> Option<i64> {
        match self {
            Value::Signed(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            Value::Unsigned(v) => Some(*v),
            _ => None,
        }
    }
}

/// One key/value cell in a bucket chain.
pub struct Entry<T: DictType> {
    key: T::Key,
    val: Value<T::Val>,
    next: Option<Box<Entry<T>>>,
}

impl<T: DictType> Entry<T> {
    pub fn key(&self) -> &T::Key {
        &self.key
    }

    pub fn val(&self) -> &Value<T::Val> {
        &self.val
    }

    pub fn value(&self) -> Option<&T::Val> {
        self.val.as_val()
    }

    pub fn value_mut(&mut self) -> Option<&mut T::Val> {
        match &mut self.val {
            Value::Val(v) => Some(v),
            _ => None,
        }
    }

    /// Overwrite the slot with a payload value. The previous contents
    /// are dropped in place; descriptor-mediated release happens only
    /// on the dictionary-level operations.
    pub fn set_value(&mut self, v: T::Val) {
        self.val = Value::Val(v);
    }

    pub fn signed(&self) -> Option<i64> {
        self.val.as_signed()
    }

    pub fn set_signed(&mut self, v: i64) {
        self.val = Value::Signed(v);
    }

    pub fn unsigned(&self) -> Option<u64> {
        self.val.as_unsigned()
    }

    pub fn set_unsigned(&mut self, v: u64) {
        self.val = Value::Unsigned(v);
    }
}

type Bucket<T> = Option<Box<Entry<T>>>;

struct Table<T: DictType> {
    buckets: Vec<Bucket<T>>,
    used: usize,
}

impl<T: DictType> Table<T> {
    fn empty() -> Table<T> {
        Table {
            buckets: Vec::new(),
            used: 0,
        }
    }

    fn with_size(size: usize) -> Table<T> {
        Table {
            buckets: core::iter::repeat_with(|| None).take(size).collect(),
            used: 0,
        }
    }

    fn size(&self) -> usize {
        self.buckets.len()
    }

    fn mask(&self) -> usize {
        self.buckets.len() - 1
    }
}

/// Insertion failure: the key is already present. The rejected key and
/// value were released through the descriptor hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    DuplicateKey,
}

/// Rejected `expand`/`resize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandError {
    /// The process-wide resize flag is off.
    ResizeDisabled,
    /// A rehash is already migrating entries.
    RehashInProgress,
    /// The requested capacity is below the current entry count.
    TooSmall,
}

/// The dictionary: two chained sub-tables with incremental migration
/// between them.
pub struct Dict<T: DictType> {
    ops: T,
    ht: [Table<T>; 2],
    /// Next bucket of `ht[0]` to migrate; `-1` while no rehash runs.
    rehash_idx: isize,
    /// Live registered safe iterators; rehash steps stall while > 0.
    iterators: usize,
}

impl<T: DictType + Default> Default for Dict<T> {
    fn default() -> Self {
        Dict::new(T::default())
    }
}

impl<T: DictType> Dict<T> {
    /// Fresh dictionary with no buckets allocated yet.
    pub fn new(ops: T) -> Dict<T> {
        Dict {
            ops,
            ht: [Table::empty(), Table::empty()],
            rehash_idx: -1,
            iterators: 0,
        }
    }

    /// The descriptor this dictionary was built with.
    pub fn ops(&self) -> &T {
        &self.ops
    }

    /// Entries currently stored, across both sub-tables.
    pub fn len(&self) -> usize {
        self.ht[0].used + self.ht[1].used
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bucket slots across both sub-tables.
    pub fn slots(&self) -> usize {
        self.ht[0].size() + self.ht[1].size()
    }

    /// True while entries are migrating to a resized table.
    pub fn is_rehashing(&self) -> bool {
        self.rehash_idx != -1
    }

    fn next_power(size: usize) -> usize {
        if size >= isize::MAX as usize {
            return isize::MAX as usize;
        }
        let mut i = INITIAL_SIZE;
        while i < size {
            i *= 2;
        }
        i
    }

    /// One bounded unit of migration, skipped while safe iterators are
    /// registered.
    fn rehash_step(&mut self) {
        if self.iterators == 0 {
            self.rehash(1);
        }
    }

    /// Migrate up to `steps` non-empty buckets from the first table to
    /// the second. Returns true while the migration is still
    /// unfinished; on completion the second table becomes the first.
    pub fn rehash(&mut self, steps: usize) -> bool {
        if !self.is_rehashing() {
            return false;
        }
        for _ in 0..steps {
            if self.ht[0].used == 0 {
                self.ht.swap(0, 1);
                self.ht[1] = Table::empty();
                self.rehash_idx = -1;
                return false;
            }

            // used != 0 guarantees a non-empty bucket at or past
            // rehash_idx.
            let mut ridx = self.rehash_idx as usize;
            debug_assert!(ridx < self.ht[0].size());
            while self.ht[0].buckets[ridx].is_none() {
                ridx += 1;
            }

            let [ht0, ht1] = &mut self.ht;
            let mask = ht1.mask();
            let ops = &self.ops;
            let mut chain = ht0.buckets[ridx].take();
            while let Some(mut e) = chain {
                chain = e.next.take();
                let idx = (ops.hash(&e.key) as usize) & mask;
                e.next = ht1.buckets[idx].take();
                ht1.buckets[idx] = Some(e);
                ht0.used -= 1;
                ht1.used += 1;
            }
            self.rehash_idx = (ridx + 1) as isize;
        }
        true
    }

    /// Run 100-bucket rehash batches until done or the elapsed time
    /// exceeds `ms` milliseconds. Returns the number of batched steps.
    pub fn rehash_millis(&mut self, ms: u64) -> usize {
        let start = Instant::now();
        let mut rehashes = 0;
        while self.rehash(100) {
            rehashes += 100;
            if start.elapsed().as_millis() as u64 > ms {
                break;
            }
        }
        rehashes
    }

    /// Ensure capacity for `size` entries, rounded up to a power of
    /// two. The first call installs the initial table; later calls
    /// install a second table and start an incremental rehash.
    pub fn expand(&mut self, size: usize) -> Result<(), ExpandError> {
        if self.is_rehashing() {
            return Err(ExpandError::RehashInProgress);
        }
        if self.ht[0].used > size {
            return Err(ExpandError::TooSmall);
        }

        let table = Table::with_size(Self::next_power(size));
        if self.ht[0].size() == 0 {
            // First materialization: not really a rehash.
            self.ht[0] = table;
            return Ok(());
        }
        self.ht[1] = table;
        self.rehash_idx = 0;
        Ok(())
    }

    /// Shrink (or grow) to the smallest power of two holding the
    /// current entries with a load factor near 1.
    pub fn resize(&mut self) -> Result<(), ExpandError> {
        if !can_resize() {
            return Err(ExpandError::ResizeDisabled);
        }
        if self.is_rehashing() {
            return Err(ExpandError::RehashInProgress);
        }
        let minimal = self.ht[0].used.max(INITIAL_SIZE);
        self.expand(minimal)
    }

    fn expand_if_needed(&mut self) {
        if self.is_rehashing() {
            return;
        }
        if self.ht[0].size() == 0 {
            let _ = self.expand(INITIAL_SIZE);
            return;
        }
        let (used, size) = (self.ht[0].used, self.ht[0].size());
        if used >= size && (can_resize() || used / size > FORCE_RESIZE_RATIO) {
            let _ = self.expand(used.max(size) * 2);
        }
    }

    /// Locate `key`: which sub-table and how deep in its chain.
    fn locate_pos(&self, h: u32, key: &T::Key) -> Option<(usize, usize)> {
        let tables = if self.is_rehashing() { 2 } else { 1 };
        for t in 0..tables {
            if self.ht[t].size() == 0 {
                continue;
            }
            let idx = (h as usize) & self.ht[t].mask();
            let mut e = self.ht[t].buckets[idx].as_deref();
            let mut pos = 0;
            while let Some(entry) = e {
                if self.ops.key_eq(&entry.key, key) {
                    return Some((t, pos));
                }
                e = entry.next.as_deref();
                pos += 1;
            }
        }
        None
    }

    fn chain_nth(bucket: &Bucket<T>, n: usize) -> Option<&Entry<T>> {
        let mut cur = bucket.as_deref();
        for _ in 0..n {
            cur = cur?.next.as_deref();
        }
        cur
    }

    fn chain_nth_mut(bucket: &mut Bucket<T>, n: usize) -> Option<&mut Entry<T>> {
        let mut cur = bucket.as_deref_mut();
        for _ in 0..n {
            cur = cur?.next.as_deref_mut();
        }
        cur
    }

    fn lookup_mut(&mut self, key: &T::Key) -> Option<&mut Entry<T>> {
        let h = self.ops.hash(key);
        let (t, pos) = self.locate_pos(h, key)?;
        let idx = (h as usize) & self.ht[t].mask();
        Self::chain_nth_mut(&mut self.ht[t].buckets[idx], pos)
    }

    fn dispose_val(&self, val: Value<T::Val>) {
        if let Value::Val(v) = val {
            self.ops.free_val(v);
        }
    }

    /// Shared insertion path; new entries land in the second table
    /// while a rehash runs so migrated buckets never regrow.
    fn add_entry(&mut self, key: T::Key, val: Option<T::Val>) -> Result<&mut Entry<T>, InsertError> {
        if self.is_rehashing() {
            self.rehash_step();
        }
        self.expand_if_needed();

        let h = self.ops.hash(&key);
        if self.locate_pos(h, &key).is_some() {
            self.ops.free_key(key);
            if let Some(v) = val {
                self.ops.free_val(v);
            }
            return Err(InsertError::DuplicateKey);
        }

        let t = if self.is_rehashing() { 1 } else { 0 };
        let idx = (h as usize) & self.ht[t].mask();
        let key = self.ops.dup_key(key);
        let val = match val {
            Some(v) => Value::Val(self.ops.dup_val(v)),
            None => Value::Unsigned(0),
        };
        let entry = Box::new(Entry {
            key,
            val,
            next: self.ht[t].buckets[idx].take(),
        });
        self.ht[t].buckets[idx] = Some(entry);
        self.ht[t].used += 1;
        Ok(self.ht[t].buckets[idx]
            .as_deref_mut()
            .expect("entry was linked at this bucket just above"))
    }

    /// Insert a fresh key/value pair. Fails if the key exists; the
    /// rejected pair is released through the descriptor hooks.
    pub fn insert(&mut self, key: T::Key, val: T::Val) -> Result<(), InsertError> {
        self.add_entry(key, Some(val)).map(|_| ())
    }

    /// Insert a fresh key and hand back its entry with the value slot
    /// left at `Unsigned(0)`, for callers that store bare integers:
    ///
    /// ```ignore
    /// dict.insert_raw(key)?.set_signed(1000);
    /// ```
    pub fn insert_raw(&mut self, key: T::Key) -> Result<&mut Entry<T>, InsertError> {
        self.add_entry(key, None)
    }

    /// Insert, or update the value of an existing key. Returns true if
    /// the key was fresh. The new value is installed before the old
    /// one is released, so a reference-counted payload shared between
    /// the two survives the swap.
    pub fn replace(&mut self, key: T::Key, val: T::Val) -> bool {
        if self.find(&key).is_none() {
            if self.add_entry(key, Some(val)).is_err() {
                unreachable!("insert after a missed lookup cannot collide");
            }
            return true;
        }
        let new_val = Value::Val(self.ops.dup_val(val));
        let entry = self.lookup_mut(&key).expect("entry located just above");
        let old = mem::replace(&mut entry.val, new_val);
        self.dispose_val(old);
        self.ops.free_key(key);
        false
    }

    /// The entry for `key`, inserting it first if absent. Never fails.
    pub fn replace_raw(&mut self, key: T::Key) -> &mut Entry<T> {
        let h = self.ops.hash(&key);
        if self.is_rehashing() {
            self.rehash_step();
        }
        if let Some((t, pos)) = self.locate_pos(h, &key) {
            // Existing entry keeps its stored key; the probe key is
            // surplus. The hook cannot reach the table, so the located
            // position stays valid across the call.
            self.ops.free_key(key);
            let idx = (h as usize) & self.ht[t].mask();
            return Self::chain_nth_mut(&mut self.ht[t].buckets[idx], pos)
                .expect("entry located just above");
        }
        match self.add_entry(key, None) {
            Ok(entry) => entry,
            Err(_) => unreachable!("lookup above reported the key absent"),
        }
    }

    /// The entry for `key`, if present. Advances the rehash.
    pub fn find(&mut self, key: &T::Key) -> Option<&Entry<T>> {
        if self.ht[0].size() == 0 {
            return None;
        }
        if self.is_rehashing() {
            self.rehash_step();
        }
        let h = self.ops.hash(key);
        let (t, pos) = self.locate_pos(h, key)?;
        let idx = (h as usize) & self.ht[t].mask();
        Self::chain_nth(&self.ht[t].buckets[idx], pos)
    }

    /// The payload value for `key`, if the key is present and its slot
    /// holds one.
    pub fn fetch_value(&mut self, key: &T::Key) -> Option<&T::Val> {
        self.find(key).and_then(|e| e.value())
    }

    fn unlink_in(ops: &T, table: &mut Table<T>, idx: usize, key: &T::Key) -> Option<Box<Entry<T>>> {
        let mut cur = &mut table.buckets[idx];
        while cur.as_ref().map_or(false, |e| !ops.key_eq(&e.key, key)) {
            cur = &mut cur.as_mut().expect("loop condition checked Some").next;
        }
        let mut e = cur.take()?;
        *cur = e.next.take();
        table.used -= 1;
        Some(e)
    }

    fn unlink_entry(&mut self, key: &T::Key) -> Option<Box<Entry<T>>> {
        if self.ht[0].size() == 0 {
            return None;
        }
        if self.is_rehashing() {
            self.rehash_step();
        }
        let h = self.ops.hash(key);
        let tables = if self.is_rehashing() { 2 } else { 1 };
        for t in 0..tables {
            if self.ht[t].size() == 0 {
                continue;
            }
            let idx = (h as usize) & self.ht[t].mask();
            if let Some(e) = Self::unlink_in(&self.ops, &mut self.ht[t], idx, key) {
                return Some(e);
            }
        }
        None
    }

    /// Unlink `key` and release its key and value through the
    /// descriptor hooks. Returns false if the key was absent.
    pub fn remove(&mut self, key: &T::Key) -> bool {
        match self.unlink_entry(key) {
            Some(boxed) => {
                let Entry { key, val, next: _ } = *boxed;
                self.ops.free_key(key);
                self.dispose_val(val);
                true
            }
            None => false,
        }
    }

    /// Unlink `key` and hand its contents back to the caller instead
    /// of running the release hooks.
    pub fn take(&mut self, key: &T::Key) -> Option<(T::Key, Value<T::Val>)> {
        self.unlink_entry(key).map(|boxed| {
            let Entry { key, val, next: _ } = *boxed;
            (key, val)
        })
    }

    /// A bucket-uniform random entry (chain position uniform within
    /// the bucket). Short chains are slightly overrepresented, which
    /// is fine for the approximate sampling this backs.
    pub fn random_entry<R: RngCore>(&mut self, rng: &mut R) -> Option<&Entry<T>> {
        if self.len() == 0 {
            return None;
        }
        if self.is_rehashing() {
            self.rehash_step();
        }
        let (t, idx) = if self.is_rehashing() {
            loop {
                let total = (self.ht[0].size() + self.ht[1].size()) as u64;
                let h = (rng.next_u64() % total) as usize;
                let (t, idx) = if h >= self.ht[0].size() {
                    (1, h - self.ht[0].size())
                } else {
                    (0, h)
                };
                if self.ht[t].buckets[idx].is_some() {
                    break (t, idx);
                }
            }
        } else {
            loop {
                let idx = (rng.next_u64() as usize) & self.ht[0].mask();
                if self.ht[0].buckets[idx].is_some() {
                    break (0, idx);
                }
            }
        };

        let mut chain_len = 0;
        let mut e = self.ht[t].buckets[idx].as_deref();
        while let Some(entry) = e {
            chain_len += 1;
            e = entry.next.as_deref();
        }
        let pick = (rng.next_u64() % chain_len as u64) as usize;
        Self::chain_nth(&self.ht[t].buckets[idx], pick)
    }

    /// Borrowing iterator over every entry. The exclusive alternative
    /// for mutation-during-scan is [`Dict::safe_iter`].
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            d: self,
            table: 0,
            index: 0,
            entry: None,
        }
    }

    /// A detached safe-iteration cursor. While the cursor is
    /// registered (from its first `next_entry` until `release`),
    /// rehash steps stall, freezing bucket layout so the caller may
    /// interleave inserts, finds, and deletes with the scan.
    pub fn safe_iter(&self) -> SafeIter<T> {
        SafeIter {
            table: 0,
            index: -1,
            next_addr: None,
            registered: false,
        }
    }

    fn clear_table(ops: &T, table: &mut Table<T>) {
        for bucket in table.buckets.iter_mut() {
            let mut chain = bucket.take();
            while let Some(boxed) = chain {
                let Entry { key, val, next } = *boxed;
                chain = next;
                ops.free_key(key);
                if let Value::Val(v) = val {
                    ops.free_val(v);
                }
            }
        }
        table.buckets = Vec::new();
        table.used = 0;
    }

    /// Destroy every entry through the descriptor hooks and return the
    /// dictionary to its freshly created state.
    pub fn clear(&mut self) {
        let Dict { ops, ht, .. } = self;
        Self::clear_table(ops, &mut ht[0]);
        Self::clear_table(ops, &mut ht[1]);
        self.rehash_idx = -1;
        self.iterators = 0;
    }
}

impl<T: DictType> Drop for Dict<T> {
    fn drop(&mut self) {
        let Dict { ops, ht, .. } = self;
        Self::clear_table(ops, &mut ht[0]);
        Self::clear_table(ops, &mut ht[1]);
    }
}

/// Borrowing iterator over a dictionary's entries in bucket order,
/// covering both sub-tables while a rehash is in flight.
pub struct Iter<'a, T: DictType> {
    d: &'a Dict<T>,
    table: usize,
    /// Next bucket to snap once the current chain is exhausted.
    index: usize,
    entry: Option<&'a Entry<T>>,
}

impl<'a, T: DictType> Iterator for Iter<'a, T> {
    type Item = &'a Entry<T>;

    fn next(&mut self) -> Option<&'a Entry<T>> {
        loop {
            if let Some(e) = self.entry {
                self.entry = e.next.as_deref();
                return Some(e);
            }
            let ht = &self.d.ht[self.table];
            if self.index >= ht.size() {
                if self.d.is_rehashing() && self.table == 0 {
                    self.table = 1;
                    self.index = 0;
                    continue;
                }
                return None;
            }
            self.entry = ht.buckets[self.index].as_deref();
            self.index += 1;
        }
    }
}

/// Safe-iteration cursor; see [`Dict::safe_iter`].
///
/// The cursor holds no borrow of the dictionary: every call takes the
/// dictionary again, so mutation between calls is ordinary borrowing.
/// It remembers the upcoming entry by address only and re-walks the
/// current bucket to find it, which makes deleting the entry it just
/// yielded safe; deleting the *upcoming* entry is detected and panics.
///
/// A cursor that observed at least one entry-table state must be
/// returned with [`SafeIter::release`]; dropping it registered panics,
/// since leaking the registration would stall rehashing forever.
pub struct SafeIter<T: DictType> {
    table: usize,
    /// Bucket index of the scheduled entry; `-1` before the first
    /// advance.
    index: isize,
    /// Address of the next entry to yield, in bucket `index` of
    /// `table`. Compared, never dereferenced.
    next_addr: Option<*const Entry<T>>,
    registered: bool,
}

impl<T: DictType> SafeIter<T> {
    /// Find the chain entry at `addr` by address comparison alone; the
    /// pointer is never dereferenced, so a stale address is a miss, not
    /// undefined behavior.
    fn find_by_addr(bucket: &mut Bucket<T>, addr: *const Entry<T>) -> Option<&mut Entry<T>> {
        let mut cur = bucket.as_deref_mut();
        while let Some(e) = cur {
            let p: *const Entry<T> = &*e;
            if core::ptr::eq(p, addr) {
                return Some(e);
            }
            cur = e.next.as_deref_mut();
        }
        None
    }

    /// Yield the next entry, advancing across buckets and, mid-rehash,
    /// from the first sub-table into the second. The returned borrow
    /// ends before the caller's next dictionary operation, so inserts
    /// and deletes may be interleaved freely — except for deleting the
    /// entry this cursor has already scheduled, which panics.
    pub fn next_entry<'a>(&mut self, d: &'a mut Dict<T>) -> Option<&'a mut Entry<T>> {
        loop {
            if let Some(addr) = self.next_addr.take() {
                let idx = self.index as usize;
                let found = if idx < d.ht[self.table].size() {
                    Self::find_by_addr(&mut d.ht[self.table].buckets[idx], addr)
                } else {
                    None
                };
                match found {
                    Some(e) => {
                        self.next_addr = e.next.as_deref().map(|n| n as *const Entry<T>);
                        return Some(e);
                    }
                    None => panic!("entry scheduled for safe iteration was removed"),
                }
            }

            if self.table == 0 && self.index == -1 && !self.registered {
                d.iterators += 1;
                self.registered = true;
            }
            self.index += 1;
            if self.index >= d.ht[self.table].size() as isize {
                if d.is_rehashing() && self.table == 0 {
                    self.table = 1;
                    self.index = 0;
                } else {
                    return None;
                }
            }
            let idx = self.index as usize;
            if idx < d.ht[self.table].size() {
                self.next_addr = d.ht[self.table].buckets[idx]
                    .as_deref()
                    .map(|e| e as *const Entry<T>);
            }
        }
    }

    /// Deregister from the dictionary. Must be called on every cursor
    /// that yielded or attempted to yield entries.
    pub fn release(mut self, d: &mut Dict<T>) {
        if self.registered {
            // Saturating: `clear` zeroes the count even with cursors
            // outstanding, mirroring the reset semantics of emptying.
            d.iterators = d.iterators.saturating_sub(1);
            self.registered = false;
        }
    }
}

impl<T: DictType> Drop for SafeIter<T> {
    fn drop(&mut self) {
        // Fail fast on leaked registrations instead of silently
        // stalling every future rehash step.
        if self.registered {
            panic!("safe iterator dropped without SafeIter::release");
        }
    }
}

/// `ByteString`-keyed configuration hashing keys as raw bytes.
pub struct BytesKeyed<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> BytesKeyed<V> {
    pub const fn new() -> Self {
        BytesKeyed {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for BytesKeyed<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DictType for BytesKeyed<V> {
    type Key = ByteString;
    type Val = V;

    fn hash(&self, key: &ByteString) -> u32 {
        bytes_hash(key)
    }

    fn key_eq(&self, a: &ByteString, b: &ByteString) -> bool {
        a == b
    }
}

/// `ByteString`-keyed configuration that folds ASCII case in both the
/// hash and the equality.
pub struct CaseBytesKeyed<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> CaseBytesKeyed<V> {
    pub const fn new() -> Self {
        CaseBytesKeyed {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for CaseBytesKeyed<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DictType for CaseBytesKeyed<V> {
    type Key = ByteString;
    type Val = V;

    fn hash(&self, key: &ByteString) -> u32 {
        case_hash(key)
    }

    fn key_eq(&self, a: &ByteString, b: &ByteString) -> bool {
        a.eq_ignore_ascii_case(b)
    }
}

/// Integer-keyed configuration using the 32-bit mix.
pub struct IntKeyed<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> IntKeyed<V> {
    pub const fn new() -> Self {
        IntKeyed {
            _marker: PhantomData,
        }
    }
}

impl<V> Default for IntKeyed<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> DictType for IntKeyed<V> {
    type Key = u32;
    type Val = V;

    fn hash(&self, key: &u32) -> u32 {
        int_hash(*key)
    }

    fn key_eq(&self, a: &u32, b: &u32) -> bool {
        a == b
    }
}
