//! rehashmap: the in-memory container substrate of a key-value store.
//!
//! Three layered pieces, leaves first:
//!
//! - [`TrackedAlloc`] — a `GlobalAlloc` wrapper keeping a process-wide
//!   counter of live allocated bytes, with a pluggable out-of-memory
//!   handler.
//! - [`ByteString`] — a binary-safe dynamic string with O(1) length,
//!   geometric preallocation capped at 1 MiB, and a quoted-token
//!   surface ([`cat_repr`](ByteString::cat_repr) / [`split_args`]).
//! - [`Dict`] — a chained hash table that grows and shrinks by
//!   *incremental* rehashing: no operation ever pays for a whole-table
//!   copy, and safe iterators freeze migration so scans tolerate
//!   interleaved mutation. Key/value semantics come from a [`DictType`]
//!   descriptor; stock configurations cover byte-string and integer
//!   keys.
//!
//! The crate is single-threaded cooperative: a dictionary or string is
//! owned by one logical thread of control, and work is bounded by
//! explicit budgets (rehash step counts, millisecond budgets) rather
//! than by suspension.

mod byte_string;
mod dict;
mod hash;
mod tracked_alloc;

pub use byte_string::{split, split_args, ByteString};
pub use dict::{
    disable_resize, enable_resize, BytesKeyed, CaseBytesKeyed, Dict, DictType, Entry, ExpandError,
    InsertError, IntKeyed, Iter, SafeIter, Value,
};
pub use hash::{bytes_hash, case_hash, hash_seed, identity_hash, int_hash, set_hash_seed};
pub use tracked_alloc::{set_oom_handler, used_memory, TrackedAlloc};
