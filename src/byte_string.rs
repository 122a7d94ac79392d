//! Binary-safe dynamic byte string.
//!
//! `ByteString` keeps an explicit length, spare capacity for amortized
//! appends, and a NUL byte one past the last data byte, so the buffer
//! doubles as a C-style string whenever the data holds no embedded
//! NULs. Appends grow geometrically up to a 1 MiB ceiling and linearly
//! past it, so huge strings never double their footprint for one
//! concatenation.
//!
//! The companions `split`, `split_args`, and `cat_repr` form the quoted
//! token surface: `split_args` parses exactly what `cat_repr` prints.

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;

/// Above this size, growth switches from doubling to +1 MiB steps.
const MAX_PREALLOC: usize = 1024 * 1024;

/// A growable, binary-safe byte string with O(1) length and a trailing
/// NUL one past the data.
///
/// The buffer window is `len + avail + 1` initialized bytes; `avail`
/// bytes of spare sit between the data and the terminator slot, ready
/// for the reserve → foreign write → [`incr_len`](ByteString::incr_len)
/// idiom.
pub struct ByteString {
    /// Full window: data, spare, terminator. `buf[len] == 0` always.
    buf: Vec<u8>,
    len: usize,
}

impl ByteString {
    /// New string holding a copy of `init`, with no spare capacity.
    pub fn new(init: &[u8]) -> ByteString {
        let mut buf = Vec::with_capacity(init.len() + 1);
        buf.extend_from_slice(init);
        buf.push(0);
        ByteString {
            buf,
            len: init.len(),
        }
    }

    /// New empty string.
    pub fn empty() -> ByteString {
        ByteString::new(b"")
    }

    /// Decimal rendering of a 64-bit signed integer.
    pub fn from_i64(value: i64) -> ByteString {
        let mut digits = [0u8; 21];
        let mut v = value.unsigned_abs();
        let mut i = digits.len();
        loop {
            i -= 1;
            digits[i] = b'0' + (v % 10) as u8;
            v /= 10;
            if v == 0 {
                break;
            }
        }
        if value < 0 {
            i -= 1;
            digits[i] = b'-';
        }
        ByteString::new(&digits[i..])
    }

    /// Length of the data in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Spare bytes available before the next reallocation.
    pub fn avail(&self) -> usize {
        self.buf.len() - self.len - 1
    }

    /// Total bytes of the buffer window: data, spare, and terminator.
    pub fn allocated(&self) -> usize {
        self.buf.len()
    }

    /// Data bytes, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Mutable view of the data bytes. The terminator stays in place;
    /// writing NULs into the data is fine (the string is binary-safe),
    /// and [`update_len`](ByteString::update_len) re-syncs the length
    /// for callers that use NULs as terminators.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    /// The writable spare region past the data. Fill some prefix of it,
    /// then commit with [`incr_len`](ByteString::incr_len).
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let end = self.buf.len() - 1;
        &mut self.buf[self.len..end]
    }

    /// Grow the window to `total` bytes, zero-filling the new region.
    fn grow_window(&mut self, total: usize) {
        self.buf.reserve_exact(total - self.buf.len());
        self.buf.resize(total, 0);
    }

    /// Ensure `avail() >= add`, reallocating if necessary. Data and
    /// length are unchanged.
    pub fn make_room(&mut self, add: usize) {
        if self.avail() >= add {
            return;
        }
        let mut newlen = self.len + add;
        if newlen < MAX_PREALLOC {
            newlen *= 2;
        } else {
            newlen += MAX_PREALLOC;
        }
        self.grow_window(newlen + 1);
    }

    /// Move `delta` bytes between the spare and the data (negative
    /// right-trims), then reassert the terminator. Panics if a positive
    /// `delta` exceeds `avail()` or a negative one exceeds `len()`.
    pub fn incr_len(&mut self, delta: isize) {
        if delta >= 0 {
            let d = delta as usize;
            assert!(d <= self.avail(), "incr_len past available space");
            self.len += d;
        } else {
            let d = delta.unsigned_abs();
            assert!(d <= self.len, "incr_len below zero length");
            self.len -= d;
        }
        self.buf[self.len] = 0;
    }

    /// Append `t` to the string.
    pub fn cat(&mut self, t: &[u8]) {
        self.make_room(t.len());
        let start = self.len;
        self.buf[start..start + t.len()].copy_from_slice(t);
        self.len += t.len();
        self.buf[self.len] = 0;
    }

    /// Replace the contents with `t`.
    pub fn copy_from(&mut self, t: &[u8]) {
        if self.buf.len() - 1 < t.len() {
            self.make_room(t.len() - self.len);
        }
        self.buf[..t.len()].copy_from_slice(t);
        self.len = t.len();
        self.buf[self.len] = 0;
    }

    /// Append formatted text; pairs with `format_args!`. `write!` via
    /// the [`fmt::Write`] impl does the same.
    pub fn cat_format(&mut self, args: fmt::Arguments<'_>) {
        fmt::Write::write_fmt(self, args).expect("ByteString formatting is infallible");
    }

    /// Remove leading and trailing bytes that appear in `cset`.
    pub fn trim(&mut self, cset: &[u8]) {
        let data = &self.buf[..self.len];
        let start = data
            .iter()
            .position(|b| !cset.contains(b))
            .unwrap_or(self.len);
        let end = data.iter().rposition(|b| !cset.contains(b)).map_or(0, |i| i + 1);
        let newlen = end.saturating_sub(start);
        if start > 0 && newlen > 0 {
            self.buf.copy_within(start..end, 0);
        }
        self.len = newlen;
        self.buf[newlen] = 0;
    }

    /// Retain the inclusive byte slice `[start, end]`. Negative indices
    /// count from the end (`-1` is the last byte); out-of-range windows
    /// collapse to the empty string.
    pub fn range(&mut self, start: isize, end: isize) {
        let len = self.len as isize;
        if len == 0 {
            return;
        }
        let mut start = if start < 0 { (len + start).max(0) } else { start };
        let mut end = if end < 0 { (len + end).max(0) } else { end };
        let mut newlen = if start > end { 0 } else { end - start + 1 };
        if newlen != 0 {
            if start >= len {
                newlen = 0;
            } else if end >= len {
                end = len - 1;
                newlen = if start > end { 0 } else { end - start + 1 };
            }
        } else {
            start = 0;
        }
        let (start, newlen) = (start as usize, newlen as usize);
        if start != 0 && newlen != 0 {
            self.buf.copy_within(start..start + newlen, 0);
        }
        self.len = newlen;
        self.buf[newlen] = 0;
    }

    /// ASCII-lowercase the data in place.
    pub fn make_lowercase(&mut self) {
        let len = self.len;
        self.buf[..len].make_ascii_lowercase();
    }

    /// ASCII-uppercase the data in place.
    pub fn make_uppercase(&mut self) {
        let len = self.len;
        self.buf[..len].make_ascii_uppercase();
    }

    /// Set the length to zero, keeping the allocation.
    pub fn clear(&mut self) {
        self.len = 0;
        self.buf[0] = 0;
    }

    /// Recompute the length as the distance to the first NUL, for use
    /// after a foreign writer treated the buffer as a C string.
    pub fn update_len(&mut self) {
        let real = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.buf.len() - 1);
        self.len = real;
        self.buf[real] = 0;
    }

    /// Drop the spare so `avail()` is zero. The next append reallocates.
    pub fn shrink_to_fit(&mut self) {
        self.buf.truncate(self.len + 1);
        self.buf.shrink_to_fit();
    }

    /// Grow the data to at least `n` bytes, zero-filling everything the
    /// growth exposes.
    pub fn grow_zero(&mut self, n: usize) {
        if n <= self.len {
            return;
        }
        self.make_room(n - self.len);
        // The spare may hold stale bytes from earlier contents.
        for b in &mut self.buf[self.len..=n] {
            *b = 0;
        }
        self.len = n;
    }

    /// Substitute every occurrence of `from[i]` in the data with
    /// `to[i]`. Pairs past the shorter of the two sets are ignored.
    pub fn map_chars(&mut self, from: &[u8], to: &[u8]) {
        let pairs = from.len().min(to.len());
        for b in &mut self.buf[..self.len] {
            for i in 0..pairs {
                if *b == from[i] {
                    *b = to[i];
                    break;
                }
            }
        }
    }

    /// Append a double-quoted rendering of `p` with C-style escapes:
    /// `\n \r \t \a \b`, `\"`, `\\`, and `\xHH` for bytes outside
    /// printable ASCII. [`split_args`] parses this format back.
    pub fn cat_repr(&mut self, p: &[u8]) {
        self.cat(b"\"");
        for &b in p {
            match b {
                b'\\' | b'"' => self.cat(&[b'\\', b]),
                b'\n' => self.cat(b"\\n"),
                b'\r' => self.cat(b"\\r"),
                b'\t' => self.cat(b"\\t"),
                0x07 => self.cat(b"\\a"),
                0x08 => self.cat(b"\\b"),
                b' '..=b'~' => self.cat(&[b]),
                _ => self.cat_format(format_args!("\\x{:02x}", b)),
            }
        }
        self.cat(b"\"");
    }
}

impl Clone for ByteString {
    fn clone(&self) -> Self {
        ByteString::new(self.as_bytes())
    }
}

impl Deref for ByteString {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<&[u8]> for ByteString {
    fn from(bytes: &[u8]) -> Self {
        ByteString::new(bytes)
    }
}

impl From<&str> for ByteString {
    fn from(s: &str) -> Self {
        ByteString::new(s.as_bytes())
    }
}

impl PartialEq for ByteString {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for ByteString {}

impl PartialOrd for ByteString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByteString {
    /// Lexicographic over bytes; an equal prefix is broken by length.
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl Hash for ByteString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Write for ByteString {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.cat(s.as_bytes());
        Ok(())
    }
}

/// Split `s` on every non-overlapping occurrence of the multi-byte
/// separator. Empty fields are preserved; an empty input yields an
/// empty vec, as does an empty separator.
pub fn split(s: &[u8], sep: &[u8]) -> Vec<ByteString> {
    let mut tokens = Vec::new();
    if sep.is_empty() || s.is_empty() {
        return tokens;
    }
    let mut start = 0;
    let mut j = 0;
    while j + sep.len() <= s.len() {
        if &s[j..j + sep.len()] == sep {
            tokens.push(ByteString::new(&s[start..j]));
            start = j + sep.len();
            j += sep.len();
        } else {
            j += 1;
        }
    }
    tokens.push(ByteString::new(&s[start..]));
    tokens
}

fn is_space(b: u8) -> bool {
    // The separator class of the tokenizer; NUL terminates a token the
    // same way whitespace does.
    matches!(b, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r' | 0)
}

fn is_hex_digit(b: u8) -> bool {
    b.is_ascii_hexdigit()
}

fn hex_digit_to_int(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Split a line into REPL-style arguments: whitespace-separated tokens,
/// `"..."` with the `cat_repr` escape set (`\n \r \t \a \b`, `\xHH`,
/// `\"`, `\\`), and `'...'` with `\'` only. A closing quote must be
/// followed by whitespace or end of input.
///
/// Returns `None` on unbalanced quotes or a closing quote glued to the
/// next token; an empty line yields `Some(vec![])`.
pub fn split_args(line: &[u8]) -> Option<Vec<ByteString>> {
    let mut argv = Vec::new();
    let mut i = 0;
    loop {
        while i < line.len() && is_space(line[i]) {
            i += 1;
        }
        if i >= line.len() {
            return Some(argv);
        }

        let mut current = ByteString::empty();
        let mut inq = false; // inside "double quotes"
        let mut insq = false; // inside 'single quotes'
        loop {
            if inq {
                if i >= line.len() {
                    return None; // unterminated quotes
                }
                if line[i] == b'\\'
                    && i + 3 < line.len()
                    && line[i + 1] == b'x'
                    && is_hex_digit(line[i + 2])
                    && is_hex_digit(line[i + 3])
                {
                    let byte = hex_digit_to_int(line[i + 2]) * 16 + hex_digit_to_int(line[i + 3]);
                    current.cat(&[byte]);
                    i += 4;
                } else if line[i] == b'\\' && i + 1 < line.len() {
                    let c = match line[i + 1] {
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'b' => 0x08,
                        b'a' => 0x07,
                        other => other,
                    };
                    current.cat(&[c]);
                    i += 2;
                } else if line[i] == b'"' {
                    // Closing quote must be followed by a space or nothing.
                    if i + 1 < line.len() && !is_space(line[i + 1]) {
                        return None;
                    }
                    i += 1;
                    break;
                } else {
                    current.cat(&[line[i]]);
                    i += 1;
                }
            } else if insq {
                if i >= line.len() {
                    return None; // unterminated quotes
                }
                if line[i] == b'\\' && i + 1 < line.len() && line[i + 1] == b'\'' {
                    current.cat(b"'");
                    i += 2;
                } else if line[i] == b'\'' {
                    if i + 1 < line.len() && !is_space(line[i + 1]) {
                        return None;
                    }
                    i += 1;
                    break;
                } else {
                    current.cat(&[line[i]]);
                    i += 1;
                }
            } else {
                if i >= line.len() {
                    break;
                }
                match line[i] {
                    b' ' | b'\n' | b'\r' | b'\t' | 0 => {
                        i += 1;
                        break;
                    }
                    b'"' => {
                        inq = true;
                        i += 1;
                    }
                    b'\'' => {
                        insq = true;
                        i += 1;
                    }
                    other => {
                        current.cat(&[other]);
                        i += 1;
                    }
                }
            }
        }
        argv.push(current);
    }
}
