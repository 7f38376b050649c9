//! Linear bump allocator backing stored values.
//!
//! The region is reserved once at startup and values are placed one
//! after another by advancing a cursor. There is no per-object free and
//! no per-allocation metadata; the only way to reclaim space is a bulk
//! reset, which invalidates every range handed out so far.

pub const DEFAULT_ARENA_CAP: usize = 64 * 1024 * 1024;

/// An (offset, length) view of a range inside the arena. Carries no
/// ownership; the range stays valid until the arena is reset.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ValueRef {
    off: usize,
    len: usize,
}

impl ValueRef {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct Arena {
    buf: Box<[u8]>,
    off: usize,
}

impl Arena {
    pub fn with_capacity(cap: usize) -> Arena {
        Arena { buf: vec![0u8; cap].into_boxed_slice(), off: 0 }
    }

    /// Reserve `n` bytes. On success the returned offset names a range
    /// disjoint from every previously returned live range and the
    /// cursor advances by exactly `n`; on exhaustion the cursor is
    /// left untouched.
    pub fn alloc(&mut self, n: usize) -> Option<usize> {
        if self.buf.len() - self.off < n {
            return None;
        }
        let at = self.off;
        self.off += n;
        Some(at)
    }

    /// `alloc` with the cursor rounded up to `align` first. `align`
    /// must be a power of two.
    pub fn alloc_aligned(&mut self, n: usize, align: usize) -> Option<usize> {
        debug_assert!(align.is_power_of_two());
        let at = self.off.checked_add(align - 1)? & !(align - 1);
        if at > self.buf.len() || self.buf.len() - at < n {
            return None;
        }
        self.off = at + n;
        Some(at)
    }

    /// Reserve space for `bytes` and copy them in. This is the SET
    /// path's one-way flow: the source lives in a receive buffer that
    /// will be overwritten by the next read, so the bytes must land in
    /// the arena before a view of them can be kept.
    pub fn store(&mut self, bytes: &[u8]) -> Option<ValueRef> {
        let off = self.alloc(bytes.len())?;
        self.buf[off..off + bytes.len()].copy_from_slice(bytes);
        Some(ValueRef { off, len: bytes.len() })
    }

    /// The bytes a view refers to. The caller is responsible for only
    /// presenting views minted by this arena since the last reset.
    pub fn view(&self, v: ValueRef) -> &[u8] {
        &self.buf[v.off..v.off + v.len]
    }

    /// Move the cursor back to zero. Every previously returned offset
    /// and view is invalid from here on; a reset without a matching
    /// keyspace clear must not happen.
    pub fn reset(&mut self) {
        self.off = 0;
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.off
    }

    pub fn used(&self) -> usize {
        self.off
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_is_contiguous() {
        let mut arena = Arena::with_capacity(64);
        let a1 = arena.alloc(10).unwrap();
        let a2 = arena.alloc(7).unwrap();
        assert_eq!(a2, a1 + 10);
        assert_eq!(arena.used(), 17);
        assert_eq!(arena.remaining(), 47);
    }

    #[test]
    fn exhaustion_leaves_cursor_unchanged() {
        let mut arena = Arena::with_capacity(16);
        assert!(arena.alloc(12).is_some());
        assert!(arena.alloc(5).is_none());
        assert_eq!(arena.used(), 12);
        assert!(arena.alloc(4).is_some());
    }

    #[test]
    fn full_cycle_after_reset() {
        let mut arena = Arena::with_capacity(32);
        assert!(arena.alloc(32).is_some());
        assert!(arena.alloc(1).is_none());
        arena.reset();
        assert!(arena.alloc(32).is_some());
    }

    #[test]
    fn store_and_view() {
        let mut arena = Arena::with_capacity(32);
        let v1 = arena.store(b"hello").unwrap();
        let v2 = arena.store(b"world!").unwrap();
        assert_eq!(arena.view(v1), b"hello");
        assert_eq!(arena.view(v2), b"world!");
    }

    #[test]
    fn store_empty_value() {
        let mut arena = Arena::with_capacity(4);
        assert!(arena.alloc(4).is_some());
        let v = arena.store(b"").unwrap();
        assert!(v.is_empty());
        assert_eq!(arena.view(v), b"");
    }

    #[test]
    fn aligned_alloc_rounds_up() {
        let mut arena = Arena::with_capacity(64);
        arena.alloc(3).unwrap();
        let at = arena.alloc_aligned(8, 8).unwrap();
        assert_eq!(at % 8, 0);
        assert_eq!(at, 8);
        assert_eq!(arena.used(), 16);
    }
}
