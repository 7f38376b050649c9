//! The keyspace: owned keys bound to value views into the arena.

use std::collections::HashMap;
use crate::arena::{Arena, ValueRef};

/// Keys are stored as owned byte strings because the receive-buffer
/// bytes backing them are overwritten on the next read. Values live in
/// the arena; the map only keeps views. A SET over an existing key
/// rebinds it and leaves the old bytes allocated but unreferenced.
pub struct Db {
    dict: HashMap<Vec<u8>, ValueRef>,
    arena: Arena,
}

impl Db {
    pub fn with_arena_capacity(cap: usize) -> Db {
        Db { dict: HashMap::new(), arena: Arena::with_capacity(cap) }
    }

    /// Copy `value` into the arena and bind `key` to the new range.
    /// None means the arena is exhausted; the keyspace is untouched.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Option<()> {
        let v = self.arena.store(value)?;
        self.dict.insert(key.to_vec(), v);
        Some(())
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.dict.get(key).map(|v| self.arena.view(*v))
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Drop every key and reclaim the arena in one stroke. The two go
    /// together: value views must never outlive an arena reset.
    pub fn clear(&mut self) -> usize {
        let removed = self.dict.len();
        self.dict.clear();
        self.arena.reset();
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_after_set() {
        let mut db = Db::with_arena_capacity(128);
        db.set(b"key", b"val").unwrap();
        assert_eq!(db.get(b"key"), Some(&b"val"[..]));
        assert_eq!(db.get(b"nope"), None);
    }

    #[test]
    fn overwrite_rebinds_the_key() {
        let mut db = Db::with_arena_capacity(128);
        db.set(b"k", b"a").unwrap();
        db.set(b"k", b"bb").unwrap();
        assert_eq!(db.get(b"k"), Some(&b"bb"[..]));
        assert_eq!(db.len(), 1);
        // The first value's byte stays allocated but unreferenced.
        assert_eq!(db.arena().used(), 3);
    }

    #[test]
    fn exhausted_arena_fails_the_set_only() {
        let mut db = Db::with_arena_capacity(4);
        db.set(b"a", b"1234").unwrap();
        assert!(db.set(b"b", b"5").is_none());
        assert_eq!(db.get(b"b"), None);
        assert_eq!(db.get(b"a"), Some(&b"1234"[..]));
    }

    #[test]
    fn clear_empties_keyspace_and_arena() {
        let mut db = Db::with_arena_capacity(16);
        db.set(b"a", b"xx").unwrap();
        db.set(b"b", b"yy").unwrap();
        assert_eq!(db.clear(), 2);
        assert!(db.is_empty());
        assert_eq!(db.arena().used(), 0);
        db.set(b"c", b"zz").unwrap();
        assert_eq!(db.get(b"c"), Some(&b"zz"[..]));
    }
}
