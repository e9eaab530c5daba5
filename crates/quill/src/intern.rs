//! String interning for identifiers and string literals.
//!
//! The interner stores each unique string once and hands out a stable
//! [`StrId`] for it, so the compiler and VM can compare names by id instead
//! of by content. Interned strings live as long as the interner itself.
//!
//! The lookup is keyed on string *content*, not on the content's hash: two
//! different strings that happen to collide under the hash function still
//! receive distinct ids. The hash map's own probing uses the hash purely as
//! a speed-up.
//!
//! Besides interned strings, the interner can hand out *transient* slots
//! for scratch strings that are built and discarded at runtime. Transients
//! are not deduplicated, are never returned by [`Interner::intern`], and
//! their slots are recycled through a free list once released.

use ahash::AHashMap;

/// Index into the interner's storage.
///
/// Uses `u32` to save space. Id 0 is reserved for the empty/anonymous
/// string, which is pre-interned when the interner is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StrId(u32);

impl StrId {
    /// The reserved id of the empty/anonymous string.
    pub const EMPTY: Self = Self(0);

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A stored string plus its interned/transient flag.
#[derive(Debug)]
struct Entry {
    text: String,
    interned: bool,
}

/// Owns every string used by the compiler and VM.
///
/// Not thread-safe: the interner is mutated during compilation and may be
/// extended by opcode handlers that construct new strings at runtime, all
/// on a single thread.
#[derive(Debug)]
pub struct Interner {
    /// Maps string content to its id for deduplication.
    map: AHashMap<String, StrId>,
    /// Storage for all entries, indexed by `StrId`. `None` marks a
    /// released transient slot awaiting reuse.
    entries: Vec<Option<Entry>>,
    /// Released transient slots available for reuse.
    free_transients: Vec<StrId>,
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl Interner {
    /// Creates an interner with the empty string pre-interned at id 0.
    #[must_use]
    pub fn new() -> Self {
        let mut interner = Self {
            map: AHashMap::new(),
            entries: Vec::new(),
            free_transients: Vec::new(),
        };
        let empty = interner.intern("");
        debug_assert_eq!(empty, StrId::EMPTY);
        interner
    }

    /// Interns a string, returning its canonical id.
    ///
    /// Calling this twice with the same content always returns the same id.
    pub fn intern(&mut self, s: &str) -> StrId {
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = StrId(self.entries.len().try_into().expect("StrId overflow"));
        self.entries.push(Some(Entry {
            text: s.to_owned(),
            interned: true,
        }));
        self.map.insert(s.to_owned(), id);
        id
    }

    /// Allocates a non-interned transient string.
    ///
    /// Transients are not deduplicated and must be released with
    /// [`Interner::free_transient`] once no longer needed. Their slots are
    /// recycled for later transients.
    pub fn alloc_transient(&mut self, s: String) -> StrId {
        if let Some(id) = self.free_transients.pop() {
            self.entries[id.index()] = Some(Entry { text: s, interned: false });
            id
        } else {
            let id = StrId(self.entries.len().try_into().expect("StrId overflow"));
            self.entries.push(Some(Entry { text: s, interned: false }));
            id
        }
    }

    /// Releases a transient string, making its slot reusable.
    ///
    /// # Panics
    ///
    /// Panics if the id refers to an interned string or an already-released
    /// slot: interned strings are owned by the interner for its whole
    /// lifetime and must never be freed individually.
    pub fn free_transient(&mut self, id: StrId) {
        let slot = self
            .entries
            .get_mut(id.index())
            .expect("Interner::free_transient: slot missing");
        let entry = slot.as_ref().expect("Interner::free_transient: slot already released");
        assert!(!entry.interned, "Interner::free_transient: id refers to an interned string");
        *slot = None;
        self.free_transients.push(id);
    }

    /// Looks up a string by its id.
    ///
    /// # Panics
    ///
    /// Panics if the id is invalid or refers to a released transient.
    #[inline]
    #[must_use]
    pub fn get_str(&self, id: StrId) -> &str {
        self.entries
            .get(id.index())
            .expect("Interner::get_str: slot missing")
            .as_ref()
            .expect("Interner::get_str: transient already released")
            .text
            .as_str()
    }

    /// Returns whether the id refers to an interned (canonical) string.
    #[must_use]
    pub fn is_interned(&self, id: StrId) -> bool {
        self.entries
            .get(id.index())
            .and_then(Option::as_ref)
            .is_some_and(|entry| entry.interned)
    }

    /// Returns the number of live entries (interned plus live transients).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() - self.free_transients.len()
    }

    /// Returns whether the interner holds no strings besides the reserved
    /// empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_identity() {
        let mut interner = Interner::new();
        let a = interner.intern("alpha");
        let b = interner.intern("alpha");
        let c = interner.intern("beta");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.get_str(a), "alpha");
    }

    #[test]
    fn empty_string_is_id_zero() {
        let mut interner = Interner::new();
        assert_eq!(interner.intern(""), StrId::EMPTY);
        assert_eq!(interner.get_str(StrId::EMPTY), "");
    }

    #[test]
    fn distinct_content_gets_distinct_ids() {
        // Content is the key: strings that would collide under any hash
        // still intern to distinct ids.
        let mut interner = Interner::new();
        let ids: Vec<_> = (0..256).map(|i| interner.intern(&format!("sym{i}"))).collect();
        let mut unique = ids.clone();
        unique.sort_by_key(|id| id.index());
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn transient_slots_are_recycled() {
        let mut interner = Interner::new();
        let t1 = interner.alloc_transient("scratch".to_owned());
        assert!(!interner.is_interned(t1));
        interner.free_transient(t1);
        let t2 = interner.alloc_transient("other".to_owned());
        assert_eq!(t1, t2);
        assert_eq!(interner.get_str(t2), "other");
    }

    #[test]
    #[should_panic(expected = "interned string")]
    fn freeing_interned_string_panics() {
        let mut interner = Interner::new();
        let id = interner.intern("keep");
        interner.free_transient(id);
    }
}
