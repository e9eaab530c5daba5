//! Arena storage for reference-counted value cells.
//!
//! Every [`ValueCell`] lives in a slot of the [`ValuePool`], addressed by a
//! stable [`ValueId`]. Slots carry a non-atomic refcount; when it reaches
//! zero the cell is destroyed exactly once, its payload's child references
//! are released recursively, and the slot joins a free list for reuse.
//!
//! The arena replaces per-object shared ownership: refcount bugs become
//! bounded integer mis-accounting caught by the accessors' assertions
//! rather than use-after-free.

use std::cell::Cell;

use crate::{
    intern::Interner,
    value::{ValueCell, ValueData, ValueKind, ValueStatus},
};

/// Stable index of a value cell inside the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(u32);

impl ValueId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct Slot {
    refcount: Cell<usize>,
    cell: ValueCell,
}

/// Owns every value cell created by the compiler and the VM.
#[derive(Debug, Default)]
pub struct ValuePool {
    slots: Vec<Option<Slot>>,
    free_list: Vec<ValueId>,
}

impl ValuePool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a cell with refcount 1, reusing a freed slot when one is
    /// available.
    pub fn alloc(&mut self, cell: ValueCell) -> ValueId {
        let slot = Slot {
            refcount: Cell::new(1),
            cell,
        };
        if let Some(id) = self.free_list.pop() {
            self.slots[id.index()] = Some(slot);
            id
        } else {
            let id = ValueId(self.slots.len().try_into().expect("ValueId overflow"));
            self.slots.push(Some(slot));
            id
        }
    }

    /// Increments a cell's refcount.
    ///
    /// Takes `&self`: the refcount uses interior mutability so read-side
    /// code can claim references without a mutable borrow of the pool.
    ///
    /// # Panics
    ///
    /// Panics if the id is invalid or the cell has already been freed.
    pub fn inc_ref(&self, id: ValueId) {
        let slot = self
            .slots
            .get(id.index())
            .expect("ValuePool::inc_ref: slot missing")
            .as_ref()
            .expect("ValuePool::inc_ref: cell already freed");
        slot.refcount.set(slot.refcount.get() + 1);
    }

    /// Decrements a cell's refcount, destroying the cell when it reaches
    /// zero. Destruction releases the payload's child references (vector
    /// entries, a temp's inner value, a callable's captured receiver)
    /// recursively.
    ///
    /// # Panics
    ///
    /// Panics if the id is invalid or the cell has already been freed.
    pub fn dec_ref(&mut self, id: ValueId) {
        let slot_ref = self
            .slots
            .get_mut(id.index())
            .expect("ValuePool::dec_ref: slot missing");
        let slot = slot_ref.as_mut().expect("ValuePool::dec_ref: cell already freed");
        let count = slot.refcount.get();
        debug_assert!(count > 0, "ValuePool::dec_ref: refcount underflow");
        if count > 1 {
            slot.refcount.set(count - 1);
            return;
        }
        let slot = slot_ref.take().expect("ValuePool::dec_ref: cell already freed");
        self.free_list.push(id);
        self.release_data(slot.cell.replace_data_for_drop());
    }

    /// Releases every child reference held by a detached payload.
    fn release_data(&mut self, data: ValueData) {
        match data {
            ValueData::Vector(children) => {
                for child in children {
                    self.dec_ref(child);
                }
            }
            ValueData::Ref(inner) => self.dec_ref(inner),
            ValueData::Callable(callable) => {
                if let Some(recv) = callable.recv {
                    self.dec_ref(recv);
                }
            }
            ValueData::None
            | ValueData::Int(_)
            | ValueData::Double(_)
            | ValueData::Bool(_)
            | ValueData::Str(_)
            | ValueData::User(_) => {}
        }
    }

    /// Duplicates a payload, claiming a new reference for every contained id.
    ///
    /// Use this whenever a payload is copied into a second owner (assignment,
    /// declaration initialisers, container element reads).
    #[must_use]
    pub fn clone_data(&self, data: &ValueData) -> ValueData {
        match data {
            ValueData::Vector(children) => {
                for &child in children {
                    self.inc_ref(child);
                }
                ValueData::Vector(children.clone())
            }
            ValueData::Ref(inner) => {
                self.inc_ref(*inner);
                ValueData::Ref(*inner)
            }
            ValueData::Callable(callable) => {
                if let Some(recv) = callable.recv {
                    self.inc_ref(recv);
                }
                ValueData::Callable(callable.clone())
            }
            simple => simple.clone(),
        }
    }

    /// Returns the cell for `id`.
    ///
    /// # Panics
    ///
    /// Panics if the id is invalid or the cell has already been freed.
    #[inline]
    #[must_use]
    pub fn get(&self, id: ValueId) -> &ValueCell {
        &self
            .slots
            .get(id.index())
            .expect("ValuePool::get: slot missing")
            .as_ref()
            .expect("ValuePool::get: cell already freed")
            .cell
    }

    /// Returns the cell for `id` mutably.
    ///
    /// # Panics
    ///
    /// Panics if the id is invalid or the cell has already been freed.
    #[inline]
    pub fn get_mut(&mut self, id: ValueId) -> &mut ValueCell {
        &mut self
            .slots
            .get_mut(id.index())
            .expect("ValuePool::get_mut: slot missing")
            .as_mut()
            .expect("ValuePool::get_mut: cell already freed")
            .cell
    }

    /// Returns a cell's current refcount.
    #[must_use]
    pub fn refcount(&self, id: ValueId) -> usize {
        self.slots
            .get(id.index())
            .expect("ValuePool::refcount: slot missing")
            .as_ref()
            .expect("ValuePool::refcount: cell already freed")
            .refcount
            .get()
    }

    /// Follows the temp-reference chain from `id` to the cell that actually
    /// holds a payload.
    #[must_use]
    pub fn resolve(&self, id: ValueId) -> ValueId {
        let mut current = id;
        loop {
            match self.get(current).data() {
                ValueData::Ref(inner) => current = *inner,
                _ => return current,
            }
        }
    }

    /// Stores `inner` as a temp cell's held value, releasing the previously
    /// held value if any. Ownership of one reference to `inner` transfers to
    /// the temp.
    pub fn set_temp_inner(&mut self, temp: ValueId, inner: ValueId) {
        let cell = self.get_mut(temp);
        debug_assert_eq!(cell.kind(), ValueKind::Temp, "set_temp_inner on a non-temp cell");
        let previous = cell.replace_data(ValueData::Ref(inner));
        cell.set_status(ValueStatus::Set);
        self.release_data(previous);
    }

    /// Replaces a cell's payload in place, releasing references held by the
    /// old payload. Ownership of the new payload's references transfers to
    /// the cell.
    pub fn replace_data(&mut self, id: ValueId, data: ValueData) {
        let previous = self.get_mut(id).replace_data(data);
        self.release_data(previous);
    }

    /// Renders a value for `echo` and container display.
    ///
    /// Temp chains are followed to the held value; an unset cell renders as
    /// the empty string.
    #[must_use]
    pub fn display(&self, interner: &Interner, id: ValueId) -> String {
        let resolved = self.resolve(id);
        match self.get(resolved).data() {
            ValueData::None => String::new(),
            ValueData::Int(i) => i.to_string(),
            ValueData::Double(d) => {
                if d.is_finite() {
                    ryu::Buffer::new().format_finite(*d).to_owned()
                } else {
                    d.to_string()
                }
            }
            ValueData::Bool(b) => if *b { "true" } else { "false" }.to_owned(),
            ValueData::Str(s) => interner.get_str(*s).to_owned(),
            ValueData::Vector(children) => {
                let mut out = String::from("[");
                for (i, &child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.display(interner, child));
                }
                out.push(']');
                out
            }
            ValueData::Callable(callable) => {
                format!("<function {}>", interner.get_str(callable.name))
            }
            ValueData::User(_) => "<object>".to_owned(),
            ValueData::Ref(_) => unreachable!("resolve() never returns a Ref cell"),
        }
    }

    /// Number of live cells.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Returns whether a cell id is still live (valid and not freed).
    #[must_use]
    pub fn is_live(&self, id: ValueId) -> bool {
        self.slots.get(id.index()).is_some_and(Option::is_some)
    }
}

impl ValueCell {
    /// Detaches the payload during slot destruction.
    fn replace_data_for_drop(mut self) -> ValueData {
        self.replace_data(ValueData::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueCell;

    #[test]
    fn alloc_starts_at_refcount_one() {
        let mut pool = ValuePool::new();
        let id = pool.alloc(ValueCell::constant(ValueData::Int(7)));
        assert_eq!(pool.refcount(id), 1);
        assert_eq!(pool.live_count(), 1);
    }

    #[test]
    fn dec_ref_destroys_exactly_once_and_recycles() {
        let mut pool = ValuePool::new();
        let id = pool.alloc(ValueCell::constant(ValueData::Int(1)));
        pool.inc_ref(id);
        pool.dec_ref(id);
        assert!(pool.is_live(id));
        pool.dec_ref(id);
        assert!(!pool.is_live(id));
        assert_eq!(pool.live_count(), 0);

        let reused = pool.alloc(ValueCell::constant(ValueData::Int(2)));
        assert_eq!(reused, id);
    }

    #[test]
    fn vector_release_is_recursive() {
        let mut pool = ValuePool::new();
        let a = pool.alloc(ValueCell::constant(ValueData::Int(1)));
        let b = pool.alloc(ValueCell::constant(ValueData::Int(2)));
        let vec_id = pool.alloc(ValueCell::constant(ValueData::Vector(vec![a, b])));
        // The vector now owns the only reference to each child.
        pool.dec_ref(vec_id);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn temp_inner_replacement_releases_previous() {
        let mut pool = ValuePool::new();
        let temp = pool.alloc(ValueCell::temp());
        let first = pool.alloc(ValueCell::constant(ValueData::Int(1)));
        let second = pool.alloc(ValueCell::constant(ValueData::Int(2)));

        pool.set_temp_inner(temp, first);
        assert!(pool.is_live(first));
        pool.set_temp_inner(temp, second);
        assert!(!pool.is_live(first));
        assert!(pool.is_live(second));

        pool.dec_ref(temp);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn clone_data_claims_child_references() {
        let mut pool = ValuePool::new();
        let child = pool.alloc(ValueCell::constant(ValueData::Int(5)));
        let original = ValueData::Vector(vec![child]);
        let copy = pool.clone_data(&original);
        assert_eq!(pool.refcount(child), 2);
        // Releasing both payloads releases the child exactly twice.
        pool.release_data(original);
        pool.release_data(copy);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn resolve_follows_temp_chain() {
        let mut pool = ValuePool::new();
        let inner = pool.alloc(ValueCell::constant(ValueData::Int(3)));
        let temp = pool.alloc(ValueCell::temp());
        pool.set_temp_inner(temp, inner);
        assert_eq!(pool.resolve(temp), inner);
        assert_eq!(pool.resolve(inner), inner);
    }
}
