use std::{fmt::Debug, marker::PhantomData};

/// Index of a value living in an [`Arena<T>`].
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    fn new(index: usize) -> Self {
        Self {
            index: index as u32,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Occupied(T),
    // Released slots thread the free list through themselves.
    Free { next: Option<usize> },
}

/// Bump storage with a free list. Released slots are handed out again before
/// the storage grows.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Option<usize>,
    live: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: None,
            live: 0,
        }
    }

    /// Always grows the storage.
    pub fn allocate(&mut self, value: T) -> Id<T> {
        self.slots.push(Slot::Occupied(value));
        self.live += 1;
        Id::new(self.slots.len() - 1)
    }

    pub fn take_or_allocate(&mut self, value: T) -> Id<T> {
        let Some(index) = self.free else {
            return self.allocate(value);
        };

        let slot = std::mem::replace(&mut self.slots[index], Slot::Occupied(value));
        match slot {
            Slot::Free { next } => self.free = next,
            Slot::Occupied(_) => unreachable!("free list points at a live slot"),
        }
        self.live += 1;
        Id::new(index)
    }

    /// Returns the value, or `None` if the slot was already released.
    pub fn release(&mut self, id: Id<T>) -> Option<T> {
        let slot = self.slots.get_mut(id.index())?;
        if matches!(slot, Slot::Free { .. }) {
            return None;
        }

        let slot = std::mem::replace(slot, Slot::Free { next: self.free });
        self.free = Some(id.index());
        self.live -= 1;
        match slot {
            Slot::Occupied(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        match self.slots.get(id.index())? {
            Slot::Occupied(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    /// Allocated minus released. Zero once every owner has torn its values down.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Slots ever handed out, live or free.
    pub fn footprint(&self) -> usize {
        self.slots.len()
    }
}

impl<T> std::ops::Index<Id<T>> for Arena<T> {
    type Output = T;

    fn index(&self, id: Id<T>) -> &T {
        self.get(id).expect("arena id used after release")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_slots_are_reused() {
        let mut arena = Arena::new();
        let a = arena.allocate("a");
        let b = arena.allocate("b");
        assert_eq!(arena.release(a), Some("a"));
        let c = arena.take_or_allocate("c");
        assert_eq!(c, a);
        assert_eq!(arena[b], "b");
        assert_eq!(arena[c], "c");
        assert_eq!(arena.footprint(), 2);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut arena = Arena::new();
        let ids: Vec<_> = (0..3).map(|i| arena.allocate(i)).collect();
        arena.release(ids[0]);
        arena.release(ids[2]);
        assert_eq!(arena.take_or_allocate(10), ids[2]);
        assert_eq!(arena.take_or_allocate(11), ids[0]);
        assert_eq!(arena.take_or_allocate(12).index(), 3);
    }

    #[test]
    fn test_double_release_is_ignored() {
        let mut arena = Arena::new();
        let a = arena.allocate(1);
        assert_eq!(arena.release(a), Some(1));
        assert_eq!(arena.release(a), None);
        assert_eq!(arena.live(), 0);
        assert!(arena.get(a).is_none());
    }

    #[test]
    fn test_live_count_returns_to_zero() {
        let mut arena = Arena::new();
        let ids: Vec<_> = (0..5).map(|i| arena.take_or_allocate(i)).collect();
        assert_eq!(arena.live(), 5);
        for id in ids {
            arena.release(id);
        }
        assert_eq!(arena.live(), 0);
    }
}
