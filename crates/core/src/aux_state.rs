//! Per-window auxiliary state.
//!
//! Windows are owned by the window system, so transient bookkeeping cannot be
//! attached to them directly. [`AuxStore`] keeps a typed property bag per
//! window id instead. A bag exists only while it holds at least one property,
//! and the whole bag is dropped when the window is destroyed. The store is
//! never iterated to discover windows.

use crate::WindowId;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

#[derive(Default)]
struct PropertyBag {
    props: HashMap<TypeId, Box<dyn Any>>,
}

/// Typed property bags keyed by window id.
///
/// Each property type acts as its own key, so a window holds at most one
/// value of a given type. Reading a property of a window that has never been
/// written behaves exactly like reading a cleared one: `None`.
#[derive(Default)]
pub struct AuxStore {
    entries: HashMap<WindowId, PropertyBag>,
}

impl AuxStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: 'static>(&self, window: WindowId) -> Option<&T> {
        self.entries
            .get(&window)?
            .props
            .get(&TypeId::of::<T>())?
            .downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self, window: WindowId) -> Option<&mut T> {
        self.entries
            .get_mut(&window)?
            .props
            .get_mut(&TypeId::of::<T>())?
            .downcast_mut::<T>()
    }

    /// Store a property, creating the window's bag on first write.
    ///
    /// Returns the previous value of the same type, if any.
    pub fn set<T: 'static>(&mut self, window: WindowId, value: T) -> Option<T> {
        let previous = self
            .entries
            .entry(window)
            .or_default()
            .props
            .insert(TypeId::of::<T>(), Box::new(value))?;
        previous.downcast::<T>().ok().map(|boxed| *boxed)
    }

    /// Remove and return a single property.
    pub fn take<T: 'static>(&mut self, window: WindowId) -> Option<T> {
        let bag = self.entries.get_mut(&window)?;
        let value = bag.props.remove(&TypeId::of::<T>())?;
        if bag.props.is_empty() {
            self.entries.remove(&window);
        }
        value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    /// Clear a single property. Returns whether it was present.
    pub fn clear<T: 'static>(&mut self, window: WindowId) -> bool {
        self.take::<T>(window).is_some()
    }

    /// Drop every property of a destroyed window.
    pub fn remove_window(&mut self, window: WindowId) -> bool {
        self.entries.remove(&window).is_some()
    }

    pub fn contains_window(&self, window: WindowId) -> bool {
        self.entries.contains_key(&window)
    }

    /// Number of windows currently holding state.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for AuxStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuxStore")
            .field("windows", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Marker(i32);

    #[derive(Debug, Clone, PartialEq)]
    struct Label(String);

    #[test]
    fn test_unwritten_window_reads_absent() {
        let store = AuxStore::new();
        assert_eq!(store.get::<Marker>(7), None);
        assert!(!store.contains_window(7));
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_creates_bag_lazily() {
        let mut store = AuxStore::new();
        assert_eq!(store.set(1, Marker(3)), None);
        assert!(store.contains_window(1));
        assert_eq!(store.get::<Marker>(1), Some(&Marker(3)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_returns_previous_value() {
        let mut store = AuxStore::new();
        store.set(1, Marker(3));
        assert_eq!(store.set(1, Marker(4)), Some(Marker(3)));
        assert_eq!(store.get::<Marker>(1), Some(&Marker(4)));
    }

    #[test]
    fn test_types_are_independent_keys() {
        let mut store = AuxStore::new();
        store.set(1, Marker(3));
        store.set(1, Label("left".to_string()));

        assert_eq!(store.get::<Marker>(1), Some(&Marker(3)));
        assert_eq!(store.get::<Label>(1), Some(&Label("left".to_string())));

        assert!(store.clear::<Marker>(1));
        assert_eq!(store.get::<Marker>(1), None);
        // Bag survives while another property remains
        assert!(store.contains_window(1));
    }

    #[test]
    fn test_clearing_last_property_drops_bag() {
        let mut store = AuxStore::new();
        store.set(1, Marker(3));
        assert_eq!(store.take::<Marker>(1), Some(Marker(3)));
        assert!(!store.contains_window(1));
        assert!(store.is_empty());
        assert!(!store.clear::<Marker>(1));
    }

    #[test]
    fn test_remove_window_drops_everything() {
        let mut store = AuxStore::new();
        store.set(1, Marker(3));
        store.set(1, Label("x".to_string()));
        store.set(2, Marker(9));

        assert!(store.remove_window(1));
        assert_eq!(store.get::<Marker>(1), None);
        assert_eq!(store.get::<Label>(1), None);
        assert_eq!(store.get::<Marker>(2), Some(&Marker(9)));
        assert!(!store.remove_window(1));
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut store = AuxStore::new();
        store.set(5, Marker(1));
        if let Some(marker) = store.get_mut::<Marker>(5) {
            marker.0 += 10;
        }
        assert_eq!(store.get::<Marker>(5), Some(&Marker(11)));
        assert!(store.get_mut::<Label>(5).is_none());
    }
}
