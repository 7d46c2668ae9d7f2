//! Source collections and the seam the view consumes them through.
//!
//! A collection view never touches caller data structures directly; it goes
//! through [`SourceModel`], which couples read/write access with a
//! [`SourceEvent`] signal and a [`SourceCapabilities`] record resolved once
//! at construction. [`VecModel`] is the shipped implementation: an observable
//! vector the caller mutates and the view mirrors.
//!
//! Cross-thread sources additionally supply a [`SyncHook`]; see
//! [`crate::adapter::SourceAdapter`] for how the view brackets raw access
//! with it.

use parking_lot::RwLock;
use std::sync::Arc;

use horizon_prism_core::Signal;

use crate::error::{PrismError, PrismResult};
use crate::item::ViewItem;

/// Whether a synchronized source access reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// The bracketed closure only reads the source.
    Read,
    /// The bracketed closure mutates the source.
    Write,
}

/// Caller-supplied synchronization hook for cross-thread source access.
///
/// The hook is invoked synchronously, exactly once per raw source access,
/// and must run the closure it is given exactly once. Whatever lock or
/// context it needs is captured inside it; the view assumes nothing about
/// the implementation and supplies no locking of its own, beyond the
/// guarantee that accesses it brackets do not overlap on the calling thread.
///
/// # Example
///
/// ```ignore
/// let lock = Arc::new(Mutex::new(()));
/// let hook: SyncHook = Arc::new(move |_mode, access| {
///     let _guard = lock.lock();
///     access();
/// });
/// ```
pub type SyncHook = Arc<dyn Fn(AccessMode, &mut dyn FnMut()) + Send + Sync>;

/// A single-item structural change in the source, in source-relative indices.
///
/// There are deliberately no multi-item variants: batched mutation is
/// unsupported across the engine, and bulk replacement travels as `Reset`.
#[derive(Debug, Clone)]
pub enum SourceEvent<T> {
    /// `item` was inserted at `index`.
    Insert {
        /// Insertion index in the source.
        index: usize,
        /// The inserted item.
        item: T,
    },
    /// The item at `index` was removed.
    Remove {
        /// The index the item occupied.
        index: usize,
        /// The removed item.
        item: T,
    },
    /// The item at `index` was replaced.
    Replace {
        /// The index that changed occupants.
        index: usize,
        /// The previous occupant.
        old: T,
        /// The new occupant.
        new: T,
    },
    /// An item was relocated from `from` to `to`.
    Move {
        /// Previous source index.
        from: usize,
        /// New source index.
        to: usize,
        /// The relocated item.
        item: T,
    },
    /// The source changed wholesale.
    Reset,
}

/// Capabilities of a source, resolved once when a view is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCapabilities {
    /// Items can be inserted and removed through the source.
    pub editable: bool,
    /// The source length is fixed; structural mutation is a usage error.
    pub fixed_size: bool,
    /// The source raises [`SourceEvent`]s for structural changes.
    pub notifies: bool,
    /// Member items announce property changes, enabling live shaping.
    pub items_observable: bool,
    /// The view may sort over this source.
    pub sortable: bool,
    /// The view may filter over this source.
    pub filterable: bool,
}

impl SourceCapabilities {
    /// Capabilities of a plain, non-observable editable collection.
    pub fn editable() -> Self {
        Self {
            editable: true,
            fixed_size: false,
            notifies: true,
            items_observable: false,
            sortable: true,
            filterable: true,
        }
    }

    /// Capabilities of a read-only, non-notifying collection.
    pub fn read_only() -> Self {
        Self {
            editable: false,
            fixed_size: true,
            notifies: false,
            items_observable: false,
            sortable: true,
            filterable: true,
        }
    }
}

/// The seam between a collection view and the caller's data.
///
/// Implementations own the backing storage and raise a [`SourceEvent`] for
/// every single-item structural change. The write methods default to usage
/// errors so read-only sources need not implement them.
pub trait SourceModel<T: ViewItem>: Send + Sync {
    /// Number of items in the source.
    fn len(&self) -> usize;

    /// Returns `true` if the source holds no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a clone of the item at `index`, or `None` when out of bounds.
    fn get(&self, index: usize) -> Option<T>;

    /// Returns a clone of the whole sequence, in source order.
    fn snapshot(&self) -> Vec<T>;

    /// The capability record for this source.
    fn capabilities(&self) -> SourceCapabilities;

    /// The structural change signal.
    fn events(&self) -> &Signal<SourceEvent<T>>;

    /// Inserts `item` at `index`.
    fn insert(&self, _index: usize, _item: T) -> PrismResult<()> {
        Err(PrismError::Usage("source is read-only"))
    }

    /// Removes and returns the item at `index`.
    fn remove(&self, _index: usize) -> PrismResult<T> {
        Err(PrismError::Usage("source is read-only"))
    }
}

/// An observable vector: the shipped [`SourceModel`] implementation.
///
/// Mutators update the storage first and emit the matching [`SourceEvent`]
/// after releasing the internal lock, so event handlers may read the model.
///
/// # Example
///
/// ```ignore
/// let model = Arc::new(VecModel::new(vec![task_a, task_b]));
/// let view = CollectionView::new(model.clone());
/// model.push(task_c); // the view mirrors the change
/// ```
pub struct VecModel<T> {
    items: RwLock<Vec<T>>,
    events: Signal<SourceEvent<T>>,
    items_observable: bool,
}

impl<T: ViewItem> Default for VecModel<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: ViewItem> VecModel<T> {
    /// Creates a model over plain items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            events: Signal::new(),
            items_observable: false,
        }
    }

    /// Creates a model whose items announce their own property changes,
    /// advertising the `items_observable` capability live shaping needs.
    pub fn observable(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            events: Signal::new(),
            items_observable: true,
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if the model holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Returns a clone of the item at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.read().get(index).cloned()
    }

    /// Appends an item to the end.
    pub fn push(&self, item: T) {
        let index = self.items.read().len();
        self.insert(index, item);
    }

    /// Inserts an item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn insert(&self, index: usize, item: T) {
        self.items.write().insert(index, item.clone());
        self.events.emit(SourceEvent::Insert { index, item });
    }

    /// Removes and returns the item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn remove(&self, index: usize) -> T {
        let item = self.items.write().remove(index);
        self.events.emit(SourceEvent::Remove {
            index,
            item: item.clone(),
        });
        item
    }

    /// Replaces the item at `index`, returning the previous occupant.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    pub fn replace(&self, index: usize, item: T) -> T {
        let old = {
            let mut items = self.items.write();
            std::mem::replace(&mut items[index], item.clone())
        };
        self.events.emit(SourceEvent::Replace {
            index,
            old: old.clone(),
            new: item,
        });
        old
    }

    /// Relocates the item at `from` to position `to`.
    ///
    /// # Panics
    ///
    /// Panics if `from` or `to` is out of bounds.
    pub fn move_item(&self, from: usize, to: usize) {
        if from == to {
            return;
        }
        let item = {
            let mut items = self.items.write();
            let item = items.remove(from);
            items.insert(to, item.clone());
            item
        };
        self.events.emit(SourceEvent::Move { from, to, item });
    }

    /// Replaces the whole sequence. Raises a single `Reset`.
    pub fn set_items(&self, items: Vec<T>) {
        *self.items.write() = items;
        self.events.emit(SourceEvent::Reset);
    }

    /// Returns a clone of the whole sequence.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Source-relative index of `item`, by identity.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.items.read().iter().position(|x| x == item)
    }
}

impl<T: ViewItem> SourceModel<T> for VecModel<T> {
    fn len(&self) -> usize {
        VecModel::len(self)
    }

    fn get(&self, index: usize) -> Option<T> {
        VecModel::get(self, index)
    }

    fn snapshot(&self) -> Vec<T> {
        VecModel::snapshot(self)
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            items_observable: self.items_observable,
            ..SourceCapabilities::editable()
        }
    }

    fn events(&self) -> &Signal<SourceEvent<T>> {
        &self.events
    }

    fn insert(&self, index: usize, item: T) -> PrismResult<()> {
        if index > VecModel::len(self) {
            return Err(PrismError::Usage("insert index out of bounds"));
        }
        VecModel::insert(self, index, item);
        Ok(())
    }

    fn remove(&self, index: usize) -> PrismResult<T> {
        if index >= VecModel::len(self) {
            return Err(PrismError::Usage("remove index out of bounds"));
        }
        Ok(VecModel::remove(self, index))
    }
}
