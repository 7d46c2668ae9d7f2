//! View-side change notifications.
//!
//! A collection view raises three families of notification: structural
//! [`CollectionChange`] events, scalar [`ViewProperty`] changes, and the
//! currency pre/post pair. Collaborators (data-binding layers, widgets)
//! consume these through [`ViewSignals`]; nothing in the view depends on the
//! consumers.

use horizon_prism_core::Signal;

use crate::item::ViewItem;

/// A single structural change to the view, in view-relative indices.
///
/// `Add`, `Remove`, and `Replace` always describe exactly one item; the view
/// never raises multi-item events.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<T> {
    /// An item appeared at `index`.
    Add {
        /// The item that was added.
        item: T,
        /// View index the item now occupies.
        index: usize,
    },
    /// The item at `index` disappeared.
    Remove {
        /// The item that was removed.
        item: T,
        /// View index the item occupied before removal.
        index: usize,
    },
    /// The item at `index` was replaced in place.
    Replace {
        /// The previous occupant.
        old: T,
        /// The new occupant.
        new: T,
        /// The unchanged view index.
        index: usize,
    },
    /// An item changed position without entering or leaving the view.
    Move {
        /// The item that moved.
        item: T,
        /// Its previous view index.
        from: usize,
        /// Its new view index.
        to: usize,
    },
    /// The view changed wholesale; consumers must re-read everything.
    Reset,
}

/// Scalar view properties announced through
/// [`ViewSignals::property_changed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewProperty {
    /// The number of view slots changed.
    Count,
    /// The emptiness of the view flipped.
    IsEmpty,
    /// The currency position changed.
    CurrentPosition,
    /// The current item changed.
    CurrentItem,
    /// The before-first currency flag flipped.
    IsCurrentBeforeFirst,
    /// The after-last currency flag flipped.
    IsCurrentAfterLast,
    /// An add transaction started or ended.
    IsAddingNew,
    /// The pending add item changed.
    CurrentAddItem,
    /// An edit transaction started or ended.
    IsEditingItem,
    /// The pending edit item changed.
    CurrentEditItem,
    /// The filter predicate was set or cleared.
    Filter,
    /// The sort policy changed.
    SortPolicy,
    /// The grouping configuration changed.
    GroupDescriptions,
    /// The placeholder position changed.
    PlaceholderPosition,
    /// The live-sorting setting changed.
    IsLiveSorting,
    /// The live-filtering setting changed.
    IsLiveFiltering,
    /// The live-grouping setting changed.
    IsLiveGrouping,
}

/// The signals a collection view exposes to its collaborators.
pub struct ViewSignals<T: ViewItem> {
    /// Structural changes, one event per single-item change.
    pub collection_changed: Signal<CollectionChange<T>>,
    /// Scalar property changes.
    pub property_changed: Signal<ViewProperty>,
    /// Raised before currency moves. Observable only; structural-adjustment
    /// moves cannot be vetoed.
    pub current_changing: Signal<()>,
    /// Raised after currency has moved.
    pub current_changed: Signal<()>,
}

impl<T: ViewItem> Default for ViewSignals<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ViewItem> ViewSignals<T> {
    /// Creates a new, unconnected signal set.
    pub fn new() -> Self {
        Self {
            collection_changed: Signal::new(),
            property_changed: Signal::new(),
            current_changing: Signal::new(),
            current_changed: Signal::new(),
        }
    }

    pub(crate) fn dispatch(&self, notice: Notice<T>) {
        match notice {
            Notice::Collection(change) => self.collection_changed.emit(change),
            Notice::Property(property) => self.property_changed.emit(property),
            Notice::CurrentChanging => self.current_changing.emit(()),
            Notice::CurrentChanged => self.current_changed.emit(()),
        }
    }

    /// Emits a batch of notices in order.
    ///
    /// View internals collect notices while holding the state lock and hand
    /// them here after releasing it, so slots can re-enter the read API.
    pub(crate) fn dispatch_all(&self, notices: Vec<Notice<T>>) {
        for notice in notices {
            self.dispatch(notice);
        }
    }
}

/// An internal, ordered notification record.
#[derive(Debug, Clone)]
pub(crate) enum Notice<T> {
    Collection(CollectionChange<T>),
    Property(ViewProperty),
    CurrentChanging,
    CurrentChanged,
}
