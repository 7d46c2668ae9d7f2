//! Item traits for collection views.
//!
//! [`ViewItem`] is the contract a type must satisfy to be viewable: cheap
//! clone semantics, identity comparison, and named-property access for
//! key-based sorting and grouping. Items are expected to be handles - a thin
//! wrapper over shared state (`Arc` inside) - so that the view's internal
//! copies, the source, and the caller all observe one underlying value.
//!
//! [`ObservableItem`] adds a per-item change signal; it is what live shaping
//! subscribes to.

use horizon_prism_core::Signal;

use crate::value::PropertyValue;

/// Notification payload for a single item property change.
#[derive(Debug, Clone)]
pub struct PropertyChange {
    /// Name of the property that changed.
    pub name: String,
}

impl PropertyChange {
    /// Creates a change notification for the named property.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An item that can be shaped by a collection view.
///
/// Equality is identity: two clones of the same handle must compare equal,
/// two distinct items must not, even when their property values coincide.
/// The view locates items by this equality, so value-semantics `PartialEq`
/// over duplicated data will confuse index resolution.
///
/// All methods besides `property` are capability probes with default no-op
/// implementations; override them on item types that support staged
/// initialization (used by add transactions) or staged editing (used by edit
/// transactions).
///
/// # Example
///
/// ```ignore
/// #[derive(Clone)]
/// struct Task(Arc<TaskState>);
///
/// impl PartialEq for Task {
///     fn eq(&self, other: &Self) -> bool {
///         Arc::ptr_eq(&self.0, &other.0)
///     }
/// }
///
/// impl ViewItem for Task {
///     fn property(&self, name: &str) -> PropertyValue {
///         match name {
///             "title" => self.0.title.lock().clone().into(),
///             "done" => (*self.0.done.lock()).into(),
///             _ => PropertyValue::None,
///         }
///     }
/// }
/// ```
pub trait ViewItem: Clone + PartialEq + Send + Sync + 'static {
    /// Reads the named property.
    ///
    /// Properties the item does not expose resolve to
    /// [`PropertyValue::None`], which sorts as equal to everything.
    fn property(&self, _name: &str) -> PropertyValue {
        PropertyValue::None
    }

    /// Whether this item supports staged initialization
    /// (`begin_init`/`end_init`).
    fn supports_staged_init(&self) -> bool {
        false
    }

    /// Begins staged initialization. Called when the item enters an add
    /// transaction, before the caller populates it.
    fn begin_init(&self) {}

    /// Ends staged initialization. Called when the add transaction commits
    /// or is cancelled.
    fn end_init(&self) {}

    /// Whether this item supports staged editing with rollback
    /// (`begin_edit`/`end_edit`/`cancel_edit`).
    fn supports_staged_edit(&self) -> bool {
        false
    }

    /// Begins a staged edit, capturing state for a possible rollback.
    fn begin_edit(&self) {}

    /// Ends a staged edit, keeping the edited values.
    fn end_edit(&self) {}

    /// Rolls a staged edit back to the state captured by `begin_edit`.
    fn cancel_edit(&self) {}
}

/// An item that announces its own property changes.
///
/// The change signal must be shared by every clone of the item handle: the
/// view subscribes through one clone and the caller mutates through another.
pub trait ObservableItem: ViewItem {
    /// The item's change signal. Setters emit a [`PropertyChange`] carrying
    /// the property name after updating the value.
    fn changes(&self) -> &Signal<PropertyChange>;
}
