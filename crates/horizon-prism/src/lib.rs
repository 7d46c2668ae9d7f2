//! Horizon Prism - shaped collection views.
//!
//! A [`CollectionView`] maintains a derived, navigable, editable projection
//! over a mutable source sequence: filtered, sorted, optionally grouped into
//! a hierarchy, with a single "current item" cursor and transactional
//! add/edit operations. The projection stays consistent under single-item
//! structural source changes, re-shapes continuously as item properties
//! change (live shaping), and supports cross-thread source access through a
//! caller-supplied synchronization hook.
//!
//! # Core Types
//!
//! - [`VecModel`]: an observable vector, the shipped [`SourceModel`]
//! - [`CollectionView`]: the view engine itself
//! - [`ViewItem`] / [`ObservableItem`]: what item types implement
//! - [`SortKey`] / [`SortPolicy`] / [`GroupDescription`]: shaping policies
//! - [`ViewSignals`]: the notifications collaborators consume
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use horizon_prism::{CollectionView, SortKey, VecModel};
//!
//! let source = Arc::new(VecModel::new(tasks));
//! let view = CollectionView::new(source.clone());
//! view.set_sort_keys(vec![SortKey::ascending("title")])?;
//! view.set_filter(|task: &Task| !task.done())?;
//!
//! view.signals().collection_changed.connect(|change| {
//!     println!("view changed: {change:?}");
//! });
//!
//! source.push(new_task); // the view re-shapes and notifies
//! ```
//!
//! # Threading
//!
//! A view lives on one logical owner thread: the thread owning its
//! [`Dispatcher`](horizon_prism_core::Dispatcher). All notifications are
//! raised there. Sources mutated from other threads need a
//! [`SyncHook`]; foreign-thread events are queued to the dispatcher and
//! processed when the owner drains it with `run_pending`.

mod adapter;
mod currency;
mod editing;
mod error;
mod events;
mod group;
mod item;
mod live;
mod policy;
mod source;
mod translator;
mod value;
mod view;

pub use editing::PlaceholderPosition;
pub use error::{PrismError, PrismResult};
pub use events::{CollectionChange, ViewProperty, ViewSignals};
pub use group::{GroupDescription, GroupEntry, GroupKeySelector, GroupNode, GroupSelectorFn};
pub use item::{ObservableItem, PropertyChange, ViewItem};
pub use live::LIVE_SORT_DENSITY_THRESHOLD;
pub use policy::{CompareFn, FilterFn, SortDirection, SortKey, SortPolicy};
pub use source::{AccessMode, SourceCapabilities, SourceEvent, SourceModel, SyncHook, VecModel};
pub use value::{PropertyValue, compare_values};
pub use view::{CollectionView, CollectionViewBuilder, DeferScope, ViewSlot};

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// View pipeline: refresh, translation, effective changes.
    pub const VIEW: &str = "horizon_prism::view";
    /// Source adapter: shadow copy and bracketed access.
    pub const ADAPTER: &str = "horizon_prism::adapter";
    /// Live shaping passes.
    pub const LIVE: &str = "horizon_prism::live";
    /// Group tree maintenance.
    pub const GROUP: &str = "horizon_prism::group";
}
