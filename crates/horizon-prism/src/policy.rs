//! Shaping policies: sort order and filtering.
//!
//! A view sorts either by an ordered list of named [`SortKey`]s or by a
//! single custom comparer; the two are mutually exclusive and setting one
//! clears the other. Filtering is a single optional predicate.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::item::ViewItem;
use crate::value::compare_values;

/// Direction of a single sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One level of key-based ordering: a property name and a direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Name of the item property to order by.
    pub property: String,
    /// Direction for this key.
    pub direction: SortDirection,
}

impl SortKey {
    /// An ascending key over the named property.
    pub fn ascending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Ascending,
        }
    }

    /// A descending key over the named property.
    pub fn descending(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// A custom comparer over two items.
pub type CompareFn<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// A filter predicate; `true` keeps the item in the view.
pub type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// The active sort order of a view.
#[derive(Clone, Default)]
pub enum SortPolicy<T> {
    /// Source order.
    #[default]
    Unsorted,
    /// Ordered list of named keys, applied in sequence.
    Keys(Vec<SortKey>),
    /// A single custom comparer.
    Comparer(CompareFn<T>),
}

impl<T: ViewItem> SortPolicy<T> {
    /// Returns `true` unless the policy is [`SortPolicy::Unsorted`].
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Unsorted)
    }

    /// The property names of key-based sorting, empty otherwise.
    pub fn key_properties(&self) -> Vec<String> {
        match self {
            Self::Keys(keys) => keys.iter().map(|k| k.property.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Builds the comparer this policy orders by, if any.
    ///
    /// Key-based policies compare property values level by level; the first
    /// non-equal key decides.
    pub fn comparer(&self) -> Option<CompareFn<T>> {
        match self {
            Self::Unsorted => None,
            Self::Comparer(cmp) => Some(cmp.clone()),
            Self::Keys(keys) => {
                let keys = keys.clone();
                Some(Arc::new(move |a: &T, b: &T| {
                    for key in &keys {
                        let ordering =
                            compare_values(&a.property(&key.property), &b.property(&key.property));
                        let ordering = match key.direction {
                            SortDirection::Ascending => ordering,
                            SortDirection::Descending => ordering.reverse(),
                        };
                        if ordering != Ordering::Equal {
                            return ordering;
                        }
                    }
                    Ordering::Equal
                }))
            }
        }
    }
}

/// Index at which `item` inserts into the sorted `items` slice, after any
/// items that compare equal to it (so arrival order breaks ties).
pub(crate) fn insertion_index<T>(items: &[T], item: &T, cmp: &CompareFn<T>) -> usize {
    items.partition_point(|probe| cmp(probe, item) != Ordering::Greater)
}

/// Position of `item` in the sorted `items` slice, located by binary search
/// to the equal run and an identity scan within it.
///
/// Returns `None` when the item is absent, or when its sort key has drifted
/// since insertion and the equal run no longer contains it.
pub(crate) fn sorted_position_of<T: PartialEq>(
    items: &[T],
    item: &T,
    cmp: &CompareFn<T>,
) -> Option<usize> {
    let lower = items.partition_point(|probe| cmp(probe, item) == Ordering::Less);
    let run = items[lower..].partition_point(|probe| cmp(probe, item) == Ordering::Equal);
    items[lower..lower + run]
        .iter()
        .position(|probe| probe == item)
        .map(|offset| lower + offset)
}
