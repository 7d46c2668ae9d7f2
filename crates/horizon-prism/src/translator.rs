//! Change translation: source-relative events to view-relative changes.
//!
//! A structural source event names an item and a source index; the view
//! needs to know where (and whether) that item appears in the shaped
//! projection. Resolution picks a strategy from the active policies:
//!
//! - no sort, no filter: arithmetic shift (the projection mirrors the shadow
//!   minus the pending add item)
//! - sort active: binary search by the active comparer
//! - filter only: a two-pointer correspondence scan between the shadow and
//!   the projection, skipping the item under move
//!
//! The resolved before/after positions then combine into an
//! [`EffectiveChange`] - the single table that decides which event
//! subscribers observe.

/// A resolved view-relative position for one side of a structural event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexHint {
    /// The item occupies (or will occupy) this projection index.
    Known(usize),
    /// The position could not be determined; translation is moot and the
    /// view falls back to a full refresh.
    Unknown,
    /// The item is not part of the view on this side of the event.
    NotInView,
}

/// The structural action kind reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceAction {
    Insert,
    Remove,
    Replace,
    Move,
}

/// The change the view actually applies and announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EffectiveChange {
    /// In-place replacement at a projection index.
    Replace { index: usize },
    /// Relocation between projection indices.
    Move { from: usize, to: usize },
    /// Entry into the projection.
    Add { index: usize },
    /// Departure from the projection.
    Remove { index: usize },
    /// No observable effect on the view.
    None,
    /// Translation moot; rebuild wholesale.
    Reset,
}

/// Combines resolved before/after positions into the effective change.
///
/// `find_old` recovers the item's old projection index when the event left
/// it unknown; returning `None` there degrades to `Reset`.
pub(crate) fn effective_change(
    action: SourceAction,
    old: IndexHint,
    new: IndexHint,
    find_old: impl FnOnce() -> Option<usize>,
) -> EffectiveChange {
    use IndexHint::*;

    match (old, new) {
        (Known(a), Known(b)) if a == b => EffectiveChange::Replace { index: a },
        (Known(a), Known(b)) => EffectiveChange::Move { from: a, to: b },
        (Unknown, Known(b)) => {
            if action == SourceAction::Insert {
                EffectiveChange::Add { index: b }
            } else {
                // The item lands in view but came from an unknown slot; only
                // a located removal keeps the projection coherent.
                match find_old() {
                    Some(a) => EffectiveChange::Remove { index: a },
                    None => EffectiveChange::Reset,
                }
            }
        }
        (NotInView, Known(b)) => EffectiveChange::Add { index: b },
        (Known(a), NotInView) => EffectiveChange::Remove { index: a },
        // Out of view on both sides: nothing to announce. The Move case is
        // deliberate, documented behavior.
        (NotInView, NotInView) => EffectiveChange::None,
        _ => EffectiveChange::Reset,
    }
}

/// Projection index for a source position when no sort and no filter are
/// active: the projection mirrors the shadow, minus the pending add item.
pub(crate) fn arithmetic_index(source_index: usize, pending_add_index: Option<usize>) -> usize {
    match pending_add_index {
        Some(pending) if pending < source_index => source_index - 1,
        _ => source_index,
    }
}

/// Two-pointer correspondence scan between the shadow and the projection.
///
/// Walks the first `upto` shadow items (skipping `skip`, the item under
/// move, on both sides) and advances a projection cursor on every identity
/// match. The returned count is the projection index corresponding to the
/// source position `upto`: for an insertion it is where the new item lands,
/// for a removal it is where the departing item sits (the next unmatched
/// projection entry), and for a move's destination it is the re-insertion
/// index once the moved item has left its old slot.
pub(crate) fn correspondence_index<T: PartialEq>(
    shadow: &[T],
    projection: &[T],
    upto: usize,
    skip: Option<&T>,
) -> usize {
    let mut proj = 0;
    let mut matched = 0;
    let mut taken = 0;
    for entry in shadow {
        if taken == upto {
            break;
        }
        if skip.is_some_and(|skipped| skipped == entry) {
            continue;
        }
        taken += 1;
        // Step the cursor over the moved item's old projection slot.
        while proj < projection.len() && skip.is_some_and(|skipped| skipped == &projection[proj]) {
            proj += 1;
        }
        if proj < projection.len() && entry == &projection[proj] {
            proj += 1;
            matched += 1;
        }
    }
    matched
}
