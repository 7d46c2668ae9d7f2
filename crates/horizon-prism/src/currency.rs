//! Currency: the single "current item" cursor.
//!
//! Currency is a position in `[-1, count]` plus the item occupying it;
//! `-1` is before-first and `count` is after-last. Structural changes adjust
//! the cursor automatically: adds shift it, removing the current item moves
//! it to the nearest surviving neighbor (after the Remove notification has
//! been raised), moves follow the item. The placeholder is never current;
//! requests to move onto it are ignored and structural adjustments step past
//! it.

use crate::error::{PrismError, PrismResult};
use crate::events::{Notice, ViewProperty};
use crate::item::ViewItem;
use crate::view::{CollectionView, ViewSlot, ViewState};

/// The currency cursor's state.
pub(crate) struct CurrencyState<T> {
    /// Position in `[-1, count]`.
    pub(crate) position: isize,
    /// The current item; `None` before-first, after-last, and in an empty
    /// view.
    pub(crate) item: Option<T>,
    pub(crate) before_first: bool,
    pub(crate) after_last: bool,
}

impl<T> CurrencyState<T> {
    pub(crate) fn empty() -> Self {
        Self {
            position: -1,
            item: None,
            before_first: true,
            after_last: true,
        }
    }
}

/// Before-first/after-last flags for a position. An empty view is both.
pub(crate) fn currency_flags(position: isize, count: usize) -> (bool, bool) {
    if count == 0 {
        (true, true)
    } else {
        (position < 0, position >= count as isize)
    }
}

/// Seats currency at `target` (clamped into `[-1, count]`, stepping off
/// placeholder slots toward before-first), raising the pre/post pair when
/// the current item changes.
pub(crate) fn seat_currency_at<T: ViewItem>(
    state: &mut ViewState<T>,
    target: isize,
    notices: &mut Vec<Notice<T>>,
) {
    let count = state.count() as isize;
    let mut target = target.clamp(-1, count);
    while target >= 0 && target < count {
        match state.slot_at(target as usize) {
            Some(ViewSlot::Placeholder) => target -= 1,
            _ => break,
        }
    }
    let new_item = if target >= 0 && target < count {
        state
            .slot_at(target as usize)
            .and_then(|slot| slot.item().cloned())
    } else {
        None
    };

    let (before_first, after_last) = currency_flags(target, state.count());
    let item_changed = state.currency.item != new_item;
    let position_changed = state.currency.position != target;
    let before_changed = state.currency.before_first != before_first;
    let after_changed = state.currency.after_last != after_last;
    if !item_changed && !position_changed && !before_changed && !after_changed {
        return;
    }

    if item_changed {
        notices.push(Notice::CurrentChanging);
    }
    state.currency.position = target;
    state.currency.item = new_item;
    state.currency.before_first = before_first;
    state.currency.after_last = after_last;
    if item_changed {
        notices.push(Notice::CurrentChanged);
        notices.push(Notice::Property(ViewProperty::CurrentItem));
    }
    if position_changed {
        notices.push(Notice::Property(ViewProperty::CurrentPosition));
    }
    if before_changed {
        notices.push(Notice::Property(ViewProperty::IsCurrentBeforeFirst));
    }
    if after_changed {
        notices.push(Notice::Property(ViewProperty::IsCurrentAfterLast));
    }
}

/// Position-only update (the item did not change): no pre/post pair, just
/// property notices.
pub(crate) fn update_currency_position_quiet<T: ViewItem>(
    state: &mut ViewState<T>,
    position: isize,
    notices: &mut Vec<Notice<T>>,
) {
    let (before_first, after_last) = currency_flags(position, state.count());
    if state.currency.position != position {
        state.currency.position = position;
        notices.push(Notice::Property(ViewProperty::CurrentPosition));
    }
    if state.currency.before_first != before_first {
        state.currency.before_first = before_first;
        notices.push(Notice::Property(ViewProperty::IsCurrentBeforeFirst));
    }
    if state.currency.after_last != after_last {
        state.currency.after_last = after_last;
        notices.push(Notice::Property(ViewProperty::IsCurrentAfterLast));
    }
}

/// An item appeared at `view_index`; shift or seat the cursor.
pub(crate) fn adjust_currency_for_add<T: ViewItem>(
    state: &mut ViewState<T>,
    view_index: usize,
    was_empty: bool,
    notices: &mut Vec<Notice<T>>,
) {
    if was_empty {
        seat_currency_at(state, view_index as isize, notices);
        return;
    }
    if (view_index as isize) <= state.currency.position {
        let position = state.currency.position + 1;
        update_currency_position_quiet(state, position, notices);
    }
}

/// The item at `view_index` disappeared. The caller has already queued the
/// Remove notification; the cursor moves afterwards.
pub(crate) fn adjust_currency_for_remove<T: ViewItem>(
    state: &mut ViewState<T>,
    view_index: usize,
    notices: &mut Vec<Notice<T>>,
) {
    let position = state.currency.position;
    if (view_index as isize) < position {
        update_currency_position_quiet(state, position - 1, notices);
    } else if view_index as isize == position {
        let target = position.min(state.count() as isize - 1);
        seat_currency_at(state, target, notices);
    }
}

/// The item at `view_index` was replaced in place.
pub(crate) fn adjust_currency_for_replace<T: ViewItem>(
    state: &mut ViewState<T>,
    view_index: usize,
    new_item: &T,
    notices: &mut Vec<Notice<T>>,
) {
    if state.currency.position != view_index as isize {
        return;
    }
    if state.currency.item.as_ref() == Some(new_item) {
        return;
    }
    notices.push(Notice::CurrentChanging);
    state.currency.item = Some(new_item.clone());
    notices.push(Notice::CurrentChanged);
    notices.push(Notice::Property(ViewProperty::CurrentItem));
}

/// An item relocated from `from` to `to`; currency follows the moved item,
/// and a straddling interval shifts the cursor by one.
pub(crate) fn adjust_currency_for_move<T: ViewItem>(
    state: &mut ViewState<T>,
    from: usize,
    to: usize,
    notices: &mut Vec<Notice<T>>,
) {
    let position = state.currency.position;
    if position < 0 {
        return;
    }
    let at = position as usize;
    if from == at {
        update_currency_position_quiet(state, to as isize, notices);
    } else if from < at && to >= at {
        update_currency_position_quiet(state, position - 1, notices);
    } else if from > at && to <= at {
        update_currency_position_quiet(state, position + 1, notices);
    }
}

/// After a batch of relocations (live pass, refresh), re-derive the
/// cursor's position from its item.
pub(crate) fn revalidate_currency<T: ViewItem>(
    state: &mut ViewState<T>,
    notices: &mut Vec<Notice<T>>,
) {
    match state.currency.item.clone() {
        Some(item) => match state.index_of_item(&item) {
            Some(index) => update_currency_position_quiet(state, index as isize, notices),
            None => {
                let target = state.currency.position.min(state.count() as isize - 1);
                seat_currency_at(state, target, notices);
            }
        },
        None => {
            let count = state.count() as isize;
            let position = state.currency.position.clamp(-1, count);
            update_currency_position_quiet(state, position, notices);
        }
    }
}

impl<T: ViewItem> CollectionView<T> {
    /// The current item, or `None` before-first/after-last/empty.
    pub fn current_item(&self) -> Option<T> {
        self.core.state.read().currency.item.clone()
    }

    /// The current position in `[-1, count]`.
    pub fn current_position(&self) -> isize {
        self.core.state.read().currency.position
    }

    /// Returns `true` when currency sits before the first item.
    pub fn is_current_before_first(&self) -> bool {
        self.core.state.read().currency.before_first
    }

    /// Returns `true` when currency sits after the last item.
    pub fn is_current_after_last(&self) -> bool {
        self.core.state.read().currency.after_last
    }

    /// Moves currency to `item`. When the item is not in the view, currency
    /// moves to before-first. Returns whether currency ends on an item.
    pub fn move_current_to(&self, item: &T) -> PrismResult<bool> {
        self.move_currency(|state| Some(state.index_of_item(item).map_or(-1, |index| index as isize)))
    }

    /// Moves currency to a position in `[-1, count]`; `-1` is before-first
    /// and `count` is after-last. Positions outside that range error, and
    /// moves onto the placeholder are ignored.
    pub fn move_current_to_position(&self, position: isize) -> PrismResult<bool> {
        let mut notices = Vec::new();
        let result;
        {
            let mut state = self.core.state.write();
            if state.defer_count > 0 {
                return Err(PrismError::RefreshDeferred);
            }
            let count = state.count();
            if position < -1 || position > count as isize {
                return Err(PrismError::PositionOutOfRange { position, count });
            }
            let targets_placeholder = position >= 0
                && (position as usize) < count
                && matches!(
                    state.slot_at(position as usize),
                    Some(ViewSlot::Placeholder)
                );
            if !targets_placeholder {
                seat_currency_at(&mut state, position, &mut notices);
            }
            result = state.currency.item.is_some();
        }
        self.core.dispatch(notices);
        Ok(result)
    }

    /// Moves currency to the first item.
    pub fn move_current_to_first(&self) -> PrismResult<bool> {
        self.move_currency(|state| {
            Some(
                (0..state.count())
                    .find(|index| matches!(state.slot_at(*index), Some(ViewSlot::Item(_))))
                    .map_or(-1, |index| index as isize),
            )
        })
    }

    /// Moves currency to the last item.
    pub fn move_current_to_last(&self) -> PrismResult<bool> {
        self.move_currency(|state| {
            Some(
                (0..state.count())
                    .rev()
                    .find(|index| matches!(state.slot_at(*index), Some(ViewSlot::Item(_))))
                    .map_or(-1, |index| index as isize),
            )
        })
    }

    /// Moves currency to the next item, or after-last past the end.
    pub fn move_current_to_next(&self) -> PrismResult<bool> {
        self.move_currency(|state| {
            let count = state.count() as isize;
            let mut target = state.currency.position + 1;
            while target < count
                && matches!(state.slot_at(target as usize), Some(ViewSlot::Placeholder))
            {
                target += 1;
            }
            Some(target.min(count))
        })
    }

    /// Moves currency to the previous item, or before-first past the start.
    pub fn move_current_to_previous(&self) -> PrismResult<bool> {
        self.move_currency(|state| {
            let mut target = state.currency.position - 1;
            while target >= 0
                && matches!(state.slot_at(target as usize), Some(ViewSlot::Placeholder))
            {
                target -= 1;
            }
            Some(target.max(-1))
        })
    }

    fn move_currency(
        &self,
        target: impl FnOnce(&ViewState<T>) -> Option<isize>,
    ) -> PrismResult<bool> {
        let mut notices = Vec::new();
        let result;
        {
            let mut state = self.core.state.write();
            if state.defer_count > 0 {
                return Err(PrismError::RefreshDeferred);
            }
            if let Some(position) = target(&state) {
                seat_currency_at(&mut state, position, &mut notices);
            }
            result = state.currency.item.is_some();
        }
        self.core.dispatch(notices);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_flags() {
        assert_eq!(currency_flags(-1, 0), (true, true));
        assert_eq!(currency_flags(-1, 3), (true, false));
        assert_eq!(currency_flags(0, 3), (false, false));
        assert_eq!(currency_flags(3, 3), (false, true));
    }
}
