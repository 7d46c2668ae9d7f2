//! The collection view: a shaped, navigable, editable projection.
//!
//! [`CollectionView`] owns the materialized projection over a source, the
//! optional group tree, the currency cursor, and the transaction state, and
//! keeps all of them consistent under single-item structural source events.
//! Construction wires the view to the source's event signal; [`detach`]
//! (also run on drop) unwires it - explicit lifetime, no weak-reference
//! magic for the consumer to reason about.
//!
//! All notifications are raised on the owner thread (the thread that owns
//! the view's [`Dispatcher`]); source events arriving on other threads are
//! posted to the dispatcher and processed when the owner drains it.
//!
//! [`detach`]: CollectionView::detach

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use horizon_prism_core::{ConnectionId, Dispatcher};

use crate::adapter::SourceAdapter;
use crate::currency::{
    CurrencyState, adjust_currency_for_add, adjust_currency_for_move, adjust_currency_for_remove,
    adjust_currency_for_replace, seat_currency_at, update_currency_position_quiet,
};
use crate::editing::{PlaceholderPosition, TransactionState};
use crate::error::{PrismError, PrismResult};
use crate::events::{CollectionChange, Notice, ViewProperty, ViewSignals};
use crate::group::{GroupDescription, GroupNode, GroupSelectorFn, GroupTree, GroupingPolicy};
use crate::item::ViewItem;
use crate::live::{LiveHooks, LiveOptions, LiveTracker};
use crate::policy::{CompareFn, FilterFn, SortKey, SortPolicy, insertion_index, sorted_position_of};
use crate::source::{SourceEvent, SourceModel, SyncHook};
use crate::translator::{
    EffectiveChange, IndexHint, SourceAction, arithmetic_index, correspondence_index,
    effective_change,
};

/// One positional slot of the view: a member item or the new-item
/// placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewSlot<T> {
    /// A member item.
    Item(T),
    /// The slot reserved for a not-yet-committed new item.
    Placeholder,
}

impl<T> ViewSlot<T> {
    /// The item in this slot, unless it is the placeholder.
    pub fn item(&self) -> Option<&T> {
        match self {
            Self::Item(item) => Some(item),
            Self::Placeholder => None,
        }
    }

    /// Returns `true` for the placeholder slot.
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

/// Everything the view owns, behind one lock.
pub(crate) struct ViewState<T: ViewItem> {
    pub(crate) projection: Vec<T>,
    pub(crate) filtered_out: Vec<T>,
    pub(crate) sort: SortPolicy<T>,
    pub(crate) filter: Option<FilterFn<T>>,
    pub(crate) grouping: GroupingPolicy<T>,
    pub(crate) groups: Option<GroupTree<T>>,
    pub(crate) live: LiveOptions,
    pub(crate) tracker: LiveTracker<T>,
    pub(crate) currency: CurrencyState<T>,
    pub(crate) transaction: TransactionState<T>,
    pub(crate) placeholder: PlaceholderPosition,
    pub(crate) defer_count: usize,
    pub(crate) needs_refresh: bool,
}

impl<T: ViewItem> ViewState<T> {
    fn new(items_observable: bool) -> Self {
        Self {
            projection: Vec::new(),
            filtered_out: Vec::new(),
            sort: SortPolicy::Unsorted,
            filter: None,
            grouping: GroupingPolicy::default(),
            groups: None,
            live: LiveOptions::new(items_observable),
            tracker: LiveTracker::new(),
            currency: CurrencyState::empty(),
            transaction: TransactionState::Idle,
            placeholder: PlaceholderPosition::None,
            defer_count: 0,
            needs_refresh: false,
        }
    }

    pub(crate) fn grouped(&self) -> bool {
        self.groups.is_some()
    }

    fn has_placeholder(&self) -> bool {
        self.placeholder != PlaceholderPosition::None
    }

    /// Total view slots: projection plus placeholder plus pending new item.
    pub(crate) fn count(&self) -> usize {
        match &self.groups {
            Some(tree) => tree.len(),
            None => {
                self.projection.len()
                    + usize::from(self.has_placeholder())
                    + usize::from(self.transaction.adding().is_some())
            }
        }
    }

    /// Start of the projection range in ungrouped view indices.
    fn view_offset(&self) -> usize {
        if self.placeholder == PlaceholderPosition::AtBeginning {
            1 + usize::from(self.transaction.adding().is_some())
        } else {
            0
        }
    }

    pub(crate) fn placeholder_view_index(&self) -> Option<usize> {
        if let Some(tree) = &self.groups {
            return tree.placeholder_index();
        }
        match self.placeholder {
            PlaceholderPosition::None => None,
            PlaceholderPosition::AtBeginning => Some(0),
            PlaceholderPosition::AtEnd => Some(self.count() - 1),
        }
    }

    /// Provisional slot of the pending new item, adjacent to the
    /// placeholder.
    pub(crate) fn new_item_view_index(&self) -> Option<usize> {
        self.transaction.adding()?;
        if let Some(tree) = &self.groups {
            return tree.new_item_index();
        }
        Some(match self.placeholder {
            PlaceholderPosition::AtBeginning => 1,
            PlaceholderPosition::AtEnd => self.count() - 2,
            PlaceholderPosition::None => self.count() - 1,
        })
    }

    pub(crate) fn proj_to_view(&self, projection_index: usize) -> usize {
        projection_index + self.view_offset()
    }

    pub(crate) fn slot_at(&self, index: usize) -> Option<ViewSlot<T>> {
        if let Some(tree) = &self.groups {
            return tree.slot_at(index);
        }
        if self.placeholder_view_index() == Some(index) {
            return Some(ViewSlot::Placeholder);
        }
        if self.new_item_view_index() == Some(index) {
            return self.transaction.adding().cloned().map(ViewSlot::Item);
        }
        let offset = self.view_offset();
        index
            .checked_sub(offset)
            .and_then(|at| self.projection.get(at))
            .cloned()
            .map(ViewSlot::Item)
    }

    pub(crate) fn index_of_item(&self, item: &T) -> Option<usize> {
        if let Some(tree) = &self.groups {
            return tree.flat_index_of(item);
        }
        if self.transaction.adding() == Some(item) {
            return self.new_item_view_index();
        }
        self.projection
            .iter()
            .position(|probe| probe == item)
            .map(|at| self.proj_to_view(at))
    }

    pub(crate) fn comparer(&self) -> Option<CompareFn<T>> {
        self.sort.comparer()
    }

    pub(crate) fn item_passes(&self, item: &T) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(item))
    }

    pub(crate) fn in_filtered_out(&self, item: &T) -> bool {
        self.filtered_out.iter().any(|probe| probe == item)
    }

    pub(crate) fn remove_filtered_out(&mut self, item: &T) -> bool {
        match self.filtered_out.iter().position(|probe| probe == item) {
            Some(at) => {
                self.filtered_out.remove(at);
                true
            }
            None => false,
        }
    }
}

/// Shared heart of a view; the public [`CollectionView`] is a thin handle.
pub(crate) struct ViewCore<T: ViewItem> {
    pub(crate) adapter: SourceAdapter<T>,
    pub(crate) state: RwLock<ViewState<T>>,
    pub(crate) signals: ViewSignals<T>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) live_pass_scheduled: AtomicBool,
    pub(crate) live_hooks: Mutex<Option<LiveHooks<T>>>,
    pub(crate) source_connection: Mutex<Option<ConnectionId>>,
}

impl<T: ViewItem> ViewCore<T> {
    pub(crate) fn dispatch(&self, notices: Vec<Notice<T>>) {
        if !notices.is_empty() {
            self.signals.dispatch_all(notices);
        }
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    pub(crate) fn refresh_or_defer(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        notices: &mut Vec<Notice<T>>,
    ) {
        if state.defer_count > 0 {
            state.needs_refresh = true;
        } else {
            Self::do_refresh_locked(core, state, notices);
        }
    }

    /// Full rebuild of projection, group tree, watches, and currency from
    /// the shadow copy.
    pub(crate) fn do_refresh_locked(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        notices: &mut Vec<Notice<T>>,
    ) {
        let shadow = core.adapter.shadow_clone();
        let pending = state.transaction.adding().cloned();
        let comparer = state.comparer();
        tracing::debug!(
            target: "horizon_prism::view",
            source_len = shadow.len(),
            sorted = comparer.is_some(),
            filtered = state.filter.is_some(),
            grouped = state.grouping.is_active(),
            "refreshing projection"
        );

        let was_empty = state.count() == 0;
        state.filtered_out.clear();
        let mut projection = Vec::with_capacity(shadow.len());
        for item in shadow {
            if pending.as_ref() == Some(&item) {
                continue;
            }
            if state.item_passes(&item) {
                projection.push(item);
            } else {
                state.filtered_out.push(item);
            }
        }
        if let Some(comparer) = &comparer {
            // sort_by is stable: equal keys keep their source order.
            projection.sort_by(|a, b| comparer(a, b));
        }
        state.projection = projection;

        state.groups = if state.grouping.is_active() {
            let mut tree = GroupTree::new();
            tree.sync_specials(state.placeholder, pending.clone());
            for item in state.projection.clone() {
                let path = state.grouping.key_path(&item);
                tree.add_item(item, &path, comparer.as_ref(), &state.projection);
            }
            Some(tree)
        } else {
            None
        };

        state.needs_refresh = false;
        Self::rebuild_watches(core, state);

        notices.push(Notice::Collection(CollectionChange::Reset));
        notices.push(Notice::Property(ViewProperty::Count));
        if was_empty != (state.count() == 0) {
            notices.push(Notice::Property(ViewProperty::IsEmpty));
        }

        // Currency follows the old current item when it survived, else the
        // old position clamped into the new bounds.
        let old_item = state.currency.item.clone();
        let old_position = state.currency.position;
        match old_item.as_ref().and_then(|item| state.index_of_item(item)) {
            Some(index) => update_currency_position_quiet(state, index as isize, notices),
            None => {
                let target = old_position.min(state.count() as isize - 1);
                seat_currency_at(state, target, notices);
            }
        }
    }

    /// Shadow diverged from the source; log and rebuild wholesale.
    pub(crate) fn recover_consistency(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        notices: &mut Vec<Notice<T>>,
    ) {
        tracing::error!(
            target: "horizon_prism::view",
            "shadow copy inconsistent with source; recovering with a full refresh"
        );
        core.adapter.refresh_shadow();
        Self::refresh_or_defer(core, state, notices);
    }

    // -------------------------------------------------------------------------
    // Live-shaping watch bookkeeping
    // -------------------------------------------------------------------------

    pub(crate) fn rebuild_watches(core: &Arc<Self>, state: &mut ViewState<T>) {
        let hooks = core.live_hooks.lock().clone();
        let dropped = state.tracker.clear();
        if let Some(hooks) = &hooks {
            for (item, connection) in dropped {
                (hooks.unwatch)(&item, connection);
            }
        }
        let Some(hooks) = hooks else { return };
        if !state.live.any_enabled() {
            return;
        }
        let mut members: Vec<T> = state.projection.clone();
        members.extend(state.filtered_out.iter().cloned());
        if let Some(pending) = state.transaction.adding() {
            members.push(pending.clone());
        }
        for item in members {
            let connection = (hooks.watch)(core, &item);
            state.tracker.watch(item, connection);
        }
    }

    pub(crate) fn watch_item(core: &Arc<Self>, state: &mut ViewState<T>, item: &T) {
        if !state.live.any_enabled() || state.tracker.is_watched(item) {
            return;
        }
        let hooks = core.live_hooks.lock().clone();
        if let Some(hooks) = hooks {
            let connection = (hooks.watch)(core, item);
            state.tracker.watch(item.clone(), connection);
        }
    }

    pub(crate) fn unwatch_item(&self, state: &mut ViewState<T>, item: &T) {
        if let Some(connection) = state.tracker.remove(item) {
            if let Some(hooks) = self.live_hooks.lock().as_ref() {
                (hooks.unwatch)(item, connection);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Source event pipeline
    // -------------------------------------------------------------------------

    pub(crate) fn on_source_event(core: &Arc<Self>, event: SourceEvent<T>) {
        if !core.dispatcher.is_owner_thread() {
            if !core.adapter.has_sync_hook() {
                tracing::warn!(
                    target: "horizon_prism::view",
                    "source event from a foreign thread without a sync hook; deferring"
                );
            }
            let weak = Arc::downgrade(core);
            core.dispatcher.post(move || {
                if let Some(core) = weak.upgrade() {
                    Self::process_source_event(&core, event);
                }
            });
            return;
        }
        Self::process_source_event(core, event);
    }

    pub(crate) fn process_source_event(core: &Arc<Self>, event: SourceEvent<T>) {
        let mut notices = Vec::new();
        {
            let mut state = core.state.write();
            Self::handle_event_locked(core, &mut state, event, &mut notices);
        }
        core.dispatch(notices);
    }

    fn handle_event_locked(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        event: SourceEvent<T>,
        notices: &mut Vec<Notice<T>>,
    ) {
        if matches!(event, SourceEvent::Reset) {
            core.adapter.refresh_shadow();
            Self::refresh_or_defer(core, state, notices);
            return;
        }

        // The pending new item is excluded from shaping; its insert and
        // removal bypass normal translation.
        if let SourceEvent::Insert { item, .. } = &event {
            if state.transaction.adding() == Some(item) {
                if core.adapter.apply(&event).is_err() {
                    Self::recover_consistency(core, state, notices);
                    return;
                }
                if state.defer_count > 0 {
                    state.needs_refresh = true;
                    return;
                }
                Self::place_pending_new(core, state, notices);
                return;
            }
        }
        if let SourceEvent::Remove { item, .. } = &event {
            if state.transaction.adding() == Some(item) {
                if core.adapter.apply(&event).is_err() {
                    Self::recover_consistency(core, state, notices);
                    return;
                }
                if state.defer_count > 0 {
                    state.transaction = TransactionState::Idle;
                    state.needs_refresh = true;
                    return;
                }
                Self::end_pending_new_by_removal(core, state, notices);
                return;
            }
            // Third-party removal of the edited item silently ends the
            // transaction; the structural change still processes normally.
            if state.transaction.editing() == Some(item) {
                state.transaction = TransactionState::Idle;
                notices.push(Notice::Property(ViewProperty::IsEditingItem));
                notices.push(Notice::Property(ViewProperty::CurrentEditItem));
            }
        }

        if state.defer_count > 0 {
            if core.adapter.apply(&event).is_err() {
                core.adapter.refresh_shadow();
            }
            state.needs_refresh = true;
            return;
        }

        let translation = core
            .adapter
            .with_shadow(|shadow| Self::translate(state, shadow, &event));
        if core.adapter.apply(&event).is_err() {
            Self::recover_consistency(core, state, notices);
            return;
        }
        let (action, old_hint, new_hint) = translation;
        let effective = effective_change(action, old_hint, new_hint, || {
            let target = match &event {
                SourceEvent::Insert { item, .. }
                | SourceEvent::Remove { item, .. }
                | SourceEvent::Move { item, .. } => item,
                SourceEvent::Replace { old, .. } => old,
                SourceEvent::Reset => return None,
            };
            state.projection.iter().position(|probe| probe == target)
        });
        tracing::trace!(
            target: "horizon_prism::view",
            ?action,
            ?old_hint,
            ?new_hint,
            ?effective,
            "translated source event"
        );
        Self::apply_effective(core, state, effective, &event, notices);
    }

    fn translate(
        state: &ViewState<T>,
        shadow: &[T],
        event: &SourceEvent<T>,
    ) -> (SourceAction, IndexHint, IndexHint) {
        let pending_index = state
            .transaction
            .adding()
            .and_then(|pending| shadow.iter().position(|probe| probe == pending));
        match event {
            SourceEvent::Insert { index, item } => (
                SourceAction::Insert,
                IndexHint::NotInView,
                Self::resolve_entry(state, shadow, item, *index, pending_index),
            ),
            SourceEvent::Remove { index, item } => (
                SourceAction::Remove,
                Self::resolve_member(state, shadow, item, *index, pending_index),
                IndexHint::NotInView,
            ),
            SourceEvent::Replace { index, old, new } => {
                let old_hint = Self::resolve_member(state, shadow, old, *index, pending_index);
                let new_hint = if !state.item_passes(new) {
                    IndexHint::NotInView
                } else if let Some(comparer) = state.comparer() {
                    let mut at = insertion_index(&state.projection, new, &comparer);
                    // The search ran over a projection still holding the old
                    // item; discount its slot.
                    if let IndexHint::Known(old_at) = old_hint {
                        if old_at < at {
                            at -= 1;
                        }
                    }
                    IndexHint::Known(at)
                } else if state.filter.is_some() {
                    IndexHint::Known(correspondence_index(
                        shadow,
                        &state.projection,
                        *index,
                        None,
                    ))
                } else {
                    IndexHint::Known(arithmetic_index(*index, pending_index))
                };
                (SourceAction::Replace, old_hint, new_hint)
            }
            SourceEvent::Move { from, to, item } => {
                let old_hint = Self::resolve_member(state, shadow, item, *from, pending_index);
                let new_hint = if !state.item_passes(item) {
                    IndexHint::NotInView
                } else if let Some(comparer) = state.comparer() {
                    // Sort order is indifferent to source position.
                    match old_hint {
                        IndexHint::Known(at) => IndexHint::Known(at),
                        _ => IndexHint::Known(insertion_index(&state.projection, item, &comparer)),
                    }
                } else {
                    IndexHint::Known(correspondence_index(
                        shadow,
                        &state.projection,
                        *to,
                        Some(item),
                    ))
                };
                (SourceAction::Move, old_hint, new_hint)
            }
            SourceEvent::Reset => unreachable!("reset is handled before translation"),
        }
    }

    /// Resolves where a new arrival lands in the projection.
    fn resolve_entry(
        state: &ViewState<T>,
        shadow: &[T],
        item: &T,
        source_index: usize,
        pending_index: Option<usize>,
    ) -> IndexHint {
        if !state.item_passes(item) {
            return IndexHint::NotInView;
        }
        if let Some(comparer) = state.comparer() {
            return IndexHint::Known(insertion_index(&state.projection, item, &comparer));
        }
        if state.filter.is_some() {
            return IndexHint::Known(correspondence_index(
                shadow,
                &state.projection,
                source_index,
                None,
            ));
        }
        IndexHint::Known(arithmetic_index(source_index, pending_index))
    }

    /// Resolves where an existing member currently sits in the projection.
    fn resolve_member(
        state: &ViewState<T>,
        shadow: &[T],
        item: &T,
        source_index: usize,
        pending_index: Option<usize>,
    ) -> IndexHint {
        if state.in_filtered_out(item) {
            return IndexHint::NotInView;
        }
        if let Some(comparer) = state.comparer() {
            return match sorted_position_of(&state.projection, item, &comparer) {
                Some(at) => IndexHint::Known(at),
                None if !state.item_passes(item) => IndexHint::NotInView,
                // The sort key drifted since insertion; the binary search
                // can no longer vouch for a position.
                None => IndexHint::Unknown,
            };
        }
        if state.filter.is_some() {
            let at = correspondence_index(shadow, &state.projection, source_index, None);
            return if state.projection.get(at) == Some(item) {
                IndexHint::Known(at)
            } else {
                IndexHint::NotInView
            };
        }
        IndexHint::Known(arithmetic_index(source_index, pending_index))
    }

    fn apply_effective(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        effective: EffectiveChange,
        event: &SourceEvent<T>,
        notices: &mut Vec<Notice<T>>,
    ) {
        // An old item leaving the member set through replacement stops being
        // tracked regardless of which arm runs.
        if let SourceEvent::Replace { old, .. } = event {
            if state.remove_filtered_out(old) {
                core.unwatch_item(state, old);
            }
        }

        match effective {
            EffectiveChange::Reset => {
                Self::refresh_or_defer(core, state, notices);
            }
            EffectiveChange::None => match event {
                SourceEvent::Insert { item, .. } | SourceEvent::Replace { new: item, .. } => {
                    state.filtered_out.push(item.clone());
                    Self::watch_item(core, state, item);
                }
                SourceEvent::Remove { item, .. } => {
                    if state.remove_filtered_out(item) {
                        core.unwatch_item(state, item);
                    }
                }
                // The pinned silent drop: out of view on both sides.
                SourceEvent::Move { .. } | SourceEvent::Reset => {}
            },
            EffectiveChange::Add { index } => {
                if index > state.projection.len() {
                    Self::recover_consistency(core, state, notices);
                    return;
                }
                let item = match event {
                    SourceEvent::Insert { item, .. }
                    | SourceEvent::Move { item, .. }
                    | SourceEvent::Remove { item, .. } => item.clone(),
                    SourceEvent::Replace { new, .. } => new.clone(),
                    SourceEvent::Reset => return,
                };
                // A move can promote an item the filter state had parked.
                state.remove_filtered_out(&item);
                Self::apply_add(core, state, item, index, notices);
            }
            EffectiveChange::Remove { index } => {
                if index >= state.projection.len() {
                    Self::recover_consistency(core, state, notices);
                    return;
                }
                let removed = Self::apply_remove(core, state, index, notices);
                match event {
                    // The member stays in the collection, just out of view.
                    SourceEvent::Move { .. } => {
                        state.filtered_out.push(removed.clone());
                        Self::watch_item(core, state, &removed);
                    }
                    SourceEvent::Replace { new, .. } => {
                        state.filtered_out.push(new.clone());
                        Self::watch_item(core, state, new);
                    }
                    _ => {}
                }
            }
            EffectiveChange::Replace { index } => {
                if index >= state.projection.len() {
                    Self::recover_consistency(core, state, notices);
                    return;
                }
                match event {
                    SourceEvent::Replace { new, .. } => {
                        Self::apply_replace(core, state, index, new.clone(), notices);
                    }
                    // A move that resolves to the same slot refreshes it.
                    SourceEvent::Move { item, .. } => {
                        let view_index = if let Some(tree) = &state.groups {
                            tree.flat_index_of(item)
                        } else {
                            Some(state.proj_to_view(index))
                        };
                        if let Some(view_index) = view_index {
                            notices.push(Notice::Collection(CollectionChange::Replace {
                                old: item.clone(),
                                new: item.clone(),
                                index: view_index,
                            }));
                            adjust_currency_for_replace(state, view_index, item, notices);
                        }
                    }
                    _ => {}
                }
            }
            EffectiveChange::Move { from, to } => {
                if from >= state.projection.len() || to > state.projection.len().saturating_sub(1) {
                    Self::recover_consistency(core, state, notices);
                    return;
                }
                match event {
                    SourceEvent::Replace { old, new, .. } => {
                        Self::apply_replace_relocated(core, state, from, to, old, new, notices);
                    }
                    _ => {
                        Self::apply_move(core, state, from, to, notices);
                    }
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Projection patching primitives (shared with editing and live shaping)
    // -------------------------------------------------------------------------

    /// Inserts into the projection (and tree), announces the Add, adjusts
    /// currency, and starts watching the item. Returns the view index.
    pub(crate) fn apply_add(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        item: T,
        projection_index: usize,
        notices: &mut Vec<Notice<T>>,
    ) -> usize {
        let was_empty = state.count() == 0;
        state.projection.insert(projection_index, item.clone());
        let view_index = if state.grouped() {
            let path = state.grouping.key_path(&item);
            let comparer = state.comparer();
            let ViewState {
                groups, projection, ..
            } = state;
            groups
                .as_mut()
                .expect("grouped() checked")
                .add_item(item.clone(), &path, comparer.as_ref(), projection)
        } else {
            state.proj_to_view(projection_index)
        };
        notices.push(Notice::Collection(CollectionChange::Add {
            item: item.clone(),
            index: view_index,
        }));
        notices.push(Notice::Property(ViewProperty::Count));
        if was_empty {
            notices.push(Notice::Property(ViewProperty::IsEmpty));
        }
        adjust_currency_for_add(state, view_index, was_empty, notices);
        Self::watch_item(core, state, &item);
        view_index
    }

    /// Removes from the projection (and tree), announces the Remove first,
    /// then adjusts currency. Stops watching the item.
    pub(crate) fn apply_remove(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        projection_index: usize,
        notices: &mut Vec<Notice<T>>,
    ) -> T {
        let item = state.projection[projection_index].clone();
        let view_index = if state.grouped() {
            let flat = state
                .groups
                .as_ref()
                .and_then(|tree| tree.flat_index_of(&item));
            let path = state.grouping.key_path(&item);
            if let Some(tree) = &mut state.groups {
                if !tree.remove_item(&item, &path, true) {
                    tree.remove_item_exhaustive(&item, true);
                }
            }
            flat.unwrap_or_else(|| {
                tracing::error!(
                    target: "horizon_prism::view",
                    "leaf missing from group tree during removal"
                );
                0
            })
        } else {
            state.proj_to_view(projection_index)
        };
        state.projection.remove(projection_index);
        notices.push(Notice::Collection(CollectionChange::Remove {
            item: item.clone(),
            index: view_index,
        }));
        notices.push(Notice::Property(ViewProperty::Count));
        if state.count() == 0 {
            notices.push(Notice::Property(ViewProperty::IsEmpty));
        }
        adjust_currency_for_remove(state, view_index, notices);
        core.unwatch_item(state, &item);
        item
    }

    /// Relocates within the projection (and tree) and announces the Move.
    pub(crate) fn apply_move(
        _core: &Arc<Self>,
        state: &mut ViewState<T>,
        from: usize,
        to: usize,
        notices: &mut Vec<Notice<T>>,
    ) {
        let item = state.projection.remove(from);
        state.projection.insert(to, item.clone());
        if state.grouped() {
            let path = state.grouping.key_path(&item);
            let comparer = state.comparer();
            let ViewState {
                groups, projection, ..
            } = state;
            let moved = groups
                .as_mut()
                .expect("grouped() checked")
                .move_item(&item, &path, comparer.as_ref(), projection);
            if let Some((old_flat, new_flat)) = moved {
                if old_flat != new_flat {
                    notices.push(Notice::Collection(CollectionChange::Move {
                        item,
                        from: old_flat,
                        to: new_flat,
                    }));
                    adjust_currency_for_move(state, old_flat, new_flat, notices);
                }
            }
        } else {
            let from_view = state.proj_to_view(from);
            let to_view = state.proj_to_view(to);
            notices.push(Notice::Collection(CollectionChange::Move {
                item,
                from: from_view,
                to: to_view,
            }));
            adjust_currency_for_move(state, from_view, to_view, notices);
        }
    }

    /// Replaces in place and announces Replace (or Remove+Add across
    /// groups).
    pub(crate) fn apply_replace(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        projection_index: usize,
        new_item: T,
        notices: &mut Vec<Notice<T>>,
    ) {
        let old = std::mem::replace(&mut state.projection[projection_index], new_item.clone());
        if state.grouped() {
            let old_flat = state
                .groups
                .as_ref()
                .and_then(|tree| tree.flat_index_of(&old));
            if let Some(tree) = &mut state.groups {
                if !tree.remove_item_exhaustive(&old, true) {
                    tracing::error!(
                        target: "horizon_prism::view",
                        "leaf missing from group tree during replace"
                    );
                }
            }
            let path = state.grouping.key_path(&new_item);
            let comparer = state.comparer();
            let new_flat = {
                let ViewState {
                    groups, projection, ..
                } = state;
                groups.as_mut().expect("grouped() checked").add_item(
                    new_item.clone(),
                    &path,
                    comparer.as_ref(),
                    projection,
                )
            };
            match old_flat {
                Some(old_flat) if old_flat == new_flat => {
                    notices.push(Notice::Collection(CollectionChange::Replace {
                        old: old.clone(),
                        new: new_item.clone(),
                        index: new_flat,
                    }));
                    adjust_currency_for_replace(state, new_flat, &new_item, notices);
                }
                Some(old_flat) => {
                    // Group membership changed: announce as departure plus
                    // arrival.
                    notices.push(Notice::Collection(CollectionChange::Remove {
                        item: old.clone(),
                        index: old_flat,
                    }));
                    adjust_currency_for_remove(state, old_flat, notices);
                    notices.push(Notice::Collection(CollectionChange::Add {
                        item: new_item.clone(),
                        index: new_flat,
                    }));
                    adjust_currency_for_add(state, new_flat, false, notices);
                }
                None => {}
            }
        } else {
            let view_index = state.proj_to_view(projection_index);
            notices.push(Notice::Collection(CollectionChange::Replace {
                old: old.clone(),
                new: new_item.clone(),
                index: view_index,
            }));
            adjust_currency_for_replace(state, view_index, &new_item, notices);
        }
        core.unwatch_item(state, &old);
        Self::watch_item(core, state, &new_item);
    }

    /// A replacement whose new item ranks elsewhere: the old item leaves
    /// `from`, the new item enters at `to`.
    fn apply_replace_relocated(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        from: usize,
        to: usize,
        old: &T,
        new: &T,
        notices: &mut Vec<Notice<T>>,
    ) {
        state.projection.remove(from);
        state.projection.insert(to, new.clone());
        if state.grouped() {
            let old_flat = state.groups.as_ref().and_then(|tree| tree.flat_index_of(old));
            if let Some(tree) = &mut state.groups {
                tree.remove_item_exhaustive(old, true);
            }
            let path = state.grouping.key_path(new);
            let comparer = state.comparer();
            let new_flat = {
                let ViewState {
                    groups, projection, ..
                } = state;
                groups.as_mut().expect("grouped() checked").add_item(
                    new.clone(),
                    &path,
                    comparer.as_ref(),
                    projection,
                )
            };
            if let Some(old_flat) = old_flat {
                notices.push(Notice::Collection(CollectionChange::Remove {
                    item: old.clone(),
                    index: old_flat,
                }));
                adjust_currency_for_remove(state, old_flat, notices);
            }
            notices.push(Notice::Collection(CollectionChange::Add {
                item: new.clone(),
                index: new_flat,
            }));
            adjust_currency_for_add(state, new_flat, false, notices);
        } else {
            let from_view = state.proj_to_view(from);
            let to_view = state.proj_to_view(to);
            notices.push(Notice::Collection(CollectionChange::Move {
                item: new.clone(),
                from: from_view,
                to: to_view,
            }));
            if state.currency.position == from_view as isize {
                seat_currency_at(state, to_view as isize, notices);
            } else {
                adjust_currency_for_move(state, from_view, to_view, notices);
            }
        }
        core.unwatch_item(state, old);
        Self::watch_item(core, state, new);
    }

    /// The projection index a member belongs at under the current policies:
    /// sort position when sorted, shadow order otherwise.
    pub(crate) fn resolved_projection_index(&self, state: &ViewState<T>, item: &T) -> usize {
        if let Some(comparer) = state.comparer() {
            return insertion_index(&state.projection, item, &comparer);
        }
        let Some(source_index) = self.adapter.shadow_index_of(item) else {
            return state.projection.len();
        };
        if state.filter.is_some() {
            self.adapter.with_shadow(|shadow| {
                correspondence_index(shadow, &state.projection, source_index, None)
            })
        } else {
            let pending_index = state
                .transaction
                .adding()
                .and_then(|pending| self.adapter.shadow_index_of(pending));
            arithmetic_index(source_index, pending_index)
        }
    }

    // -------------------------------------------------------------------------
    // Pending-add placement
    // -------------------------------------------------------------------------

    /// The add-transaction item just entered the source: place it in its
    /// provisional slot next to the placeholder.
    fn place_pending_new(core: &Arc<Self>, state: &mut ViewState<T>, notices: &mut Vec<Notice<T>>) {
        let Some(item) = state.transaction.adding().cloned() else {
            return;
        };
        // The pending item already counts; emptiness is judged without it.
        let was_empty = state.projection.is_empty() && !state.has_placeholder();
        let placeholder = state.placeholder;
        if let Some(tree) = &mut state.groups {
            tree.sync_specials(placeholder, Some(item.clone()));
        }
        let index = state.new_item_view_index().unwrap_or(0);
        notices.push(Notice::Collection(CollectionChange::Add {
            item: item.clone(),
            index,
        }));
        notices.push(Notice::Property(ViewProperty::Count));
        if was_empty {
            notices.push(Notice::Property(ViewProperty::IsEmpty));
        }
        Self::watch_item(core, state, &item);
    }

    /// The add-transaction item left the source (cancel, or a third party):
    /// the transaction silently ends.
    pub(crate) fn end_pending_new_by_removal(
        core: &Arc<Self>,
        state: &mut ViewState<T>,
        notices: &mut Vec<Notice<T>>,
    ) {
        let Some(item) = state.transaction.adding().cloned() else {
            return;
        };
        let index = state.new_item_view_index().unwrap_or(0);
        state.transaction = TransactionState::Idle;
        let placeholder = state.placeholder;
        if let Some(tree) = &mut state.groups {
            tree.sync_specials(placeholder, None);
        }
        notices.push(Notice::Collection(CollectionChange::Remove {
            item: item.clone(),
            index,
        }));
        notices.push(Notice::Property(ViewProperty::Count));
        if state.count() == 0 {
            notices.push(Notice::Property(ViewProperty::IsEmpty));
        }
        notices.push(Notice::Property(ViewProperty::IsAddingNew));
        notices.push(Notice::Property(ViewProperty::CurrentAddItem));
        adjust_currency_for_remove(state, index, notices);
        core.unwatch_item(state, &item);
    }
}

/// Builder for [`CollectionView`]: source plus the optional synchronization
/// hook and dispatcher.
pub struct CollectionViewBuilder<T: ViewItem> {
    source: Arc<dyn SourceModel<T>>,
    sync: Option<SyncHook>,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl<T: ViewItem> CollectionViewBuilder<T> {
    /// Enables cross-thread source access through the given hook.
    pub fn synchronization(mut self, hook: SyncHook) -> Self {
        self.sync = Some(hook);
        self
    }

    /// Uses an explicit dispatcher instead of a private one. Share a
    /// dispatcher between views that live on the same owner thread.
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Builds the view, takes the initial snapshot, and wires it to the
    /// source's change signal.
    pub fn build(self) -> CollectionView<T> {
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(Dispatcher::new()));
        let adapter = SourceAdapter::new(self.source.clone(), self.sync);
        let items_observable = adapter.capabilities().items_observable;
        let core = Arc::new(ViewCore {
            adapter,
            state: RwLock::new(ViewState::new(items_observable)),
            signals: ViewSignals::new(),
            dispatcher,
            live_pass_scheduled: AtomicBool::new(false),
            live_hooks: Mutex::new(None),
            source_connection: Mutex::new(None),
        });

        {
            let mut state = core.state.write();
            let mut startup = Vec::new();
            ViewCore::do_refresh_locked(&core, &mut state, &mut startup);
            // Initial currency: the first item, if any.
            let first = (0..state.count())
                .find(|index| matches!(state.slot_at(*index), Some(ViewSlot::Item(_))));
            if let Some(index) = first {
                seat_currency_at(&mut state, index as isize, &mut startup);
            }
            // Nobody is connected yet; startup notices go nowhere.
        }

        let weak = Arc::downgrade(&core);
        let connection = self.source.events().connect(move |event| {
            if let Some(core) = weak.upgrade() {
                ViewCore::on_source_event(&core, event.clone());
            }
        });
        *core.source_connection.lock() = Some(connection);

        CollectionView { core }
    }
}

/// A derived, navigable, editable projection over a source collection.
///
/// The view maintains a filtered, sorted, optionally grouped ordering of the
/// source's items, a currency cursor, and add/edit transactions, staying
/// consistent under single-item structural source changes.
///
/// # Example
///
/// ```ignore
/// let source = Arc::new(VecModel::new(people));
/// let view = CollectionView::new(source.clone());
/// view.set_sort_keys(vec![SortKey::ascending("name")])?;
/// view.set_filter(|person: &Person| person.active())?;
/// assert!(view.count()? <= source.len());
/// ```
pub struct CollectionView<T: ViewItem> {
    pub(crate) core: Arc<ViewCore<T>>,
}

impl<T: ViewItem> CollectionView<T> {
    /// Creates a view over `source` with default configuration.
    pub fn new<S>(source: Arc<S>) -> Self
    where
        S: SourceModel<T> + 'static,
    {
        Self::builder(source).build()
    }

    /// Starts a builder for a view over `source`.
    pub fn builder<S>(source: Arc<S>) -> CollectionViewBuilder<T>
    where
        S: SourceModel<T> + 'static,
    {
        CollectionViewBuilder {
            source: source as Arc<dyn SourceModel<T>>,
            sync: None,
            dispatcher: None,
        }
    }

    /// The view's notification signals.
    pub fn signals(&self) -> &ViewSignals<T> {
        &self.core.signals
    }

    /// The dispatcher deferred work (live shaping passes, cross-thread
    /// events) is posted to. The owner thread drains it with
    /// [`Dispatcher::run_pending`].
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.core.dispatcher
    }

    /// Disconnects the view from its source and drops all item watches.
    /// Also runs on drop.
    pub fn detach(&self) {
        if let Some(connection) = self.core.source_connection.lock().take() {
            self.core.adapter.source().events().disconnect(connection);
        }
        let mut state = self.core.state.write();
        let hooks = self.core.live_hooks.lock().clone();
        for (item, connection) in state.tracker.clear() {
            if let Some(hooks) = &hooks {
                (hooks.unwatch)(&item, connection);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    fn read(&self) -> PrismResult<RwLockReadGuard<'_, ViewState<T>>> {
        let guard = self.core.state.read();
        if guard.defer_count > 0 {
            return Err(PrismError::RefreshDeferred);
        }
        Ok(guard)
    }

    /// Number of view slots, including the placeholder and a pending new
    /// item.
    pub fn count(&self) -> PrismResult<usize> {
        Ok(self.read()?.count())
    }

    /// Returns `true` when the view has no slots at all.
    pub fn is_empty(&self) -> PrismResult<bool> {
        Ok(self.read()?.count() == 0)
    }

    /// The slot at a view index.
    pub fn item_at(&self, index: usize) -> PrismResult<ViewSlot<T>> {
        self.read()?
            .slot_at(index)
            .ok_or(PrismError::Usage("view index out of bounds"))
    }

    /// View index of `item`, by identity.
    pub fn index_of(&self, item: &T) -> PrismResult<Option<usize>> {
        Ok(self.read()?.index_of_item(item))
    }

    /// Whether `item` currently occupies a view slot.
    pub fn contains(&self, item: &T) -> PrismResult<bool> {
        Ok(self.read()?.index_of_item(item).is_some())
    }

    /// A snapshot of every view slot, in view order.
    pub fn items(&self) -> PrismResult<Vec<ViewSlot<T>>> {
        let state = self.read()?;
        Ok((0..state.count())
            .filter_map(|index| state.slot_at(index))
            .collect())
    }

    /// A snapshot of the group tree root, when grouping is active.
    pub fn groups(&self) -> PrismResult<Option<GroupNode<T>>> {
        Ok(self.read()?.groups.as_ref().map(|tree| tree.root().clone()))
    }

    // -------------------------------------------------------------------------
    // Shaping configuration
    // -------------------------------------------------------------------------

    /// Whether the source supports filtering.
    pub fn can_filter(&self) -> bool {
        self.core.adapter.capabilities().filterable
    }

    /// Whether the source supports sorting.
    pub fn can_sort(&self) -> bool {
        self.core.adapter.capabilities().sortable
    }

    /// Sets the filter predicate and reshapes (or defers).
    pub fn set_filter<F>(&self, filter: F) -> PrismResult<()>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        if !self.can_filter() {
            return Err(PrismError::CapabilityUnsupported("filtering"));
        }
        self.reconfigure(|state, notices| {
            state.filter = Some(Arc::new(filter));
            notices.push(Notice::Property(ViewProperty::Filter));
        })
    }

    /// Clears the filter predicate.
    pub fn clear_filter(&self) -> PrismResult<()> {
        self.reconfigure(|state, notices| {
            state.filter = None;
            notices.push(Notice::Property(ViewProperty::Filter));
        })
    }

    /// The active filter predicate.
    pub fn filter(&self) -> Option<FilterFn<T>> {
        self.core.state.read().filter.clone()
    }

    /// Sorts by the given keys, clearing any custom comparer.
    pub fn set_sort_keys(&self, keys: Vec<SortKey>) -> PrismResult<()> {
        if !self.can_sort() {
            return Err(PrismError::CapabilityUnsupported("sorting"));
        }
        self.reconfigure(|state, notices| {
            state.sort = if keys.is_empty() {
                SortPolicy::Unsorted
            } else {
                SortPolicy::Keys(keys)
            };
            notices.push(Notice::Property(ViewProperty::SortPolicy));
        })
    }

    /// Sorts by a custom comparer, clearing any key list.
    pub fn set_sort_comparer<F>(&self, comparer: F) -> PrismResult<()>
    where
        F: Fn(&T, &T) -> std::cmp::Ordering + Send + Sync + 'static,
    {
        if !self.can_sort() {
            return Err(PrismError::CapabilityUnsupported("sorting"));
        }
        self.reconfigure(|state, notices| {
            state.sort = SortPolicy::Comparer(Arc::new(comparer));
            notices.push(Notice::Property(ViewProperty::SortPolicy));
        })
    }

    /// Restores source order.
    pub fn clear_sort(&self) -> PrismResult<()> {
        self.reconfigure(|state, notices| {
            state.sort = SortPolicy::Unsorted;
            notices.push(Notice::Property(ViewProperty::SortPolicy));
        })
    }

    /// The active sort policy.
    pub fn sort_policy(&self) -> SortPolicy<T> {
        self.core.state.read().sort.clone()
    }

    /// Groups by the given ordered descriptions, clearing any selector.
    pub fn set_group_descriptions(&self, descriptions: Vec<GroupDescription<T>>) -> PrismResult<()> {
        self.reconfigure(|state, notices| {
            state.grouping = GroupingPolicy {
                descriptions,
                selector: None,
            };
            notices.push(Notice::Property(ViewProperty::GroupDescriptions));
        })
    }

    /// Groups by a recursive description selector, clearing any declared
    /// list.
    pub fn set_group_selector<F>(&self, selector: F) -> PrismResult<()>
    where
        F: Fn(usize, Option<&crate::value::PropertyValue>) -> Option<GroupDescription<T>>
            + Send
            + Sync
            + 'static,
    {
        self.reconfigure(|state, notices| {
            state.grouping = GroupingPolicy {
                descriptions: Vec::new(),
                selector: Some(Arc::new(selector) as GroupSelectorFn<T>),
            };
            notices.push(Notice::Property(ViewProperty::GroupDescriptions));
        })
    }

    /// Removes all grouping.
    pub fn clear_grouping(&self) -> PrismResult<()> {
        self.reconfigure(|state, notices| {
            state.grouping = GroupingPolicy::default();
            notices.push(Notice::Property(ViewProperty::GroupDescriptions));
        })
    }

    /// The declared group descriptions.
    pub fn group_descriptions(&self) -> Vec<GroupDescription<T>> {
        self.core.state.read().grouping.descriptions.clone()
    }

    fn reconfigure(
        &self,
        change: impl FnOnce(&mut ViewState<T>, &mut Vec<Notice<T>>),
    ) -> PrismResult<()> {
        let mut notices = Vec::new();
        {
            let mut state = self.core.state.write();
            change(&mut state, &mut notices);
            ViewCore::refresh_or_defer(&self.core, &mut state, &mut notices);
        }
        self.core.dispatch(notices);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Refresh control
    // -------------------------------------------------------------------------

    /// Rebuilds the projection wholesale (deferred while a defer scope is
    /// open).
    pub fn refresh(&self) {
        let mut notices = Vec::new();
        {
            let mut state = self.core.state.write();
            ViewCore::refresh_or_defer(&self.core, &mut state, &mut notices);
        }
        self.core.dispatch(notices);
    }

    /// Opens a deferral scope. While any scope is open, structural
    /// recomputation is suppressed and reads fail with
    /// [`PrismError::RefreshDeferred`]; dropping the last scope runs exactly
    /// one refresh.
    pub fn defer_refresh(&self) -> DeferScope<T> {
        self.core.state.write().defer_count += 1;
        DeferScope {
            core: self.core.clone(),
        }
    }
}

impl<T: ViewItem> Drop for CollectionView<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

/// RAII deferral token returned by [`CollectionView::defer_refresh`].
pub struct DeferScope<T: ViewItem> {
    core: Arc<ViewCore<T>>,
}

impl<T: ViewItem> Drop for DeferScope<T> {
    fn drop(&mut self) {
        let mut notices = Vec::new();
        {
            let mut state = self.core.state.write();
            state.defer_count -= 1;
            if state.defer_count == 0 {
                ViewCore::do_refresh_locked(&self.core, &mut state, &mut notices);
            }
        }
        self.core.dispatch(notices);
    }
}
