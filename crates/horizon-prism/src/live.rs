//! Live shaping: continuous sort/filter/group maintenance as item
//! properties change.
//!
//! When a live aspect is enabled, the view subscribes to every member
//! item's change signal (including filtered-out members, which may be
//! promoted back). A property change marks the item's dirty flags for the
//! aspects the property is relevant to and schedules one coalesced
//! restoration pass on the dispatcher - never synchronously inside the
//! notification, so bursts of changes cost one pass.
//!
//! The restoration pass re-validates item positions rather than trusting
//! the flags' snapshot: ordinary structural events may have landed between
//! the marking and the pass.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use horizon_prism_core::ConnectionId;

use crate::currency::revalidate_currency;
use crate::error::{PrismError, PrismResult};
use crate::events::{CollectionChange, Notice, ViewProperty};
use crate::item::{ObservableItem, ViewItem};
use crate::policy::insertion_index;
use crate::view::{CollectionView, ViewCore, ViewState};

/// Dirty-item density above which the sort restoration abandons per-item
/// relocation for one stable insertion sort of the whole projection.
///
/// A tuning constant inherited from the behavior this engine reproduces;
/// override per view with
/// [`CollectionView::set_live_sort_density_threshold`].
pub const LIVE_SORT_DENSITY_THRESHOLD: f64 = 0.8;

/// Tri-state live settings and watched-property name lists.
pub(crate) struct LiveOptions {
    /// `None` means the source cannot say (items are not observable).
    pub(crate) sorting: Option<bool>,
    pub(crate) filtering: Option<bool>,
    pub(crate) grouping: Option<bool>,
    pub(crate) sorting_properties: Vec<String>,
    pub(crate) filtering_properties: Vec<String>,
    pub(crate) grouping_properties: Vec<String>,
    pub(crate) density_threshold: f64,
}

impl LiveOptions {
    pub(crate) fn new(items_observable: bool) -> Self {
        let default = if items_observable { Some(false) } else { None };
        Self {
            sorting: default,
            filtering: default,
            grouping: default,
            sorting_properties: Vec::new(),
            filtering_properties: Vec::new(),
            grouping_properties: Vec::new(),
            density_threshold: LIVE_SORT_DENSITY_THRESHOLD,
        }
    }

    pub(crate) fn any_enabled(&self) -> bool {
        self.sorting == Some(true) || self.filtering == Some(true) || self.grouping == Some(true)
    }
}

/// Per-item live-shaping flags.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LiveFlags {
    pub(crate) sort_dirty: bool,
    pub(crate) filter_dirty: bool,
    pub(crate) group_dirty: bool,
    /// The entry was unwatched; swept before the next pass.
    pub(crate) deleted: bool,
    /// The entry forwards item changes into the tracker.
    pub(crate) forward_changes: bool,
}

/// One watched member item.
pub(crate) struct LiveEntry<T> {
    pub(crate) item: T,
    pub(crate) connection: ConnectionId,
    pub(crate) flags: LiveFlags,
}

/// The set of watched items and their dirty flags.
pub(crate) struct LiveTracker<T> {
    entries: Vec<LiveEntry<T>>,
}

impl<T: ViewItem> LiveTracker<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn watch(&mut self, item: T, connection: ConnectionId) {
        self.entries.push(LiveEntry {
            item,
            connection,
            flags: LiveFlags {
                forward_changes: true,
                ..LiveFlags::default()
            },
        });
    }

    pub(crate) fn is_watched(&self, item: &T) -> bool {
        self.entries
            .iter()
            .any(|entry| !entry.flags.deleted && entry.item == *item)
    }

    /// Marks the entry deleted and hands back its connection; the entry is
    /// swept at the next pass so an in-flight pass sees consistent indices.
    pub(crate) fn remove(&mut self, item: &T) -> Option<ConnectionId> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| !entry.flags.deleted && entry.item == *item)?;
        entry.flags.deleted = true;
        entry.flags.forward_changes = false;
        Some(entry.connection)
    }

    /// Drops every entry, returning the live connections for disconnection.
    pub(crate) fn clear(&mut self) -> Vec<(T, ConnectionId)> {
        self.entries
            .drain(..)
            .filter(|entry| !entry.flags.deleted)
            .map(|entry| (entry.item, entry.connection))
            .collect()
    }

    pub(crate) fn sweep(&mut self) {
        self.entries.retain(|entry| !entry.flags.deleted);
    }

    /// Sets the given dirty flags on `item`'s entry. Returns `true` when a
    /// watched entry was marked.
    pub(crate) fn mark(&mut self, item: &T, sort: bool, filter: bool, group: bool) -> bool {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| !entry.flags.deleted && entry.item == *item)
        else {
            return false;
        };
        if !entry.flags.forward_changes {
            return false;
        }
        entry.flags.sort_dirty |= sort;
        entry.flags.filter_dirty |= filter;
        entry.flags.group_dirty |= group;
        true
    }

    pub(crate) fn sort_dirty_items(&self) -> Vec<T> {
        self.dirty_items(|flags| flags.sort_dirty)
    }

    pub(crate) fn filter_dirty_items(&self) -> Vec<T> {
        self.dirty_items(|flags| flags.filter_dirty)
    }

    pub(crate) fn group_dirty_items(&self) -> Vec<T> {
        self.dirty_items(|flags| flags.group_dirty)
    }

    fn dirty_items(&self, flag: impl Fn(&LiveFlags) -> bool) -> Vec<T> {
        self.entries
            .iter()
            .filter(|entry| !entry.flags.deleted && flag(&entry.flags))
            .map(|entry| entry.item.clone())
            .collect()
    }

    pub(crate) fn clear_flags(&mut self) {
        for entry in &mut self.entries {
            entry.flags.sort_dirty = false;
            entry.flags.filter_dirty = false;
            entry.flags.group_dirty = false;
        }
    }
}

/// Type-erased watch/unwatch closures, materialized once live shaping is
/// enabled (where the `ObservableItem` bound is in scope).
pub(crate) struct LiveHooks<T: ViewItem> {
    pub(crate) watch: Arc<dyn Fn(&Arc<ViewCore<T>>, &T) -> ConnectionId + Send + Sync>,
    pub(crate) unwatch: Arc<dyn Fn(&T, ConnectionId) + Send + Sync>,
}

impl<T: ViewItem> Clone for LiveHooks<T> {
    fn clone(&self) -> Self {
        Self {
            watch: self.watch.clone(),
            unwatch: self.unwatch.clone(),
        }
    }
}

/// `true` when a change to `name` is relevant to an aspect: the explicit
/// list decides when non-empty, else the derived names, else every property
/// counts.
fn property_relevant(explicit: &[String], derived: &[String], name: &str) -> bool {
    if !explicit.is_empty() {
        return explicit.iter().any(|property| property == name);
    }
    if !derived.is_empty() {
        return derived.iter().any(|property| property == name);
    }
    true
}

impl<T: ViewItem> ViewCore<T> {
    /// A watched item's property changed: mark dirty flags and schedule the
    /// coalesced pass. Never reshapes synchronously.
    pub(crate) fn on_item_property_changed(core: &Arc<Self>, item: &T, name: &str) {
        let marked;
        {
            let mut state = core.state.write();
            let sort_relevant = state.live.sorting == Some(true)
                && state.sort.is_active()
                && property_relevant(
                    &state.live.sorting_properties,
                    &state.sort.key_properties(),
                    name,
                );
            let filter_relevant = state.live.filtering == Some(true)
                && state.filter.is_some()
                && property_relevant(&state.live.filtering_properties, &[], name);
            let group_relevant = state.live.grouping == Some(true)
                && state.grouping.is_active()
                && property_relevant(
                    &state.live.grouping_properties,
                    &state.grouping.property_names(),
                    name,
                );
            if !(sort_relevant || filter_relevant || group_relevant) {
                return;
            }
            marked = state
                .tracker
                .mark(item, sort_relevant, filter_relevant, group_relevant);
        }
        if marked && !core.live_pass_scheduled.swap(true, Ordering::SeqCst) {
            tracing::trace!(
                target: "horizon_prism::live",
                "scheduling live restoration pass"
            );
            let weak = Arc::downgrade(core);
            core.dispatcher.post(move || {
                if let Some(core) = weak.upgrade() {
                    run_live_restoration(&core);
                }
            });
        }
    }
}

/// The coalesced restoration pass: sort, then filter, then group
/// restoration, then abandoned-group pruning and flag clearing.
pub(crate) fn run_live_restoration<T: ViewItem>(core: &Arc<ViewCore<T>>) {
    core.live_pass_scheduled.store(false, Ordering::SeqCst);
    let mut notices = Vec::new();
    {
        let mut state = core.state.write();
        if state.defer_count > 0 {
            state.needs_refresh = true;
        } else {
            state.tracker.sweep();
            restore_sorting(core, &mut state, &mut notices);
            restore_filtering(core, &mut state, &mut notices);
            restore_grouping(&mut state, &mut notices);
            if let Some(tree) = &mut state.groups {
                let pruned = tree.prune_empty();
                if pruned > 0 {
                    tracing::debug!(
                        target: "horizon_prism::live",
                        pruned,
                        "deleted abandoned groups"
                    );
                }
            }
            state.tracker.clear_flags();
            revalidate_currency(&mut state, &mut notices);
        }
    }
    core.dispatch(notices);
}

fn restore_sorting<T: ViewItem>(
    core: &Arc<ViewCore<T>>,
    state: &mut ViewState<T>,
    notices: &mut Vec<Notice<T>>,
) {
    if state.live.sorting != Some(true) {
        return;
    }
    let Some(comparer) = state.comparer() else {
        return;
    };
    let dirty = state.tracker.sort_dirty_items();
    if dirty.is_empty() {
        return;
    }

    let density = dirty.len() as f64 / state.projection.len().max(1) as f64;
    if density > state.live.density_threshold {
        tracing::debug!(
            target: "horizon_prism::live",
            density,
            threshold = state.live.density_threshold,
            "dirty density over threshold; resorting the whole projection"
        );
        if state.grouped() {
            // A grouped bulk re-sort restructures the whole tree; rebuild
            // wholesale.
            ViewCore::do_refresh_locked(core, state, notices);
            return;
        }
        // Stable in-place insertion sort, announcing each relocation.
        let mut index = 1;
        while index < state.projection.len() {
            let target = {
                let (sorted, rest) = state.projection.split_at(index);
                sorted.partition_point(|probe| {
                    comparer(probe, &rest[0]) != std::cmp::Ordering::Greater
                })
            };
            if target < index {
                let item = state.projection.remove(index);
                state.projection.insert(target, item.clone());
                notices.push(Notice::Collection(CollectionChange::Move {
                    item,
                    from: state.proj_to_view(index),
                    to: state.proj_to_view(target),
                }));
            }
            index += 1;
        }
        return;
    }

    for item in dirty {
        // Positions may be stale; locate by identity before relocating.
        let Some(at) = state.projection.iter().position(|probe| probe == &item) else {
            continue;
        };
        let moved = state.projection.remove(at);
        let to = insertion_index(&state.projection, &moved, &comparer);
        state.projection.insert(to, moved);
        if state.grouped() {
            let path = state.grouping.key_path(&item);
            let ViewState {
                groups, projection, ..
            } = &mut *state;
            let tree = groups.as_mut().expect("grouped() checked");
            if let Some((old_flat, new_flat)) =
                tree.move_item(&item, &path, Some(&comparer), projection)
            {
                if old_flat != new_flat {
                    notices.push(Notice::Collection(CollectionChange::Move {
                        item: item.clone(),
                        from: old_flat,
                        to: new_flat,
                    }));
                }
            }
        } else if at != to {
            notices.push(Notice::Collection(CollectionChange::Move {
                item: item.clone(),
                from: state.proj_to_view(at),
                to: state.proj_to_view(to),
            }));
        }
    }
}

fn restore_filtering<T: ViewItem>(
    core: &Arc<ViewCore<T>>,
    state: &mut ViewState<T>,
    notices: &mut Vec<Notice<T>>,
) {
    if state.live.filtering != Some(true) || state.filter.is_none() {
        return;
    }
    for item in state.tracker.filter_dirty_items() {
        let passes = state.item_passes(&item);
        let at = state.projection.iter().position(|probe| probe == &item);
        match (at, passes) {
            (Some(at), false) => {
                // Demote, but keep watching for later promotion.
                let removed = ViewCore::apply_remove(core, state, at, notices);
                state.filtered_out.push(removed.clone());
                ViewCore::watch_item(core, state, &removed);
            }
            (None, true) => {
                if state.remove_filtered_out(&item) {
                    let projection_index = core.resolved_projection_index(state, &item);
                    ViewCore::apply_add(core, state, item.clone(), projection_index, notices);
                }
            }
            _ => {}
        }
    }
}

fn restore_grouping<T: ViewItem>(state: &mut ViewState<T>, notices: &mut Vec<Notice<T>>) {
    if state.live.grouping != Some(true) || !state.grouped() {
        return;
    }
    let comparer = state.comparer();
    for item in state.tracker.group_dirty_items() {
        if !state.projection.iter().any(|probe| probe == &item) {
            continue;
        }
        let path = state.grouping.key_path(&item);
        let ViewState {
            groups, projection, ..
        } = &mut *state;
        let tree = groups.as_mut().expect("grouped() checked");
        let old_flat = tree.flat_index_of(&item);
        if !tree.remove_item(&item, &path, false) && !tree.remove_item_exhaustive(&item, false) {
            continue;
        }
        let new_flat = tree.add_item(item.clone(), &path, comparer.as_ref(), projection);
        if old_flat != Some(new_flat) {
            if let Some(old_flat) = old_flat {
                notices.push(Notice::Collection(CollectionChange::Remove {
                    item: item.clone(),
                    index: old_flat,
                }));
            }
            notices.push(Notice::Collection(CollectionChange::Add {
                item: item.clone(),
                index: new_flat,
            }));
        }
    }
}

impl<T: ViewItem> CollectionView<T> {
    /// Tri-state live-sorting setting; `None` when the source cannot
    /// support it.
    pub fn is_live_sorting(&self) -> Option<bool> {
        self.core.state.read().live.sorting
    }

    /// Tri-state live-filtering setting.
    pub fn is_live_filtering(&self) -> Option<bool> {
        self.core.state.read().live.filtering
    }

    /// Tri-state live-grouping setting.
    pub fn is_live_grouping(&self) -> Option<bool> {
        self.core.state.read().live.grouping
    }

    /// Properties watched for live sorting. Empty means: derive from the
    /// sort-key names.
    pub fn live_sorting_properties(&self) -> Vec<String> {
        self.core.state.read().live.sorting_properties.clone()
    }

    /// Replaces the live-sorting property list.
    pub fn set_live_sorting_properties(&self, properties: Vec<String>) {
        self.core.state.write().live.sorting_properties = properties;
    }

    /// Properties watched for live filtering. Empty means: every property
    /// change re-evaluates the predicate.
    pub fn live_filtering_properties(&self) -> Vec<String> {
        self.core.state.read().live.filtering_properties.clone()
    }

    /// Replaces the live-filtering property list.
    pub fn set_live_filtering_properties(&self, properties: Vec<String>) {
        self.core.state.write().live.filtering_properties = properties;
    }

    /// Properties watched for live grouping. Empty means: derive from the
    /// group description property names.
    pub fn live_grouping_properties(&self) -> Vec<String> {
        self.core.state.read().live.grouping_properties.clone()
    }

    /// Replaces the live-grouping property list.
    pub fn set_live_grouping_properties(&self, properties: Vec<String>) {
        self.core.state.write().live.grouping_properties = properties;
    }

    /// The dirty-density threshold for the bulk re-sort path.
    pub fn live_sort_density_threshold(&self) -> f64 {
        self.core.state.read().live.density_threshold
    }

    /// Overrides [`LIVE_SORT_DENSITY_THRESHOLD`] for this view.
    pub fn set_live_sort_density_threshold(&self, threshold: f64) {
        self.core.state.write().live.density_threshold = threshold;
    }
}

impl<T: ObservableItem> CollectionView<T> {
    /// Enables or disables live sorting.
    pub fn set_is_live_sorting(&self, enabled: bool) -> PrismResult<()> {
        self.set_live_aspect(enabled, ViewProperty::IsLiveSorting, |live, value| {
            live.sorting = Some(value);
        })
    }

    /// Enables or disables live filtering.
    pub fn set_is_live_filtering(&self, enabled: bool) -> PrismResult<()> {
        self.set_live_aspect(enabled, ViewProperty::IsLiveFiltering, |live, value| {
            live.filtering = Some(value);
        })
    }

    /// Enables or disables live grouping.
    pub fn set_is_live_grouping(&self, enabled: bool) -> PrismResult<()> {
        self.set_live_aspect(enabled, ViewProperty::IsLiveGrouping, |live, value| {
            live.grouping = Some(value);
        })
    }

    fn set_live_aspect(
        &self,
        enabled: bool,
        property: ViewProperty,
        apply: impl FnOnce(&mut LiveOptions, bool),
    ) -> PrismResult<()> {
        if !self.core.adapter.capabilities().items_observable {
            return Err(PrismError::CapabilityUnsupported("live shaping"));
        }
        self.ensure_live_hooks();
        let mut notices = Vec::new();
        {
            let mut state = self.core.state.write();
            apply(&mut state.live, enabled);
            notices.push(Notice::Property(property));
            ViewCore::rebuild_watches(&self.core, &mut state);
        }
        self.core.dispatch(notices);
        Ok(())
    }

    fn ensure_live_hooks(&self) {
        let mut hooks = self.core.live_hooks.lock();
        if hooks.is_some() {
            return;
        }
        let watch = Arc::new(|core: &Arc<ViewCore<T>>, item: &T| {
            let weak = Arc::downgrade(core);
            let probe = item.clone();
            item.changes().connect(move |change| {
                if let Some(core) = weak.upgrade() {
                    ViewCore::on_item_property_changed(&core, &probe, &change.name);
                }
            })
        });
        let unwatch = Arc::new(|item: &T, connection: ConnectionId| {
            item.changes().disconnect(connection);
        });
        *hooks = Some(LiveHooks { watch, unwatch });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct Item(u32);
    impl ViewItem for Item {}

    fn connection() -> ConnectionId {
        // Any key works for bookkeeping tests; mint one from a scratch
        // signal.
        let signal = horizon_prism_core::Signal::<()>::new();
        signal.connect(|_| {})
    }

    #[test]
    fn test_property_relevance_fallbacks() {
        let explicit = vec!["age".to_string()];
        let derived = vec!["name".to_string()];
        assert!(property_relevant(&explicit, &derived, "age"));
        assert!(!property_relevant(&explicit, &derived, "name"));
        assert!(property_relevant(&[], &derived, "name"));
        assert!(!property_relevant(&[], &derived, "age"));
        assert!(property_relevant(&[], &[], "anything"));
    }

    #[test]
    fn test_tracker_marking_and_flags() {
        let mut tracker = LiveTracker::new();
        let item = Item(1);
        tracker.watch(item.clone(), connection());

        assert!(tracker.mark(&item, true, false, true));
        assert_eq!(tracker.sort_dirty_items(), vec![item.clone()]);
        assert!(tracker.filter_dirty_items().is_empty());
        assert_eq!(tracker.group_dirty_items(), vec![item.clone()]);

        tracker.clear_flags();
        assert!(tracker.sort_dirty_items().is_empty());
        assert!(!tracker.mark(&Item(2), true, true, true));
    }

    #[test]
    fn test_removed_entries_stop_marking() {
        let mut tracker = LiveTracker::new();
        let item = Item(1);
        tracker.watch(item.clone(), connection());

        assert!(tracker.remove(&item).is_some());
        assert!(!tracker.is_watched(&item));
        assert!(!tracker.mark(&item, true, true, true));
        tracker.sweep();
        assert!(tracker.clear().is_empty());
    }

    #[test]
    fn test_options_tristate_defaults() {
        let unknown = LiveOptions::new(false);
        assert_eq!(unknown.sorting, None);
        let known = LiveOptions::new(true);
        assert_eq!(known.sorting, Some(false));
        assert!(!known.any_enabled());
    }
}
