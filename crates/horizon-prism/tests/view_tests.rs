//! Integration tests for the collection view engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use horizon_prism::{
    AccessMode, CollectionChange, CollectionView, GroupDescription, PlaceholderPosition,
    PrismError, PropertyChange, PropertyValue, SortKey, SyncHook, VecModel, ViewItem, ViewSlot,
};
use horizon_prism_core::Signal;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Handle-style test item: clones share state, equality is identity.
#[derive(Clone)]
struct Person {
    inner: Arc<PersonInner>,
}

struct PersonInner {
    id: u32,
    name: Mutex<String>,
    age: Mutex<i64>,
    category: Mutex<String>,
    changes: Signal<PropertyChange>,
}

impl Person {
    fn new(name: &str, age: i64, category: &str) -> Self {
        Self {
            inner: Arc::new(PersonInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                name: Mutex::new(name.to_string()),
                age: Mutex::new(age),
                category: Mutex::new(category.to_string()),
                changes: Signal::new(),
            }),
        }
    }

    fn age(&self) -> i64 {
        *self.inner.age.lock()
    }

    fn set_age(&self, age: i64) {
        *self.inner.age.lock() = age;
        self.inner.changes.emit(PropertyChange::new("age"));
    }

    fn set_category(&self, category: &str) {
        *self.inner.category.lock() = category.to_string();
        self.inner.changes.emit(PropertyChange::new("category"));
    }
}

impl Default for Person {
    fn default() -> Self {
        Self::new("", 0, "")
    }
}

impl PartialEq for Person {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Person {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Person#{}(age {})", self.inner.id, self.age())
    }
}

impl ViewItem for Person {
    fn property(&self, name: &str) -> PropertyValue {
        match name {
            "name" => self.inner.name.lock().clone().into(),
            "age" => (*self.inner.age.lock()).into(),
            "category" => self.inner.category.lock().clone().into(),
            _ => PropertyValue::None,
        }
    }
}

impl horizon_prism::ObservableItem for Person {
    fn changes(&self) -> &Signal<PropertyChange> {
        &self.inner.changes
    }
}

fn people(ages: &[i64]) -> Vec<Person> {
    ages.iter().map(|age| Person::new("", *age, "")).collect()
}

fn view_ages(view: &CollectionView<Person>) -> Vec<i64> {
    view.items()
        .unwrap()
        .iter()
        .filter_map(|slot| slot.item().map(Person::age))
        .collect()
}

type EventLog = Arc<Mutex<Vec<CollectionChange<Person>>>>;

fn capture_events(view: &CollectionView<Person>) -> EventLog {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    view.signals()
        .collection_changed
        .connect(move |change| sink.lock().push(change.clone()));
    log
}

// -----------------------------------------------------------------------------
// End-to-end behavior
// -----------------------------------------------------------------------------

#[test]
fn ascending_sort_orders_the_view() {
    init_tracing();
    let items = people(&[3, 1, 2]);
    let view = CollectionView::new(Arc::new(VecModel::new(items.clone())));
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();

    assert_eq!(view_ages(&view), vec![1, 2, 3]);
    assert_eq!(view.index_of(&items[2]).unwrap(), Some(1));
}

#[test]
fn filter_matching_nothing_empties_the_view() {
    let view = CollectionView::new(Arc::new(VecModel::new(people(&[1, 2, 3]))));
    view.set_filter(|_: &Person| false).unwrap();

    assert!(view.is_empty().unwrap());
    assert!(view.items().unwrap().is_empty());
}

#[test]
fn add_new_parks_by_placeholder_and_commit_relocates() {
    let view = CollectionView::new(Arc::new(VecModel::new(people(&[10, 20, 30]))));
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();
    view.set_placeholder_position(PlaceholderPosition::AtEnd)
        .unwrap();

    let added = view.add_new_item(Person::new("", 5, "")).unwrap();
    let count = view.count().unwrap();
    assert_eq!(count, 5);
    // The pending item sits just before the trailing placeholder.
    assert_eq!(view.index_of(&added).unwrap(), Some(count - 2));
    assert!(matches!(
        view.item_at(count - 1).unwrap(),
        ViewSlot::Placeholder
    ));

    let events = capture_events(&view);
    view.commit_new().unwrap();

    // The sort ranks the new item first.
    assert_eq!(view.item_at(0).unwrap().item(), Some(&added));
    let log = events.lock();
    assert!(
        log.iter()
            .any(|change| matches!(change, CollectionChange::Move { to: 0, .. })),
        "expected a Move to index 0, got {log:?}"
    );
    assert!(!log.iter().any(|change| matches!(change, CollectionChange::Reset)));
}

#[test]
fn grouping_partitions_by_category() {
    let items = vec![
        Person::new("a", 1, "A"),
        Person::new("b", 2, "B"),
        Person::new("c", 3, "A"),
    ];
    let view = CollectionView::new(Arc::new(VecModel::new(items.clone())));
    view.set_group_descriptions(vec![GroupDescription::by_property("category")])
        .unwrap();

    let root = view.groups().unwrap().expect("grouping is active");
    let groups: Vec<_> = root.subgroups().collect();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].key(), &PropertyValue::from("A"));
    assert_eq!(groups[0].leaf_count(), 2);
    assert_eq!(groups[1].key(), &PropertyValue::from("B"));
    assert_eq!(groups[1].leaf_count(), 1);

    // Leaves of A keep original relative order; flat order is depth-first.
    let leaves: Vec<_> = groups[0].leaves().cloned().collect();
    assert_eq!(leaves, vec![items[0].clone(), items[2].clone()]);
    assert_eq!(view.index_of(&items[1]).unwrap(), Some(2));
}

#[test]
fn live_sort_relocates_changed_item_without_reset() {
    let items = people(&[10, 20, 30]);
    let mover = items[2].clone();
    let view = CollectionView::new(Arc::new(VecModel::observable(items)));
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();
    view.set_is_live_sorting(true).unwrap();

    let events = capture_events(&view);
    mover.set_age(1); // rank moves last -> first
    // The restoration pass is coalesced and deferred.
    assert!(view_ages(&view) != vec![1, 10, 20]);
    view.dispatcher().run_pending();

    assert_eq!(view.item_at(0).unwrap().item(), Some(&mover));
    let log = events.lock();
    let structural = log
        .iter()
        .filter(|change| !matches!(change, CollectionChange::Replace { .. }))
        .count();
    assert_eq!(structural, 1, "expected exactly one event, got {log:?}");
    assert!(matches!(
        log[0],
        CollectionChange::Move { to: 0, .. } | CollectionChange::Remove { .. }
    ));
}

// -----------------------------------------------------------------------------
// Structural properties
// -----------------------------------------------------------------------------

#[test]
fn count_matches_slots_under_placeholder_and_transaction() {
    let view = CollectionView::new(Arc::new(VecModel::new(people(&[1, 2]))));
    view.set_placeholder_position(PlaceholderPosition::AtBeginning)
        .unwrap();
    assert_eq!(view.count().unwrap(), 3);
    assert_eq!(view.items().unwrap().len(), 3);

    view.add_new().unwrap();
    assert_eq!(view.count().unwrap(), 4);
    assert_eq!(view.items().unwrap().len(), 4);
    assert!(matches!(view.item_at(0).unwrap(), ViewSlot::Placeholder));
    assert!(view.item_at(1).unwrap().item().is_some());

    view.cancel_new().unwrap();
    assert_eq!(view.count().unwrap(), 3);
}

#[test]
fn sorted_projection_stays_ordered_under_mutation() {
    let source = Arc::new(VecModel::new(people(&[5, 1, 4])));
    let view = CollectionView::new(source.clone());
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();

    source.push(Person::new("", 3, ""));
    source.insert(0, Person::new("", 2, ""));
    source.remove(1); // source [2, 5, 4, 3]

    let ages = view_ages(&view);
    let mut sorted = ages.clone();
    sorted.sort();
    assert_eq!(ages, sorted);
}

#[test]
fn refresh_is_idempotent() {
    let view = CollectionView::new(Arc::new(VecModel::new(people(&[2, 3, 1]))));
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();

    view.refresh();
    let first = view_ages(&view);
    view.refresh();
    assert_eq!(view_ages(&view), first);
}

#[test]
fn add_then_cancel_restores_contents() {
    let source = Arc::new(VecModel::new(people(&[1, 2])));
    let view = CollectionView::new(source.clone());
    let before_count = view.count().unwrap();
    let before = view_ages(&view);

    view.add_new().unwrap();
    assert!(view.is_adding_new());
    view.cancel_new().unwrap();

    assert!(!view.is_adding_new());
    assert_eq!(view.count().unwrap(), before_count);
    assert_eq!(view_ages(&view), before);
    assert_eq!(source.len(), 2);
}

#[test]
fn add_then_commit_places_item_once_at_sorted_slot() {
    let source = Arc::new(VecModel::new(people(&[10, 30])));
    let view = CollectionView::new(source.clone());
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();

    let added = view.add_new_item(Person::new("", 20, "")).unwrap();
    view.commit_new().unwrap();

    assert_eq!(view_ages(&view), vec![10, 20, 30]);
    let occurrences = view
        .items()
        .unwrap()
        .iter()
        .filter(|slot| slot.item() == Some(&added))
        .count();
    assert_eq!(occurrences, 1);
    assert_eq!(view.index_of(&added).unwrap(), Some(1));
}

// -----------------------------------------------------------------------------
// Currency
// -----------------------------------------------------------------------------

#[test]
fn currency_boundaries() {
    let view = CollectionView::new(Arc::new(VecModel::new(people(&[1, 2, 3]))));

    assert!(view.move_current_to_position(-1).unwrap() == false);
    assert!(view.is_current_before_first());

    let count = view.count().unwrap() as isize;
    view.move_current_to_position(count).unwrap();
    assert!(view.is_current_after_last());

    assert!(matches!(
        view.move_current_to_position(-2),
        Err(PrismError::PositionOutOfRange { .. })
    ));
    assert!(matches!(
        view.move_current_to_position(count + 1),
        Err(PrismError::PositionOutOfRange { .. })
    ));
}

#[test]
fn removing_current_item_moves_currency_once() {
    let items = people(&[1, 2, 3]);
    let view = CollectionView::new(Arc::new(VecModel::new(items.clone())));
    view.move_current_to_position(1).unwrap();
    assert_eq!(view.current_item(), Some(items[1].clone()));

    let changed = Arc::new(Mutex::new(0));
    let counter = changed.clone();
    view.signals()
        .current_changed
        .connect(move |_| *counter.lock() += 1);

    view.remove_at(1).unwrap();

    assert_eq!(*changed.lock(), 1);
    assert_eq!(view.current_position(), 1);
    assert_eq!(view.current_item(), Some(items[2].clone()));

    // Removing the last remaining items walks currency down to empty.
    view.remove_at(1).unwrap();
    view.remove_at(0).unwrap();
    assert_eq!(view.current_position(), -1);
    assert_eq!(view.current_item(), None);
    assert!(view.is_current_before_first() && view.is_current_after_last());
}

#[test]
fn currency_follows_moved_item() {
    let items = people(&[1, 2, 3]);
    let source = Arc::new(VecModel::new(items.clone()));
    let view = CollectionView::new(source.clone());
    view.move_current_to(&items[0]).unwrap();

    source.move_item(0, 2);
    assert_eq!(view.current_position(), 2);
    assert_eq!(view.current_item(), Some(items[0].clone()));
}

#[test]
fn replace_at_current_refreshes_item() {
    let items = people(&[1, 2, 3]);
    let source = Arc::new(VecModel::new(items.clone()));
    let view = CollectionView::new(source.clone());
    view.move_current_to_position(1).unwrap();

    let replacement = Person::new("", 9, "");
    source.replace(1, replacement.clone());

    assert_eq!(view.current_position(), 1);
    assert_eq!(view.current_item(), Some(replacement));
}

// -----------------------------------------------------------------------------
// Change translation
// -----------------------------------------------------------------------------

#[test]
fn filtered_insert_and_remove_translate_view_indices() {
    let items = people(&[1, 2, 3, 4, 5, 6]);
    let source = Arc::new(VecModel::new(items.clone()));
    let view = CollectionView::new(source.clone());
    view.set_filter(|person: &Person| person.age() % 2 == 0)
        .unwrap();
    assert_eq!(view_ages(&view), vec![2, 4, 6]);

    let events = capture_events(&view);
    source.insert(3, Person::new("", 8, ""));
    assert_eq!(view_ages(&view), vec![2, 8, 4, 6]);
    assert!(matches!(
        events.lock()[0],
        CollectionChange::Add { index: 1, .. }
    ));

    events.lock().clear();
    source.remove(1); // removes age 2, view index 0
    assert!(matches!(
        events.lock()[0],
        CollectionChange::Remove { index: 0, .. }
    ));
    assert_eq!(view_ages(&view), vec![8, 4, 6]);
}

#[test]
fn out_of_view_move_is_silently_dropped() {
    let items = people(&[1, 2, 3, 4, 5]);
    let source = Arc::new(VecModel::new(items.clone()));
    let view = CollectionView::new(source.clone());
    view.set_filter(|person: &Person| person.age() % 2 == 0)
        .unwrap();
    assert_eq!(view_ages(&view), vec![2, 4]);

    let events = capture_events(&view);
    // Move age 1 (out of view) to another out-of-view slot.
    source.move_item(0, 2);
    assert!(events.lock().is_empty(), "got {:?}", events.lock());
    assert_eq!(view_ages(&view), vec![2, 4]);
}

#[test]
fn unshaped_move_translates_directly() {
    let items = people(&[1, 2, 3]);
    let source = Arc::new(VecModel::new(items.clone()));
    let view = CollectionView::new(source.clone());

    let events = capture_events(&view);
    source.move_item(0, 2);
    assert!(matches!(
        events.lock()[0],
        CollectionChange::Move { from: 0, to: 2, .. }
    ));
    assert_eq!(view_ages(&view), vec![2, 3, 1]);
}

#[test]
fn replacing_hidden_item_with_visible_one_is_an_add() {
    let items = people(&[1, 2, 3]);
    let source = Arc::new(VecModel::new(items.clone()));
    let view = CollectionView::new(source.clone());
    view.set_filter(|person: &Person| person.age() % 2 == 0)
        .unwrap();
    assert_eq!(view_ages(&view), vec![2]);

    let events = capture_events(&view);
    source.replace(0, Person::new("", 4, ""));
    assert!(matches!(
        events.lock()[0],
        CollectionChange::Add { index: 0, .. }
    ));
    assert_eq!(view_ages(&view), vec![4, 2]);
}

#[test]
fn sorted_insert_uses_binary_search_position() {
    let source = Arc::new(VecModel::new(people(&[10, 30, 50])));
    let view = CollectionView::new(source.clone());
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();

    let events = capture_events(&view);
    source.push(Person::new("", 20, ""));
    assert!(matches!(
        events.lock()[0],
        CollectionChange::Add { index: 1, .. }
    ));
    assert_eq!(view_ages(&view), vec![10, 20, 30, 50]);
}

// -----------------------------------------------------------------------------
// Deferred refresh
// -----------------------------------------------------------------------------

#[test]
fn reads_fail_while_deferred_and_one_refresh_follows() {
    let source = Arc::new(VecModel::new(people(&[1, 2])));
    let view = CollectionView::new(source.clone());
    let events = capture_events(&view);

    let scope = view.defer_refresh();
    assert!(matches!(view.count(), Err(PrismError::RefreshDeferred)));
    assert!(matches!(view.items(), Err(PrismError::RefreshDeferred)));

    source.push(Person::new("", 3, ""));
    source.push(Person::new("", 4, ""));
    assert!(events.lock().is_empty());

    drop(scope);
    let resets = events
        .lock()
        .iter()
        .filter(|change| matches!(change, CollectionChange::Reset))
        .count();
    assert_eq!(resets, 1);
    assert_eq!(view.count().unwrap(), 4);
}

#[test]
fn nested_defer_scopes_coalesce() {
    let source = Arc::new(VecModel::new(people(&[1])));
    let view = CollectionView::new(source.clone());
    let events = capture_events(&view);

    let outer = view.defer_refresh();
    let inner = view.defer_refresh();
    source.push(Person::new("", 2, ""));
    drop(inner);
    assert!(events.lock().is_empty());
    drop(outer);
    assert_eq!(events.lock().len(), 1);
}

// -----------------------------------------------------------------------------
// Transactions
// -----------------------------------------------------------------------------

#[test]
fn add_new_implicitly_commits_pending_edit() {
    let items = people(&[1, 2]);
    let view = CollectionView::new(Arc::new(VecModel::new(items.clone())));

    view.edit_item(&items[0]).unwrap();
    assert!(view.is_editing_item());

    view.add_new().unwrap();
    assert!(!view.is_editing_item());
    assert!(view.is_adding_new());
    view.cancel_new().unwrap();
}

#[test]
fn remove_during_transaction_is_a_conflict() {
    let view = CollectionView::new(Arc::new(VecModel::new(people(&[1, 2]))));
    view.add_new().unwrap();
    assert!(matches!(view.remove_at(0), Err(PrismError::Usage(_))));
    view.cancel_new().unwrap();
    assert!(view.remove_at(0).is_ok());
}

#[test]
fn removing_placeholder_is_misuse() {
    let view = CollectionView::new(Arc::new(VecModel::new(people(&[1]))));
    view.set_placeholder_position(PlaceholderPosition::AtBeginning)
        .unwrap();
    assert!(matches!(
        view.remove_at(0),
        Err(PrismError::PlaceholderMisuse)
    ));
}

#[test]
fn third_party_removal_cancels_add_transaction() {
    let source = Arc::new(VecModel::new(people(&[1])));
    let view = CollectionView::new(source.clone());
    let added = view.add_new().unwrap();

    let source_index = source.index_of(&added).unwrap();
    source.remove(source_index);

    assert!(!view.is_adding_new());
    assert_eq!(view.count().unwrap(), 1);
}

#[test]
fn committed_edit_repositions_item() {
    let items = people(&[10, 20, 30]);
    let view = CollectionView::new(Arc::new(VecModel::new(items.clone())));
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();

    view.edit_item(&items[0]).unwrap();
    items[0].set_age(25);
    let events = capture_events(&view);
    view.commit_edit().unwrap();

    assert_eq!(view_ages(&view), vec![20, 25, 30]);
    assert!(matches!(
        events.lock()[0],
        CollectionChange::Move { from: 0, to: 1, .. }
    ));
}

#[test]
fn cancel_edit_requires_staged_support() {
    let items = people(&[1]);
    let view = CollectionView::new(Arc::new(VecModel::new(items.clone())));
    view.edit_item(&items[0]).unwrap();
    assert!(!view.can_cancel_edit());
    assert!(matches!(view.cancel_edit(), Err(PrismError::Usage(_))));
}

// -----------------------------------------------------------------------------
// Live shaping
// -----------------------------------------------------------------------------

#[test]
fn live_filtering_promotes_and_demotes() {
    let items = people(&[10, 25, 30]);
    let minor = items[0].clone();
    let adult = items[2].clone();
    let view = CollectionView::new(Arc::new(VecModel::observable(items)));
    view.set_filter(|person: &Person| person.age() >= 18).unwrap();
    view.set_is_live_filtering(true).unwrap();
    assert_eq!(view_ages(&view), vec![25, 30]);

    minor.set_age(40);
    view.dispatcher().run_pending();
    assert_eq!(view.count().unwrap(), 3);
    assert!(view.contains(&minor).unwrap());

    adult.set_age(5);
    view.dispatcher().run_pending();
    assert!(!view.contains(&adult).unwrap());
    assert_eq!(view.count().unwrap(), 2);
}

#[test]
fn live_pass_is_coalesced() {
    let items = people(&[10, 20, 30]);
    let view = CollectionView::new(Arc::new(VecModel::observable(items.clone())));
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();
    view.set_is_live_sorting(true).unwrap();

    items[0].set_age(40);
    items[2].set_age(5);
    assert_eq!(view.dispatcher().pending_count(), 1);
    view.dispatcher().run_pending();
    assert_eq!(view_ages(&view), vec![5, 20, 40]);
}

#[test]
fn dense_dirt_switches_to_bulk_resort() {
    let items = people(&[10, 20, 30, 40]);
    let view = CollectionView::new(Arc::new(VecModel::observable(items.clone())));
    view.set_sort_keys(vec![SortKey::ascending("age")]).unwrap();
    view.set_is_live_sorting(true).unwrap();
    view.set_live_sort_density_threshold(0.0);

    let events = capture_events(&view);
    items[3].set_age(1);
    view.dispatcher().run_pending();

    assert_eq!(view_ages(&view), vec![1, 10, 20, 30]);
    let log = events.lock();
    assert!(!log.iter().any(|change| matches!(change, CollectionChange::Reset)));
    assert!(
        log.iter()
            .any(|change| matches!(change, CollectionChange::Move { .. }))
    );
}

#[test]
fn live_grouping_moves_item_between_groups() {
    let items = vec![
        Person::new("a", 1, "A"),
        Person::new("b", 2, "B"),
        Person::new("c", 3, "A"),
    ];
    let mover = items[2].clone();
    let view = CollectionView::new(Arc::new(VecModel::observable(items)));
    view.set_group_descriptions(vec![GroupDescription::by_property("category")])
        .unwrap();
    view.set_is_live_grouping(true).unwrap();

    mover.set_category("B");
    view.dispatcher().run_pending();

    let root = view.groups().unwrap().unwrap();
    let groups: Vec<_> = root.subgroups().collect();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].leaf_count(), 1); // A lost the mover
    assert_eq!(groups[1].leaf_count(), 2); // B gained it
}

#[test]
fn emptied_groups_are_pruned_after_live_pass() {
    let items = vec![Person::new("a", 1, "A"), Person::new("b", 2, "B")];
    let loner = items[1].clone();
    let view = CollectionView::new(Arc::new(VecModel::observable(items)));
    view.set_group_descriptions(vec![GroupDescription::by_property("category")])
        .unwrap();
    view.set_is_live_grouping(true).unwrap();

    loner.set_category("A");
    view.dispatcher().run_pending();

    let root = view.groups().unwrap().unwrap();
    assert_eq!(root.subgroups().count(), 1);
    assert_eq!(root.leaf_count(), 2);
}

#[test]
fn live_shaping_unsupported_without_observable_items() {
    let view = CollectionView::new(Arc::new(VecModel::new(people(&[1]))));
    assert_eq!(view.is_live_sorting(), None);
    assert!(matches!(
        view.set_is_live_sorting(true),
        Err(PrismError::CapabilityUnsupported(_))
    ));
}

// -----------------------------------------------------------------------------
// Synchronization hook
// -----------------------------------------------------------------------------

#[test]
fn sync_hook_brackets_view_initiated_access() {
    let accesses: Arc<Mutex<Vec<AccessMode>>> = Arc::new(Mutex::new(Vec::new()));
    let log = accesses.clone();
    let hook: SyncHook = Arc::new(move |mode, access| {
        log.lock().push(mode);
        access();
    });

    let source = Arc::new(VecModel::new(people(&[1, 2])));
    let view = CollectionView::builder(source.clone())
        .synchronization(hook)
        .build();
    // Construction snapshots the source once.
    assert_eq!(*accesses.lock(), vec![AccessMode::Read]);

    view.remove_at(0).unwrap();
    assert_eq!(
        *accesses.lock(),
        vec![AccessMode::Read, AccessMode::Write]
    );

    let added = view.add_new().unwrap();
    view.commit_new().unwrap();
    assert_eq!(
        *accesses.lock(),
        vec![AccessMode::Read, AccessMode::Write, AccessMode::Write]
    );
    assert!(view.contains(&added).unwrap());
}

#[test]
fn detach_stops_mirroring() {
    let source = Arc::new(VecModel::new(people(&[1])));
    let view = CollectionView::new(source.clone());
    view.detach();

    source.push(Person::new("", 2, ""));
    assert_eq!(view.count().unwrap(), 1);
}
