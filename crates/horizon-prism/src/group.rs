//! Grouping: nested named partitions of the projection.
//!
//! Grouping definitions are either an ordered list of [`GroupDescription`]s
//! (one per nesting level) or a recursive selector callback that produces
//! the next level's description from the current depth and parent key. The
//! resulting [`GroupNode`] tree - not the flat projection - defines the
//! view's iteration order while grouping is active; flattened indexing is
//! depth-first over the leaves, with the placeholder and pending new item
//! occupying root-level special slots outside normal grouping.
//!
//! Group keys are assumed mutable between insertion and removal: the fast
//! removal path recomputes the key path and walks it, and when the keys have
//! drifted an exhaustive full-tree search takes over.

use std::sync::Arc;

use crate::editing::PlaceholderPosition;
use crate::item::ViewItem;
use crate::policy::CompareFn;
use crate::value::PropertyValue;
use crate::view::ViewSlot;

/// Depth cap for selector-driven description chains.
const MAX_GROUP_DEPTH: usize = 32;

/// How one grouping level derives its key from an item.
#[derive(Clone)]
pub enum GroupKeySelector<T> {
    /// Read the named item property.
    Property(String),
    /// Compute the key with a custom function.
    Custom(Arc<dyn Fn(&T) -> PropertyValue + Send + Sync>),
}

/// Describes one level of grouping.
#[derive(Clone)]
pub struct GroupDescription<T> {
    selector: GroupKeySelector<T>,
}

impl<T: ViewItem> GroupDescription<T> {
    /// Groups by the named item property.
    pub fn by_property(name: impl Into<String>) -> Self {
        Self {
            selector: GroupKeySelector::Property(name.into()),
        }
    }

    /// Groups by a computed key.
    pub fn by_key<F>(key: F) -> Self
    where
        F: Fn(&T) -> PropertyValue + Send + Sync + 'static,
    {
        Self {
            selector: GroupKeySelector::Custom(Arc::new(key)),
        }
    }

    /// The group key of `item` at this level.
    pub fn key_for(&self, item: &T) -> PropertyValue {
        match &self.selector {
            GroupKeySelector::Property(name) => item.property(name),
            GroupKeySelector::Custom(key) => key(item),
        }
    }

    /// The property name this level reads, for property-based descriptions.
    pub fn property_name(&self) -> Option<&str> {
        match &self.selector {
            GroupKeySelector::Property(name) => Some(name),
            GroupKeySelector::Custom(_) => None,
        }
    }
}

/// Recursive description chain: `(level, parent key) -> next description`,
/// `None` ending the chain.
pub type GroupSelectorFn<T> =
    Arc<dyn Fn(usize, Option<&PropertyValue>) -> Option<GroupDescription<T>> + Send + Sync>;

/// The grouping configuration of a view: a declared description list or a
/// recursive selector, whichever is set.
#[derive(Clone)]
pub(crate) struct GroupingPolicy<T> {
    pub(crate) descriptions: Vec<GroupDescription<T>>,
    pub(crate) selector: Option<GroupSelectorFn<T>>,
}

impl<T> Default for GroupingPolicy<T> {
    fn default() -> Self {
        Self {
            descriptions: Vec::new(),
            selector: None,
        }
    }
}

impl<T: ViewItem> GroupingPolicy<T> {
    pub(crate) fn is_active(&self) -> bool {
        !self.descriptions.is_empty() || self.selector.is_some()
    }

    /// Computes the key path of `item` through every grouping level.
    pub(crate) fn key_path(&self, item: &T) -> Vec<PropertyValue> {
        if !self.descriptions.is_empty() {
            return self
                .descriptions
                .iter()
                .map(|description| description.key_for(item))
                .collect();
        }
        let Some(selector) = &self.selector else {
            return Vec::new();
        };
        let mut path = Vec::new();
        let mut parent: Option<PropertyValue> = None;
        for level in 0..MAX_GROUP_DEPTH {
            let Some(description) = selector(level, parent.as_ref()) else {
                break;
            };
            let key = description.key_for(item);
            path.push(key.clone());
            parent = Some(key);
        }
        if path.len() == MAX_GROUP_DEPTH {
            tracing::warn!(
                target: "horizon_prism::group",
                "group selector exceeded depth cap; truncating"
            );
        }
        path
    }

    /// Property names read by the declared descriptions.
    pub(crate) fn property_names(&self) -> Vec<String> {
        self.descriptions
            .iter()
            .filter_map(|description| description.property_name().map(str::to_string))
            .collect()
    }
}

/// One node of the group tree: a key, ordered entries, and the number of
/// leaves underneath.
#[derive(Clone)]
pub struct GroupNode<T> {
    key: PropertyValue,
    entries: Vec<GroupEntry<T>>,
    leaf_count: usize,
}

/// An ordered entry of a group node.
#[derive(Clone)]
pub enum GroupEntry<T> {
    /// A nested subgroup.
    Group(GroupNode<T>),
    /// A member item.
    Leaf(T),
}

impl<T: ViewItem> GroupNode<T> {
    fn new(key: PropertyValue) -> Self {
        Self {
            key,
            entries: Vec::new(),
            leaf_count: 0,
        }
    }

    /// The group's key. The root carries [`PropertyValue::None`].
    pub fn key(&self) -> &PropertyValue {
        &self.key
    }

    /// Number of leaves in this node and all subgroups.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// The ordered entries of this node.
    pub fn entries(&self) -> &[GroupEntry<T>] {
        &self.entries
    }

    /// The node's direct subgroups, in encounter order.
    pub fn subgroups(&self) -> impl Iterator<Item = &GroupNode<T>> {
        self.entries.iter().filter_map(|entry| match entry {
            GroupEntry::Group(node) => Some(node),
            GroupEntry::Leaf(_) => None,
        })
    }

    /// The node's direct leaves, in order.
    pub fn leaves(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(|entry| match entry {
            GroupEntry::Leaf(item) => Some(item),
            GroupEntry::Group(_) => None,
        })
    }

    /// Returns `true` when the node holds no leaves at any depth.
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    fn subgroup_mut(&mut self, key: &PropertyValue) -> Option<&mut GroupNode<T>> {
        self.entries.iter_mut().find_map(|entry| match entry {
            GroupEntry::Group(node) if node.key == *key => Some(node),
            _ => None,
        })
    }
}

/// A root-level special slot, outside normal grouping.
#[derive(Clone)]
pub(crate) enum SpecialSlot<T> {
    Placeholder,
    NewItem(T),
}

/// The materialized group tree, including special slots.
pub(crate) struct GroupTree<T> {
    root: GroupNode<T>,
    head: Vec<SpecialSlot<T>>,
    tail: Vec<SpecialSlot<T>>,
}

impl<T: ViewItem> GroupTree<T> {
    pub(crate) fn new() -> Self {
        Self {
            root: GroupNode::new(PropertyValue::None),
            head: Vec::new(),
            tail: Vec::new(),
        }
    }

    pub(crate) fn root(&self) -> &GroupNode<T> {
        &self.root
    }

    /// Leaves plus special slots.
    pub(crate) fn len(&self) -> usize {
        self.head.len() + self.root.leaf_count + self.tail.len()
    }

    /// Rebuilds the special slots for the given placeholder position and
    /// pending new item. The new item always sits adjacent to the
    /// placeholder.
    pub(crate) fn sync_specials(&mut self, placeholder: PlaceholderPosition, pending: Option<T>) {
        self.head.clear();
        self.tail.clear();
        match placeholder {
            PlaceholderPosition::AtBeginning => {
                self.head.push(SpecialSlot::Placeholder);
                if let Some(item) = pending {
                    self.head.push(SpecialSlot::NewItem(item));
                }
            }
            PlaceholderPosition::AtEnd => {
                if let Some(item) = pending {
                    self.tail.push(SpecialSlot::NewItem(item));
                }
                self.tail.push(SpecialSlot::Placeholder);
            }
            PlaceholderPosition::None => {
                if let Some(item) = pending {
                    self.tail.push(SpecialSlot::NewItem(item));
                }
            }
        }
    }

    /// Flat index of the pending new item's special slot, if present.
    pub(crate) fn new_item_index(&self) -> Option<usize> {
        if let Some(position) = self
            .head
            .iter()
            .position(|slot| matches!(slot, SpecialSlot::NewItem(_)))
        {
            return Some(position);
        }
        self.tail
            .iter()
            .position(|slot| matches!(slot, SpecialSlot::NewItem(_)))
            .map(|position| self.head.len() + self.root.leaf_count + position)
    }

    /// Flat index of the placeholder's special slot, if present.
    pub(crate) fn placeholder_index(&self) -> Option<usize> {
        if let Some(position) = self
            .head
            .iter()
            .position(|slot| matches!(slot, SpecialSlot::Placeholder))
        {
            return Some(position);
        }
        self.tail
            .iter()
            .position(|slot| matches!(slot, SpecialSlot::Placeholder))
            .map(|position| self.head.len() + self.root.leaf_count + position)
    }

    /// The slot at a flat index: head specials, depth-first leaves, tail
    /// specials.
    pub(crate) fn slot_at(&self, index: usize) -> Option<ViewSlot<T>> {
        if index < self.head.len() {
            return Some(special_slot(&self.head[index]));
        }
        let mut remaining = index - self.head.len();
        if remaining < self.root.leaf_count {
            return leaf_at(&self.root, &mut remaining).cloned().map(ViewSlot::Item);
        }
        remaining -= self.root.leaf_count;
        self.tail.get(remaining).map(special_slot)
    }

    /// Flat index of `item`, searching special slots and the tree.
    pub(crate) fn flat_index_of(&self, item: &T) -> Option<usize> {
        for (position, slot) in self.head.iter().enumerate() {
            if matches!(slot, SpecialSlot::NewItem(pending) if pending == item) {
                return Some(position);
            }
        }
        let mut counter = 0;
        if flat_index_in(&self.root, item, &mut counter) {
            return Some(self.head.len() + counter);
        }
        for (position, slot) in self.tail.iter().enumerate() {
            if matches!(slot, SpecialSlot::NewItem(pending) if pending == item) {
                return Some(self.head.len() + self.root.leaf_count + position);
            }
        }
        None
    }

    /// Inserts `item` along `path`, creating subgroups as needed, and
    /// returns its flat index. Leaf position within the final group follows
    /// `comparer`, or the projection's relative order without one.
    pub(crate) fn add_item(
        &mut self,
        item: T,
        path: &[PropertyValue],
        comparer: Option<&CompareFn<T>>,
        projection: &[T],
    ) -> usize {
        insert_into(&mut self.root, item.clone(), path, comparer, projection);
        self.flat_index_of(&item)
            .expect("freshly inserted leaf must be indexable")
    }

    /// Fast removal along the recomputed `path`. Returns `false` when the
    /// keys have drifted and the leaf is not where the path says.
    pub(crate) fn remove_item(&mut self, item: &T, path: &[PropertyValue], prune: bool) -> bool {
        remove_from(&mut self.root, item, path, prune)
    }

    /// Full-tree fallback removal for leaves whose group keys changed after
    /// insertion.
    pub(crate) fn remove_item_exhaustive(&mut self, item: &T, prune: bool) -> bool {
        remove_exhaustive(&mut self.root, item, prune)
    }

    /// Relocates a leaf whose relative order changed without a membership
    /// change. Returns the old and new flat indices.
    pub(crate) fn move_item(
        &mut self,
        item: &T,
        path: &[PropertyValue],
        comparer: Option<&CompareFn<T>>,
        projection: &[T],
    ) -> Option<(usize, usize)> {
        let old = self.flat_index_of(item)?;
        if !self.remove_item(item, path, false) && !self.remove_item_exhaustive(item, false) {
            return None;
        }
        let new = self.add_item(item.clone(), path, comparer, projection);
        Some((old, new))
    }

    /// Deletes groups left empty by earlier removals. Returns how many were
    /// pruned.
    pub(crate) fn prune_empty(&mut self) -> usize {
        prune_in(&mut self.root)
    }
}

fn special_slot<T: ViewItem>(slot: &SpecialSlot<T>) -> ViewSlot<T> {
    match slot {
        SpecialSlot::Placeholder => ViewSlot::Placeholder,
        SpecialSlot::NewItem(item) => ViewSlot::Item(item.clone()),
    }
}

fn leaf_at<'a, T: ViewItem>(node: &'a GroupNode<T>, remaining: &mut usize) -> Option<&'a T> {
    for entry in &node.entries {
        match entry {
            GroupEntry::Leaf(item) => {
                if *remaining == 0 {
                    return Some(item);
                }
                *remaining -= 1;
            }
            GroupEntry::Group(subgroup) => {
                if *remaining < subgroup.leaf_count {
                    return leaf_at(subgroup, remaining);
                }
                *remaining -= subgroup.leaf_count;
            }
        }
    }
    None
}

fn flat_index_in<T: ViewItem>(node: &GroupNode<T>, item: &T, counter: &mut usize) -> bool {
    for entry in &node.entries {
        match entry {
            GroupEntry::Leaf(leaf) => {
                if leaf == item {
                    return true;
                }
                *counter += 1;
            }
            GroupEntry::Group(subgroup) => {
                if flat_index_in(subgroup, item, counter) {
                    return true;
                }
            }
        }
    }
    false
}

fn insert_into<T: ViewItem>(
    node: &mut GroupNode<T>,
    item: T,
    path: &[PropertyValue],
    comparer: Option<&CompareFn<T>>,
    projection: &[T],
) {
    node.leaf_count += 1;
    match path.split_first() {
        None => {
            let position = leaf_insert_position(node, &item, comparer, projection);
            node.entries.insert(position, GroupEntry::Leaf(item));
        }
        Some((key, rest)) => {
            if node.subgroup_mut(key).is_none() {
                node.entries
                    .push(GroupEntry::Group(GroupNode::new(key.clone())));
            }
            let subgroup = node
                .subgroup_mut(key)
                .expect("subgroup exists after creation");
            insert_into(subgroup, item, rest, comparer, projection);
        }
    }
}

/// Position for a new leaf among a node's entries: before the first leaf it
/// sorts ahead of, or per the projection's relative order without a
/// comparer, or at the end.
fn leaf_insert_position<T: ViewItem>(
    node: &GroupNode<T>,
    item: &T,
    comparer: Option<&CompareFn<T>>,
    projection: &[T],
) -> usize {
    match comparer {
        Some(comparer) => {
            for (position, entry) in node.entries.iter().enumerate() {
                if let GroupEntry::Leaf(leaf) = entry {
                    if comparer(item, leaf) == std::cmp::Ordering::Less {
                        return position;
                    }
                }
            }
            node.entries.len()
        }
        None => {
            let Some(item_rank) = projection.iter().position(|probe| probe == item) else {
                return node.entries.len();
            };
            for (position, entry) in node.entries.iter().enumerate() {
                if let GroupEntry::Leaf(leaf) = entry {
                    match projection.iter().position(|probe| probe == leaf) {
                        Some(leaf_rank) if leaf_rank > item_rank => return position,
                        _ => {}
                    }
                }
            }
            node.entries.len()
        }
    }
}

fn remove_from<T: ViewItem>(
    node: &mut GroupNode<T>,
    item: &T,
    path: &[PropertyValue],
    prune: bool,
) -> bool {
    match path.split_first() {
        None => {
            let Some(position) = node
                .entries
                .iter()
                .position(|entry| matches!(entry, GroupEntry::Leaf(leaf) if leaf == item))
            else {
                return false;
            };
            node.entries.remove(position);
            node.leaf_count -= 1;
            true
        }
        Some((key, rest)) => {
            let Some(position) = node.entries.iter().position(
                |entry| matches!(entry, GroupEntry::Group(subgroup) if subgroup.key == *key),
            ) else {
                return false;
            };
            let GroupEntry::Group(subgroup) = &mut node.entries[position] else {
                unreachable!("position selects a subgroup entry");
            };
            if !remove_from(subgroup, item, rest, prune) {
                return false;
            }
            if prune && subgroup.is_empty() {
                node.entries.remove(position);
            }
            node.leaf_count -= 1;
            true
        }
    }
}

fn remove_exhaustive<T: ViewItem>(node: &mut GroupNode<T>, item: &T, prune: bool) -> bool {
    for position in 0..node.entries.len() {
        match &mut node.entries[position] {
            GroupEntry::Leaf(leaf) => {
                if leaf == item {
                    node.entries.remove(position);
                    node.leaf_count -= 1;
                    return true;
                }
            }
            GroupEntry::Group(subgroup) => {
                if remove_exhaustive(subgroup, item, prune) {
                    if prune && subgroup.is_empty() {
                        node.entries.remove(position);
                    }
                    node.leaf_count -= 1;
                    return true;
                }
            }
        }
    }
    false
}

fn prune_in<T: ViewItem>(node: &mut GroupNode<T>) -> usize {
    let mut pruned = 0;
    for entry in &mut node.entries {
        if let GroupEntry::Group(subgroup) = entry {
            pruned += prune_in(subgroup);
        }
    }
    let before = node.entries.len();
    node.entries
        .retain(|entry| !matches!(entry, GroupEntry::Group(subgroup) if subgroup.is_empty()));
    pruned + (before - node.entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Clone)]
    struct Entry {
        id: u32,
        category: Arc<Mutex<&'static str>>,
    }

    impl PartialEq for Entry {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl ViewItem for Entry {
        fn property(&self, name: &str) -> PropertyValue {
            match name {
                "category" => (*self.category.lock()).into(),
                "id" => i64::from(self.id).into(),
                _ => PropertyValue::None,
            }
        }
    }

    fn entry(id: u32, category: &'static str) -> Entry {
        Entry {
            id,
            category: Arc::new(Mutex::new(category)),
        }
    }

    fn policy() -> GroupingPolicy<Entry> {
        GroupingPolicy {
            descriptions: vec![GroupDescription::by_property("category")],
            selector: None,
        }
    }

    fn build_tree(items: &[Entry]) -> GroupTree<Entry> {
        let policy = policy();
        let mut tree = GroupTree::new();
        for item in items {
            let path = policy.key_path(item);
            tree.add_item(item.clone(), &path, None, items);
        }
        tree
    }

    #[test]
    fn test_partitions_in_encounter_order() {
        let items = vec![entry(1, "A"), entry(2, "B"), entry(3, "A")];
        let tree = build_tree(&items);

        let groups: Vec<_> = tree.root().subgroups().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key(), &PropertyValue::from("A"));
        assert_eq!(groups[0].leaf_count(), 2);
        assert_eq!(groups[1].key(), &PropertyValue::from("B"));
        assert_eq!(groups[1].leaf_count(), 1);

        // Leaves of A keep their original relative order.
        let ids: Vec<_> = groups[0].leaves().map(|item| item.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_flat_indexing_is_depth_first() {
        let items = vec![entry(1, "A"), entry(2, "B"), entry(3, "A")];
        let tree = build_tree(&items);

        // Depth-first: A's leaves (1, 3) then B's leaf (2).
        assert_eq!(tree.flat_index_of(&items[0]), Some(0));
        assert_eq!(tree.flat_index_of(&items[2]), Some(1));
        assert_eq!(tree.flat_index_of(&items[1]), Some(2));
        assert!(matches!(
            tree.slot_at(1),
            Some(ViewSlot::Item(item)) if item.id == 3
        ));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_exhaustive_removal_after_key_drift() {
        let items = vec![entry(1, "A"), entry(2, "B")];
        let policy = policy();
        let mut tree = build_tree(&items);

        // The key changes after insertion; the fast path misses.
        *items[0].category.lock() = "Z";
        let drifted_path = policy.key_path(&items[0]);
        assert!(!tree.remove_item(&items[0], &drifted_path, true));
        assert!(tree.remove_item_exhaustive(&items[0], true));
        assert_eq!(tree.root().leaf_count(), 1);
        // Group A was pruned with its last leaf.
        assert_eq!(tree.root().subgroups().count(), 1);
    }

    #[test]
    fn test_abandoned_groups_pruned_after_pass() {
        let items = vec![entry(1, "A"), entry(2, "B")];
        let policy = policy();
        let mut tree = build_tree(&items);

        let path = policy.key_path(&items[1]);
        assert!(tree.remove_item(&items[1], &path, false));
        // Group B is empty but still present until the sweep.
        assert_eq!(tree.root().subgroups().count(), 2);
        assert_eq!(tree.prune_empty(), 1);
        assert_eq!(tree.root().subgroups().count(), 1);
    }

    #[test]
    fn test_special_slots_flank_the_leaves() {
        let items = vec![entry(1, "A")];
        let mut tree = build_tree(&items);
        let pending = entry(9, "A");

        tree.sync_specials(PlaceholderPosition::AtEnd, Some(pending.clone()));
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.new_item_index(), Some(1));
        assert_eq!(tree.placeholder_index(), Some(2));
        assert!(matches!(tree.slot_at(2), Some(ViewSlot::Placeholder)));

        tree.sync_specials(PlaceholderPosition::AtBeginning, Some(pending.clone()));
        assert_eq!(tree.placeholder_index(), Some(0));
        assert_eq!(tree.new_item_index(), Some(1));
        assert_eq!(tree.flat_index_of(&pending), Some(1));
        assert_eq!(tree.flat_index_of(&items[0]), Some(2));
    }

    #[test]
    fn test_move_within_subgroups() {
        let items = vec![entry(1, "A"), entry(2, "A"), entry(3, "A")];
        let policy = policy();
        let mut tree = build_tree(&items);

        // Order leaves by descending id from now on.
        let comparer: CompareFn<Entry> = Arc::new(|a, b| b.id.cmp(&a.id));
        let path = policy.key_path(&items[0]);
        let (old, new) = tree
            .move_item(&items[0], &path, Some(&comparer), &items)
            .unwrap();
        assert_eq!((old, new), (0, 2));

        let group = tree.root().subgroups().next().unwrap();
        let ids: Vec<_> = group.leaves().map(|item| item.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_selector_chain_stops_on_none() {
        let items = vec![entry(1, "A")];
        let selector: GroupSelectorFn<Entry> = Arc::new(|level, _parent| match level {
            0 => Some(GroupDescription::by_property("category")),
            1 => Some(GroupDescription::by_key(|item: &Entry| {
                (item.id % 2 == 0).into()
            })),
            _ => None,
        });
        let policy = GroupingPolicy {
            descriptions: Vec::new(),
            selector: Some(selector),
        };

        let path = policy.key_path(&items[0]);
        assert_eq!(
            path,
            vec![PropertyValue::from("A"), PropertyValue::from(false)]
        );
    }
}
