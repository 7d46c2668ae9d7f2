//! Editable transactions: add-new and item editing.
//!
//! At most one transaction is active at a time. `add_new` inserts a fresh
//! item into the source but keeps it out of normal shaping, parked next to
//! the placeholder, until `commit_new` computes its real filter/sort/group
//! position (or `cancel_new` removes it again). `edit_item` opens a
//! cancellable edit on an item supporting staged editing; committing
//! conservatively re-places the item, since its keys may have changed.
//!
//! Starting a transaction implicitly commits the previous one, and removing
//! a transacted item through the source silently ends its transaction.

use crate::currency::{adjust_currency_for_remove, revalidate_currency, seat_currency_at};
use crate::error::{PrismError, PrismResult};
use crate::events::{CollectionChange, Notice, ViewProperty};
use crate::item::ViewItem;
use crate::policy::insertion_index;
use crate::view::{CollectionView, ViewCore, ViewState};

/// Where the new-item placeholder sits in the view, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderPosition {
    /// No placeholder slot.
    #[default]
    None,
    /// The placeholder occupies view index 0.
    AtBeginning,
    /// The placeholder occupies the last view index.
    AtEnd,
}

/// The view's transaction state: idle, or exactly one pending kind.
pub(crate) enum TransactionState<T> {
    Idle,
    AddingNew(T),
    Editing(T),
}

impl<T> TransactionState<T> {
    pub(crate) fn adding(&self) -> Option<&T> {
        match self {
            Self::AddingNew(item) => Some(item),
            _ => None,
        }
    }

    pub(crate) fn editing(&self) -> Option<&T> {
        match self {
            Self::Editing(item) => Some(item),
            _ => None,
        }
    }
}

impl<T: ViewItem> CollectionView<T> {
    // -------------------------------------------------------------------------
    // Placeholder
    // -------------------------------------------------------------------------

    /// The configured placeholder position.
    pub fn placeholder_position(&self) -> PlaceholderPosition {
        self.core.state.read().placeholder
    }

    /// Moves the placeholder. Fails during an add transaction; reshapes the
    /// view (a Reset).
    pub fn set_placeholder_position(&self, position: PlaceholderPosition) -> PrismResult<()> {
        let mut notices = Vec::new();
        {
            let mut state = self.core.state.write();
            if state.transaction.adding().is_some() {
                return Err(PrismError::Usage(
                    "cannot change the placeholder during an add transaction",
                ));
            }
            state.placeholder = position;
            notices.push(Notice::Property(ViewProperty::PlaceholderPosition));
            ViewCore::refresh_or_defer(&self.core, &mut state, &mut notices);
        }
        self.core.dispatch(notices);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Add transactions
    // -------------------------------------------------------------------------

    /// Whether `add_new`/`add_new_item` can currently start a transaction.
    pub fn can_add_new(&self) -> bool {
        let capabilities = self.core.adapter.capabilities();
        capabilities.editable && !capabilities.fixed_size
    }

    /// Whether a caller-constructed item can be added. Same gate as
    /// [`can_add_new`](Self::can_add_new); the distinction matters only for
    /// sources that can store items they cannot construct.
    pub fn can_add_new_item(&self) -> bool {
        self.can_add_new()
    }

    /// Returns `true` while an add transaction is pending.
    pub fn is_adding_new(&self) -> bool {
        self.core.state.read().transaction.adding().is_some()
    }

    /// The pending add item, while a transaction is open.
    pub fn current_add_item(&self) -> Option<T> {
        self.core.state.read().transaction.adding().cloned()
    }

    /// Starts an add transaction with a default-constructed item.
    pub fn add_new(&self) -> PrismResult<T>
    where
        T: Default,
    {
        self.add_new_item(T::default())
    }

    /// Starts an add transaction with a caller-supplied item: the item
    /// enters the source, sits next to the placeholder outside normal
    /// shaping, and becomes current.
    pub fn add_new_item(&self, item: T) -> PrismResult<T> {
        if !self.can_add_new() {
            return Err(PrismError::Usage("source does not allow adding items"));
        }
        // Adding implicitly commits whatever transaction is open.
        if self.is_editing_item() {
            self.commit_edit()?;
        }
        if self.is_adding_new() {
            self.commit_new()?;
        }

        let source_index;
        {
            let mut state = self.core.state.write();
            if state.defer_count > 0 {
                return Err(PrismError::Usage("cannot add while refresh is deferred"));
            }
            state.transaction = TransactionState::AddingNew(item.clone());
            source_index = self.core.adapter.shadow_len();
        }
        // The insert raises the source event; the handler parks the item in
        // its provisional slot.
        if let Err(error) = self.core.adapter.insert(source_index, item.clone()) {
            self.core.state.write().transaction = TransactionState::Idle;
            return Err(error);
        }

        if item.supports_staged_init() {
            item.begin_init();
        }

        let mut notices = Vec::new();
        {
            let mut state = self.core.state.write();
            notices.push(Notice::Property(ViewProperty::IsAddingNew));
            notices.push(Notice::Property(ViewProperty::CurrentAddItem));
            if let Some(index) = state.new_item_view_index() {
                seat_currency_at(&mut state, index as isize, &mut notices);
            }
        }
        self.core.dispatch(notices);
        Ok(item)
    }

    /// Commits the pending add: ends staged initialization and moves the
    /// item from its provisional slot to its real filter/sort/group
    /// position (possibly out of view). Returns the item, or `None` when no
    /// add was pending.
    pub fn commit_new(&self) -> PrismResult<Option<T>> {
        let item;
        let provisional;
        let mut notices = Vec::new();
        {
            let mut state = self.core.state.write();
            match &state.transaction {
                TransactionState::Editing(_) => {
                    return Err(PrismError::Usage(
                        "cannot commit an add during an edit transaction",
                    ));
                }
                TransactionState::Idle => return Ok(None),
                TransactionState::AddingNew(_) => {}
            }
            provisional = state.new_item_view_index().unwrap_or(0);
            let TransactionState::AddingNew(pending) =
                std::mem::replace(&mut state.transaction, TransactionState::Idle)
            else {
                unreachable!("transaction kind checked above");
            };
            item = pending;
            let placeholder = state.placeholder;
            if let Some(tree) = &mut state.groups {
                tree.sync_specials(placeholder, None);
            }
            notices.push(Notice::Property(ViewProperty::IsAddingNew));
            notices.push(Notice::Property(ViewProperty::CurrentAddItem));
        }

        if item.supports_staged_init() {
            item.end_init();
        }

        {
            let mut state = self.core.state.write();
            if !state.item_passes(&item) {
                // Excluded by the filter: the provisional slot empties out.
                state.filtered_out.push(item.clone());
                notices.push(Notice::Collection(CollectionChange::Remove {
                    item: item.clone(),
                    index: provisional,
                }));
                notices.push(Notice::Property(ViewProperty::Count));
                if state.count() == 0 {
                    notices.push(Notice::Property(ViewProperty::IsEmpty));
                }
                adjust_currency_for_remove(&mut state, provisional, &mut notices);
            } else {
                let projection_index = self.core.resolved_projection_index(&state, &item);
                state.projection.insert(projection_index, item.clone());
                if state.grouped() {
                    let path = state.grouping.key_path(&item);
                    let comparer = state.comparer();
                    let new_flat = {
                        let ViewState {
                            groups, projection, ..
                        } = &mut *state;
                        groups.as_mut().expect("grouped() checked").add_item(
                            item.clone(),
                            &path,
                            comparer.as_ref(),
                            projection,
                        )
                    };
                    if new_flat != provisional {
                        notices.push(Notice::Collection(CollectionChange::Remove {
                            item: item.clone(),
                            index: provisional,
                        }));
                        notices.push(Notice::Collection(CollectionChange::Add {
                            item: item.clone(),
                            index: new_flat,
                        }));
                    }
                } else {
                    let final_index = state.proj_to_view(projection_index);
                    if final_index != provisional {
                        notices.push(Notice::Collection(CollectionChange::Move {
                            item: item.clone(),
                            from: provisional,
                            to: final_index,
                        }));
                    }
                }
                revalidate_currency(&mut state, &mut notices);
            }
        }
        self.core.dispatch(notices);
        Ok(Some(item))
    }

    /// Cancels the pending add: rolls back staged initialization and
    /// removes the item from the source entirely.
    pub fn cancel_new(&self) -> PrismResult<()> {
        let item;
        {
            let state = self.core.state.read();
            match &state.transaction {
                TransactionState::Editing(_) => {
                    return Err(PrismError::Usage(
                        "cannot cancel an add during an edit transaction",
                    ));
                }
                TransactionState::Idle => return Ok(()),
                TransactionState::AddingNew(pending) => item = pending.clone(),
            }
        }

        if item.supports_staged_init() {
            item.end_init();
        }
        match self.core.adapter.shadow_index_of(&item) {
            // The removal event ends the transaction and empties the
            // provisional slot.
            Some(source_index) => {
                self.core.adapter.remove(source_index)?;
            }
            None => {
                // The item vanished from the source behind our back; end the
                // transaction directly.
                let mut notices = Vec::new();
                {
                    let mut state = self.core.state.write();
                    ViewCore::end_pending_new_by_removal(&self.core, &mut state, &mut notices);
                }
                self.core.dispatch(notices);
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Edit transactions
    // -------------------------------------------------------------------------

    /// Returns `true` while an edit transaction is pending.
    pub fn is_editing_item(&self) -> bool {
        self.core.state.read().transaction.editing().is_some()
    }

    /// The item under edit, while a transaction is open.
    pub fn current_edit_item(&self) -> Option<T> {
        self.core.state.read().transaction.editing().cloned()
    }

    /// Whether the pending edit can be rolled back.
    pub fn can_cancel_edit(&self) -> bool {
        self.core
            .state
            .read()
            .transaction
            .editing()
            .is_some_and(|item| item.supports_staged_edit())
    }

    /// Opens an edit transaction on `item`. A no-op when `item` is the
    /// pending add item; implicitly commits prior transactions.
    pub fn edit_item(&self, item: &T) -> PrismResult<()> {
        {
            let state = self.core.state.read();
            if state.transaction.adding() == Some(item) {
                return Ok(());
            }
        }
        if self.is_adding_new() {
            self.commit_new()?;
        }
        if self.is_editing_item() {
            self.commit_edit()?;
        }

        if item.supports_staged_edit() {
            item.begin_edit();
        }
        let mut notices = Vec::new();
        {
            let mut state = self.core.state.write();
            state.transaction = TransactionState::Editing(item.clone());
            notices.push(Notice::Property(ViewProperty::IsEditingItem));
            notices.push(Notice::Property(ViewProperty::CurrentEditItem));
        }
        self.core.dispatch(notices);
        Ok(())
    }

    /// Commits the pending edit: ends staged editing and conservatively
    /// re-places the item (its sort keys, filter verdict, and group keys
    /// may all have changed). Returns the item, or `None` when no edit was
    /// pending.
    pub fn commit_edit(&self) -> PrismResult<Option<T>> {
        let item;
        let mut notices = Vec::new();
        {
            let mut state = self.core.state.write();
            match &state.transaction {
                TransactionState::AddingNew(_) => {
                    return Err(PrismError::Usage(
                        "cannot commit an edit during an add transaction",
                    ));
                }
                TransactionState::Idle => return Ok(None),
                TransactionState::Editing(editing) => item = editing.clone(),
            }
            state.transaction = TransactionState::Idle;
            notices.push(Notice::Property(ViewProperty::IsEditingItem));
            notices.push(Notice::Property(ViewProperty::CurrentEditItem));
        }

        if item.supports_staged_edit() {
            item.end_edit();
        }

        {
            let mut state = self.core.state.write();
            self.reposition_member(&mut state, &item, &mut notices);
        }
        self.core.dispatch(notices);
        Ok(Some(item))
    }

    /// Rolls the pending edit back. Fails when the item does not support
    /// staged editing.
    pub fn cancel_edit(&self) -> PrismResult<()> {
        let item;
        {
            let mut state = self.core.state.write();
            match &state.transaction {
                TransactionState::AddingNew(_) => {
                    return Err(PrismError::Usage(
                        "cannot cancel an edit during an add transaction",
                    ));
                }
                TransactionState::Idle => return Ok(()),
                TransactionState::Editing(editing) => {
                    if !editing.supports_staged_edit() {
                        return Err(PrismError::Usage(
                            "item does not support cancelling edits",
                        ));
                    }
                    item = editing.clone();
                }
            }
            state.transaction = TransactionState::Idle;
        }

        item.cancel_edit();
        let mut notices = vec![
            Notice::Property(ViewProperty::IsEditingItem),
            Notice::Property(ViewProperty::CurrentEditItem),
        ];
        {
            let mut state = self.core.state.write();
            // Values rolled back; position may still be stale if changes
            // leaked out mid-edit.
            self.reposition_member(&mut state, &item, &mut notices);
        }
        self.core.dispatch(notices);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Removal through the view
    // -------------------------------------------------------------------------

    /// Whether items can currently be removed through the view.
    pub fn can_remove(&self) -> bool {
        let capabilities = self.core.adapter.capabilities();
        capabilities.editable
            && !capabilities.fixed_size
            && matches!(self.core.state.read().transaction, TransactionState::Idle)
    }

    /// Removes `item` from the source.
    pub fn remove(&self, item: &T) -> PrismResult<()> {
        let source_index = {
            let state = self.core.state.read();
            if state.defer_count > 0 {
                return Err(PrismError::RefreshDeferred);
            }
            self.check_remove_allowed(&state)?;
            self.core
                .adapter
                .shadow_index_of(item)
                .ok_or(PrismError::Usage("item is not in the collection"))?
        };
        self.core.adapter.remove(source_index)?;
        Ok(())
    }

    /// Removes the item at a view index from the source.
    pub fn remove_at(&self, index: usize) -> PrismResult<()> {
        let source_index = {
            let state = self.core.state.read();
            if state.defer_count > 0 {
                return Err(PrismError::RefreshDeferred);
            }
            self.check_remove_allowed(&state)?;
            if state.placeholder_view_index() == Some(index) {
                return Err(PrismError::PlaceholderMisuse);
            }
            let slot = state
                .slot_at(index)
                .ok_or(PrismError::Usage("view index out of bounds"))?;
            let item = slot.item().ok_or(PrismError::PlaceholderMisuse)?;
            self.core
                .adapter
                .shadow_index_of(item)
                .ok_or(PrismError::ConsistencyViolation)?
        };
        self.core.adapter.remove(source_index)?;
        Ok(())
    }

    fn check_remove_allowed(&self, state: &ViewState<T>) -> PrismResult<()> {
        let capabilities = self.core.adapter.capabilities();
        if !capabilities.editable || capabilities.fixed_size {
            return Err(PrismError::Usage("source does not allow removing items"));
        }
        if !matches!(state.transaction, TransactionState::Idle) {
            return Err(PrismError::Usage(
                "cannot remove while a transaction is pending",
            ));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Shared placement
    // -------------------------------------------------------------------------

    /// Re-derives one member's view placement after its properties changed:
    /// filter membership, sort position, group path.
    pub(crate) fn reposition_member(
        &self,
        state: &mut ViewState<T>,
        item: &T,
        notices: &mut Vec<Notice<T>>,
    ) {
        let in_projection = state.projection.iter().position(|probe| probe == item);
        let passes = state.item_passes(item);
        match (in_projection, passes) {
            (Some(at), false) => {
                let removed = ViewCore::apply_remove(&self.core, state, at, notices);
                state.filtered_out.push(removed.clone());
                ViewCore::watch_item(&self.core, state, &removed);
            }
            (Some(at), true) => {
                let comparer = state.comparer();
                let (from, to) = if let Some(comparer) = &comparer {
                    let moved = state.projection.remove(at);
                    let to = insertion_index(&state.projection, &moved, comparer);
                    state.projection.insert(to, moved);
                    (at, to)
                } else {
                    (at, at)
                };
                if state.grouped() {
                    // Conservative: the group keys may have changed, so
                    // remove wherever the item is and reinsert at the
                    // recomputed path.
                    let path = state.grouping.key_path(item);
                    let ViewState {
                        groups, projection, ..
                    } = &mut *state;
                    let tree = groups.as_mut().expect("grouped() checked");
                    let old_flat = tree.flat_index_of(item);
                    tree.remove_item_exhaustive(item, true);
                    let new_flat =
                        tree.add_item(item.clone(), &path, comparer.as_ref(), projection);
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
                } else if from != to {
                    notices.push(Notice::Collection(CollectionChange::Move {
                        item: item.clone(),
                        from: state.proj_to_view(from),
                        to: state.proj_to_view(to),
                    }));
                }
                revalidate_currency(state, notices);
            }
            (None, true) => {
                if state.remove_filtered_out(item) {
                    let projection_index = self.core.resolved_projection_index(state, item);
                    ViewCore::apply_add(&self.core, state, item.clone(), projection_index, notices);
                }
            }
            (None, false) => {}
        }
    }
}
