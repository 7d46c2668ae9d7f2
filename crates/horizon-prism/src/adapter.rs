//! Source adapter: bracketed access and the shadow copy.
//!
//! The adapter is the only code that touches the raw source. When a
//! [`SyncHook`] is configured, every raw read or write is wrapped in exactly
//! one hook invocation; everything else in the view indexes the adapter's
//! shadow copy, a private snapshot patched incrementally as source events are
//! processed and re-read wholesale on reset.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{PrismError, PrismResult};
use crate::item::ViewItem;
use crate::source::{AccessMode, SourceCapabilities, SourceEvent, SourceModel, SyncHook};

/// Owns the shadow copy and brackets raw source access.
pub(crate) struct SourceAdapter<T: ViewItem> {
    source: Arc<dyn SourceModel<T>>,
    sync: Option<SyncHook>,
    capabilities: SourceCapabilities,
    shadow: RwLock<Vec<T>>,
}

impl<T: ViewItem> SourceAdapter<T> {
    /// Wraps the source, resolving capabilities once and taking the initial
    /// shadow snapshot (bracketed when a hook is configured).
    pub(crate) fn new(source: Arc<dyn SourceModel<T>>, sync: Option<SyncHook>) -> Self {
        let capabilities = source.capabilities();
        let adapter = Self {
            source,
            sync,
            capabilities,
            shadow: RwLock::new(Vec::new()),
        };
        adapter.refresh_shadow();
        adapter
    }

    pub(crate) fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    pub(crate) fn has_sync_hook(&self) -> bool {
        self.sync.is_some()
    }

    pub(crate) fn source(&self) -> &Arc<dyn SourceModel<T>> {
        &self.source
    }

    /// Runs `access` under the synchronization hook, or directly when no
    /// hook is configured. The hook contract requires it to invoke the
    /// closure exactly once.
    fn bracket<R>(&self, mode: AccessMode, access: impl FnOnce() -> R) -> R {
        match &self.sync {
            None => access(),
            Some(hook) => {
                let mut access = Some(access);
                let mut result = None;
                hook(mode, &mut || {
                    let access = access
                        .take()
                        .expect("sync hook invoked the access closure more than once");
                    result = Some(access());
                });
                result.expect("sync hook failed to invoke the access closure")
            }
        }
    }

    /// Re-reads the whole source into the shadow copy (one bracketed read).
    pub(crate) fn refresh_shadow(&self) {
        let snapshot = self.bracket(AccessMode::Read, || self.source.snapshot());
        tracing::trace!(
            target: "horizon_prism::adapter",
            len = snapshot.len(),
            "shadow refreshed"
        );
        *self.shadow.write() = snapshot;
    }

    /// Clones the current shadow contents.
    pub(crate) fn shadow_clone(&self) -> Vec<T> {
        self.shadow.read().clone()
    }

    /// Runs `f` over the current shadow contents.
    pub(crate) fn with_shadow<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.shadow.read())
    }

    pub(crate) fn shadow_len(&self) -> usize {
        self.shadow.read().len()
    }

    /// Shadow-relative index of `item`, by identity.
    pub(crate) fn shadow_index_of(&self, item: &T) -> Option<usize> {
        self.shadow.read().iter().position(|x| x == item)
    }

    /// Patches the shadow copy with a single source event.
    ///
    /// Out-of-bounds indices mean the shadow and the source have diverged;
    /// the caller recovers with a full refresh.
    pub(crate) fn apply(&self, event: &SourceEvent<T>) -> PrismResult<()> {
        let mut shadow = self.shadow.write();
        match event {
            SourceEvent::Insert { index, item } => {
                if *index > shadow.len() {
                    return Err(PrismError::ConsistencyViolation);
                }
                shadow.insert(*index, item.clone());
            }
            SourceEvent::Remove { index, .. } => {
                if *index >= shadow.len() {
                    return Err(PrismError::ConsistencyViolation);
                }
                shadow.remove(*index);
            }
            SourceEvent::Replace { index, new, .. } => {
                if *index >= shadow.len() {
                    return Err(PrismError::ConsistencyViolation);
                }
                shadow[*index] = new.clone();
            }
            SourceEvent::Move { from, to, .. } => {
                if *from >= shadow.len() || *to >= shadow.len() {
                    return Err(PrismError::ConsistencyViolation);
                }
                let item = shadow.remove(*from);
                shadow.insert(*to, item);
            }
            SourceEvent::Reset => {
                drop(shadow);
                self.refresh_shadow();
            }
        }
        Ok(())
    }

    /// Inserts into the source (one bracketed write).
    pub(crate) fn insert(&self, index: usize, item: T) -> PrismResult<()> {
        self.bracket(AccessMode::Write, || self.source.insert(index, item))
    }

    /// Removes from the source (one bracketed write).
    pub(crate) fn remove(&self, index: usize) -> PrismResult<T> {
        self.bracket(AccessMode::Write, || self.source.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VecModel;
    use parking_lot::Mutex;

    #[derive(Clone, PartialEq, Debug)]
    struct Item(u32);
    impl ViewItem for Item {}

    fn adapter_over(items: Vec<Item>, sync: Option<SyncHook>) -> SourceAdapter<Item> {
        SourceAdapter::new(Arc::new(VecModel::new(items)), sync)
    }

    #[test]
    fn test_initial_shadow_snapshot() {
        let adapter = adapter_over(vec![Item(1), Item(2)], None);
        assert_eq!(adapter.shadow_clone(), vec![Item(1), Item(2)]);
    }

    #[test]
    fn test_incremental_patching() {
        let adapter = adapter_over(vec![Item(1), Item(2), Item(3)], None);

        adapter
            .apply(&SourceEvent::Insert {
                index: 1,
                item: Item(9),
            })
            .unwrap();
        adapter
            .apply(&SourceEvent::Move {
                from: 0,
                to: 3,
                item: Item(1),
            })
            .unwrap();
        adapter
            .apply(&SourceEvent::Remove {
                index: 0,
                item: Item(9),
            })
            .unwrap();
        adapter
            .apply(&SourceEvent::Replace {
                index: 0,
                old: Item(2),
                new: Item(7),
            })
            .unwrap();

        assert_eq!(adapter.shadow_clone(), vec![Item(7), Item(3), Item(1)]);
    }

    #[test]
    fn test_out_of_bounds_patch_is_consistency_violation() {
        let adapter = adapter_over(vec![Item(1)], None);
        let result = adapter.apply(&SourceEvent::Remove {
            index: 4,
            item: Item(1),
        });
        assert_eq!(result, Err(PrismError::ConsistencyViolation));
    }

    #[test]
    fn test_sync_hook_brackets_each_access_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let hook: SyncHook = Arc::new(move |mode, access| {
            log.lock().push(mode);
            access();
        });

        let adapter = adapter_over(vec![Item(1)], Some(hook));
        // Construction takes the initial snapshot.
        assert_eq!(*calls.lock(), vec![AccessMode::Read]);

        adapter.insert(1, Item(2)).unwrap();
        adapter.remove(0).unwrap();
        adapter.refresh_shadow();

        assert_eq!(
            *calls.lock(),
            vec![
                AccessMode::Read,
                AccessMode::Write,
                AccessMode::Write,
                AccessMode::Read
            ]
        );
    }
}
