//! Signal/slot system for Horizon Prism.
//!
//! Signals are emitted by objects when their state changes, and connected
//! slots (callbacks) are invoked in response.
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The main signal type for emitting notifications
//! - [`ConnectionId`] - Unique identifier returned when connecting a slot
//!
//! # Delivery
//!
//! Every connection is direct: slots run synchronously on the emitting
//! thread, in connection order. Prism raises all of its notifications from a
//! single logical owner thread, so there is no queued or cross-thread
//! delivery here; code that needs deferred execution posts to
//! [`crate::Dispatcher`] instead.
//!
//! Slots may re-enter the signal they were invoked from: the connection list
//! is snapshotted before invocation, so a slot can connect, disconnect, or
//! emit again without deadlocking. A slot disconnected during an emission may
//! still receive that in-flight emission.
//!
//! # Example
//!
//! ```
//! use horizon_prism_core::Signal;
//!
//! // Create a signal that passes a string argument
//! let text_changed = Signal::<String>::new();
//!
//! // Connect a slot (closure)
//! let conn_id = text_changed.connect(|text| {
//!     println!("Text changed to: {}", text);
//! });
//!
//! // Emit the signal
//! text_changed.emit("Hello, World!".to_string());
//!
//! // Disconnect when done
//! text_changed.disconnect(conn_id);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via
    /// [`Signal::disconnect`]. The ID remains valid until the connection is
    /// explicitly disconnected or the signal is dropped.
    pub struct ConnectionId;
}

/// A boxed slot shared between the connection table and in-flight emissions.
type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A type-safe signal that can have multiple connected slots.
///
/// When a signal is emitted, all connected slots are invoked with a reference
/// to the provided arguments, in the order they were connected.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for
///   signals with no arguments, or a tuple like `(String, i32)` for multiple
///   arguments.
///
/// # Thread Safety
///
/// `Signal<Args>` is `Send + Sync` and can be shared between threads; slots
/// always run on whichever thread calls [`emit`](Self::emit).
pub struct Signal<Args> {
    /// All active connections, in insertion order.
    connections: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
    /// Whether signal emission is temporarily blocked.
    blocked: AtomicBool,
}

impl<Args: Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// Returns a `ConnectionId` that can be used to disconnect the slot
    /// later.
    ///
    /// # Example
    ///
    /// ```
    /// use horizon_prism_core::Signal;
    ///
    /// let signal = Signal::<String>::new();
    /// let id = signal.connect(|s| println!("Got: {}", s));
    /// signal.emit("Hello".to_string());
    /// signal.disconnect(id);
    /// ```
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed, `false`
    /// otherwise.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Disconnect all slots from this signal.
    pub fn disconnect_all(&self) {
        self.connections.lock().clear();
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Block signal emission temporarily.
    ///
    /// While blocked, calls to `emit()` do nothing. This is useful during
    /// initialization or batch updates to prevent cascading notifications.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    /// Check if signal emission is currently blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Emit the signal, invoking all connected slots.
    ///
    /// If the signal is blocked, this does nothing. The connection list is
    /// snapshotted before the first slot runs, so slots may freely re-enter
    /// this signal.
    pub fn emit(&self, args: Args) {
        if self.is_blocked() {
            tracing::trace!(target: "horizon_prism_core::signal", "signal blocked, skipping emit");
            return;
        }

        // Snapshot under the lock, invoke outside it.
        let slots: Vec<Slot<Args>> = self.connections.lock().values().cloned().collect();
        tracing::trace!(
            target: "horizon_prism_core::signal",
            connection_count = slots.len(),
            "emitting signal"
        );

        for slot in slots {
            slot(&args);
        }
    }
}

// Signal is Send + Sync when Args is Send: the slot table only stores
// `Send + Sync` closures and is guarded by a Mutex.
unsafe impl<Args: Send> Send for Signal<Args> {}
unsafe impl<Args: Send> Sync for Signal<Args> {}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_connect_and_emit() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let recv = received.clone();
        signal.connect(move |n| recv.lock().push(*n));

        signal.emit(1);
        signal.emit(2);

        assert_eq!(*received.lock(), vec![1, 2]);
    }

    #[test]
    fn test_disconnect() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let recv = received.clone();
        let id = signal.connect(move |n| recv.lock().push(*n));

        signal.emit(1);
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(2);

        assert_eq!(*received.lock(), vec![1]);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_blocked_emission() {
        let signal = Signal::<()>::new();
        let counter = Arc::new(Mutex::new(0));

        let c = counter.clone();
        signal.connect(move |_| *c.lock() += 1);

        signal.set_blocked(true);
        signal.emit(());
        assert_eq!(*counter.lock(), 0);

        signal.set_blocked(false);
        signal.emit(());
        assert_eq!(*counter.lock(), 1);
    }

    #[test]
    fn test_reentrant_emit() {
        // A slot that emits the same signal again must not deadlock.
        let signal = Arc::new(Signal::<u32>::new());
        let received = Arc::new(Mutex::new(Vec::new()));

        let recv = received.clone();
        let inner = signal.clone();
        signal.connect(move |n| {
            recv.lock().push(*n);
            if *n == 0 {
                inner.emit(1);
            }
        });

        signal.emit(0);
        assert_eq!(*received.lock(), vec![0, 1]);
    }

    #[test]
    fn test_disconnect_from_slot() {
        let signal = Arc::new(Signal::<()>::new());
        let counter = Arc::new(Mutex::new(0));

        let c = counter.clone();
        let this = signal.clone();
        let id = Arc::new(Mutex::new(None));
        let id_slot = id.clone();
        let conn = signal.connect(move |_| {
            *c.lock() += 1;
            if let Some(id) = id_slot.lock().take() {
                this.disconnect(id);
            }
        });
        *id.lock() = Some(conn);

        signal.emit(());
        signal.emit(());
        assert_eq!(*counter.lock(), 1);
    }
}
