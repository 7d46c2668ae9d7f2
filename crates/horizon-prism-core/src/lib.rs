//! Horizon Prism Core - signals and owner-thread dispatch.
//!
//! This crate provides the two low-level systems the view engine in
//! `horizon-prism` is built on:
//!
//! - [`Signal<Args>`] - a type-safe signal with multiple connected slots,
//!   invoked synchronously on the emitting thread
//! - [`Dispatcher`] - a FIFO queue of deferred one-shot invocations, drained
//!   on the thread that owns it
//!
//! Prism has no event loop of its own: all notifications are raised on a
//! single logical owner thread, and anything that must run "later" is posted
//! to a [`Dispatcher`] that the owner drains at a point of its choosing.
//!
//! # Example
//!
//! ```
//! use horizon_prism_core::{Dispatcher, Signal};
//!
//! let changed = Signal::<i32>::new();
//! changed.connect(|n| println!("changed to {n}"));
//! changed.emit(7);
//!
//! let dispatcher = Dispatcher::new();
//! dispatcher.post(|| println!("runs later"));
//! dispatcher.run_pending();
//! ```

mod dispatch;
mod signal;

pub use dispatch::Dispatcher;
pub use signal::{ConnectionId, Signal};
