//! The native debugging capability the bridge is built on.
//!
//! A [`DebuggerAdapter`] issues named commands and resolves each one through
//! the future returned at the call site. Everything the debugger says without
//! being asked (protocol events, the detach signal) is pushed as an
//! [`AdapterEvent`] into the single sink registered with
//! [`DebuggerAdapter::subscribe`].

use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;

/// Boxed future returned by adapter operations.
pub type AdapterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Receiving end of the adapter's notifications, owned by one bridge.
pub type EventSink = mpsc::UnboundedSender<AdapterEvent>;

/// Out-of-band notification from the debugger.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
	/// Protocol event, delivered in arrival order.
	Event {
		method: String,
		params: Value,
		session_id: Option<String>,
	},
	/// The native side dropped the connection. Sent at most once.
	Detached { reason: String },
}

/// Interface to a native debugger attached to a single target.
///
/// Implementations must resolve every future returned by
/// [`issue_command`](Self::issue_command) exactly once and must not deliver
/// [`AdapterEvent::Detached`] more than once.
pub trait DebuggerAdapter: Send + Sync {
	/// Attach to the target, requesting the given protocol version.
	fn attach(&self, protocol_version: &str) -> AdapterFuture<'_, ()>;

	/// Whether the debugger is currently attached.
	fn is_attached(&self) -> bool;

	/// Issue one command. The returned future is the only way its result is
	/// reported.
	fn issue_command(
		&self,
		method: &str,
		params: Value,
		session_id: Option<&str>,
	) -> AdapterFuture<'_, Value>;

	/// Route events and the detach signal into `sink`, replacing any
	/// previous subscriber.
	fn subscribe(&self, sink: EventSink);

	/// Drop the current subscriber, if any.
	fn unsubscribe(&self);

	/// Detach from the target. Only valid while attached.
	fn detach(&self) -> AdapterFuture<'_, ()>;
}

/// Single-subscriber slot shared by adapter implementations.
#[derive(Default)]
pub struct SubscriberSlot {
	sink: Mutex<Option<EventSink>>,
}

impl SubscriberSlot {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&self, sink: EventSink) {
		if self.sink.lock().replace(sink).is_some() {
			tracing::debug!("Replacing existing adapter subscriber");
		}
	}

	pub fn clear(&self) {
		self.sink.lock().take();
	}

	pub fn is_subscribed(&self) -> bool {
		self.sink.lock().is_some()
	}

	/// Delivers `event` to the subscriber. Returns false when nobody is
	/// listening.
	pub fn emit(&self, event: AdapterEvent) -> bool {
		let sink = self.sink.lock().clone();
		match sink {
			Some(sink) => sink.send(event).is_ok(),
			None => {
				tracing::debug!(?event, "No adapter subscriber; dropping notification");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn slot_delivers_to_latest_subscriber() {
		let slot = SubscriberSlot::new();
		let (first_tx, mut first_rx) = mpsc::unbounded_channel();
		let (second_tx, mut second_rx) = mpsc::unbounded_channel();

		slot.set(first_tx);
		slot.set(second_tx);
		assert!(slot.emit(AdapterEvent::Detached {
			reason: "target closed".into()
		}));

		assert_eq!(
			second_rx.recv().await,
			Some(AdapterEvent::Detached {
				reason: "target closed".into()
			})
		);
		// The replaced sender was dropped with the slot's old value.
		assert_eq!(first_rx.recv().await, None);
	}

	#[test]
	fn slot_without_subscriber_drops_events() {
		let slot = SubscriberSlot::new();
		assert!(!slot.is_subscribed());
		assert!(!slot.emit(AdapterEvent::Event {
			method: "Page.loadEventFired".into(),
			params: Value::Null,
			session_id: None,
		}));
	}

	#[test]
	fn clear_unsubscribes() {
		let slot = SubscriberSlot::new();
		let (tx, _rx) = mpsc::unbounded_channel();
		slot.set(tx);
		slot.clear();
		assert!(!slot.is_subscribed());
	}
}
