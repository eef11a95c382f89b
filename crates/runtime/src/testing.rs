//! Scripted in-memory [`DebuggerAdapter`] for tests.
//!
//! Every issued command stays pending until the test settles it with
//! [`ScriptedAdapter::resolve`] or [`ScriptedAdapter::fail`], so completion
//! order is entirely under the test's control. Events and the detach signal
//! are injected with [`ScriptedAdapter::emit_event`] and
//! [`ScriptedAdapter::emit_detach`].
//!
//! ```ignore
//! let adapter = Arc::new(ScriptedAdapter::new());
//! let bridge = TransportBridge::connect(adapter.clone(), BridgeOptions::default()).await?;
//! bridge.send(r#"{"id":1,"method":"Runtime.evaluate","params":{"expression":"1+1"}}"#);
//! let issued = adapter.wait_for_issued(1).await;
//! adapter.resolve(issued[0].seq, json!({"value": 2}));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, oneshot};

use crate::adapter::{AdapterEvent, AdapterFuture, DebuggerAdapter, EventSink, SubscriberSlot};
use crate::error::{Error, Result};

/// A command the adapter received, with the adapter's own sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedCommand {
	pub seq: u64,
	pub method: String,
	pub params: Value,
	pub session_id: Option<String>,
}

/// Adapter whose behaviour is driven entirely by the test.
pub struct ScriptedAdapter {
	attached: AtomicBool,
	attach_error: Mutex<Option<String>>,
	detach_error: Mutex<Option<String>>,
	attach_calls: AtomicUsize,
	detach_calls: AtomicUsize,
	detach_held: AtomicBool,
	detach_released: Notify,
	protocol_version: Mutex<Option<String>>,
	next_seq: AtomicU64,
	issued: Mutex<Vec<IssuedCommand>>,
	waiting: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
	issued_changed: Notify,
	detach_signalled: AtomicBool,
	subscriber: SubscriberSlot,
}

impl Default for ScriptedAdapter {
	fn default() -> Self {
		Self::new()
	}
}

impl ScriptedAdapter {
	/// Detached adapter whose attach succeeds.
	pub fn new() -> Self {
		Self {
			attached: AtomicBool::new(false),
			attach_error: Mutex::new(None),
			detach_error: Mutex::new(None),
			attach_calls: AtomicUsize::new(0),
			detach_calls: AtomicUsize::new(0),
			detach_held: AtomicBool::new(false),
			detach_released: Notify::new(),
			protocol_version: Mutex::new(None),
			next_seq: AtomicU64::new(1),
			issued: Mutex::new(Vec::new()),
			waiting: Mutex::new(HashMap::new()),
			issued_changed: Notify::new(),
			detach_signalled: AtomicBool::new(false),
			subscriber: SubscriberSlot::new(),
		}
	}

	/// Adapter that reports itself as already attached.
	pub fn attached() -> Self {
		let adapter = Self::new();
		adapter.attached.store(true, Ordering::SeqCst);
		adapter
	}

	/// Makes `attach` fail with `message`.
	pub fn fail_attach(self, message: &str) -> Self {
		*self.attach_error.lock() = Some(message.to_string());
		self
	}

	/// Makes `detach` fail with `message`.
	pub fn fail_detach(self, message: &str) -> Self {
		*self.detach_error.lock() = Some(message.to_string());
		self
	}

	/// Makes `detach` wait until [`release_detach`](Self::release_detach).
	pub fn hold_detach(self) -> Self {
		self.detach_held.store(true, Ordering::SeqCst);
		self
	}

	/// Lets a held `detach` finish.
	pub fn release_detach(&self) {
		self.detach_released.notify_one();
	}

	pub fn attach_calls(&self) -> usize {
		self.attach_calls.load(Ordering::SeqCst)
	}

	pub fn detach_calls(&self) -> usize {
		self.detach_calls.load(Ordering::SeqCst)
	}

	/// Version passed to the last `attach` call.
	pub fn protocol_version(&self) -> Option<String> {
		self.protocol_version.lock().clone()
	}

	pub fn is_subscribed(&self) -> bool {
		self.subscriber.is_subscribed()
	}

	/// Commands received so far, in issue order.
	pub fn issued(&self) -> Vec<IssuedCommand> {
		self.issued.lock().clone()
	}

	/// Waits until at least `count` commands have been issued.
	pub async fn wait_for_issued(&self, count: usize) -> Vec<IssuedCommand> {
		loop {
			let changed = self.issued_changed.notified();
			{
				let issued = self.issued.lock();
				if issued.len() >= count {
					return issued.clone();
				}
			}
			changed.await;
		}
	}

	/// Completes command `seq` successfully. Returns false if it already settled.
	pub fn resolve(&self, seq: u64, result: Value) -> bool {
		self.settle(seq, Ok(result))
	}

	/// Fails command `seq` with `message`. Returns false if it already settled.
	pub fn fail(&self, seq: u64, message: &str) -> bool {
		self.settle(seq, Err(Error::Command(message.to_string())))
	}

	/// Pushes a protocol event to the subscriber.
	pub fn emit_event(&self, method: &str, params: Value, session_id: Option<&str>) -> bool {
		self.subscriber.emit(AdapterEvent::Event {
			method: method.to_string(),
			params,
			session_id: session_id.map(str::to_owned),
		})
	}

	/// Simulates the native side dropping the connection. Only the first call
	/// signals anything.
	pub fn emit_detach(&self, reason: &str) -> bool {
		if self.detach_signalled.swap(true, Ordering::SeqCst) {
			return false;
		}
		self.attached.store(false, Ordering::SeqCst);
		self.subscriber.emit(AdapterEvent::Detached {
			reason: reason.to_string(),
		})
	}

	fn settle(&self, seq: u64, outcome: Result<Value>) -> bool {
		let waiter = self.waiting.lock().remove(&seq);
		match waiter {
			Some(tx) => tx.send(outcome).is_ok(),
			None => false,
		}
	}
}

impl DebuggerAdapter for ScriptedAdapter {
	fn attach(&self, protocol_version: &str) -> AdapterFuture<'_, ()> {
		let protocol_version = protocol_version.to_string();
		Box::pin(async move {
			self.attach_calls.fetch_add(1, Ordering::SeqCst);
			*self.protocol_version.lock() = Some(protocol_version);
			if let Some(message) = self.attach_error.lock().clone() {
				return Err(Error::Attach(message));
			}
			self.attached.store(true, Ordering::SeqCst);
			Ok(())
		})
	}

	fn is_attached(&self) -> bool {
		self.attached.load(Ordering::SeqCst)
	}

	fn issue_command(
		&self,
		method: &str,
		params: Value,
		session_id: Option<&str>,
	) -> AdapterFuture<'_, Value> {
		let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.waiting.lock().insert(seq, tx);
		self.issued.lock().push(IssuedCommand {
			seq,
			method: method.to_string(),
			params,
			session_id: session_id.map(str::to_owned),
		});
		self.issued_changed.notify_waiters();

		Box::pin(async move { rx.await.map_err(|_| Error::ChannelClosed).and_then(|r| r) })
	}

	fn subscribe(&self, sink: EventSink) {
		self.subscriber.set(sink);
	}

	fn unsubscribe(&self) {
		self.subscriber.clear();
	}

	fn detach(&self) -> AdapterFuture<'_, ()> {
		Box::pin(async move {
			self.detach_calls.fetch_add(1, Ordering::SeqCst);
			if self.detach_held.load(Ordering::SeqCst) {
				self.detach_released.notified().await;
			}
			if let Some(message) = self.detach_error.lock().clone() {
				return Err(Error::Detach(message));
			}
			self.attached.store(false, Ordering::SeqCst);
			Ok(())
		})
	}
}
