//! Transport bridge between a [`DebuggerAdapter`] and an automation client.
//!
//! The client speaks serialized JSON messages over one channel: it calls
//! [`TransportBridge::send`] with commands and receives replies and events
//! through the single handler registered with [`TransportBridge::on_message`].
//!
//! # Message Flow
//!
//! 1. `send()` parses the command and registers its id in the correlation table
//! 2. The command is issued through the adapter on a spawned task
//! 3. The adapter's future resolves; the table entry is settled and its
//!    continuation queues `{id, result}` or `{id, error}`
//! 4. Adapter events are queued as `{method, params}` in arrival order
//! 5. A dispatcher task drains the queue into the registered handlers
//!
//! Correlation table and lifecycle share one lock, and every delivery is
//! queued while that lock is held. Queue order is therefore mutation order:
//! commands drained at close are always delivered before the close handler
//! runs, and nothing that was pending is delivered after it.

use std::sync::{Arc, Weak};

use dbgmux_protocol::{Command, Event, Response};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::adapter::{AdapterEvent, DebuggerAdapter};
use crate::correlation::{Continuation, CorrelationTable};
use crate::error::{Error, Result};
use crate::lifecycle::{Lifecycle, SessionState};
use crate::options::BridgeOptions;


/// Consumer of serialized replies and events.
pub type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Consumer of the terminal close notification; receives the reason.
pub type CloseHandler = Arc<dyn Fn(String) + Send + Sync>;

enum Delivery {
	Message(String),
	Close(String),
}

#[derive(Default)]
struct Handlers {
	message: Mutex<Option<MessageHandler>>,
	close: Mutex<Option<CloseHandler>>,
}

struct Shared {
	lifecycle: Lifecycle,
	pending: CorrelationTable,
}

struct Inner {
	adapter: Arc<dyn DebuggerAdapter>,
	options: BridgeOptions,
	shared: Mutex<Shared>,
	deliveries: mpsc::UnboundedSender<Delivery>,
	handlers: Arc<Handlers>,
	state: watch::Sender<SessionState>,
	runtime: Handle,
}

/// One debugger session exposed as a single message channel.
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct TransportBridge {
	inner: Arc<Inner>,
}

impl TransportBridge {
	/// Attaches `adapter` (unless it is already attached) and starts bridging.
	///
	/// Must be called from within a tokio runtime; the bridge keeps a handle
	/// to it so [`send`](Self::send) works from any thread.
	///
	/// # Errors
	///
	/// Returns [`Error::Attach`] if the adapter fails to attach. No session
	/// exists in that case.
	pub async fn connect(adapter: Arc<dyn DebuggerAdapter>, options: BridgeOptions) -> Result<Self> {
		let mut lifecycle = Lifecycle::new();
		lifecycle.begin_attach();

		if adapter.is_attached() {
			tracing::debug!("Debugger already attached; reusing attachment");
		} else if let Err(err) = adapter.attach(&options.protocol_version).await {
			lifecycle.attach_failed();
			tracing::warn!(error = %err, "Debugger attach failed");
			return Err(match err {
				err @ Error::Attach(_) => err,
				other => Error::Attach(other.to_string()),
			});
		}
		lifecycle.attach_succeeded();

		let (event_tx, event_rx) = mpsc::unbounded_channel();
		adapter.subscribe(event_tx);

		let (deliveries, delivery_rx) = mpsc::unbounded_channel();
		let handlers = Arc::new(Handlers::default());
		let (state, _) = watch::channel(lifecycle.state());
		let runtime = Handle::current();

		let inner = Arc::new(Inner {
			adapter,
			options,
			shared: Mutex::new(Shared {
				lifecycle,
				pending: CorrelationTable::new(),
			}),
			deliveries,
			handlers: Arc::clone(&handlers),
			state,
			runtime: runtime.clone(),
		});

		runtime.spawn(dispatch_loop(handlers, delivery_rx));
		runtime.spawn(event_loop(Arc::downgrade(&inner), event_rx));

		tracing::info!(
			protocol_version = %inner.options.protocol_version,
			"Debugger session attached"
		);
		Ok(Self { inner })
	}

	/// Sets the consumer of replies and events, replacing any previous one.
	pub fn on_message<F>(&self, handler: F)
	where
		F: Fn(String) + Send + Sync + 'static,
	{
		if self.inner.handlers.message.lock().replace(Arc::new(handler)).is_some() {
			tracing::debug!("Replacing message handler");
		}
	}

	/// Sets the consumer of the close notification, replacing any previous one.
	pub fn on_close<F>(&self, handler: F)
	where
		F: Fn(String) + Send + Sync + 'static,
	{
		if self.inner.handlers.close.lock().replace(Arc::new(handler)).is_some() {
			tracing::debug!("Replacing close handler");
		}
	}

	/// Accepts one serialized message from the client.
	///
	/// Commands are answered through the message handler, including every
	/// failure: adapter errors, protocol violations that carry an id, and
	/// commands sent once the session is closing or closed. Messages without
	/// an id, and commands reusing the id of one still pending, are dropped
	/// with a warning.
	pub fn send(&self, message: &str) {
		match parse_command(message) {
			Ok(command) => self.inner.issue(command),
			Err(Rejection::Drop(reason)) => {
				tracing::warn!(reason = %reason, "Dropping client message that is not a command");
			}
			Err(Rejection::Reply {
				id,
				session_id,
				error,
			}) => {
				tracing::warn!(id, error = %error, "Rejecting malformed command");
				enqueue(
					&self.inner.deliveries,
					&Response::failure(id, error.to_string(), session_id),
				);
			}
		}
	}

	/// Client-initiated teardown.
	///
	/// Detaches the adapter if it is still attached, rejects every pending
	/// command, and fires the close handler. Only the first call has any
	/// effect; later calls return `Ok(())`.
	///
	/// # Errors
	///
	/// Returns [`Error::Detach`] if the adapter's detach failed. The session
	/// is closed regardless.
	pub async fn close(&self) -> Result<()> {
		let inner = &self.inner;
		{
			let mut shared = inner.shared.lock();
			if !shared.lifecycle.begin_detach() {
				tracing::debug!(state = %shared.lifecycle.state(), "Close already handled");
				return Ok(());
			}
		}
		inner.state.send_replace(SessionState::Detaching);

		let outcome = if inner.adapter.is_attached() {
			inner.adapter.detach().await.map_err(|err| match err {
				err @ Error::Detach(_) => err,
				other => Error::Detach(other.to_string()),
			})
		} else {
			tracing::debug!("Debugger already detached");
			Ok(())
		};
		if let Err(err) = &outcome {
			tracing::warn!(error = %err, "Detach failed; closing session anyway");
		}

		inner.adapter.unsubscribe();
		{
			let mut shared = inner.shared.lock();
			inner.finish_close(&mut shared, &inner.options.close_reason);
		}
		outcome
	}

	pub fn state(&self) -> SessionState {
		self.inner.shared.lock().lifecycle.state()
	}

	/// Reason the session closed with, once closed.
	pub fn close_reason(&self) -> Option<String> {
		self.inner
			.shared
			.lock()
			.lifecycle
			.close_reason()
			.map(str::to_owned)
	}

	/// Number of commands awaiting the adapter.
	pub fn pending_commands(&self) -> usize {
		self.inner.shared.lock().pending.len()
	}

	/// Resolves once the session reaches [`SessionState::Closed`].
	pub async fn wait_closed(&self) {
		let mut state = self.inner.state.subscribe();
		let _ = state.wait_for(|state| *state == SessionState::Closed).await;
	}
}

impl Inner {
	fn issue(self: &Arc<Self>, command: Command) {
		let Command {
			id,
			method,
			params,
			session_id,
		} = command;

		{
			let mut shared = self.shared.lock();
			if !shared.lifecycle.accepts_commands() {
				let error = closed_error(&shared.lifecycle);
				tracing::debug!(id, method = %method, error = %error, "Rejecting command");
				enqueue(
					&self.deliveries,
					&Response::failure(id, error.to_string(), session_id),
				);
				return;
			}

			// Reused id: dropped, the pending command keeps the only reply.
			let reply = self.reply_to(id, session_id.clone());
			if shared.pending.register(id, &method, reply).is_err() {
				return;
			}
		}

		tracing::debug!(id, method = %method, session_id = ?session_id, "Issuing command");

		let inner = Arc::clone(self);
		self.runtime.spawn(async move {
			let adapter = Arc::clone(&inner.adapter);
			// Issued under the lock: once close has drained `id` it must not
			// reach the adapter.
			let issued = {
				let shared = inner.shared.lock();
				if shared.lifecycle.accepts_commands() && shared.pending.contains(id) {
					Some(adapter.issue_command(&method, params, session_id.as_deref()))
				} else {
					None
				}
			};
			let Some(issued) = issued else {
				tracing::debug!(id, method = %method, "Session closed before command was issued");
				return;
			};
			let outcome = issued.await;
			inner.settle(id, outcome);
		});
	}

	/// Continuation that re-stamps the client's id onto the adapter's outcome.
	fn reply_to(&self, id: u64, session_id: Option<String>) -> Continuation {
		let deliveries = self.deliveries.clone();
		Box::new(move |outcome| {
			let response = match outcome {
				Ok(result) => Response::success(id, result, session_id),
				Err(error) => Response::failure(id, error.to_string(), session_id),
			};
			enqueue(&deliveries, &response);
		})
	}

	fn settle(&self, id: u64, outcome: Result<Value>) {
		let mut shared = self.shared.lock();
		match outcome {
			Ok(result) => shared.pending.resolve(id, result),
			Err(error) => shared.pending.reject(id, error),
		};
	}

	fn forward_event(&self, event: Event) {
		let shared = self.shared.lock();
		if shared.lifecycle.state() == SessionState::Closed {
			tracing::debug!(method = %event.method, "Dropping event after close");
			return;
		}
		tracing::trace!(method = %event.method, "Forwarding event");
		enqueue(&self.deliveries, &event);
	}

	fn handle_detached(&self, reason: String) {
		tracing::info!(reason = %reason, "Debugger detached");
		{
			let mut shared = self.shared.lock();
			if shared.lifecycle.begin_detach() {
				self.state.send_replace(SessionState::Detaching);
			}
			self.finish_close(&mut shared, &reason);
		}
		self.adapter.unsubscribe();
	}

	/// Runs the close transition once: drain, publish, queue the close notice.
	fn finish_close(&self, shared: &mut Shared, reason: &str) {
		if !shared.lifecycle.close(reason) {
			return;
		}
		let drained = shared.pending.drain_all(reason);
		self.state.send_replace(SessionState::Closed);
		if self.deliveries.send(Delivery::Close(reason.to_string())).is_err() {
			tracing::debug!("Dispatcher stopped before close notification");
		}
		tracing::info!(reason, drained, "Session closed");
	}
}

fn closed_error(lifecycle: &Lifecycle) -> Error {
	let reason = lifecycle
		.close_reason()
		.map(str::to_owned)
		.unwrap_or_else(|| format!("session is {}", lifecycle.state()));
	Error::SessionClosed(reason)
}

fn enqueue<T: Serialize>(deliveries: &mpsc::UnboundedSender<Delivery>, message: &T) {
	match serde_json::to_string(message) {
		Ok(text) => {
			if deliveries.send(Delivery::Message(text)).is_err() {
				tracing::debug!("Dispatcher stopped; dropping message");
			}
		}
		Err(err) => tracing::error!(error = %err, "Failed to serialize client message"),
	}
}

/// Why a client message did not become a command.
enum Rejection {
	/// No id to answer; the message is dropped.
	Drop(String),
	/// Answer `id` with `error`.
	Reply {
		id: u64,
		session_id: Option<String>,
		error: Error,
	},
}

fn parse_command(message: &str) -> std::result::Result<Command, Rejection> {
	let value: Value = serde_json::from_str(message)
		.map_err(|err| Rejection::Drop(format!("invalid JSON: {err}")))?;
	let Some(object) = value.as_object() else {
		return Err(Rejection::Drop("message is not a JSON object".into()));
	};
	let Some(id) = object.get("id").and_then(Value::as_u64) else {
		return Err(Rejection::Drop("message has no numeric id".into()));
	};
	let session_id = object
		.get("sessionId")
		.and_then(Value::as_str)
		.map(str::to_owned);
	let Some(method) = object.get("method").and_then(Value::as_str) else {
		return Err(Rejection::Reply {
			id,
			session_id,
			error: Error::ProtocolViolation("command has no method".into()),
		});
	};

	Ok(Command {
		id,
		method: method.to_string(),
		params: object.get("params").cloned().unwrap_or(Value::Null),
		session_id,
	})
}

async fn dispatch_loop(handlers: Arc<Handlers>, mut deliveries: mpsc::UnboundedReceiver<Delivery>) {
	while let Some(delivery) = deliveries.recv().await {
		match delivery {
			Delivery::Message(text) => {
				let handler = handlers.message.lock().clone();
				match handler {
					Some(handler) => handler(text),
					None => tracing::debug!("No message handler registered; dropping message"),
				}
			}
			Delivery::Close(reason) => {
				let handler = handlers.close.lock().clone();
				match handler {
					Some(handler) => handler(reason),
					None => tracing::debug!(reason = %reason, "No close handler registered"),
				}
			}
		}
	}
	tracing::debug!("Bridge dispatcher stopped");
}

async fn event_loop(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<AdapterEvent>) {
	while let Some(event) = events.recv().await {
		let Some(inner) = inner.upgrade() else {
			break;
		};
		match event {
			AdapterEvent::Event {
				method,
				params,
				session_id,
			} => inner.forward_event(Event::new(method, params, session_id)),
			AdapterEvent::Detached { reason } => {
				inner.handle_detached(reason);
				break;
			}
		}
	}
	tracing::debug!("Adapter event loop stopped");
}
