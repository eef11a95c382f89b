//! [`DebuggerAdapter`] over a DevTools remote-debugging WebSocket.
//!
//! Connects to an endpoint such as
//! `ws://127.0.0.1:9222/devtools/page/<targetId>` and speaks the DevTools
//! protocol on it directly. The adapter numbers its own requests; those ids
//! never leave this module, callers only see the future returned by
//! [`issue_command`](DebuggerAdapter::issue_command).
//!
//! Frames without an id become [`AdapterEvent::Event`]. When the socket ends
//! without a local [`detach`](DebuggerAdapter::detach), a single
//! [`AdapterEvent::Detached`] is emitted and every request still in flight
//! fails with [`Error::TransportError`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dbgmux_protocol::{Command, Message};
use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use crate::adapter::{AdapterEvent, AdapterFuture, DebuggerAdapter, EventSink, SubscriberSlot};
use crate::error::{Error, Result};


/// Reason reported when the endpoint goes away without saying why.
const TARGET_CLOSED: &str = "target closed";

/// Debugger adapter for a DevTools WebSocket endpoint.
pub struct CdpSocketAdapter {
	endpoint: String,
	state: Arc<SocketState>,
	outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
}

struct SocketState {
	attached: AtomicBool,
	detach_requested: AtomicBool,
	next_id: AtomicU64,
	pending: DashMap<u64, oneshot::Sender<Result<Value>>>,
	subscriber: SubscriberSlot,
}

impl CdpSocketAdapter {
	pub fn new(endpoint: impl Into<String>) -> Self {
		Self {
			endpoint: endpoint.into(),
			state: Arc::new(SocketState {
				attached: AtomicBool::new(false),
				detach_requested: AtomicBool::new(false),
				next_id: AtomicU64::new(1),
				pending: DashMap::new(),
				subscriber: SubscriberSlot::new(),
			}),
			outbound: Mutex::new(None),
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// Requests awaiting a reply from the endpoint.
	pub fn in_flight(&self) -> usize {
		self.state.pending.len()
	}
}

impl DebuggerAdapter for CdpSocketAdapter {
	/// Opens the socket. DevTools endpoints do not negotiate a version, so
	/// `protocol_version` is only logged.
	fn attach(&self, protocol_version: &str) -> AdapterFuture<'_, ()> {
		let protocol_version = protocol_version.to_string();
		Box::pin(async move {
			if self.is_attached() {
				return Err(Error::Attach("debugger is already attached".into()));
			}

			tracing::debug!(endpoint = %self.endpoint, protocol_version = %protocol_version, "Connecting to DevTools endpoint");
			let (socket, _) = connect_async(self.endpoint.as_str())
				.await
				.map_err(|err| Error::Attach(format!("{}: {err}", self.endpoint)))?;
			let (mut sink, stream) = socket.split();

			let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
			self.state.detach_requested.store(false, Ordering::SeqCst);
			self.state.attached.store(true, Ordering::SeqCst);
			*self.outbound.lock() = Some(tx);

			tokio::spawn(async move {
				while let Some(message) = rx.recv().await {
					let closing = matches!(message, WsMessage::Close(_));
					if let Err(err) = sink.send(message).await {
						tracing::warn!(error = %err, "DevTools socket write failed");
						break;
					}
					if closing {
						break;
					}
				}
				let _ = sink.close().await;
			});
			tokio::spawn(read_loop(Arc::clone(&self.state), stream));

			tracing::info!(endpoint = %self.endpoint, "Attached to DevTools endpoint");
			Ok(())
		})
	}

	fn is_attached(&self) -> bool {
		self.state.attached.load(Ordering::SeqCst)
	}

	fn issue_command(
		&self,
		method: &str,
		params: Value,
		session_id: Option<&str>,
	) -> AdapterFuture<'_, Value> {
		let method = method.to_string();
		let session_id = session_id.map(str::to_owned);
		Box::pin(async move {
			let outbound = self.outbound.lock().clone();
			let outbound = match outbound {
				Some(tx) if self.is_attached() => tx,
				_ => return Err(Error::TransportError("debugger is not attached".into())),
			};

			let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
			let (tx, rx) = oneshot::channel();
			self.state.pending.insert(id, tx);

			// Shutdown flips `attached` before draining, so either the drain
			// sees this entry or this check sees the flag.
			if !self.is_attached() {
				self.state.pending.remove(&id);
				return Err(Error::TransportError("debugger is not attached".into()));
			}

			let params = match params {
				Value::Null => Value::Object(Map::new()),
				other => other,
			};
			let frame = serde_json::to_string(&Command {
				id,
				method,
				params,
				session_id,
			})?;
			tracing::trace!(id, frame = %frame, "DevTools request");

			if outbound.send(WsMessage::Text(frame.into())).is_err() {
				self.state.pending.remove(&id);
				return Err(Error::TransportError("DevTools socket writer stopped".into()));
			}

			rx.await.map_err(|_| Error::ChannelClosed).and_then(|r| r)
		})
	}

	fn subscribe(&self, sink: EventSink) {
		self.state.subscriber.set(sink);
	}

	fn unsubscribe(&self) {
		self.state.subscriber.clear();
	}

	fn detach(&self) -> AdapterFuture<'_, ()> {
		Box::pin(async move {
			if !self.is_attached() {
				return Err(Error::Detach("debugger is not attached".into()));
			}
			self.state.detach_requested.store(true, Ordering::SeqCst);
			self.state.attached.store(false, Ordering::SeqCst);

			let outbound = self.outbound.lock().take();
			match outbound {
				Some(tx) if tx.send(WsMessage::Close(None)).is_ok() => {
					tracing::info!(endpoint = %self.endpoint, "Detached from DevTools endpoint");
					Ok(())
				}
				_ => Err(Error::Detach("DevTools socket writer already stopped".into())),
			}
		})
	}
}

impl SocketState {
	fn dispatch(&self, text: &str) {
		match serde_json::from_str::<Message>(text) {
			Ok(Message::Response(response)) => match self.pending.remove(&response.id) {
				Some((_, tx)) => {
					let outcome = match response.error {
						Some(error) => Err(Error::Command(error.message)),
						None => Ok(response.result.unwrap_or(Value::Null)),
					};
					let _ = tx.send(outcome);
				}
				None => tracing::warn!(id = response.id, "DevTools response for unknown request"),
			},
			Ok(Message::Event(event)) => {
				self.subscriber.emit(AdapterEvent::Event {
					method: event.method,
					params: event.params,
					session_id: event.session_id,
				});
			}
			Ok(Message::Unknown(value)) => {
				tracing::debug!(frame = %value, "Ignoring unrecognized DevTools frame");
			}
			Err(err) => tracing::warn!(error = %err, "Failed to parse DevTools frame"),
		}
	}

	/// Fails everything in flight and reports the detach unless it was ours.
	fn shutdown(&self, reason: String) {
		self.attached.store(false, Ordering::SeqCst);

		let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
		for id in ids {
			if let Some((_, tx)) = self.pending.remove(&id) {
				let _ = tx.send(Err(Error::TransportError(format!("connection closed: {reason}"))));
			}
		}

		if self.detach_requested.load(Ordering::SeqCst) {
			tracing::debug!(reason = %reason, "DevTools socket closed after detach");
			return;
		}
		tracing::info!(reason = %reason, "DevTools connection dropped");
		self.subscriber.emit(AdapterEvent::Detached { reason });
	}
}

async fn read_loop<S>(state: Arc<SocketState>, mut stream: S)
where
	S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
	let reason = loop {
		match stream.next().await {
			Some(Ok(WsMessage::Text(text))) => state.dispatch(&text),
			Some(Ok(WsMessage::Close(frame))) => {
				break frame
					.map(|frame| frame.reason.to_string())
					.filter(|reason| !reason.is_empty())
					.unwrap_or_else(|| TARGET_CLOSED.to_string());
			}
			Some(Ok(_)) => {}
			Some(Err(err)) => break format!("connection error: {err}"),
			None => break TARGET_CLOSED.to_string(),
		}
	};
	state.shutdown(reason);
}
