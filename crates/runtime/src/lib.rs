//! Debugger-transport multiplexer.
//!
//! Exposes one debugger attachment as the single message channel an
//! automation client expects. The client's command ids are remembered in a
//! correlation table and stamped back onto the adapter's results; adapter
//! events are forwarded as id-less messages; detach from either side closes
//! the session exactly once, failing whatever was still pending.
//!
//! # Architecture
//!
//! ```text
//! client ──send()──▶ TransportBridge ──issue_command()──▶ DebuggerAdapter
//!   ▲                  │  CorrelationTable                    │
//!   └──on_message()────┴──────────── AdapterEvent ◀───────────┘
//! ```
//!
//! - [`TransportBridge`]: session handle, lifecycle, ordered delivery
//! - [`DebuggerAdapter`]: the native debugger seam
//! - [`CdpSocketAdapter`]: adapter for a DevTools WebSocket endpoint
//! - [`CorrelationTable`]: pending commands keyed by client id

pub mod adapter;
pub mod bridge;
pub mod cdp_socket;
pub mod correlation;
pub mod error;
pub mod lifecycle;
pub mod options;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapter::{AdapterEvent, AdapterFuture, DebuggerAdapter, EventSink, SubscriberSlot};
pub use bridge::{CloseHandler, MessageHandler, TransportBridge};
pub use cdp_socket::CdpSocketAdapter;
pub use correlation::{Continuation, CorrelationTable};
pub use error::{Error, Result};
pub use lifecycle::{Lifecycle, SessionState};
pub use options::{BridgeOptions, CLIENT_CLOSE_REASON, DEFAULT_PROTOCOL_VERSION};
