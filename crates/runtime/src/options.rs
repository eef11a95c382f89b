//! Bridge configuration.

/// Protocol version requested from the debugger unless overridden.
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.3";

/// Close reason reported when the client tears the session down.
pub const CLIENT_CLOSE_REASON: &str = "Connection closed by client";

/// Options for [`TransportBridge::connect`](crate::TransportBridge::connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
	/// Version string passed to [`DebuggerAdapter::attach`](crate::DebuggerAdapter::attach).
	pub protocol_version: String,
	/// Reason handed to the close handler on client-initiated teardown.
	pub close_reason: String,
}

impl Default for BridgeOptions {
	fn default() -> Self {
		Self {
			protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
			close_reason: CLIENT_CLOSE_REASON.to_string(),
		}
	}
}

impl BridgeOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
		self.protocol_version = version.into();
		self
	}

	pub fn close_reason(mut self, reason: impl Into<String>) -> Self {
		self.close_reason = reason.into();
		self
	}
}
