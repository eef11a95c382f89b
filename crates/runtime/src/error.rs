//! Error types for the multiplexer runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while bridging a debugger to an automation client.
///
/// Only [`Error::Attach`] and [`Error::Detach`] are ever returned to the
/// client directly. Everything on the command path is rendered into an
/// `{id, error}` reply instead.
#[derive(Debug, Error)]
pub enum Error {
	/// Native attach call failed.
	#[error("Failed to attach debugger: {0}")]
	Attach(String),

	/// Native detach call failed.
	#[error("Failed to detach debugger: {0}")]
	Detach(String),

	/// The debugger rejected a command or returned an application-level error.
	#[error("{0}")]
	Command(String),

	/// Message from the client lacks required fields or is otherwise unusable.
	#[error("Protocol violation: {0}")]
	ProtocolViolation(String),

	/// Client reused an id whose command is still pending.
	#[error("Protocol violation: command id {0} is already pending")]
	DuplicateId(u64),

	/// Command was pending at close, or issued after it.
	#[error("Session closed: {0}")]
	SessionClosed(String),

	/// Transport-level error talking to the debugger endpoint.
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Channel closed unexpectedly.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if the command failed because the session is gone.
	pub fn is_session_closed(&self) -> bool {
		matches!(self, Error::SessionClosed(_))
	}

	/// Returns true if the client sent something the bridge cannot accept.
	pub fn is_protocol_violation(&self) -> bool {
		matches!(self, Error::ProtocolViolation(_) | Error::DuplicateId(_))
	}

	/// Returns true for failures that only affect the session lifecycle.
	pub fn is_lifecycle(&self) -> bool {
		matches!(self, Error::Attach(_) | Error::Detach(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn command_error_displays_bare_message() {
		let err = Error::Command("Cannot find context with specified id".into());
		assert_eq!(err.to_string(), "Cannot find context with specified id");
	}

	#[test]
	fn classification_helpers() {
		assert!(Error::SessionClosed("target closed".into()).is_session_closed());
		assert!(Error::DuplicateId(3).is_protocol_violation());
		assert!(Error::ProtocolViolation("missing method".into()).is_protocol_violation());
		assert!(Error::Detach("gone".into()).is_lifecycle());
		assert!(!Error::ChannelClosed.is_lifecycle());
	}

	#[test]
	fn session_closed_message_carries_reason() {
		assert_eq!(
			Error::SessionClosed("target closed".into()).to_string(),
			"Session closed: target closed"
		);
	}
}
