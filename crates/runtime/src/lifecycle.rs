//! Session state machine.
//!
//! ```text
//! Detached ──attach──▶ Attaching ──ok──▶ Attached ──detach signal / close()──▶ Detaching ──▶ Closed
//!     ▲                    │
//!     └──────failed────────┘
//! ```
//!
//! The controller is plain data; the bridge holds it under the same lock as
//! the correlation table so both change together.

use std::fmt;

/// Lifecycle of one bridged debugger session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
	Detached,
	Attaching,
	Attached,
	Detaching,
	Closed,
}

impl SessionState {
	pub fn as_str(&self) -> &'static str {
		match self {
			SessionState::Detached => "detached",
			SessionState::Attaching => "attaching",
			SessionState::Attached => "attached",
			SessionState::Detaching => "detaching",
			SessionState::Closed => "closed",
		}
	}
}

impl fmt::Display for SessionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Tracks the session state and guards the single close transition.
#[derive(Debug)]
pub struct Lifecycle {
	state: SessionState,
	close_reason: Option<String>,
}

impl Default for Lifecycle {
	fn default() -> Self {
		Self::new()
	}
}

impl Lifecycle {
	pub fn new() -> Self {
		Self {
			state: SessionState::Detached,
			close_reason: None,
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Reason recorded by the close transition, once it has happened.
	pub fn close_reason(&self) -> Option<&str> {
		self.close_reason.as_deref()
	}

	/// Only an attached session may issue commands.
	pub fn accepts_commands(&self) -> bool {
		self.state == SessionState::Attached
	}

	/// `Detached → Attaching`. Returns false from any other state.
	pub fn begin_attach(&mut self) -> bool {
		self.transition(SessionState::Detached, SessionState::Attaching)
	}

	/// `Attaching → Attached`.
	pub fn attach_succeeded(&mut self) -> bool {
		self.transition(SessionState::Attaching, SessionState::Attached)
	}

	/// `Attaching → Detached`.
	pub fn attach_failed(&mut self) -> bool {
		self.transition(SessionState::Attaching, SessionState::Detached)
	}

	/// `Attached → Detaching`.
	///
	/// Returns true only for the caller that performed the transition; that
	/// caller owns the teardown.
	pub fn begin_detach(&mut self) -> bool {
		self.transition(SessionState::Attached, SessionState::Detaching)
	}

	/// `Attached | Detaching → Closed`, recording `reason`.
	///
	/// Returns true exactly once per session. Every later call is a no-op.
	pub fn close(&mut self, reason: &str) -> bool {
		match self.state {
			SessionState::Attached | SessionState::Detaching => {
				tracing::debug!(from = %self.state, to = %SessionState::Closed, reason, "Session state change");
				self.state = SessionState::Closed;
				self.close_reason = Some(reason.to_string());
				true
			}
			state => {
				tracing::debug!(%state, reason, "Ignoring close request");
				false
			}
		}
	}

	fn transition(&mut self, from: SessionState, to: SessionState) -> bool {
		if self.state != from {
			tracing::debug!(state = %self.state, expected = %from, %to, "Ignoring state change");
			return false;
		}
		tracing::debug!(%from, %to, "Session state change");
		self.state = to;
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn attached() -> Lifecycle {
		let mut lifecycle = Lifecycle::new();
		assert!(lifecycle.begin_attach());
		assert!(lifecycle.attach_succeeded());
		lifecycle
	}

	#[test]
	fn attach_path() {
		let lifecycle = attached();
		assert_eq!(lifecycle.state(), SessionState::Attached);
		assert!(lifecycle.accepts_commands());
		assert!(lifecycle.close_reason().is_none());
	}

	#[test]
	fn failed_attach_returns_to_detached() {
		let mut lifecycle = Lifecycle::new();
		lifecycle.begin_attach();
		assert!(lifecycle.attach_failed());
		assert_eq!(lifecycle.state(), SessionState::Detached);
		assert!(!lifecycle.accepts_commands());
		// A fresh attempt is allowed.
		assert!(lifecycle.begin_attach());
	}

	#[test]
	fn client_close_path() {
		let mut lifecycle = attached();
		assert!(lifecycle.begin_detach());
		assert!(!lifecycle.accepts_commands());
		assert!(!lifecycle.begin_detach());
		assert!(lifecycle.close("client closed"));
		assert_eq!(lifecycle.state(), SessionState::Closed);
		assert_eq!(lifecycle.close_reason(), Some("client closed"));
	}

	#[test]
	fn external_close_path_skips_detaching() {
		let mut lifecycle = attached();
		assert!(lifecycle.close("target closed"));
		assert_eq!(lifecycle.state(), SessionState::Closed);
	}

	#[test]
	fn close_happens_once() {
		let mut lifecycle = attached();
		assert!(lifecycle.close("target closed"));
		assert!(!lifecycle.close("client closed"));
		assert!(!lifecycle.begin_detach());
		assert_eq!(lifecycle.close_reason(), Some("target closed"));
	}

	#[test]
	fn cannot_close_before_attach() {
		let mut lifecycle = Lifecycle::new();
		assert!(!lifecycle.close("whatever"));
		assert_eq!(lifecycle.state(), SessionState::Detached);
	}

	#[test]
	fn display_names() {
		assert_eq!(SessionState::Detaching.to_string(), "detaching");
		assert_eq!(SessionState::Closed.as_str(), "closed");
	}
}
