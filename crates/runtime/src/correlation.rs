//! In-flight command tracking keyed by the client's correlation id.
//!
//! Each entry holds the continuation captured when the command was issued.
//! Settling an entry removes it and runs the continuation exactly once, so a
//! given id can never be answered twice.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Instant;

use serde_json::Value;

use crate::error::{Error, Result};

/// Invoked with the command's outcome when it settles.
pub type Continuation = Box<dyn FnOnce(Result<Value>) + Send>;

struct PendingCommand {
	method: String,
	issued_at: Instant,
	reply: Continuation,
}

/// Pending commands keyed by client-assigned id.
#[derive(Default)]
pub struct CorrelationTable {
	pending: HashMap<u64, PendingCommand>,
}

impl CorrelationTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Tracks command `id` until it settles.
	///
	/// Fails with [`Error::DuplicateId`] if `id` is still pending; the
	/// existing entry is left untouched and `reply` is dropped unused.
	pub fn register(&mut self, id: u64, method: &str, reply: Continuation) -> Result<()> {
		match self.pending.entry(id) {
			Entry::Occupied(existing) => {
				tracing::warn!(
					id,
					method,
					pending_method = %existing.get().method,
					"Duplicate command id"
				);
				Err(Error::DuplicateId(id))
			}
			Entry::Vacant(slot) => {
				slot.insert(PendingCommand {
					method: method.to_string(),
					issued_at: Instant::now(),
					reply,
				});
				Ok(())
			}
		}
	}

	/// Completes `id` with a result. Returns false if `id` was not pending.
	pub fn resolve(&mut self, id: u64, result: Value) -> bool {
		self.settle(id, Ok(result))
	}

	/// Completes `id` with an error. Returns false if `id` was not pending.
	pub fn reject(&mut self, id: u64, error: Error) -> bool {
		self.settle(id, Err(error))
	}

	/// Rejects every pending command with [`Error::SessionClosed`], lowest id
	/// first, and empties the table. Returns how many were rejected.
	pub fn drain_all(&mut self, reason: &str) -> usize {
		let mut drained: Vec<(u64, PendingCommand)> = self.pending.drain().collect();
		drained.sort_unstable_by_key(|(id, _)| *id);

		let count = drained.len();
		for (id, command) in drained {
			tracing::debug!(id, method = %command.method, reason, "Rejecting pending command on close");
			(command.reply)(Err(Error::SessionClosed(reason.to_string())));
		}
		count
	}

	pub fn contains(&self, id: u64) -> bool {
		self.pending.contains_key(&id)
	}

	pub fn len(&self) -> usize {
		self.pending.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}

	fn settle(&mut self, id: u64, outcome: Result<Value>) -> bool {
		match self.pending.remove(&id) {
			Some(command) => {
				tracing::debug!(
					id,
					method = %command.method,
					ok = outcome.is_ok(),
					elapsed_ms = command.issued_at.elapsed().as_millis() as u64,
					"Command settled"
				);
				(command.reply)(outcome);
				true
			}
			None => {
				tracing::warn!(id, "Completion for a command that is no longer pending");
				false
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use parking_lot::Mutex;
	use serde_json::json;

	use super::*;

	type Outcomes = Arc<Mutex<Vec<(u64, std::result::Result<Value, String>)>>>;

	fn recorder(outcomes: &Outcomes, id: u64) -> Continuation {
		let outcomes = Arc::clone(outcomes);
		Box::new(move |outcome| {
			outcomes.lock().push((id, outcome.map_err(|e| e.to_string())));
		})
	}

	#[test]
	fn resolve_runs_continuation_once() {
		let outcomes = Outcomes::default();
		let mut table = CorrelationTable::new();
		table.register(1, "Runtime.evaluate", recorder(&outcomes, 1)).unwrap();

		assert!(table.resolve(1, json!({"value": 2})));
		assert!(!table.resolve(1, json!({"value": 3})));
		assert!(table.is_empty());

		let outcomes = outcomes.lock();
		assert_eq!(outcomes.len(), 1);
		assert_eq!(outcomes[0], (1, Ok(json!({"value": 2}))));
	}

	#[test]
	fn reject_passes_error_through() {
		let outcomes = Outcomes::default();
		let mut table = CorrelationTable::new();
		table.register(5, "DOM.getDocument", recorder(&outcomes, 5)).unwrap();

		assert!(table.reject(5, Error::Command("No node with given id".into())));
		assert_eq!(
			outcomes.lock()[0],
			(5, Err("No node with given id".to_string()))
		);
	}

	#[test]
	fn duplicate_id_keeps_original_entry() {
		let outcomes = Outcomes::default();
		let mut table = CorrelationTable::new();
		table.register(9, "Page.navigate", recorder(&outcomes, 9)).unwrap();

		let err = table
			.register(9, "Page.reload", recorder(&outcomes, 99))
			.unwrap_err();
		assert!(matches!(err, Error::DuplicateId(9)));
		assert_eq!(table.len(), 1);

		table.resolve(9, json!({}));
		// Only the original continuation ran.
		let outcomes = outcomes.lock();
		assert_eq!(outcomes.len(), 1);
		assert_eq!(outcomes[0], (9, Ok(json!({}))));
	}

	#[test]
	fn unknown_id_is_a_noop() {
		let mut table = CorrelationTable::new();
		assert!(!table.resolve(42, json!({})));
		assert!(!table.reject(42, Error::ChannelClosed));
	}

	#[test]
	fn drain_all_rejects_everything_in_id_order() {
		let outcomes = Outcomes::default();
		let mut table = CorrelationTable::new();
		for id in [30, 10, 20] {
			table.register(id, "Runtime.evaluate", recorder(&outcomes, id)).unwrap();
		}

		assert_eq!(table.drain_all("target closed"), 3);
		assert!(table.is_empty());

		let outcomes = outcomes.lock();
		let ids: Vec<u64> = outcomes.iter().map(|(id, _)| *id).collect();
		assert_eq!(ids, vec![10, 20, 30]);
		for (_, outcome) in outcomes.iter() {
			assert_eq!(outcome, &Err("Session closed: target closed".to_string()));
		}
	}

	#[test]
	fn id_can_be_reused_after_settling() {
		let outcomes = Outcomes::default();
		let mut table = CorrelationTable::new();
		table.register(1, "A.a", recorder(&outcomes, 1)).unwrap();
		table.resolve(1, json!({}));
		assert!(table.register(1, "B.b", recorder(&outcomes, 1)).is_ok());
		assert!(table.contains(1));
	}
}
