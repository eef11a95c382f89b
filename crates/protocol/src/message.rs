//! Command, response, and event messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command sent by the automation client.
///
/// The `id` is assigned by the client and is the only correlation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
	/// Client-assigned correlation id.
	pub id: u64,
	/// Protocol method, e.g. `Runtime.evaluate`.
	pub method: String,
	/// Method parameters, `null` when the client omitted them.
	#[serde(default)]
	pub params: Value,
	/// Target session the command is addressed to.
	#[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Reply to a [`Command`], carrying either `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	/// Id of the command this reply belongs to.
	pub id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
	#[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

impl Response {
	/// Successful reply. A `null` result is normalized to an empty object.
	pub fn success(id: u64, result: Value, session_id: Option<String>) -> Self {
		let result = match result {
			Value::Null => Value::Object(Map::new()),
			other => other,
		};
		Self {
			id,
			result: Some(result),
			error: None,
			session_id,
		}
	}

	/// Error reply carrying only a human-readable message.
	pub fn failure(id: u64, message: impl Into<String>, session_id: Option<String>) -> Self {
		Self {
			id,
			result: None,
			error: Some(ErrorPayload::new(message)),
			session_id,
		}
	}

	pub fn is_error(&self) -> bool {
		self.error.is_some()
	}
}

/// Error details of a failed command.
///
/// DevTools endpoints also send a numeric `code`; the bridge only ever
/// produces `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<i64>,
}

impl ErrorPayload {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			code: None,
		}
	}
}

/// Unsolicited notification. Never carries an `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub method: String,
	#[serde(default)]
	pub params: Value,
	#[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

impl Event {
	/// Event with `null` params normalized to an empty object.
	pub fn new(method: impl Into<String>, params: Value, session_id: Option<String>) -> Self {
		let params = match params {
			Value::Null => Value::Object(Map::new()),
			other => other,
		};
		Self {
			method: method.into(),
			params,
			session_id,
		}
	}
}

/// Any message travelling towards the side that issued commands.
///
/// Untagged: a frame with an `id` is a [`Response`], a frame with only a
/// `method` is an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Response(Response),
	Event(Event),
	/// Forward-compatible catch-all.
	Unknown(Value),
}
