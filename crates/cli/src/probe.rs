//! One-shot session: attach, run a single command, detach.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use dbgmux_runtime::{BridgeOptions, CdpSocketAdapter, DebuggerAdapter, TransportBridge};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cli::ProbeArgs;

/// Client id used for the probe's only command.
const PROBE_ID: u64 = 1;

#[derive(Debug, Clone)]
pub struct Probe {
	pub method: String,
	pub params: Value,
	pub session_id: Option<String>,
	pub timeout: Duration,
	pub options: BridgeOptions,
}

impl From<&ProbeArgs> for Probe {
	fn from(args: &ProbeArgs) -> Self {
		Self {
			method: args.method.clone(),
			params: args.params.clone(),
			session_id: args.session_id.clone(),
			timeout: args.timeout(),
			options: args.bridge_options(),
		}
	}
}

enum Outcome {
	Reply(String),
	Closed(String),
}

pub async fn run_probe(target: &str, probe: Probe) -> Result<Value> {
	let adapter = Arc::new(CdpSocketAdapter::new(target));
	run_probe_with(adapter, probe).await
}

/// Runs `probe` over any adapter and returns the command's result.
pub async fn run_probe_with(adapter: Arc<dyn DebuggerAdapter>, probe: Probe) -> Result<Value> {
	let bridge = TransportBridge::connect(adapter, probe.options.clone())
		.await
		.context("Failed to open debugger session")?;

	let (tx, mut rx) = mpsc::unbounded_channel();
	let replies = tx.clone();
	bridge.on_message(move |text| {
		let _ = replies.send(Outcome::Reply(text));
	});
	bridge.on_close(move |reason| {
		let _ = tx.send(Outcome::Closed(reason));
	});

	let mut command = json!({"id": PROBE_ID, "method": probe.method, "params": probe.params});
	if let Some(session_id) = &probe.session_id {
		command["sessionId"] = json!(session_id);
	}
	debug!(method = %probe.method, "Sending probe command");
	bridge.send(&command.to_string());

	let outcome = tokio::time::timeout(probe.timeout, wait_for_reply(&mut rx)).await;

	if let Err(err) = bridge.close().await {
		warn!(error = %err, "Debugger session did not close cleanly");
	}

	let reply = outcome
		.map_err(|_| anyhow!("No reply to {} within {:?}", probe.method, probe.timeout))??;
	if let Some(error) = reply.get("error") {
		let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
		bail!("{} failed: {message}", probe.method);
	}
	Ok(reply.get("result").cloned().unwrap_or(Value::Null))
}

async fn wait_for_reply(rx: &mut mpsc::UnboundedReceiver<Outcome>) -> Result<Value> {
	while let Some(outcome) = rx.recv().await {
		match outcome {
			Outcome::Reply(text) => {
				let message: Value = serde_json::from_str(&text).context("Parsing bridge reply")?;
				if message.get("id").and_then(Value::as_u64) == Some(PROBE_ID) {
					return Ok(message);
				}
				debug!(method = ?message.get("method"), "Ignoring event during probe");
			}
			Outcome::Closed(reason) => bail!("Session closed before reply: {reason}"),
		}
	}
	bail!("Session ended before reply")
}

#[cfg(test)]
mod tests {
	use dbgmux_runtime::testing::ScriptedAdapter;

	use super::*;

	fn probe(method: &str) -> Probe {
		Probe {
			method: method.to_string(),
			params: json!({}),
			session_id: None,
			timeout: Duration::from_secs(2),
			options: BridgeOptions::default(),
		}
	}

	#[tokio::test]
	async fn returns_result_and_detaches() {
		let adapter = Arc::new(ScriptedAdapter::new());
		let driver = {
			let adapter = adapter.clone();
			tokio::spawn(async move {
				let issued = adapter.wait_for_issued(1).await;
				adapter.emit_event("Target.targetCreated", json!({}), None);
				adapter.resolve(issued[0].seq, json!({"product": "HeadlessChrome/120"}));
				issued
			})
		};

		let result = run_probe_with(adapter.clone(), probe("Browser.getVersion")).await.unwrap();
		assert_eq!(result, json!({"product": "HeadlessChrome/120"}));

		let issued = driver.await.unwrap();
		assert_eq!(issued[0].method, "Browser.getVersion");
		assert_eq!(adapter.detach_calls(), 1);
	}

	#[tokio::test]
	async fn session_id_is_forwarded() {
		let adapter = Arc::new(ScriptedAdapter::new());
		let driver = {
			let adapter = adapter.clone();
			tokio::spawn(async move {
				let issued = adapter.wait_for_issued(1).await;
				adapter.resolve(issued[0].seq, json!({}));
				issued
			})
		};

		let mut request = probe("Page.enable");
		request.session_id = Some("S-4".into());
		run_probe_with(adapter, request).await.unwrap();

		let issued = driver.await.unwrap();
		assert_eq!(issued[0].session_id.as_deref(), Some("S-4"));
	}

	#[tokio::test]
	async fn error_reply_fails_probe() {
		let adapter = Arc::new(ScriptedAdapter::new());
		{
			let adapter = adapter.clone();
			tokio::spawn(async move {
				let issued = adapter.wait_for_issued(1).await;
				adapter.fail(issued[0].seq, "'Foo.bar' wasn't found");
			});
		}

		let err = run_probe_with(adapter, probe("Foo.bar")).await.unwrap_err();
		assert_eq!(err.to_string(), "Foo.bar failed: 'Foo.bar' wasn't found");
	}

	#[tokio::test]
	async fn detach_before_reply_fails_probe() {
		let adapter = Arc::new(ScriptedAdapter::new());
		{
			let adapter = adapter.clone();
			tokio::spawn(async move {
				adapter.wait_for_issued(1).await;
				adapter.emit_detach("Render process gone.");
			});
		}

		let err = run_probe_with(adapter, probe("Page.reload")).await.unwrap_err();
		assert_eq!(
			err.to_string(),
			"Page.reload failed: Session closed: Render process gone."
		);
	}

	#[tokio::test]
	async fn silent_adapter_times_out() {
		let adapter = Arc::new(ScriptedAdapter::new());
		let mut request = probe("Runtime.evaluate");
		request.timeout = Duration::from_millis(50);

		let err = run_probe_with(adapter.clone(), request).await.unwrap_err();
		assert!(err.to_string().starts_with("No reply to Runtime.evaluate"));
		assert_eq!(adapter.detach_calls(), 1);
	}
}
