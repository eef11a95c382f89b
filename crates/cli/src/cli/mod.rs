use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use dbgmux_runtime::{BridgeOptions, DEFAULT_PROTOCOL_VERSION};
use serde_json::Value;

#[cfg(test)]
mod tests;

#[derive(Parser, Debug)]
#[command(name = "dbgmux")]
#[command(about = "Bridge a DevTools debugger target to automation clients")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv wire frames)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Serve WebSocket clients at /cdp, one debugger session per connection
	Relay(RelayArgs),

	/// Send a single command through a bridged session and print the result
	Probe(ProbeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RelayArgs {
	/// Address to accept client connections on
	#[arg(long, env = "DBGMUX_LISTEN", default_value = "127.0.0.1:9333")]
	pub listen: SocketAddr,

	/// DevTools WebSocket endpoint each session attaches to
	#[arg(long, env = "DBGMUX_TARGET", value_name = "URL")]
	pub target: String,

	/// Protocol version requested on attach
	#[arg(long, default_value = DEFAULT_PROTOCOL_VERSION)]
	pub protocol_version: String,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
	/// Method to call
	#[arg(default_value = "Browser.getVersion")]
	pub method: String,

	/// DevTools WebSocket endpoint to attach to
	#[arg(long, env = "DBGMUX_TARGET", value_name = "URL")]
	pub target: String,

	/// Command parameters as a JSON object
	#[arg(long, default_value = "{}", value_parser = parse_params)]
	pub params: Value,

	/// Route the command to a child session
	#[arg(long)]
	pub session_id: Option<String>,

	/// Give up waiting for the reply after this many milliseconds
	#[arg(long, default_value_t = 10_000)]
	pub timeout_ms: u64,

	/// Protocol version requested on attach
	#[arg(long, default_value = DEFAULT_PROTOCOL_VERSION)]
	pub protocol_version: String,
}

impl RelayArgs {
	pub fn bridge_options(&self) -> BridgeOptions {
		BridgeOptions::new().protocol_version(self.protocol_version.clone())
	}
}

impl ProbeArgs {
	pub fn bridge_options(&self) -> BridgeOptions {
		BridgeOptions::new().protocol_version(self.protocol_version.clone())
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

fn parse_params(raw: &str) -> Result<Value, String> {
	match serde_json::from_str::<Value>(raw) {
		Ok(value @ Value::Object(_)) => Ok(value),
		Ok(_) => Err("params must be a JSON object".to_string()),
		Err(err) => Err(format!("invalid JSON: {err}")),
	}
}
