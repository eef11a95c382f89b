//! WebSocket relay: one bridged debugger session per client connection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{State, WebSocketUpgrade};
use axum::routing::get;
use dbgmux_runtime::{BridgeOptions, CdpSocketAdapter, TransportBridge};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::cli::RelayArgs;

/// How long a finished session may spend flushing its last frames.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RelayConfig {
	/// DevTools endpoint every session attaches to.
	pub target: String,
	pub options: BridgeOptions,
}

impl From<&RelayArgs> for RelayConfig {
	fn from(args: &RelayArgs) -> Self {
		Self {
			target: args.target.clone(),
			options: args.bridge_options(),
		}
	}
}

pub async fn run_relay_server(listen: SocketAddr, config: RelayConfig) -> Result<()> {
	let listener = TcpListener::bind(listen)
		.await
		.with_context(|| format!("Failed to bind relay server to {listen}"))?;
	info!(%listen, target = %config.target, "Starting debugger relay");
	serve(listener, config).await
}

pub async fn serve(listener: TcpListener, config: RelayConfig) -> Result<()> {
	axum::serve(listener, router(config).into_make_service())
		.await
		.context("Relay server error")
}

pub fn router(config: RelayConfig) -> Router {
	Router::new()
		.route("/", get(|| async { "OK" }))
		.route(
			"/cdp",
			get(
				|ws: WebSocketUpgrade, State(config): State<Arc<RelayConfig>>| async move {
					ws.on_upgrade(|socket| handle_client_socket(socket, config))
				},
			),
		)
		.with_state(Arc::new(config))
}

async fn handle_client_socket(mut socket: WebSocket, config: Arc<RelayConfig>) {
	info!("Automation client connected");

	let adapter = Arc::new(CdpSocketAdapter::new(config.target.clone()));
	let bridge = match TransportBridge::connect(adapter, config.options.clone()).await {
		Ok(bridge) => bridge,
		Err(err) => {
			warn!(error = %err, "Could not open debugger session");
			let frame = CloseFrame {
				code: close_code::ERROR,
				reason: "debugger attach failed".into(),
			};
			let _ = socket.send(Message::Close(Some(frame))).await;
			return;
		}
	};

	let (tx, rx) = mpsc::unbounded_channel();
	let messages = tx.clone();
	bridge.on_message(move |text| {
		let _ = messages.send(Message::Text(text.into()));
	});
	bridge.on_close(move |reason| {
		let frame = CloseFrame {
			code: close_code::NORMAL,
			reason: reason.into(),
		};
		let _ = tx.send(Message::Close(Some(frame)));
	});

	let mut rx_stream = UnboundedReceiverStream::new(rx);
	let (mut ws_tx, mut ws_rx) = socket.split();

	let send_task = tokio::spawn(async move {
		while let Some(msg) = rx_stream.next().await {
			let closing = matches!(msg, Message::Close(_));
			if ws_tx.send(msg).await.is_err() || closing {
				break;
			}
		}
	});

	loop {
		tokio::select! {
			msg = ws_rx.next() => match msg {
				Some(Ok(Message::Text(text))) => bridge.send(text.as_str()),
				Some(Ok(Message::Close(_))) | None => break,
				Some(Ok(_)) => {}
				Some(Err(err)) => {
					warn!(error = %err, "Client websocket error");
					break;
				}
			},
			_ = bridge.wait_closed() => {
				debug!(reason = ?bridge.close_reason(), "Debugger session ended");
				break;
			}
		}
	}

	if let Err(err) = bridge.close().await {
		warn!(error = %err, "Debugger session did not close cleanly");
	}
	if tokio::time::timeout(FLUSH_TIMEOUT, send_task).await.is_err() {
		debug!("Client writer did not finish flushing");
	}
	info!("Automation client disconnected");
}
