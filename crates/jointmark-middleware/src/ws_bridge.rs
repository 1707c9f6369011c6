//! WebSocket bridge to the visualization host.
//!
//! [`WsBridge`]:
//!
//! 1. **Ingests** rosbridge `publish` frames on `/<server>/feedback` topics and
//!    republishes them as [`EventPayload::Feedback`] on [`Topic::Feedback`].
//!
//! 2. **Forwards** every command, marker refresh, and alert on the bus to all
//!    connected clients as rosbridge JSON.  A new client first receives the
//!    latched pose of every marker.
//!
//! The bridge does not interpret feedback; limit checking happens in the
//! process that owns the joint handles.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use jointmark_types::{Event, EventPayload, JointError};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Topic};
use crate::codec;

const SOURCE: &str = "jointmark-middleware::ws_bridge";

/// Bridge between the internal [`EventBus`] and WebSocket clients.
#[derive(Clone)]
pub struct WsBridge {
    bus: Arc<EventBus>,
}

impl WsBridge {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Bind `addr` and serve clients until the listener fails to bind.
    ///
    /// # Errors
    ///
    /// Returns [`JointError::Io`] if the TCP listener cannot be bound.
    pub async fn run(self, addr: SocketAddr) -> Result<(), JointError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| JointError::Io(format!("ws bind error on {addr}: {e}")))?;
        info!(%addr, "visualization bridge listening");
        self.serve(listener).await
    }

    /// Accept clients from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), JointError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_client(stream, peer).await {
                            error!(%peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), JointError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| JointError::Io(format!("ws handshake from {peer}: {e}")))?;
        info!(%peer, "visualization host connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut commands = self.bus.subscribe_to(Topic::Commands);
        let mut markers = self.bus.subscribe_to(Topic::MarkerUpdates);
        let mut alerts = self.bus.subscribe_to(Topic::SystemAlerts);

        // Subscribed first, so a pose published meanwhile is sent twice at
        // worst, never lost.
        for event in self.bus.latest_marker_poses() {
            let Some(frame) = codec::encode_event(&event) else {
                continue;
            };
            if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                info!(%peer, "visualization host disconnected");
                return Ok(());
            }
        }
        debug!(%peer, "latched marker poses replayed");

        loop {
            let outbound = tokio::select! {
                r = commands.recv() => r,
                r = markers.recv() => r,
                r = alerts.recv() => r,
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            debug!(%peer, error = %e, "ws read error");
                            break;
                        }
                        Some(Ok(Message::Text(text))) => {
                            self.handle_incoming(text.as_str());
                        }
                        _ => {}
                    }
                    continue;
                }
            };

            match outbound {
                Ok(event) => {
                    let Some(frame) = codec::encode_event(&event) else {
                        continue;
                    };
                    if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(%peer, lagged_by = n, "ws client lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }

        info!(%peer, "visualization host disconnected");
        Ok(())
    }

    /// Decode one inbound text frame and publish it as feedback.
    ///
    /// Frames that are not marker feedback are ignored.
    pub(crate) fn handle_incoming(&self, text: &str) {
        let feedback = match codec::decode_feedback(text) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "ignoring inbound frame");
                return;
            }
        };
        let marker = feedback.marker_name.clone();
        let event = Event::new(SOURCE, EventPayload::Feedback(feedback));
        if let Err(e) = self.bus.publish_to(Topic::Feedback, event) {
            warn!(%marker, error = %e, "feedback dropped");
        }
    }
}
