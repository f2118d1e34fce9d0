//! Signalling connection to a realtime room.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use proctor_core::room::{Room, RoomError, SessionSlot};
use serde::Serialize;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::{net::TcpStream, sync::Mutex, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, protocol::Message as WsMessage},
};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Signalling protocol revision announced on connect.
const PROTOCOL_VERSION: u32 = 15;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

#[derive(Serialize)]
struct DataEnvelope<'a> {
    data: DataPacket<'a>,
}

#[derive(Serialize)]
struct DataPacket<'a> {
    topic: &'a str,
    payload: &'a str,
}

/// Builds the signalling WebSocket URL for `base` (an `http(s)://` or
/// `ws(s)://` service URL) and `token`.
pub fn signal_url(base: &str, token: &str) -> Result<String, RoomError> {
    let base = base.trim().trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("wss://") || base.starts_with("ws://") {
        base.to_string()
    } else {
        return Err(RoomError::Connect {
            url: base.to_string(),
            reason: "URL scheme must be ws, wss, http or https".to_string(),
        });
    };
    let mut url = Url::parse(&format!("{ws_base}/rtc")).map_err(|e| RoomError::Connect {
        url: base.to_string(),
        reason: e.to_string(),
    })?;
    url.query_pairs_mut()
        .append_pair("access_token", token)
        .append_pair("auto_subscribe", "1")
        .append_pair("sdk", "rust")
        .append_pair("protocol", &PROTOCOL_VERSION.to_string());
    Ok(url.into())
}

/// A `Room` backed by the realtime service's signalling WebSocket.
pub struct SignalRoom {
    name: String,
    connected: Arc<AtomicBool>,
    sink: Mutex<Option<WsSink>>,
    reader: StdMutex<Option<JoinHandle<()>>>,
    slot: SessionSlot,
}

impl SignalRoom {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connected: Arc::new(AtomicBool::new(false)),
            sink: Mutex::new(None),
            reader: StdMutex::new(None),
            slot: SessionSlot::default(),
        }
    }

    fn take_reader(&self) -> Option<JoinHandle<()>> {
        self.reader.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[async_trait]
impl Room for SignalRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self, url: &str, token: &str) -> Result<(), RoomError> {
        let mut sink = self.sink.lock().await;
        if sink.is_some() {
            return Err(RoomError::Connect {
                url: url.to_string(),
                reason: "room is already connected".to_string(),
            });
        }

        let request = signal_url(url, token)?;
        let (ws_stream, _) = connect_async(request)
            .await
            .map_err(|e| RoomError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let (ws_tx, mut ws_rx) = ws_stream.split();
        self.connected.store(true, Ordering::SeqCst);
        info!(room = %self.name, "Connected to realtime room.");

        let connected = self.connected.clone();
        let room = self.name.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => debug!(%room, bytes = text.len(), "Signal message."),
                    Ok(WsMessage::Binary(data)) => debug!(%room, bytes = data.len(), "Signal frame."),
                    Ok(WsMessage::Close(frame)) => {
                        info!(%room, ?frame, "Server closed the room connection.");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%room, error = %e, "Room connection error.");
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
        });

        *sink = Some(ws_tx);
        *self.reader.lock().unwrap_or_else(|e| e.into_inner()) = Some(reader);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RoomError> {
        let ws_tx = self.sink.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);

        let result = match ws_tx {
            Some(mut ws_tx) => match ws_tx.close().await {
                Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
                Err(e) => Err(RoomError::Disconnect(e.to_string())),
            },
            None => Ok(()),
        };
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
        info!(room = %self.name, "Disconnected from realtime room.");
        result
    }

    async fn publish_data(&self, topic: &str, payload: String) -> Result<(), RoomError> {
        let mut sink = self.sink.lock().await;
        let ws_tx = sink
            .as_mut()
            .ok_or_else(|| RoomError::NotConnected(self.name.clone()))?;

        let envelope = DataEnvelope {
            data: DataPacket {
                topic,
                payload: &payload,
            },
        };
        let publish_err = |reason: String| RoomError::Publish {
            topic: topic.to_string(),
            reason,
        };
        let text = serde_json::to_string(&envelope).map_err(|e| publish_err(e.to_string()))?;
        ws_tx
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| publish_err(e.to_string()))
    }

    fn claim_session(&self, session_id: Uuid) -> Result<(), RoomError> {
        self.slot.claim(&self.name, session_id)
    }

    fn release_session(&self, session_id: Uuid) {
        self.slot.release(session_id);
    }
}

impl Drop for SignalRoom {
    fn drop(&mut self) {
        if let Some(reader) = self.take_reader() {
            reader.abort();
        }
    }
}
