//! Reconnecting websocket client for server-pushed events.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::ApiError;

pub const WS_PATH: &str = "api/v1/ws";
const BACKOFF_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingEvent {
    #[serde(alias = "type", alias = "event")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting { attempt: u32, delay: Duration },
    /// Gave up after the configured number of attempts.
    Failed(String),
    Closed,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn label(&self) -> String {
        match self {
            ConnectionState::Connecting => "Connecting…".into(),
            ConnectionState::Open => "Live".into(),
            ConnectionState::Reconnecting { attempt, delay } => {
                format!("Reconnecting in {}s (attempt {})", delay.as_secs().max(1), attempt)
            }
            ConnectionState::Failed(_) => "Offline".into(),
            ConnectionState::Closed => "Disconnected".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub url: Url,
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl RealtimeConfig {
    /// Derives `ws(s)://host/api/v1/ws?token=…` from the REST base URL.
    pub fn from_base(base_url: &Url, token: Option<&str>, settings: &crate::app::Settings) -> Result<Self, ApiError> {
        let mut url = base_url.join(WS_PATH)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ApiError::InvalidUrl(format!("cannot use {scheme} for {base_url}")))?;
        if let Some(t) = token {
            url.query_pairs_mut().append_pair("token", t);
        }
        Ok(Self {
            url,
            base_delay: Duration::from_millis(settings.ws_base_delay_ms),
            max_attempts: settings.ws_max_attempts,
        })
    }
}

/// `base × 1.5^attempt`.
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    base.mul_f64(BACKOFF_FACTOR.powi(attempt as i32))
}

/// Parses one text frame. Bad frames are logged and dropped.
pub fn parse_frame(text: &str) -> Option<IncomingEvent> {
    match serde_json::from_str::<IncomingEvent>(text) {
        Ok(ev) => Some(ev),
        Err(_) => match serde_json::from_str::<Value>(text) {
            Ok(other) => Some(IncomingEvent {
                event_type: "message".into(),
                data: other,
            }),
            Err(e) => {
                log::warn!("dropping unparseable realtime frame: {e}");
                None
            }
        },
    }
}

/// Owner of a running connection. Dropping it tears the connection and any
/// pending reconnect timer down.
pub struct RealtimeHandle {
    pub events: mpsc::Receiver<IncomingEvent>,
    pub state: watch::Receiver<ConnectionState>,
    last_message: Arc<Mutex<Option<IncomingEvent>>>,
    shutdown: watch::Sender<bool>,
}

impl RealtimeHandle {
    pub fn last_message(&self) -> Option<IncomingEvent> {
        self.last_message
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct RealtimeClient;

impl RealtimeClient {
    /// Starts the connection task on the current tokio runtime.
    pub fn spawn(config: RealtimeConfig) -> RealtimeHandle {
        Self::spawn_on(&tokio::runtime::Handle::current(), config)
    }

    pub fn spawn_on(rt: &tokio::runtime::Handle, config: RealtimeConfig) -> RealtimeHandle {
        let (events_tx, events) = mpsc::channel(64);
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let last_message = Arc::new(Mutex::new(None));
        rt.spawn(run(config, state_tx, events_tx, last_message.clone(), shutdown_rx));
        RealtimeHandle {
            events,
            state,
            last_message,
            shutdown,
        }
    }
}

async fn run(
    config: RealtimeConfig,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::Sender<IncomingEvent>,
    last_message: Arc<Mutex<Option<IncomingEvent>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        state_tx.send_replace(ConnectionState::Connecting);
        let connected = tokio::select! {
            res = connect_async(config.url.as_str()) => res,
            _ = shutdown.changed() => {
                state_tx.send_replace(ConnectionState::Closed);
                return;
            }
        };

        match connected {
            Ok((stream, _)) => {
                log::info!("realtime connection open");
                attempt = 0;
                state_tx.send_replace(ConnectionState::Open);
                let (mut write, mut read) = stream.split();
                loop {
                    tokio::select! {
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => deliver(&text, &events_tx, &last_message),
                            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                                Ok(text) => deliver(&text, &events_tx, &last_message),
                                Err(_) => log::warn!("dropping non-utf8 realtime frame"),
                            },
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = write.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Close(frame))) => {
                                log::warn!("realtime connection closed by server: {frame:?}");
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                log::warn!("realtime connection error: {e}");
                                break;
                            }
                            None => break,
                        },
                        _ = shutdown.changed() => {
                            let _ = write.send(Message::Close(None)).await;
                            state_tx.send_replace(ConnectionState::Closed);
                            return;
                        }
                    }
                }
            }
            Err(e) => log::warn!("realtime connect failed: {e}"),
        }

        if attempt >= config.max_attempts {
            let msg = format!("gave up after {} reconnect attempts", config.max_attempts);
            log::error!("realtime {msg}");
            state_tx.send_replace(ConnectionState::Failed(msg));
            return;
        }
        let delay = reconnect_delay(config.base_delay, attempt);
        attempt += 1;
        log::info!("realtime reconnect in {}ms (attempt {})", delay.as_millis(), attempt);
        state_tx.send_replace(ConnectionState::Reconnecting { attempt, delay });
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                state_tx.send_replace(ConnectionState::Closed);
                return;
            }
        }
    }
}

fn deliver(
    text: &str,
    events_tx: &mpsc::Sender<IncomingEvent>,
    last_message: &Arc<Mutex<Option<IncomingEvent>>>,
) {
    let Some(event) = parse_frame(text) else {
        return;
    };
    *last_message.lock().unwrap_or_else(|p| p.into_inner()) = Some(event.clone());
    if events_tx.try_send(event).is_err() {
        log::debug!("realtime event dropped: consumer is behind or gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Settings;
    use tokio::net::TcpListener;

    #[test]
    fn delay_grows_by_half() {
        let base = Duration::from_millis(1000);
        assert_eq!(reconnect_delay(base, 0), Duration::from_millis(1000));
        assert_eq!(reconnect_delay(base, 1), Duration::from_millis(1500));
        assert_eq!(reconnect_delay(base, 2), Duration::from_millis(2250));
    }

    #[test]
    fn builds_socket_url_with_token() {
        let base = Url::parse("https://api.example.com/").unwrap();
        let cfg = RealtimeConfig::from_base(&base, Some("abc"), &Settings::default()).unwrap();
        assert_eq!(cfg.url.as_str(), "wss://api.example.com/api/v1/ws?token=abc");
        assert_eq!(cfg.max_attempts, 5);
    }

    #[test]
    fn frames_parse_or_drop() {
        let ev = parse_frame(r#"{"type":"batch_update","data":{"batch_id":"b1"}}"#).unwrap();
        assert_eq!(ev.event_type, "batch_update");
        assert_eq!(ev.data["batch_id"], "b1");
        assert_eq!(parse_frame("[1,2]").unwrap().event_type, "message");
        assert!(parse_frame("not json").is_none());
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut handle = RealtimeClient::spawn(RealtimeConfig {
            url: Url::parse(&format!("ws://127.0.0.1:{port}/api/v1/ws")).unwrap(),
            base_delay: Duration::from_millis(1),
            max_attempts: 2,
        });
        let final_state = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let s = handle.state.borrow_and_update().clone();
                if matches!(s, ConnectionState::Failed(_)) {
                    return s;
                }
                if handle.state.changed().await.is_err() {
                    return handle.state.borrow().clone();
                }
            }
        })
        .await
        .unwrap();
        assert!(matches!(final_state, ConnectionState::Failed(_)));
    }

    #[tokio::test]
    async fn delivers_json_frames_and_skips_garbage() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text("garbage".into())).await.unwrap();
            ws.send(Message::Text(r#"{"event":"stats","data":{}}"#.into())).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let mut handle = RealtimeClient::spawn(RealtimeConfig {
            url: Url::parse(&format!("ws://{addr}/api/v1/ws?token=t")).unwrap(),
            base_delay: Duration::from_millis(50),
            max_attempts: 0,
        });
        let ev = tokio::time::timeout(Duration::from_secs(5), handle.events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ev.event_type, "stats");
        assert_eq!(handle.last_message(), Some(ev));
        handle.shutdown();
    }
}
