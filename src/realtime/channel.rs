//! Realtime task channel: the socket driver behind the state machine.
//!
//! [`TaskChannel`] spawns a single driver task that owns the WebSocket,
//! the heartbeat interval and the retry timer. Every command, socket
//! callback and timer expiry becomes a [`Machine`] event; the machine's
//! effects are then executed in order. Connection attempts never raise to
//! callers; failures show up as state and are retried per the backoff
//! policy until `disconnect()`.
//!
//! The channel needs a credential: the server authenticates the socket
//! with a `token` query parameter on
//! `{ws-scheme}://{host}/ws/crawler/tasks`.

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Duration, Instant, Interval, Sleep};

use crate::config::Config;
use crate::constants::{HEARTBEAT_INTERVAL, REALTIME_TASKS_PATH};
use crate::credentials::CredentialStore;
use crate::ws::{self, WsEvent, WsReader, WsWriter};

use super::machine::{ConnectionState, Effect, Event, Machine};
use super::tasks::{TaskList, TaskRecord};
use super::SharedConnectionState;

/// Inbound protocol messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    /// Heartbeat acknowledgment. No state change; a missed pong does not
    /// by itself trigger reconnection.
    Pong,
    /// Partial task record to reconcile into the list.
    TaskUpdate { data: TaskRecord },
}

/// Outbound protocol messages.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
}

/// Caller commands delivered to the driver task.
#[derive(Debug)]
enum Command {
    Connect,
    Disconnect,
    SetVisibility(bool),
}

/// Handle to the realtime task channel.
///
/// Not cloneable by design: one owner drives the lifecycle, while the
/// [`TaskList`] handle (cheap to clone) serves any number of readers.
/// Dropping the handle shuts the driver down cleanly.
#[derive(Debug)]
pub struct TaskChannel {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<SharedConnectionState>,
    tasks: TaskList,
}

impl TaskChannel {
    /// Create the channel and spawn its driver task.
    ///
    /// Must be called within a tokio runtime. The channel starts
    /// disconnected; nothing touches the network until [`connect`].
    ///
    /// [`connect`]: TaskChannel::connect
    pub fn new(config: &Config, store: Arc<CredentialStore>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = SharedConnectionState::new();
        let tasks = TaskList::new();

        let driver = Driver {
            machine: Machine::new(),
            url: format!("{}{}", config.realtime_base(), REALTIME_TASKS_PATH),
            store,
            shared: Arc::clone(&shared),
            tasks: tasks.clone(),
            writer: None,
            reader: None,
            heartbeat: None,
            retry: None,
        };
        tokio::spawn(driver.run(cmd_rx));

        Self {
            cmd_tx,
            shared,
            tasks,
        }
    }

    /// Connect (or reconnect). Enables automatic reconnection.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Disconnect and disable reconnection until the next `connect()`.
    /// Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Feed a visibility transition from the embedding UI.
    pub fn set_visibility(&self, visible: bool) {
        self.send(Command::SetVisibility(visible));
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.shared.get().await
    }

    /// True while the socket is open.
    pub async fn is_connected(&self) -> bool {
        self.shared.is_connected().await
    }

    /// Handle to the reconciled task collection.
    pub fn tasks(&self) -> &TaskList {
        &self.tasks
    }

    fn send(&self, command: Command) {
        if self.cmd_tx.send(command).is_err() {
            log::warn!("Realtime channel driver is gone");
        }
    }
}

/// Everything the driver task owns.
struct Driver {
    machine: Machine,
    url: String,
    store: Arc<CredentialStore>,
    shared: Arc<SharedConnectionState>,
    tasks: TaskList,
    writer: Option<WsWriter>,
    reader: Option<WsReader>,
    heartbeat: Option<Interval>,
    retry: Option<Pin<Box<Sleep>>>,
}

/// One resolved `select!` round.
enum Step {
    Cmd(Option<Command>),
    Socket(Option<anyhow::Result<WsEvent>>),
    HeartbeatTick,
    RetryFired,
}

/// Await the next socket event, or park forever when no socket is open.
async fn next_socket_event(reader: &mut Option<WsReader>) -> Option<anyhow::Result<WsEvent>> {
    match reader {
        Some(r) => r.next_event().await,
        None => std::future::pending().await,
    }
}

/// Await the next heartbeat tick, or park forever when stopped.
async fn next_heartbeat(interval: &mut Option<Interval>) {
    match interval {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Await the retry deadline, or park forever when no retry is armed.
async fn retry_elapsed(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(s) => s.as_mut().await,
        None => std::future::pending().await,
    }
}

impl Driver {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let step = tokio::select! {
                cmd = cmd_rx.recv() => Step::Cmd(cmd),
                event = next_socket_event(&mut self.reader) => Step::Socket(event),
                () = next_heartbeat(&mut self.heartbeat) => Step::HeartbeatTick,
                () = retry_elapsed(&mut self.retry) => Step::RetryFired,
            };

            match step {
                Step::Cmd(None) => {
                    // Every handle dropped: tear down and exit.
                    self.dispatch(Event::DisconnectRequested).await;
                    break;
                }
                Step::Cmd(Some(Command::Connect)) => {
                    if self.store.token().is_none() {
                        log::error!("Realtime connect failed: no credential held");
                    } else {
                        self.dispatch(Event::ConnectRequested).await;
                    }
                }
                Step::Cmd(Some(Command::Disconnect)) => {
                    self.dispatch(Event::DisconnectRequested).await;
                }
                Step::Cmd(Some(Command::SetVisibility(visible))) => {
                    self.dispatch(Event::VisibilityChanged(visible)).await;
                }

                Step::Socket(Some(Ok(WsEvent::Text(text)))) => self.handle_text(&text),
                Step::Socket(Some(Ok(WsEvent::Ping(data)))) => {
                    if let Some(writer) = self.writer.as_mut() {
                        if let Err(e) = writer.send_pong(data).await {
                            log::warn!("Failed to answer ping: {e}");
                        }
                    }
                }
                Step::Socket(Some(Ok(WsEvent::Pong))) => {}
                Step::Socket(Some(Ok(WsEvent::Close { code, reason }))) => {
                    log::info!("Realtime socket closed by server ({code}): {reason}");
                    self.drop_socket().await;
                    self.dispatch(Event::Closed).await;
                }
                Step::Socket(Some(Err(e))) => {
                    log::error!("Realtime socket error: {e}");
                    self.dispatch(Event::SocketError).await;
                    self.drop_socket().await;
                    self.dispatch(Event::Closed).await;
                }
                Step::Socket(None) => {
                    log::info!("Realtime socket stream ended");
                    self.drop_socket().await;
                    self.dispatch(Event::Closed).await;
                }

                Step::HeartbeatTick => self.send_ping().await,

                Step::RetryFired => {
                    self.retry = None;
                    self.dispatch(Event::RetryDue).await;
                }
            }
        }
    }

    /// Feed one event through the machine and execute its effects.
    async fn dispatch(&mut self, event: Event) {
        let effects = self.machine.handle(event);
        self.apply(effects).await;
        self.shared.set(self.machine.state()).await;
    }

    /// Execute effects in order. `OpenSocket` resolves inline and feeds
    /// its outcome back through the machine, so follow-on effects join
    /// the queue rather than recursing.
    async fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue = std::collections::VecDeque::from(effects);

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::OpenSocket => {
                    let followups = if self.open_socket().await {
                        self.machine.handle(Event::Opened)
                    } else {
                        self.machine.handle(Event::Closed)
                    };
                    queue.extend(followups);
                }
                Effect::CloseSocket => self.drop_socket().await,
                Effect::StartHeartbeat => {
                    // First ping goes out one full interval after open.
                    self.heartbeat = Some(interval_at(
                        Instant::now() + HEARTBEAT_INTERVAL,
                        HEARTBEAT_INTERVAL,
                    ));
                }
                Effect::StopHeartbeat => self.heartbeat = None,
                Effect::ScheduleRetry(delay_ms) => {
                    log::info!("Scheduling realtime reconnect in {delay_ms} ms");
                    self.retry = Some(Box::pin(sleep(Duration::from_millis(delay_ms))));
                }
                Effect::CancelRetry => self.retry = None,
            }
        }
    }

    /// Open the socket; true on success.
    async fn open_socket(&mut self) -> bool {
        let Some(token) = self.store.token() else {
            log::error!("Realtime connect failed: credential disappeared");
            return false;
        };
        let url = format!("{}?token={}", self.url, token);

        match ws::connect(&url).await {
            Ok((writer, reader)) => {
                log::info!("Realtime channel connected");
                self.writer = Some(writer);
                self.reader = Some(reader);
                true
            }
            Err(e) => {
                log::warn!("Realtime connect attempt failed: {e}");
                false
            }
        }
    }

    async fn drop_socket(&mut self) {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            // Best effort: the peer may already be gone.
            let _ = writer.close().await;
        }
    }

    async fn send_ping(&mut self) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let ping = serde_json::to_string(&ClientMessage::Ping).expect("serializable");
        if let Err(e) = writer.send_text(&ping).await {
            log::warn!("Heartbeat send failed: {e}");
        }
    }

    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(ServerMessage::TaskUpdate { data }) => {
                log::debug!("Task update for {}", data.task_id);
                self.tasks.apply(data);
            }
            Ok(ServerMessage::Pong) => {
                log::debug!("Heartbeat acknowledged");
            }
            Err(e) => {
                log::error!("Unparseable realtime message: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ping_wire_shape() {
        let ping = serde_json::to_string(&ClientMessage::Ping).unwrap();
        assert_eq!(ping, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_server_message_parsing() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(msg, ServerMessage::Pong));

        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"task_update","data":{"task_id":"t1","status":"running"}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::TaskUpdate { data } => {
                assert_eq!(data.task_id, "t1");
                assert_eq!(data.status(), Some("running"));
            }
            other => panic!("expected TaskUpdate, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        assert!(serde_json::from_str::<ServerMessage>(r#"{"type":"mystery"}"#).is_err());
    }

    #[tokio::test]
    async fn test_channel_starts_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CredentialStore::with_file(dir.path().join("c.json")));
        let config = Config {
            server_url: "http://127.0.0.1:1".to_string(),
            ws_url: None,
        };

        let channel = TaskChannel::new(&config, store);
        assert_eq!(channel.state().await, ConnectionState::Disconnected);
        assert!(channel.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_connect_without_credential_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CredentialStore::with_file(dir.path().join("c.json")));
        let config = Config {
            server_url: "http://127.0.0.1:1".to_string(),
            ws_url: None,
        };

        let channel = TaskChannel::new(&config, store);
        channel.connect();
        // Give the driver a moment to process the command.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CredentialStore::with_file(dir.path().join("c.json")));
        let config = Config {
            server_url: "http://127.0.0.1:1".to_string(),
            ws_url: None,
        };

        let channel = TaskChannel::new(&config, store);
        channel.disconnect();
        channel.disconnect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(channel.state().await, ConnectionState::Disconnected);
    }

    #[test]
    fn test_task_update_reconciles_into_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CredentialStore::with_file(dir.path().join("c.json")));
        let mut driver = Driver {
            machine: Machine::new(),
            url: "ws://127.0.0.1:1/ws/crawler/tasks".to_string(),
            store,
            shared: SharedConnectionState::new(),
            tasks: TaskList::new(),
            writer: None,
            reader: None,
            heartbeat: None,
            retry: None,
        };

        driver.handle_text(
            &json!({"type": "task_update", "data": {"task_id": "t9", "status": "running"}})
                .to_string(),
        );
        driver.handle_text(
            &json!({"type": "task_update", "data": {"task_id": "t9", "status": "completed"}})
                .to_string(),
        );

        let tasks = driver.tasks.snapshot();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status(), Some("completed"));
    }
}
