//! Gateway (WebSocket) session against the Discord real-time API.
//!
//! Speaks just enough of the protocol for a display bot: identify with the
//! `GUILDS` intent, keep the heartbeat alive, track which guilds the bot is
//! a member of and publish presence updates. Reconnection and session resume
//! are left to the process supervisor; a dropped connection is logged and
//! the session keeps serving its last known state.

use crate::{Error, GuildId, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WriteSocket = SplitSink<WsStream, Message>;
type ReadSocket = SplitStream<WsStream>;

const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

const GUILDS_INTENT: u64 = 1;
const ACTIVITY_WATCHING: u8 = 3;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_PRESENCE_UPDATE: u8 = 3;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

#[derive(Deserialize)]
struct GatewayEvent {
    op: u8,
    #[serde(default)]
    d: Value,
    s: Option<u64>,
    t: Option<String>,
}

#[derive(Deserialize)]
struct Hello {
    heartbeat_interval: u64,
}

#[derive(Deserialize)]
struct Ready {
    guilds: Vec<GuildRef>,
}

#[derive(Deserialize)]
struct GuildRef {
    id: GuildId,
}

struct Session {
    guilds: RwLock<HashSet<GuildId>>,
    sequence: AtomicU64,
}

/// Live gateway connection.
pub struct Gateway {
    sender: mpsc::UnboundedSender<Message>,
    session: Arc<Session>,
    ready: watch::Receiver<bool>,
}

impl Gateway {
    /// Establishes the socket and drives the session from background tasks.
    ///
    /// Returns as soon as the connection is up; use
    /// [`Gateway::wait_until_ready`] to block until the READY dispatch has
    /// been received.
    pub async fn connect(token: &str) -> Result<Self> {
        let (stream, _) = connect_async(GATEWAY_URL).await?;
        let (write, read) = stream.split();

        let (sender, outbox) = mpsc::unbounded_channel();
        let (ready_tx, ready) = watch::channel(false);
        let session = Arc::new(Session {
            guilds: RwLock::new(HashSet::new()),
            sequence: AtomicU64::new(0),
        });

        tokio::spawn(write_messages(write, outbox));
        tokio::spawn(read_events(
            read,
            sender.clone(),
            ready_tx,
            Arc::clone(&session),
            token.to_string(),
        ));

        Ok(Self {
            sender,
            session,
            ready,
        })
    }

    /// Blocks until the gateway has identified and received READY.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.ready.clone();
        if ready.wait_for(|ready| *ready).await.is_err() {
            log::error!("Gateway closed before becoming ready");
        }
    }

    /// Guilds the bot is currently a member of.
    pub async fn guild_ids(&self) -> Vec<GuildId> {
        self.session.guilds.read().await.iter().cloned().collect()
    }

    /// Publishes a `Watching <name>` presence, visible across all guilds.
    pub fn update_presence(&self, name: &str) -> Result<()> {
        let payload = json!({
            "op": OP_PRESENCE_UPDATE,
            "d": {
                "since": null,
                "activities": [{ "name": name, "type": ACTIVITY_WATCHING }],
                "status": "online",
                "afk": false,
            }
        });

        send_to(&self.sender, payload)
    }
}

async fn write_messages(mut write: WriteSocket, mut outbox: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = outbox.recv().await {
        if let Err(e) = write.send(message).await {
            log::error!("Failed to send gateway message: {e}");
            return;
        }
    }
}

async fn read_events(
    mut read: ReadSocket,
    sender: mpsc::UnboundedSender<Message>,
    ready: watch::Sender<bool>,
    session: Arc<Session>,
    token: String,
) {
    while let Some(message) = read.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                log::error!("Gateway stream error: {e}");
                break;
            }
        };

        if let Message::Text(text) = message {
            if let Err(e) = handle_event(text.as_str(), &sender, &ready, &session, &token).await {
                log::warn!("Failed to handle gateway event: {e}");
            }
        }
    }

    log::warn!("Gateway connection closed");
}

async fn handle_event(
    text: &str,
    sender: &mpsc::UnboundedSender<Message>,
    ready: &watch::Sender<bool>,
    session: &Arc<Session>,
    token: &str,
) -> Result<()> {
    let event: GatewayEvent =
        serde_json::from_str(text).map_err(|_| Error::Deserialize(text.to_string()))?;

    if let Some(sequence) = event.s {
        session.sequence.store(sequence, Ordering::Relaxed);
    }

    match event.op {
        OP_HELLO => {
            let hello: Hello = deserialize_payload(event.d)?;
            spawn_heartbeat(
                sender.clone(),
                Arc::clone(session),
                Duration::from_millis(hello.heartbeat_interval),
            );
            identify(sender, token)
        }
        OP_DISPATCH => handle_dispatch(event, ready, session).await,
        OP_HEARTBEAT => send_heartbeat(sender, session),
        OP_HEARTBEAT_ACK => Ok(()),
        op => {
            log::warn!("Ignoring unsupported gateway opcode {op}");
            Ok(())
        }
    }
}

async fn handle_dispatch(
    event: GatewayEvent,
    ready: &watch::Sender<bool>,
    session: &Session,
) -> Result<()> {
    match event.t.as_deref() {
        Some("READY") => {
            let payload: Ready = deserialize_payload(event.d)?;
            let mut guilds = session.guilds.write().await;
            guilds.extend(payload.guilds.into_iter().map(|guild| guild.id));
            drop(guilds);

            ready.send(true).ok();
        }
        Some("GUILD_CREATE") => {
            let guild: GuildRef = deserialize_payload(event.d)?;
            session.guilds.write().await.insert(guild.id);
        }
        Some("GUILD_DELETE") => {
            let guild: GuildRef = deserialize_payload(event.d)?;
            session.guilds.write().await.remove(&guild.id);
        }
        _ => (),
    }

    Ok(())
}

fn identify(sender: &mpsc::UnboundedSender<Message>, token: &str) -> Result<()> {
    let payload = json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": GUILDS_INTENT,
            "properties": {
                "os": std::env::consts::OS,
                "browser": env!("CARGO_PKG_NAME"),
                "device": env!("CARGO_PKG_NAME"),
            }
        }
    });

    send_to(sender, payload)
}

fn spawn_heartbeat(
    sender: mpsc::UnboundedSender<Message>,
    session: Arc<Session>,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        // The first tick of an interval completes immediately
        timer.tick().await;

        loop {
            timer.tick().await;
            if send_heartbeat(&sender, &session).is_err() {
                return;
            }
        }
    });
}

fn send_heartbeat(sender: &mpsc::UnboundedSender<Message>, session: &Session) -> Result<()> {
    // The gateway expects a null sequence until the first dispatch arrives
    let sequence = match session.sequence.load(Ordering::Relaxed) {
        0 => Value::Null,
        sequence => sequence.into(),
    };

    send_to(sender, json!({ "op": OP_HEARTBEAT, "d": sequence }))
}

fn send_to(sender: &mpsc::UnboundedSender<Message>, payload: Value) -> Result<()> {
    sender
        .send(Message::Text(payload.to_string().into()))
        .map_err(|_| Error::ConnectionClosed)
}

fn deserialize_payload<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::Deserialize(e.to_string()))
}
