// Discord gateway client.
//
// Keeps one websocket session open: identify, heartbeat, and forward the
// dispatches the bot cares about (READY and INTERACTION_CREATE) to the
// command loop. Any protocol hiccup ends the session; `run` reconnects with
// exponential backoff until shutdown.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// GUILDS intent; interactions are delivered regardless of intents.
pub const INTENT_GUILDS: u64 = 1;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Payloads and events
// ---------------------------------------------------------------------------

/// Raw gateway frame.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

/// An interaction as delivered by INTERACTION_CREATE.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub data: Option<CommandData>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl CommandData {
    /// String value of the option called `name`.
    pub fn string_option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .and_then(|o| o.value.as_ref())
            .and_then(Value::as_str)
    }
}

/// What the gateway forwards to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Ready { application_id: String, user: String },
    Interaction(Interaction),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("malformed gateway payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("gateway protocol error: {0}")]
    Protocol(String),
}

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Shutdown was requested.
    Shutdown,
    /// The gateway asked for (or forced) a new connection.
    Reconnect,
    /// The event receiver is gone; nothing left to serve.
    ReceiverClosed,
}

/// Parse a dispatch into an event. Unhandled event names yield `Ok(None)`.
pub fn parse_dispatch(name: &str, data: Value) -> Result<Option<GatewayEvent>, GatewayError> {
    match name {
        "READY" => {
            let application_id = data["application"]["id"]
                .as_str()
                .ok_or_else(|| GatewayError::Protocol("READY without application id".into()))?
                .to_string();
            let user = data["user"]["username"].as_str().unwrap_or_default().to_string();
            Ok(Some(GatewayEvent::Ready { application_id, user }))
        }
        "INTERACTION_CREATE" => Ok(Some(GatewayEvent::Interaction(serde_json::from_value(data)?))),
        _ => Ok(None),
    }
}

pub fn identify_payload(token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": INTENT_GUILDS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "rankboard",
                "device": "rankboard",
            },
        },
    })
}

pub fn heartbeat_payload(sequence: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": sequence })
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

async fn send_json<S>(sink: &mut S, payload: &Value) -> Result<(), GatewayError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::text(payload.to_string())).await?;
    Ok(())
}

/// Read frames until a text frame arrives. `None` when the stream closed.
async fn next_payload<S>(stream: &mut S) -> Result<Option<GatewayPayload>, GatewayError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
            Message::Close(frame) => {
                info!("Gateway closed the connection: {frame:?}");
                return Ok(None);
            }
            // Ping/pong is handled by tungstenite; binary is unused with JSON
            // encoding.
            _ => {}
        }
    }
    Ok(None)
}

/// Run one gateway session over an established websocket.
///
/// Generic over the transport so tests can drive it in memory.
pub async fn run_session<W>(
    ws: W,
    token: &str,
    events: &mpsc::Sender<GatewayEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, GatewayError>
where
    W: Stream<Item = Result<Message, tungstenite::Error>> + Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let (mut write, mut read) = ws.split();

    // --- Hello ---
    let hello = match next_payload(&mut read).await? {
        Some(payload) if payload.op == OP_HELLO => payload,
        Some(payload) => {
            return Err(GatewayError::Protocol(format!("expected Hello, got op {}", payload.op)));
        }
        None => return Ok(SessionEnd::Reconnect),
    };
    let period = hello.d["heartbeat_interval"]
        .as_u64()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| GatewayError::Protocol("Hello without heartbeat_interval".into()))?;
    debug!("Gateway hello, heartbeat every {period:?}");

    // --- Identify ---
    send_json(&mut write, &identify_payload(token)).await?;

    let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence: Option<u64> = None;
    let mut acked = true;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }

            _ = heartbeat.tick() => {
                if !acked {
                    warn!("Gateway heartbeat not acknowledged, reconnecting");
                    return Ok(SessionEnd::Reconnect);
                }
                send_json(&mut write, &heartbeat_payload(sequence)).await?;
                acked = false;
            }

            payload = next_payload(&mut read) => {
                let Some(payload) = payload? else {
                    return Ok(SessionEnd::Reconnect);
                };
                if let Some(s) = payload.s {
                    sequence = Some(s);
                }
                match payload.op {
                    OP_DISPATCH => {
                        let name = payload.t.unwrap_or_default();
                        match parse_dispatch(&name, payload.d) {
                            Ok(Some(event)) => {
                                if let GatewayEvent::Ready { user, .. } = &event {
                                    info!("Gateway ready as {user}");
                                }
                                if events.send(event).await.is_err() {
                                    return Ok(SessionEnd::ReceiverClosed);
                                }
                            }
                            Ok(None) => debug!("Ignoring dispatch {name}"),
                            Err(e) => warn!("Failed to parse {name} dispatch: {e}"),
                        }
                    }
                    OP_HEARTBEAT => {
                        send_json(&mut write, &heartbeat_payload(sequence)).await?;
                    }
                    OP_HEARTBEAT_ACK => acked = true,
                    OP_RECONNECT => {
                        info!("Gateway requested reconnect");
                        return Ok(SessionEnd::Reconnect);
                    }
                    OP_INVALID_SESSION => {
                        warn!("Gateway invalidated the session");
                        return Ok(SessionEnd::Reconnect);
                    }
                    other => debug!("Ignoring gateway op {other}"),
                }
            }
        }
    }
}

/// Connect and keep a session alive until shutdown. Events go to `events`.
pub async fn run(
    url: String,
    token: String,
    events: mpsc::Sender<GatewayEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        info!("Connecting to Discord gateway");
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((ws, _response)) => match run_session(ws, &token, &events, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Gateway session closed for shutdown");
                    return Ok(());
                }
                Ok(SessionEnd::ReceiverClosed) => {
                    info!("Event receiver dropped, stopping gateway");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect) => {
                    backoff = INITIAL_BACKOFF;
                }
                Err(e) => warn!("Gateway session failed: {e}"),
            },
            Err(e) => warn!("Failed to connect to gateway: {e}"),
        }

        debug!("Reconnecting to gateway in {backoff:?}");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    info!("Shutdown signal dropped, stopping gateway");
                    return Ok(());
                }
            }
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::WebSocketStream;

    type Server = WebSocketStream<tokio::io::DuplexStream>;

    #[tokio::test]
    async fn run_stops_when_shutdown_sender_is_dropped() {
        // Reserve a port and release it so the connect is refused.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let (events_tx, _events_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run(url, "secret".into(), events_tx, shutdown_rx),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    async fn pair() -> (WebSocketStream<tokio::io::DuplexStream>, Server) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        (client, server)
    }

    async fn send(server: &mut Server, payload: Value) {
        server.send(Message::text(payload.to_string())).await.unwrap();
    }

    async fn recv(server: &mut Server) -> Value {
        loop {
            match server.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                _ => continue,
            }
        }
    }

    fn interaction_json() -> Value {
        json!({
            "id": "int-1",
            "application_id": "app-1",
            "type": 2,
            "token": "tok",
            "guild_id": "g",
            "data": {
                "id": "cmd",
                "name": "add",
                "type": 1,
                "options": [
                    { "name": "username", "type": 3, "value": "Alpha" },
                    { "name": "tag", "type": 3, "value": "EUW" }
                ]
            }
        })
    }

    #[test]
    fn parses_ready_dispatch() {
        let event = parse_dispatch(
            "READY",
            json!({ "v": 10, "user": { "username": "rankboard" }, "application": { "id": "99" } }),
        )
        .unwrap();
        assert_eq!(
            event,
            Some(GatewayEvent::Ready {
                application_id: "99".into(),
                user: "rankboard".into()
            })
        );
    }

    #[test]
    fn parses_interaction_options() {
        let Some(GatewayEvent::Interaction(interaction)) =
            parse_dispatch("INTERACTION_CREATE", interaction_json()).unwrap()
        else {
            panic!("expected interaction");
        };
        assert_eq!(interaction.kind, 2);
        let data = interaction.data.unwrap();
        assert_eq!(data.name, "add");
        assert_eq!(data.string_option("username"), Some("Alpha"));
        assert_eq!(data.string_option("tag"), Some("EUW"));
        assert_eq!(data.string_option("missing"), None);
    }

    #[test]
    fn ignores_other_dispatches() {
        assert_eq!(parse_dispatch("GUILD_CREATE", json!({})).unwrap(), None);
    }

    #[test]
    fn identify_carries_token_and_intents() {
        let payload = identify_payload("secret");
        assert_eq!(payload["op"], 2);
        assert_eq!(payload["d"]["token"], "secret");
        assert_eq!(payload["d"]["intents"], 1);
    }

    #[tokio::test]
    async fn session_identifies_and_forwards_events() {
        let (client, mut server) = pair().await;
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let session = tokio::spawn(async move {
            run_session(client, "secret", &events_tx, &mut shutdown_rx).await
        });

        send(&mut server, json!({ "op": 10, "d": { "heartbeat_interval": 45000 } })).await;
        let identify = recv(&mut server).await;
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "secret");

        send(
            &mut server,
            json!({ "op": 0, "s": 1, "t": "READY", "d": { "user": { "username": "bot" }, "application": { "id": "app-1" } } }),
        )
        .await;
        assert!(matches!(
            events_rx.recv().await,
            Some(GatewayEvent::Ready { ref application_id, .. }) if application_id == "app-1"
        ));

        send(&mut server, json!({ "op": 0, "s": 2, "t": "INTERACTION_CREATE", "d": interaction_json() })).await;
        match events_rx.recv().await {
            Some(GatewayEvent::Interaction(interaction)) => assert_eq!(interaction.token, "tok"),
            other => panic!("expected interaction, got {other:?}"),
        }

        send(&mut server, json!({ "op": 7, "d": null })).await;
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Reconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_carry_last_sequence_and_detect_zombies() {
        let (client, mut server) = pair().await;
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let session = tokio::spawn(async move {
            run_session(client, "secret", &events_tx, &mut shutdown_rx).await
        });

        send(&mut server, json!({ "op": 10, "d": { "heartbeat_interval": 1000 } })).await;
        let _identify = recv(&mut server).await;
        send(&mut server, json!({ "op": 0, "s": 5, "t": "GUILD_CREATE", "d": {} })).await;

        // Paused time auto-advances to the first heartbeat.
        let beat = recv(&mut server).await;
        assert_eq!(beat, json!({ "op": 1, "d": 5 }));
        send(&mut server, json!({ "op": 11 })).await;

        let beat = recv(&mut server).await;
        assert_eq!(beat["op"], 1);
        // No ack this time: the next tick gives up on the connection.
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Reconnect);
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_closes_session() {
        let (client, mut server) = pair().await;
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let session = tokio::spawn(async move {
            run_session(client, "secret", &events_tx, &mut shutdown_rx).await
        });

        send(&mut server, json!({ "op": 10, "d": { "heartbeat_interval": 45000 } })).await;
        let _identify = recv(&mut server).await;
        shutdown_tx.send(true).unwrap();
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Shutdown);
    }

    #[tokio::test]
    async fn unexpected_first_frame_is_protocol_error() {
        let (client, mut server) = pair().await;
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let session = tokio::spawn(async move {
            run_session(client, "secret", &events_tx, &mut shutdown_rx).await
        });
        send(&mut server, json!({ "op": 11 })).await;
        assert!(matches!(
            session.await.unwrap(),
            Err(GatewayError::Protocol(_))
        ));
    }
}
