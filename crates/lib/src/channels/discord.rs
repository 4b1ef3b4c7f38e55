//! Discord channel: Gateway WebSocket for MESSAGE_CREATE events, REST API for typing, replies and edits.

use crate::channels::handle::{ChannelHandle, MessageRef};
use crate::channels::inbound::InboundMessage;
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const GATEWAY_QUERY: &str = "/?v=10&encoding=json";

/// GUILDS (1) | GUILD_MESSAGES (512) | MESSAGE_CONTENT (32768)
const GATEWAY_INTENTS: u64 = 1 | 512 | 32768;

const DEFAULT_HEARTBEAT_MS: u64 = 41250;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

type GatewaySink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Why a gateway session ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Server asked for a reconnect or the socket ended; start a new session.
    Reconnect,
    /// The relay dropped its receiver; nothing left to deliver to.
    InboundClosed,
    Stopped,
}

/// Discord channel connector: receives via the Gateway and sends via REST.
pub struct DiscordChannel {
    id: String,
    token: String,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(token: String) -> Self {
        Self {
            id: "discord".to_string(),
            token,
            api_base: DISCORD_API_BASE.to_string(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    /// Use a different REST base URL (tests or proxies).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Start the Gateway loop and forward messages to the relay. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("discord channel: starting gateway loop");
        tokio::spawn(async move {
            run_gateway_loop(self, inbound_tx).await;
        })
    }

    /// GET /gateway/bot — websocket URL for this bot.
    async fn gateway_url(&self) -> Result<String, String> {
        let res = self
            .client
            .get(format!("{}/gateway/bot", self.api_base))
            .header("Authorization", self.authorization())
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let res = ensure_success(res, "gateway/bot").await?;
        let body: Value = res.json().await.map_err(|e| e.to_string())?;
        let url = body["url"]
            .as_str()
            .ok_or("missing 'url' in gateway/bot response")?;
        Ok(format!("{}{}", url.trim_end_matches('/'), GATEWAY_QUERY))
    }

    /// One gateway session: hello, identify, heartbeat, then dispatch events until the socket ends.
    async fn run_session(
        &self,
        inbound_tx: &mpsc::Sender<InboundMessage>,
    ) -> Result<SessionEnd, String> {
        let url = self.gateway_url().await?;
        log::debug!("connecting to discord gateway: {}", url);
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| e.to_string())?;
        let (write, mut read) = ws.split();

        let heartbeat_ms = match read.next().await {
            Some(Ok(WsMessage::Text(text))) => hello_interval(&text).unwrap_or_else(|| {
                log::warn!("expected discord hello, got: {}", text);
                DEFAULT_HEARTBEAT_MS
            }),
            Some(Ok(other)) => {
                log::warn!("expected discord hello, got non-text frame: {:?}", other);
                DEFAULT_HEARTBEAT_MS
            }
            Some(Err(e)) => return Err(e.to_string()),
            None => return Err("gateway closed before hello".to_string()),
        };
        log::debug!("discord heartbeat interval: {}ms", heartbeat_ms);

        let write = Arc::new(Mutex::new(write));
        let seq = Arc::new(AtomicI64::new(-1));
        send_frame(&write, identify_payload(&self.token)).await?;
        let heartbeat = spawn_heartbeat(write.clone(), seq.clone(), heartbeat_ms);

        let end = loop {
            let frame = match read.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => break Err(e.to_string()),
                None => break Ok(SessionEnd::Reconnect),
            };
            if !self.running() {
                break Ok(SessionEnd::Stopped);
            }
            let text = match frame {
                WsMessage::Text(text) => text,
                WsMessage::Close(reason) => {
                    log::warn!("discord gateway closed: {:?}", reason);
                    break Ok(SessionEnd::Reconnect);
                }
                _ => continue,
            };
            let payload: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if let Some(s) = payload["s"].as_i64() {
                seq.store(s, Ordering::SeqCst);
            }
            match payload["op"].as_u64() {
                Some(OP_DISPATCH) => match payload["t"].as_str() {
                    Some("READY") => {
                        log::info!(
                            "discord bot connected as {}",
                            author_tag(&payload["d"]["user"])
                        );
                    }
                    Some("MESSAGE_CREATE") => {
                        if let Some(msg) = parse_message_create(&self.id, &payload["d"]) {
                            if inbound_tx.send(msg).await.is_err() {
                                break Ok(SessionEnd::InboundClosed);
                            }
                        }
                    }
                    _ => {}
                },
                Some(OP_HEARTBEAT) => {
                    if let Err(e) = send_frame(&write, heartbeat_payload(&seq)).await {
                        break Err(e);
                    }
                }
                Some(OP_RECONNECT) | Some(OP_INVALID_SESSION) => break Ok(SessionEnd::Reconnect),
                Some(OP_HEARTBEAT_ACK) => {}
                op => log::debug!("discord: ignoring gateway op {:?}", op),
            }
        };
        heartbeat.abort();
        end
    }

    /// POST /channels/{id}/typing.
    pub async fn send_typing(&self, channel_id: &str) -> Result<(), String> {
        let res = self
            .client
            .post(format!("{}/channels/{}/typing", self.api_base, channel_id))
            .header("Authorization", self.authorization())
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await
            .map_err(|e| e.to_string())?;
        ensure_success(res, "typing").await?;
        Ok(())
    }

    /// POST /channels/{id}/messages as a reply to `message_id`.
    pub async fn reply(
        &self,
        channel_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<MessageRef, String> {
        let body = json!({
            "content": text,
            "message_reference": { "message_id": message_id, "fail_if_not_exists": false },
        });
        let res = self
            .client
            .post(format!("{}/channels/{}/messages", self.api_base, channel_id))
            .header("Authorization", self.authorization())
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let res = ensure_success(res, "create message").await?;
        let created: Value = res.json().await.map_err(|e| e.to_string())?;
        let id = created["id"]
            .as_str()
            .ok_or("missing 'id' in created message")?;
        Ok(MessageRef {
            conversation_id: channel_id.to_string(),
            message_id: id.to_string(),
        })
    }

    /// PATCH /channels/{id}/messages/{message_id}.
    pub async fn edit_message(&self, message: &MessageRef, text: &str) -> Result<(), String> {
        let res = self
            .client
            .patch(format!(
                "{}/channels/{}/messages/{}",
                self.api_base, message.conversation_id, message.message_id
            ))
            .header("Authorization", self.authorization())
            .json(&json!({ "content": text }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        ensure_success(res, "edit message").await?;
        Ok(())
    }
}

async fn run_gateway_loop(channel: Arc<DiscordChannel>, inbound_tx: mpsc::Sender<InboundMessage>) {
    while channel.running() {
        match channel.run_session(&inbound_tx).await {
            Ok(SessionEnd::InboundClosed) => {
                log::debug!("discord: inbound channel closed, stopping loop");
                return;
            }
            Ok(SessionEnd::Stopped) => break,
            Ok(SessionEnd::Reconnect) => log::warn!("discord gateway session ended, reconnecting"),
            Err(e) => log::warn!("discord gateway error: {}", e),
        }
        if !channel.running() {
            break;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
    log::info!("discord channel: gateway loop stopped");
}

fn spawn_heartbeat(
    write: Arc<Mutex<GatewaySink>>,
    seq: Arc<AtomicI64>,
    interval_ms: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        // first tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = send_frame(&write, heartbeat_payload(&seq)).await {
                log::warn!("discord heartbeat failed: {}", e);
                break;
            }
        }
    })
}

async fn send_frame(write: &Mutex<GatewaySink>, payload: Value) -> Result<(), String> {
    write
        .lock()
        .await
        .send(WsMessage::Text(payload.to_string()))
        .await
        .map_err(|e| e.to_string())
}

async fn ensure_success(res: reqwest::Response, what: &str) -> Result<reqwest::Response, String> {
    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        return Err(format!("{} failed: {} {}", what, status, body));
    }
    Ok(res)
}

/// Heartbeat interval from a Hello (op 10) frame.
fn hello_interval(text: &str) -> Option<u64> {
    let payload: Value = serde_json::from_str(text).ok()?;
    if payload["op"].as_u64() != Some(OP_HELLO) {
        return None;
    }
    payload["d"]["heartbeat_interval"].as_u64()
}

fn identify_payload(token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "estagiario",
                "device": "estagiario"
            }
        }
    })
}

/// Heartbeat carries the last dispatch sequence number, or null before the first one.
fn heartbeat_payload(seq: &AtomicI64) -> Value {
    let s = seq.load(Ordering::SeqCst);
    if s < 0 {
        json!({ "op": OP_HEARTBEAT, "d": null })
    } else {
        json!({ "op": OP_HEARTBEAT, "d": s })
    }
}

/// `username#1234`, or just `username` for accounts on the new username system.
fn author_tag(user: &Value) -> String {
    let name = user["username"].as_str().unwrap_or("unknown");
    match user["discriminator"].as_str() {
        Some(d) if !d.is_empty() && d != "0" => format!("{}#{}", name, d),
        _ => name.to_string(),
    }
}

/// Build an InboundMessage from a MESSAGE_CREATE dispatch payload (`d`).
fn parse_message_create(channel_id: &str, d: &Value) -> Option<InboundMessage> {
    let message_id = d["id"].as_str()?;
    let conversation_id = d["channel_id"].as_str()?;
    Some(InboundMessage {
        channel_id: channel_id.to_string(),
        conversation_id: conversation_id.to_string(),
        message_id: message_id.to_string(),
        author_tag: author_tag(&d["author"]),
        author_is_bot: d["author"]["bot"].as_bool().unwrap_or(false),
        text: d["content"].as_str().unwrap_or("").to_string(),
    })
}

#[async_trait]
impl ChannelHandle for DiscordChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_typing(&self, conversation_id: &str) -> Result<(), String> {
        DiscordChannel::send_typing(self, conversation_id).await
    }

    async fn reply(
        &self,
        conversation_id: &str,
        reply_to: &str,
        text: &str,
    ) -> Result<MessageRef, String> {
        DiscordChannel::reply(self, conversation_id, reply_to, text).await
    }

    async fn edit_message(&self, message: &MessageRef, text: &str) -> Result<(), String> {
        DiscordChannel::edit_message(self, message, text).await
    }
}
