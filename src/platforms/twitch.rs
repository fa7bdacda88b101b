// src/platforms/twitch.rs - Twitch IRC over websocket

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::bot::queue::EventSender;
use crate::config::TwitchConfig;
use crate::platforms::{ChatClient, ConnectError};
use crate::types::{EventKind, Sender};

type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WebSocketWriter = Arc<RwLock<SplitSink<WebSocket, Message>>>;
type WebSocketReader = SplitStream<WebSocket>;

const LOGIN_TIMEOUT: Duration = Duration::from_secs(15);

/// What one IRC line means to the client
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(EventKind),
    Ping(String),
    /// 001: login accepted
    Welcome,
    LoginFailed(String),
    Ignored,
}

/// One parsed IRC line: `@tags :prefix COMMAND params :trailing`
#[derive(Debug, PartialEq)]
struct IrcLine<'a> {
    tags: Vec<(&'a str, &'a str)>,
    prefix: Option<&'a str>,
    command: &'a str,
    params: Vec<&'a str>,
}

impl<'a> IrcLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let mut tags = Vec::new();
        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, after) = stripped.split_once(' ')?;
            tags = raw_tags
                .split(';')
                .map(|tag| tag.split_once('=').unwrap_or((tag, "")))
                .collect();
            rest = after.trim_start();
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (raw_prefix, after) = stripped.split_once(' ')?;
            prefix = Some(raw_prefix);
            rest = after.trim_start();
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, after)) => (command, after),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing);
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param);
                    rest = after.trim_start();
                }
                None => {
                    params.push(rest);
                    break;
                }
            }
        }

        Some(Self {
            tags,
            prefix,
            command,
            params,
        })
    }

    fn tag(&self, name: &str) -> Option<&'a str> {
        self.tags
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .filter(|value| !value.is_empty())
    }

    fn nick(&self) -> Option<&'a str> {
        self.prefix.map(|prefix| prefix.split('!').next().unwrap_or(prefix))
    }

    fn sender(&self) -> Option<Sender> {
        let name = self.tag("login").or_else(|| self.nick())?;
        let flag = |key: &str| self.tag(key).map(|value| value == "1");

        let mut sender = Sender::named(name);
        sender.id = self.tag("user-id").and_then(|id| id.parse().ok());
        sender.moderator = flag("mod");
        sender.subscriber = flag("subscriber");
        sender.turbo = flag("turbo");
        sender.emote_sets = self
            .tag("emote-sets")
            .map(|sets| sets.split(',').filter_map(|set| set.parse().ok()).collect());
        Some(sender)
    }
}

/// Classify one raw IRC line
pub fn classify(line: &str) -> Inbound {
    let irc = match IrcLine::parse(line) {
        Some(irc) => irc,
        None => return Inbound::Ignored,
    };

    match irc.command {
        "001" => Inbound::Welcome,
        "PING" => Inbound::Ping(irc.params.last().unwrap_or(&"tmi.twitch.tv").to_string()),
        "PONG" => Inbound::Event(EventKind::Pong),
        "NOTICE" => {
            let text = irc.params.last().copied().unwrap_or_default();
            if text.contains("Login authentication failed") || text.contains("Improperly formatted auth") {
                Inbound::LoginFailed(text.to_string())
            } else {
                debug!(target: "twitch", "NOTICE: {}", text);
                Inbound::Ignored
            }
        }
        "PRIVMSG" => {
            let (sender, text) = match (irc.sender(), irc.params.get(1)) {
                (Some(sender), Some(text)) => (sender, *text),
                _ => return Inbound::Ignored,
            };
            match text
                .strip_prefix("\u{1}ACTION ")
                .map(|action| action.trim_end_matches('\u{1}'))
            {
                Some(action) => Inbound::Event(EventKind::Action {
                    sender,
                    text: action.to_string(),
                }),
                None => Inbound::Event(EventKind::Message {
                    sender,
                    text: text.to_string(),
                }),
            }
        }
        "CLEARCHAT" => Inbound::Event(EventKind::ChatClear {
            user: irc.params.get(1).map(|user| user.to_lowercase()),
        }),
        "USERNOTICE" => match irc.tag("msg-id") {
            Some("sub") | Some("resub") => match irc.tag("login") {
                Some(user) => Inbound::Event(EventKind::Subscribed { user: user.to_lowercase() }),
                None => Inbound::Ignored,
            },
            Some("subgift") => match irc.tag("msg-param-recipient-user-name") {
                Some(user) => Inbound::Event(EventKind::Subscribed { user: user.to_lowercase() }),
                None => Inbound::Ignored,
            },
            _ => Inbound::Ignored,
        },
        "MODE" => match (irc.params.get(1), irc.params.get(2)) {
            (Some(&"+o"), Some(user)) => Inbound::Event(EventKind::ModeratorChanged {
                user: user.to_lowercase(),
                is_mod: true,
            }),
            (Some(&"-o"), Some(user)) => Inbound::Event(EventKind::ModeratorChanged {
                user: user.to_lowercase(),
                is_mod: false,
            }),
            _ => Inbound::Ignored,
        },
        _ => Inbound::Ignored,
    }
}

/// Twitch IRC connection implementation
pub struct TwitchClient {
    server_url: String,
    events: EventSender,
    channel: String,
    writer: Option<WebSocketWriter>,
    reader_task: Option<JoinHandle<()>>,
}

impl TwitchClient {
    pub fn new(config: &TwitchConfig, events: EventSender) -> Self {
        Self {
            server_url: config.server_url.clone(),
            events,
            channel: config.channel.clone(),
            writer: None,
            reader_task: None,
        }
    }

    async fn send_raw(&self, line: &str) -> Result<()> {
        let writer = self.writer.as_ref().context("Not connected to Twitch")?;
        send_line(writer, line).await
    }

    async fn wait_for_login(reader: &mut WebSocketReader, writer: &WebSocketWriter) -> Result<(), ConnectError> {
        while let Some(frame) = reader.next().await {
            let text = match frame.context("WebSocket error during login")? {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    return Err(anyhow::anyhow!("Connection closed during login: {:?}", frame).into());
                }
                _ => continue,
            };

            for line in text.lines() {
                match classify(line) {
                    Inbound::Welcome => return Ok(()),
                    Inbound::LoginFailed(reason) => return Err(ConnectError::LoginFailed(reason)),
                    Inbound::Ping(payload) => send_line(writer, &format!("PONG :{}", payload)).await?,
                    _ => {}
                }
            }
        }
        Err(anyhow::anyhow!("Connection closed during login").into())
    }

    fn spawn_reader(&mut self, mut reader: WebSocketReader, writer: WebSocketWriter) {
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            info!(target: "twitch", "Twitch message reader started");
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        for line in text.lines() {
                            match classify(line) {
                                Inbound::Event(kind) => {
                                    if !events.send(kind) {
                                        return;
                                    }
                                }
                                Inbound::Ping(payload) => {
                                    debug!(target: "twitch", "Responding to PING");
                                    if let Err(e) = send_line(&writer, &format!("PONG :{}", payload)).await {
                                        error!(target: "twitch", "Failed to send PONG: {}", e);
                                    }
                                }
                                Inbound::LoginFailed(reason) => warn!(target: "twitch", "{}", reason),
                                Inbound::Welcome | Inbound::Ignored => {}
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if let Err(e) = writer.write().await.send(Message::Pong(payload)).await {
                            error!(target: "twitch", "Failed to send pong: {}", e);
                        }
                    }
                    Ok(Message::Close(close_frame)) => {
                        info!(target: "twitch", "WebSocket connection closed: {:?}", close_frame);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(target: "twitch", "WebSocket error: {}", e);
                        break;
                    }
                }
            }
            warn!(target: "twitch", "Twitch connection handler exited");
        });
        self.reader_task = Some(task);
    }
}

async fn send_line(writer: &WebSocketWriter, line: &str) -> Result<()> {
    writer
        .write()
        .await
        .send(Message::Text(format!("{}\r\n", line)))
        .await
        .context("Failed to write to Twitch")
}

#[async_trait]
impl ChatClient for TwitchClient {
    async fn connect(&mut self, channel: &str, username: &str, token: &str) -> Result<(), ConnectError> {
        self.disconnect().await;
        info!(target: "twitch", "Connecting to Twitch IRC...");

        let url = Url::parse(&self.server_url).context("Failed to parse Twitch WebSocket URL")?;
        let (ws_stream, _) = connect_async(url)
            .await
            .context("Failed to connect to Twitch WebSocket")?;
        let (write, mut read) = ws_stream.split();
        let writer: WebSocketWriter = Arc::new(RwLock::new(write));

        send_line(&writer, &format!("PASS {}", token)).await?;
        send_line(&writer, &format!("NICK {}", username.to_lowercase())).await?;
        send_line(&writer, "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership").await?;

        match timeout(LOGIN_TIMEOUT, Self::wait_for_login(&mut read, &writer)).await {
            Ok(result) => result?,
            Err(_) => return Err(anyhow::anyhow!("Timed out waiting for Twitch login").into()),
        }

        self.channel = channel.trim_start_matches('#').to_lowercase();
        self.writer = Some(writer.clone());
        self.spawn_reader(read, writer);
        info!(target: "twitch", "Logged in to Twitch as {}", username);
        Ok(())
    }

    async fn join(&mut self, channel: &str) -> Result<()> {
        self.channel = channel.trim_start_matches('#').to_lowercase();
        self.send_raw(&format!("JOIN #{}", self.channel)).await?;
        info!(target: "twitch", "Joined channel: #{}", self.channel);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.write().await.close().await {
                debug!(target: "twitch", "Error closing websocket: {}", e);
            }
            info!(target: "twitch", "Disconnected from Twitch");
        }
    }

    async fn send_message(&mut self, text: &str) -> Result<()> {
        self.send_raw(&format!("PRIVMSG #{} :{}", self.channel, text)).await?;
        debug!(target: "twitch", "Sent message to #{}: {}", self.channel, text);
        Ok(())
    }

    async fn timeout(&mut self, user: &str, seconds: u64) -> Result<()> {
        self.send_raw(&format!("PRIVMSG #{} :/timeout {} {}", self.channel, user, seconds)).await
    }

    async fn ban(&mut self, user: &str) -> Result<()> {
        self.send_raw(&format!("PRIVMSG #{} :/ban {}", self.channel, user)).await
    }

    async fn heartbeat(&mut self) -> Result<()> {
        self.send_raw("PING :tmi.twitch.tv").await
    }

    fn platform_name(&self) -> &str {
        "twitch"
    }
}
