use super::{ Transport, TransportEvent };
use crate::error::ChatError;
use crate::models::stomp::{ Command, Frame };
use async_trait::async_trait;
use futures::{ Sink, SinkExt, StreamExt };
use log::{ debug, error, info, warn };
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{ self, Instant, Interval, MissedTickBehavior };
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{ self, protocol::Message };
use url::Url;
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct StompConfig {
    pub url: Url,
    /// Value of the CONNECT `host` header (the broker's virtual host).
    pub host: String,
    /// Zero disables reconnection.
    pub reconnect_delay: Duration,
    /// Used for both directions of the heart-beat negotiation. Zero disables it.
    pub heartbeat: Duration,
}

impl StompConfig {
    pub fn new(url: &str, host: &str) -> Result<Self, ChatError> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ChatError::InvalidUrl(format!("unsupported scheme '{}'", other)));
            }
        }
        Ok(Self {
            url,
            host: host.to_string(),
            reconnect_delay: Duration::from_millis(5000),
            heartbeat: Duration::from_millis(4000),
        })
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }
}

enum Outgoing {
    Subscribe(String),
    Send {
        destination: String,
        body: String,
    },
    Disconnect,
}

enum SessionEnd {
    /// Closed on request.
    Closed,
    /// Lost after CONNECTED was received.
    Dropped(Option<ChatError>),
    /// Never got as far as CONNECTED.
    Refused(ChatError),
}

/// STOMP over a raw WebSocket, with heart-beats and fixed-delay reconnects.
pub struct StompTransport {
    config: StompConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: Option<mpsc::UnboundedSender<Outgoing>>,
    task: Option<JoinHandle<()>>,
}

impl StompTransport {
    pub fn new(config: StompConfig, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            config,
            events,
            commands: None,
            task: None,
        }
    }

    fn command(&self, outgoing: Outgoing) -> Result<(), ChatError> {
        self.commands
            .as_ref()
            .ok_or(ChatError::TransportClosed)?
            .send(outgoing)
            .map_err(|_| ChatError::TransportClosed)
    }
}

#[async_trait]
impl Transport for StompTransport {
    async fn open(&mut self) -> Result<(), ChatError> {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("STOMP transport already running");
            return Ok(());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let config = self.config.clone();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(run(config, events, rx)));
        self.commands = Some(tx);
        Ok(())
    }

    async fn subscribe(&mut self, destination: &str) -> Result<(), ChatError> {
        self.command(Outgoing::Subscribe(destination.to_string()))
    }

    async fn send(&mut self, destination: &str, body: String) -> Result<(), ChatError> {
        self.command(Outgoing::Send {
            destination: destination.to_string(),
            body,
        })
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        let Some(commands) = self.commands.take() else {
            return Ok(());
        };
        let _ = commands.send(Outgoing::Disconnect);
        drop(commands);

        if let Some(mut task) = self.task.take() {
            if time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                warn!("STOMP connection did not close within {:?}; aborting", CLOSE_TIMEOUT);
                task.abort();
            }
        }
        Ok(())
    }
}

async fn run(
    config: StompConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<Outgoing>
) {
    loop {
        match session(&config, &events, &mut commands).await {
            SessionEnd::Closed => {
                info!("STOMP connection to {} closed", config.url);
                let _ = events.send(TransportEvent::Disconnected);
                return;
            }
            SessionEnd::Dropped(cause) => {
                if let Some(e) = cause {
                    error!("STOMP connection to {} failed: {}", config.url, e);
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                } else {
                    warn!("STOMP connection to {} dropped", config.url);
                }
                let _ = events.send(TransportEvent::Disconnected);
            }
            SessionEnd::Refused(e) => {
                error!("Could not connect to {}: {}", config.url, e);
                let _ = events.send(TransportEvent::Error(e.to_string()));
            }
        }

        if config.reconnect_delay.is_zero() {
            info!("Reconnection disabled; STOMP transport stopping");
            return;
        }
        info!("Reconnecting to {} in {} ms", config.url, config.reconnect_delay.as_millis());
        if !wait_for_retry(config.reconnect_delay, &mut commands).await {
            let _ = events.send(TransportEvent::Disconnected);
            return;
        }
    }
}

/// Sleeps out the reconnect delay. Returns false if a close was requested meanwhile.
async fn wait_for_retry(delay: Duration, commands: &mut mpsc::UnboundedReceiver<Outgoing>) -> bool {
    let sleep = time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                Some(Outgoing::Disconnect) | None => return false,
                Some(Outgoing::Subscribe(destination)) => {
                    debug!("Dropping subscribe to {} while reconnecting", destination);
                }
                Some(Outgoing::Send { destination, .. }) => {
                    warn!("Dropping send to {} while reconnecting", destination);
                }
            },
        }
    }
}

async fn session(
    config: &StompConfig,
    events: &mpsc::UnboundedSender<TransportEvent>,
    commands: &mut mpsc::UnboundedReceiver<Outgoing>
) -> SessionEnd {
    info!("Opening STOMP connection to {}", config.url);
    let websocket = match connect_async(config.url.as_str()).await {
        Ok((websocket, _)) => websocket,
        Err(e) => {
            return SessionEnd::Refused(e.into());
        }
    };
    let (mut tx, mut rx) = websocket.split();

    let beat = config.heartbeat.as_millis();
    let connect = Frame::new(Command::Connect)
        .header("accept-version", "1.2,1.1,1.0")
        .header("host", config.host.clone())
        .header("heart-beat", format!("{},{}", beat, beat));
    if let Err(e) = write_frame(&mut tx, &connect).await {
        return SessionEnd::Refused(e);
    }

    let connected = match time::timeout(CONNECT_TIMEOUT, await_connected(&mut rx)).await {
        Ok(Ok(frame)) => frame,
        Ok(Err(e)) => {
            return SessionEnd::Refused(e);
        }
        Err(_) => {
            return SessionEnd::Refused(ChatError::Frame("timed out waiting for CONNECTED".to_string()));
        }
    };
    let (outgoing_beat, incoming_beat) = negotiate_heartbeat(
        config.heartbeat,
        connected.get("heart-beat")
    );
    info!(
        "STOMP connected (version {}, heart-beat out {:?} in {:?})",
        connected.get("version").unwrap_or("1.0"),
        outgoing_beat,
        incoming_beat
    );
    let _ = events.send(TransportEvent::Connected);

    let mut heartbeat = outgoing_beat.map(ticker);
    let mut watchdog = incoming_beat.map(ticker);
    let mut last_seen = Instant::now();
    let mut subscriptions: HashMap<String, String> = HashMap::new();

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Outgoing::Subscribe(destination)) => {
                    let id = format!("sub-{}", Uuid::new_v4());
                    let frame = Frame::new(Command::Subscribe)
                        .header("id", id.clone())
                        .header("destination", destination.clone())
                        .header("ack", "auto");
                    subscriptions.insert(id, destination);
                    if let Err(e) = write_frame(&mut tx, &frame).await {
                        return SessionEnd::Dropped(Some(e));
                    }
                }
                Some(Outgoing::Send { destination, body }) => {
                    let frame = Frame::new(Command::Send)
                        .header("destination", destination)
                        .json_body(body);
                    if let Err(e) = write_frame(&mut tx, &frame).await {
                        return SessionEnd::Dropped(Some(e));
                    }
                }
                Some(Outgoing::Disconnect) | None => {
                    let _ = write_frame(&mut tx, &Frame::new(Command::Disconnect)).await;
                    let _ = tx.close().await;
                    return SessionEnd::Closed;
                }
            },
            msg = rx.next() => {
                last_seen = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = dispatch(&text, &subscriptions, events) {
                            return SessionEnd::Dropped(Some(e));
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        match String::from_utf8(data) {
                            Ok(text) => {
                                if let Err(e) = dispatch(&text, &subscriptions, events) {
                                    return SessionEnd::Dropped(Some(e));
                                }
                            }
                            Err(_) => warn!("Ignoring non UTF-8 binary message"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if tx.send(Message::Pong(data)).await.is_err() {
                            return SessionEnd::Dropped(None);
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("Received close frame from broker");
                        return SessionEnd::Dropped(None);
                    }
                    Some(Err(e)) => {
                        return match e {
                            | tungstenite::Error::ConnectionClosed
                            | tungstenite::Error::AlreadyClosed => SessionEnd::Dropped(None),
                            other => SessionEnd::Dropped(Some(other.into())),
                        };
                    }
                    None => return SessionEnd::Dropped(None),
                }
            },
            _ = tick(&mut heartbeat) => {
                if tx.send(Message::Text("\n".to_string())).await.is_err() {
                    return SessionEnd::Dropped(None);
                }
            },
            _ = tick(&mut watchdog) => {
                if let Some(limit) = incoming_beat.map(|d| d * 2) {
                    if last_seen.elapsed() > limit {
                        return SessionEnd::Dropped(
                            Some(ChatError::Frame("no heart-beat from broker".to_string()))
                        );
                    }
                }
            },
        }
    }
}

async fn await_connected<S>(rx: &mut S) -> Result<Frame, ChatError>
    where S: futures::Stream<Item = Result<Message, tungstenite::Error>> + Unpin
{
    while let Some(msg) = rx.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Binary(data) =>
                String::from_utf8(data).map_err(|_| {
                    ChatError::Frame("non UTF-8 frame during handshake".to_string())
                })?,
            Message::Close(_) => {
                break;
            }
            _ => {
                continue;
            }
        };
        for frame in Frame::parse_all(&text)? {
            debug!("STOMP Debug: <<< {}", frame.command);
            match frame.command {
                Command::Connected => {
                    return Ok(frame);
                }
                Command::Error => {
                    return Err(broker_error(&frame));
                }
                other => debug!("Ignoring {} before CONNECTED", other),
            }
        }
    }
    Err(ChatError::Frame("connection closed before CONNECTED".to_string()))
}

fn dispatch(
    text: &str,
    subscriptions: &HashMap<String, String>,
    events: &mpsc::UnboundedSender<TransportEvent>
) -> Result<(), ChatError> {
    let frames = match Frame::parse_all(text) {
        Ok(frames) => frames,
        Err(e) => {
            warn!("Ignoring unreadable STOMP data: {}", e);
            return Ok(());
        }
    };
    for frame in frames {
        debug!("STOMP Debug: <<< {}", frame.command);
        match frame.command {
            Command::Message => {
                let destination = frame
                    .get("subscription")
                    .and_then(|id| subscriptions.get(id))
                    .map(String::as_str)
                    .or_else(|| frame.get("destination"));
                match destination {
                    Some(destination) => {
                        let _ = events.send(TransportEvent::Message {
                            destination: destination.to_string(),
                            body: frame.body.clone(),
                        });
                    }
                    None => warn!("MESSAGE frame without subscription or destination"),
                }
            }
            Command::Error => {
                return Err(broker_error(&frame));
            }
            Command::Receipt => debug!("Receipt {}", frame.get("receipt-id").unwrap_or("?")),
            other => warn!("Unexpected {} frame from broker", other),
        }
    }
    Ok(())
}

fn broker_error(frame: &Frame) -> ChatError {
    let message = frame.get("message").unwrap_or("unknown error");
    if frame.body.is_empty() {
        ChatError::Broker(message.to_string())
    } else {
        ChatError::Broker(format!("{} ({})", message, frame.body.trim()))
    }
}

async fn write_frame<S>(tx: &mut S, frame: &Frame) -> Result<(), ChatError>
    where S: Sink<Message, Error = tungstenite::Error> + Unpin
{
    debug!("STOMP Debug: >>> {}", frame.command);
    tx.send(Message::Text(frame.encode())).await?;
    Ok(())
}

/// Returns (outgoing, incoming) intervals from our setting and the server's header.
fn negotiate_heartbeat(
    ours: Duration,
    theirs: Option<&str>
) -> (Option<Duration>, Option<Duration>) {
    let ours = ours.as_millis() as u64;
    let (sx, sy) = theirs
        .and_then(|value| value.split_once(','))
        .and_then(|(x, y)| Some((x.trim().parse::<u64>().ok()?, y.trim().parse::<u64>().ok()?)))
        .unwrap_or((0, 0));
    let pick = |a: u64, b: u64| {
        if a == 0 || b == 0 { None } else { Some(Duration::from_millis(a.max(b))) }
    };
    (pick(ours, sy), pick(ours, sx))
}

fn ticker(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_uses_the_larger_interval() {
        let (out, incoming) = negotiate_heartbeat(Duration::from_millis(4000), Some("10000,2000"));
        assert_eq!(out, Some(Duration::from_millis(4000)));
        assert_eq!(incoming, Some(Duration::from_millis(10000)));
    }

    #[test]
    fn heartbeat_disabled_when_either_side_is_zero() {
        assert_eq!(negotiate_heartbeat(Duration::from_millis(4000), Some("0,0")), (None, None));
        assert_eq!(negotiate_heartbeat(Duration::ZERO, Some("5000,5000")), (None, None));
        assert_eq!(negotiate_heartbeat(Duration::from_millis(4000), None), (None, None));
    }

    #[test]
    fn config_rejects_http_urls() {
        assert!(StompConfig::new("http://localhost:8080/ws", "/").is_err());
        assert!(StompConfig::new("ws://localhost:8080/ws/websocket", "/").is_ok());
    }

    #[test]
    fn message_frames_map_back_to_subscribed_destination() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subscriptions = HashMap::new();
        subscriptions.insert("sub-1".to_string(), "/user/queue/private".to_string());
        let raw =
            "MESSAGE\ndestination:/user/alice/queue/private\nsubscription:sub-1\n\n{}\0";
        dispatch(raw, &subscriptions, &tx).unwrap();
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Message {
            destination: "/user/queue/private".to_string(),
            body: "{}".to_string(),
        });
    }

    #[test]
    fn error_frame_ends_the_session() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = dispatch("ERROR\nmessage:denied\n\n\0", &HashMap::new(), &tx).unwrap_err();
        assert!(matches!(err, ChatError::Broker(ref m) if m == "denied"));
    }
}
