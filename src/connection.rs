use crate::error::ChatError;
use crate::models::chat::ChatMessage;
use crate::transport::{ Transport, TransportEvent };
use log::{ debug, error, info, warn };
use serde::Serialize;
use std::fmt;

pub const ADD_USER: &str = "/app/chat.addUser";
pub const SEND_MESSAGE: &str = "/app/chat.sendMessage";
pub const PRIVATE_SEND: &str = "/app/private.sendMessage";
pub const CONSULTATION_REQUEST: &str = "/app/consultation.request";

/// Destinations the client subscribes to after every (re)connect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Public,
    Private,
    ConsultationRequest,
    ConsultationResponse,
}

impl Channel {
    /// Subscription order: public broadcast first, then per-user queues.
    pub const ALL: [Channel; 4] = [
        Channel::Public,
        Channel::Private,
        Channel::ConsultationRequest,
        Channel::ConsultationResponse,
    ];

    pub fn destination(&self) -> &'static str {
        match self {
            Channel::Public => "/topic/public",
            Channel::Private => "/user/queue/private",
            Channel::ConsultationRequest => "/user/queue/consultation-request",
            Channel::ConsultationResponse => "/user/queue/consultation-response",
        }
    }

    pub fn from_destination(destination: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|channel| channel.destination() == destination)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    Connecting,
    Connected,
    Error,
    Disconnected,
}

impl StatusClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Connecting => "connecting",
            StatusClass::Connected => "connected",
            StatusClass::Error => "error",
            StatusClass::Disconnected => "disconnected",
        }
    }
}

/// The visible connection status banner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub class: StatusClass,
}

impl Status {
    fn new(text: &str, class: StatusClass) -> Self {
        Self {
            text: text.to_string(),
            class,
        }
    }
}

/// Per-tab session state, owned by whoever drives the UI.
#[derive(Debug)]
pub struct Session {
    username: Option<String>,
    state: ConnectionState,
}

impl Session {
    fn new() -> Self {
        Self {
            username: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

/// A payload that arrived on one of our subscriptions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub channel: Channel,
    pub body: String,
}

pub struct ConnectionManager<T: Transport> {
    transport: T,
    session: Session,
    status: Status,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            session: Session::new(),
            status: Status::new("Disconnected", StatusClass::Disconnected),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        self.session.state == ConnectionState::Connected
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Opens the transport for `identity`. Transport failures surface through
    /// the status banner; only a missing identity is returned as an error.
    pub async fn connect(&mut self, identity: &str) -> Result<(), ChatError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(ChatError::MissingIdentity);
        }
        if self.session.state != ConnectionState::Disconnected {
            warn!("connect({}) ignored while {}", identity, self.session.state);
            return Ok(());
        }

        self.session.username = Some(identity.to_string());
        self.transition(ConnectionState::Connecting);
        self.status = Status::new("Connecting...", StatusClass::Connecting);

        if let Err(e) = self.transport.open().await {
            self.on_error(&e.to_string());
        }
        Ok(())
    }

    /// Feeds one transport callback through the state machine. Returns the
    /// payload to render when the event is a message on a known channel.
    pub async fn handle_event(&mut self, event: TransportEvent) -> Option<Delivery> {
        match event {
            TransportEvent::Connected => {
                if self.session.username.is_none() {
                    debug!("Ignoring connect callback for a closed session");
                    return None;
                }
                self.on_connected().await;
                None
            }
            TransportEvent::Message { destination, body } => {
                if self.session.state != ConnectionState::Connected {
                    debug!("Dropping message on {} while {}", destination, self.session.state);
                    return None;
                }
                match Channel::from_destination(&destination) {
                    Some(channel) => Some(Delivery { channel, body }),
                    None => {
                        warn!("Message on unexpected destination {}", destination);
                        None
                    }
                }
            }
            TransportEvent::Error(message) => {
                self.on_error(&message);
                None
            }
            TransportEvent::Disconnected => {
                match self.session.state {
                    ConnectionState::Connected => {
                        // The transport reconnects on its own and will call back.
                        self.transition(ConnectionState::Connecting);
                        self.status = Status::new("Reconnecting...", StatusClass::Connecting);
                    }
                    ConnectionState::Disconnecting => {
                        self.transition(ConnectionState::Disconnected);
                    }
                    ConnectionState::Connecting | ConnectionState::Disconnected => {}
                }
                None
            }
        }
    }

    async fn on_connected(&mut self) {
        self.transition(ConnectionState::Connected);
        self.status = Status::new("Connected", StatusClass::Connected);

        for channel in Channel::ALL {
            if let Err(e) = self.transport.subscribe(channel.destination()).await {
                error!("Failed to subscribe to {}: {}", channel.destination(), e);
            }
        }

        let Some(username) = self.session.username.clone() else {
            return;
        };
        if let Err(e) = self.publish(ADD_USER, &ChatMessage::join(username)).await {
            error!("Failed to announce join: {}", e);
        }
    }

    fn on_error(&mut self, message: &str) {
        error!("Transport error: {}", message);
        match self.session.state {
            ConnectionState::Connecting => {
                self.transition(ConnectionState::Disconnected);
                self.status = Status::new(
                    "Could not connect. Please try again later.",
                    StatusClass::Error
                );
            }
            _ => {
                self.status = Status::new("Connection error", StatusClass::Error);
            }
        }
    }

    /// Serializes and sends `payload`. A no-op unless connected.
    pub async fn publish<P: Serialize + ?Sized>(
        &mut self,
        destination: &str,
        payload: &P
    ) -> Result<(), ChatError> {
        if self.session.state != ConnectionState::Connected {
            debug!("Not connected; dropping publish to {}", destination);
            return Ok(());
        }
        let body = serde_json::to_string(payload)?;
        self.transport.send(destination, body).await
    }

    /// Announces LEAVE when connected, tears the transport down, and always
    /// clears the session.
    pub async fn disconnect(&mut self) {
        if self.session.state == ConnectionState::Connected {
            if let Some(username) = self.session.username.clone() {
                let leave = ChatMessage::leave(username.clone(), format!("{} left the chat.", username));
                if let Err(e) = self.publish(SEND_MESSAGE, &leave).await {
                    warn!("LEAVE notice for {} was not sent: {}", username, e);
                }
            }
            self.transition(ConnectionState::Disconnecting);
        }

        if let Err(e) = self.transport.close().await {
            warn!("Error while closing transport: {}", e);
        }

        self.session.username = None;
        self.transition(ConnectionState::Disconnected);
        self.status = Status::new("Disconnected", StatusClass::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.session.state != next {
            info!("Connection state: {} -> {}", self.session.state, next);
            self.session.state = next;
        }
    }
}
