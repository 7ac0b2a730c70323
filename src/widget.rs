use crate::connection::{
    Channel,
    ConnectionManager,
    Delivery,
    CONSULTATION_REQUEST,
    PRIVATE_SEND,
    SEND_MESSAGE,
};
use crate::error::ChatError;
use crate::models::chat::{
    ChatMessage,
    ConsultationNotification,
    ConsultationRequest,
    ConsultationResponse,
    PrivateMessage,
};
use crate::render::{ MessageList, UNREADABLE_NOTICE };
use crate::staff::fetch_online_staff;
use crate::transport::{ Transport, TransportEvent };
use log::{ error, info, warn };
use reqwest::Client as HttpClient;
use std::path::PathBuf;

/// One line of user input, as typed into the message box.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Empty,
    Message(String),
    Private {
        to: String,
        text: String,
    },
    Consult(String),
    Staff,
    Export(PathBuf),
    Help,
    Leave,
    /// A slash command we could not make sense of.
    Invalid(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
    let rest = rest.trim();
    match name {
        "pm" =>
            match rest.split_once(char::is_whitespace) {
                Some((to, text)) if !text.trim().is_empty() =>
                    Input::Private {
                        to: to.to_string(),
                        text: text.trim().to_string(),
                    },
                _ => Input::Invalid("usage: /pm <user> <message>".to_string()),
            }
        "consult" if !rest.is_empty() => Input::Consult(rest.to_string()),
        "consult" => Input::Invalid("usage: /consult <message>".to_string()),
        "staff" => Input::Staff,
        "html" if !rest.is_empty() => Input::Export(PathBuf::from(rest)),
        "html" => Input::Invalid("usage: /html <path>".to_string()),
        "help" => Input::Help,
        "leave" | "quit" => Input::Leave,
        other => Input::Invalid(format!("unknown command /{}", other)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Leave,
}

/// The chat page: a connection, its message area, and the input handlers.
pub struct ChatWidget<T: Transport> {
    manager: ConnectionManager<T>,
    list: MessageList,
    http: HttpClient,
    http_base: String,
}

impl<T: Transport> ChatWidget<T> {
    pub fn new(transport: T, http_base: impl Into<String>) -> Self {
        Self {
            manager: ConnectionManager::new(transport),
            list: MessageList::new(),
            http: HttpClient::new(),
            http_base: http_base.into(),
        }
    }

    pub fn manager(&self) -> &ConnectionManager<T> {
        &self.manager
    }

    pub fn list(&self) -> &MessageList {
        &self.list
    }

    pub async fn connect(&mut self, username: &str) -> Result<(), ChatError> {
        self.manager.connect(username).await
    }

    pub async fn on_event(&mut self, event: TransportEvent) {
        if let Some(delivery) = self.manager.handle_event(event).await {
            self.render_delivery(delivery);
        }
    }

    pub fn render_delivery(&mut self, delivery: Delivery) {
        let local = self.manager.session().username().unwrap_or_default().to_string();
        match delivery.channel {
            Channel::Public => {
                self.list.render_payload(&delivery.body, &local);
            }
            Channel::Private =>
                match ChatMessage::from_json(&delivery.body) {
                    Ok(message) => {
                        self.list.render_private(&message);
                    }
                    Err(e) => {
                        warn!("Unreadable private message: {}", e);
                        self.list.render_error(UNREADABLE_NOTICE);
                    }
                }
            Channel::ConsultationRequest =>
                match serde_json::from_str::<ConsultationNotification>(&delivery.body) {
                    Ok(request) => {
                        self.list.render_consultation_request(&request);
                    }
                    Err(e) => {
                        warn!("Unreadable consultation request: {}", e);
                        self.list.render_error(UNREADABLE_NOTICE);
                    }
                }
            Channel::ConsultationResponse =>
                match serde_json::from_str::<ConsultationResponse>(&delivery.body) {
                    Ok(response) => {
                        self.list.render_consultation_response(&response);
                    }
                    Err(e) => {
                        warn!("Unreadable consultation response: {}", e);
                        self.list.render_error(UNREADABLE_NOTICE);
                    }
                }
        }
    }

    /// Publishes a public chat message. The broker's echo renders it.
    pub async fn send_message(&mut self, text: &str) -> Result<bool, ChatError> {
        let text = text.trim();
        let Some(username) = self.ready_username() else {
            return Ok(false);
        };
        if text.is_empty() {
            return Ok(false);
        }
        self.manager.publish(SEND_MESSAGE, &ChatMessage::chat(username, text)?).await?;
        Ok(true)
    }

    pub async fn send_private(&mut self, to: &str, text: &str) -> Result<bool, ChatError> {
        if self.ready_username().is_none() {
            return Ok(false);
        }
        let message = PrivateMessage {
            content: text.to_string(),
            receiver_username: to.to_string(),
        };
        self.manager.publish(PRIVATE_SEND, &message).await?;
        Ok(true)
    }

    pub async fn request_consultation(&mut self, text: &str) -> Result<bool, ChatError> {
        if self.ready_username().is_none() {
            return Ok(false);
        }
        let request = ConsultationRequest {
            message: text.to_string(),
        };
        self.manager.publish(CONSULTATION_REQUEST, &request).await?;
        Ok(true)
    }

    /// Lists online staff as a notice. Failures are logged and render nothing.
    pub async fn show_online_staff(&mut self) {
        match fetch_online_staff(&self.http, &self.http_base).await {
            Ok(staff) if staff.is_empty() => {
                self.list.render_notice("No staff are online right now.");
            }
            Ok(staff) => {
                self.list.render_notice(format!("Online staff: {}", staff.join(", ")));
            }
            Err(e) => error!("Failed to load staff list: {}", e),
        }
    }

    pub async fn apply(&mut self, input: Input) -> Result<Flow, ChatError> {
        match input {
            Input::Empty | Input::Help => {}
            Input::Message(text) => {
                self.send_message(&text).await?;
            }
            Input::Private { to, text } => {
                self.send_private(&to, &text).await?;
            }
            Input::Consult(text) => {
                self.request_consultation(&text).await?;
            }
            Input::Staff => self.show_online_staff().await,
            Input::Export(path) => {
                tokio::fs::write(&path, self.list.to_html()).await?;
                info!("Saved {} messages to {}", self.list.len(), path.display());
            }
            Input::Invalid(reason) => warn!("{}", reason),
            Input::Leave => {
                return Ok(Flow::Leave);
            }
        }
        Ok(Flow::Continue)
    }

    /// Best-effort LEAVE and teardown, as on page unload.
    pub async fn leave(&mut self) {
        self.manager.disconnect().await;
    }

    fn ready_username(&self) -> Option<String> {
        if !self.manager.is_connected() {
            return None;
        }
        self.manager.session().username().map(str::to_string)
    }
}
