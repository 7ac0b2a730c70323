pub mod store;

use crate::error::ChatError;
use crate::models::chatbot::{ ChatbotRequest, ChatbotResponse };
use crate::render::MessageList;
use async_trait::async_trait;
use log::{ debug, error, info, warn };
use reqwest::Client as HttpClient;
use store::{ SessionStore, SESSION_ID_KEY };

pub const GREETING: &str = "Hello! This is the Smile Dental chatbot. How can I help you?";
pub const APOLOGY: &str = "Sorry, something went wrong while talking to the server.";
pub const INPUT_PLACEHOLDER: &str = "Type your message...";
pub const COMPLETE_PLACEHOLDER: &str = "Your consultation request has been received.";

#[async_trait]
pub trait ChatbotBackend: Send + Sync {
    async fn ask(&self, request: &ChatbotRequest) -> Result<ChatbotResponse, ChatError>;
}

#[derive(Debug, Clone)]
pub struct HttpChatbot {
    http: HttpClient,
    endpoint: String,
}

impl HttpChatbot {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ChatbotBackend for HttpChatbot {
    async fn ask(&self, request: &ChatbotRequest) -> Result<ChatbotResponse, ChatError> {
        let resp = self.http.post(&self.endpoint).json(request).send().await?.error_for_status()?;
        let data = resp.json::<ChatbotResponse>().await?;
        Ok(data)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputState {
    pub enabled: bool,
    pub placeholder: String,
}

/// Request/response chat against the clinic's chatbot backend.
pub struct ChatbotWidget<B: ChatbotBackend, S: SessionStore> {
    backend: B,
    store: S,
    list: MessageList,
    input: InputState,
}

impl<B: ChatbotBackend, S: SessionStore> ChatbotWidget<B, S> {
    pub fn new(backend: B, store: S) -> Self {
        let mut list = MessageList::new();
        list.render_bot(GREETING);
        Self {
            backend,
            store,
            list,
            input: InputState {
                enabled: true,
                placeholder: INPUT_PLACEHOLDER.to_string(),
            },
        }
    }

    pub fn list(&self) -> &MessageList {
        &self.list
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sends one user message. Returns false when nothing was sent.
    pub async fn submit(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        if !self.input.enabled {
            debug!("Chatbot input disabled; ignoring submission");
            return false;
        }

        self.list.render_user(text);
        let spinner = self.list.show_loading();

        let request = ChatbotRequest {
            session_id: self.store.get(SESSION_ID_KEY),
            message: text.to_string(),
        };
        let result = self.backend.ask(&request).await;
        self.list.remove(spinner);

        match result {
            Ok(reply) => {
                if let Err(e) = self.store.set(SESSION_ID_KEY, &reply.session_id) {
                    warn!("Could not persist chatbot session id: {}", e);
                }
                self.list.render_bot(reply.response);
                if reply.is_complete {
                    info!("Chatbot conversation {} complete", reply.session_id);
                    self.input = InputState {
                        enabled: false,
                        placeholder: COMPLETE_PLACEHOLDER.to_string(),
                    };
                }
            }
            Err(e) => {
                error!("Chatbot request failed: {}", e);
                self.list.render_bot(APOLOGY);
            }
        }
        true
    }
}
