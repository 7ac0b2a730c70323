//! Message render pipeline.
//!
//! Incoming payloads become [`Node`]s appended to a [`MessageList`], the
//! in-memory stand-in for the widget's message area. Every path that writes
//! markup goes through [`escape_html`].

pub mod color;
pub mod format;

pub use color::{ color_for, Color, PALETTE };
pub use format::{ escape_html, format_time };

use crate::models::chat::{
    ChatMessage,
    ConsultationNotification,
    ConsultationResponse,
    MessageType,
};
use chrono::{ DateTime, Local };
use log::warn;

pub type NodeId = u64;

pub const UNREADABLE_NOTICE: &str = "Received an unreadable message.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Own,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// JOIN / LEAVE / SYSTEM events.
    Notice {
        text: String,
        time: String,
    },
    Bubble {
        ownership: Ownership,
        sender: String,
        color: Color,
        time: String,
        content: String,
    },
    Private {
        sender: String,
        time: String,
        content: String,
    },
    ConsultationRequest {
        patient: String,
        message: String,
        time: String,
    },
    ConsultationResponse {
        staff: String,
        message: String,
        status: String,
    },
    Bot {
        text: String,
    },
    User {
        text: String,
    },
    Loading,
    /// Shown in place of a payload that could not be decoded.
    Error {
        text: String,
    },
}

impl Node {
    pub fn classes(&self) -> &'static [&'static str] {
        match self {
            Node::Notice { .. } => &["message", "system-message"],
            Node::Bubble { ownership: Ownership::Own, .. } => &["message", "own-message"],
            Node::Bubble { ownership: Ownership::Other, .. } => &["message", "other-message"],
            Node::Private { .. } => &["message", "private-message"],
            Node::ConsultationRequest { .. } => &["message", "consultation-request"],
            Node::ConsultationResponse { .. } => &["message", "consultation-response"],
            Node::Bot { .. } => &["chat-message", "chat-message-bot"],
            Node::User { .. } => &["chat-message", "chat-message-user"],
            Node::Loading => &["chat-message", "chat-message-bot", "loading-spinner"],
            Node::Error { .. } => &["message", "system-message", "error-message"],
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }

    /// Visible text content, as a DOM `textContent` would read it.
    pub fn text(&self) -> String {
        match self {
            Node::Notice { text, .. } | Node::Error { text } => text.clone(),
            Node::Bubble { content, .. } | Node::Private { content, .. } => content.clone(),
            Node::ConsultationRequest { message, .. } => message.clone(),
            Node::ConsultationResponse { message, .. } => message.clone(),
            Node::Bot { text } | Node::User { text } => text.clone(),
            Node::Loading => String::new(),
        }
    }

    pub fn to_html(&self) -> String {
        let class = self.classes().join(" ");
        let inner = match self {
            Node::Notice { text, time } =>
                format!(
                    "<div class=\"message-content\">{}</div><div class=\"message-time\">{}</div>",
                    escape_html(text),
                    escape_html(time)
                ),
            Node::Bubble { sender, color, time, content, .. } =>
                format!(
                    "<div class=\"message-header\"><span class=\"sender\" style=\"color: {}\">{}</span><span class=\"timestamp\">{}</span></div><div class=\"message-content\">{}</div>",
                    color,
                    escape_html(sender),
                    escape_html(time),
                    escape_html(content)
                ),
            Node::Private { sender, time, content } =>
                format!(
                    "<div class=\"private-indicator\">Private message</div><div class=\"message-header\"><span class=\"sender\">{}</span><span class=\"timestamp\">{}</span></div><div class=\"message-content\">{}</div>",
                    escape_html(sender),
                    escape_html(time),
                    escape_html(content)
                ),
            Node::ConsultationRequest { patient, message, time } =>
                format!(
                    "<div class=\"message-header\"><span class=\"sender\">{}</span><span class=\"timestamp\">{}</span></div><div class=\"message-content\">{}</div>",
                    escape_html(patient),
                    escape_html(time),
                    escape_html(message)
                ),
            Node::ConsultationResponse { staff, message, status } =>
                format!(
                    "<div class=\"message-header\"><span class=\"sender\">{}</span><span class=\"status\">{}</span></div><div class=\"message-content\">{}</div>",
                    escape_html(staff),
                    escape_html(status),
                    escape_html(message)
                ),
            Node::Bot { text } | Node::User { text } | Node::Error { text } => escape_html(text),
            Node::Loading =>
                "<div class=\"spinner\"><div class=\"bounce1\"></div><div class=\"bounce2\"></div><div class=\"bounce3\"></div></div>".to_string(),
        };
        format!("<div class=\"{}\">{}</div>", class, inner)
    }

    /// One-line form for the terminal front-end.
    pub fn to_text(&self) -> String {
        match self {
            Node::Notice { text, time } if time.is_empty() => format!("-- {} --", text),
            Node::Notice { text, time } => format!("-- {} ({}) --", text, time),
            Node::Bubble { ownership, sender, time, content, .. } => {
                let me = if *ownership == Ownership::Own { " (me)" } else { "" };
                format!("[{}] {}{}: {}", time, sender, me, content)
            }
            Node::Private { sender, time, content } => {
                format!("[{}] (private) {}: {}", time, sender, content)
            }
            Node::ConsultationRequest { patient, message, time } => {
                format!("[{}] consultation request from {}: {}", time, patient, message)
            }
            Node::ConsultationResponse { staff, message, status } => {
                format!("[{}] {}: {}", status, staff, message)
            }
            Node::Bot { text } => format!("bot> {}", text),
            Node::User { text } => format!("you> {}", text),
            Node::Loading => "bot> ...".to_string(),
            Node::Error { text } => format!("!! {}", text),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub id: NodeId,
    pub node: Node,
}

/// Append-only list of rendered nodes, scrolled to the newest one.
#[derive(Debug, Default)]
pub struct MessageList {
    entries: Vec<Entry>,
    next_id: NodeId,
    scrolled_to: Option<NodeId>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, node: Node) -> NodeId {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(Entry { id, node });
        self.scrolled_to = Some(id);
        id
    }

    pub fn remove(&mut self, id: NodeId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        if self.entries.len() == before {
            return false;
        }
        self.scrolled_to = self.entries.last().map(|entry| entry.id);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.entries.iter().map(|entry| &entry.node)
    }

    pub fn last(&self) -> Option<&Node> {
        self.entries.last().map(|entry| &entry.node)
    }

    /// Entries appended after `id`, oldest first.
    pub fn since(&self, id: NodeId) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(move |entry| entry.id > id)
    }

    pub fn scrolled_to(&self) -> Option<NodeId> {
        self.scrolled_to
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<div id=\"messageArea\">\n");
        for entry in &self.entries {
            html.push_str(&entry.node.to_html());
            html.push('\n');
        }
        html.push_str("</div>\n");
        html
    }

    /// Renders one broadcast message for the user `local_identity`.
    pub fn render(&mut self, message: &ChatMessage, local_identity: &str) -> NodeId {
        let time = format_time(message.timestamp());
        let node = match message.kind() {
            MessageType::Join | MessageType::Leave | MessageType::System =>
                Node::Notice {
                    text: message.content().to_string(),
                    time,
                },
            MessageType::Chat =>
                Node::Bubble {
                    ownership: if message.sender() == local_identity {
                        Ownership::Own
                    } else {
                        Ownership::Other
                    },
                    sender: message.sender().to_string(),
                    color: color_for(message.sender()),
                    time,
                    content: message.content().to_string(),
                },
        };
        self.append(node)
    }

    /// Decodes and renders a raw payload, failing closed on bad input.
    pub fn render_payload(&mut self, payload: &str, local_identity: &str) -> NodeId {
        match ChatMessage::from_json(payload) {
            Ok(message) => self.render(&message, local_identity),
            Err(e) => {
                warn!("Dropping unreadable chat payload: {}", e);
                self.render_error(UNREADABLE_NOTICE)
            }
        }
    }

    pub fn render_private(&mut self, message: &ChatMessage) -> NodeId {
        let time = format_time(message.timestamp());
        let node = match message.kind() {
            MessageType::Chat =>
                Node::Private {
                    sender: message.sender().to_string(),
                    time,
                    content: message.content().to_string(),
                },
            MessageType::Join | MessageType::Leave | MessageType::System =>
                Node::Notice {
                    text: message.content().to_string(),
                    time,
                },
        };
        self.append(node)
    }

    pub fn render_consultation_request(&mut self, request: &ConsultationNotification) -> NodeId {
        let time = DateTime::from_timestamp_millis(request.timestamp)
            .map(|at| at.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_default();
        self.append(Node::ConsultationRequest {
            patient: request.patient_username.clone(),
            message: request.message.clone(),
            time,
        })
    }

    pub fn render_consultation_response(&mut self, response: &ConsultationResponse) -> NodeId {
        self.append(Node::ConsultationResponse {
            staff: response.staff_username.clone(),
            message: response.message.clone(),
            status: response.status.clone(),
        })
    }

    pub fn render_notice(&mut self, text: impl Into<String>) -> NodeId {
        self.append(Node::Notice {
            text: text.into(),
            time: String::new(),
        })
    }

    pub fn render_error(&mut self, text: impl Into<String>) -> NodeId {
        self.append(Node::Error { text: text.into() })
    }

    pub fn render_bot(&mut self, text: impl Into<String>) -> NodeId {
        self.append(Node::Bot { text: text.into() })
    }

    pub fn render_user(&mut self, text: impl Into<String>) -> NodeId {
        self.append(Node::User { text: text.into() })
    }

    pub fn show_loading(&mut self) -> NodeId {
        self.append(Node::Loading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(sender: &str, content: &str) -> ChatMessage {
        ChatMessage::new(sender, content, MessageType::Chat, Some("2024-03-01T09:05:00".to_string())).unwrap()
    }

    #[test]
    fn join_and_leave_render_as_notices_with_verbatim_content() {
        let mut list = MessageList::new();
        for kind in [MessageType::Join, MessageType::Leave] {
            let message = ChatMessage::new("Alice", "Alice joined", kind, None).unwrap();
            list.render(&message, "Alice");
            let node = list.last().unwrap();
            assert!(node.has_class("system-message"));
            assert_eq!(node.text(), "Alice joined");
        }
    }

    #[test]
    fn notice_ignores_empty_content_and_sender() {
        let mut list = MessageList::new();
        list.render(&ChatMessage::join(""), "Bob");
        let node = list.last().unwrap();
        assert!(node.has_class("system-message"));
        assert_eq!(node.text(), "");
    }

    #[test]
    fn chat_is_own_only_for_local_identity() {
        let mut list = MessageList::new();
        list.render(&chat("Alice", "Hello"), "Alice");
        list.render(&chat("Alice", "Hello"), "Bob");
        let nodes: Vec<_> = list.nodes().collect();
        assert!(nodes[0].has_class("own-message"));
        assert!(!nodes[0].has_class("other-message"));
        assert!(nodes[1].has_class("other-message"));
        assert!(!nodes[1].has_class("own-message"));
    }

    #[test]
    fn bubble_header_has_sender_and_time() {
        let mut list = MessageList::new();
        list.render(&chat("Alice", "Hello"), "Alice");
        match list.last().unwrap() {
            Node::Bubble { sender, time, color, .. } => {
                assert_eq!(sender, "Alice");
                assert_eq!(time, "09:05");
                assert_eq!(*color, color_for("Alice"));
            }
            other => panic!("expected bubble, got {:?}", other),
        }
    }

    #[test]
    fn script_content_is_escaped_in_html() {
        let mut list = MessageList::new();
        list.render(&chat("<b>Eve</b>", "<script>x</script>"), "Alice");
        let html = list.last().unwrap().to_html();
        assert!(html.contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(html.contains("&lt;b&gt;Eve&lt;/b&gt;"));
        assert!(!html.contains("<script>"));
        assert_eq!(list.last().unwrap().text(), "<script>x</script>");
    }

    #[test]
    fn notices_are_escaped_too() {
        let mut list = MessageList::new();
        list.render(&ChatMessage::leave("x", "<img src=x onerror=alert(1)>"), "y");
        assert!(!list.to_html().contains("<img"));
    }

    #[test]
    fn each_render_appends_one_node_and_scrolls_to_it() {
        let mut list = MessageList::new();
        let first = list.render(&chat("Alice", "one"), "Alice");
        assert_eq!(list.scrolled_to(), Some(first));
        let second = list.render(&chat("Bob", "two"), "Alice");
        assert_eq!(list.len(), 2);
        assert_eq!(list.scrolled_to(), Some(second));
    }

    #[test]
    fn malformed_payload_renders_one_error_notice() {
        let mut list = MessageList::new();
        list.render_payload("{not json", "Alice");
        list.render_payload(r#"{"type":"CHAT","content":"no sender"}"#, "Alice");
        assert_eq!(list.len(), 2);
        for node in list.nodes() {
            assert_eq!(node.text(), UNREADABLE_NOTICE);
            assert!(!node.has_class("own-message"));
        }
    }

    #[test]
    fn render_payload_decodes_valid_messages() {
        let mut list = MessageList::new();
        list.render_payload(
            r#"{"sender":"Bob","content":"hi","type":"CHAT","timestamp":"09:10"}"#,
            "Alice"
        );
        assert!(list.last().unwrap().has_class("other-message"));
    }

    #[test]
    fn null_fields_on_notices_still_render_a_notice() {
        let mut list = MessageList::new();
        list.render_payload(r#"{"sender":"Bob","content":null,"type":"LEAVE"}"#, "Alice");
        let node = list.last().unwrap();
        assert!(node.has_class("system-message"));
        assert!(!node.has_class("error-message"));
        assert_eq!(node.text(), "");

        list.render_payload(r#"{"sender":null,"content":"someone joined","type":"JOIN"}"#, "Alice");
        assert!(list.last().unwrap().has_class("system-message"));
        assert_eq!(list.last().unwrap().text(), "someone joined");
    }

    #[test]
    fn null_sender_on_chat_is_unreadable() {
        let mut list = MessageList::new();
        list.render_payload(r#"{"sender":null,"content":"hi","type":"CHAT"}"#, "Alice");
        assert!(list.last().unwrap().has_class("error-message"));
        assert_eq!(list.last().unwrap().text(), UNREADABLE_NOTICE);
    }

    #[test]
    fn private_system_notice_stays_a_notice() {
        let mut list = MessageList::new();
        let offline = ChatMessage::new("System", "Recipient is offline.", MessageType::System, None).unwrap();
        list.render_private(&offline);
        assert!(list.last().unwrap().has_class("system-message"));
        list.render_private(&chat("drkim", "See you at 3"));
        assert!(list.last().unwrap().has_class("private-message"));
    }

    #[test]
    fn loading_node_can_be_removed() {
        let mut list = MessageList::new();
        let user = list.render_user("hi");
        let spinner = list.show_loading();
        assert!(list.remove(spinner));
        assert!(!list.remove(spinner));
        assert_eq!(list.len(), 1);
        assert_eq!(list.scrolled_to(), Some(user));
    }

    #[test]
    fn since_returns_only_newer_entries() {
        let mut list = MessageList::new();
        let first = list.render_bot("a");
        list.render_bot("b");
        let texts: Vec<_> = list
            .since(first)
            .map(|e| e.node.text())
            .collect();
        assert_eq!(texts, vec!["b".to_string()]);
    }
}
