use crate::error::ChatError;
use chrono::{ SecondsFormat, Utc };
use serde::{ Deserialize, Deserializer, Serialize };

/// Kind of a broadcast chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Chat,
    Join,
    Leave,
    /// Emitted by the server for notices such as "recipient is offline".
    System,
}

/// Wire-level chat message. Fields are only readable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "null_as_empty")]
    sender: String,
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "String::is_empty")]
    content: String,
    #[serde(rename = "type")]
    kind: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl ChatMessage {
    /// Fails for a CHAT message without a sender.
    pub fn new(
        sender: impl Into<String>,
        content: impl Into<String>,
        kind: MessageType,
        timestamp: Option<String>
    ) -> Result<Self, ChatError> {
        let message = Self {
            sender: sender.into(),
            content: content.into(),
            kind,
            timestamp,
        };
        message.validate()?;
        Ok(message)
    }

    /// A CHAT message stamped with the current time.
    pub fn chat(sender: impl Into<String>, content: impl Into<String>) -> Result<Self, ChatError> {
        Self::new(sender, content, MessageType::Chat, Some(now_iso()))
    }

    pub fn join(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: String::new(),
            kind: MessageType::Join,
            timestamp: None,
        }
    }

    pub fn leave(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            kind: MessageType::Leave,
            timestamp: None,
        }
    }

    fn validate(&self) -> Result<(), ChatError> {
        if self.kind == MessageType::Chat && self.sender.trim().is_empty() {
            return Err(ChatError::MalformedPayload("chat message without sender".to_string()));
        }
        Ok(())
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn is_notice(&self) -> bool {
        matches!(self.kind, MessageType::Join | MessageType::Leave | MessageType::System)
    }

    pub fn to_json(&self) -> Result<String, ChatError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a payload and rejects CHAT messages without an author.
    pub fn from_json(payload: &str) -> Result<Self, ChatError> {
        let message: ChatMessage = serde_json
            ::from_str(payload)
            .map_err(|e| ChatError::MalformedPayload(e.to_string()))?;
        message.validate()?;
        Ok(message)
    }
}

// Jackson writes unset fields as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error> where D: Deserializer<'de> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Current UTC time in the same shape as a browser's `toISOString()`.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub content: String,
    pub receiver_username: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultationRequest {
    pub message: String,
}

/// Sent to every online staff member when a patient asks for a consultation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationNotification {
    pub patient_username: String,
    pub message: String,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationResponse {
    pub staff_username: String,
    pub message: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_survives_a_json_round_trip() {
        let original = ChatMessage::new(
            "Alice",
            "Hello",
            MessageType::Chat,
            Some("2024-03-01T09:15:00.000Z".to_string())
        ).unwrap();
        let json = original.to_json().unwrap();
        let parsed = ChatMessage::from_json(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn join_payload_matches_add_user_shape() {
        let json: serde_json::Value = serde_json
            ::from_str(&ChatMessage::join("Alice").to_json().unwrap())
            .unwrap();
        assert_eq!(json, serde_json::json!({ "sender": "Alice", "type": "JOIN" }));
    }

    #[test]
    fn decodes_server_messages_with_extra_fields() {
        let payload =
            r#"{"content":"Alice joined","sender":"System","type":"JOIN","timestamp":"2024-03-01T09:15:00","receiverRoom":null}"#;
        let message = ChatMessage::from_json(payload).unwrap();
        assert_eq!(message.kind(), MessageType::Join);
        assert_eq!(message.content(), "Alice joined");
        assert!(message.is_notice());
    }

    #[test]
    fn rejects_chat_without_sender() {
        let err = ChatMessage::from_json(r#"{"content":"hi","type":"CHAT"}"#).unwrap_err();
        assert!(matches!(err, ChatError::MalformedPayload(_)));
    }

    #[test]
    fn constructor_refuses_chat_without_sender() {
        assert!(matches!(ChatMessage::chat("  ", "hi"), Err(ChatError::MalformedPayload(_))));
        assert!(ChatMessage::new("", "Someone left", MessageType::Leave, None).is_ok());
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(ChatMessage::from_json(r#"{"sender":"a","type":"SHOUT"}"#).is_err());
    }

    #[test]
    fn private_message_uses_camel_case() {
        let json = serde_json
            ::to_value(PrivateMessage {
                content: "hi".to_string(),
                receiver_username: "drkim".to_string(),
            })
            .unwrap();
        assert_eq!(json["receiverUsername"], "drkim");
    }
}
