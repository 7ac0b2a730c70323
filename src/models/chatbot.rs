use serde::{ Deserialize, Serialize };

#[derive(Clone, Debug, Serialize)]
pub struct ChatbotRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatbotResponse {
    pub session_id: String,
    pub response: String,
    #[serde(default)]
    pub is_complete: bool,
}
