use clap::{ Parser, ValueEnum };

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Real-time chat room over the STOMP broker
    Chat,
    /// Request/response chatbot over HTTP
    Chatbot,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Which widget to run (chat, chatbot)
    #[arg(long, value_enum, env = "CHAT_MODE", default_value = "chat")]
    pub mode: Mode,

    /// Display name used in the chat room. Required in chat mode.
    #[arg(short = 'u', long, env = "CHAT_USERNAME")]
    pub username: Option<String>,

    // --- Broker Args ---
    /// Raw WebSocket endpoint of the STOMP broker (e.g., ws://127.0.0.1:8080/ws/websocket)
    #[arg(long, env = "BROKER_URL", default_value = "ws://127.0.0.1:8080/ws/websocket")]
    pub broker_url: String,

    /// Virtual host sent in the STOMP CONNECT frame.
    #[arg(long, env = "BROKER_HOST", default_value = "/")]
    pub broker_host: String,

    /// Delay before reconnecting after the connection drops. 0 disables reconnection.
    #[arg(long, env = "RECONNECT_DELAY_MS", default_value = "5000")]
    pub reconnect_delay_ms: u64,

    /// STOMP heart-beat interval in both directions. 0 disables heart-beats.
    #[arg(long, env = "HEARTBEAT_MS", default_value = "4000")]
    pub heartbeat_ms: u64,

    // --- HTTP Args ---
    /// Base URL of the chat server's REST API (online staff list).
    #[arg(long, env = "HTTP_BASE", default_value = "http://127.0.0.1:8080")]
    pub http_base: String,

    /// Chatbot backend endpoint.
    #[arg(long, env = "CHATBOT_ENDPOINT", default_value = "http://127.0.0.1:8000/chat")]
    pub chatbot_endpoint: String,

    /// File used to keep the chatbot session id between runs. In-memory if unset.
    #[arg(long, env = "SESSION_FILE")]
    pub session_file: Option<String>,

    // --- General App Args ---
    /// Enable debug logging (STOMP frames included)
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_local_dev_setup() {
        let args = Args::try_parse_from(["smilechat"]).unwrap();
        assert_eq!(args.mode, Mode::Chat);
        assert_eq!(args.reconnect_delay_ms, 5000);
        assert_eq!(args.heartbeat_ms, 4000);
        assert_eq!(args.chatbot_endpoint, "http://127.0.0.1:8000/chat");
    }

    #[test]
    fn parses_chatbot_mode() {
        let args = Args::try_parse_from([
            "smilechat",
            "--mode",
            "chatbot",
            "--session-file",
            "session.json",
        ]).unwrap();
        assert_eq!(args.mode, Mode::Chatbot);
        assert_eq!(args.session_file.as_deref(), Some("session.json"));
    }
}
