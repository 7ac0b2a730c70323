use crate::error::ChatError;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    // CONNECT and CONNECTED headers are sent verbatim.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "SEND" => Ok(Command::Send),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            "DISCONNECT" => Ok(Command::Disconnect),
            other => Err(ChatError::Frame(format!("unknown command '{}'", other))),
        }
    }
}

/// One STOMP frame: command line, headers, blank line, body, NUL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Sets a JSON body along with its content type and byte length.
    pub fn json_body(mut self, body: String) -> Self {
        self.headers.push(("content-type".to_string(), "application/json".to_string()));
        self.headers.push(("content-length".to_string(), body.len().to_string()));
        self.body = body;
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parses every frame in one websocket message. Heart-beat EOLs yield no frames.
    pub fn parse_all(raw: &str) -> Result<Vec<Frame>, ChatError> {
        let mut frames = Vec::new();
        let mut cursor = raw;
        loop {
            cursor = cursor.trim_start_matches(|c: char| c == '\n' || c == '\r');
            if cursor.is_empty() {
                break;
            }
            let (frame, rest) = parse_one(cursor)?;
            frames.push(frame);
            cursor = rest;
        }
        Ok(frames)
    }
}

fn parse_one(raw: &str) -> Result<(Frame, &str), ChatError> {
    let (command_line, mut cursor) = next_line(raw).ok_or_else(||
        ChatError::Frame("missing command line".to_string())
    )?;
    let command: Command = command_line.parse()?;
    let escape = command.escapes_headers();

    let mut headers: Vec<(String, String)> = Vec::new();
    loop {
        let (line, rest) = next_line(cursor).ok_or_else(||
            ChatError::Frame("unterminated header block".to_string())
        )?;
        cursor = rest;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| ChatError::Frame(format!("bad header line '{}'", line)))?;
        let (name, value) = if escape {
            (unescape_header(name)?, unescape_header(value)?)
        } else {
            (name.to_string(), value.to_string())
        };
        // Repeated headers: the first one wins.
        if !headers.iter().any(|(k, _)| *k == name) {
            headers.push((name, value));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.trim().parse::<usize>().ok());

    let (body, rest) = match content_length {
        Some(len) => {
            let body = cursor
                .get(..len)
                .ok_or_else(|| ChatError::Frame("body shorter than content-length".to_string()))?;
            let rest = cursor[len..]
                .strip_prefix('\0')
                .ok_or_else(|| ChatError::Frame("missing NUL after body".to_string()))?;
            (body, rest)
        }
        None =>
            match cursor.find('\0') {
                Some(end) => (&cursor[..end], &cursor[end + 1..]),
                None => (cursor, ""),
            }
    };

    Ok((
        Frame {
            command,
            headers,
            body: body.to_string(),
        },
        rest,
    ))
}

fn next_line(s: &str) -> Option<(&str, &str)> {
    let idx = s.find('\n')?;
    let line = &s[..idx];
    Some((line.strip_suffix('\r').unwrap_or(line), &s[idx + 1..]))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, ChatError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ChatError::Frame(format!("invalid header escape '\\{}'", other.unwrap_or(' '))));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_send_frame_with_length() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/chat.sendMessage")
            .json_body(r#"{"a":1}"#.to_string());
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/chat.sendMessage\ncontent-type:application/json\ncontent-length:7\n\n{\"a\":1}\0"
        );
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let frame = Frame::new(Command::Connect).header("host", "localhost:8080");
        assert!(frame.encode().contains("host:localhost:8080\n"));
    }

    #[test]
    fn escapes_colons_in_regular_headers() {
        let frame = Frame::new(Command::Subscribe).header("id", "a:b");
        assert!(frame.encode().contains("id:a\\cb\n"));
    }

    #[test]
    fn parses_message_frame() {
        let raw =
            "MESSAGE\ndestination:/topic/public\nsubscription:sub-0\nmessage-id:1\ncontent-length:2\n\nhi\0";
        let frames = Frame::parse_all(raw).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, Command::Message);
        assert_eq!(frames[0].get("subscription"), Some("sub-0"));
        assert_eq!(frames[0].body, "hi");
    }

    #[test]
    fn heartbeat_yields_no_frames() {
        assert!(Frame::parse_all("\n").unwrap().is_empty());
        assert!(Frame::parse_all("\r\n\n").unwrap().is_empty());
    }

    #[test]
    fn parses_back_to_back_frames_without_length() {
        let raw = "RECEIPT\nreceipt-id:1\n\n\0\nERROR\nmessage:bad\n\noops\0";
        let frames = Frame::parse_all(raw).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].command, Command::Error);
        assert_eq!(frames[1].get("message"), Some("bad"));
        assert_eq!(frames[1].body, "oops");
    }

    #[test]
    fn first_repeated_header_wins() {
        let frames = Frame::parse_all("MESSAGE\nfoo:1\nfoo:2\n\n\0").unwrap();
        assert_eq!(frames[0].get("foo"), Some("1"));
    }

    #[test]
    fn unescapes_header_values() {
        let frames = Frame::parse_all("ERROR\nmessage:a\\cb\\nc\n\n\0").unwrap();
        assert_eq!(frames[0].get("message"), Some("a:b\nc"));
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(Frame::parse_all("HELLO\n\n\0").is_err());
    }

    #[test]
    fn rejects_short_body() {
        assert!(Frame::parse_all("MESSAGE\ncontent-length:10\n\nhi\0").is_err());
    }
}
