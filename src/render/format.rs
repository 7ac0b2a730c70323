use chrono::{ DateTime, Local, NaiveDateTime, NaiveTime };

/// Escapes text for insertion into element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders a message timestamp as local `HH:MM`.
///
/// Accepts RFC 3339 (converted to local time), offset-less ISO date-times as
/// sent by the server (taken as local already), and bare `HH:MM` which passes
/// through. Anything else is shown as received.
pub fn format_time(timestamp: Option<&str>) -> String {
    let Some(raw) = timestamp.map(str::trim).filter(|t| !t.is_empty()) else {
        return String::new();
    };
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return at.with_timezone(&Local).format("%H:%M").to_string();
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return at.format("%H:%M").to_string();
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M") {
        return at.format("%H:%M").to_string();
    }
    if let Ok(at) = NaiveTime::parse_from_str(raw, "%H:%M") {
        return at.format("%H:%M").to_string();
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<script>x</script>"),
            "&lt;script&gt;x&lt;/script&gt;"
        );
        assert_eq!(escape_html(r#"a & "b" 'c'"#), "a &amp; &quot;b&quot; &#39;c&#39;");
    }

    #[test]
    fn plain_text_is_unchanged() {
        assert_eq!(escape_html("Hello 안녕"), "Hello 안녕");
    }

    #[test]
    fn server_local_datetime_keeps_wall_clock() {
        assert_eq!(format_time(Some("2024-03-01T09:05:33.123456")), "09:05");
        assert_eq!(format_time(Some("2024-03-01T18:40")), "18:40");
    }

    #[test]
    fn rfc3339_is_converted_to_local() {
        let raw = "2024-03-01T09:05:00.000Z";
        let expected = DateTime::parse_from_rfc3339(raw)
            .unwrap()
            .with_timezone(&Local)
            .format("%H:%M")
            .to_string();
        assert_eq!(format_time(Some(raw)), expected);
    }

    #[test]
    fn short_and_missing_times() {
        assert_eq!(format_time(Some("07:30")), "07:30");
        assert_eq!(format_time(None), "");
        assert_eq!(format_time(Some("  ")), "");
        assert_eq!(format_time(Some("yesterday")), "yesterday");
    }
}
