//! Display helpers for captured bodies and requests

use super::{header_value, HeaderFields, RequestSnapshot};

/// Default character ceiling for rendered bodies
pub const DEFAULT_BODY_PREVIEW_CHARS: usize = 10_000;

/// Render a body for display
///
/// JSON bodies (by content-type hint) are pretty-printed, other UTF-8 bodies
/// are shown as text, anything else as a `<binary, N bytes>` placeholder.
/// Returns `None` when there is no body or it is empty.
#[must_use]
pub fn format_body(body: Option<&[u8]>, headers: &HeaderFields, max_chars: usize) -> Option<String> {
    let bytes = body.filter(|b| !b.is_empty())?;

    let text = if hints_json(headers) {
        pretty_json(bytes).or_else(|| utf8(bytes))
    } else {
        utf8(bytes)
    };

    match text {
        Some(text) => Some(truncate_chars(&text, max_chars)),
        None => Some(format!("<binary, {} bytes>", bytes.len())),
    }
}

/// Cut `text` after `max_chars` characters, noting how many were dropped
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}\n... truncated {} more characters", total - max_chars)
}

fn hints_json(headers: &HeaderFields) -> bool {
    header_value(headers, "content-type").is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
}

fn pretty_json(bytes: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

fn utf8(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().map(str::to_string)
}

/// Quote for a POSIX shell
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub(super) fn curl_command(request: &RequestSnapshot) -> String {
    let mut parts = vec!["curl".to_string()];

    if !request.method.eq_ignore_ascii_case("GET") {
        parts.push(format!("-X {}", shell_quote(&request.method)));
    }
    parts.push(shell_quote(&request.url));

    for (name, value) in &request.headers {
        parts.push(format!("-H {}", shell_quote(&format!("{name}: {value}"))));
    }

    if let Some(body) = request.body.as_deref().filter(|b| !b.is_empty()) {
        match std::str::from_utf8(body) {
            Ok(text) => parts.push(format!("--data-binary {}", shell_quote(text))),
            Err(_) => parts.push(format!("--data-binary @- # <binary, {} bytes>", body.len())),
        }
    }

    parts.join(" ")
}
