//! Input and display sanitizers
//!
//! Everything that crosses the wire to the sidecar or gets shown to the
//! host passes through here: queries are tamed before they become
//! protocol fields, display text is reduced to printable ASCII, URLs are
//! held to a strict character allow-list, and header values lose any
//! shell-sensitive characters before reaching a transcoder command line.

const MAX_QUERY_LEN: usize = 200;
const MAX_DISPLAY_LEN: usize = 200;
const MAX_HEADER_LEN: usize = 400;

/// Reduce a raw search query to a safe protocol field.
///
/// Printable ASCII only, whitespace collapsed, trimmed, length-capped.
/// A query that sanitizes to nothing becomes the literal `music` so a
/// stray control character can't produce an empty protocol field.
pub fn sanitize_query(raw: &str) -> String {
    let clean = printable_collapsed(raw, MAX_QUERY_LEN);
    if clean.is_empty() {
        "music".to_string()
    } else {
        clean
    }
}

/// Reduce sidecar-supplied display text (titles, channels, durations)
/// to printable ASCII with whitespace collapsed.
pub fn sanitize_display_text(raw: &str) -> String {
    printable_collapsed(raw, MAX_DISPLAY_LEN)
}

/// Characters permitted in a stream URL.
pub fn is_allowed_stream_url_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ":/?&=%._-+#~,".contains(c)
}

/// Validate a URL for use on the wire or a command line.
///
/// Requires an http(s) scheme and the URL character allow-list;
/// anything else is rejected outright rather than repaired.
pub fn sanitize_http_url(raw: &str) -> Option<String> {
    let url = raw.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return None;
    }
    if url.len() > 2048 || !url.chars().all(is_allowed_stream_url_char) {
        return None;
    }
    Some(url.to_string())
}

/// Extract the host portion of an http(s) URL.
pub fn url_host(url: &str) -> Option<&str> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#']).next()?;
    // Strip userinfo and port
    let host = host.rsplit('@').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Sanitize an HTTP header value destined for a transcoder command line.
///
/// Printable ASCII only, with quotes, backslashes, and backticks removed.
pub fn sanitize_header_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| {
            c.is_ascii_graphic() && !matches!(c, '"' | '\'' | '\\' | '`') || *c == ' '
        })
        .take(MAX_HEADER_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}

fn printable_collapsed(raw: &str, cap: usize) -> String {
    let mut out = String::with_capacity(raw.len().min(cap));
    let mut pending_space = false;
    for c in raw.chars() {
        if out.len() >= cap {
            break;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else if c.is_ascii_graphic() {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
        // Non-ASCII and control characters are dropped
    }
    out
}
