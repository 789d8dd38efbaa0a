//! Sidecar wire protocol
//!
//! Newline-delimited, tab-separated lines over the helper's stdin and
//! stdout. Requests:
//!
//! ```text
//! SEARCH\t<provider>\t<max_results>\t<query>
//! RESOLVE\t<provider>\t<page_url>
//! PING
//! QUIT
//! ```
//!
//! Replies: `READY` (startup handshake), `PONG`, `SEARCH_BEGIN`,
//! `SEARCH_ITEM\t<id>\t<title>\t<channel>\t<duration>\t<url>`,
//! `SEARCH_END\t<count>`, `RESOLVE_OK\t<media_url>\t<user_agent>\t<referer>`,
//! `ERROR\t<message>`, `BYE`.
//!
//! Fields are sanitized before encoding, so a tab or newline can never
//! appear inside a field. Unknown reply tags are preserved for the
//! caller to skip, keeping older engines compatible with newer helpers.

use crate::provider::Provider;

/// Playable media resolved from a source page URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub media_url: String,
    /// HTTP User-Agent the media host expects (may be empty)
    pub user_agent: String,
    /// HTTP Referer the media host expects (may be empty)
    pub referer: String,
}

/// One search result as it came off the wire, before sanitization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSearchItem {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub duration: String,
    pub url: String,
}

/// A parsed reply line from the sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyLine {
    Ready,
    Pong,
    Bye,
    SearchBegin,
    SearchItem(RawSearchItem),
    SearchEnd(usize),
    ResolveOk(ResolvedMedia),
    Error(String),
    Unknown(String),
}

pub fn encode_search(provider: &Provider, max_results: usize, query: &str) -> String {
    format!("SEARCH\t{}\t{}\t{}\n", provider, max_results, query)
}

pub fn encode_resolve(provider: &Provider, url: &str) -> String {
    format!("RESOLVE\t{}\t{}\n", provider, url)
}

pub fn encode_ping() -> &'static str {
    "PING\n"
}

pub fn encode_quit() -> &'static str {
    "QUIT\n"
}

/// Parse one reply line (without its trailing newline).
pub fn parse_reply(line: &str) -> ReplyLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.split('\t');
    let tag = fields.next().unwrap_or("");
    match tag {
        "READY" => ReplyLine::Ready,
        "PONG" => ReplyLine::Pong,
        "BYE" => ReplyLine::Bye,
        "SEARCH_BEGIN" => ReplyLine::SearchBegin,
        "SEARCH_ITEM" => {
            let id = fields.next().unwrap_or("").to_string();
            let title = fields.next().unwrap_or("").to_string();
            let channel = fields.next().unwrap_or("").to_string();
            let duration = fields.next().unwrap_or("").to_string();
            let url = fields.next().unwrap_or("").to_string();
            ReplyLine::SearchItem(RawSearchItem {
                id,
                title,
                channel,
                duration,
                url,
            })
        }
        "SEARCH_END" => {
            let count = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
            ReplyLine::SearchEnd(count)
        }
        "RESOLVE_OK" => {
            let media_url = fields.next().unwrap_or("").to_string();
            let user_agent = fields.next().unwrap_or("").to_string();
            let referer = fields.next().unwrap_or("").to_string();
            ReplyLine::ResolveOk(ResolvedMedia {
                media_url,
                user_agent,
                referer,
            })
        }
        "ERROR" => {
            let message = fields.next().unwrap_or("unspecified error").to_string();
            ReplyLine::Error(message)
        }
        _ => ReplyLine::Unknown(line.to_string()),
    }
}
