//! Human-facing invitation page served at `/join/{sessionId}`.

use std::fmt::Write;

use axum::http::StatusCode;
use tracing::warn;

use crate::{
    dto::session::SessionInfoResponse,
    error::ServiceError,
    services::session_service,
    state::{SharedState, session::normalize_code},
};

/// Custom URL scheme opened by the mobile app.
const APP_SCHEME: &str = "sushi-streak";

const STYLE: &str = "body{font-family:system-ui,sans-serif;background:#fff8f0;color:#222;\
max-width:32rem;margin:2rem auto;padding:0 1rem}h1{margin-bottom:.25rem}\
.code{font-family:monospace;font-size:2rem;letter-spacing:.2em}\
.btn{display:inline-block;padding:.75rem 1.25rem;margin:.5rem .5rem .5rem 0;border-radius:.5rem;\
background:#e4572e;color:#fff;text-decoration:none;border:0;font-size:1rem;cursor:pointer}\
table{width:100%;border-collapse:collapse}td{padding:.25rem 0}.muted{color:#777}";

/// Render the page for `raw_code`, returning the status to answer with.
pub async fn render(state: &SharedState, raw_code: &str) -> (StatusCode, String) {
    match session_service::session_info(state, raw_code).await {
        Ok(info) => (
            StatusCode::OK,
            session_page(&info, &state.config().share_base_url),
        ),
        Err(ServiceError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            not_found_page(&normalize_code(raw_code)),
        ),
        Err(err) => {
            warn!(session = %raw_code, error = %err, "failed to render join page");
            (StatusCode::SERVICE_UNAVAILABLE, unavailable_page())
        }
    }
}

fn session_page(info: &SessionInfoResponse, share_base_url: &str) -> String {
    let code = escape_html(&info.session_id);
    let name = escape_html(&info.session_name);
    let status = if info.is_active {
        "Session in progress"
    } else {
        "Session closed"
    };

    let mut rows = String::new();
    for player in &info.players {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&player.name),
            player.score,
            if player.finished { "done" } else { "" }
        );
    }
    if rows.is_empty() {
        rows.push_str("<tr><td class=\"muted\">No players yet</td></tr>");
    }

    page(
        &format!("Join {name}"),
        &format!(
            "<h1>{name}</h1>\
<p class=\"muted\">{status} &middot; {count} player(s)</p>\
<p class=\"code\" id=\"code\">{code}</p>\
<a class=\"btn\" href=\"{APP_SCHEME}://join/{code}\">Open in the app</a>\
<button class=\"btn\" type=\"button\" onclick=\"navigator.clipboard.writeText('{code}')\">Copy code</button>\
<p class=\"muted\">Share link: {share}/join/{code}</p>\
<table>{rows}</table>",
            count = info.players_count,
            share = escape_html(share_base_url),
        ),
    )
}

fn not_found_page(code: &str) -> String {
    page(
        "Session not found",
        &format!(
            "<h1>Session not found</h1><p>No session matches <span class=\"code\">{}</span>. \
It may have expired.</p>",
            escape_html(code)
        ),
    )
}

fn unavailable_page() -> String {
    page(
        "Unavailable",
        "<h1>Temporarily unavailable</h1><p>Please try again in a moment.</p>",
    )
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
<title>{title}</title><style>{STYLE}</style></head><body>{body}</body></html>"
    )
}

/// Escape text for use in HTML content and quoted attributes.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
