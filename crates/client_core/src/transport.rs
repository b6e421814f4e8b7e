//! Live event stream plumbing: one WebSocket per session, one JSON event per
//! text frame.

use shared::protocol::ServerEvent;
use url::Url;

use crate::{
    backend::parse_server_url,
    error::{ClientError, Result},
};

/// `http(s)://host[/prefix]` becomes `ws(s)://host[/prefix]/ws`.
pub fn events_url(server_url: &str) -> Result<Url> {
    let mut url = parse_server_url(server_url)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidServerUrl(server_url.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::InvalidServerUrl(server_url.to_string()))?
        .pop_if_empty()
        .push("ws");
    url.set_query(None);
    Ok(url)
}

pub fn decode_event(text: &str) -> Result<ServerEvent> {
    Ok(serde_json::from_str(text)?)
}
