//! Turning a configured source into the URL the browser loads.

use super::token::TokenIssuer;
use crate::Result;
use crate::config::{RoomAuth, Source, TemplatedRoom};

/// Resolve `source` into a navigable URL, minting a token when needed.
pub fn resolve_page_url(source: &Source) -> Result<String> {
    match source {
        Source::DirectUrl(url) => Ok(url.clone()),
        Source::TemplatedRoom(room) => {
            let token = match &room.auth {
                RoomAuth::Token(token) => token.clone(),
                RoomAuth::Credentials {
                    api_key,
                    api_secret,
                    room_name,
                } => TokenIssuer::new(api_key, api_secret).recorder_token(room_name)?,
            };
            Ok(template_url(room, &token))
        }
    }
}

/// `{base}/{kind}?url={encoded ws url}&token={token}`
pub fn template_url(room: &TemplatedRoom, token: &str) -> String {
    format!(
        "{}/{}?url={}&token={}",
        room.base.trim_end_matches('/'),
        room.kind,
        urlencoding::encode(&room.ws_url),
        token
    )
}
