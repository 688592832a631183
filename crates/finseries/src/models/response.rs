use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};
use log::debug;

/// Raw payload returned by a transport for one request.
///
/// Held only between the dispatcher and the parser; never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    /// Transport status code (HTTP status for the default transport).
    pub status: u16,
    /// Declared content type, if the transport reported one.
    pub content_type: Option<String>,
    /// Undecoded payload bytes.
    pub payload: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, content_type: Option<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            payload: payload.into(),
        }
    }

    /// A 200 response with a text payload.
    pub fn ok(payload: impl Into<String>) -> Self {
        Self::new(200, None, payload.into().into_bytes())
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Decode the payload with the given charset label (e.g. "windows-1251").
    ///
    /// A byte-order mark overrides the label; unknown labels fall back to UTF-8.
    /// Malformed sequences are replaced with U+FFFD rather than rejected,
    /// and logged at debug level.
    pub fn text(&self, charset: &str) -> Cow<'_, str> {
        let encoding = Encoding::for_label(charset.as_bytes()).unwrap_or_else(|| {
            debug!("Unknown charset label {:?}, decoding as UTF-8", charset);
            UTF_8
        });
        let (text, used, had_errors) = encoding.decode(&self.payload);
        if had_errors {
            debug!(
                "Payload of {} bytes has malformed {} sequences, replaced with U+FFFD",
                self.payload.len(),
                used.name()
            );
        }
        text
    }
}
