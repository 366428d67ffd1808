//! Peer transfer protocol: message types and version.

use serde::{Deserialize, Serialize};

use crate::identity::ContentIdentifier;

/// Current protocol version, carried in every `Get`.
pub const PROTOCOL_VERSION: u8 = 1;

/// Messages exchanged with a peer over a byte stream. Encoding is bincode;
/// framing is length-prefix (see the wire module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Ask for the bytes of one content identifier.
    Get {
        protocol_version: u8,
        msgid: String,
        hash_algorithm: String,
        hash: String,
    },
    Content {
        msgid: String,
        content_type: String,
        payload: Vec<u8>,
    },
    /// The peer does not hold the content, or refused the request.
    NotFound { msgid: String },
}

impl Message {
    pub fn get(id: &ContentIdentifier, msgid: impl Into<String>) -> Self {
        Message::Get {
            protocol_version: PROTOCOL_VERSION,
            msgid: msgid.into(),
            hash_algorithm: id.hash_algorithm().to_string(),
            hash: id.hash().to_string(),
        }
    }

    pub fn msgid(&self) -> &str {
        match self {
            Message::Get { msgid, .. }
            | Message::Content { msgid, .. }
            | Message::NotFound { msgid } => msgid,
        }
    }
}
