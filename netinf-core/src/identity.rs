//! Content identity: `(hash algorithm, hash)` names and their `ni://` text form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::integrity;

/// URI scheme for named information.
pub const NI_SCHEME: &str = "ni";

/// Algorithm name used for everything this node hashes itself.
pub const DEFAULT_HASH_ALG: &str = "sha-256";

/// Names content by digest, independent of where the bytes live.
/// Two identifiers are equal iff algorithm and hash both match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentIdentifier {
    hash_algorithm: String,
    hash: String,
}

impl ContentIdentifier {
    pub fn new(hash_algorithm: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            hash_algorithm: hash_algorithm.into(),
            hash: hash.into(),
        }
    }

    /// Like [`ContentIdentifier::new`], but refuses an algorithm or hash that
    /// is not a plain token. Use for every identifier that arrives from outside.
    pub fn checked(
        hash_algorithm: impl Into<String>,
        hash: impl Into<String>,
    ) -> Result<Self, IdentifierError> {
        let (hash_algorithm, hash) = (hash_algorithm.into(), hash.into());
        if hash_algorithm.is_empty() || hash.is_empty() {
            return Err(IdentifierError::Empty(format!("{hash_algorithm};{hash}")));
        }
        if !is_safe_token(&hash_algorithm) || !is_safe_hash(&hash) {
            return Err(IdentifierError::Unsafe(format!("{hash_algorithm};{hash}")));
        }
        Ok(Self {
            hash_algorithm,
            hash,
        })
    }

    /// Name `bytes` by their SHA-256 digest. The URL they came from plays no part.
    pub fn from_content(bytes: &[u8]) -> Self {
        Self::new(DEFAULT_HASH_ALG, integrity::hash_content(bytes))
    }

    pub fn hash_algorithm(&self) -> &str {
        &self.hash_algorithm
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// `ni://<alg>;<hash>`, used in search results and publish URIs.
    pub fn to_ni_uri(&self) -> String {
        format!("{}://{};{}", NI_SCHEME, self.hash_algorithm, self.hash)
    }

    /// `ni:///<alg>;<hash>` (empty authority), the form the NetInf multipart protocol expects.
    pub fn to_netinf_uri(&self) -> String {
        format!("{}:///{};{}", NI_SCHEME, self.hash_algorithm, self.hash)
    }

    /// Parse either text form. An authority between `//` and `/` is accepted and ignored.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let rest = s
            .trim()
            .strip_prefix("ni://")
            .ok_or_else(|| IdentifierError::Scheme(s.to_string()))?;
        let name = match rest.split_once('/') {
            Some((_authority, name)) => name,
            None => rest,
        };
        let (alg, hash) = name
            .split_once(';')
            .ok_or_else(|| IdentifierError::Separator(s.to_string()))?;
        Self::checked(alg, hash).map_err(|e| match e {
            IdentifierError::Empty(_) => IdentifierError::Empty(s.to_string()),
            _ => IdentifierError::Unsafe(s.to_string()),
        })
    }
}

fn is_safe_token(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// A hash usable as a single file name: ASCII letters, digits, `-` and `_`.
/// Hex and base64url digests both qualify; separators and dots never do.
pub fn is_safe_hash(hash: &str) -> bool {
    !hash.is_empty() && is_safe_token(hash)
}

impl fmt::Display for ContentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{};{}", NI_SCHEME, self.hash_algorithm, self.hash)
    }
}

impl FromStr for ContentIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("not an ni URI: {0}")]
    Scheme(String),
    #[error("missing ';' between algorithm and hash: {0}")]
    Separator(String),
    #[error("empty algorithm or hash: {0}")]
    Empty(String),
    #[error("algorithm or hash holds characters outside [A-Za-z0-9_-]: {0}")]
    Unsafe(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_identifier() {
        let a = ContentIdentifier::from_content(b"<html>hello</html>");
        let b = ContentIdentifier::from_content(b"<html>hello</html>");
        assert_eq!(a, b);
        assert_eq!(a.hash_algorithm(), DEFAULT_HASH_ALG);
    }

    #[test]
    fn different_bytes_different_identifier() {
        let a = ContentIdentifier::from_content(b"one");
        let b = ContentIdentifier::from_content(b"two");
        assert_ne!(a, b);
    }

    #[test]
    fn equality_needs_both_fields() {
        let a = ContentIdentifier::new("sha-256", "abc");
        let b = ContentIdentifier::new("sha-1", "abc");
        assert_ne!(a, b);
    }

    #[test]
    fn text_forms() {
        let id = ContentIdentifier::new("sha-256", "bacon");
        assert_eq!(id.to_ni_uri(), "ni://sha-256;bacon");
        assert_eq!(id.to_string(), "ni://sha-256;bacon");
        assert_eq!(id.to_netinf_uri(), "ni:///sha-256;bacon");
    }

    #[test]
    fn parse_both_forms() {
        let expected = ContentIdentifier::new("sha-256", "bacon");
        assert_eq!(ContentIdentifier::parse("ni://sha-256;bacon").unwrap(), expected);
        assert_eq!(ContentIdentifier::parse("ni:///sha-256;bacon").unwrap(), expected);
        assert_eq!(
            "ni://example.com/sha-256;bacon".parse::<ContentIdentifier>().unwrap(),
            expected
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(matches!(
            ContentIdentifier::parse("http://sha-256;x"),
            Err(IdentifierError::Scheme(_))
        ));
        assert!(matches!(
            ContentIdentifier::parse("ni://sha-256"),
            Err(IdentifierError::Separator(_))
        ));
        assert!(matches!(
            ContentIdentifier::parse("ni://;abc"),
            Err(IdentifierError::Empty(_))
        ));
    }

    #[test]
    fn parse_rejects_path_like_hashes() {
        for uri in [
            "ni:///sha-256;../x",
            "ni://sha-256;a/b",
            "ni:///sha-256;./../escaped",
            "ni:///sha-256;..",
            "ni:///sha-256;a\\b",
            "ni:///sha/256;abc",
        ] {
            assert!(
                matches!(
                    ContentIdentifier::parse(uri),
                    Err(IdentifierError::Unsafe(_) | IdentifierError::Separator(_))
                ),
                "{uri} was accepted"
            );
        }
    }

    #[test]
    fn base64url_and_hex_hashes_are_safe() {
        assert!(is_safe_hash("f4OxZX_x_FO5LcGBSKHWXfwtSx-j1ncoSt3SABJtkGk"));
        assert!(is_safe_hash(&hash_content_hex()));
        assert!(!is_safe_hash(""));
        assert!(!is_safe_hash("a.b"));
        assert!(ContentIdentifier::checked("sha-256", "bacon").is_ok());
    }

    fn hash_content_hex() -> String {
        ContentIdentifier::from_content(b"x").hash().to_string()
    }
}
