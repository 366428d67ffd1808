//! Minimal `multipart/*` body splitting for NetInf `get` responses.

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Part {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("opening boundary not found")]
    NoOpeningBoundary,
    #[error("part {0} is not terminated by a boundary")]
    Unterminated(usize),
    #[error("part {index} has bad headers: {source}")]
    Headers {
        index: usize,
        source: httparse::Error,
    },
    #[error("part {0} headers are incomplete")]
    IncompleteHeaders(usize),
}

/// `boundary` parameter of a multipart content type, unquoted.
pub fn boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }
    params.find_map(|p| {
        let (k, v) = p.split_once('=')?;
        if !k.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let v = v.trim().trim_matches('"');
        (!v.is_empty()).then(|| v.to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Split `body` into parts. The preamble and epilogue are ignored.
pub fn parse(body: &Bytes, boundary: &str) -> Result<Vec<Part>, MultipartError> {
    let delimiter = format!("--{boundary}").into_bytes();
    let start = find(body, &delimiter, 0).ok_or(MultipartError::NoOpeningBoundary)?;
    let mut cursor = start + delimiter.len();
    let mut parts = Vec::new();

    loop {
        // "--" right after a delimiter closes the body.
        if body.get(cursor..cursor + 2) == Some(b"--") {
            return Ok(parts);
        }
        if body.get(cursor..cursor + 2) == Some(b"\r\n") {
            cursor += 2;
        }
        let index = parts.len();
        let mut next_delimiter = b"\r\n".to_vec();
        next_delimiter.extend_from_slice(&delimiter);
        let end = find(body, &next_delimiter, cursor).ok_or(MultipartError::Unterminated(index))?;
        let raw = &body[cursor..end];

        let mut storage = [httparse::EMPTY_HEADER; 16];
        let (header_len, headers) = match httparse::parse_headers(raw, &mut storage) {
            Ok(httparse::Status::Complete((len, hs))) => (
                len,
                hs.iter()
                    .map(|h| {
                        (
                            h.name.to_string(),
                            String::from_utf8_lossy(h.value).trim().to_string(),
                        )
                    })
                    .collect(),
            ),
            Ok(httparse::Status::Partial) => return Err(MultipartError::IncompleteHeaders(index)),
            Err(source) => return Err(MultipartError::Headers { index, source }),
        };
        parts.push(Part {
            headers,
            body: body.slice(cursor + header_len..end),
        });
        cursor = end + next_delimiter.len();
    }
}
