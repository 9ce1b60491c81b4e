use std::path::Path;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use reqwest::{Method, Url};
use thiserror::Error;

use crate::request::Request;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read seed request {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed seed request: {0}")]
    Malformed(String),
}

fn malformed(message: &str) -> ParseError {
    ParseError::Malformed(message.to_string())
}

/// Locates the header/body separator: the first `\n\n`, or `\r\n\r\n` for
/// CRLF files. Returns the offset of the first body byte.
fn body_offset(raw: &[u8]) -> Option<usize> {
    if let Some(offset) = raw.windows(2).position(|window| window == b"\n\n") {
        return Some(offset + 2);
    }
    raw.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|offset| offset + 4)
}

/// Parses an HTTP/1.x request from a wire-format file. Users author these
/// files with injection markers in the body, which inflates it relative to
/// the declared Content-Length, so the on-disk byte count is authoritative:
/// the parsed request's body and Content-Length are overridden with whatever
/// follows the first blank line. This runs once at startup; the cost of
/// reading the whole file is paid here so the rest of the run stays lean.
pub fn request_from_file(path: &Path) -> Result<Request, ParseError> {
    let raw = std::fs::read(path).map_err(|source| ParseError::FileRead {
        path: path.display().to_string(),
        source,
    })?;

    let head_end = body_offset(&raw).unwrap_or(raw.len());
    let head = std::str::from_utf8(&raw[..head_end])
        .map_err(|_| malformed("header block is not UTF-8"))?;

    let mut lines = head.lines();
    let request_line = lines.next().ok_or_else(|| malformed("empty request file"))?;
    let mut fields = request_line.split_whitespace();
    let method = fields
        .next()
        .and_then(|method| Method::from_bytes(method.as_bytes()).ok())
        .ok_or_else(|| malformed("invalid request method"))?;
    let target = fields
        .next()
        .ok_or_else(|| malformed("missing request target"))?;
    let protocol = fields
        .next()
        .ok_or_else(|| malformed("missing protocol version"))?;
    if !protocol.starts_with("HTTP/") {
        return Err(malformed("invalid protocol version"));
    }

    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed("header line missing colon"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| malformed("invalid header name"))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|_| malformed("invalid header value"))?;
        // append, not insert: duplicate headers in the seed are preserved
        headers.append(name, value);
    }

    let url = if target.starts_with("http://") || target.starts_with("https://") {
        Url::parse(target).map_err(|_| malformed("invalid request target"))?
    } else {
        let host = headers
            .get("host")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| malformed("missing Host header"))?;
        // The scheme is a placeholder until dispatch, where the configured
        // scheme is stamped on every outgoing request.
        Url::parse(&format!("http://{host}{target}"))
            .map_err(|_| malformed("invalid request target"))?
    };

    let declared_length: u64 = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0);

    let mut request = Request {
        method,
        url,
        headers,
        body: None,
    };

    // No declared body: nothing to reconcile.
    if declared_length == 0 {
        return Ok(request);
    }

    let body_start =
        body_offset(&raw).ok_or_else(|| malformed("missing header/body separator"))?;
    let body = raw[body_start..].to_vec();
    request
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(body.len() as u64));
    request.body = Some(body);
    Ok(request)
}
