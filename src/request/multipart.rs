//! A minimal multipart/form-data reader and writer. The fuzzer only ever
//! re-emits a body under its original boundary with one part swapped out, so
//! parts are materialized whole instead of streamed.

use super::RequestError;

#[derive(Clone, Debug)]
pub struct MultipartPart {
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MultipartPart {
    /// The `name` parameter of the part's Content-Disposition header.
    pub fn field_name(&self) -> Option<String> {
        let disposition = self
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-disposition"))
            .map(|(_, value)| value.as_str())?;
        param_value(disposition, "name")
    }

    /// A fresh form-field part with synthesized headers.
    pub fn form_field(name: &str, payload: &[u8]) -> MultipartPart {
        MultipartPart {
            headers: vec![(
                "Content-Disposition".to_string(),
                format!("form-data; name=\"{name}\""),
            )],
            body: payload.to_vec(),
        }
    }

    /// A fresh file part with synthesized headers carrying the filename.
    pub fn file_field(name: &str, filename: &str, payload: &[u8]) -> MultipartPart {
        MultipartPart {
            headers: vec![
                (
                    "Content-Disposition".to_string(),
                    format!("form-data; name=\"{name}\"; filename=\"{filename}\""),
                ),
                (
                    "Content-Type".to_string(),
                    "application/octet-stream".to_string(),
                ),
            ],
            body: payload.to_vec(),
        }
    }
}

/// Extracts a `key=value` or `key="value"` parameter from a header value of
/// the shape `form-data; name="field"; filename="f.png"`.
pub(crate) fn param_value(header_value: &str, key: &str) -> Option<String> {
    for param in header_value.split(';').skip(1) {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case(key) {
            return Some(value.trim().trim_matches('"').to_string());
        }
    }
    None
}

/// Extracts the boundary parameter from a Content-Type header value.
pub(crate) fn boundary_param(content_type: &str) -> Option<String> {
    for param in content_type.split(';').skip(1) {
        if let Some((name, value)) = param.split_once('=') {
            if name.trim().eq_ignore_ascii_case("boundary") {
                let boundary = value.trim().trim_matches('"');
                if !boundary.is_empty() {
                    return Some(boundary.to_string());
                }
            }
        }
    }
    None
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| offset + from)
}

fn malformed(message: &str) -> RequestError {
    RequestError::MalformedMultipart(message.to_string())
}

/// Splits a multipart body into its parts. Line endings may be CRLF or bare
/// LF; the trailing `--boundary--` terminator is required.
pub(crate) fn parse(body: &[u8], boundary: &str) -> Result<Vec<MultipartPart>, RequestError> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut pos = find(body, &delimiter, 0).ok_or_else(|| malformed("missing opening boundary"))?
        + delimiter.len();

    let mut parts = Vec::new();
    loop {
        if body[pos..].starts_with(b"--") {
            // Closing delimiter, everything after is epilogue.
            break;
        }
        if body[pos..].starts_with(b"\r\n") {
            pos += 2;
        } else if body[pos..].starts_with(b"\n") {
            pos += 1;
        } else {
            return Err(malformed("garbage after boundary"));
        }

        let mut headers = Vec::new();
        loop {
            let line_end = find(body, b"\n", pos).ok_or_else(|| malformed("truncated part"))?;
            let mut line = &body[pos..line_end];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            pos = line_end + 1;
            if line.is_empty() {
                break;
            }
            let text =
                std::str::from_utf8(line).map_err(|_| malformed("part header is not UTF-8"))?;
            let (name, value) = text
                .split_once(':')
                .ok_or_else(|| malformed("part header missing colon"))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let next = find(body, &delimiter, pos).ok_or_else(|| malformed("missing closing boundary"))?;
        let mut content_end = next;
        if content_end >= 2 && &body[content_end - 2..content_end] == b"\r\n" {
            content_end -= 2;
        } else if content_end >= 1 && body[content_end - 1] == b'\n' {
            content_end -= 1;
        }
        parts.push(MultipartPart {
            headers,
            body: body[pos..content_end].to_vec(),
        });
        pos = next + delimiter.len();
    }

    Ok(parts)
}

/// Re-emits parts under the given boundary with CRLF line endings and a
/// closing delimiter, the exact bytes that go on the wire. Content-Length is
/// the length of this buffer, nothing more.
pub(crate) fn serialize(parts: &[MultipartPart], boundary: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(b"--");
        out.extend_from_slice(boundary.as_bytes());
        out.extend_from_slice(b"\r\n");
        for (name, value) in &part.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&part.body);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"--");
    out.extend_from_slice(boundary.as_bytes());
    out.extend_from_slice(b"--\r\n");
    out
}
