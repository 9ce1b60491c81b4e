pub mod multipart;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Url};
use thiserror::Error;

use crate::delimiter::{DelimiterError, DelimiterIndex};
use crate::files::FilePayload;
use multipart::MultipartPart;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Delimiter(#[from] DelimiterError),

    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },

    #[error("request is not a multipart request, got '{media_type}'")]
    NotMultipart { media_type: String },

    #[error("malformed multipart body: {0}")]
    MalformedMultipart(String),
}

/// A fuzzable HTTP request. The seed request is parsed once and never touched
/// again; every mutation happens on a deep clone, so the body is held as a
/// plain owned buffer rather than a one-shot reader.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Deep-copies the request, body included. The original stays fully
    /// readable no matter how many clones are taken or read.
    pub fn clone_body(&self) -> Request {
        Request {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    pub fn content_length(&self) -> usize {
        self.body.as_ref().map(Vec::len).unwrap_or(0)
    }

    fn media_type(&self) -> String {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| {
                value
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
            .unwrap_or_default()
    }

    /// True when the Content-Type media type begins `multipart/`.
    pub fn is_multipart_form(&self) -> bool {
        self.media_type().starts_with("multipart/")
    }

    /// True when the URL path contains the given segment literal.
    pub fn has_path_argument(&self, path_arg: &str) -> bool {
        self.url.path().split('/').any(|segment| segment == path_arg)
    }

    /// Sets a header to the payload, replacing any previous values under that
    /// name while leaving every other header untouched.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), RequestError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| RequestError::InvalidHeader {
                name: name.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|_| RequestError::InvalidHeader {
                name: name.to_string(),
            })?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// Sets a URL query param to the payload and re-encodes the query string.
    pub fn set_query_param(&mut self, param: &str, value: &str) {
        let pairs: Vec<(String, String)> = self
            .url
            .query_pairs()
            .map(|(key, val)| (key.into_owned(), val.into_owned()))
            .collect();

        let mut replaced = false;
        let mut query = self.url.query_pairs_mut();
        query.clear();
        for (key, val) in &pairs {
            if key == param {
                if !replaced {
                    query.append_pair(key, value);
                    replaced = true;
                }
            } else {
                query.append_pair(key, val);
            }
        }
        if !replaced {
            query.append_pair(param, value);
        }
    }

    /// Replaces every path segment equal to `arg` with the payload.
    pub fn set_url_path_argument(&mut self, arg: &str, value: &str) {
        let path = self.url.path().to_string();
        let segments: Vec<&str> = path
            .split('/')
            .map(|segment| if segment == arg { value } else { segment })
            .collect();
        self.url.set_path(&segments.join("/"));
    }

    /// Appends the payload as a trailing path segment.
    pub fn set_directory_root(&mut self, value: &str) {
        let path = self.url.path().to_string();
        let mut segments: Vec<&str> = path.split('/').collect();
        segments.push(value);
        self.url.set_path(&segments.join("/"));
    }

    /// Counts the marker-bounded injection sites in the body: half the number
    /// of delimiter bytes. An odd delimiter count is an error.
    pub fn body_target_count(&self, delimiter: u8) -> Result<usize, RequestError> {
        let Some(body) = self.body.as_deref() else {
            return Ok(0);
        };
        let count = DelimiterIndex::new(body).lookup(delimiter).len();
        if count % 2 != 0 {
            return Err(DelimiterError::Unbalanced.into());
        }
        Ok(count / 2)
    }

    /// Strips every delimiter byte from the body and recomputes
    /// Content-Length, so the wire request is legal. Multipart bodies are
    /// left alone: a delimiter byte inside binary part content is data, not a
    /// marker.
    pub fn remove_delimiters(&mut self, delimiter: u8) {
        if self.is_multipart_form() {
            return;
        }
        let Some(body) = self.body.as_mut() else {
            return;
        };
        if body.is_empty() {
            return;
        }
        body.retain(|&byte| byte != delimiter);
        let length = body.len();
        self.set_content_length(length);
    }

    /// Replaces the marker-bounded site at `position` (delimiters included)
    /// with the payload and adjusts Content-Length.
    pub fn set_body_payload_at(
        &mut self,
        position: usize,
        delimiter: u8,
        payload: &str,
    ) -> Result<(), RequestError> {
        let Some(body) = self.body.as_deref() else {
            return Ok(());
        };

        let (start, end) = DelimiterIndex::new(body).site_range(position, delimiter)?;

        let mut new_body = Vec::with_capacity(body.len() + payload.len());
        new_body.extend_from_slice(&body[..start]);
        new_body.extend_from_slice(payload.as_bytes());
        new_body.extend_from_slice(&body[end + 1..]);

        let length = new_body.len();
        self.body = Some(new_body);
        self.set_content_length(length);
        Ok(())
    }

    /// Replaces a form field in a multipart body with the payload, keeping
    /// the original boundary and every other part intact. A field that never
    /// appears is appended as a fresh part.
    pub fn replace_multipart_field(
        &mut self,
        field_name: &str,
        payload: &str,
    ) -> Result<(), RequestError> {
        let boundary = self.multipart_boundary()?;
        let body = self.body.as_deref().unwrap_or_default();
        let mut parts = multipart::parse(body, &boundary)?;

        let mut written = false;
        for part in parts.iter_mut() {
            if part.field_name().as_deref() == Some(field_name) {
                *part = MultipartPart::form_field(field_name, payload.as_bytes());
                written = true;
            }
        }
        if !written {
            parts.push(MultipartPart::form_field(field_name, payload.as_bytes()));
        }

        self.install_multipart_body(&parts, &boundary)
    }

    /// Replaces a file part's content with the payload file, keeping the
    /// original part headers so the filename and Content-Type survive.
    pub fn replace_multipart_file_data(
        &mut self,
        field_name: &str,
        file: &FilePayload,
    ) -> Result<(), RequestError> {
        let boundary = self.multipart_boundary()?;
        let body = self.body.as_deref().unwrap_or_default();
        let mut parts = multipart::parse(body, &boundary)?;

        let mut written = false;
        for part in parts.iter_mut() {
            if part.field_name().as_deref() == Some(field_name) {
                part.body = file.payload.clone();
                written = true;
            }
        }
        if !written {
            parts.push(MultipartPart::file_field(field_name, &file.name, &file.payload));
        }

        self.install_multipart_body(&parts, &boundary)
    }

    fn install_multipart_body(
        &mut self,
        parts: &[MultipartPart],
        boundary: &str,
    ) -> Result<(), RequestError> {
        let new_body = multipart::serialize(parts, boundary);
        let length = new_body.len();
        self.body = Some(new_body);
        self.set_content_length(length);

        let content_type = format!("multipart/form-data; boundary={boundary}");
        let value = HeaderValue::from_str(&content_type)
            .map_err(|_| RequestError::MalformedMultipart("invalid boundary".to_string()))?;
        self.headers.insert(CONTENT_TYPE, value);
        Ok(())
    }

    fn multipart_boundary(&self) -> Result<String, RequestError> {
        if !self.is_multipart_form() {
            return Err(RequestError::NotMultipart {
                media_type: self.media_type(),
            });
        }
        let content_type = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        multipart::boundary_param(content_type)
            .ok_or_else(|| RequestError::MalformedMultipart("missing boundary".to_string()))
    }

    fn set_content_length(&mut self, length: usize) {
        self.headers
            .insert(CONTENT_LENGTH, HeaderValue::from(length as u64));
    }
}

/// An HTTP response snapshot with a cloneable body, so every plugin can drain
/// its own copy.
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn clone_body(&self) -> Response {
        Response {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}
