//! Request/response values exchanged with the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;

use crate::body::Body;
use crate::error::{Error, ErrorCode, Result};
use crate::hpack::Header;
use crate::stream::Stream;

pub mod pseudo {
    pub const METHOD: &str = ":method";
    pub const SCHEME: &str = ":scheme";
    pub const AUTHORITY: &str = ":authority";
    pub const PATH: &str = ":path";
    pub const STATUS: &str = ":status";
}

/// An ordered header list. Name lookups are ASCII case-insensitive;
/// duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pseudo-headers for a request, in the order most servers expect.
    pub fn request(method: &str, scheme: &str, authority: Option<&str>, path: &str) -> Self {
        let mut headers = Self::new();
        headers.add(pseudo::METHOD, method);
        headers.add(pseudo::SCHEME, scheme);
        if let Some(authority) = authority {
            headers.add(pseudo::AUTHORITY, authority);
        }
        headers.add(pseudo::PATH, path);
        headers
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.push(Header::new(name, value));
        self
    }

    /// Replace the first field named `name`, or append it.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let header = Header::new(name, value);
        match self.fields.iter_mut().find(|h| h.name.eq_ignore_ascii_case(&header.name)) {
            Some(existing) => *existing = header,
            None => self.fields.push(header),
        }
        self
    }

    /// Drop every field named `name`.
    pub fn remove(&mut self, name: &str) -> &mut Self {
        self.fields.retain(|h| !h.name.eq_ignore_ascii_case(name));
        self
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn last(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    /// All values of `name` joined with ", ".
    pub fn condensed(&self, name: &str) -> Option<String> {
        let values = self.all(name);
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.first(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.fields.iter()
    }

    pub fn as_slice(&self) -> &[Header] {
        &self.fields
    }
}

impl From<Vec<Header>> for Headers {
    fn from(fields: Vec<Header>) -> Self {
        Self { fields }
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, h) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str("\r\n")?;
            }
            write!(f, "{}: {}", h.name, h.value)?;
        }
        Ok(())
    }
}

/// A request to be sent on a fresh stream.
#[derive(Debug, Clone)]
pub struct Request {
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: &str, scheme: &str, authority: Option<&str>, path: &str) -> Self {
        Self {
            headers: Headers::request(method, scheme, authority, path),
            body: None,
        }
    }

    pub fn get(scheme: &str, authority: &str, path: &str) -> Self {
        Self::new("GET", scheme, Some(authority), path)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> Option<&str> {
        self.headers.first(pseudo::METHOD)
    }
}

/// Identifies a server push: the stream that carried the PUSH_PROMISE and
/// the stream the pushed response will arrive on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PushKey {
    pub stream_id: u32,
    pub promised_stream_id: u32,
}

/// The request a server promised to answer on a pushed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub key: PushKey,
    pub headers: Headers,
}

impl PushRequest {
    pub fn method(&self) -> Option<&str> {
        self.headers.first(pseudo::METHOD)
    }

    pub fn path(&self) -> Option<&str> {
        self.headers.first(pseudo::PATH)
    }
}

impl fmt::Display for PushRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamID={}\r\nPromisedStreamID={}\r\n{}",
            self.key.stream_id, self.key.promised_stream_id, self.headers
        )
    }
}

/// A complete response: headers, body, optional trailers, and the pushes
/// the server promised while answering.
#[derive(Debug)]
pub struct Response {
    pub stream_id: u32,
    pub headers: Headers,
    pub body: Body,
    pub trailers: Option<Headers>,
    pub promises: Vec<PushRequest>,
    pub(crate) pushed_streams: BTreeMap<PushKey, Arc<Stream>>,
}

impl Response {
    /// `:status` as a number; `None` if missing or malformed.
    pub fn status(&self) -> Option<u16> {
        self.headers.first(pseudo::STATUS)?.parse().ok()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.first("content-type")
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers.first("content-length")?.trim().parse().ok()
    }

    pub fn bytes(&mut self) -> io::Result<Bytes> {
        self.body.to_bytes()
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&mut self) -> io::Result<String> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Pushed responses that have already completed, in promise order. Each
    /// one is handed out once; failed pushes are left out.
    pub fn pushed(&self) -> Vec<(PushRequest, Response)> {
        self.promises
            .iter()
            .filter_map(|push| {
                let stream = self.pushed_streams.get(&push.key)?;
                match stream.try_response()? {
                    Ok(response) => Some((push.clone(), response)),
                    Err(_) => None,
                }
            })
            .collect()
    }

    /// Wait for the response on the stream reserved by `push`.
    pub fn pushed_response(&self, push: &PushRequest) -> Result<Response> {
        match self.pushed_streams.get(&push.key) {
            Some(stream) => stream.response(),
            None => Err(Error::stream(
                push.key.promised_stream_id,
                ErrorCode::StreamClosed,
                format!("stream {} did not promise this push", self.stream_id),
            )),
        }
    }
}
