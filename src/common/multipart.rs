//! A reader for `multipart/form-data` bodies.
//!
//! The mock server buffers every request body before dispatching it, so the reader works on
//! a byte slice and hands out parts that borrow from it, one at a time and in the order they
//! appear on the wire:
//!
//! ```text
//! --boundary\r\n
//! Content-Disposition: form-data; name="payload_json"\r\n
//! Content-Type: application/json\r\n
//! \r\n
//! {"content":"hello"}\r\n
//! --boundary\r\n
//! Content-Disposition: form-data; name="file0"; filename="cat.png"\r\n
//! \r\n
//! <bytes>\r\n
//! --boundary--\r\n
//! ```
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("content type '{0}' is not multipart/form-data")]
    NotMultipart(String),
    #[error("missing boundary in multipart content type")]
    MissingBoundary,
    #[error("invalid multipart boundary '{0}'")]
    InvalidBoundary(String),
    #[error("multipart body does not contain the boundary delimiter")]
    MissingDelimiter,
    #[error("missing Content-Disposition header in part")]
    MissingContentDisposition,
    #[error("invalid Content-Disposition header: {0}")]
    InvalidContentDisposition(String),
    #[error("invalid part headers: {0}")]
    InvalidPartHeaders(String),
    #[error("unexpected end of multipart data")]
    UnexpectedEof,
    #[error("invalid multipart format: {0}")]
    InvalidFormat(&'static str),
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part<'a> {
    /// The `name` parameter of the Content-Disposition header.
    pub name: String,
    /// The `filename` parameter of the Content-Disposition header, if present.
    pub filename: Option<String>,
    /// The Content-Type header of the part, if present.
    pub content_type: Option<String>,
    /// The raw content of the part.
    pub data: &'a [u8],
}

/// Extracts the boundary from a `multipart/form-data` content type.
pub fn parse_boundary(content_type: &str) -> Result<String, Error> {
    let mut params = content_type.split(';');
    let mime = params.next().unwrap_or_default().trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return Err(Error::NotMultipart(content_type.to_string()));
    }

    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };

        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim();
            let boundary = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);

            // RFC 2046: 1 to 70 characters, must not end with a space.
            if boundary.is_empty() || boundary.len() > 70 || boundary.ends_with(' ') {
                return Err(Error::InvalidBoundary(boundary.to_string()));
            }

            return Ok(boundary.to_string());
        }
    }

    Err(Error::MissingBoundary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Parts,
    Done,
}

/// Reads the parts of a buffered multipart body in arrival order.
#[derive(Debug)]
pub struct MultipartReader<'a> {
    body: &'a [u8],
    delimiter: Vec<u8>,
    close_delimiter: Vec<u8>,
    pos: usize,
    state: State,
}

impl<'a> MultipartReader<'a> {
    pub fn new(body: &'a [u8], boundary: &str) -> Self {
        let delimiter = format!("--{}", boundary).into_bytes();
        let mut close_delimiter = b"\r\n".to_vec();
        close_delimiter.extend_from_slice(&delimiter);

        Self {
            body,
            delimiter,
            close_delimiter,
            pos: 0,
            state: State::Preamble,
        }
    }

    /// Returns the next part, or `None` once the closing delimiter has been read.
    pub fn next_part(&mut self) -> Result<Option<Part<'a>>, Error> {
        match self.state {
            State::Done => return Ok(None),
            State::Preamble => {
                let start = find(self.body, &self.delimiter, 0).ok_or(Error::MissingDelimiter)?;
                self.pos = start + self.delimiter.len();
                self.state = State::Parts;
            }
            State::Parts => {}
        }

        // `pos` points right behind a delimiter.
        if self.body[self.pos..].starts_with(b"--") {
            self.state = State::Done;
            return Ok(None);
        }

        let mut pos = self.pos;
        while pos < self.body.len() && (self.body[pos] == b' ' || self.body[pos] == b'\t') {
            pos += 1;
        }

        if pos >= self.body.len() {
            return Err(Error::UnexpectedEof);
        }

        if !self.body[pos..].starts_with(b"\r\n") {
            return Err(Error::InvalidFormat("expected CRLF after boundary"));
        }
        pos += 2;

        let (headers, data_start) = if self.body[pos..].starts_with(b"\r\n") {
            (Vec::new(), pos + 2)
        } else {
            let header_end = find(self.body, b"\r\n\r\n", pos).ok_or(Error::UnexpectedEof)?;
            (parse_headers(&self.body[pos..header_end])?, header_end + 4)
        };

        let data_end =
            find(self.body, &self.close_delimiter, data_start).ok_or(Error::UnexpectedEof)?;
        self.pos = data_end + self.close_delimiter.len();

        let disposition = headers
            .iter()
            .find(|(k, _)| k == "content-disposition")
            .map(|(_, v)| v.as_str())
            .ok_or(Error::MissingContentDisposition)?;
        let (name, filename) = parse_content_disposition(disposition)?;

        let content_type = headers
            .iter()
            .find(|(k, _)| k == "content-type")
            .map(|(_, v)| v.clone());

        Ok(Some(Part {
            name,
            filename,
            content_type,
            data: &self.body[data_start..data_end],
        }))
    }
}

impl<'a> Iterator for MultipartReader<'a> {
    type Item = Result<Part<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_part() {
            Ok(part) => part.map(Ok),
            Err(err) => {
                self.state = State::Done;
                Some(Err(err))
            }
        }
    }
}

fn find(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if start > haystack.len() || needle.is_empty() {
        return None;
    }

    haystack[start..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| idx + start)
}

fn parse_headers(raw: &[u8]) -> Result<Vec<(String, String)>, Error> {
    let text =
        std::str::from_utf8(raw).map_err(|err| Error::InvalidPartHeaders(err.to_string()))?;

    text.split("\r\n")
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::InvalidPartHeaders(format!("malformed line '{}'", line)))?;
            Ok((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Parses `form-data; name="file0"; filename="cat.png"` into its name and filename.
fn parse_content_disposition(value: &str) -> Result<(String, Option<String>), Error> {
    let mut segments = split_params(value).into_iter();

    let disposition = segments.next().unwrap_or_default();
    if !disposition.trim().eq_ignore_ascii_case("form-data") {
        return Err(Error::InvalidContentDisposition(value.to_string()));
    }

    let mut name = None;
    let mut filename = None;

    for segment in segments {
        let Some((key, raw)) = segment.split_once('=') else {
            continue;
        };

        let parsed = unquote(raw.trim());
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(parsed),
            "filename" => filename = Some(parsed),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| Error::InvalidContentDisposition(value.to_string()))?;
    Ok((name, filename))
}

// Splits on ';' outside of quoted strings.
fn split_params(value: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }

        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            ';' if !in_quotes => segments.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }

    segments.push(current);
    segments
}

fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
