//! Inbound request boundary: decode and validate.
//!
//! Transport is an external collaborator; what arrives here is already a
//! method/path/headers/body tuple. Decoding validates it into the typed
//! form the pipeline works with.

use std::str::FromStr;

use crate::error::CoreError;

/// Request methods the core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
        }
    }
}

impl FromStr for Method {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "HEAD" => Ok(Method::Head),
            other => Err(CoreError::BadRequest(format!("unknown method: {}", other))),
        }
    }
}

/// Undecoded inbound request as handed over by the transport.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawRequest {
    /// Convenience constructor for tests and the service self-check.
    pub fn get(path: &str) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Decoded, validated request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Decode stage: validate the raw request into its typed form.
pub fn decode(raw: RawRequest) -> Result<Request, CoreError> {
    let method = raw.method.parse::<Method>()?;
    if !raw.path.starts_with('/') {
        return Err(CoreError::BadRequest(format!(
            "path must be absolute: {}",
            raw.path
        )));
    }
    if raw.headers.iter().any(|(name, _)| name.is_empty()) {
        return Err(CoreError::BadRequest("empty header name".into()));
    }
    Ok(Request {
        method,
        path: raw.path,
        headers: raw.headers,
        body: raw.body,
    })
}
