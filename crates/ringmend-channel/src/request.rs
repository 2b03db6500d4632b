//! Request and response values passed through the channel.

use std::fmt;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::{ChannelError, ChannelResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_http(self) -> http::Method {
        match self {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_http().as_str())
    }
}

/// A management API call.
///
/// `target` names the node the call is about. `None` means the entry
/// endpoint the tool was started against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    path: String,
    params: Vec<(String, String)>,
    target: Option<String>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            target: None,
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a parameter only when a value is present.
    pub fn param_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    pub fn target(mut self, endpoint: impl Into<String>) -> Self {
        self.target = Some(endpoint.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn target_endpoint(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Origin-form request target: path plus url-encoded parameters.
    pub fn path_and_query(&self) -> String {
        if self.params.is_empty() {
            return self.path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();
        format!("{}?{}", self.path, query)
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct Response {
    path: String,
    status: u16,
    body: Bytes,
}

impl Response {
    pub fn new(path: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> ChannelResult<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| ChannelError::Decode {
            path: self.path.clone(),
            message: format!("body is not UTF-8: {e}"),
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> ChannelResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ChannelError::Decode {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }
}
