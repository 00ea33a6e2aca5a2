//! Request descriptors
//!
//! A `RequestDescriptor` is what the caller builds. `prepare()` resolves it into
//! a `PreparedRequest`: placeholders substituted, headers validated. The
//! prepared request is a plain value, so it can be dispatched, parked in the
//! refresh queue, and dispatched again without anything from the first attempt
//! leaking into the replay except the Authorization header, which is replaced.

use std::collections::BTreeMap;
use std::str::FromStr;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::error::{Error, Result};
use crate::path;

/// Per-call behaviour flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Attach no credential and never refresh.
    pub ignore_auth: bool,
    /// Do not notify the sink on failure.
    pub silent_error: bool,
    /// Raise `Err(Error::Unauthorized)` or `Err(Error::Transport)` instead of
    /// returning a failure-shaped response.
    pub throw_error: bool,
}

/// Caller-side description of a call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the transport's base URL, or an absolute URL.
    /// May contain `:name` placeholders.
    pub url: String,
    pub path_variables: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    pub options: CallOptions,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            path_variables: BTreeMap::new(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            options: CallOptions::default(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn path_var(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.path_variables.insert(name.into(), value.to_string());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn ignore_auth(mut self) -> Self {
        self.options.ignore_auth = true;
        self
    }

    pub fn silent_error(mut self) -> Self {
        self.options.silent_error = true;
        self
    }

    pub fn throw_error(mut self) -> Self {
        self.options.throw_error = true;
        self
    }

    /// Resolve placeholders and validate headers.
    ///
    /// A caller-supplied Authorization header is dropped: the pipeline owns
    /// that header for authenticated calls, and unauthenticated calls go out
    /// without one.
    pub fn prepare(&self) -> Result<PreparedRequest> {
        let url = path::substitute(&self.url, &self.path_variables)?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_str(name)
                .map_err(|e| Error::Configuration(format!("invalid header name {name}: {e}")))?;
            if name == AUTHORIZATION {
                continue;
            }
            let value = HeaderValue::from_str(value).map_err(|e| {
                Error::Configuration(format!("invalid value for header {name}: {e}"))
            })?;
            headers.insert(name, value);
        }

        Ok(PreparedRequest {
            method: self.method.clone(),
            url,
            query: self.query.clone(),
            headers,
            body: self.body.clone(),
        })
    }
}

/// A fully resolved, replayable request.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl PreparedRequest {
    /// Set `Authorization: Bearer <access>`, replacing any previous value.
    pub fn set_bearer(&mut self, access: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {access}"))
            .map_err(|e| Error::Configuration(format!("access token is not a valid header: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Current Authorization header, if any.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    /// URL without its query string.
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }
}
