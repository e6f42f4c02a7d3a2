// Request and response values passed through `Session::request`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

/// One call against the controller's REST root.
///
/// `path` is relative to `<controller>/rest` and must begin with `/`.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<Value>,
    pub(crate) expected_errors: BTreeMap<u16, String>,
    pub(crate) timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            expected_errors: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Describe what a given error status means for this endpoint.
    ///
    /// The message replaces the generic `RETURN_CODE: <n>` text in
    /// [`Error::ServerResponse`].
    pub fn expect_error(mut self, status: u16, message: impl Into<String>) -> Self {
        self.expected_errors.insert(status, message.into());
        self
    }

    /// Override the session's read timeout for this call only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A successful (2xx) controller answer.
///
/// Dry-run mode produces the same type with status 200 and a null body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub method: Method,
    pub path: String,
    pub message: String,
    /// Decoded JSON body. Non-JSON bodies are kept as a string value.
    pub body: Value,
}

impl ApiResponse {
    pub(crate) fn synthetic_ok(method: Method, path: String) -> Self {
        Self {
            status: 200,
            method,
            path,
            message: "OK".into(),
            body: Value::Null,
        }
    }

    /// Deserialize the body into `T`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            let body = self.body.to_string();
            let preview: String = body.chars().take(200).collect();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }

    /// Like [`data`](Self::data), but a null or empty body deserializes as `T::default()`.
    pub fn data_or_default<T: DeserializeOwned + Default>(&self) -> Result<T, Error> {
        match &self.body {
            Value::Null => Ok(T::default()),
            Value::String(s) if s.trim().is_empty() => Ok(T::default()),
            _ => self.data(),
        }
    }
}

/// Decode a response body, falling back to a string value for non-JSON text.
pub(crate) fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}
