// Authenticated controller session
//
// Token login/logout, request dispatch with bounded retry, one-shot
// re-authentication on 401, and dry-run suppression of mutating calls.
// The token is the only mutable state here and only `authenticate` and
// `invalidate` write it.

use std::error::Error as StdError;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::credentials::{CredentialSource, Credentials, NoPrompt};
use crate::error::Error;
use crate::request::{ApiRequest, ApiResponse, decode_body};
use crate::transport::{RetryCounts, RetryKind, RetryPolicy, TransportConfig, is_idempotent};

/// Header carrying the session token on every authenticated call.
pub const TOKEN_HEADER: &str = "Dcnm-Token";

/// Token lifetime requested at login, in milliseconds.
const LOGIN_EXPIRATION_MS: u64 = 1_000_000_000;

/// Login statuses that mean "these credentials are wrong".
const LOGIN_REJECTED: [u16; 2] = [401, 500];

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    authenticated: bool,
}

enum Auth<'a> {
    Token(&'a str),
    Basic(&'a Credentials),
}

/// One HTTP exchange as seen by the retry loop.
struct Call<'a> {
    method: &'a Method,
    url: Url,
    query: &'a [(String, String)],
    body: Option<&'a Value>,
    timeout: Duration,
    auth: Auth<'a>,
}

enum LogonOutcome {
    Token(String),
    Rejected(String),
}

/// Authenticated HTTP session against one controller.
///
/// Construct once in the process entry point and pass `&Session` down.
/// All methods take `&self`; calls are expected to be awaited one at a time.
pub struct Session {
    http: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
    read_timeout: Duration,
    dry_run: bool,
    login_attempts: u32,
    auth: RwLock<AuthState>,
    credentials: Mutex<Option<Credentials>>,
    prompt: Box<dyn CredentialSource>,
}

impl Session {
    /// Create a session for the controller at `base_url` (e.g.
    /// `https://10.0.0.5:443`). REST paths are resolved under `<base_url>/rest`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url)
            .with_retry(transport.retry.clone())
            .with_read_timeout(transport.read_timeout))
    }

    /// Create a session around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            retry: RetryPolicy::default(),
            read_timeout: TransportConfig::default().read_timeout,
            dry_run: false,
            login_attempts: 3,
            auth: RwLock::new(AuthState::default()),
            credentials: Mutex::new(None),
            prompt: Box::new(NoPrompt),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Suppress every non-read call, answering it with a synthetic 200.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Bound on login attempts when the controller rejects credentials.
    pub fn with_login_attempts(mut self, attempts: u32) -> Self {
        self.login_attempts = attempts.max(1);
        self
    }

    /// Where to get new credentials after a rejection.
    pub fn with_credential_source(mut self, source: impl CredentialSource + 'static) -> Self {
        self.prompt = Box::new(source);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .authenticated
    }

    // ── Login / logout ──────────────────────────────────────────────

    /// Log in with `username`/`password` and store the returned token.
    ///
    /// A rejected login clears the stored credentials and asks the
    /// configured [`CredentialSource`] for new ones, up to the login
    /// attempt bound.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), Error> {
        self.store_credentials(Some(Credentials::new(username, password.clone())));
        self.invalidate();
        self.authenticate().await
    }

    /// End the session. Token and authenticated flag are cleared even when
    /// the logout call itself fails.
    pub async fn logout(&self) -> Result<(), Error> {
        let Some(token) = self.token() else {
            debug!("logout: no active session");
            return Ok(());
        };

        let result = self.post_logout(&token).await;
        self.invalidate();
        debug!("logout complete");
        result
    }

    async fn post_logout(&self, token: &str) -> Result<(), Error> {
        let url = self.rest_url("/logout")?;
        debug!("logging out at {}", url);
        let (status, text) = self
            .send(Call {
                method: &Method::POST,
                url,
                query: &[],
                body: None,
                timeout: self.read_timeout,
                auth: Auth::Token(token),
            })
            .await?;

        if (200..300).contains(&status) || status == 401 {
            return Ok(());
        }
        Err(Error::ServerResponse {
            status,
            method: Method::POST.to_string(),
            path: "/logout".into(),
            message: match status {
                400 => "Invalid value supplied for Dcnm-Token".into(),
                500 => "Invalid token. Failed to perform logout.".into(),
                _ => format!("RETURN_CODE: {status}"),
            },
            body: decode_body(&text),
        })
    }

    async fn authenticate(&self) -> Result<(), Error> {
        let mut last_reason = String::from("no login attempted");

        for attempt in 1..=self.login_attempts {
            let creds = if let Some(creds) = self.stored_credentials() {
                creds
            } else {
                let creds = self.prompt.credentials(attempt)?;
                self.store_credentials(Some(creds.clone()));
                creds
            };

            debug!(attempt, username = %creds.username, "logging in");
            match self.post_logon(&creds).await? {
                LogonOutcome::Token(token) => {
                    self.set_token(token);
                    info!(username = %creds.username, "login successful");
                    return Ok(());
                }
                LogonOutcome::Rejected(reason) => {
                    warn!(attempt, username = %creds.username, "controller rejected credentials");
                    self.store_credentials(None);
                    last_reason = reason;
                }
            }
        }

        self.invalidate();
        Err(Error::Authentication {
            message: format!(
                "login rejected after {} attempt(s): {last_reason}",
                self.login_attempts
            ),
        })
    }

    async fn post_logon(&self, creds: &Credentials) -> Result<LogonOutcome, Error> {
        let url = self.rest_url("/logon")?;
        let body = json!({ "expirationTime": LOGIN_EXPIRATION_MS });
        let (status, text) = self
            .send(Call {
                method: &Method::POST,
                url,
                query: &[],
                body: Some(&body),
                timeout: self.read_timeout,
                auth: Auth::Basic(creds),
            })
            .await?;

        if LOGIN_REJECTED.contains(&status) {
            return Ok(LogonOutcome::Rejected(
                "Invalid credentials. Failed to perform logon.".into(),
            ));
        }

        let body = decode_body(&text);
        if !(200..300).contains(&status) {
            return Err(Error::ServerResponse {
                status,
                method: Method::POST.to_string(),
                path: "/logon".into(),
                message: if status == 400 {
                    "Invalid value supplied for expiration time".into()
                } else {
                    format!("RETURN_CODE: {status}")
                },
                body,
            });
        }

        body.get(TOKEN_HEADER)
            .and_then(Value::as_str)
            .map(|token| LogonOutcome::Token(token.to_owned()))
            .ok_or_else(|| Error::Authentication {
                message: format!("login response carried no {TOKEN_HEADER} field"),
            })
    }

    async fn reauthenticate(&self) -> Result<(), Error> {
        warn!(controller = %self.base_url, "token rejected, logging in again");
        self.invalidate();
        self.authenticate().await
    }

    // ── Requests ────────────────────────────────────────────────────

    /// Send one request under the session token.
    ///
    /// A 401 answer triggers exactly one re-login and one replay; a second
    /// 401 is reported as [`Error::Connection`]. In dry-run mode any method
    /// other than GET/HEAD/OPTIONS returns a synthetic 200 without touching
    /// the network.
    pub async fn request(&self, req: ApiRequest) -> Result<ApiResponse, Error> {
        validate_path(&req.path)?;

        if self.dry_run && !is_read_only(&req.method) {
            info!(method = %req.method, path = %req.path, "dry run: request suppressed");
            return Ok(ApiResponse::synthetic_ok(req.method, req.path));
        }

        let token = self.require_token()?;
        match self.send_request(&req, &token).await {
            Err(Error::Unauthorized { .. }) => {}
            other => return other,
        }

        self.reauthenticate().await?;
        let token = self.require_token()?;
        match self.send_request(&req, &token).await {
            Err(Error::Unauthorized { method, path }) => Err(Error::Connection {
                method,
                url: path,
                reason: "still unauthorized after re-authentication".into(),
            }),
            other => other,
        }
    }

    /// Check that the controller root answers under the current token.
    pub async fn probe(&self) -> Result<(), Error> {
        let token = self.require_token()?;
        match self.head_root(&token).await {
            Err(Error::Unauthorized { .. }) => {
                self.reauthenticate().await?;
                let token = self.require_token()?;
                self.head_root(&token).await
            }
            other => other,
        }
    }

    async fn head_root(&self, token: &str) -> Result<(), Error> {
        let (status, text) = self
            .send(Call {
                method: &Method::HEAD,
                url: self.base_url.clone(),
                query: &[],
                body: None,
                timeout: self.read_timeout,
                auth: Auth::Token(token),
            })
            .await?;
        match status {
            401 => Err(Error::Unauthorized {
                method: Method::HEAD.to_string(),
                path: "/".into(),
            }),
            s if s < 400 => Ok(()),
            s => Err(Error::ServerResponse {
                status: s,
                method: Method::HEAD.to_string(),
                path: "/".into(),
                message: format!("RETURN_CODE: {s}"),
                body: decode_body(&text),
            }),
        }
    }

    async fn send_request(&self, req: &ApiRequest, token: &str) -> Result<ApiResponse, Error> {
        let url = self.rest_url(&req.path)?;
        let (status, text) = self
            .send(Call {
                method: &req.method,
                url,
                query: &req.query,
                body: req.body.as_ref(),
                timeout: req.timeout.unwrap_or(self.read_timeout),
                auth: Auth::Token(token),
            })
            .await?;
        classify(req, status, &text)
    }

    /// Run one exchange under the retry policy.
    ///
    /// Returns the final status and body text; status classification is
    /// the caller's job.
    async fn send(&self, call: Call<'_>) -> Result<(u16, String), Error> {
        let idempotent = is_idempotent(call.method);
        let mut counts = RetryCounts::default();

        loop {
            debug!("{} {}", call.method, call.url);
            let failure = match self.build(&call).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if idempotent
                        && self.retry.retries_status(status)
                        && counts.take(&self.retry, RetryKind::Status)
                    {
                        let delay = self.retry.backoff(counts.total);
                        warn!(status, attempt = counts.total, ?delay, url = %call.url, "retryable status");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    match resp.text().await {
                        Ok(text) => {
                            debug!(status, bytes = text.len(), "response");
                            return Ok((status, text));
                        }
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            let kind = if failure.is_connect() {
                RetryKind::Connect
            } else {
                RetryKind::Read
            };
            let retryable = kind == RetryKind::Connect || idempotent;
            if !retryable || !counts.take(&self.retry, kind) {
                return Err(Error::Connection {
                    method: call.method.to_string(),
                    url: call.url.to_string(),
                    reason: error_chain(&failure),
                });
            }

            let delay = self.retry.backoff(counts.total);
            warn!(attempt = counts.total, ?delay, url = %call.url, error = %failure, "transport failure, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    fn build(&self, call: &Call<'_>) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(call.method.clone(), call.url.clone())
            .timeout(call.timeout);
        if !call.query.is_empty() {
            builder = builder.query(call.query);
        }
        if let Some(body) = call.body {
            builder = builder.json(body);
        }
        match call.auth {
            Auth::Token(token) => builder.header(TOKEN_HEADER, token),
            Auth::Basic(creds) => {
                builder.basic_auth(&creds.username, Some(creds.password.expose_secret()))
            }
        }
    }

    fn rest_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/rest{path}"))?)
    }

    // ── Token state ─────────────────────────────────────────────────

    fn token(&self) -> Option<String> {
        self.auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    fn require_token(&self) -> Result<String, Error> {
        let state = self.auth.read().unwrap_or_else(PoisonError::into_inner);
        match (&state.token, state.authenticated) {
            (Some(token), true) => Ok(token.clone()),
            _ => Err(Error::Authentication {
                message: "not logged in: call login() before sending requests".into(),
            }),
        }
    }

    fn set_token(&self, token: String) {
        debug!("storing session token");
        let mut state = self.auth.write().unwrap_or_else(PoisonError::into_inner);
        state.token = Some(token);
        state.authenticated = true;
    }

    fn invalidate(&self) {
        let mut state = self.auth.write().unwrap_or_else(PoisonError::into_inner);
        state.token = None;
        state.authenticated = false;
    }

    fn stored_credentials(&self) -> Option<Credentials> {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_credentials(&self, creds: Option<Credentials>) {
        *self.credentials.lock().unwrap_or_else(PoisonError::into_inner) = creds;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("dry_run", &self.dry_run)
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn validate_path(path: &str) -> Result<(), Error> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(Error::Parameter(format!(
            "request path must start with '/': {path:?}"
        )))
    }
}

fn is_read_only(method: &Method) -> bool {
    [Method::GET, Method::HEAD, Method::OPTIONS].contains(method)
}

fn classify(req: &ApiRequest, status: u16, text: &str) -> Result<ApiResponse, Error> {
    let body = decode_body(text);

    if (200..300).contains(&status) {
        return Ok(ApiResponse {
            status,
            method: req.method.clone(),
            path: req.path.clone(),
            message: "OK".into(),
            body,
        });
    }

    if status == 401 {
        return Err(Error::Unauthorized {
            method: req.method.to_string(),
            path: req.path.clone(),
        });
    }

    let message = req
        .expected_errors
        .get(&status)
        .cloned()
        .unwrap_or_else(|| format!("RETURN_CODE: {status}"));
    Err(Error::ServerResponse {
        status,
        method: req.method.to_string(),
        path: req.path.clone(),
        message,
        body,
    })
}

/// Flatten a reqwest error and its sources into one line.
fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = StdError::source(err);
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn path_must_be_rooted() {
        assert!(validate_path("/inventory/switches").is_ok());
        assert!(matches!(
            validate_path("inventory/switches"),
            Err(Error::Parameter(_))
        ));
    }

    #[test]
    fn expected_error_message_wins() {
        let req = ApiRequest::post("/control/fabrics/f1/config-deploy/SN1")
            .expect_error(500, "Invalid payload or any other internal server error");
        let err = classify(&req, 500, "{}").unwrap_err();
        match err {
            Error::ServerResponse {
                status, message, ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Invalid payload or any other internal server error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn generic_error_message() {
        let req = ApiRequest::get("/interface");
        let err = classify(&req, 404, "not here").unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("RETURN_CODE: 404"));
    }

    #[test]
    fn unauthorized_is_classified() {
        let req = ApiRequest::get("/interface");
        assert!(matches!(
            classify(&req, 401, ""),
            Err(Error::Unauthorized { .. })
        ));
    }

    #[test]
    fn dry_run_allows_reads_only() {
        assert!(is_read_only(&Method::GET));
        assert!(!is_read_only(&Method::PUT));
        assert!(!is_read_only(&Method::DELETE));
    }
}
