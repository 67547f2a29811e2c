//! Authenticated request gateway.
//!
//! Every call to the TimeGen API goes through [`AuthGateway`]. It attaches the
//! current access token, and when the server answers `401` it performs one
//! token renewal and retries the original request once. Callers never see
//! credentials.
//!
//! Cookies live in a [`CookieJar`] that is saved after every response, so a
//! cookie set by one command is sent by the next.

use std::sync::{Mutex as StdMutex, PoisonError};

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use timegen_types::AuthTokens;
use tokio::sync::Mutex;

use crate::config::{ApiBase, RenewalPolicy, USER_AGENT};
use crate::session::{CookieJar, SessionHandle};

/// Renewal endpoint, relative to the API base.
pub const REFRESH_PATH: &str = "auth/refresh";

/// Env var that makes the gateway refuse the production deployment (set by tests).
pub const BLOCK_REAL_API_ENV: &str = "TIMEGEN_BLOCK_REAL_API";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network failure, or a response body that could not be read.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid request path '{path}': {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error(
        "TIMEGEN_BLOCK_REAL_API=1 but the API base is the production deployment ({0}); point TIMEGEN_API_BASE at a mock server"
    )]
    BlockedRealApi(String),
}

/// A logical request: method, path relative to the API base, optional JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
    headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Sets a JSON body (sent with `Content-Type: application/json`).
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The server's `error` or `message` field, if the body is a JSON object carrying one.
    pub fn error_message(&self) -> Option<String> {
        let value: Value = serde_json::from_slice(&self.body).ok()?;
        ["error", "message"]
            .iter()
            .filter_map(|key| value.get(key).and_then(Value::as_str))
            .map(str::trim)
            .find(|msg| !msg.is_empty())
            .map(ToString::to_string)
    }
}

/// Where a logical call is in its lifecycle. Only `First` may trigger a renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retried,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Renewal {
    Renewed,
    Failed,
    /// No refresh token to renew with.
    Unavailable,
}

/// Outcome of the most recent coalesced renewal.
#[derive(Debug, Default)]
struct RenewalRecord {
    generation: u64,
    renewed: bool,
}

/// HTTP gateway that owns credential attachment and one-shot renewal.
pub struct AuthGateway {
    http: reqwest::Client,
    base: ApiBase,
    session: SessionHandle,
    cookies: CookieJar,
    policy: RenewalPolicy,
    /// Last published renewal generation. Guards the generation together with
    /// the access token: both are read, and both are replaced, under this lock.
    published: StdMutex<u64>,
    renewal: Mutex<RenewalRecord>,
}

impl AuthGateway {
    /// Creates a gateway with the default User-Agent and renewal policy and
    /// an in-memory cookie jar.
    pub fn new(base: ApiBase, session: SessionHandle) -> Result<Self, GatewayError> {
        Self::with_cookie_jar(base, session, USER_AGENT, CookieJar::in_memory())
    }

    /// Creates a gateway whose HTTP client reads and writes `cookies`.
    pub fn with_cookie_jar(
        base: ApiBase,
        session: SessionHandle,
        user_agent: &str,
        cookies: CookieJar,
    ) -> Result<Self, GatewayError> {
        guard_real_api(&base, std::env::var(BLOCK_REAL_API_ENV).ok().as_deref())?;

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_provider(cookies.provider())
            .build()
            .map_err(GatewayError::Client)?;

        Ok(Self {
            http,
            base,
            session,
            cookies,
            policy: RenewalPolicy::default(),
            published: StdMutex::new(0),
            renewal: Mutex::new(RenewalRecord::default()),
        })
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RenewalPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    ///
    /// The gateway's cookie jar is not attached to `client`.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    /// Issues `request` with the current credential, renewing once on `401`.
    ///
    /// Returns the first response unless it was a `401` that a successful
    /// renewal answered, in which case the retry's response is returned
    /// whatever its status. A failed renewal yields the original `401`.
    ///
    /// # Errors
    /// Returns [`GatewayError::Transport`] if the first request or the retry
    /// cannot be completed. Renewal transport failures are not errors.
    pub async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, GatewayError> {
        let mut attempt = Attempt::First;
        loop {
            let (observed, token) = self.credentials();
            let response = self.send(request, token.as_deref()).await?;

            if attempt == Attempt::Retried || !response.is_unauthorized() {
                return Ok(response);
            }

            match self.renew(observed).await {
                Renewal::Renewed => {
                    tracing::debug!(path = %request.path, "Retrying with renewed credential");
                    attempt = Attempt::Retried;
                }
                Renewal::Failed | Renewal::Unavailable => return Ok(response),
            }
        }
    }

    /// Issues `request` without credentials and without renewal.
    ///
    /// Used for login, registration and password reset.
    ///
    /// # Errors
    /// Returns [`GatewayError::Transport`] on network failure.
    pub async fn call_anonymous(&self, request: &ApiRequest) -> Result<ApiResponse, GatewayError> {
        self.send(request, None).await
    }

    /// The renewal generation and the access token that belongs to it.
    fn credentials(&self) -> (u64, Option<String>) {
        let published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        (*published, self.session.access_token())
    }

    async fn renew(&self, observed: u64) -> Renewal {
        if self.session.refresh_token().is_none() {
            tracing::debug!("Unauthorized and no refresh token; not renewing");
            return Renewal::Unavailable;
        }

        match self.policy {
            RenewalPolicy::Independent => {
                let tokens = self.refresh().await;
                self.publish(tokens, None)
            }
            RenewalPolicy::Coalesce => {
                let mut record = self.renewal.lock().await;
                if record.generation != observed {
                    // a renewal finished after this request went out; reuse its outcome
                    tracing::debug!(renewed = record.renewed, "Joining concurrent renewal");
                    return if record.renewed {
                        Renewal::Renewed
                    } else {
                        Renewal::Failed
                    };
                }

                let tokens = self.refresh().await;
                record.generation += 1;
                record.renewed = tokens.is_some();
                self.publish(tokens, Some(record.generation))
            }
        }
    }

    /// Sends one renewal request; `None` when it fails for any reason.
    async fn refresh(&self) -> Option<AuthTokens> {
        let refresh_token = self.session.refresh_token()?;

        let request = ApiRequest::post(REFRESH_PATH)
            .json(serde_json::json!({ "refreshToken": refresh_token }));
        let response = match self.send(&request, None).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Token renewal request failed");
                return None;
            }
        };

        if !response.is_success() {
            tracing::warn!(
                status = response.status().as_u16(),
                "Token renewal rejected"
            );
            return None;
        }

        match response.json() {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                tracing::warn!(error = %e, "Token renewal returned an unreadable body");
                None
            }
        }
    }

    /// Rotates the session to `tokens` and publishes `generation` in one step.
    ///
    /// A request that reads the new generation always reads the new token.
    fn publish(&self, tokens: Option<AuthTokens>, generation: Option<u64>) -> Renewal {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = match tokens {
            Some(tokens) => {
                // the server has already rotated the refresh token, so keep going
                // even if the new pair cannot be written to disk
                if let Err(e) = self
                    .session
                    .rotate(tokens.access_token, tokens.refresh_token)
                {
                    tracing::warn!(error = %format!("{e:#}"), "Renewed credentials were not persisted");
                }
                tracing::info!("Access token renewed");
                Renewal::Renewed
            }
            None => Renewal::Failed,
        };
        if let Some(generation) = generation {
            *published = generation;
        }
        outcome
    }

    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, GatewayError> {
        let url = self
            .base
            .endpoint(&request.path)
            .map_err(|source| GatewayError::InvalidUrl {
                path: request.path.clone(),
                source,
            })?;

        let mut builder = self.http.request(request.method.clone(), url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(
            method = %request.method,
            url = %url,
            authenticated = bearer.is_some(),
            "Sending request"
        );

        let transport = |source| GatewayError::Transport {
            url: url.to_string(),
            source,
        };
        let response = builder.send().await.map_err(transport)?;
        if let Err(e) = self.cookies.save() {
            tracing::warn!(error = %format!("{e:#}"), "Cookies were not persisted");
        }
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?.to_vec();

        tracing::debug!(status = status.as_u16(), bytes = body.len(), "Received response");

        Ok(ApiResponse { status, body })
    }
}

impl std::fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGateway")
            .field("base", &self.base.as_str())
            .field("policy", &self.policy)
            .field("session", &self.session)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

/// Refuses the production deployment when `block` is `"1"`.
fn guard_real_api(base: &ApiBase, block: Option<&str>) -> Result<(), GatewayError> {
    if block == Some("1") && base.is_production() {
        return Err(GatewayError::BlockedRealApi(base.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use timegen_types::UserIdentity;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::session::{CookieJar, MemorySessionStore, Session, SessionStore};

    const DATA_PATH: &str = "/api/timetable/generated";
    const REFRESH: &str = "/api/auth/refresh";

    fn session(access: Option<&str>, refresh: Option<&str>) -> Session {
        Session {
            user: Some(UserIdentity {
                id: "u1".into(),
                email: "ada@example.com".into(),
                name: Some("Ada".into()),
                role: None,
            }),
            access_token: access.map(str::to_string),
            refresh_token: refresh.map(str::to_string),
        }
    }

    fn gateway(
        server: &MockServer,
        initial: Session,
        policy: RenewalPolicy,
    ) -> (AuthGateway, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new(initial));
        let handle = SessionHandle::bootstrap(Arc::clone(&store) as Arc<dyn SessionStore>);
        let base = ApiBase::parse(&server.uri()).unwrap();
        let gateway = AuthGateway::new(base, handle).unwrap().with_policy(policy);
        (gateway, store)
    }

    fn renewed_tokens() -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({ "accessToken": "a2", "refreshToken": "r2" }))
    }

    async fn mount_expired_data_endpoint(server: &MockServer, stale_hits: u64, fresh_hits: u64) {
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "expired"})))
            .expect(stale_hits)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .and(header("authorization", "Bearer a2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "t1"}]})))
            .expect(fresh_hits)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_attaches_current_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let response = gateway.call(&ApiRequest::get("timetable/generated")).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_no_bearer_without_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, session(None, None), RenewalPolicy::Coalesce);
        gateway.call(&ApiRequest::get("/timetable/generated")).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_renews_once_and_retries_with_new_token() {
        let server = MockServer::start().await;
        mount_expired_data_endpoint(&server, 1, 1).await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .and(body_json(json!({ "refreshToken": "r1" })))
            .respond_with(renewed_tokens())
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, store) =
            gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let response = gateway.call(&ApiRequest::get("timetable/generated")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().unwrap();
        assert_eq!(body["data"][0]["id"], "t1");

        let saved = store.snapshot();
        assert_eq!(saved.access_token.as_deref(), Some("a2"));
        assert_eq!(saved.refresh_token.as_deref(), Some("r2"));
        assert_eq!(saved.user.map(|u| u.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn test_unauthorized_without_refresh_token_is_returned_as_is() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "expired"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(renewed_tokens())
            .expect(0)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, session(Some("a1"), None), RenewalPolicy::Coalesce);
        let response = gateway.call(&ApiRequest::get("timetable/generated")).await.unwrap();

        assert!(response.is_unauthorized());
        assert_eq!(response.error_message().as_deref(), Some("expired"));
    }

    #[tokio::test]
    async fn test_failed_renewal_returns_original_and_keeps_credentials() {
        let server = MockServer::start().await;
        mount_expired_data_endpoint(&server, 1, 0).await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "revoked"})))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, store) =
            gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let response = gateway.call(&ApiRequest::get("timetable/generated")).await.unwrap();

        assert!(response.is_unauthorized());
        assert_eq!(response.error_message().as_deref(), Some("expired"));
        let saved = store.snapshot();
        assert_eq!(saved.access_token.as_deref(), Some("a1"));
        assert_eq!(saved.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_unreadable_renewal_body_counts_as_failure() {
        let server = MockServer::start().await;
        mount_expired_data_endpoint(&server, 1, 0).await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, store) =
            gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Independent);
        let response = gateway.call(&ApiRequest::get("timetable/generated")).await.unwrap();

        assert!(response.is_unauthorized());
        assert_eq!(store.snapshot().access_token.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_retry_result_is_final_even_if_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(renewed_tokens())
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let response = gateway.call(&ApiRequest::get("timetable/generated")).await.unwrap();

        assert!(response.is_unauthorized());
        let requests = server.received_requests().await.unwrap();
        assert_eq!(
            requests[2].headers.get("authorization").unwrap(),
            "Bearer a2"
        );
    }

    #[tokio::test]
    async fn test_other_errors_pass_through_without_renewal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(renewed_tokens())
            .expect(0)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let response = gateway.call(&ApiRequest::get("timetable/generated")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.error_message().as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_anonymous_call_never_renews() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(renewed_tokens())
            .expect(0)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let response = gateway
            .call_anonymous(&ApiRequest::post("auth/login").json(json!({"email": "x"})))
            .await
            .unwrap();

        assert!(response.is_unauthorized());
        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_cookies_are_sent_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/first"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc; Path=/"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/second"))
            .and(header("cookie", "sid=abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, session(None, None), RenewalPolicy::Coalesce);
        gateway.call(&ApiRequest::get("first")).await.unwrap();
        let response = gateway.call(&ApiRequest::get("second")).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_cookie_jar_carries_over_to_next_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/first"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=abc; Path=/"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/second"))
            .and(header("cookie", "sid=abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let jar_path = dir.path().join("cookies.json");
        let connect = || {
            AuthGateway::with_cookie_jar(
                ApiBase::parse(&server.uri()).unwrap(),
                SessionHandle::in_memory(session(None, None)),
                USER_AGENT,
                CookieJar::load(&jar_path),
            )
            .unwrap()
        };

        connect().call(&ApiRequest::get("first")).await.unwrap();
        assert!(CookieJar::load(&jar_path).contains("sid"));

        let response = connect().call(&ApiRequest::get("second")).await.unwrap();
        assert!(response.is_success());
    }

    /// A renewal that times out is a failed renewal, not a transport error.
    #[tokio::test]
    async fn test_renewal_timeout_returns_original_and_keeps_credentials() {
        let server = MockServer::start().await;
        mount_expired_data_endpoint(&server, 1, 0).await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(renewed_tokens().set_delay(Duration::from_secs(2)))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, store) =
            gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let gateway = gateway.with_http_client(
            reqwest::Client::builder()
                .timeout(Duration::from_millis(300))
                .build()
                .unwrap(),
        );
        let response = gateway.call(&ApiRequest::get("timetable/generated")).await.unwrap();

        assert!(response.is_unauthorized());
        assert_eq!(response.error_message().as_deref(), Some("expired"));
        let saved = store.snapshot();
        assert_eq!(saved.access_token.as_deref(), Some("a1"));
        assert_eq!(saved.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_published_generation_travels_with_token() {
        let server = MockServer::start().await;
        let (gateway, _) = gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        assert_eq!(gateway.credentials(), (0, Some("a1".to_string())));

        let tokens = AuthTokens {
            user: None,
            access_token: "a2".into(),
            refresh_token: "r2".into(),
        };
        assert_eq!(gateway.publish(Some(tokens), Some(1)), Renewal::Renewed);
        assert_eq!(gateway.credentials(), (1, Some("a2".to_string())));

        // a failed renewal moves the generation but not the token
        assert_eq!(gateway.publish(None, Some(2)), Renewal::Failed);
        assert_eq!(gateway.credentials(), (2, Some("a2".to_string())));
    }

    /// A rejection of an already renewed token starts a new renewal.
    #[tokio::test]
    async fn test_second_expiry_renews_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .and(header("authorization", "Bearer a2"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .and(header("authorization", "Bearer a2"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(DATA_PATH))
            .and(header("authorization", "Bearer a3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .and(body_json(json!({ "refreshToken": "r1" })))
            .respond_with(renewed_tokens())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .and(body_json(json!({ "refreshToken": "r2" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "accessToken": "a3", "refreshToken": "r3" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, store) =
            gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let request = ApiRequest::get("timetable/generated");
        assert!(gateway.call(&request).await.unwrap().is_success());
        assert!(gateway.call(&request).await.unwrap().is_success());

        assert_eq!(gateway.credentials().0, 2);
        assert_eq!(store.snapshot().refresh_token.as_deref(), Some("r3"));
    }

    /// Coalesce policy: three requests rejected together share one renewal.
    #[tokio::test]
    async fn test_concurrent_failures_coalesce_into_one_renewal() {
        let server = MockServer::start().await;
        mount_expired_data_endpoint(&server, 3, 3).await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(renewed_tokens().set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let request = ApiRequest::get("timetable/generated");
        let (a, b, c) = tokio::join!(
            gateway.call(&request),
            gateway.call(&request),
            gateway.call(&request)
        );

        for response in [a, b, c] {
            assert_eq!(response.unwrap().status(), StatusCode::OK);
        }
    }

    /// Coalesce policy: waiters share a failed renewal too, instead of retrying it.
    #[tokio::test]
    async fn test_concurrent_failures_share_failed_renewal() {
        let server = MockServer::start().await;
        mount_expired_data_endpoint(&server, 2, 0).await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&server)
            .await;

        let (gateway, _) = gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Coalesce);
        let request = ApiRequest::get("timetable/generated");
        let (a, b) = tokio::join!(gateway.call(&request), gateway.call(&request));

        assert!(a.unwrap().is_unauthorized());
        assert!(b.unwrap().is_unauthorized());
    }

    /// Independent policy: each rejected request renews on its own.
    #[tokio::test]
    async fn test_independent_policy_renews_per_request() {
        let server = MockServer::start().await;
        mount_expired_data_endpoint(&server, 3, 3).await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(renewed_tokens().set_delay(Duration::from_millis(200)))
            .expect(3)
            .mount(&server)
            .await;

        let (gateway, _) =
            gateway(&server, session(Some("a1"), Some("r1")), RenewalPolicy::Independent);
        let request = ApiRequest::get("timetable/generated");
        let (a, b, c) = tokio::join!(
            gateway.call(&request),
            gateway.call(&request),
            gateway.call(&request)
        );

        for response in [a, b, c] {
            assert_eq!(response.unwrap().status(), StatusCode::OK);
        }
    }

    #[test]
    fn test_guard_real_api() {
        let prod = ApiBase::parse(crate::config::DEFAULT_API_HOST).unwrap();
        let local = ApiBase::parse("http://127.0.0.1:9").unwrap();

        assert!(matches!(
            guard_real_api(&prod, Some("1")),
            Err(GatewayError::BlockedRealApi(_))
        ));
        assert!(guard_real_api(&prod, None).is_ok());
        assert!(guard_real_api(&local, Some("1")).is_ok());
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        let response = ApiResponse {
            status: StatusCode::BAD_REQUEST,
            body: br#"{"error":"bad prompt","message":"ignored"}"#.to_vec(),
        };
        assert_eq!(response.error_message().as_deref(), Some("bad prompt"));

        let plain = ApiResponse {
            status: StatusCode::BAD_REQUEST,
            body: b"nope".to_vec(),
        };
        assert_eq!(plain.error_message(), None);
        assert_eq!(plain.text(), "nope");
    }
}
