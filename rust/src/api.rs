//! REST client for the estate backend.
//!
//! The bearer token is read from the credential cache at the start of every
//! call, so a login or logout takes effect on the next request without
//! rebuilding the client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::credentials::CredentialStore;
use crate::payment::{PaymentGateway, PaymentRequest, PaymentTicket, TransactionStatus};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
// Guards against a `next` link that points back at itself.
const MAX_PAGES: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("session expired or invalid credentials")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserDto {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserDto,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResidentDto {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub apartment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    results: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

/// Account and directory endpoints.
#[async_trait]
pub trait BackendApi: Send + Sync + 'static {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError>;

    /// Every resident, following pagination to the end.
    async fn list_residents(&self) -> Result<Vec<ResidentDto>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackendApi {
    client: reqwest::Client,
    base_url: String,
    credentials: CredentialStore,
}

impl HttpBackendApi {
    pub fn new(base_url: impl Into<String>, credentials: CredentialStore) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.credentials.token().ok_or(ApiError::NotSignedIn)?;
        Ok(builder.bearer_auth(token).timeout(REQUEST_TIMEOUT))
    }

    async fn fetch_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ApiError> {
        let resp = builder.send().await?;
        let resp = check_status(resp).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound,
        _ => ApiError::Http {
            status: status.as_u16(),
            body,
        },
    })
}

#[async_trait]
impl BackendApi for HttpBackendApi {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let builder = self
            .client
            .post(self.url("auth/login/"))
            .timeout(REQUEST_TIMEOUT)
            .json(&LoginRequest { username, password });
        Self::fetch_json(builder).await
    }

    async fn list_residents(&self) -> Result<Vec<ResidentDto>, ApiError> {
        let mut residents = Vec::new();
        let mut next = Some(self.url("residents/"));
        let mut pages = 0;
        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                tracing::warn!(pages, "resident pagination did not terminate; truncating");
                break;
            }
            let page: Page<ResidentDto> =
                Self::fetch_json(self.authorized(self.client.get(&url))?).await?;
            residents.extend(page.results);
            next = match page.next.filter(|n| !n.trim().is_empty()) {
                Some(link) => Some(resolve_link(&url, &link)?),
                None => None,
            };
        }
        Ok(residents)
    }
}

/// `next` links are usually absolute but may be relative to the current page.
fn resolve_link(current: &str, link: &str) -> Result<String, ApiError> {
    url::Url::parse(current)
        .and_then(|base| base.join(link.trim()))
        .map(String::from)
        .map_err(|e| ApiError::Decode(format!("bad pagination link {link}: {e}")))
}

#[async_trait]
impl PaymentGateway for HttpBackendApi {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentTicket, ApiError> {
        let builder = self.authorized(self.client.post(self.url("payments/initiate/")))?;
        Self::fetch_json(builder.json(request)).await
    }

    async fn transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionStatus, ApiError> {
        let path = format!("payments/transactions/{transaction_id}/");
        let builder = self.authorized(self.client.get(self.url(&path)))?;
        let resp: StatusResponse = Self::fetch_json(builder).await?;
        Ok(TransactionStatus::parse(&resp.status))
    }
}

/// Backend used when networking is disabled by config.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineBackend;

fn offline() -> ApiError {
    ApiError::Network("network disabled".to_string())
}

#[async_trait]
impl BackendApi for OfflineBackend {
    async fn login(&self, _username: &str, _password: &str) -> Result<LoginResponse, ApiError> {
        Err(offline())
    }

    async fn list_residents(&self) -> Result<Vec<ResidentDto>, ApiError> {
        Err(offline())
    }
}

#[async_trait]
impl PaymentGateway for OfflineBackend {
    async fn initiate(&self, _request: &PaymentRequest) -> Result<PaymentTicket, ApiError> {
        Err(offline())
    }

    async fn transaction_status(
        &self,
        _transaction_id: &str,
    ) -> Result<TransactionStatus, ApiError> {
        Err(offline())
    }
}

/// Ids arrive as JSON numbers or strings depending on the endpoint.
pub(crate) fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use estate_test_utils::{spawn_one_shot_server, spawn_scripted_server, MockResponse};

    use super::*;
    use crate::credentials::Credentials;

    fn signed_in(dir: &tempfile::TempDir) -> CredentialStore {
        let store = CredentialStore::new(dir.path());
        store
            .save(&Credentials {
                token: "tok-1".into(),
                user_id: "7".into(),
                display_name: "Admin".into(),
                role: "admin".into(),
            })
            .unwrap();
        store
    }

    #[tokio::test]
    async fn login_posts_credentials_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let (base_url, rx) = spawn_one_shot_server(
            "200 OK",
            r#"{"token":"abc","user":{"id":7,"name":"Ada","role":"admin"}}"#,
        );
        let api = HttpBackendApi::new(format!("{base_url}/"), CredentialStore::new(dir.path()));
        let resp = api.login("ada", "pw").await.unwrap();
        assert_eq!(resp.token, "abc");
        assert_eq!(resp.user.id, "7");

        let captured = rx.recv_timeout(StdDuration::from_secs(2)).unwrap();
        assert_eq!(captured.method, "POST");
        assert_eq!(captured.path, "/auth/login/");
        assert!(!captured.headers.contains_key("authorization"));
        let body: Value = serde_json::from_str(&captured.body).unwrap();
        assert_eq!(body["username"], "ada");
    }

    #[tokio::test]
    async fn residents_follow_pagination_with_bearer_token() {
        let dir = tempfile::tempdir().unwrap();
        let (base_url, rx) = spawn_scripted_server(vec![
            MockResponse::json(
                "200 OK",
                r#"{"results":[{"id":1,"name":"Bea","apartment_id":12}],"next":"/residents/?page=2"}"#,
            ),
            MockResponse::json(
                "200 OK",
                r#"{"results":[{"id":"2","name":"Cy","apartment_id":null}],"next":null}"#,
            ),
        ]);
        let api = HttpBackendApi::new(base_url, signed_in(&dir));
        let residents = api.list_residents().await.unwrap();
        let ids: Vec<&str> = residents.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);

        let first = rx.recv_timeout(StdDuration::from_secs(2)).unwrap();
        assert_eq!(first.path, "/residents/");
        assert_eq!(
            first.headers.get("authorization").map(String::as_str),
            Some("Bearer tok-1")
        );
        let second = rx.recv_timeout(StdDuration::from_secs(2)).unwrap();
        assert_eq!(second.path, "/residents/?page=2");
    }

    #[test]
    fn pagination_links_resolve_against_current_page() {
        assert_eq!(
            resolve_link("http://h/api/residents/", "http://other/residents/?page=3").unwrap(),
            "http://other/residents/?page=3"
        );
        assert_eq!(
            resolve_link("http://h/api/residents/", "?page=2").unwrap(),
            "http://h/api/residents/?page=2"
        );
    }

    #[tokio::test]
    async fn residents_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let (base_url, _rx) = spawn_one_shot_server(
            "200 OK",
            r#"{"results":[{"id":1,"name":"Bea","apartment_id":12},{"id":"2","name":"Cy"}],"next":null}"#,
        );
        let api = HttpBackendApi::new(base_url, signed_in(&dir));
        let residents = api.list_residents().await.unwrap();
        assert_eq!(residents.len(), 2);
        assert_eq!(residents[0].apartment_id.as_deref(), Some("12"));
        assert_eq!(residents[1].id, "2");
        assert_eq!(residents[1].apartment_id, None);
    }

    #[tokio::test]
    async fn calls_without_session_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let api = HttpBackendApi::new("http://127.0.0.1:9", CredentialStore::new(dir.path()));
        assert!(matches!(
            api.transaction_status("t1").await,
            Err(ApiError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn payment_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let (base_url, rx) = spawn_scripted_server(vec![
            MockResponse::json("201 Created", r#"{"transaction_id":99,"qr_code":"QR-DATA"}"#),
            MockResponse::json("200 OK", r#"{"status":"SUCCESS"}"#),
        ]);
        let api = HttpBackendApi::new(base_url, signed_in(&dir));
        let ticket = api
            .initiate(&PaymentRequest {
                apartment_id: "12".into(),
                amount: "1500.00".into(),
                description: "March rent".into(),
            })
            .await
            .unwrap();
        assert_eq!(ticket.transaction_id, "99");
        assert_eq!(ticket.qr_code, "QR-DATA");
        assert_eq!(
            api.transaction_status(&ticket.transaction_id).await.unwrap(),
            TransactionStatus::Success
        );

        let initiate = rx.recv_timeout(StdDuration::from_secs(2)).unwrap();
        assert_eq!(initiate.path, "/payments/initiate/");
        let body: Value = serde_json::from_str(&initiate.body).unwrap();
        assert_eq!(body["amount"], "1500.00");
        let status = rx.recv_timeout(StdDuration::from_secs(2)).unwrap();
        assert_eq!(status.path, "/payments/transactions/99/");
    }

    #[tokio::test]
    async fn status_codes_are_classified() {
        let dir = tempfile::tempdir().unwrap();
        let (base_url, _rx) = spawn_scripted_server(vec![
            MockResponse::json("401 Unauthorized", r#"{"detail":"bad token"}"#),
            MockResponse::json("404 Not Found", "{}"),
            MockResponse::json("502 Bad Gateway", "upstream"),
        ]);
        let api = HttpBackendApi::new(base_url, signed_in(&dir));
        assert!(matches!(
            api.transaction_status("a").await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            api.transaction_status("b").await,
            Err(ApiError::NotFound)
        ));
        let err = api.transaction_status("c").await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("502"));
    }
}
