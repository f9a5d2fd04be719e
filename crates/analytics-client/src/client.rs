//! Analytics API client.
//!
//! Logs in once per run, caches the bearer token and pages through the
//! per-website session listings. Calls made without a cached token fail with
//! an auth error instead of logging in implicitly.

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tokio::sync::Mutex;

use visitsync_core::sync::{AnalyticsApiTrait, AnalyticsRecord, SessionPageRequest};

use crate::error::{AnalyticsApiError, Result};
use crate::types::*;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// Client for the remote analytics API.
pub struct AnalyticsApiClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: Mutex<Option<String>>,
}

impl std::fmt::Debug for AnalyticsApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsApiClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AnalyticsApiClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[AnalyticsApi] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[AnalyticsApi] Response error ({}): {}", status, preview);
    }

    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root URL of the analytics API (e.g. "https://analytics.example.com")
    /// * `username`, `password` - Credentials exchanged for a bearer token by `login`
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AnalyticsApiError::invalid_request(format!(
                "base URL must start with http:// or https://, got '{}'",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            username: username.into(),
            password: password.into(),
            token: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| AnalyticsApiError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                let message = match error.code {
                    Some(code) => format!("{}: {}", code, error.message),
                    None => error.message,
                };
                return Err(AnalyticsApiError::api(status.as_u16(), message));
            }
            return Err(AnalyticsApiError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!(
                "[AnalyticsApi] Failed to deserialize response ({} bytes): {}",
                body.len(),
                e
            );
            AnalyticsApiError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    async fn cached_token(&self) -> Result<String> {
        self.token
            .lock()
            .await
            .clone()
            .ok_or_else(|| AnalyticsApiError::auth("Not logged in; no cached token"))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Auth
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange the configured credentials for a bearer token and cache it.
    ///
    /// POST /api/auth/login
    pub async fn login(&self) -> Result<String> {
        let url = format!("{}/api/auth/login", self.base_url);
        debug!("[AnalyticsApi] Logging in as {}", self.username);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest {
                username: self.username.clone(),
                password: self.password.clone(),
            })
            .send()
            .await?;

        let login: LoginResponse = match Self::parse_response(response).await {
            Ok(login) => login,
            Err(err) if err.is_auth_failure() => {
                return Err(AnalyticsApiError::auth(format!(
                    "Login rejected for {}: {}",
                    self.username, err
                )))
            }
            Err(err) => return Err(err),
        };
        if login.token.trim().is_empty() {
            return Err(AnalyticsApiError::auth("Login returned an empty token"));
        }

        *self.token.lock().await = Some(login.token.clone());
        info!("[AnalyticsApi] Logged in to {}", self.base_url);
        Ok(login.token)
    }

    /// Check the cached token against the API.
    ///
    /// GET /api/auth/verify
    pub async fn verify_token(&self) -> Result<()> {
        let token = self.cached_token().await?;
        let url = format!("{}/api/auth/verify", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(&token)?)
            .send()
            .await?;
        let _: serde_json::Value = Self::parse_response(response).await?;
        Ok(())
    }

    pub async fn clear(&self) {
        *self.token.lock().await = None;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Website sessions
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch one page of sessions for a website.
    ///
    /// GET /api/websites/{websiteId}/sessions?startAt=&endAt=&page=&pageSize=
    pub async fn get_sessions_page(&self, request: &SessionPageRequest) -> Result<SessionPage> {
        if request.page == 0 {
            return Err(AnalyticsApiError::invalid_request("pages are 1-based"));
        }
        let token = self.cached_token().await?;
        let url = format!(
            "{}/api/websites/{}/sessions?startAt={}&endAt={}&page={}&pageSize={}",
            self.base_url,
            urlencoding::encode(&request.partition_id),
            request.start.timestamp_millis(),
            request.end.timestamp_millis(),
            request.page,
            request.page_size
        );
        debug!(
            "[AnalyticsApi] Fetching sessions page {} for website {}",
            request.page, request.partition_id
        );

        let response = self
            .client
            .get(&url)
            .headers(self.headers(&token)?)
            .send()
            .await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl AnalyticsApiTrait for AnalyticsApiClient {
    async fn authenticate(&self) -> visitsync_core::Result<String> {
        Ok(self.login().await?)
    }

    async fn fetch_page(
        &self,
        request: &SessionPageRequest,
    ) -> visitsync_core::Result<Vec<AnalyticsRecord>> {
        let page = self.get_sessions_page(request).await?;
        Ok(page
            .data
            .into_iter()
            .map(|session| session.into_record(&request.partition_id))
            .collect())
    }

    async fn clear_token(&self) {
        self.clear().await;
    }

    async fn verify(&self) -> visitsync_core::Result<()> {
        Ok(self.verify_token().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;
    use visitsync_core::sync::Pagination;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        target: String,
        authorization: Option<String>,
        body: String,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
    }

    fn ok(body: impl Into<String>) -> MockResponse {
        MockResponse {
            status: 200,
            body: body.into(),
        }
    }

    fn status(status: u16, body: impl Into<String>) -> MockResponse {
        MockResponse {
            status,
            body: body.into(),
        }
    }

    fn login_body(token: &str) -> String {
        format!(r#"{{"token":"{}"}}"#, token)
    }

    fn session_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "websiteId": "site-a",
            "browser": "chrome",
            "os": "Windows 10",
            "device": "desktop",
            "screen": "1920x1080",
            "language": "en-US",
            "country": "US",
            "subdivision1": "US-NY",
            "city": "New York",
            "firstAt": "2026-06-01T09:00:00.000Z",
            "lastAt": "2026-06-01T09:30:00.000Z",
            "visits": 1,
            "views": "5",
            "createdAt": "2026-06-01T09:00:00.000Z"
        })
    }

    fn page_body(start: usize, len: usize, page: u32) -> String {
        let data: Vec<serde_json::Value> = (start..start + len)
            .map(|i| session_json(&format!("s-{}", i)))
            .collect();
        serde_json::json!({"data": data, "count": 237, "page": page, "pageSize": 100}).to_string()
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let mut request_line = lines.next()?.split_whitespace();
        let method = request_line.next()?.to_string();
        let target = request_line.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            method,
            target,
            authorization: headers.get("authorization").cloned(),
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            401 => "Unauthorized",
            403 => "Forbidden",
            500 => "Internal Server Error",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    /// Serves the scripted responses in order; unscripted requests get a 500.
    async fn start_mock_server(
        responses: Vec<MockResponse>,
    ) -> (String, Arc<TokioMutex<Vec<CapturedRequest>>>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let Some(request) = read_http_request(&mut stream).await else {
                    continue;
                };
                captured_clone.lock().await.push(request);
                let response = scripted
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or_else(|| status(500, r#"{"message":"unexpected request"}"#));
                let _ = write_http_response(&mut stream, response.status, &response.body).await;
            }
        });

        (format!("http://{}", addr), captured)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn page_request(page: u32) -> SessionPageRequest {
        SessionPageRequest {
            partition_id: "site-a".to_string(),
            start: t0() - chrono::Duration::hours(12),
            end: t0(),
            page,
            page_size: 100,
        }
    }

    #[test]
    fn rejects_base_url_without_scheme() {
        let err = AnalyticsApiClient::new("analytics.example.com", "u", "p").expect_err("invalid");
        assert!(matches!(err, AnalyticsApiError::InvalidRequest(_)));
    }

    #[test]
    fn debug_output_redacts_password() {
        let client =
            AnalyticsApiClient::new("https://analytics.example.com/", "bot", "hunter2").unwrap();
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("hunter2"));
        assert_eq!(client.base_url(), "https://analytics.example.com");
    }

    #[tokio::test]
    async fn login_caches_token_for_page_requests() {
        let (base_url, captured) = start_mock_server(vec![
            ok(login_body("tok-123")),
            ok(page_body(0, 2, 1)),
        ])
        .await;
        let client = AnalyticsApiClient::new(&base_url, "bot", "s3cret").unwrap();

        let token = client.authenticate().await.expect("login");
        assert_eq!(token, "tok-123");
        let records = client.fetch_page(&page_request(1)).await.expect("page");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].session_id, "s-0");
        assert_eq!(records[0].view_count, "5");

        let requests = captured.lock().await;
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].target, "/api/auth/login");
        let login: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(login["username"], "bot");
        assert_eq!(login["password"], "s3cret");

        assert_eq!(requests[1].method, "GET");
        assert_eq!(
            requests[1].target,
            format!(
                "/api/websites/site-a/sessions?startAt={}&endAt={}&page=1&pageSize=100",
                (t0() - chrono::Duration::hours(12)).timestamp_millis(),
                t0().timestamp_millis()
            )
        );
        assert_eq!(requests[1].authorization.as_deref(), Some("Bearer tok-123"));
    }

    #[tokio::test]
    async fn page_request_without_token_fails_without_calling_api() {
        let (base_url, captured) = start_mock_server(vec![]).await;
        let client = AnalyticsApiClient::new(&base_url, "bot", "s3cret").unwrap();

        let err = client
            .fetch_page(&page_request(1))
            .await
            .expect_err("no token");
        assert!(matches!(err, visitsync_core::Error::Auth(_)));
        assert!(captured.lock().await.is_empty());
    }

    #[tokio::test]
    async fn cleared_token_is_not_reused() {
        let (base_url, _captured) = start_mock_server(vec![ok(login_body("tok-1"))]).await;
        let client = AnalyticsApiClient::new(&base_url, "bot", "s3cret").unwrap();
        client.authenticate().await.expect("login");
        client.clear_token().await;

        let err = client
            .fetch_page(&page_request(1))
            .await
            .expect_err("token cleared");
        assert!(matches!(err, visitsync_core::Error::Auth(_)));
    }

    #[tokio::test]
    async fn rejected_login_is_an_auth_error() {
        let (base_url, _captured) = start_mock_server(vec![status(
            401,
            r#"{"message":"Incorrect username and/or password."}"#,
        )])
        .await;
        let client = AnalyticsApiClient::new(&base_url, "bot", "wrong").unwrap();

        let err = client.authenticate().await.expect_err("rejected");
        match err {
            visitsync_core::Error::Auth(message) => assert!(message.contains("Incorrect")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn pagination_walks_pages_until_short_page() {
        let (base_url, captured) = start_mock_server(vec![
            ok(login_body("tok")),
            ok(page_body(0, 100, 1)),
            ok(page_body(100, 100, 2)),
            ok(page_body(200, 37, 3)),
        ])
        .await;
        let client = AnalyticsApiClient::new(&base_url, "bot", "s3cret").unwrap();
        client.authenticate().await.expect("login");

        let records = client
            .fetch_all_sessions(
                "site-a",
                t0() - chrono::Duration::hours(12),
                t0(),
                Pagination {
                    page_size: 100,
                    max_pages: 1000,
                },
            )
            .await
            .expect("all pages");

        assert_eq!(records.len(), 237);
        assert_eq!(records[236].session_id, "s-236");
        let requests = captured.lock().await;
        let pages: Vec<&str> = requests[1..]
            .iter()
            .map(|r| {
                r.target
                    .split('&')
                    .find(|p| p.starts_with("page="))
                    .unwrap_or_default()
            })
            .collect();
        assert_eq!(pages, vec!["page=1", "page=2", "page=3"]);
    }

    #[tokio::test]
    async fn expired_token_maps_to_auth_and_server_error_to_api() {
        let (base_url, _captured) = start_mock_server(vec![
            ok(login_body("tok")),
            status(401, r#"{"message":"Unauthorized"}"#),
            status(500, "upstream exploded"),
        ])
        .await;
        let client = AnalyticsApiClient::new(&base_url, "bot", "s3cret").unwrap();
        client.authenticate().await.expect("login");

        let expired = client.fetch_page(&page_request(1)).await.expect_err("401");
        assert!(matches!(expired, visitsync_core::Error::Auth(_)));

        let failed = client.fetch_page(&page_request(1)).await.expect_err("500");
        match failed {
            visitsync_core::Error::AnalyticsApi(message) => {
                assert!(message.contains("500"));
                assert!(message.contains("upstream exploded"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn verify_uses_cached_token() {
        let (base_url, captured) = start_mock_server(vec![
            ok(login_body("tok-v")),
            ok(r#"{"id":"bot","username":"bot"}"#),
        ])
        .await;
        let client = AnalyticsApiClient::new(&base_url, "bot", "s3cret").unwrap();
        assert!(matches!(
            client.verify().await,
            Err(visitsync_core::Error::Auth(_))
        ));

        client.authenticate().await.expect("login");
        client.verify().await.expect("verify");
        let requests = captured.lock().await;
        assert_eq!(requests[1].target, "/api/auth/verify");
        assert_eq!(requests[1].authorization.as_deref(), Some("Bearer tok-v"));
    }

    #[tokio::test]
    async fn zero_page_is_rejected_locally() {
        let client = AnalyticsApiClient::new("http://127.0.0.1:9", "bot", "s3cret").unwrap();
        let err = client
            .get_sessions_page(&page_request(0))
            .await
            .expect_err("page 0");
        assert!(matches!(err, AnalyticsApiError::InvalidRequest(_)));
    }
}
