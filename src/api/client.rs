use reqwest::{Client as HttpClient, Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::app::Settings;
use crate::error::ApiError;

/// Retry schedule for failed requests: `base × 2^attempt`, capped.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Clone)]
pub struct ApiClient {
    pub http: HttpClient,
    base_url: Url,
    token: Option<String>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        Self::with_settings(base_url, token, &Settings::default())
    }

    pub fn with_settings(base_url: &str, token: Option<String>, settings: &Settings) -> Result<Self, ApiError> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        let normalized = crate::utils::normalize_url(base_url);
        let base_url = Url::parse(&format!("{}/", normalized))?;
        Ok(Self {
            http,
            base_url,
            token: token.filter(|t| !t.is_empty()),
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                ..RetryPolicy::default()
            },
        })
    }

    pub fn from_state(state: &crate::app::AppState) -> Result<Self, ApiError> {
        Self::with_settings(&state.base_url, state.auth_token.clone(), &state.settings)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn with_auth(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    /// Sends the request built by `build`, retrying everything except 4xx.
    pub async fn execute<F>(&self, method: &Method, path: &str, build: F) -> Result<Value, ApiError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = self.url(path)?;
        let max_attempts = self.retry.max_retries + 1;
        let mut attempt = 0;
        loop {
            let req = self.with_auth(build(self.http.request(method.clone(), url.clone())));
            let result = match req.send().await {
                Ok(resp) => Self::read_response(resp).await,
                Err(e) => Err(ApiError::from(e)),
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    log::warn!(
                        "{} {} failed (attempt {}/{}): {}; retrying in {}ms",
                        method,
                        path,
                        attempt + 1,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::debug!("{} {} failed: {}", method, path, e);
                    return Err(e);
                }
            }
        }
    }

    async fn read_response(resp: reqwest::Response) -> Result<Value, ApiError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ApiError::from_response_body(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ApiError> {
        self.execute(&Method::GET, path, |r| r.query(query)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, ApiError> {
        self.execute(&Method::POST, path, |r| r.json(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> Result<Value, ApiError> {
        self.execute(&Method::PUT, path, |r| match body {
            Some(b) => r.json(b),
            None => r,
        })
        .await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(&Method::DELETE, path, |r| r).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn sends_bearer_token_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/jobs"))
            .and(header("authorization", "Bearer secret"))
            .and(query_param("status", "failed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), Some("secret".into())).unwrap();
        let v = client
            .get("/api/v1/jobs", &[("status".into(), "failed".into())])
            .await
            .unwrap();
        assert_eq!(v, json!([]));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Account not found"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None).unwrap().with_retry(fast_retry());
        let err = client.get("/api/v1/accounts/nope", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Account not found (HTTP 404)");
    }

    #[tokio::test]
    async fn server_errors_retry_three_times() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/dashboard/stats"))
            .respond_with(ResponseTemplate::new(502))
            .expect(4)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None).unwrap().with_retry(fast_retry());
        let err = client.get("/api/v1/dashboard/stats", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(502));
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/batches/b1/pause"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/batches/b1/pause"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None).unwrap().with_retry(fast_retry());
        let v = client.put::<Value>("/api/v1/batches/b1/pause", None).await.unwrap();
        assert_eq!(v["success"], true);
    }

    #[tokio::test]
    async fn empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/jobs/j1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        let client = ApiClient::new(&server.uri(), None).unwrap();
        assert_eq!(client.delete("/api/v1/jobs/j1").await.unwrap(), Value::Null);
    }
}
