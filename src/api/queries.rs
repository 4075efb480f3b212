//! Cached queries and invalidating mutations over [`ApiClient`].

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::api::cache::{Invalidate, QueryCache, QueryKey};
use crate::api::client::ApiClient;
use crate::api::models::*;
use crate::app::Settings;
use crate::error::ApiError;

pub const ACCOUNTS: &str = "accounts";
pub const BATCHES: &str = "batches";
pub const JOBS: &str = "jobs";
pub const DASHBOARD: &str = "dashboard";
pub const HEALTH: &str = "health";

/// How long a cached result is served without asking the backend again.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// Serve from cache while fresh.
    Cached,
    /// Always hit the backend (polling, manual refresh).
    Network,
}

/// Polling interval for data that changes without local action.
pub fn polling_interval(key: &QueryKey, settings: &Settings) -> Option<Duration> {
    match key.resource {
        DASHBOARD => Some(Duration::from_secs(settings.dashboard_poll_secs)),
        BATCHES => Some(Duration::from_secs(settings.batch_poll_secs)),
        _ => None,
    }
}

pub fn accounts_key() -> QueryKey {
    QueryKey::list(ACCOUNTS)
}

pub fn account_key(id: &str) -> QueryKey {
    QueryKey::detail(ACCOUNTS, id)
}

pub fn batches_key(account_id: Option<&str>) -> QueryKey {
    let params = account_id
        .map(|a| vec![("account_id".to_string(), a.to_string())])
        .unwrap_or_default();
    QueryKey::list(BATCHES).with_params(params)
}

pub fn batch_key(id: &str) -> QueryKey {
    QueryKey::detail(BATCHES, id)
}

pub fn jobs_key(filter: &JobFilter) -> QueryKey {
    QueryKey::list(JOBS).with_params(filter.to_query())
}

pub fn dashboard_key() -> QueryKey {
    QueryKey::list(DASHBOARD)
}

#[derive(Clone)]
pub struct Queries {
    client: ApiClient,
    cache: Arc<Mutex<QueryCache>>,
    stale_time: Duration,
}

impl Queries {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            cache: Arc::new(Mutex::new(QueryCache::new())),
            stale_time: DEFAULT_STALE_TIME,
        }
    }

    #[cfg(test)]
    fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    fn cache(&self) -> MutexGuard<'_, QueryCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last stored value regardless of age, for instant rendering.
    pub fn cached<T: Clone + Send + Sync + 'static>(&self, key: &QueryKey) -> Option<T> {
        self.cache().get::<T>(key).map(|(v, _)| v)
    }

    pub fn invalidate(&self, targets: &[Invalidate]) {
        let mut cache = self.cache();
        for target in targets {
            let n = cache.invalidate(target);
            log::debug!("invalidated {n} cache entries for {target:?}");
        }
    }

    pub fn clear(&self) {
        self.cache().clear();
    }

    async fn query<T, F, Fut>(&self, key: QueryKey, mode: Fetch, fetch: F) -> Result<T, ApiError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(ApiClient) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if mode == Fetch::Cached {
            let hit = self.cache().get_fresh::<T>(&key, self.stale_time);
            if let Some(hit) = hit {
                log::trace!("cache hit {key}");
                return Ok(hit);
            }
        }
        let value = fetch(self.client.clone()).await?;
        self.cache().put(key, value.clone());
        Ok(value)
    }

    async fn mutate<T, Fut>(&self, fut: Fut, targets: Vec<Invalidate>) -> Result<T, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let out = fut.await?;
        self.invalidate(&targets);
        Ok(out)
    }

    // ---- queries ----

    pub async fn health(&self) -> Result<Health, ApiError> {
        self.query(QueryKey::list(HEALTH), Fetch::Network, |c| async move { c.health().await })
            .await
    }

    pub async fn accounts(&self, mode: Fetch) -> Result<Vec<Account>, ApiError> {
        self.query(accounts_key(), mode, |c| async move { c.list_accounts().await })
            .await
    }

    pub async fn account(&self, id: &str, mode: Fetch) -> Result<Account, ApiError> {
        let id = id.to_string();
        self.query(account_key(&id), mode, |c| async move { c.account(&id).await })
            .await
    }

    pub async fn batches(&self, account_id: Option<&str>, mode: Fetch) -> Result<Vec<Batch>, ApiError> {
        let account = account_id.map(str::to_string);
        self.query(batches_key(account_id), mode, |c| async move {
            c.list_batches(account.as_deref()).await
        })
        .await
    }

    pub async fn batch(&self, id: &str, mode: Fetch) -> Result<Batch, ApiError> {
        let id = id.to_string();
        self.query(batch_key(&id), mode, |c| async move { c.batch(&id).await })
            .await
    }

    pub async fn jobs(&self, filter: &JobFilter, mode: Fetch) -> Result<Vec<Job>, ApiError> {
        let f = filter.clone();
        self.query(jobs_key(filter), mode, |c| async move { c.list_jobs(&f).await })
            .await
    }

    pub async fn dashboard_stats(&self, mode: Fetch) -> Result<DashboardStats, ApiError> {
        self.query(dashboard_key(), mode, |c| async move { c.dashboard_stats().await })
            .await
    }

    // ---- mutations ----

    pub async fn create_account(&self, req: &NewAccount) -> Result<Account, ApiError> {
        self.mutate(
            self.client.create_account(req),
            vec![Invalidate::Key(accounts_key()), Invalidate::Key(dashboard_key())],
        )
        .await
    }

    pub async fn update_account(&self, id: &str, req: &AccountUpdate) -> Result<Account, ApiError> {
        self.mutate(self.client.update_account(id, req), account_targets(id)).await
    }

    pub async fn suspend_account(&self, id: &str, reason: Option<&str>) -> Result<(), ApiError> {
        self.mutate(self.client.suspend_account(id, reason), account_targets(id)).await
    }

    pub async fn activate_account(&self, id: &str) -> Result<(), ApiError> {
        self.mutate(self.client.activate_account(id), account_targets(id)).await
    }

    pub async fn create_batch(&self, req: &NewBatch) -> Result<Batch, ApiError> {
        self.mutate(
            self.client.create_batch(req),
            vec![Invalidate::Key(QueryKey::list(BATCHES)), Invalidate::Key(dashboard_key())],
        )
        .await
    }

    pub async fn create_batch_from_excel(&self, upload: &ExcelUpload) -> Result<ExcelCreated, ApiError> {
        self.mutate(
            self.client.create_batch_from_excel(upload),
            vec![
                Invalidate::Key(QueryKey::list(BATCHES)),
                Invalidate::Key(QueryKey::list(JOBS)),
                Invalidate::Key(dashboard_key()),
                Invalidate::Key(account_key(&upload.account_id)),
            ],
        )
        .await
    }

    pub async fn preview_excel(&self, upload: &ExcelUpload) -> Result<ExcelPreview, ApiError> {
        self.client.preview_excel(upload).await
    }

    pub async fn pause_batch(&self, id: &str) -> Result<(), ApiError> {
        self.mutate(self.client.pause_batch(id), batch_targets(id)).await
    }

    pub async fn resume_batch(&self, id: &str) -> Result<(), ApiError> {
        self.mutate(self.client.resume_batch(id), batch_targets(id)).await
    }

    pub async fn cancel_batch(&self, id: &str, reason: Option<&str>) -> Result<(), ApiError> {
        self.mutate(self.client.cancel_batch(id, reason), batch_targets(id)).await
    }

    pub async fn delete_batch(&self, id: &str) -> Result<(), ApiError> {
        self.mutate(
            self.client.delete_batch(id),
            vec![
                Invalidate::Resource(BATCHES),
                Invalidate::Resource(JOBS),
                Invalidate::Key(dashboard_key()),
            ],
        )
        .await
    }

    pub async fn retry_job(&self, id: &str) -> Result<(), ApiError> {
        self.mutate(self.client.retry_job(id), job_targets()).await
    }

    pub async fn delete_job(&self, id: &str) -> Result<(), ApiError> {
        self.mutate(self.client.delete_job(id), job_targets()).await
    }
}

fn account_targets(id: &str) -> Vec<Invalidate> {
    vec![
        Invalidate::Key(accounts_key()),
        Invalidate::Key(account_key(id)),
    ]
}

fn batch_targets(id: &str) -> Vec<Invalidate> {
    vec![
        Invalidate::Key(QueryKey::list(BATCHES)),
        Invalidate::Key(batch_key(id)),
        Invalidate::Key(QueryKey::list(JOBS)),
        Invalidate::Key(dashboard_key()),
    ]
}

fn job_targets() -> Vec<Invalidate> {
    vec![
        Invalidate::Key(QueryKey::list(JOBS)),
        Invalidate::Resource(BATCHES),
        Invalidate::Key(dashboard_key()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn queries(server: &MockServer) -> Queries {
        let client = ApiClient::new(&server.uri(), Some("t".into()))
            .unwrap()
            .with_retry(RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            });
        Queries::new(client).with_stale_time(Duration::from_secs(60))
    }

    #[test]
    fn polling_intervals() {
        let settings = Settings::default();
        assert_eq!(polling_interval(&dashboard_key(), &settings), Some(Duration::from_secs(30)));
        assert_eq!(polling_interval(&batch_key("b1"), &settings), Some(Duration::from_secs(5)));
        assert_eq!(polling_interval(&accounts_key(), &settings), None);
    }

    #[tokio::test]
    async fn fresh_cache_avoids_second_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"account_id": "a1"}])))
            .expect(2)
            .mount(&server)
            .await;

        let q = queries(&server).await;
        assert_eq!(q.accounts(Fetch::Cached).await.unwrap().len(), 1);
        assert_eq!(q.accounts(Fetch::Cached).await.unwrap().len(), 1);
        assert_eq!(q.accounts(Fetch::Network).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn suspending_invalidates_account_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"account_id": "a1"})))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/accounts/a1/suspend"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let q = queries(&server).await;
        q.account("a1", Fetch::Cached).await.unwrap();
        assert!(q.cached::<Account>(&account_key("a1")).is_some());
        q.suspend_account("a1", Some("unpaid")).await.unwrap();
        assert!(q.cached::<Account>(&account_key("a1")).is_none());
        q.account("a1", Fetch::Cached).await.unwrap();
    }

    #[tokio::test]
    async fn creating_batch_invalidates_lists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/batches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/batches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"batch_id": "b9", "name": "Nuevo"})))
            .mount(&server)
            .await;

        let q = queries(&server).await;
        q.batches(None, Fetch::Cached).await.unwrap();
        q.batches(Some("acc-1"), Fetch::Cached).await.unwrap();
        let created = q
            .create_batch(&NewBatch {
                account_id: "acc-1".into(),
                name: "Nuevo".into(),
                description: None,
                call_settings: CallSettings::default(),
            })
            .await
            .unwrap();
        assert_eq!(created.id, "b9");
        assert!(q.cached::<Vec<Batch>>(&batches_key(None)).is_none());
        assert!(q.cached::<Vec<Batch>>(&batches_key(Some("acc-1"))).is_none());
    }

    #[tokio::test]
    async fn failed_mutation_keeps_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/jobs/j1/retry"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({"detail": "Job is running"})))
            .mount(&server)
            .await;

        let q = queries(&server).await;
        let filter = JobFilter::default();
        q.jobs(&filter, Fetch::Cached).await.unwrap();
        let err = q.retry_job("j1").await.unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert!(q.cached::<Vec<Job>>(&jobs_key(&filter)).is_some());
    }
}
