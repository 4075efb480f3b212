//! One method per backend resource/action pair.

use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

use crate::api::client::ApiClient;
use crate::api::mappers;
use crate::api::models::*;
use crate::error::ApiError;

fn file_part(upload: &ExcelUpload) -> Part {
    let mime = crate::import::uploader::ACCEPTED_TYPES
        .iter()
        .find(|(ext, _)| upload.file_name.to_ascii_lowercase().ends_with(&format!(".{ext}")))
        .map(|(_, m)| *m)
        .unwrap_or("application/octet-stream");
    let part = Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone());
    match part.mime_str(mime) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("falling back to untyped upload part: {e}");
            Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone())
        }
    }
}

fn excel_form(upload: &ExcelUpload, include_settings: bool) -> Form {
    let mut form = Form::new()
        .part("file", file_part(upload))
        .text("account_id", upload.account_id.clone())
        .text("allow_duplicates", upload.allow_duplicates.to_string());
    if let Some(name) = &upload.batch_name {
        form = form.text("batch_name", name.clone());
    }
    if let Some(desc) = &upload.description {
        form = form.text("description", desc.clone());
    }
    if include_settings {
        if let Some(settings) = &upload.call_settings {
            match serde_json::to_string(settings) {
                Ok(s) => form = form.text("call_settings_json", s),
                Err(e) => log::warn!("dropping call settings from upload: {e}"),
            }
        }
    }
    form
}

fn success_or_message(v: &Value) -> Result<(), ApiError> {
    if v.get("success").and_then(|s| s.as_bool()) == Some(false) {
        let msg = v
            .get("message")
            .or_else(|| v.get("error"))
            .and_then(|m| m.as_str())
            .unwrap_or("The server rejected the request");
        return Err(ApiError::Rejected(msg.to_string()));
    }
    Ok(())
}

impl ApiClient {
    pub async fn health(&self) -> Result<Health, ApiError> {
        let v = self.get("/health", &[]).await?;
        Ok(serde_json::from_value(v)?)
    }

    // ---- accounts ----

    pub async fn list_accounts(&self) -> Result<Vec<Account>, ApiError> {
        let v = self.get("/api/v1/accounts", &[]).await?;
        let items = mappers::unwrap_list(v, "accounts");
        Ok(mappers::map_list(&items, "account", mappers::account_from_wire))
    }

    pub async fn account(&self, id: &str) -> Result<Account, ApiError> {
        let v = self.get(&format!("/api/v1/accounts/{id}"), &[]).await?;
        mappers::account_from_wire(&mappers::unwrap_object(v, "account"))
    }

    pub async fn create_account(&self, req: &NewAccount) -> Result<Account, ApiError> {
        let v = self.post("/api/v1/accounts", req).await?;
        success_or_message(&v)?;
        mappers::account_from_wire(&mappers::unwrap_object(v, "account"))
    }

    pub async fn update_account(&self, id: &str, req: &AccountUpdate) -> Result<Account, ApiError> {
        let v = self.put(&format!("/api/v1/accounts/{id}"), Some(req)).await?;
        success_or_message(&v)?;
        mappers::account_from_wire(&mappers::unwrap_object(v, "account"))
    }

    pub async fn suspend_account(&self, id: &str, reason: Option<&str>) -> Result<(), ApiError> {
        let body = reason.map(|r| json!({ "reason": r }));
        let v = self.put(&format!("/api/v1/accounts/{id}/suspend"), body.as_ref()).await?;
        success_or_message(&v)
    }

    pub async fn activate_account(&self, id: &str) -> Result<(), ApiError> {
        let v = self.put::<Value>(&format!("/api/v1/accounts/{id}/activate"), None).await?;
        success_or_message(&v)
    }

    // ---- batches ----

    pub async fn list_batches(&self, account_id: Option<&str>) -> Result<Vec<Batch>, ApiError> {
        let query: Vec<(String, String)> = account_id
            .map(|a| vec![("account_id".to_string(), a.to_string())])
            .unwrap_or_default();
        let v = self.get("/api/v1/batches", &query).await?;
        let items = mappers::unwrap_list(v, "batches");
        Ok(mappers::map_list(&items, "batch", mappers::batch_from_wire))
    }

    pub async fn batch(&self, id: &str) -> Result<Batch, ApiError> {
        let v = self.get(&format!("/api/v1/batches/{id}"), &[]).await?;
        mappers::batch_from_wire(&mappers::unwrap_object(v, "batch"))
    }

    pub async fn create_batch(&self, req: &NewBatch) -> Result<Batch, ApiError> {
        let v = self.post("/api/v1/batches", req).await?;
        success_or_message(&v)?;
        mappers::batch_from_wire(&mappers::unwrap_object(v, "batch"))
    }

    pub async fn pause_batch(&self, id: &str) -> Result<(), ApiError> {
        let v = self.put::<Value>(&format!("/api/v1/batches/{id}/pause"), None).await?;
        success_or_message(&v)
    }

    pub async fn resume_batch(&self, id: &str) -> Result<(), ApiError> {
        let v = self.put::<Value>(&format!("/api/v1/batches/{id}/resume"), None).await?;
        success_or_message(&v)
    }

    pub async fn cancel_batch(&self, id: &str, reason: Option<&str>) -> Result<(), ApiError> {
        let body = json!({ "reason": reason });
        let v = self.post(&format!("/api/v1/batches/{id}/cancel"), &body).await?;
        success_or_message(&v)
    }

    pub async fn delete_batch(&self, id: &str) -> Result<(), ApiError> {
        let v = self.delete(&format!("/api/v1/batches/{id}")).await?;
        success_or_message(&v)
    }

    pub async fn preview_excel(&self, upload: &ExcelUpload) -> Result<ExcelPreview, ApiError> {
        let v = self
            .execute(&Method::POST, "/api/v1/batches/excel/preview", |r| {
                r.multipart(excel_form(upload, false))
            })
            .await?;
        success_or_message(&v)?;
        Ok(mappers::excel_preview_from_wire(v))
    }

    pub async fn create_batch_from_excel(&self, upload: &ExcelUpload) -> Result<ExcelCreated, ApiError> {
        let v = self
            .execute(&Method::POST, "/api/v1/batches/excel/create", |r| {
                r.multipart(excel_form(upload, true))
            })
            .await?;
        success_or_message(&v)?;
        let mut created: ExcelCreated = serde_json::from_value(mappers::unwrap_object(v.clone(), "batch"))?;
        if created.batch_id.is_empty() {
            created.batch_id = v
                .get("batch_id")
                .or_else(|| v.get("id"))
                .and_then(|b| b.as_str())
                .unwrap_or_default()
                .to_string();
        }
        Ok(created)
    }

    // ---- jobs ----

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, ApiError> {
        let v = self.get("/api/v1/jobs", &filter.to_query()).await?;
        let items = mappers::unwrap_list(v, "jobs");
        Ok(mappers::map_list(&items, "job", mappers::job_from_wire))
    }

    pub async fn retry_job(&self, id: &str) -> Result<(), ApiError> {
        let v = self.put::<Value>(&format!("/api/v1/jobs/{id}/retry"), None).await?;
        success_or_message(&v)
    }

    pub async fn delete_job(&self, id: &str) -> Result<(), ApiError> {
        let v = self.delete(&format!("/api/v1/jobs/{id}")).await?;
        success_or_message(&v)
    }

    // ---- dashboard ----

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        let v = self.get("/api/v1/dashboard/stats", &[]).await?;
        Ok(serde_json::from_value(mappers::unwrap_object(v, "stats"))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::RetryPolicy;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), Some("tok".into()))
            .unwrap()
            .with_retry(RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            })
    }

    #[tokio::test]
    async fn lists_batches_through_mapper() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/batches"))
            .and(query_param("account_id", "acc-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "batches": [
                    {"batch_id": "b1", "name": "Marzo", "is_active": true, "total_jobs": 3},
                    {"name": "broken"}
                ]
            })))
            .mount(&server)
            .await;

        let batches = client(&server).await.list_batches(Some("acc-1")).await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].status, BatchStatus::Running);
    }

    #[tokio::test]
    async fn success_false_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/batches/b1/cancel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false, "message": "Batch already completed"
            })))
            .mount(&server)
            .await;

        let err = client(&server).await.cancel_batch("b1", None).await.unwrap_err();
        assert_eq!(err.to_string(), "Batch already completed");
    }

    #[tokio::test]
    async fn excel_create_sends_multipart_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/batches/excel/create"))
            .and(body_string_contains("name=\"account_id\""))
            .and(body_string_contains("name=\"call_settings_json\""))
            .and(body_string_contains("filename=\"list.csv\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "batch_id": "b-new", "jobs_created": 2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let upload = ExcelUpload {
            file_name: "list.csv".into(),
            bytes: b"Nombre,Telefono\nAna,+56911111111\n".to_vec(),
            account_id: "acc-1".into(),
            batch_name: Some("Marzo".into()),
            description: None,
            allow_duplicates: false,
            call_settings: Some(CallSettings::default()),
        };
        let created = client(&server).await.create_batch_from_excel(&upload).await.unwrap();
        assert_eq!(created.batch_id, "b-new");
        assert_eq!(created.jobs_created, 2);
    }

    #[tokio::test]
    async fn dashboard_stats_tolerate_missing_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/dashboard/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_jobs": 10, "success_rate": 0.5
            })))
            .mount(&server)
            .await;
        let stats = client(&server).await.dashboard_stats().await.unwrap();
        assert_eq!(stats.total_jobs, 10);
        assert_eq!(stats.active_batches, 0);
    }
}
