//! # 3scale Admin API Client
//!
//! Native REST implementation of [`AdminApi`] using reqwest with rustls.
//!
//! - Authentication: `access_token` query parameter on every request
//! - Reads: JSON, wrapped in 3scale envelopes (`{"metrics":[{"metric":{..}}]}`)
//! - Writes: form-encoded bodies built from the typed params and patches
//!
//! Metrics and methods of backend APIs come back with their system name
//! suffixed by the backend ID (`hits.45498`); the suffix is stripped so
//! system names compare equal to the ones declared in the spec.

use super::api::AdminApi;
use super::types::{
    Application, ApplicationParams, ApplicationPatch, ApplicationPlan, ApplicationPlanParams, ApplicationPlanPatch, BackendApi, BackendApiParams,
    BackendApiPatch, BackendUsage, BackendUsageParams, BackendUsagePatch, Limit, LimitParams,
    LimitPatch, MappingRule, MappingRuleParams, MappingRulePatch, Method, MethodParams,
    MethodPatch, Metric, MetricParams, MetricPatch, PolicyConfig, Service, ServiceParams,
    ServicePatch,
};
use super::ApiError;
use async_trait::async_trait;
use paths::Scope;
use reqwest::{Client, Method as HttpMethod, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};
use zeroize::Zeroizing;

/// HTTP client for one provider account
pub struct ThreescaleClient {
    http: Client,
    base_url: String,
    token: Zeroizing<String>,
}

impl fmt::Debug for ThreescaleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreescaleClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl ThreescaleClient {
    pub fn new(
        admin_url: &str,
        token: Zeroizing<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                path: admin_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: admin_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        path: &str,
        form: Option<&B>,
    ) -> Result<String, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, path, "admin API request");

        let mut builder = self
            .http
            .request(method, &url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("access_token", self.token.as_str())]);
        if let Some(form) = form {
            builder = builder.form(form);
        }

        let response = builder.send().await.map_err(|source| ApiError::Transport {
            path: path.to_string(),
            source,
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| ApiError::Transport {
            path: path.to_string(),
            source,
        })?;
        trace!(path, status = status.as_u16(), body = %body, "admin API response");

        match status {
            s if s.is_success() => Ok(body),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound {
                path: path.to_string(),
            }),
            s => Err(ApiError::Http {
                status: s.as_u16(),
                path: path.to_string(),
                body,
            }),
        }
    }

    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        let body = self.request::<()>(HttpMethod::GET, path, None).await?;
        decode(path, &body)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, form: &B) -> Result<Value, ApiError> {
        let body = self.request(HttpMethod::POST, path, Some(form)).await?;
        decode(path, &body)
    }

    async fn put<B: Serialize + ?Sized>(&self, path: &str, form: &B) -> Result<(), ApiError> {
        self.request(HttpMethod::PUT, path, Some(form)).await?;
        Ok(())
    }

    /// State transitions without a body
    async fn put_empty(&self, path: &str) -> Result<(), ApiError> {
        self.request::<()>(HttpMethod::PUT, path, None).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.request::<()>(HttpMethod::DELETE, path, None).await?;
        Ok(())
    }
}

fn decode(path: &str, body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

/// Unwrap `{"<list_key>": [{"<item_key>": {..}}, ..]}`, or a bare array when `list_key` is `None`
fn unwrap_list<T: DeserializeOwned>(
    path: &str,
    value: Value,
    list_key: Option<&str>,
    item_key: &str,
) -> Result<Vec<T>, ApiError> {
    let list = match list_key {
        Some(key) => value.get(key).cloned().unwrap_or(Value::Null),
        None => value,
    };
    let Value::Array(entries) = list else {
        return Err(ApiError::Unexpected(format!(
            "expected a list under {} in response from {path}",
            list_key.unwrap_or("the top level")
        )));
    };

    entries
        .into_iter()
        .map(|entry| unwrap_item(path, entry, item_key))
        .collect()
}

/// Unwrap `{"<item_key>": {..}}`; unwrapped objects are accepted as well
fn unwrap_item<T: DeserializeOwned>(path: &str, value: Value, item_key: &str) -> Result<T, ApiError> {
    let inner = match value {
        Value::Object(mut map) if map.contains_key(item_key) => {
            map.remove(item_key).unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(inner).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

/// `hits.45498` -> `hits`
fn strip_backend_suffix(system_name: &str) -> String {
    match system_name.rfind('.') {
        Some(index) => system_name[..index].to_string(),
        None => system_name.to_string(),
    }
}

fn sanitize_metric(scope: Scope, mut metric: Metric) -> Metric {
    if let Scope::Backend(_) = scope {
        metric.system_name = strip_backend_suffix(&metric.system_name);
    }
    metric
}

fn sanitize_method(scope: Scope, mut method: Method) -> Method {
    if let Scope::Backend(_) = scope {
        method.system_name = strip_backend_suffix(&method.system_name);
    }
    method
}

#[derive(Serialize)]
struct PoliciesForm {
    policies_config: String,
}

#[derive(Serialize)]
struct ChangePlanForm {
    plan_id: i64,
}

#[async_trait]
impl AdminApi for ThreescaleClient {
    async fn list_backend_apis(&self) -> Result<Vec<BackendApi>, ApiError> {
        let path = paths::backend_apis();
        let value = self.get(&path).await?;
        unwrap_list(&path, value, Some("backend_apis"), "backend_api")
    }

    async fn create_backend_api(&self, params: &BackendApiParams) -> Result<BackendApi, ApiError> {
        let path = paths::backend_apis();
        let value = self.post(&path, params).await?;
        unwrap_item(&path, value, "backend_api")
    }

    async fn update_backend_api(&self, id: i64, patch: &BackendApiPatch) -> Result<(), ApiError> {
        self.put(&paths::backend_api(id), patch).await
    }

    async fn delete_backend_api(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&paths::backend_api(id)).await
    }

    async fn list_services(&self) -> Result<Vec<Service>, ApiError> {
        let path = paths::services();
        let value = self.get(&path).await?;
        unwrap_list(&path, value, Some("services"), "service")
    }

    async fn create_service(&self, params: &ServiceParams) -> Result<Service, ApiError> {
        let path = paths::services();
        let value = self.post(&path, params).await?;
        unwrap_item(&path, value, "service")
    }

    async fn update_service(&self, id: i64, patch: &ServicePatch) -> Result<(), ApiError> {
        self.put(&paths::service(id), patch).await
    }

    async fn delete_service(&self, id: i64) -> Result<(), ApiError> {
        self.delete(&paths::service(id)).await
    }

    async fn list_metrics(&self, scope: Scope) -> Result<Vec<Metric>, ApiError> {
        let path = paths::metrics(scope);
        let value = self.get(&path).await?;
        let metrics: Vec<Metric> = unwrap_list(&path, value, Some("metrics"), "metric")?;
        Ok(metrics.into_iter().map(|m| sanitize_metric(scope, m)).collect())
    }

    async fn create_metric(&self, scope: Scope, params: &MetricParams) -> Result<Metric, ApiError> {
        let path = paths::metrics(scope);
        let value = self.post(&path, params).await?;
        unwrap_item(&path, value, "metric").map(|m| sanitize_metric(scope, m))
    }

    async fn update_metric(&self, scope: Scope, id: i64, patch: &MetricPatch) -> Result<(), ApiError> {
        self.put(&paths::metric(scope, id), patch).await
    }

    async fn delete_metric(&self, scope: Scope, id: i64) -> Result<(), ApiError> {
        self.delete(&paths::metric(scope, id)).await
    }

    async fn list_methods(&self, scope: Scope, hits_id: i64) -> Result<Vec<Method>, ApiError> {
        let path = paths::methods(scope, hits_id);
        let value = self.get(&path).await?;
        let methods: Vec<Method> = unwrap_list(&path, value, Some("methods"), "method")?;
        Ok(methods.into_iter().map(|m| sanitize_method(scope, m)).collect())
    }

    async fn create_method(
        &self,
        scope: Scope,
        hits_id: i64,
        params: &MethodParams,
    ) -> Result<Method, ApiError> {
        let path = paths::methods(scope, hits_id);
        let value = self.post(&path, params).await?;
        unwrap_item(&path, value, "method").map(|m| sanitize_method(scope, m))
    }

    async fn update_method(
        &self,
        scope: Scope,
        hits_id: i64,
        id: i64,
        patch: &MethodPatch,
    ) -> Result<(), ApiError> {
        self.put(&paths::method(scope, hits_id, id), patch).await
    }

    async fn delete_method(&self, scope: Scope, hits_id: i64, id: i64) -> Result<(), ApiError> {
        self.delete(&paths::method(scope, hits_id, id)).await
    }

    async fn list_mapping_rules(&self, scope: Scope) -> Result<Vec<MappingRule>, ApiError> {
        let path = paths::mapping_rules(scope);
        let value = self.get(&path).await?;
        let mut rules: Vec<MappingRule> =
            unwrap_list(&path, value, Some("mapping_rules"), "mapping_rule")?;
        rules.sort_by_key(|r| r.position);
        Ok(rules)
    }

    async fn create_mapping_rule(
        &self,
        scope: Scope,
        params: &MappingRuleParams,
    ) -> Result<MappingRule, ApiError> {
        let path = paths::mapping_rules(scope);
        let value = self.post(&path, params).await?;
        unwrap_item(&path, value, "mapping_rule")
    }

    async fn update_mapping_rule(
        &self,
        scope: Scope,
        id: i64,
        patch: &MappingRulePatch,
    ) -> Result<(), ApiError> {
        self.put(&paths::mapping_rule(scope, id), patch).await
    }

    async fn delete_mapping_rule(&self, scope: Scope, id: i64) -> Result<(), ApiError> {
        self.delete(&paths::mapping_rule(scope, id)).await
    }

    async fn list_backend_usages(&self, service_id: i64) -> Result<Vec<BackendUsage>, ApiError> {
        let path = paths::backend_usages(service_id);
        let value = self.get(&path).await?;
        unwrap_list(&path, value, None, "backend_usage")
    }

    async fn create_backend_usage(
        &self,
        service_id: i64,
        params: &BackendUsageParams,
    ) -> Result<BackendUsage, ApiError> {
        let path = paths::backend_usages(service_id);
        let value = self.post(&path, params).await?;
        unwrap_item(&path, value, "backend_usage")
    }

    async fn update_backend_usage(
        &self,
        service_id: i64,
        id: i64,
        patch: &BackendUsagePatch,
    ) -> Result<(), ApiError> {
        self.put(&paths::backend_usage(service_id, id), patch).await
    }

    async fn delete_backend_usage(&self, service_id: i64, id: i64) -> Result<(), ApiError> {
        self.delete(&paths::backend_usage(service_id, id)).await
    }

    async fn list_policies(&self, service_id: i64) -> Result<Vec<PolicyConfig>, ApiError> {
        let path = paths::policies(service_id);
        let value = self.get(&path).await?;
        let list = value.get("policies_config").cloned().unwrap_or(Value::Null);
        serde_json::from_value(list).map_err(|source| ApiError::Decode { path, source })
    }

    async fn update_policies(
        &self,
        service_id: i64,
        policies: &[PolicyConfig],
    ) -> Result<(), ApiError> {
        let path = paths::policies(service_id);
        let policies_config =
            serde_json::to_string(policies).map_err(|source| ApiError::Decode {
                path: path.clone(),
                source,
            })?;
        self.put(&path, &PoliciesForm { policies_config }).await
    }

    async fn list_application_plans(
        &self,
        service_id: i64,
    ) -> Result<Vec<ApplicationPlan>, ApiError> {
        let path = paths::application_plans(service_id);
        let value = self.get(&path).await?;
        unwrap_list(&path, value, Some("plans"), "application_plan")
    }

    async fn create_application_plan(
        &self,
        service_id: i64,
        params: &ApplicationPlanParams,
    ) -> Result<ApplicationPlan, ApiError> {
        let path = paths::application_plans(service_id);
        let value = self.post(&path, params).await?;
        unwrap_item(&path, value, "application_plan")
    }

    async fn update_application_plan(
        &self,
        service_id: i64,
        id: i64,
        patch: &ApplicationPlanPatch,
    ) -> Result<(), ApiError> {
        self.put(&paths::application_plan(service_id, id), patch).await
    }

    async fn delete_application_plan(&self, service_id: i64, id: i64) -> Result<(), ApiError> {
        self.delete(&paths::application_plan(service_id, id)).await
    }

    async fn list_limits(&self, plan_id: i64) -> Result<Vec<Limit>, ApiError> {
        let path = paths::plan_limits(plan_id);
        let value = self.get(&path).await?;
        unwrap_list(&path, value, Some("limits"), "limit")
    }

    async fn create_limit(
        &self,
        plan_id: i64,
        metric_id: i64,
        params: &LimitParams,
    ) -> Result<Limit, ApiError> {
        let path = paths::metric_limits(plan_id, metric_id);
        let value = self.post(&path, params).await?;
        unwrap_item(&path, value, "limit")
    }

    async fn update_limit(
        &self,
        plan_id: i64,
        metric_id: i64,
        id: i64,
        patch: &LimitPatch,
    ) -> Result<(), ApiError> {
        self.put(&paths::metric_limit(plan_id, metric_id, id), patch).await
    }

    async fn delete_limit(&self, plan_id: i64, metric_id: i64, id: i64) -> Result<(), ApiError> {
        self.delete(&paths::metric_limit(plan_id, metric_id, id)).await
    }

    async fn list_applications(&self, account_id: i64) -> Result<Vec<Application>, ApiError> {
        let path = paths::applications(account_id);
        let value = self.get(&path).await?;
        unwrap_list(&path, value, Some("applications"), "application")
    }

    async fn create_application(
        &self,
        account_id: i64,
        params: &ApplicationParams,
    ) -> Result<Application, ApiError> {
        let path = paths::applications(account_id);
        let value = self.post(&path, params).await?;
        unwrap_item(&path, value, "application")
    }

    async fn update_application(
        &self,
        account_id: i64,
        id: i64,
        patch: &ApplicationPatch,
    ) -> Result<(), ApiError> {
        self.put(&paths::application(account_id, id), patch).await
    }

    async fn change_application_plan(
        &self,
        account_id: i64,
        id: i64,
        plan_id: i64,
    ) -> Result<(), ApiError> {
        self.put(
            &paths::application_change_plan(account_id, id),
            &ChangePlanForm { plan_id },
        )
        .await
    }

    async fn suspend_application(&self, account_id: i64, id: i64) -> Result<(), ApiError> {
        self.put_empty(&paths::application_suspend(account_id, id)).await
    }

    async fn resume_application(&self, account_id: i64, id: i64) -> Result<(), ApiError> {
        self.put_empty(&paths::application_resume(account_id, id)).await
    }

    async fn delete_application(&self, account_id: i64, id: i64) -> Result<(), ApiError> {
        self.delete(&paths::application(account_id, id)).await
    }
}
