//! # Admin API Contract
//!
//! CRUD operations the sync tasks need from 3scale. [`ThreescaleClient`]
//! implements it over HTTP; tests provide in-memory fakes.
//!
//! [`ThreescaleClient`]: super::ThreescaleClient

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

#[async_trait]
pub trait AdminApi: Send + Sync {
    async fn list_backend_apis(&self) -> Result<Vec<BackendApi>, ApiError>;
    async fn create_backend_api(&self, params: &BackendApiParams) -> Result<BackendApi, ApiError>;
    async fn update_backend_api(&self, id: i64, patch: &BackendApiPatch) -> Result<(), ApiError>;
    async fn delete_backend_api(&self, id: i64) -> Result<(), ApiError>;

    async fn list_services(&self) -> Result<Vec<Service>, ApiError>;
    async fn create_service(&self, params: &ServiceParams) -> Result<Service, ApiError>;
    async fn update_service(&self, id: i64, patch: &ServicePatch) -> Result<(), ApiError>;
    async fn delete_service(&self, id: i64) -> Result<(), ApiError>;

    /// Metrics of a scope. The listing includes methods.
    async fn list_metrics(&self, scope: Scope) -> Result<Vec<Metric>, ApiError>;
    async fn create_metric(&self, scope: Scope, params: &MetricParams) -> Result<Metric, ApiError>;
    async fn update_metric(&self, scope: Scope, id: i64, patch: &MetricPatch) -> Result<(), ApiError>;
    async fn delete_metric(&self, scope: Scope, id: i64) -> Result<(), ApiError>;

    /// Methods of a scope, children of its `hits` metric
    async fn list_methods(&self, scope: Scope, hits_id: i64) -> Result<Vec<Method>, ApiError>;
    async fn create_method(
        &self,
        scope: Scope,
        hits_id: i64,
        params: &MethodParams,
    ) -> Result<Method, ApiError>;
    async fn update_method(
        &self,
        scope: Scope,
        hits_id: i64,
        id: i64,
        patch: &MethodPatch,
    ) -> Result<(), ApiError>;
    async fn delete_method(&self, scope: Scope, hits_id: i64, id: i64) -> Result<(), ApiError>;

    /// Mapping rules of a scope, ordered by position
    async fn list_mapping_rules(&self, scope: Scope) -> Result<Vec<MappingRule>, ApiError>;
    async fn create_mapping_rule(
        &self,
        scope: Scope,
        params: &MappingRuleParams,
    ) -> Result<MappingRule, ApiError>;
    async fn update_mapping_rule(
        &self,
        scope: Scope,
        id: i64,
        patch: &MappingRulePatch,
    ) -> Result<(), ApiError>;
    async fn delete_mapping_rule(&self, scope: Scope, id: i64) -> Result<(), ApiError>;

    async fn list_backend_usages(&self, service_id: i64) -> Result<Vec<BackendUsage>, ApiError>;
    async fn create_backend_usage(
        &self,
        service_id: i64,
        params: &BackendUsageParams,
    ) -> Result<BackendUsage, ApiError>;
    async fn update_backend_usage(
        &self,
        service_id: i64,
        id: i64,
        patch: &BackendUsagePatch,
    ) -> Result<(), ApiError>;
    async fn delete_backend_usage(&self, service_id: i64, id: i64) -> Result<(), ApiError>;

    async fn list_policies(&self, service_id: i64) -> Result<Vec<PolicyConfig>, ApiError>;
    /// Replace the whole policy chain
    async fn update_policies(
        &self,
        service_id: i64,
        policies: &[PolicyConfig],
    ) -> Result<(), ApiError>;

    async fn list_application_plans(
        &self,
        service_id: i64,
    ) -> Result<Vec<ApplicationPlan>, ApiError>;
    async fn create_application_plan(
        &self,
        service_id: i64,
        params: &ApplicationPlanParams,
    ) -> Result<ApplicationPlan, ApiError>;
    async fn update_application_plan(
        &self,
        service_id: i64,
        id: i64,
        patch: &ApplicationPlanPatch,
    ) -> Result<(), ApiError>;
    async fn delete_application_plan(&self, service_id: i64, id: i64) -> Result<(), ApiError>;

    async fn list_limits(&self, plan_id: i64) -> Result<Vec<Limit>, ApiError>;
    async fn create_limit(
        &self,
        plan_id: i64,
        metric_id: i64,
        params: &LimitParams,
    ) -> Result<Limit, ApiError>;
    async fn update_limit(
        &self,
        plan_id: i64,
        metric_id: i64,
        id: i64,
        patch: &LimitPatch,
    ) -> Result<(), ApiError>;
    async fn delete_limit(&self, plan_id: i64, metric_id: i64, id: i64) -> Result<(), ApiError>;

    async fn list_applications(&self, account_id: i64) -> Result<Vec<Application>, ApiError>;
    async fn create_application(
        &self,
        account_id: i64,
        params: &ApplicationParams,
    ) -> Result<Application, ApiError>;
    async fn update_application(
        &self,
        account_id: i64,
        id: i64,
        patch: &ApplicationPatch,
    ) -> Result<(), ApiError>;
    async fn change_application_plan(
        &self,
        account_id: i64,
        id: i64,
        plan_id: i64,
    ) -> Result<(), ApiError>;
    async fn suspend_application(&self, account_id: i64, id: i64) -> Result<(), ApiError>;
    async fn resume_application(&self, account_id: i64, id: i64) -> Result<(), ApiError>;
    async fn delete_application(&self, account_id: i64, id: i64) -> Result<(), ApiError>;
}
