//! Shared fixtures for the reconciliation tests
//!
//! - [`FakeAdminApi`]: in-memory 3scale tenant that renumbers mapping rule
//!   positions the way the real admin API does and records every call
//! - [`InMemoryStore`]: object store for Backend, Product and Application
//!   resources with injectable write conflicts
//! - [`FakeAccounts`]: provider account lookup handing out the fake tenant

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use capabilities_controller::config::ControllerConfig;
use capabilities_controller::constants::{
    APPLICATION_FINALIZER, BACKEND_FINALIZER, PRODUCT_FINALIZER,
};
use capabilities_controller::controller::provider_account::{AdminApiFactory, Connection};
use capabilities_controller::controller::reconciler::Reconciler;
use capabilities_controller::controller::store::{ensure_finalizer, ObjectStore};
use capabilities_controller::crd::{
    Application, ApplicationSpec, Backend, BackendSpec, MappingRuleSpec, MethodSpec, MetricSpec,
    Product, ProductRef, ProductSpec, ProviderAccountRef, RemoteStatus,
};
use capabilities_controller::engine::{Converging, StatusWriter, StoreError, SyncError};
use capabilities_controller::remote::types::{
    Application as RemoteApplication, ApplicationParams, ApplicationPatch, ApplicationPlan, ApplicationPlanParams, ApplicationPlanPatch, BackendApi, BackendApiParams,
    BackendApiPatch, BackendUsage, BackendUsageParams, BackendUsagePatch, Limit, LimitParams,
    LimitPatch, MappingRule, MappingRuleParams, MappingRulePatch, Method, MethodParams,
    MethodPatch, Metric, MetricParams, MetricPatch, PolicyConfig, Service, ServiceParams,
    ServicePatch,
};
use capabilities_controller::remote::{AdminApi, ApiError, Scope};
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

pub const NAMESPACE: &str = "apis";
pub const HOST: &str = "acme-admin.3scale.net";

fn not_found(what: impl std::fmt::Display) -> ApiError {
    ApiError::NotFound {
        path: what.to_string(),
    }
}

fn unprocessable(message: impl Into<String>) -> ApiError {
    ApiError::Http {
        status: 422,
        path: String::new(),
        body: message.into(),
    }
}

/// Metric or method of a scope. Methods have the `hits` metric as parent.
#[derive(Debug, Clone)]
struct MetricEntry {
    scope: Scope,
    parent: Option<i64>,
    metric: Metric,
}

#[derive(Debug, Default)]
struct Tenant {
    next_id: i64,
    backend_apis: Vec<BackendApi>,
    services: Vec<Service>,
    metrics: Vec<MetricEntry>,
    mapping_rules: HashMap<Scope, Vec<MappingRule>>,
    backend_usages: Vec<BackendUsage>,
    policies: HashMap<i64, Vec<PolicyConfig>>,
    plans: Vec<(i64, ApplicationPlan)>,
    limits: Vec<(i64, Limit)>,
    /// Developer account ID -> its applications
    accounts: BTreeMap<i64, Vec<RemoteApplication>>,
    calls: Vec<String>,
    mutations: usize,
}

impl Tenant {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn mutate(&mut self, call: String) {
        self.mutations += 1;
        self.calls.push(call);
    }

    /// 3scale rejects a second metric or method with the same display name
    fn friendly_name_taken(&self, scope: Scope, friendly_name: &str) -> bool {
        self.metrics
            .iter()
            .any(|e| e.scope == scope && e.metric.friendly_name == friendly_name)
    }

    fn add_hits(&mut self, scope: Scope) {
        let id = self.id();
        self.metrics.push(MetricEntry {
            scope,
            parent: None,
            metric: Metric {
                id,
                system_name: "hits".to_string(),
                friendly_name: "Hits".to_string(),
                unit: "hit".to_string(),
                description: "Number of API hits".to_string(),
            },
        });
    }

    fn rules(&mut self, scope: Scope) -> &mut Vec<MappingRule> {
        self.mapping_rules.entry(scope).or_default()
    }

    fn applications(&mut self, account_id: i64) -> Result<&mut Vec<RemoteApplication>, ApiError> {
        self.accounts
            .get_mut(&account_id)
            .ok_or_else(|| not_found(format!("account {account_id}")))
    }

    fn application(
        &mut self,
        account_id: i64,
        id: i64,
    ) -> Result<&mut RemoteApplication, ApiError> {
        self.applications(account_id)?
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| not_found(format!("application {id}")))
    }
}

/// Positions are 1-based and always contiguous, as 3scale keeps them
fn renumber(rules: &mut [MappingRule]) {
    for (index, rule) in rules.iter_mut().enumerate() {
        rule.position = u32::try_from(index + 1).unwrap();
    }
}

fn insert_at(rules: &mut Vec<MappingRule>, rule: MappingRule, position: u32) {
    let index = usize::try_from(position).unwrap().saturating_sub(1).min(rules.len());
    rules.insert(index, rule);
    renumber(rules);
}

/// In-memory 3scale tenant
#[derive(Debug, Default)]
pub struct FakeAdminApi {
    tenant: Mutex<Tenant>,
}

impl FakeAdminApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn tenant(&self) -> std::sync::MutexGuard<'_, Tenant> {
        self.tenant.lock().unwrap()
    }

    /// Mutating calls made so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.tenant().calls.clone()
    }

    pub fn mutations(&self) -> usize {
        self.tenant().mutations
    }

    pub fn reset_calls(&self) {
        let mut tenant = self.tenant();
        tenant.calls.clear();
        tenant.mutations = 0;
    }

    pub fn backend_id(&self, system_name: &str) -> Option<i64> {
        self.tenant()
            .backend_apis
            .iter()
            .find(|b| b.system_name == system_name)
            .map(|b| b.id)
    }

    pub fn service_id(&self, system_name: &str) -> Option<i64> {
        self.tenant()
            .services
            .iter()
            .find(|s| s.system_name == system_name)
            .map(|s| s.id)
    }

    /// Method system names of a scope, sorted
    pub fn method_names(&self, scope: Scope) -> Vec<String> {
        let mut names: Vec<String> = self
            .tenant()
            .metrics
            .iter()
            .filter(|e| e.scope == scope && e.parent.is_some())
            .map(|e| e.metric.system_name.clone())
            .collect();
        names.sort();
        names
    }

    /// Metric system names of a scope, methods excluded, sorted
    pub fn metric_names(&self, scope: Scope) -> Vec<String> {
        let mut names: Vec<String> = self
            .tenant()
            .metrics
            .iter()
            .filter(|e| e.scope == scope && e.parent.is_none())
            .map(|e| e.metric.system_name.clone())
            .collect();
        names.sort();
        names
    }

    /// `METHOD pattern` of every rule of a scope, in position order
    pub fn rule_order(&self, scope: Scope) -> Vec<String> {
        let mut tenant = self.tenant();
        let mut rules = tenant.rules(scope).clone();
        rules.sort_by_key(|r| r.position);
        rules
            .into_iter()
            .map(|r| format!("{} {}", r.http_method, r.pattern))
            .collect()
    }

    pub fn usage_paths(&self, service_id: i64) -> BTreeMap<i64, String> {
        self.tenant()
            .backend_usages
            .iter()
            .filter(|u| u.service_id == service_id)
            .map(|u| (u.backend_api_id, u.path.clone()))
            .collect()
    }

    pub fn plans(&self, service_id: i64) -> Vec<ApplicationPlan> {
        self.tenant()
            .plans
            .iter()
            .filter(|(service, _)| *service == service_id)
            .map(|(_, plan)| plan.clone())
            .collect()
    }

    pub fn limits(&self, plan_id: i64) -> Vec<Limit> {
        self.tenant()
            .limits
            .iter()
            .filter(|(plan, _)| *plan == plan_id)
            .map(|(_, limit)| limit.clone())
            .collect()
    }

    pub fn policies(&self, service_id: i64) -> Vec<PolicyConfig> {
        self.tenant()
            .policies
            .get(&service_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn metric_id(&self, scope: Scope, system_name: &str) -> Option<i64> {
        self.tenant()
            .metrics
            .iter()
            .find(|e| e.scope == scope && e.metric.system_name == system_name)
            .map(|e| e.metric.id)
    }

    /// Seed a backend straight into the tenant, bypassing the call log
    pub fn seed_backend(&self, system_name: &str) -> i64 {
        let mut tenant = self.tenant();
        let id = tenant.id();
        tenant.backend_apis.push(BackendApi {
            id,
            name: system_name.to_string(),
            system_name: system_name.to_string(),
            description: String::new(),
            private_endpoint: "https://seeded.example.com".to_string(),
        });
        tenant.add_hits(Scope::Backend(id));
        id
    }

    /// Create a developer account with no applications
    pub fn seed_account(&self) -> i64 {
        let mut tenant = self.tenant();
        let id = tenant.id();
        tenant.accounts.insert(id, Vec::new());
        id
    }

    pub fn applications(&self, account_id: i64) -> Vec<RemoteApplication> {
        self.tenant()
            .accounts
            .get(&account_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Seed a metric under a scope, bypassing the call log
    pub fn seed_metric(&self, scope: Scope, system_name: &str) -> i64 {
        let mut tenant = self.tenant();
        let id = tenant.id();
        tenant.metrics.push(MetricEntry {
            scope,
            parent: None,
            metric: Metric {
                id,
                system_name: system_name.to_string(),
                friendly_name: system_name.to_string(),
                unit: "hit".to_string(),
                description: String::new(),
            },
        });
        id
    }
}

#[async_trait]
impl AdminApi for FakeAdminApi {
    async fn list_backend_apis(&self) -> Result<Vec<BackendApi>, ApiError> {
        Ok(self.tenant().backend_apis.clone())
    }

    async fn create_backend_api(&self, params: &BackendApiParams) -> Result<BackendApi, ApiError> {
        let mut tenant = self.tenant();
        if tenant
            .backend_apis
            .iter()
            .any(|b| b.system_name == params.system_name)
        {
            return Err(unprocessable("system_name has already been taken"));
        }
        let id = tenant.id();
        let created = BackendApi {
            id,
            name: params.name.clone(),
            system_name: params.system_name.clone(),
            description: params.description.clone(),
            private_endpoint: params.private_endpoint.clone(),
        };
        tenant.backend_apis.push(created.clone());
        tenant.add_hits(Scope::Backend(id));
        tenant.mutate(format!("create backend {}", params.system_name));
        Ok(created)
    }

    async fn update_backend_api(&self, id: i64, patch: &BackendApiPatch) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let backend = tenant
            .backend_apis
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| not_found(format!("backend {id}")))?;
        if let Some(name) = &patch.name {
            backend.name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            backend.description.clone_from(description);
        }
        if let Some(endpoint) = &patch.private_endpoint {
            backend.private_endpoint.clone_from(endpoint);
        }
        tenant.mutate(format!("update backend {id}"));
        Ok(())
    }

    async fn delete_backend_api(&self, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        if !tenant.backend_apis.iter().any(|b| b.id == id) {
            return Err(not_found(format!("backend {id}")));
        }
        if tenant.backend_usages.iter().any(|u| u.backend_api_id == id) {
            return Err(unprocessable("backend api is used by a product"));
        }
        tenant.backend_apis.retain(|b| b.id != id);
        tenant.metrics.retain(|e| e.scope != Scope::Backend(id));
        tenant.mutate(format!("delete backend {id}"));
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<Service>, ApiError> {
        Ok(self.tenant().services.clone())
    }

    async fn create_service(&self, params: &ServiceParams) -> Result<Service, ApiError> {
        let mut tenant = self.tenant();
        let id = tenant.id();
        let created = Service {
            id,
            name: params.name.clone(),
            system_name: params.system_name.clone(),
            description: params.description.clone(),
            deployment_option: params
                .deployment_option
                .clone()
                .unwrap_or_else(|| "hosted".to_string()),
        };
        tenant.services.push(created.clone());
        tenant.add_hits(Scope::Product(id));
        tenant.mutate(format!("create product {}", params.system_name));
        Ok(created)
    }

    async fn update_service(&self, id: i64, patch: &ServicePatch) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let service = tenant
            .services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found(format!("product {id}")))?;
        if let Some(name) = &patch.name {
            service.name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            service.description.clone_from(description);
        }
        if let Some(option) = &patch.deployment_option {
            service.deployment_option.clone_from(option);
        }
        tenant.mutate(format!("update product {id}"));
        Ok(())
    }

    async fn delete_service(&self, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        if !tenant.services.iter().any(|s| s.id == id) {
            return Err(not_found(format!("product {id}")));
        }
        tenant.services.retain(|s| s.id != id);
        tenant.backend_usages.retain(|u| u.service_id != id);
        tenant.metrics.retain(|e| e.scope != Scope::Product(id));
        tenant.mutate(format!("delete product {id}"));
        Ok(())
    }

    async fn list_metrics(&self, scope: Scope) -> Result<Vec<Metric>, ApiError> {
        Ok(self
            .tenant()
            .metrics
            .iter()
            .filter(|e| e.scope == scope)
            .map(|e| e.metric.clone())
            .collect())
    }

    async fn create_metric(&self, scope: Scope, params: &MetricParams) -> Result<Metric, ApiError> {
        let mut tenant = self.tenant();
        if tenant
            .metrics
            .iter()
            .any(|e| e.scope == scope && e.metric.system_name == params.system_name)
        {
            return Err(unprocessable("system_name has already been taken"));
        }
        if tenant.friendly_name_taken(scope, &params.friendly_name) {
            return Err(unprocessable("friendly_name has already been taken"));
        }
        let id = tenant.id();
        let metric = Metric {
            id,
            system_name: params.system_name.clone(),
            friendly_name: params.friendly_name.clone(),
            unit: params.unit.clone(),
            description: params.description.clone(),
        };
        tenant.metrics.push(MetricEntry {
            scope,
            parent: None,
            metric: metric.clone(),
        });
        tenant.mutate(format!("create metric {}", params.system_name));
        Ok(metric)
    }

    async fn update_metric(&self, scope: Scope, id: i64, patch: &MetricPatch) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let entry = tenant
            .metrics
            .iter_mut()
            .find(|e| e.scope == scope && e.metric.id == id)
            .ok_or_else(|| not_found(format!("metric {id}")))?;
        if let Some(name) = &patch.friendly_name {
            entry.metric.friendly_name.clone_from(name);
        }
        if let Some(unit) = &patch.unit {
            entry.metric.unit.clone_from(unit);
        }
        if let Some(description) = &patch.description {
            entry.metric.description.clone_from(description);
        }
        let system_name = entry.metric.system_name.clone();
        tenant.mutate(format!("update metric {system_name}"));
        Ok(())
    }

    async fn delete_metric(&self, scope: Scope, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let system_name = tenant
            .metrics
            .iter()
            .find(|e| e.scope == scope && e.metric.id == id)
            .map(|e| e.metric.system_name.clone())
            .ok_or_else(|| not_found(format!("metric {id}")))?;
        tenant.metrics.retain(|e| e.metric.id != id);
        tenant.mutate(format!("delete metric {system_name}"));
        Ok(())
    }

    async fn list_methods(&self, scope: Scope, hits_id: i64) -> Result<Vec<Method>, ApiError> {
        Ok(self
            .tenant()
            .metrics
            .iter()
            .filter(|e| e.scope == scope && e.parent == Some(hits_id))
            .map(|e| Method {
                id: e.metric.id,
                system_name: e.metric.system_name.clone(),
                friendly_name: e.metric.friendly_name.clone(),
                description: e.metric.description.clone(),
            })
            .collect())
    }

    async fn create_method(
        &self,
        scope: Scope,
        hits_id: i64,
        params: &MethodParams,
    ) -> Result<Method, ApiError> {
        let mut tenant = self.tenant();
        if tenant
            .metrics
            .iter()
            .any(|e| e.scope == scope && e.metric.system_name == params.system_name)
        {
            return Err(unprocessable("system_name has already been taken"));
        }
        if tenant.friendly_name_taken(scope, &params.friendly_name) {
            return Err(unprocessable("friendly_name has already been taken"));
        }
        let id = tenant.id();
        tenant.metrics.push(MetricEntry {
            scope,
            parent: Some(hits_id),
            metric: Metric {
                id,
                system_name: params.system_name.clone(),
                friendly_name: params.friendly_name.clone(),
                unit: "hit".to_string(),
                description: params.description.clone(),
            },
        });
        tenant.mutate(format!("create method {}", params.system_name));
        Ok(Method {
            id,
            system_name: params.system_name.clone(),
            friendly_name: params.friendly_name.clone(),
            description: params.description.clone(),
        })
    }

    async fn update_method(
        &self,
        scope: Scope,
        _hits_id: i64,
        id: i64,
        patch: &MethodPatch,
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let entry = tenant
            .metrics
            .iter_mut()
            .find(|e| e.scope == scope && e.metric.id == id && e.parent.is_some())
            .ok_or_else(|| not_found(format!("method {id}")))?;
        if let Some(name) = &patch.friendly_name {
            entry.metric.friendly_name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            entry.metric.description.clone_from(description);
        }
        let system_name = entry.metric.system_name.clone();
        tenant.mutate(format!("update method {system_name}"));
        Ok(())
    }

    async fn delete_method(&self, scope: Scope, _hits_id: i64, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let system_name = tenant
            .metrics
            .iter()
            .find(|e| e.scope == scope && e.metric.id == id && e.parent.is_some())
            .map(|e| e.metric.system_name.clone())
            .ok_or_else(|| not_found(format!("method {id}")))?;
        tenant.metrics.retain(|e| e.metric.id != id);
        tenant.mutate(format!("delete method {system_name}"));
        Ok(())
    }

    async fn list_mapping_rules(&self, scope: Scope) -> Result<Vec<MappingRule>, ApiError> {
        let mut tenant = self.tenant();
        let mut rules = tenant.rules(scope).clone();
        rules.sort_by_key(|r| r.position);
        Ok(rules)
    }

    async fn create_mapping_rule(
        &self,
        scope: Scope,
        params: &MappingRuleParams,
    ) -> Result<MappingRule, ApiError> {
        let mut tenant = self.tenant();
        let id = tenant.id();
        let rule = MappingRule {
            id,
            metric_id: params.metric_id,
            pattern: params.pattern.clone(),
            http_method: params.http_method.clone(),
            delta: params.delta,
            position: params.position,
            last: params.last,
        };
        let rules = tenant.rules(scope);
        insert_at(rules, rule.clone(), params.position);
        tenant.mutate(format!(
            "create rule {} {} at {}",
            params.http_method, params.pattern, params.position
        ));
        Ok(rule)
    }

    async fn update_mapping_rule(
        &self,
        scope: Scope,
        id: i64,
        patch: &MappingRulePatch,
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let rules = tenant.rules(scope);
        let index = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| not_found(format!("mapping rule {id}")))?;
        let mut rule = rules.remove(index);
        if let Some(metric_id) = patch.metric_id {
            rule.metric_id = metric_id;
        }
        if let Some(delta) = patch.delta {
            rule.delta = delta;
        }
        if let Some(last) = patch.last {
            rule.last = last;
        }
        let position = patch.position.unwrap_or(rule.position);
        let label = format!("{} {}", rule.http_method, rule.pattern);
        insert_at(rules, rule, position);
        tenant.mutate(format!("update rule {label} at {position}"));
        Ok(())
    }

    async fn delete_mapping_rule(&self, scope: Scope, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let rules = tenant.rules(scope);
        let index = rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| not_found(format!("mapping rule {id}")))?;
        let rule = rules.remove(index);
        renumber(rules);
        tenant.mutate(format!("delete rule {} {}", rule.http_method, rule.pattern));
        Ok(())
    }

    async fn list_backend_usages(&self, service_id: i64) -> Result<Vec<BackendUsage>, ApiError> {
        Ok(self
            .tenant()
            .backend_usages
            .iter()
            .filter(|u| u.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn create_backend_usage(
        &self,
        service_id: i64,
        params: &BackendUsageParams,
    ) -> Result<BackendUsage, ApiError> {
        let mut tenant = self.tenant();
        if !tenant
            .backend_apis
            .iter()
            .any(|b| b.id == params.backend_api_id)
        {
            return Err(unprocessable("backend api must exist"));
        }
        let id = tenant.id();
        let usage = BackendUsage {
            id,
            path: params.path.clone(),
            service_id,
            backend_api_id: params.backend_api_id,
        };
        tenant.backend_usages.push(usage.clone());
        tenant.mutate(format!("create usage {} {}", params.backend_api_id, params.path));
        Ok(usage)
    }

    async fn update_backend_usage(
        &self,
        service_id: i64,
        id: i64,
        patch: &BackendUsagePatch,
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let usage = tenant
            .backend_usages
            .iter_mut()
            .find(|u| u.service_id == service_id && u.id == id)
            .ok_or_else(|| not_found(format!("backend usage {id}")))?;
        if let Some(path) = &patch.path {
            usage.path.clone_from(path);
        }
        tenant.mutate(format!("update usage {id}"));
        Ok(())
    }

    async fn delete_backend_usage(&self, service_id: i64, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let before = tenant.backend_usages.len();
        tenant
            .backend_usages
            .retain(|u| !(u.service_id == service_id && u.id == id));
        if tenant.backend_usages.len() == before {
            return Err(not_found(format!("backend usage {id}")));
        }
        tenant.mutate(format!("delete usage {id}"));
        Ok(())
    }

    async fn list_policies(&self, service_id: i64) -> Result<Vec<PolicyConfig>, ApiError> {
        Ok(self.policies(service_id))
    }

    async fn update_policies(
        &self,
        service_id: i64,
        policies: &[PolicyConfig],
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        tenant.policies.insert(service_id, policies.to_vec());
        tenant.mutate(format!("update policies {service_id}"));
        Ok(())
    }

    async fn list_application_plans(
        &self,
        service_id: i64,
    ) -> Result<Vec<ApplicationPlan>, ApiError> {
        Ok(self.plans(service_id))
    }

    async fn create_application_plan(
        &self,
        service_id: i64,
        params: &ApplicationPlanParams,
    ) -> Result<ApplicationPlan, ApiError> {
        let mut tenant = self.tenant();
        let id = tenant.id();
        let plan = ApplicationPlan {
            id,
            name: params.name.clone(),
            system_name: params.system_name.clone(),
            state: match params.state_event.as_deref() {
                Some("publish") => "published".to_string(),
                _ => "hidden".to_string(),
            },
            approval_required: params.approval_required.unwrap_or(false),
            trial_period_days: params.trial_period_days,
            setup_fee: params.setup_fee.unwrap_or(0.0),
            cost_per_month: params.cost_per_month.unwrap_or(0.0),
        };
        tenant.plans.push((service_id, plan.clone()));
        tenant.mutate(format!("create plan {}", params.system_name));
        Ok(plan)
    }

    async fn update_application_plan(
        &self,
        service_id: i64,
        id: i64,
        patch: &ApplicationPlanPatch,
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let (_, plan) = tenant
            .plans
            .iter_mut()
            .find(|(service, plan)| *service == service_id && plan.id == id)
            .ok_or_else(|| not_found(format!("application plan {id}")))?;
        if let Some(name) = &patch.name {
            plan.name.clone_from(name);
        }
        if let Some(approval) = patch.approval_required {
            plan.approval_required = approval;
        }
        if let Some(days) = patch.trial_period_days {
            plan.trial_period_days = Some(days);
        }
        if let Some(fee) = patch.setup_fee {
            plan.setup_fee = fee;
        }
        if let Some(cost) = patch.cost_per_month {
            plan.cost_per_month = cost;
        }
        match patch.state_event.as_deref() {
            Some("publish") => plan.state = "published".to_string(),
            Some("hide") => plan.state = "hidden".to_string(),
            _ => {}
        }
        let system_name = plan.system_name.clone();
        tenant.mutate(format!("update plan {system_name}"));
        Ok(())
    }

    async fn delete_application_plan(&self, service_id: i64, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let before = tenant.plans.len();
        tenant
            .plans
            .retain(|(service, plan)| !(*service == service_id && plan.id == id));
        if tenant.plans.len() == before {
            return Err(not_found(format!("application plan {id}")));
        }
        tenant.limits.retain(|(plan, _)| *plan != id);
        tenant.mutate(format!("delete plan {id}"));
        Ok(())
    }

    async fn list_limits(&self, plan_id: i64) -> Result<Vec<Limit>, ApiError> {
        Ok(self.limits(plan_id))
    }

    async fn create_limit(
        &self,
        plan_id: i64,
        metric_id: i64,
        params: &LimitParams,
    ) -> Result<Limit, ApiError> {
        let mut tenant = self.tenant();
        let id = tenant.id();
        let limit = Limit {
            id,
            metric_id,
            period: params.period.clone(),
            value: params.value,
        };
        tenant.limits.push((plan_id, limit.clone()));
        tenant.mutate(format!("create limit {}:{metric_id}", params.period));
        Ok(limit)
    }

    async fn update_limit(
        &self,
        plan_id: i64,
        _metric_id: i64,
        id: i64,
        patch: &LimitPatch,
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let (_, limit) = tenant
            .limits
            .iter_mut()
            .find(|(plan, limit)| *plan == plan_id && limit.id == id)
            .ok_or_else(|| not_found(format!("limit {id}")))?;
        if let Some(value) = patch.value {
            limit.value = value;
        }
        tenant.mutate(format!("update limit {id}"));
        Ok(())
    }

    async fn delete_limit(&self, plan_id: i64, _metric_id: i64, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let before = tenant.limits.len();
        tenant
            .limits
            .retain(|(plan, limit)| !(*plan == plan_id && limit.id == id));
        if tenant.limits.len() == before {
            return Err(not_found(format!("limit {id}")));
        }
        tenant.mutate(format!("delete limit {id}"));
        Ok(())
    }

    async fn list_applications(&self, account_id: i64) -> Result<Vec<RemoteApplication>, ApiError> {
        Ok(self.tenant().applications(account_id)?.clone())
    }

    async fn create_application(
        &self,
        account_id: i64,
        params: &ApplicationParams,
    ) -> Result<RemoteApplication, ApiError> {
        let mut tenant = self.tenant();
        if !tenant.plans.iter().any(|(_, plan)| plan.id == params.plan_id) {
            return Err(unprocessable("plan does not exist"));
        }
        let id = tenant.id();
        let created = RemoteApplication {
            id,
            state: "live".to_string(),
            plan_id: params.plan_id,
            name: params.name.clone(),
            description: params.description.clone(),
        };
        tenant.applications(account_id)?.push(created.clone());
        tenant.mutate(format!("create application {}", params.name));
        Ok(created)
    }

    async fn update_application(
        &self,
        account_id: i64,
        id: i64,
        patch: &ApplicationPatch,
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let application = tenant.application(account_id, id)?;
        if let Some(name) = &patch.name {
            application.name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            application.description.clone_from(description);
        }
        tenant.mutate(format!("update application {id}"));
        Ok(())
    }

    async fn change_application_plan(
        &self,
        account_id: i64,
        id: i64,
        plan_id: i64,
    ) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        if !tenant.plans.iter().any(|(_, plan)| plan.id == plan_id) {
            return Err(unprocessable("plan does not exist"));
        }
        tenant.application(account_id, id)?.plan_id = plan_id;
        tenant.mutate(format!("change plan of application {id}"));
        Ok(())
    }

    async fn suspend_application(&self, account_id: i64, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        tenant.application(account_id, id)?.state = "suspended".to_string();
        tenant.mutate(format!("suspend application {id}"));
        Ok(())
    }

    async fn resume_application(&self, account_id: i64, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        tenant.application(account_id, id)?.state = "live".to_string();
        tenant.mutate(format!("resume application {id}"));
        Ok(())
    }

    async fn delete_application(&self, account_id: i64, id: i64) -> Result<(), ApiError> {
        let mut tenant = self.tenant();
        let applications = tenant.applications(account_id)?;
        let before = applications.len();
        applications.retain(|a| a.id != id);
        if applications.len() == before {
            return Err(not_found(format!("application {id}")));
        }
        tenant.mutate(format!("delete application {id}"));
        Ok(())
    }
}

/// Object store holding resources in memory
///
/// `replace` keeps the stored status like the API server does; only
/// `write_status` changes it.
#[derive(Debug)]
pub struct InMemoryStore<K> {
    objects: Mutex<BTreeMap<(String, String), K>>,
    conflict_next_status: AtomicBool,
    conflict_next_replace: AtomicBool,
    status_writes: AtomicUsize,
    replaces: AtomicUsize,
}

impl<K> Default for InMemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            conflict_next_status: AtomicBool::new(false),
            conflict_next_replace: AtomicBool::new(false),
            status_writes: AtomicUsize::new(0),
            replaces: AtomicUsize::new(0),
        }
    }
}

fn key_of<K: kube::Resource>(resource: &K) -> (String, String) {
    (resource.namespace().unwrap_or_default(), resource.name_any())
}

impl<K> InMemoryStore<K>
where
    K: kube::Resource + Converging + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, resource: K) {
        self.objects
            .lock()
            .unwrap()
            .insert(key_of(&resource), resource);
    }

    pub fn get(&self, name: &str) -> K {
        self.objects
            .lock()
            .unwrap()
            .get(&(NAMESPACE.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_else(|| panic!("{name} is not stored"))
    }

    pub fn fail_next_status_write(&self) {
        self.conflict_next_status.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_replace(&self) {
        self.conflict_next_replace.store(true, Ordering::SeqCst);
    }

    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    pub fn replaces(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K> StatusWriter<K> for InMemoryStore<K>
where
    K: kube::Resource + Converging + 'static,
{
    async fn write_status(&self, resource: &K) -> Result<(), StoreError> {
        if self.conflict_next_status.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict {
                name: resource.name_any(),
            });
        }
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .entry(key_of(resource))
            .or_insert_with(|| resource.clone());
        if let Some(status) = resource.remote_status() {
            stored.set_remote_status(status.clone());
        }
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl<K> ObjectStore<K> for InMemoryStore<K>
where
    K: kube::Resource + Converging + 'static,
{
    async fn list(&self, namespace: &str) -> Result<Vec<K>, StoreError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, resource)| resource.clone())
            .collect())
    }

    async fn replace(&self, resource: &K) -> Result<K, StoreError> {
        if self.conflict_next_replace.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict {
                name: resource.name_any(),
            });
        }
        let mut objects = self.objects.lock().unwrap();
        let mut updated = resource.clone();
        if let Some(status) = objects
            .get(&key_of(resource))
            .and_then(|stored| stored.remote_status().cloned())
        {
            updated.set_remote_status(status);
        }
        objects.insert(key_of(resource), updated.clone());
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}

/// Provider account lookup returning the fake tenant
#[derive(Debug)]
pub struct FakeAccounts {
    pub api: Arc<FakeAdminApi>,
    pub missing: AtomicBool,
}

impl FakeAccounts {
    pub fn new(api: Arc<FakeAdminApi>) -> Arc<Self> {
        Arc::new(Self {
            api,
            missing: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl AdminApiFactory for FakeAccounts {
    async fn connect(
        &self,
        namespace: &str,
        reference: Option<&ProviderAccountRef>,
    ) -> Result<Connection, SyncError> {
        if self.missing.load(Ordering::SeqCst) {
            let name = reference.map_or("threescale-provider-account", |r| r.name.as_str());
            return Err(SyncError::reference_not_found(format!(
                "provider account secret {namespace}/{name}"
            )));
        }
        Ok(Connection {
            api: self.api.clone(),
            host: HOST.to_string(),
        })
    }
}

/// Everything a test needs to drive the controllers
#[derive(Debug)]
pub struct Harness {
    pub api: Arc<FakeAdminApi>,
    pub accounts: Arc<FakeAccounts>,
    pub backends: Arc<InMemoryStore<Backend>>,
    pub products: Arc<InMemoryStore<Product>>,
    pub applications: Arc<InMemoryStore<Application>>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        let api = FakeAdminApi::new();
        let accounts = FakeAccounts::new(api.clone());
        let backends = InMemoryStore::<Backend>::new();
        let products = InMemoryStore::<Product>::new();
        let applications = InMemoryStore::<Application>::new();
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(RwLock::new(ControllerConfig::default())),
            accounts.clone(),
            backends.clone(),
            products.clone(),
            applications.clone(),
        ));
        Self {
            api,
            accounts,
            backends,
            products,
            applications,
            reconciler,
        }
    }
}

fn metadata_for<K: kube::Resource>(resource: &mut K, generation: i64) {
    let meta = resource.meta_mut();
    meta.namespace = Some(NAMESPACE.to_string());
    meta.generation = Some(generation);
    meta.resource_version = Some("1".to_string());
}

/// Backend with defaults applied and the finalizer in place, ready to sync
pub fn backend(name: &str, mut spec: BackendSpec) -> Backend {
    spec.set_defaults();
    let mut backend = Backend::new(name, spec);
    metadata_for(&mut backend, 1);
    ensure_finalizer(&mut backend, BACKEND_FINALIZER);
    backend
}

/// Product with defaults applied and the finalizer in place, ready to sync
pub fn product(name: &str, mut spec: ProductSpec) -> Product {
    spec.set_defaults();
    let mut product = Product::new(name, spec);
    metadata_for(&mut product, 1);
    ensure_finalizer(&mut product, PRODUCT_FINALIZER);
    product
}

/// Application with the finalizer in place, ready to sync
pub fn application(name: &str, spec: ApplicationSpec) -> Application {
    let mut application = Application::new(name, spec);
    metadata_for(&mut application, 1);
    ensure_finalizer(&mut application, APPLICATION_FINALIZER);
    application
}

pub fn application_spec(account_id: i64, product: &str, plan: &str) -> ApplicationSpec {
    ApplicationSpec {
        account_id,
        product_ref: ProductRef {
            name: product.to_string(),
        },
        application_plan_name: plan.to_string(),
        name: format!("{product} app"),
        ..Default::default()
    }
}

pub fn backend_spec(system_name: &str) -> BackendSpec {
    BackendSpec {
        name: format!("{system_name} API"),
        system_name: system_name.to_string(),
        private_base_url: format!("https://{system_name}.example.com"),
        ..Default::default()
    }
}

pub fn product_spec(system_name: &str) -> ProductSpec {
    ProductSpec {
        name: format!("{system_name} product"),
        system_name: system_name.to_string(),
        ..Default::default()
    }
}

pub fn method(name: &str) -> MethodSpec {
    MethodSpec {
        name: name.to_uppercase(),
        description: String::new(),
    }
}

pub fn metric(name: &str) -> MetricSpec {
    MetricSpec {
        name: name.to_uppercase(),
        unit: "hit".to_string(),
        description: String::new(),
    }
}

pub fn rule(http_method: &str, pattern: &str, metric_ref: &str) -> MappingRuleSpec {
    MappingRuleSpec {
        http_method: http_method.to_string(),
        pattern: pattern.to_string(),
        metric_method_ref: metric_ref.to_string(),
        increment: 1,
        last: None,
    }
}

/// Status of a resource its dependents see as synced
pub fn synced_status(remote_id: i64) -> RemoteStatus {
    use capabilities_controller::crd::{Condition, ConditionSet, ConditionType};
    let mut conditions = ConditionSet::new();
    conditions.set_condition(Condition::new(ConditionType::Ready, true));
    RemoteStatus {
        remote_id: Some(remote_id),
        provider_account_host: Some(HOST.to_string()),
        state: None,
        observed_generation: Some(1),
        conditions,
    }
}
