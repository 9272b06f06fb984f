//! Shared 3scale admin API path definitions
//!
//! This crate centralizes all admin API paths used by the REST client.
//!
//! Methods, metrics and mapping rules exist under both backend APIs and
//! products (services); [`Scope`] selects which parent a path hangs off.

/// Base path of the account management API
pub const ADMIN_API: &str = "/admin/api";

/// Parent entity of a metric, method or mapping rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Backend API (`/admin/api/backend_apis/{id}`)
    Backend(i64),
    /// Product (`/admin/api/services/{id}`)
    Product(i64),
}

impl Scope {
    /// Numeric ID of the parent entity
    pub fn id(&self) -> i64 {
        match self {
            Scope::Backend(id) | Scope::Product(id) => *id,
        }
    }

    fn prefix(&self) -> String {
        match self {
            Scope::Backend(id) => format!("{ADMIN_API}/backend_apis/{id}"),
            Scope::Product(id) => format!("{ADMIN_API}/services/{id}"),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Backend(id) => write!(f, "backend {id}"),
            Scope::Product(id) => write!(f, "product {id}"),
        }
    }
}

pub fn backend_apis() -> String {
    format!("{ADMIN_API}/backend_apis.json")
}

pub fn backend_api(id: i64) -> String {
    format!("{ADMIN_API}/backend_apis/{id}.json")
}

pub fn services() -> String {
    format!("{ADMIN_API}/services.json")
}

pub fn service(id: i64) -> String {
    format!("{ADMIN_API}/services/{id}.json")
}

/// Metrics of a scope. The remote list also contains methods.
pub fn metrics(scope: Scope) -> String {
    format!("{}/metrics.json", scope.prefix())
}

pub fn metric(scope: Scope, metric_id: i64) -> String {
    format!("{}/metrics/{metric_id}.json", scope.prefix())
}

/// Methods hang off the `hits` metric of their scope
pub fn methods(scope: Scope, hits_id: i64) -> String {
    format!("{}/metrics/{hits_id}/methods.json", scope.prefix())
}

pub fn method(scope: Scope, hits_id: i64, method_id: i64) -> String {
    format!("{}/metrics/{hits_id}/methods/{method_id}.json", scope.prefix())
}

/// Product mapping rules live under the proxy, backend ones directly under the backend
pub fn mapping_rules(scope: Scope) -> String {
    match scope {
        Scope::Backend(_) => format!("{}/mapping_rules.json", scope.prefix()),
        Scope::Product(_) => format!("{}/proxy/mapping_rules.json", scope.prefix()),
    }
}

pub fn mapping_rule(scope: Scope, rule_id: i64) -> String {
    match scope {
        Scope::Backend(_) => format!("{}/mapping_rules/{rule_id}.json", scope.prefix()),
        Scope::Product(_) => format!("{}/proxy/mapping_rules/{rule_id}.json", scope.prefix()),
    }
}

pub fn backend_usages(product_id: i64) -> String {
    format!("{ADMIN_API}/services/{product_id}/backend_usages.json")
}

pub fn backend_usage(product_id: i64, usage_id: i64) -> String {
    format!("{ADMIN_API}/services/{product_id}/backend_usages/{usage_id}.json")
}

pub fn policies(product_id: i64) -> String {
    format!("{ADMIN_API}/services/{product_id}/proxy/policies.json")
}

pub fn application_plans(product_id: i64) -> String {
    format!("{ADMIN_API}/services/{product_id}/application_plans.json")
}

pub fn application_plan(product_id: i64, plan_id: i64) -> String {
    format!("{ADMIN_API}/services/{product_id}/application_plans/{plan_id}.json")
}

pub fn plan_limits(plan_id: i64) -> String {
    format!("{ADMIN_API}/application_plans/{plan_id}/limits.json")
}

pub fn metric_limits(plan_id: i64, metric_id: i64) -> String {
    format!("{ADMIN_API}/application_plans/{plan_id}/metrics/{metric_id}/limits.json")
}

pub fn metric_limit(plan_id: i64, metric_id: i64, limit_id: i64) -> String {
    format!("{ADMIN_API}/application_plans/{plan_id}/metrics/{metric_id}/limits/{limit_id}.json")
}

/// Applications of a developer account
pub fn applications(account_id: i64) -> String {
    format!("{ADMIN_API}/accounts/{account_id}/applications.json")
}

pub fn application(account_id: i64, application_id: i64) -> String {
    format!("{ADMIN_API}/accounts/{account_id}/applications/{application_id}.json")
}

pub fn application_change_plan(account_id: i64, application_id: i64) -> String {
    format!("{ADMIN_API}/accounts/{account_id}/applications/{application_id}/change_plan.json")
}

pub fn application_suspend(account_id: i64, application_id: i64) -> String {
    format!("{ADMIN_API}/accounts/{account_id}/applications/{application_id}/suspend.json")
}

pub fn application_resume(account_id: i64, application_id: i64) -> String {
    format!("{ADMIN_API}/accounts/{account_id}/applications/{application_id}/resume.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_prefixes() {
        assert_eq!(
            metrics(Scope::Backend(7)),
            "/admin/api/backend_apis/7/metrics.json"
        );
        assert_eq!(metrics(Scope::Product(3)), "/admin/api/services/3/metrics.json");
    }

    #[test]
    fn test_mapping_rules_live_under_proxy_for_products() {
        assert_eq!(
            mapping_rules(Scope::Product(3)),
            "/admin/api/services/3/proxy/mapping_rules.json"
        );
        assert_eq!(
            mapping_rule(Scope::Backend(7), 11),
            "/admin/api/backend_apis/7/mapping_rules/11.json"
        );
    }

    #[test]
    fn test_methods_hang_off_hits() {
        assert_eq!(
            method(Scope::Product(3), 40, 41),
            "/admin/api/services/3/metrics/40/methods/41.json"
        );
    }

    #[test]
    fn test_limit_paths() {
        assert_eq!(plan_limits(9), "/admin/api/application_plans/9/limits.json");
        assert_eq!(
            metric_limit(9, 40, 2),
            "/admin/api/application_plans/9/metrics/40/limits/2.json"
        );
    }

    #[test]
    fn test_application_paths_hang_off_account() {
        assert_eq!(applications(3), "/admin/api/accounts/3/applications.json");
        assert_eq!(
            application_change_plan(3, 12),
            "/admin/api/accounts/3/applications/12/change_plan.json"
        );
        assert_eq!(
            application_resume(3, 12),
            "/admin/api/accounts/3/applications/12/resume.json"
        );
    }
}
