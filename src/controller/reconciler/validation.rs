//! # Validation
//!
//! Checks Backend, Product and Application specs before any remote call is made.
//!
//! Every problem found is collected into a [`SpecErrors`] list with the
//! offending field path, so the `Invalid` condition reports all of them at
//! once. A spec that fails here is not retried until it changes.

use crate::crd::{
    ApplicationSpec, BackendSpec, MappingRuleSpec, MethodSpec, MetricSpec, ProductSpec,
    HITS_METRIC,
};
use crate::engine::SpecErrors;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://\S+$").expect("Failed to compile URL regex - this should never happen")
});

static PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(\.\d{2})?$").expect("Failed to compile price regex - this should never happen")
});

const HTTP_METHODS: &[&str] = &[
    "GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "TRACE", "PATCH", "CONNECT",
];

const LIMIT_PERIODS: &[&str] = &["eternity", "year", "month", "week", "day", "hour", "minute"];

pub fn validate_backend(spec: &BackendSpec) -> Result<(), SpecErrors> {
    let mut errors = SpecErrors::new();

    if spec.name.trim().is_empty() {
        errors.push("spec.name", "Required value");
    }
    if !URL_PATTERN.is_match(&spec.private_base_url) {
        errors.push(
            "spec.privateBaseURL",
            format!(
                "Invalid value: {:?}: must be an http or https URL",
                spec.private_base_url
            ),
        );
    }

    validate_metrics_and_methods(&spec.metrics, &spec.methods, &mut errors);
    validate_mapping_rules(&spec.mapping_rules, &spec.metrics, &spec.methods, &mut errors);

    into_result(errors)
}

pub fn validate_product(spec: &ProductSpec) -> Result<(), SpecErrors> {
    let mut errors = SpecErrors::new();

    if spec.name.trim().is_empty() {
        errors.push("spec.name", "Required value");
    }
    if let Some(deployment) = &spec.deployment {
        if deployment.option().is_none() {
            errors.push(
                "spec.deployment",
                "Invalid value: exactly one of apicastHosted or apicastSelfManaged must be set",
            );
        }
    }

    validate_metrics_and_methods(&spec.metrics, &spec.methods, &mut errors);
    validate_mapping_rules(&spec.mapping_rules, &spec.metrics, &spec.methods, &mut errors);

    for (system_name, usage) in &spec.backend_usages {
        if !usage.path.starts_with('/') {
            errors.push(
                format!("spec.backendUsages[{system_name}].path"),
                format!("Invalid value: {:?}: must start with /", usage.path),
            );
        }
    }

    for (plan_name, plan) in &spec.application_plans {
        let plan_path = format!("spec.applicationPlans[{plan_name}]");
        for (field, value) in [("setupFee", &plan.setup_fee), ("costMonth", &plan.cost_month)] {
            if let Some(price) = value {
                if !PRICE_PATTERN.is_match(price) {
                    errors.push(
                        format!("{plan_path}.{field}"),
                        format!("Invalid value: {price:?}: expected a decimal with two digits"),
                    );
                }
            }
        }
        if plan.trial_period.is_some_and(|days| days < 0) {
            errors.push(format!("{plan_path}.trialPeriod"), "Invalid value: must be >= 0");
        }

        let mut limit_keys = BTreeSet::new();
        for (index, limit) in plan.limits.iter().enumerate() {
            let limit_path = format!("{plan_path}.limits[{index}]");
            if !LIMIT_PERIODS.contains(&limit.period.as_str()) {
                errors.push(
                    format!("{limit_path}.period"),
                    format!("Unsupported value: {:?}", limit.period),
                );
            }
            let reference = &limit.metric_method_ref;
            match &reference.backend_system_name {
                None => {
                    if !has_metric_or_method(&spec.metrics, &spec.methods, &reference.system_name) {
                        errors.push(
                            format!("{limit_path}.metricMethodRef"),
                            format!(
                                "Invalid value: {:?}: limit does not have valid local metric or method reference",
                                reference.system_name
                            ),
                        );
                    }
                }
                Some(backend) => {
                    if !spec.backend_usages.contains_key(backend) {
                        errors.push(
                            format!("{limit_path}.metricMethodRef.backend"),
                            format!("Invalid value: {backend:?}: backend is not used by the product"),
                        );
                    }
                }
            }
            if !limit_keys.insert(limit.key()) {
                errors.push(
                    limit_path,
                    format!(
                        "Duplicate value: {}: limit period is not unique for the same metric",
                        limit.key()
                    ),
                );
            }
        }
    }

    if let Some(policies) = &spec.policies {
        for (index, policy) in policies.iter().enumerate() {
            if policy.name.trim().is_empty() {
                errors.push(format!("spec.policies[{index}].name"), "Required value");
            }
            if !policy.configuration.is_object() {
                errors.push(
                    format!("spec.policies[{index}].configuration"),
                    "Invalid value: must be an object",
                );
            }
        }
    }

    into_result(errors)
}

pub fn validate_application(spec: &ApplicationSpec) -> Result<(), SpecErrors> {
    let mut errors = SpecErrors::new();

    if spec.account_id <= 0 {
        errors.push(
            "spec.accountId",
            format!("Invalid value: {}: must be a 3scale account ID", spec.account_id),
        );
    }
    if spec.product_ref.name.trim().is_empty() {
        errors.push("spec.productRef.name", "Required value");
    }
    if spec.application_plan_name.trim().is_empty() {
        errors.push("spec.applicationPlanName", "Required value");
    }
    if spec.name.trim().is_empty() {
        errors.push("spec.name", "Required value");
    }

    into_result(errors)
}

fn into_result(errors: SpecErrors) -> Result<(), SpecErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn has_metric_or_method(
    metrics: &BTreeMap<String, MetricSpec>,
    methods: &BTreeMap<String, MethodSpec>,
    system_name: &str,
) -> bool {
    metrics.contains_key(system_name) || methods.contains_key(system_name)
}

/// `hits` present, system names and friendly names unique across metrics and methods
fn validate_metrics_and_methods(
    metrics: &BTreeMap<String, MetricSpec>,
    methods: &BTreeMap<String, MethodSpec>,
    errors: &mut SpecErrors,
) {
    if metrics.is_empty() {
        errors.push("spec.metrics", "Required value: empty metrics is not valid");
    } else if !metrics.contains_key(HITS_METRIC) {
        errors.push("spec.metrics", "Invalid value: 'hits' metric must exist");
    }

    for system_name in methods.keys() {
        if metrics.contains_key(system_name) {
            errors.push(
                format!("spec.methods[{system_name}]"),
                format!("Duplicate value: {system_name:?}: method system_name not unique"),
            );
        }
    }

    let mut friendly_names = BTreeSet::new();
    for (system_name, metric) in metrics {
        if !friendly_names.insert(metric.name.as_str()) {
            errors.push(
                format!("spec.metrics[{system_name}]"),
                format!("Duplicate value: {:?}: metric name not unique", metric.name),
            );
        }
    }
    for (system_name, method) in methods {
        if !friendly_names.insert(method.name.as_str()) {
            errors.push(
                format!("spec.methods[{system_name}]"),
                format!("Duplicate value: {:?}: method name not unique", method.name),
            );
        }
    }
}

fn validate_mapping_rules(
    rules: &[MappingRuleSpec],
    metrics: &BTreeMap<String, MetricSpec>,
    methods: &BTreeMap<String, MethodSpec>,
    errors: &mut SpecErrors,
) {
    let mut keys = BTreeSet::new();
    for (index, rule) in rules.iter().enumerate() {
        let path = format!("spec.mappingRules[{index}]");
        if !HTTP_METHODS.contains(&rule.http_method.to_uppercase().as_str()) {
            errors.push(
                format!("{path}.httpMethod"),
                format!("Unsupported value: {:?}", rule.http_method),
            );
        }
        if !rule.pattern.starts_with('/') {
            errors.push(
                format!("{path}.pattern"),
                format!("Invalid value: {:?}: must start with /", rule.pattern),
            );
        }
        if !has_metric_or_method(metrics, methods, &rule.metric_method_ref) {
            errors.push(
                format!("{path}.metricMethodRef"),
                format!(
                    "Invalid value: {:?}: mapping rule does not have valid metric or method reference",
                    rule.metric_method_ref
                ),
            );
        }
        if !keys.insert(rule.key()) {
            errors.push(path, format!("Duplicate value: {}", rule.key()));
        }
    }
}
