use crate::types::{Request, RoutingCondition};

/// Evaluates one routing rule condition against a request (spec §4.9: the
/// five condition types `method`, `method_prefix`, `parameter`, `context`,
/// `always`). Pure and side-effect-free so rule evaluation is unit
/// testable without a live registry.
pub fn evaluate_condition(request: &Request, condition: &RoutingCondition) -> bool {
    match condition {
        RoutingCondition::Method { values } => values.iter().any(|v| v == &request.method),
        RoutingCondition::MethodPrefix { prefix } => request.method.starts_with(prefix.as_str()),
        RoutingCondition::Parameter { name, value } => {
            request.params.get(name).map(|v| v == value).unwrap_or(false)
        }
        RoutingCondition::Context { key, value } => request
            .context
            .as_ref()
            .and_then(|ctx| ctx.get(key))
            .map(|v| v == value)
            .unwrap_or(false),
        RoutingCondition::Always => true,
    }
}

/// Default method-prefix routing (spec §4.9, used when no explicit routing
/// rule matches). Returns the server type whose registered instances
/// should receive the request, or `None` if the method matches no known
/// prefix — the caller then falls back to "all healthy servers".
pub fn default_routing_server_type(method: &str) -> Option<&'static str> {
    if method.starts_with("github_") || method.starts_with("linear_") || method.starts_with("create_documentation") {
        Some("project_management")
    } else if method.starts_with("telegram_") {
        Some("telegram_tools")
    } else if method.starts_with("execute_") || method.starts_with("profile_") || method.starts_with("run_tests") {
        Some("development_tools")
    } else if matches!(
        method,
        "web_search" | "create_calendar_event" | "generate_content" | "search_knowledge_base"
    ) {
        Some("social_tools")
    } else {
        None
    }
}

/// Picks the target with the lowest in-flight count (spec §4.9 load
/// balancing). Ties break on input order, matching a stable sort by load.
pub fn select_lowest_load(candidates: &[(String, u64)]) -> Option<String> {
    candidates.iter().min_by_key(|(_, load)| *load).map(|(name, _)| name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_condition_matches_exact_set() {
        let req = Request::new("web_search");
        let cond = RoutingCondition::Method {
            values: vec!["web_search".to_string(), "generate_content".to_string()],
        };
        assert!(evaluate_condition(&req, &cond));

        let cond2 = RoutingCondition::Method { values: vec!["other".to_string()] };
        assert!(!evaluate_condition(&req, &cond2));
    }

    #[test]
    fn prefix_condition_matches_prefix() {
        let req = Request::new("github_create_issue");
        let cond = RoutingCondition::MethodPrefix { prefix: "github_".to_string() };
        assert!(evaluate_condition(&req, &cond));
    }

    #[test]
    fn parameter_condition_matches_request_param() {
        let mut req = Request::new("any");
        req.params.insert("repo".to_string(), json!("bridge"));
        let cond = RoutingCondition::Parameter {
            name: "repo".to_string(),
            value: json!("bridge"),
        };
        assert!(evaluate_condition(&req, &cond));

        let cond_mismatch = RoutingCondition::Parameter {
            name: "repo".to_string(),
            value: json!("other"),
        };
        assert!(!evaluate_condition(&req, &cond_mismatch));
    }

    #[test]
    fn context_condition_requires_context_present() {
        let req = Request::new("any");
        let cond = RoutingCondition::Context {
            key: "tenant".to_string(),
            value: json!("acme"),
        };
        assert!(!evaluate_condition(&req, &cond));
    }

    #[test]
    fn always_condition_always_matches() {
        let req = Request::new("anything");
        assert!(evaluate_condition(&req, &RoutingCondition::Always));
    }

    #[test]
    fn default_routing_maps_known_prefixes() {
        assert_eq!(default_routing_server_type("github_create_issue"), Some("project_management"));
        assert_eq!(default_routing_server_type("telegram_send"), Some("telegram_tools"));
        assert_eq!(default_routing_server_type("execute_shell"), Some("development_tools"));
        assert_eq!(default_routing_server_type("web_search"), Some("social_tools"));
        assert_eq!(default_routing_server_type("unknown_method"), None);
    }

    #[test]
    fn lowest_load_wins_ties_broken_by_order() {
        let candidates = vec![
            ("b".to_string(), 3),
            ("a".to_string(), 1),
            ("c".to_string(), 1),
        ];
        assert_eq!(select_lowest_load(&candidates).as_deref(), Some("a"));
    }
}
