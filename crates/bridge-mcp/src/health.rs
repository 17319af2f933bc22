use crate::types::{Response, ServerHealth};

/// Classifies a health-check response into a bucket (spec §4.9): healthy
/// iff `healthy:true` and `health_score >= 8.0`; degraded between 5.0 and
/// 8.0; unhealthy otherwise, including a failed/errored response.
pub fn classify(response: &Response) -> ServerHealth {
    if !response.success {
        return ServerHealth::Unhealthy;
    }
    let Some(result) = &response.result else {
        return ServerHealth::Unhealthy;
    };
    let healthy = result.get("healthy").and_then(|v| v.as_bool()).unwrap_or(false);
    let score = result.get("health_score").and_then(|v| v.as_f64()).unwrap_or(0.0);

    if healthy && score >= 8.0 {
        ServerHealth::Healthy
    } else if healthy && score >= 5.0 {
        ServerHealth::Degraded
    } else {
        ServerHealth::Unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn high_score_is_healthy() {
        let r = Response::ok("1", json!({"healthy": true, "health_score": 9.5}));
        assert_eq!(classify(&r), ServerHealth::Healthy);
    }

    #[test]
    fn mid_score_is_degraded() {
        let r = Response::ok("1", json!({"healthy": true, "health_score": 6.0}));
        assert_eq!(classify(&r), ServerHealth::Degraded);
    }

    #[test]
    fn low_score_is_unhealthy() {
        let r = Response::ok("1", json!({"healthy": true, "health_score": 2.0}));
        assert_eq!(classify(&r), ServerHealth::Unhealthy);
    }

    #[test]
    fn unhealthy_flag_overrides_score() {
        let r = Response::ok("1", json!({"healthy": false, "health_score": 9.0}));
        assert_eq!(classify(&r), ServerHealth::Unhealthy);
    }

    #[test]
    fn failed_response_is_unhealthy() {
        let r = Response::failed("1", "TIMEOUT", "no reply");
        assert_eq!(classify(&r), ServerHealth::Unhealthy);
    }
}
