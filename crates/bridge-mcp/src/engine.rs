use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{watch, RwLock};
use tracing::{info, instrument, warn};

use crate::error::{McpError, Result};
use crate::health;
use crate::messaging::{classify_for_delivery, MessageOutcome, MessageQueue};
use crate::registry::{McpServer, ServerRegistration};
use crate::router::{default_routing_server_type, evaluate_condition, select_lowest_load};
use crate::types::{Message, Request, Response, RoutingRule, ServerHealth, ToolCapability};

/// Tunables the orchestrator is constructed with (spec §6 configuration
/// table: `mcp_health_check_interval_seconds`,
/// `mcp_enable_inter_server_messaging`, `mcp_enable_load_balancing`).
#[derive(Debug, Clone)]
pub struct McpConfig {
    pub health_check_interval_seconds: u64,
    pub enable_inter_server_messaging: bool,
    pub enable_load_balancing: bool,
    pub message_processing_interval_seconds: u64,
    /// Per-probe timeout; a probe that doesn't answer in time counts as
    /// `UNKNOWN` (spec §4.9: "UNKNOWN on probe exception"), not `UNHEALTHY`
    /// — the server's own state is simply unobserved this tick.
    pub health_check_timeout_seconds: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: 30,
            enable_inter_server_messaging: true,
            enable_load_balancing: true,
            message_processing_interval_seconds: 1,
            health_check_timeout_seconds: 10,
        }
    }
}

#[derive(Default)]
struct Stats {
    requests_routed: AtomicU64,
    messages_processed: AtomicU64,
    health_checks_performed: AtomicU64,
}

/// Server registry, health prober, and request router for the MCP tool bus
/// (spec §4.9). A leaf component: it never calls back into the session
/// registry, job queue, or delivery subsystem.
pub struct McpOrchestrator {
    config: McpConfig,
    servers: DashMap<String, ServerRegistration>,
    in_flight: DashMap<String, AtomicI64>,
    routing_rules: RwLock<Vec<RoutingRule>>,
    messages: MessageQueue,
    stats: Stats,
}

impl McpOrchestrator {
    pub fn new(config: McpConfig) -> Self {
        Self {
            config,
            servers: DashMap::new(),
            in_flight: DashMap::new(),
            routing_rules: RwLock::new(Vec::new()),
            messages: MessageQueue::new(),
            stats: Stats::default(),
        }
    }

    /// Registers a server instance (spec §4.9 `Register`). Returns its
    /// capabilities; initial health is `HEALTHY` until the first probe.
    pub fn register_server(
        &self,
        server_name: impl Into<String>,
        server_type: impl Into<String>,
        instance: Arc<dyn McpServer>,
    ) -> Result<Vec<ToolCapability>> {
        let server_name = server_name.into();
        if self.servers.contains_key(&server_name) {
            return Err(McpError::AlreadyRegistered { server_name });
        }

        let capabilities = instance.capabilities();
        let version = instance.version().to_string();
        let now = now_epoch_seconds();

        self.servers.insert(
            server_name.clone(),
            ServerRegistration {
                server_name: server_name.clone(),
                server_type: server_type.into(),
                version,
                capabilities: capabilities.clone(),
                health_status: ServerHealth::Healthy,
                last_health_check: None,
                registered_at: now,
                last_activity: now,
                instance,
            },
        );
        self.in_flight.insert(server_name.clone(), AtomicI64::new(0));

        info!(server_name, "registered MCP server");
        Ok(capabilities)
    }

    pub fn unregister_server(&self, server_name: &str) -> bool {
        let removed = self.servers.remove(server_name).is_some();
        self.in_flight.remove(server_name);
        if removed {
            info!(server_name, "unregistered MCP server");
        }
        removed
    }

    pub async fn add_routing_rule(&self, rule: RoutingRule) {
        let mut rules = self.routing_rules.write().await;
        info!(rule = %rule.name, priority = rule.priority, "added routing rule");
        rules.push(rule);
        rules.sort_by_key(|r| r.priority);
    }

    pub async fn remove_routing_rule(&self, name: &str) -> bool {
        let mut rules = self.routing_rules.write().await;
        let before = rules.len();
        rules.retain(|r| r.name != name);
        rules.len() < before
    }

    pub async fn list_routing_rules(&self) -> Vec<RoutingRule> {
        self.routing_rules.read().await.clone()
    }

    /// Routes a request to the appropriate server (spec §4.9). Every
    /// response — success, failure, or orchestrator-synthesized error —
    /// carries `metadata.{routed_by,target_server,routing_timestamp}`.
    #[instrument(skip(self, request), fields(method = %request.method))]
    pub async fn route_request(&self, request: Request) -> Response {
        self.stats.requests_routed.fetch_add(1, Ordering::Relaxed);

        let targets = self.find_target_servers(&request).await;
        if targets.is_empty() {
            return self.finish(
                Response::failed(
                    request.id.clone(),
                    "NO_SERVERS_AVAILABLE",
                    format!("no servers available to handle method '{}'", request.method),
                ),
                None,
            );
        }

        let selected = if targets.len() > 1 && self.config.enable_load_balancing {
            let loads: Vec<(String, u64)> = targets
                .iter()
                .map(|name| {
                    let load = self
                        .in_flight
                        .get(name)
                        .map(|c| c.load(Ordering::Relaxed).max(0) as u64)
                        .unwrap_or(0);
                    (name.clone(), load)
                })
                .collect();
            select_lowest_load(&loads).unwrap_or_else(|| targets[0].clone())
        } else {
            targets[0].clone()
        };

        let Some(mut registration) = self.servers.get_mut(&selected) else {
            return self.finish(
                Response::failed(request.id.clone(), "SERVER_UNAVAILABLE", format!("server '{selected}' is not available")),
                Some(selected),
            );
        };
        registration.last_activity = now_epoch_seconds();
        drop(registration);

        let counter = self.in_flight.entry(selected.clone()).or_insert_with(|| AtomicI64::new(0));
        counter.fetch_add(1, Ordering::Relaxed);
        drop(counter);

        let instance = self.servers.get(&selected).map(|r| r.instance.clone());
        let response = match instance {
            Some(instance) => instance.handle_request(&request).await,
            None => Response::failed(request.id.clone(), "SERVER_UNAVAILABLE", format!("server '{selected}' vanished mid-route")),
        };

        if let Some(counter) = self.in_flight.get(&selected) {
            counter.fetch_sub(1, Ordering::Relaxed);
        }

        self.finish(response, Some(selected))
    }

    fn finish(&self, mut response: Response, target_server: Option<String>) -> Response {
        response.metadata.routed_by = Some("bridge-mcp".to_string());
        response.metadata.target_server = target_server;
        response.metadata.routing_timestamp = Some(now_epoch_seconds());
        response
    }

    async fn find_target_servers(&self, request: &Request) -> Vec<String> {
        let rules = self.routing_rules.read().await;
        for rule in rules.iter() {
            if !rule.enabled {
                continue;
            }
            if evaluate_condition(request, &rule.condition) {
                return self.filter_routable(&rule.target_servers);
            }
        }
        drop(rules);

        self.default_routing(&request.method)
    }

    fn default_routing(&self, method: &str) -> Vec<String> {
        match default_routing_server_type(method) {
            Some(server_type) => {
                let matching: Vec<String> =
                    self.servers.iter().filter(|e| e.server_type == server_type).map(|e| e.key().clone()).collect();
                self.filter_routable(&matching)
            }
            None => self
                .servers
                .iter()
                .filter(|e| is_routable_health(e.health_status))
                .map(|e| e.key().clone())
                .collect(),
        }
    }

    /// Keeps only registered, routable-health targets (spec §4.9: "unhealthy
    /// targets are excluded from routing"; a server whose last probe never
    /// came back — `UNKNOWN` — is treated the same way, since its state is
    /// unobserved rather than confirmed good). Unlike the Python original,
    /// this never falls back to unhealthy targets when no healthy one
    /// remains — see DESIGN.md for the reconciliation.
    fn filter_routable(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.servers.get(*name).map(|r| is_routable_health(r.health_status)).unwrap_or(false))
            .cloned()
            .collect()
    }

    /// Runs the periodic health-probe loop until `shutdown` broadcasts
    /// `true` (spec §5 cancellation: every background loop observes the
    /// process-wide shutdown signal).
    pub async fn run_health_check_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.health_check_interval_seconds));
        loop {
            tokio::select! {
                _ = interval.tick() => self.perform_health_checks().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("MCP health check loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn perform_health_checks(&self) {
        let names: Vec<String> = self.servers.iter().map(|e| e.key().clone()).collect();
        for name in names {
            let instance = match self.servers.get(&name) {
                Some(r) => r.instance.clone(),
                None => continue,
            };
            let probe = Request::new("health_check");
            let timeout = std::time::Duration::from_secs(self.config.health_check_timeout_seconds);
            let status = match tokio::time::timeout(timeout, instance.handle_request(&probe)).await {
                Ok(response) => health::classify(&response),
                Err(_) => {
                    warn!(server_name = %name, "MCP health probe timed out");
                    ServerHealth::Unknown
                }
            };

            if let Some(mut registration) = self.servers.get_mut(&name) {
                registration.health_status = status;
                registration.last_health_check = Some(now_epoch_seconds());
            }
            self.stats.health_checks_performed.fetch_add(1, Ordering::Relaxed);
            if status == ServerHealth::Unhealthy {
                warn!(server_name = %name, "MCP server health check reports unhealthy");
            }
        }
    }

    /// Queues an inter-server message (spec §4.9). The sending server
    /// needn't be registered — only the target does.
    pub fn send_message(&self, mut message: Message, ttl_seconds: Option<u64>) -> Result<String> {
        if !self.config.enable_inter_server_messaging {
            return Err(McpError::MessagingDisabled);
        }
        if !self.servers.contains_key(&message.to_server) {
            return Err(McpError::TargetNotFound { server_name: message.to_server.clone() });
        }
        message.created_at = now_epoch_seconds();
        if let Some(ttl) = ttl_seconds {
            message.expires_at = Some(message.created_at + ttl as f64);
        }
        let id = message.message_id.clone();
        self.messages.push(message);
        Ok(id)
    }

    /// Runs the inter-server message delivery loop until shutdown.
    pub async fn run_message_processor_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(self.config.message_processing_interval_seconds.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => self.process_messages().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("MCP message processor loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn process_messages(&self) {
        let now = now_epoch_seconds();
        let snapshot = self.messages.snapshot();
        let mut resolved = Vec::new();

        for mut message in snapshot {
            match classify_for_delivery(&message, now) {
                MessageOutcome::Expired => {
                    warn!(message_id = %message.message_id, "MCP inter-server message expired");
                    resolved.push(message.message_id);
                }
                MessageOutcome::AttemptsExhausted => {
                    warn!(message_id = %message.message_id, "MCP inter-server message exceeded max delivery attempts");
                    resolved.push(message.message_id);
                }
                MessageOutcome::ReadyToDeliver => {
                    let delivered = self.deliver_message(&message).await;
                    if delivered {
                        self.stats.messages_processed.fetch_add(1, Ordering::Relaxed);
                        resolved.push(message.message_id);
                    } else {
                        message.delivery_attempts += 1;
                        if message.delivery_attempts >= message.max_attempts {
                            warn!(message_id = %message.message_id, "failed to deliver MCP inter-server message");
                            resolved.push(message.message_id.clone());
                        }
                        self.messages.replace(message);
                    }
                }
            }
        }

        self.messages.remove_ids(&resolved);
    }

    async fn deliver_message(&self, message: &Message) -> bool {
        let Some(instance) = self.servers.get(&message.to_server).map(|r| r.instance.clone()) else {
            return false;
        };
        match instance.handle_message(message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "MCP message handler error");
                false
            }
        }
    }

    pub fn stats(&self) -> McpOrchestratorStats {
        McpOrchestratorStats {
            requests_routed: self.stats.requests_routed.load(Ordering::Relaxed),
            messages_processed: self.stats.messages_processed.load(Ordering::Relaxed),
            health_checks_performed: self.stats.health_checks_performed.load(Ordering::Relaxed),
            registered_servers: self.servers.len(),
            message_queue_size: self.messages.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct McpOrchestratorStats {
    pub requests_routed: u64,
    pub messages_processed: u64,
    pub health_checks_performed: u64,
    pub registered_servers: usize,
    pub message_queue_size: usize,
}

fn now_epoch_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// `Healthy` and `Degraded` targets are routable; `Unhealthy` and `Unknown`
/// are both excluded (spec §4.9).
fn is_routable_health(status: ServerHealth) -> bool {
    matches!(status, ServerHealth::Healthy | ServerHealth::Degraded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoutingCondition;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    struct StubServer {
        server_type: &'static str,
        healthy: AtomicBool,
    }

    impl StubServer {
        fn new(server_type: &'static str) -> Arc<Self> {
            Arc::new(Self { server_type, healthy: AtomicBool::new(true) })
        }
    }

    #[async_trait]
    impl McpServer for StubServer {
        fn server_type(&self) -> &str {
            self.server_type
        }

        async fn handle_request(&self, request: &Request) -> Response {
            if request.method == "health_check" {
                let healthy = self.healthy.load(Ordering::Relaxed);
                return Response::ok(
                    request.id.clone(),
                    json!({"healthy": healthy, "health_score": if healthy { 9.0 } else { 1.0 }}),
                );
            }
            Response::ok(request.id.clone(), json!({"echo": request.method}))
        }
    }

    #[tokio::test]
    async fn routes_by_default_method_prefix() {
        let orch = McpOrchestrator::new(McpConfig::default());
        orch.register_server("pm-1", "project_management", StubServer::new("project_management")).unwrap();

        let response = orch.route_request(Request::new("github_create_issue")).await;
        assert!(response.success);
        assert_eq!(response.metadata.target_server.as_deref(), Some("pm-1"));
        assert_eq!(response.metadata.routed_by.as_deref(), Some("bridge-mcp"));
    }

    #[tokio::test]
    async fn no_servers_available_when_nothing_matches() {
        let orch = McpOrchestrator::new(McpConfig::default());
        let response = orch.route_request(Request::new("github_create_issue")).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().code, "NO_SERVERS_AVAILABLE");
    }

    #[tokio::test]
    async fn explicit_routing_rule_takes_priority_over_default() {
        let orch = McpOrchestrator::new(McpConfig::default());
        orch.register_server("dev-1", "development_tools", StubServer::new("development_tools")).unwrap();
        orch.add_routing_rule(RoutingRule {
            name: "catch-all".to_string(),
            condition: RoutingCondition::Always,
            target_servers: vec!["dev-1".to_string()],
            priority: 1,
            enabled: true,
        })
        .await;

        let response = orch.route_request(Request::new("anything_at_all")).await;
        assert!(response.success);
        assert_eq!(response.metadata.target_server.as_deref(), Some("dev-1"));
    }

    #[tokio::test]
    async fn unhealthy_server_excluded_from_routing() {
        let orch = McpOrchestrator::new(McpConfig::default());
        let healthy = StubServer::new("social_tools");
        let unhealthy = StubServer::new("social_tools");
        unhealthy.healthy.store(false, Ordering::Relaxed);

        orch.register_server("s-healthy", "social_tools", healthy).unwrap();
        orch.register_server("s-unhealthy", "social_tools", unhealthy).unwrap();
        orch.perform_health_checks().await;

        for _ in 0..5 {
            let response = orch.route_request(Request::new("web_search")).await;
            assert_eq!(response.metadata.target_server.as_deref(), Some("s-healthy"));
        }
    }

    struct HangingServer;

    #[async_trait]
    impl McpServer for HangingServer {
        fn server_type(&self) -> &str {
            "social_tools"
        }

        async fn handle_request(&self, _request: &Request) -> Response {
            std::future::pending::<()>().await;
            unreachable!("pending future never resolves")
        }
    }

    #[tokio::test]
    async fn probe_that_never_returns_is_classified_unknown_and_excluded() {
        let mut config = McpConfig::default();
        config.health_check_timeout_seconds = 0;
        let orch = McpOrchestrator::new(config);
        orch.register_server("hung", "social_tools", Arc::new(HangingServer)).unwrap();
        orch.perform_health_checks().await;

        let response = orch.route_request(Request::new("web_search")).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().code, "NO_SERVERS_AVAILABLE");
    }

    #[tokio::test]
    async fn registering_the_same_name_twice_fails() {
        let orch = McpOrchestrator::new(McpConfig::default());
        orch.register_server("a", "social_tools", StubServer::new("social_tools")).unwrap();
        let err = orch.register_server("a", "social_tools", StubServer::new("social_tools")).unwrap_err();
        assert!(matches!(err, McpError::AlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn inter_server_message_without_handler_counts_as_delivered() {
        let orch = McpOrchestrator::new(McpConfig::default());
        orch.register_server("b", "social_tools", StubServer::new("social_tools")).unwrap();

        let message = Message {
            message_id: "m1".to_string(),
            from_server: "a".to_string(),
            to_server: "b".to_string(),
            message_type: "ping".to_string(),
            payload: json!({}),
            priority: Default::default(),
            created_at: 0.0,
            expires_at: None,
            delivery_attempts: 0,
            max_attempts: 3,
        };
        orch.send_message(message, None).unwrap();
        assert_eq!(orch.stats().message_queue_size, 1);

        orch.process_messages().await;
        assert_eq!(orch.stats().message_queue_size, 0);
        assert_eq!(orch.stats().messages_processed, 1);
    }

    #[tokio::test]
    async fn sending_to_unregistered_target_fails() {
        let orch = McpOrchestrator::new(McpConfig::default());
        let message = Message {
            message_id: "m1".to_string(),
            from_server: "a".to_string(),
            to_server: "nowhere".to_string(),
            message_type: "ping".to_string(),
            payload: json!({}),
            priority: Default::default(),
            created_at: 0.0,
            expires_at: None,
            delivery_attempts: 0,
            max_attempts: 3,
        };
        let err = orch.send_message(message, None).unwrap_err();
        assert!(matches!(err, McpError::TargetNotFound { .. }));
    }
}
