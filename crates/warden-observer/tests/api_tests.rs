//! Integration tests for the Observer API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. This validates handler logic and routing
//! without needing a live network connection.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use warden_core::config::WardenConfig;
use warden_kill::firewall::NoopFirewall;
use warden_kill::process::{ProcessControl, StubProcessControl};
use warden_observer::router::build_router;
use warden_observer::state::AppState;
use warden_supervisor::supervisor::Supervisor;
use warden_types::{AgentId, ThresholdAction, ThresholdConfig, action_types};

/// One tight threshold so tests can produce a breach finding quickly:
/// the second `shell_exec` inside a minute blocks.
fn test_config() -> WardenConfig {
    let mut config = WardenConfig::default();
    config.fail_mode.cache.persist_path = None;
    config.thresholds.custom = vec![ThresholdConfig {
        name: "Shell Burst".to_owned(),
        action_type: action_types::SHELL_EXEC.to_owned(),
        max_count: 2,
        window_seconds: 60,
        breach_action: ThresholdAction::Block,
        cooldown_seconds: 60,
        kill_multiplier: 10.0,
    }];
    config
}

fn make_test_state(control: &Arc<StubProcessControl>) -> Arc<AppState> {
    let supervisor = Supervisor::with_parts(
        &test_config(),
        Arc::clone(control) as Arc<dyn ProcessControl>,
        Box::new(NoopFirewall::new()),
        None,
    );
    Arc::new(AppState::new(supervisor))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_index_returns_html() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);
    let router = build_router(state);

    let response = router
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("text/html"));
}

#[tokio::test]
async fn test_get_status() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);
    state
        .supervisor
        .register_agent(&AgentId::new("agent-a"), 4100);

    let router = build_router(state);
    let response = router
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["agents"], 1);
    assert_eq!(json["agents_by_status"]["active"], 1);
    assert_eq!(json["fail_mode"]["mode"], "closed");
    assert_eq!(json["network"]["blocked_agents"], 0);
    assert!(json["uptime_seconds"].is_number());
}

#[tokio::test]
async fn test_list_agents() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);
    state
        .supervisor
        .register_agent(&AgentId::new("agent-a"), 4100);

    let router = build_router(state);
    let response = router
        .oneshot(Request::get("/api/agents").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["agents"][0]["agent_id"], "agent-a");
    assert_eq!(json["agents"][0]["status"], "active");
}

#[tokio::test]
async fn test_get_agent_detail() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);
    state
        .supervisor
        .register_agent(&AgentId::new("agent-a"), 4100);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::get("/api/agents/agent-a")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["record"]["agent_id"], "agent-a");
    assert_eq!(json["network_blocked"], false);
    assert_eq!(json["risk_level"], "low");
}

#[tokio::test]
async fn test_get_agent_not_found() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::get("/api/agents/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 404);
    assert!(json["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn test_kill_agent_returns_report() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);
    control.spawn(4100);
    state.supervisor.register_agent(&AgentId::new("agent-a"), 4100);

    let router = build_router(Arc::clone(&state));
    let response = router
        .oneshot(
            Request::post("/api/agents/agent-a/kill")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["agent_id"], "agent-a");
    assert_eq!(json["status"], "full");
    assert_eq!(json["network_report"]["result"], "success");

    // Full containment removes the agent from the registry.
    assert!(state.supervisor.list_agents().is_empty());
}

#[tokio::test]
async fn test_kill_unknown_agent_returns_404() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::post("/api/agents/ghost/kill")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_restore_lifts_network_block() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);
    control.spawn(4200);
    let agent_id = AgentId::new("agent-a");
    state.supervisor.register_agent(&agent_id, 4200);
    state.supervisor.kill_agent(&agent_id).await.unwrap();

    let router = build_router(Arc::clone(&state));
    let response = router
        .oneshot(
            Request::post("/api/agents/agent-a/restore")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["result"], "success");

    let fleet = state.supervisor.fleet_status().await;
    assert_eq!(fleet.network.blocked_agents, 0);
}

#[tokio::test]
async fn test_list_breaches_filters_by_agent() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);
    let noisy = AgentId::new("noisy");
    let quiet = AgentId::new("quiet");
    state.supervisor.register_agent(&noisy, 4100);
    state.supervisor.register_agent(&quiet, 4200);

    // Second shell_exec breaches the test threshold and logs a finding.
    let meta = BTreeMap::new();
    for _ in 0..2 {
        state
            .supervisor
            .check(&noisy, action_types::SHELL_EXEC, "/bin/sh", 0, &meta)
            .await;
    }

    let router = build_router(Arc::clone(&state));
    let response = router
        .oneshot(
            Request::get("/api/breaches?agent_id=noisy")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["breaches"][0]["event"], "threshold_breached");

    let response = build_router(state)
        .oneshot(
            Request::get("/api/breaches?agent_id=quiet")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["count"], 0);
}

#[tokio::test]
async fn test_list_kills_respects_limit() {
    let control = Arc::new(StubProcessControl::new());
    let state = make_test_state(&control);
    for (name, pid) in [("agent-a", 5000), ("agent-b", 5001)] {
        control.spawn(pid);
        let agent_id = AgentId::new(name);
        state.supervisor.register_agent(&agent_id, pid);
        state.supervisor.kill_agent(&agent_id).await.unwrap();
    }

    let router = build_router(state);
    let response = router
        .oneshot(
            Request::get("/api/kills?limit=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["count"], 1);
    // Newest first: the second kill comes back.
    assert_eq!(json["kills"][0]["agent_id"], "agent-b");
}
