//! REST API endpoint handlers for the Observer server.
//!
//! All handlers read from (or act through) the live containment
//! [`Supervisor`](warden_supervisor::supervisor::Supervisor) via the
//! shared [`AppState`]. Nothing here holds state of its own.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/status` | Fleet-wide containment summary |
//! | `GET` | `/api/agents` | List registered agents |
//! | `GET` | `/api/agents/:id` | Single agent detail |
//! | `POST` | `/api/agents/:id/kill` | Trigger full containment |
//! | `POST` | `/api/agents/:id/restore` | Lift network containment |
//! | `GET` | `/api/breaches` | Query breach findings |
//! | `GET` | `/api/kills` | Query containment reports |

// Axum handlers must be `async` even when the body never awaits.
#![allow(clippy::unused_async)]

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use chrono::Utc;

use warden_supervisor::history::MAX_HISTORY;
use warden_supervisor::supervisor::SupervisorError;
use warden_types::AgentId;

use crate::error::ObserverError;
use crate::state::AppState;

/// Entries returned by the history endpoints when no `limit` is given.
const DEFAULT_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for the `GET /api/breaches` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct BreachesQuery {
    /// Filter findings to one agent.
    pub agent_id: Option<String>,
    /// Maximum number of findings to return (default 100).
    pub limit: Option<usize>,
}

/// Query parameters for the `GET /api/kills` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct KillsQuery {
    /// Maximum number of reports to return (default 100).
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing fleet status and API links.
///
/// This is the operator's at-a-glance view until a real dashboard
/// frontend exists.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let fleet = state.supervisor.fleet_status().await;
    let agents = fleet.agents;
    let blocked = fleet.network.blocked_agents;
    let breaches = fleet.breaches_total;
    let kills = fleet.kills_total;
    let fail_mode = format!("{:?}", fleet.fail_mode.mode);
    let platform = fleet.network.platform;

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Warden Observer</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
        li::before {{ content: "GET "; color: #7ee787; font-weight: bold; }}
        ul.post li::before {{ content: "POST "; color: #d29922; }}
        .status {{ color: #3fb950; font-weight: bold; }}
        hr {{ border: none; border-top: 1px solid #30363d; margin: 1.5rem 0; }}
    </style>
</head>
<body>
    <h1>Warden Observer</h1>
    <p class="subtitle">Agent containment monitoring server</p>

    <p>Status: <span class="status">WATCHING</span></p>

    <div>
        <div class="metric">
            <div class="label">Agents</div>
            <div class="value">{agents}</div>
        </div>
        <div class="metric">
            <div class="label">Net-blocked</div>
            <div class="value">{blocked}</div>
        </div>
        <div class="metric">
            <div class="label">Breaches</div>
            <div class="value">{breaches}</div>
        </div>
        <div class="metric">
            <div class="label">Kills</div>
            <div class="value">{kills}</div>
        </div>
        <div class="metric">
            <div class="label">Fail mode</div>
            <div class="value">{fail_mode}</div>
        </div>
        <div class="metric">
            <div class="label">Firewall</div>
            <div class="value">{platform}</div>
        </div>
    </div>

    <hr>

    <h2>API Endpoints</h2>
    <ul>
        <li><a href="/api/status">/api/status</a> -- Fleet-wide containment summary</li>
        <li><a href="/api/agents">/api/agents</a> -- List registered agents</li>
        <li><a href="/api/agents/:id">/api/agents/:id</a> -- Single agent detail</li>
        <li><a href="/api/breaches">/api/breaches</a> -- Breach findings (?agent_id=X&amp;limit=N)</li>
        <li><a href="/api/kills">/api/kills</a> -- Containment reports (?limit=N)</li>
    </ul>

    <h2>Operations</h2>
    <ul class="post">
        <li>/api/agents/:id/kill -- Trigger full containment</li>
        <li>/api/agents/:id/restore -- Lift network containment</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/status -- fleet-wide containment summary
// ---------------------------------------------------------------------------

/// Return fleet-wide counters: registered agents grouped by status,
/// threshold engine totals, fail-mode state, and network containment.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let fleet = state.supervisor.fleet_status().await;
    let uptime = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds()
        .max(0);

    let mut body = serde_json::to_value(&fleet)?;
    if let Some(map) = body.as_object_mut() {
        map.insert("uptime_seconds".to_owned(), serde_json::Value::from(uptime));
    }
    Ok(Json(body))
}

// ---------------------------------------------------------------------------
// GET /api/agents -- list registered agents
// ---------------------------------------------------------------------------

/// List every registered agent: bound PIDs, containment status, and
/// registration time.
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let agents = state.supervisor.list_agents();

    Ok(Json(serde_json::json!({
        "count": agents.len(),
        "agents": agents,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/agents/:id -- single agent detail
// ---------------------------------------------------------------------------

/// Return the full detail for a single agent: registry record, threshold
/// counters, exfiltration stats, window totals, and risk posture.
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let agent_id = AgentId::new(id);

    let status = state
        .supervisor
        .agent_status(&agent_id)
        .ok_or_else(|| ObserverError::NotFound(format!("agent {agent_id}")))?;

    Ok(Json(serde_json::to_value(&status)?))
}

// ---------------------------------------------------------------------------
// POST /api/agents/:id/kill -- trigger full containment
// ---------------------------------------------------------------------------

/// Kill an agent's processes and block its network access, returning the
/// containment report. Concurrent requests for the same agent share one
/// containment attempt.
pub async fn kill_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let agent_id = AgentId::new(id);

    match state.supervisor.kill_agent(&agent_id).await {
        Ok(report) => Ok(Json(serde_json::to_value(&report)?)),
        Err(SupervisorError::UnknownAgent(id)) => {
            Err(ObserverError::NotFound(format!("agent {id}")))
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/agents/:id/restore -- lift network containment
// ---------------------------------------------------------------------------

/// Remove an agent's firewall rules and return the restore report.
///
/// Works for agents no longer in the registry: full containment
/// unregisters the agent but its network block outlives the record.
pub async fn restore_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let report = state.supervisor.restore_agent(&AgentId::new(id)).await;

    Ok(Json(serde_json::to_value(&report)?))
}

// ---------------------------------------------------------------------------
// GET /api/breaches -- query breach findings
// ---------------------------------------------------------------------------

/// List recent breach findings, newest first.
///
/// # Query Parameters
///
/// - `agent_id`: only findings for this agent
/// - `limit`: maximum entries to return (default 100, capped at the
///   retained history size)
pub async fn list_breaches(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BreachesQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_HISTORY);
    let filter = params.agent_id.map(AgentId::new);

    let breaches = state.supervisor.breach_history(filter.as_ref(), limit);

    Ok(Json(serde_json::json!({
        "count": breaches.len(),
        "breaches": breaches,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/kills -- query containment reports
// ---------------------------------------------------------------------------

/// List recent containment reports, newest first.
///
/// # Query Parameters
///
/// - `limit`: maximum entries to return (default 100, capped at the
///   retained history size)
pub async fn list_kills(
    State(state): State<Arc<AppState>>,
    Query(params): Query<KillsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_HISTORY);

    let kills = state.supervisor.kill_history(limit);

    Ok(Json(serde_json::json!({
        "count": kills.len(),
        "kills": kills,
    })))
}
