//! ==============================================================================
//! server.rs - web page and http api
//! ==============================================================================
//!
//! routes:
//!     GET  /                          html page (polls the endpoints below)
//!     GET  /get_temperature           current temperature, plain text "%.2f"
//!     POST /set_threshold             form body "threshold=<number>"
//!     GET  /get_last_10_temperatures  {"temperature": [..]} newest first
//!     GET  /api                       json status
//!     POST /clear_history             wipe the stored history
//!
//! handlers only talk to the Monitor; they never touch storage or gpio.
//!
//! ==============================================================================

use crate::input::parse_threshold_form;
use crate::state::{Monitor, Status};

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::info;

#[derive(Clone)]
pub struct WebState {
    pub monitor: Monitor,
    /// number of history slots returned to the page
    pub window: usize,
}

/// list payload for the history endpoint, "" for unfilled slots
#[derive(Debug, Serialize)]
pub struct HistoryPayload {
    pub temperature: Vec<String>,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/get_temperature", get(temperature_handler))
        .route("/set_threshold", post(set_threshold_handler))
        .route("/get_last_10_temperatures", get(history_handler))
        .route("/api", get(status_handler))
        .route("/clear_history", post(clear_history_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(state: WebState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!("[STARTUP] ✓ Page live at http://{}", bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn page_handler(State(state): State<WebState>) -> Html<String> {
    let temperature = state.monitor.read_temperature().await;
    Html(PAGE.replace("{{temperature}}", &format!("{:.2}", temperature)))
}

async fn temperature_handler(State(state): State<WebState>) -> String {
    format!("{:.2}", state.monitor.read_temperature().await)
}

/// always answers 200, whatever the body holds
async fn set_threshold_handler(State(state): State<WebState>, body: Bytes) -> StatusCode {
    let value = parse_threshold_form(&String::from_utf8_lossy(&body));
    state.monitor.set_threshold(value).await;
    StatusCode::OK
}

async fn history_handler(State(state): State<WebState>) -> Json<HistoryPayload> {
    let temperature = state
        .monitor
        .snapshot_history(state.window)
        .await
        .into_iter()
        .map(|slot| slot.map(|record| record.to_string()).unwrap_or_default())
        .collect();
    Json(HistoryPayload { temperature })
}

async fn status_handler(State(state): State<WebState>) -> Json<Status> {
    Json(state.monitor.status().await)
}

async fn clear_history_handler(State(state): State<WebState>) -> StatusCode {
    state.monitor.clear_history().await;
    StatusCode::OK
}

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<title>Temperature monitor</title>
<meta name="viewport" content="width=device-width, initial-scale=1.0" charset="UTF-8">
<style>body { font-family: system-ui, sans-serif; padding: 1rem; }</style>
<script>
function updateTemperature() {
  fetch('/get_temperature').then(r => r.text()).then(t => {
    document.getElementById('temperature').innerText = t + ' °C';
  });
}
function updateHistory() {
  fetch('/get_last_10_temperatures').then(r => r.json()).then(data => {
    const list = document.getElementById('history');
    list.innerHTML = '';
    for (const line of data.temperature) {
      const p = document.createElement('p');
      p.innerText = line;
      list.appendChild(p);
    }
  });
}
function setThreshold() {
  const value = document.getElementById('threshold').value;
  fetch('/set_threshold', {
    method: 'POST',
    headers: { 'Content-Type': 'application/x-www-form-urlencoded' },
    body: 'threshold=' + value,
  }).then(() => {
    const note = document.getElementById('threshold-note');
    note.innerText = 'Threshold set.';
    setTimeout(() => { note.innerText = ''; }, 3000);
  });
}
setInterval(updateTemperature, 2000);
setInterval(updateHistory, 2000);
updateTemperature();
updateHistory();
</script>
</head>
<body>
<h2>Current temperature</h2>
<p id="temperature">{{temperature}} &deg;C</p>
<h2>Threshold</h2>
<input type="number" step="0.01" id="threshold" min="-50.00">
<button onclick="setThreshold()">Set</button>
<p id="threshold-note"></p>
<h2>Last readings</h2>
<div id="history"></div>
</body>
</html>
"#;
