//! Kea control-channel command envelopes: every Kea RPC a puller makes is
//! the same `{"command": ..., "service": [...], "arguments": ...}` POST
//! forwarded through the agent's `ForwardToKeaOverHttp`, answered as a
//! one-element array `[{"result": ..., "text": ..., "arguments": ...}]`.
//! One success/failure shape, reused by every Kea-specific puller instead
//! of each hand-rolling its own HTTP plumbing.

use stork_core::model::DaemonId;
use stork_core::puller::PullError;
use stork_proto::agent::{ForwardToKeaRequest, GetStateRequest};
use stork_proto::AgentServiceClient;
use tonic::transport::Channel;

use crate::db::PgStore;

/// `0` on Kea's own result codes means success; anything else is a
/// daemon-reported failure (hook not loaded, bad argument, ...), which is
/// not a transport error and is surfaced to the caller to decide how to
/// treat it.
pub struct KeaResult {
    pub code: i64,
    pub arguments: serde_json::Value,
}

pub fn command_body(command: &str, service: &str, arguments: Option<serde_json::Value>) -> Vec<u8> {
    let mut body = serde_json::json!({
        "command": command,
        "service": [service],
    });
    if let Some(args) = arguments {
        body["arguments"] = args;
    }
    serde_json::to_vec(&body).unwrap_or_default()
}

/// Forwards a command to `url` (the app's control access point) over the
/// already-dialed agent channel and decodes Kea's single-element response
/// envelope. A non-2xx HTTP status or unparsable body is `BadResponse`; a
/// non-zero Kea result code is returned as `Ok` with that code so callers
/// can decide per-command whether it means "feature not configured" (safe
/// to skip) or a real failure.
pub fn send_command(
    store: &PgStore,
    client: &mut AgentServiceClient<Channel>,
    daemon_id: DaemonId,
    url: &str,
    command: &str,
    service: &str,
    arguments: Option<serde_json::Value>,
) -> Result<KeaResult, PullError> {
    let body = command_body(command, service, arguments);
    let response = store
        .block_on(client.forward_to_kea_over_http(ForwardToKeaRequest {
            url: url.to_string(),
            request_body: body,
        }))
        .map_err(|status| PullError::Unreachable(daemon_id, status.message().to_string()))?
        .into_inner();

    if response.status_code < 200 || response.status_code >= 300 {
        return Err(PullError::BadResponse(
            daemon_id,
            format!("control agent returned HTTP {}", response.status_code),
        ));
    }

    let parsed: serde_json::Value = serde_json::from_slice(&response.response_body)
        .map_err(|e| PullError::BadResponse(daemon_id, format!("non-JSON response: {e}")))?;

    let entry = parsed
        .as_array()
        .and_then(|items| items.first())
        .ok_or_else(|| PullError::BadResponse(daemon_id, "empty response envelope".to_string()))?;

    let code = entry
        .get("result")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| PullError::BadResponse(daemon_id, "missing result code".to_string()))?;

    let arguments = entry.get("arguments").cloned().unwrap_or(serde_json::Value::Null);

    Ok(KeaResult { code, arguments })
}

/// Fetches the agent's locally-detected app inventory, needed by every
/// puller that has to find an app's control URL and kind before it can
/// issue a Kea command against it.
pub fn get_state(
    store: &PgStore,
    client: &mut AgentServiceClient<Channel>,
    daemon_id: DaemonId,
    machine_id: i64,
) -> Result<stork_proto::agent::GetStateResponse, PullError> {
    store
        .block_on(client.get_state(GetStateRequest { machine_id }))
        .map(|r| r.into_inner())
        .map_err(|status| PullError::Unreachable(daemon_id, status.message().to_string()))
}
