//! Thin HTTP client for ComfyUI endpoints.
//!
//! - `queue_prompt` posts a prompt graph to `/prompt`.
//! - `get_prompt_history` fetches `/history/<prompt_id>` as JSON.
//!
//! The client implements [`Engine`], with completion read from the history
//! entry of the submitted prompt and health from `/system_stats`.
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::comfyui::engine::{Engine, EngineStatus, Submission};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
    client_id: String,
}

impl ComfyUIClient {
    pub fn new(base_url: String) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        ComfyUIClient {
            client: Client::new(),
            base_url: base,
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Queue a prompt graph with ComfyUI.
    ///
    /// Returns the JSON response from ComfyUI on success. A non-2xx reply is
    /// surfaced as `SubmissionRejected` carrying the status and raw body.
    pub async fn queue_prompt(&self, graph: &Value) -> AppResult<Value> {
        let url = format!("{}/prompt", self.base_url);
        tracing::info!("Sending prompt to ComfyUI at URL: {}", url);
        tracing::debug!("Prompt payload: {:?}", graph);

        let body = json!({ "prompt": graph, "client_id": self.client_id });
        let response = self.client.post(&url)
            .json(&body)
            .send()
            .await
            .map_err(AppError::HttpClient)?;

        if response.status().is_success() {
            let json = response.json().await.map_err(AppError::HttpClient)?;
            tracing::info!("Successfully queued prompt. Response: {:?}", json);
            Ok(json)
        } else {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_else(|_| "Unable to read error body".to_string());
            tracing::error!("Failed to queue prompt. Status: {}, Body: {}", status, error_body);
            Err(AppError::SubmissionRejected { status: status.as_u16(), body: error_body })
        }
    }

    /// Retrieve the history entry for a single prompt.
    pub async fn get_prompt_history(&self, prompt_id: &str) -> AppResult<Value> {
        let url = format!("{}/history/{}", self.base_url, prompt_id);
        let response = self.client.get(&url)
            .send()
            .await
            .map_err(AppError::HttpClient)?;

        if response.status().is_success() {
            response.json().await.map_err(AppError::HttpClient)
        } else {
            Err(AppError::ComfyUI(format!("Failed to get history for {}: {:?}", prompt_id, response.status())))
        }
    }
}

#[async_trait]
impl Engine for ComfyUIClient {
    async fn submit(&self, prompt: &Value) -> AppResult<Submission> {
        let raw = self.queue_prompt(prompt).await?;
        let prompt_id = raw
            .get("prompt_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::ComfyUI(format!("queue response has no prompt_id: {}", raw)))?;
        Ok(Submission { prompt_id, raw })
    }

    async fn status(&self, prompt_id: &str) -> AppResult<EngineStatus> {
        let history = self.get_prompt_history(prompt_id).await?;
        status_from_history(&history, prompt_id)
    }

    /// True when ComfyUI answers `/system_stats` with a success status.
    async fn health(&self) -> bool {
        let url = format!("{}/system_stats", self.base_url);
        match self.client.get(&url).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                tracing::warn!("ComfyUI health probe failed: {}", e);
                false
            }
        }
    }
}

/// Interpret a `/history/<id>` reply.
///
/// ComfyUI returns `{}` until the prompt has run, then
/// `{ "<id>": { "outputs": {...}, "status": { "status_str", "completed", "messages" } } }`.
pub fn status_from_history(history: &Value, prompt_id: &str) -> AppResult<EngineStatus> {
    let Some(map) = history.as_object() else {
        return Err(AppError::ComfyUI(format!(
            "history reply is {}, expected an object",
            AppError::json_kind(history)
        )));
    };
    let Some(entry) = map.get(prompt_id) else {
        return Ok(EngineStatus::Pending);
    };

    let status = entry.get("status");
    if status.and_then(|s| s.get("status_str")).and_then(|s| s.as_str()) == Some("error") {
        let message = status
            .and_then(|s| s.get("messages"))
            .and_then(execution_error_message)
            .unwrap_or_else(|| "execution failed".to_string());
        return Ok(EngineStatus::Failed { message });
    }

    let succeeded = status.and_then(|s| s.get("status_str")).and_then(|s| s.as_str()) == Some("success");
    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(|c| c.as_bool())
        .unwrap_or(true);
    if !succeeded && !completed {
        return Ok(EngineStatus::Pending);
    }
    // Shape checks belong to the result adapter, which reports odd outputs.
    let outputs = entry.get("outputs").cloned().unwrap_or(Value::Null);
    Ok(EngineStatus::Completed { outputs })
}

// `messages` is a list of `[event_name, data]` pairs.
fn execution_error_message(messages: &Value) -> Option<String> {
    messages.as_array()?.iter().find_map(|m| {
        let pair = m.as_array()?;
        if pair.first()?.as_str()? != "execution_error" {
            return None;
        }
        let data = pair.get(1)?;
        let text = data.get("exception_message")?.as_str()?.trim().to_string();
        match data.get("node_type").and_then(|n| n.as_str()) {
            Some(node) => Some(format!("{}: {}", node, text)),
            None => Some(text),
        }
    })
}
