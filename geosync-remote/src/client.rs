//! Thin `ureq` wrapper shared by the feature service and the locator.
//!
//! Every request carries `f=json` and, when configured, `token`. A 200 reply
//! with an `{"error": {...}}` body is still a failure.

use std::time::Duration;

use serde_json::Value;

use crate::error::RemoteError;

#[derive(Debug, Clone)]
pub struct RestClient {
    agent: ureq::Agent,
    token: Option<String>,
}

impl RestClient {
    pub fn new(timeout_ms: u64, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .build();
        Self { agent, token }
    }

    pub fn get(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, RemoteError> {
        let mut req = self.agent.get(url).query("f", "json");
        for (key, value) in params {
            req = req.query(key, value);
        }
        if let Some(token) = &self.token {
            req = req.query("token", token);
        }
        tracing::debug!("GET {url}");
        read_reply(url, req.call())
    }

    pub fn post_form(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, RemoteError> {
        let mut form: Vec<(&str, &str)> = Vec::with_capacity(params.len() + 2);
        form.push(("f", "json"));
        form.extend_from_slice(params);
        if let Some(token) = &self.token {
            form.push(("token", token.as_str()));
        }
        tracing::debug!("POST {url}");
        read_reply(url, self.agent.post(url).send_form(&form))
    }
}

fn read_reply(url: &str, reply: Result<ureq::Response, ureq::Error>) -> Result<Value, RemoteError> {
    let body: Value = match reply {
        Ok(response) => response
            .into_json()
            .map_err(|e| RemoteError::protocol(url, format!("body is not JSON: {e}")))?,
        Err(ureq::Error::Status(code, _)) => {
            return Err(RemoteError::Status {
                url: url.to_string(),
                code,
            })
        }
        Err(ureq::Error::Transport(err)) => {
            return Err(RemoteError::Transport {
                url: url.to_string(),
                detail: err.to_string(),
            })
        }
    };
    service_error(url, &body).map_or(Ok(body), Err)
}

/// The error carried in a 200 body, if any.
pub(crate) fn service_error(url: &str, body: &Value) -> Option<RemoteError> {
    let error = body.get("error")?;
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let mut message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    if let Some(details) = error.get("details").and_then(Value::as_array) {
        let extra: Vec<&str> = details.iter().filter_map(Value::as_str).collect();
        if !extra.is_empty() {
            message = format!("{message} ({})", extra.join("; "));
        }
    }
    Some(RemoteError::Service {
        url: url.to_string(),
        code,
        message,
    })
}
