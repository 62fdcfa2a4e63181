use std::sync::Arc;

use futures::TryStreamExt as _;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::attribution::{Attributor, HeuristicAttributor};
use crate::config::ClientConfig;
use crate::content::OutgoingMessage;
use crate::errors::{ClientError, TransportError};
use crate::model::TurnId;
use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, METHOD_MESSAGE_STREAM, METHOD_TASKS_CANCEL, METHOD_TASKS_GET,
    Task, TaskIdParams,
};
use crate::session::SessionController;
use crate::transport::ByteStream;

/// Client for one remote agent runtime.
///
/// Owns the HTTP connection pool, the configuration and the reader strategy
/// chosen at construction. Cheap to clone.
#[derive(Clone)]
pub struct A2aClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    attributor: Arc<dyn Attributor>,
}

impl A2aClient {
    /// Creates a client from explicit configuration.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        // No total timeout: streams are governed by the inactivity watchdog.
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        debug!(endpoint = %config.endpoint, reader = ?config.reader_strategy, "a2a client created");
        Ok(Self {
            http,
            config: Arc::new(config),
            attributor: Arc::new(HeuristicAttributor),
        })
    }

    /// Creates a client from `A2A_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Replaces the default heuristic attributor.
    pub fn with_attributor(mut self, attributor: Arc<dyn Attributor>) -> Self {
        self.attributor = attributor;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts a session controller bound to this client.
    pub fn session(&self) -> SessionController {
        SessionController::new(self.clone())
    }

    /// Asks the runtime to cancel a task. Returns the task as it stands after
    /// the request.
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task, ClientError> {
        let result = self
            .call(
                METHOD_TASKS_CANCEL,
                TaskIdParams {
                    id: task_id.to_string(),
                    history_length: None,
                },
            )
            .await?;
        parse_task(result)
    }

    /// Fetches a task snapshot, optionally with the last `history_length`
    /// messages.
    pub async fn get_task(
        &self,
        task_id: &str,
        history_length: Option<u32>,
    ) -> Result<Task, ClientError> {
        let result = self
            .call(
                METHOD_TASKS_GET,
                TaskIdParams {
                    id: task_id.to_string(),
                    history_length,
                },
            )
            .await?;
        parse_task(result)
    }

    pub(crate) fn attributor(&self) -> Arc<dyn Attributor> {
        self.attributor.clone()
    }

    /// POSTs `message/stream` and returns the SSE body once headers arrive.
    pub(crate) async fn open_stream(
        &self,
        message: &OutgoingMessage,
        turn: &TurnId,
        cancel: &CancellationToken,
    ) -> Result<ByteStream, ClientError> {
        let request = JsonRpcRequest::new(METHOD_MESSAGE_STREAM, message.to_params(turn));
        debug!(turn_id = %turn, request_id = %request.id, "opening message stream");
        let http_req = self
            .authorized(self.http.post(&self.config.endpoint))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .header(reqwest::header::CONNECTION, "keep-alive")
            .json(&request);

        // The watchdog only starts once a body exists, so the wait for
        // response headers gets the same window.
        let window = self.config.inactivity_timeout;
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            sent = tokio::time::timeout(window, http_req.send()) => match sent {
                Ok(sent) => sent.map_err(|e| ClientError::from_reqwest(&e))?,
                Err(_) => {
                    return Err(ClientError::Transport(format!(
                        "no response headers within {window:?}"
                    )));
                }
            },
        };
        let response = ensure_success(response).await?;
        Ok(Box::pin(response.bytes_stream().map_err(|e| {
            if e.is_decode() {
                TransportError::Decode(e.to_string())
            } else {
                TransportError::network(e)
            }
        })))
    }

    async fn call<P: Serialize>(
        &self,
        method: &'static str,
        params: P,
    ) -> Result<serde_json::Value, ClientError> {
        let request = JsonRpcRequest::new(method, params);
        debug!(method, request_id = %request.id, "json-rpc call");
        let response = self
            .authorized(self.http.post(&self.config.endpoint))
            .timeout(self.config.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(&e))?;
        let response = ensure_success(response).await?;
        let envelope: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ClientError::protocol_msg(format!("invalid {method} response: {e}")))?;
        if let Some(error) = envelope.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        envelope
            .result
            .ok_or_else(|| ClientError::protocol_msg(format!("{method} response has no result")))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ClientError::Http {
        status: status.as_u16(),
        body,
    })
}

fn parse_task(result: serde_json::Value) -> Result<Task, ClientError> {
    serde_json::from_value(result)
        .map_err(|e| ClientError::protocol_msg(format!("result is not a task: {e}")))
}
