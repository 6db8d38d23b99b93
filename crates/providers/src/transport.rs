use shared::{Endpoint, HistoryTurn, Message};

/// Outgoing chat request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub endpoint: Endpoint,
    pub message: String,
    pub model: Option<String>,
    pub history: Option<Vec<HistoryTurn>>,
}

impl SendRequest {
    pub fn new(endpoint: Endpoint, message: impl Into<String>) -> Self {
        Self {
            endpoint,
            message: message.into(),
            model: None,
            history: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_history(mut self, history: Option<Vec<HistoryTurn>>) -> Self {
        self.history = history;
        self
    }

    /// Form fields in wire order: `message`, then `model`, then `history`.
    pub fn form_fields(&self) -> Result<Vec<(&'static str, String)>, TransportError> {
        let mut fields = vec![("message", self.message.clone())];
        if let Some(model) = &self.model {
            fields.push(("model", model.clone()));
        }
        if let Some(history) = &self.history {
            let encoded = serde_json::to_string(history).map_err(TransportError::Encode)?;
            fields.push(("history", encoded));
        }
        Ok(fields)
    }
}

/// Why a request produced no usable reply
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid backend url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {endpoint} failed: {source}")]
    Network {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: Endpoint, status: u16 },

    #[error("could not decode reply from {endpoint}: {source}")]
    Decode {
        endpoint: Endpoint,
        #[source]
        source: serde_json::Error,
    },

    #[error("{endpoint} returned an empty reply")]
    EmptyReply { endpoint: Endpoint },

    #[error("could not encode history: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Backend the controller talks to.
///
/// One attempt per call; no retries.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Post a chat request. The reply array is returned verbatim and is never
    /// empty; the caller consumes its last element.
    async fn send(&self, request: SendRequest) -> Result<Vec<Message>, TransportError>;

    /// Fetch the raw model catalog.
    async fn list_models(&self) -> Result<Vec<String>, TransportError>;
}

/// Drop the excluded identifier from a catalog, keeping order.
pub fn selectable_models(catalog: Vec<String>, excluded: &str) -> Vec<String> {
    catalog.into_iter().filter(|id| id != excluded).collect()
}
