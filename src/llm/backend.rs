use async_trait::async_trait;

/// Failure of a generative call. Callers match on the variant instead of
/// sniffing error text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Request blocked by the backend's content policy{}", blocked_suffix(.reason))]
    Blocked { reason: Option<String> },
    #[error("Backend request failed: {0}")]
    Failed(String),
}

fn blocked_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|reason| format!(" ({reason})"))
        .unwrap_or_default()
}

impl BackendError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, BackendError::Blocked { .. })
    }
}

impl From<anyhow::Error> for BackendError {
    fn from(err: anyhow::Error) -> Self {
        BackendError::Failed(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    Text(String),
    InlineImage { mime_type: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRequest {
    pub parts: Vec<RequestPart>,
    pub system_instruction: Option<String>,
}

impl TextRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        TextRequest {
            parts: vec![RequestPart::Text(prompt.into())],
            system_instruction: None,
        }
    }

    pub fn with_system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_image(mut self, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.parts.push(RequestPart::InlineImage {
            mime_type: mime_type.into(),
            bytes,
        });
        self
    }
}

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_text(&self, request: TextRequest) -> Result<String, BackendError>;

    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, BackendError>;
}
