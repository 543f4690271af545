//! Artifact generator
//!
//! Asks a generative model for a Dockerfile suited to a detected language.
//! The model's text is returned verbatim: it is neither cleaned up nor
//! checked for Dockerfile syntax.

use async_trait::async_trait;
use devyntra_core::domain::DetectedLanguage;
use genai::chat::{ChatMessage, ChatRequest};
use genai::resolver::{AuthData, ServiceTargetResolver};
use genai::{Client, ServiceTarget};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// System instruction sent with every generation request
pub const SYSTEM_INSTRUCTION: &str = "You are a world-class DevOps engineer specializing in \
containerization. Your task is to generate a production-ready, multi-stage Dockerfile for the \
given programming language. The Dockerfile should be optimized for security, small image size, \
and performance. Do not include any explanations, just the raw Dockerfile content.";

/// User message for a language
pub fn user_prompt(language: DetectedLanguage) -> String {
    format!("Generate a Dockerfile for a {} application.", language)
}

/// Errors generating an artifact
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("generative service request failed: {0}")]
    Service(String),

    #[error("generative service returned an empty response")]
    EmptyResponse,

    #[error("cannot generate an artifact for language {0}")]
    UnsupportedLanguage(DetectedLanguage),
}

/// Service trait for deployment artifact generation
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    /// Returns Dockerfile content for `language`
    async fn generate(&self, language: DetectedLanguage) -> Result<String, GenerationError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// ArtifactGenerator backed by the `genai` multi-provider client
pub struct GenAiArtifactGenerator {
    client: Client,
    model: String,
    timeout: Duration,
}

impl GenAiArtifactGenerator {
    /// Creates a generator for `model`
    ///
    /// With `api_key` unset the provider's default key variable is read
    /// (`GEMINI_API_KEY` for Gemini models).
    pub fn new(model: String, api_key: Option<String>, timeout: Duration) -> Self {
        let client = match api_key {
            Some(key) => {
                let resolver = ServiceTargetResolver::from_resolver_fn(
                    move |service_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error> {
                        let ServiceTarget {
                            endpoint, model, ..
                        } = service_target;
                        Ok(ServiceTarget {
                            endpoint,
                            auth: AuthData::from_single(key.clone()),
                            model,
                        })
                    },
                );
                Client::builder()
                    .with_service_target_resolver(resolver)
                    .build()
            }
            None => Client::default(),
        };

        debug!("Creating generation client: model={}", model);

        Self {
            client,
            model,
            timeout,
        }
    }
}

#[async_trait]
impl ArtifactGenerator for GenAiArtifactGenerator {
    async fn generate(&self, language: DetectedLanguage) -> Result<String, GenerationError> {
        if !language.is_known() {
            return Err(GenerationError::UnsupportedLanguage(language));
        }

        info!("Generating Dockerfile for {} with {}", language, self.model);
        let start = std::time::Instant::now();

        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_INSTRUCTION),
            ChatMessage::user(user_prompt(language)),
        ]);

        let response = with_deadline(
            self.timeout,
            self.client.exec_chat(&self.model, request, None),
        )
        .await
        .inspect_err(|e| error!("Generation request to {} failed: {}", self.model, e))?;

        let content = response.first_text().unwrap_or_default().to_string();
        non_empty(content).inspect(|content| {
            info!(
                "Generated {} bytes of Dockerfile in {:?}",
                content.len(),
                start.elapsed()
            )
        })
    }

    fn name(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for GenAiArtifactGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAiArtifactGenerator")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Bounds a service call by `timeout`, mapping a missed deadline to
/// `GenerationError::Timeout`
async fn with_deadline<T, E, F>(timeout: Duration, call: F) -> Result<T, GenerationError>
where
    E: std::fmt::Display,
    F: std::future::Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(|e| GenerationError::Service(e.to_string())),
        Err(_) => Err(GenerationError::Timeout {
            seconds: timeout.as_secs(),
        }),
    }
}

/// Rejects blank responses; anything else is passed through untouched
fn non_empty(content: String) -> Result<String, GenerationError> {
    if content.trim().is_empty() {
        Err(GenerationError::EmptyResponse)
    } else {
        Ok(content)
    }
}
