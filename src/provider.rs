//! Rewrite providers.
//!
//! Every provider implements [`Rewriter`], the single capability the
//! pipeline depends on. [`LlmRewriter`] talks to the hosted APIs (OpenAI and
//! DeepSeek share the chat-completions wire format) and to a local
//! Ollama-compatible server.

use crate::{
    config::Config,
    error::{Error, Result},
    prompt::{self, PromptBuilder, SYSTEM_PROMPT},
};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Longest error body kept in messages.
const MAX_ERROR_BODY: usize = 500;

/// Supported rewrite providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// DeepSeek-Coder 1.3B served locally by Ollama
    #[default]
    Local,
    /// OpenAI GPT-4o
    OpenAi,
    /// DeepSeek-Coder through the DeepSeek API
    DeepSeek,
}

impl ProviderKind {
    /// Maps the numeric `--llm` choice to a provider.
    #[must_use]
    pub const fn from_choice(choice: u8) -> Option<Self> {
        match choice {
            0 => Some(Self::OpenAi),
            1 => Some(Self::DeepSeek),
            _ => None,
        }
    }

    /// Returns the provider identifier used in logs and errors.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
        }
    }

    /// Returns a human-readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Local => "Local DeepSeek-Coder (Ollama)",
            Self::OpenAi => "OpenAI GPT-4o",
            Self::DeepSeek => "DeepSeek-Coder",
        }
    }

    /// Model used when none is configured.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Local => "deepseek-coder:1.3b-instruct",
            Self::OpenAi => "gpt-4o",
            Self::DeepSeek => "deepseek-coder",
        }
    }

    /// Base URL used when none is configured.
    #[must_use]
    pub const fn default_endpoint(self) -> &'static str {
        match self {
            Self::Local => "http://localhost:11434",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::DeepSeek => "https://api.deepseek.com",
        }
    }

    /// Sampling temperature used when none is configured.
    #[must_use]
    pub const fn default_temperature(self) -> f32 {
        match self {
            Self::Local => 0.1,
            Self::OpenAi | Self::DeepSeek => 0.2,
        }
    }

    /// Returns true for hosted providers.
    #[must_use]
    pub const fn requires_api_key(self) -> bool {
        !matches!(self, Self::Local)
    }

    /// Environment variable holding the API key.
    #[must_use]
    pub const fn api_key_env(self) -> Option<&'static str> {
        match self {
            Self::Local => None,
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// One chunk handed to a provider.
#[derive(Debug, Clone, Copy)]
pub struct RewriteInput<'a> {
    /// Code to rewrite
    pub code: &'a str,
    /// Chunk index (0-based)
    pub index: usize,
    /// Number of chunks in the file
    pub total_chunks: usize,
    /// Fence language of the source file, "" if unknown
    pub language: &'a str,
    /// File name shown to the model
    pub file_name: &'a str,
}

/// Failure of a single rewrite call.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// Transport-level failure.
    #[error("request failed: {0}")]
    Request(String),

    /// No answer within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// API key rejected.
    #[error("authentication failed (HTTP {status})")]
    Auth {
        /// HTTP status code
        status: u16,
    },

    /// Rate limit or quota exhausted.
    #[error("rate limited or quota exceeded: {body}")]
    RateLimited {
        /// Response body
        body: String,
    },

    /// Any other non-success status.
    #[error("server returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Answer received but holds no usable code.
    #[error("unusable response: {0}")]
    Malformed(String),

    /// Prompt could not be rendered.
    #[error("prompt rendering failed: {0}")]
    Prompt(String),
}

/// The external rewrite capability: code in, code out.
///
/// Implementations may be non-deterministic and must not retry on their own.
pub trait Rewriter: Send + Sync {
    /// Identifier reported in errors.
    fn name(&self) -> &str;

    /// Rewrites one chunk of code.
    ///
    /// # Errors
    ///
    /// Returns a [`RewriteError`] on any provider failure.
    fn rewrite(&self, input: &RewriteInput<'_>) -> std::result::Result<String, RewriteError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: AnswerMessage,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: AnswerMessage,
}

#[derive(Debug, Deserialize)]
struct AnswerMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Rewriter backed by an LLM over HTTP.
pub struct LlmRewriter {
    kind: ProviderKind,
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    timeout: Duration,
    prompts: PromptBuilder,
}

impl LlmRewriter {
    /// Creates a rewriter for the provider selected in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the prompt template cannot be
    /// set up.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            kind: config.provider,
            http,
            endpoint: config.effective_endpoint().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.effective_model().to_string(),
            temperature: config.effective_temperature(),
            timeout: config.timeout,
            prompts: PromptBuilder::new(config.prompt_template.as_deref())?,
        })
    }

    /// Returns the model id requests are sent to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, user_prompt: &str) -> std::result::Result<String, RewriteError> {
        let messages = [
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: user_prompt,
            },
        ];

        match self.kind {
            ProviderKind::Local => {
                let body = OllamaRequest {
                    model: &self.model,
                    messages,
                    stream: false,
                    options: OllamaOptions {
                        temperature: self.temperature,
                    },
                };
                let request = self
                    .http
                    .post(format!("{}/api/chat", self.endpoint))
                    .json(&body);
                let response: OllamaResponse = self.send(request)?;
                Ok(response.message.content.unwrap_or_default())
            }
            ProviderKind::OpenAi | ProviderKind::DeepSeek => {
                let body = CompletionRequest {
                    model: &self.model,
                    messages,
                    temperature: self.temperature,
                };
                let mut request = self
                    .http
                    .post(format!("{}/chat/completions", self.endpoint))
                    .json(&body);
                if let Some(ref key) = self.api_key {
                    request = request.bearer_auth(key);
                }
                let response: CompletionResponse = self.send(request)?;
                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| RewriteError::Malformed("no choices in response".to_string()))
            }
        }
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> std::result::Result<T, RewriteError> {
        let response = request.send().map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate(response.text().unwrap_or_default());
            error!(provider = %self.kind, status = status.as_u16(), "provider returned an error");

            return Err(match status.as_u16() {
                401 | 403 => RewriteError::Auth {
                    status: status.as_u16(),
                },
                429 => RewriteError::RateLimited { body },
                code => RewriteError::Status { status: code, body },
            });
        }

        response.json().map_err(|e| {
            if e.is_timeout() {
                RewriteError::Timeout(self.timeout)
            } else {
                RewriteError::Malformed(e.to_string())
            }
        })
    }

    fn transport_error(&self, e: &reqwest::Error) -> RewriteError {
        if e.is_timeout() {
            RewriteError::Timeout(self.timeout)
        } else {
            RewriteError::Request(e.to_string())
        }
    }
}

impl Rewriter for LlmRewriter {
    fn name(&self) -> &str {
        self.kind.id()
    }

    fn rewrite(&self, input: &RewriteInput<'_>) -> std::result::Result<String, RewriteError> {
        let user_prompt = self
            .prompts
            .render(input)
            .map_err(|e| RewriteError::Prompt(e.to_string()))?;

        debug!(
            provider = %self.kind,
            model = %self.model,
            chunk = input.index + 1,
            prompt_bytes = user_prompt.len(),
            "sending chunk"
        );

        let answer = self.complete(&user_prompt)?;
        if answer.trim().is_empty() {
            return Err(RewriteError::Malformed("empty response".to_string()));
        }

        // An empty fenced block means the whole chunk was dead code
        Ok(prompt::extract_code(&answer).unwrap_or_default())
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: RewriteInput<'static> = RewriteInput {
        code: "import os\nimport sys\nprint(1)\n",
        index: 0,
        total_chunks: 1,
        language: "python",
        file_name: "app.py",
    };

    fn remote_config(kind: ProviderKind, url: &str) -> Config {
        Config::builder()
            .source_path("app.py")
            .provider(kind)
            .api_key("sk-test")
            .endpoint(url)
            .build()
            .unwrap()
    }

    #[test]
    fn test_choice_mapping() {
        assert_eq!(ProviderKind::from_choice(0), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::from_choice(1), Some(ProviderKind::DeepSeek));
        assert_eq!(ProviderKind::from_choice(2), None);
        assert_eq!(ProviderKind::default(), ProviderKind::Local);
    }

    #[test]
    fn test_provider_defaults() {
        assert_eq!(ProviderKind::OpenAi.default_model(), "gpt-4o");
        assert_eq!(ProviderKind::DeepSeek.default_model(), "deepseek-coder");
        assert!(!ProviderKind::Local.requires_api_key());
        assert_eq!(ProviderKind::DeepSeek.api_key_env(), Some("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn test_rewriter_uses_configured_model() {
        let rewriter =
            LlmRewriter::from_config(&remote_config(ProviderKind::DeepSeek, "http://127.0.0.1:9"))
                .unwrap();
        assert_eq!(rewriter.name(), "deepseek");
        assert_eq!(rewriter.model(), "deepseek-coder");

        let config = Config::builder()
            .source_path("app.py")
            .model("qwen2.5-coder")
            .build()
            .unwrap();
        assert_eq!(LlmRewriter::from_config(&config).unwrap().model(), "qwen2.5-coder");
    }

    #[test]
    fn test_openai_rewrite() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"gpt-4o","temperature":0.2}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"```python\nprint(1)\n```"}}]}"#,
            )
            .create();

        let rewriter =
            LlmRewriter::from_config(&remote_config(ProviderKind::OpenAi, &server.url())).unwrap();
        let output = rewriter.rewrite(&INPUT).unwrap();

        assert_eq!(output, "print(1)");
        assert_eq!(rewriter.name(), "openai");
        mock.assert();
    }

    #[test]
    fn test_deepseek_uses_completions_api() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"deepseek-coder"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"print(1)"}}]}"#)
            .create();

        let rewriter =
            LlmRewriter::from_config(&remote_config(ProviderKind::DeepSeek, &server.url()))
                .unwrap();

        assert_eq!(rewriter.rewrite(&INPUT).unwrap(), "print(1)");
        mock.assert();
    }

    #[test]
    fn test_local_ollama_rewrite() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"deepseek-coder:1.3b-instruct","stream":false}"#.to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"message":{"role":"assistant","content":"```\nprint(1)\n```"},"done":true}"#)
            .create();

        let config = Config::builder()
            .source_path("app.py")
            .endpoint(server.url())
            .build()
            .unwrap();
        let rewriter = LlmRewriter::from_config(&config).unwrap();

        assert_eq!(rewriter.rewrite(&INPUT).unwrap(), "print(1)");
        mock.assert();
    }

    #[test]
    fn test_auth_failure() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":"invalid key"}"#)
            .create();

        let rewriter =
            LlmRewriter::from_config(&remote_config(ProviderKind::OpenAi, &server.url())).unwrap();
        let err = rewriter.rewrite(&INPUT).unwrap_err();

        assert!(matches!(err, RewriteError::Auth { status: 401 }));
    }

    #[test]
    fn test_rate_limited() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("quota exceeded")
            .create();

        let rewriter =
            LlmRewriter::from_config(&remote_config(ProviderKind::OpenAi, &server.url())).unwrap();
        let err = rewriter.rewrite(&INPUT).unwrap_err();

        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn test_empty_answer_is_malformed() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create();

        let rewriter =
            LlmRewriter::from_config(&remote_config(ProviderKind::OpenAi, &server.url())).unwrap();

        assert!(matches!(
            rewriter.rewrite(&INPUT).unwrap_err(),
            RewriteError::Malformed(_)
        ));
    }

    #[test]
    fn test_empty_fence_removes_chunk() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"```python\n```"}}]}"#)
            .create();

        let rewriter =
            LlmRewriter::from_config(&remote_config(ProviderKind::OpenAi, &server.url())).unwrap();

        assert_eq!(rewriter.rewrite(&INPUT).unwrap(), "");
    }

    #[test]
    fn test_unreachable_endpoint() {
        let config = Config::builder()
            .source_path("app.py")
            .endpoint("http://127.0.0.1:9")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let rewriter = LlmRewriter::from_config(&config).unwrap();

        assert!(matches!(
            rewriter.rewrite(&INPUT).unwrap_err(),
            RewriteError::Request(_) | RewriteError::Timeout(_)
        ));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = truncate("é".repeat(400));
        assert!(body.ends_with("..."));
        assert!(body.len() <= MAX_ERROR_BODY + 3);
    }
}
