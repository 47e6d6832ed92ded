//! Chat-completion client used by the re-ranking judge.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::verdict::{JudgeError, JudgeResult};

/// Minimal chat seam: one system prompt, one user prompt, one text reply.
pub trait ChatClient: Send + Sync {
    fn complete(&self, system: &str, prompt: &str) -> JudgeResult<String>;
}

impl<T: ChatClient + ?Sized> ChatClient for Box<T> {
    fn complete(&self, system: &str, prompt: &str) -> JudgeResult<String> {
        (**self).complete(system, prompt)
    }
}

impl<T: ChatClient + ?Sized> ChatClient for Arc<T> {
    fn complete(&self, system: &str, prompt: &str) -> JudgeResult<String> {
        (**self).complete(system, prompt)
    }
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiChatClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl OpenAiChatClient {
    /// Create a client. An empty API key is a configuration error.
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_secs: u64,
    ) -> JudgeResult<Self> {
        if api_key.trim().is_empty() {
            return Err(JudgeError::MissingCredential("OPENAI_API_KEY".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient for OpenAiChatClient {
    fn complete(&self, system: &str, prompt: &str) -> JudgeResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        tracing::debug!(model = %self.model, "sending judge request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| JudgeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(JudgeError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| JudgeError::InvalidFormat(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| JudgeError::InvalidFormat("empty choices".into()))
    }
}

/// Replays canned replies in order (for testing without a model).
pub struct ScriptedChatClient {
    replies: Mutex<VecDeque<JudgeResult<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChatClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A client whose every call fails with a transport error.
    pub fn failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl ChatClient for ScriptedChatClient {
    fn complete(&self, _system: &str, prompt: &str) -> JudgeResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let mut replies = self
            .replies
            .lock()
            .map_err(|_| JudgeError::Transport("reply queue poisoned".into()))?;
        replies
            .pop_front()
            .unwrap_or_else(|| Err(JudgeError::Transport("no scripted reply left".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_rejected() {
        let result = OpenAiChatClient::new("http://localhost:1", "  ", "gpt-4o-mini", 5);
        assert!(matches!(result, Err(JudgeError::MissingCredential(_))));
    }

    #[test]
    fn test_scripted_client_replays_in_order() {
        let client = ScriptedChatClient::new(["first", "second"]);
        assert_eq!(client.complete("sys", "a").unwrap(), "first");
        assert_eq!(client.complete("sys", "b").unwrap(), "second");
        assert!(client.complete("sys", "c").is_err());
        assert_eq!(client.prompts(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failing_client() {
        let client = ScriptedChatClient::failing();
        assert!(matches!(
            client.complete("sys", "p"),
            Err(JudgeError::Transport(_))
        ));
    }
}
