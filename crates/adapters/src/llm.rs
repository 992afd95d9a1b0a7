use std::env;
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::{self, HeaderValue};
use serde::{Deserialize, Serialize};

use longform_core::config::{Config, LlmConfig};
use longform_core::{ChatMessage, LanguageModel, LanguageModelError};

use crate::base_url::{chat_completions_url, check_base_url};
use crate::error::AdapterError;
use crate::retry::{call_with_retry, RetryConfig};

pub fn create_llm_adapter(
    config: &Config,
    profile_name: &str,
) -> Result<Box<dyn LanguageModel>, AdapterError> {
    let profile = config.get_llm_profile(profile_name).ok_or_else(|| {
        AdapterError::InvalidConfig(format!("unknown LLM profile `{}`", profile_name))
    })?;
    create_llm_adapter_from_profile(profile)
}

pub fn create_llm_adapter_from_profile(
    profile: &LlmConfig,
) -> Result<Box<dyn LanguageModel>, AdapterError> {
    let fmt = profile.interface_format.trim().to_lowercase();
    let default_base = match fmt.as_str() {
        "deepseek" | "" => "https://api.deepseek.com",
        "openai" => "https://api.openai.com/v1",
        "ollama" => "http://localhost:11434/v1",
        "lm studio" => "http://localhost:1234/v1",
        "custom" => "",
        other => {
            return Err(AdapterError::InvalidConfig(format!(
                "unknown interface_format: {}",
                other
            )))
        }
    };

    Ok(Box::new(OpenAiCompatibleClient::from_profile(
        profile,
        default_base,
    )?))
}

/// Where the bearer token comes from. Environment lookups happen per call so
/// a client can be built before the key is available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    Inline(String),
    Env(String),
    None,
}

impl Credential {
    pub fn from_profile(profile: &LlmConfig) -> Self {
        if !profile.api_key.trim().is_empty() {
            Credential::Inline(profile.api_key.trim().to_string())
        } else if !profile.api_key_env.trim().is_empty() {
            Credential::Env(profile.api_key_env.trim().to_string())
        } else {
            Credential::None
        }
    }

    pub fn resolve(&self) -> Result<Option<String>, AdapterError> {
        match self {
            Credential::Inline(key) => Ok(Some(key.clone())),
            Credential::Env(variable) => match env::var(variable) {
                Ok(value) if !value.trim().is_empty() => Ok(Some(value.trim().to_string())),
                _ => Err(AdapterError::MissingCredential {
                    variable: variable.clone(),
                }),
            },
            Credential::None => Ok(None),
        }
    }
}

/// Blocking chat-completions client for OpenAI-style APIs (DeepSeek included).
pub struct OpenAiCompatibleClient {
    client: Client,
    url: String,
    credential: Credential,
    model_name: String,
    max_tokens: Option<u32>,
    temperature: f32,
    retry: RetryConfig,
}

impl OpenAiCompatibleClient {
    pub fn from_profile(profile: &LlmConfig, default_base: &str) -> Result<Self, AdapterError> {
        let raw_base = if profile.base_url.trim().is_empty() {
            default_base
        } else {
            profile.base_url.as_str()
        };
        let base_url = check_base_url(raw_base);
        if base_url.is_empty() {
            return Err(AdapterError::InvalidConfig(
                "base_url must not be empty".to_string(),
            ));
        }
        if profile.model_name.trim().is_empty() {
            return Err(AdapterError::InvalidConfig(
                "model_name must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(profile.timeout.max(1)))
            .build()?;

        Ok(Self {
            client,
            url: chat_completions_url(&base_url),
            credential: Credential::from_profile(profile),
            model_name: profile.model_name.trim().to_string(),
            max_tokens: if profile.max_tokens == 0 {
                None
            } else {
                Some(profile.max_tokens)
            },
            temperature: profile.temperature,
            retry: RetryConfig::from_profile(profile),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    fn complete_once(
        &self,
        api_key: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String, AdapterError> {
        let body = ChatCompletionRequest {
            model: self.model_name.as_str(),
            messages: messages
                .iter()
                .map(|message| ChatMessageRequest {
                    role: message.role.as_str(),
                    content: message.content.as_str(),
                })
                .collect(),
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
            stream: false,
        };

        let mut request = self.client.post(&self.url).header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        debug!(
            "POST {} with {} messages (model {})",
            self.url,
            messages.len(),
            self.model_name
        );
        let response = request.json(&body).send()?;
        handle_chat_response(response)
    }

    fn complete_with_retry(&self, messages: &[ChatMessage]) -> Result<String, AdapterError> {
        let api_key = self.credential.resolve()?;
        call_with_retry(
            || self.complete_once(api_key.as_deref(), messages),
            &self.retry,
        )
    }
}

impl LanguageModel for OpenAiCompatibleClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LanguageModelError> {
        self.complete_with_retry(messages).map_err(Into::into)
    }
}

fn handle_chat_response(response: reqwest::blocking::Response) -> Result<String, AdapterError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        return Err(AdapterError::HttpStatus { status, body });
    }

    let parsed: ChatCompletionResponse = response.json()?;
    extract_choice_content(parsed).ok_or(AdapterError::EmptyResponse)
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageRequest<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_choice_content(response: ChatCompletionResponse) -> Option<String> {
    response.choices.into_iter().find_map(|choice| {
        choice
            .message
            .and_then(|message| message.content)
            .or(choice.text)
            .filter(|content| !content.trim().is_empty())
    })
}
