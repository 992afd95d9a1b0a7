mod base_url;
mod error;
mod llm;
mod retry;

pub use base_url::{chat_completions_url, check_base_url};
pub use error::AdapterError;
pub use llm::{
    create_llm_adapter, create_llm_adapter_from_profile, Credential, OpenAiCompatibleClient,
};
pub use retry::{call_with_retry, RetryConfig};

pub use longform_core::config::{Config, ConfigStore, LlmConfig};
pub use longform_core::{LanguageModel, LanguageModelError};
