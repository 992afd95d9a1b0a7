use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged message in a chat completion request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Failure classes a text-generation backend reports to the engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LanguageModelErrorKind {
    MissingCredential,
    Transport,
    Timeout,
    Status,
    EmptyResponse,
    Malformed,
    Other,
}

impl LanguageModelErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingCredential => "缺少API密钥",
            Self::Transport => "网络传输失败",
            Self::Timeout => "请求超时",
            Self::Status => "服务端返回错误状态",
            Self::EmptyResponse => "返回内容为空",
            Self::Malformed => "返回格式异常",
            Self::Other => "未知错误",
        }
    }
}

impl fmt::Display for LanguageModelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
pub struct LanguageModelError {
    kind: LanguageModelErrorKind,
    inner: Box<dyn StdError + Send + Sync>,
}

impl LanguageModelError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::with_kind(LanguageModelErrorKind::Other, error)
    }

    pub fn with_kind<E>(kind: LanguageModelErrorKind, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            kind,
            inner: Box::new(error),
        }
    }

    pub fn empty_response() -> Self {
        Self::with_kind(LanguageModelErrorKind::EmptyResponse, BlankResponse)
    }

    pub fn kind(&self) -> LanguageModelErrorKind {
        self.kind
    }
}

impl fmt::Display for LanguageModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl StdError for LanguageModelError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("模型返回了空白内容")]
struct BlankResponse;

/// Contract of the external text-generation service.
///
/// Implementations own transport, credentials and any retry policy. A call
/// either returns one block of generated text or a classified error.
pub trait LanguageModel: Send + Sync {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LanguageModelError>;

    fn invoke(&self, prompt: &str) -> Result<String, LanguageModelError> {
        self.complete(&[ChatMessage::user(prompt)])
    }
}

impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LanguageModelError> {
        (**self).complete(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Echo;

    impl LanguageModel for Echo {
        fn complete(&self, messages: &[ChatMessage]) -> Result<String, LanguageModelError> {
            Ok(messages
                .iter()
                .map(|m| format!("{}:{}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("|"))
        }
    }

    #[test]
    fn invoke_wraps_prompt_as_single_user_message() {
        assert_eq!(Echo.invoke("你好").unwrap(), "user:你好");
    }

    #[test]
    fn error_keeps_kind_and_message() {
        let err = LanguageModelError::with_kind(
            LanguageModelErrorKind::Timeout,
            io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed"),
        );
        assert_eq!(err.kind(), LanguageModelErrorKind::Timeout);
        assert_eq!(err.to_string(), "deadline elapsed");

        let generic = LanguageModelError::new(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(generic.kind(), LanguageModelErrorKind::Other);
        assert_eq!(
            LanguageModelError::empty_response().kind(),
            LanguageModelErrorKind::EmptyResponse
        );
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("好")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"好"}"#);
    }
}
