pub mod config;
pub mod logging;
pub mod model;
pub mod narrative;
pub mod prompts;
pub mod store;

pub use config::{
    Config, ConfigError, ConfigStore, LlmConfig, LongformConfig, PromptConfig, RecentUsage,
};
pub use logging::{
    LogCrateSink, LogLevel, LogRecord, LogSink, NullLogSink, SharedLogSink, StdoutLogSink,
    VecLogSink,
};
pub use model::{
    ChatMessage, ChatRole, LanguageModel, LanguageModelError, LanguageModelErrorKind,
};
pub use narrative::{
    next_unit, render_status, tail_excerpt, Character, ContextWindow, Manuscript,
    NarrativeError, NarrativePhase, NovelSession, NovelStatus, PromptComposer, RenderedOutput,
    SessionId, SessionRegistry, SessionSettings, SessionSnapshot, SnapshotError, Story,
    StoryParams, UnitLabel, ValidationError,
};
pub use prompts::{PromptArguments, PromptError, PromptRegistry, PromptSource, PromptTemplate};
pub use store::{
    document_id, DocumentMetadata, DocumentStore, JsonDocumentStore, MemoryDocumentStore,
    StoreError, StoredDocument,
};
