//! Incremental long-form generation: one unit per model call, appended to a
//! single growing document.

mod composer;
mod context;
mod error;
mod manuscript;
mod registry;
mod render;
mod session;
mod story;
mod unit;

pub use composer::{ComposedRequest, PromptComposer};
pub use context::{tail_excerpt, ContextWindow, HistoryRing};
pub use error::{NarrativeError, SnapshotError};
pub use manuscript::{Manuscript, UnitSpan, UNIT_SEPARATOR};
pub use registry::{SessionId, SessionRegistry, SharedSession};
pub use render::{progress_label, render_status, NovelStatus, RenderedOutput};
pub use session::{
    NovelSession, NovelSnapshot, SessionSettings, SessionSnapshot, UnitRecord,
};
pub use story::{
    Character, Story, StoryParams, ValidationError, MAX_CHAPTER_LENGTH, MAX_TARGET_CHAPTERS,
    MIN_CHAPTER_LENGTH, MIN_TARGET_CHAPTERS, PROTAGONIST_ROLE, SUPPORTING_ROLE,
};
pub use unit::{next_unit, NarrativePhase, UnitLabel, UnitLabelError, EPILOGUE_LABEL};
