use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::LongformConfig;
use crate::logging::{LogLevel, LogRecord, LogSink, NullLogSink, SharedLogSink};
use crate::model::{ChatMessage, LanguageModel, LanguageModelError};
use crate::prompts::PromptRegistry;
use crate::store::{document_id, DocumentMetadata, DocumentStore, StoredDocument};

use super::composer::PromptComposer;
use super::context::ContextWindow;
use super::error::{NarrativeError, SnapshotError};
use super::manuscript::Manuscript;
use super::render::{render_status, NovelStatus, RenderedOutput};
use super::story::{Character, Story, StoryParams};
use super::unit::{next_unit, NarrativePhase, UnitLabel};

const SNAPSHOT_VERSION: u32 = 1;

/// Engine knobs taken from `LongformConfig`.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub history_capacity: usize,
    pub recap_chars: usize,
    pub default_style: String,
    pub default_chapter_length: u32,
}

impl From<&LongformConfig> for SessionSettings {
    fn from(config: &LongformConfig) -> Self {
        Self {
            history_capacity: config.history_capacity,
            recap_chars: config.recap_chars,
            default_style: config.default_style.clone(),
            default_chapter_length: config.default_chapter_length,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&LongformConfig::default())
    }
}

#[derive(Clone, Debug)]
struct ActiveNovel {
    story: Story,
    manuscript: Manuscript,
    context: ContextWindow,
}

impl ActiveNovel {
    fn new(story: Story, settings: &SessionSettings) -> Self {
        Self {
            story,
            manuscript: Manuscript::new(),
            context: ContextWindow::new(settings.history_capacity, settings.recap_chars),
        }
    }

    fn current_chapter(&self) -> u32 {
        u32::try_from(self.manuscript.unit_count()).unwrap_or(u32::MAX)
    }

    fn next_unit(&self) -> Option<UnitLabel> {
        next_unit(self.current_chapter(), self.story.total_chapters())
    }

    /// Generates the next unit. Nothing is touched until the model has answered.
    fn advance<M: LanguageModel + ?Sized>(
        &mut self,
        model: &M,
        prompts: &PromptRegistry,
    ) -> Result<RenderedOutput, NarrativeError> {
        let Some(unit) = self.next_unit() else {
            return Err(NarrativeError::Concluded {
                title: self.story.title().to_string(),
            });
        };

        let request = PromptComposer::new(prompts).compose(
            &self.story,
            unit,
            &self.context,
            self.manuscript.text(),
        )?;
        let response = model
            .complete(&request.messages)
            .map_err(|source| NarrativeError::generation(unit, source))?;
        let body = response.trim();
        if body.is_empty() {
            return Err(NarrativeError::generation(
                unit,
                LanguageModelError::empty_response(),
            ));
        }

        self.manuscript.append(unit, body);
        self.context.record(request.instruction, body);

        Ok(RenderedOutput {
            unit,
            body: body.to_string(),
            style: self.story.style().to_string(),
            status: render_status(&self.story, &self.manuscript),
        })
    }
}

/// One narrative from `start` to `reset`.
///
/// The session owns its state outright; callers that share a session must
/// serialize access (see [`SessionRegistry`](super::SessionRegistry)).
pub struct NovelSession {
    settings: SessionSettings,
    active: Option<ActiveNovel>,
    sink: SharedLogSink,
}

impl fmt::Debug for NovelSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NovelSession")
            .field("settings", &self.settings)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl NovelSession {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            active: None,
            sink: Arc::new(NullLogSink),
        }
    }

    pub fn with_sink(mut self, sink: SharedLogSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Validates `params`, then writes the first chapter.
    ///
    /// Fails with [`NarrativeError::StateConflict`] while another narrative is
    /// active; nothing is kept when generation fails.
    pub fn start<M: LanguageModel + ?Sized>(
        &mut self,
        model: &M,
        prompts: &PromptRegistry,
        params: StoryParams,
    ) -> Result<RenderedOutput, NarrativeError> {
        if let Some(active) = &self.active {
            return Err(NarrativeError::StateConflict {
                title: active.story.title().to_string(),
            });
        }

        let story = Story::from_params(
            params,
            &self.settings.default_style,
            self.settings.default_chapter_length,
        )?;
        self.log(
            LogLevel::Info,
            format!(
                "开始创作《{}》（{}，目标{}章）",
                story.title(),
                story.genre(),
                story.total_chapters()
            ),
        );

        let mut candidate = ActiveNovel::new(story, &self.settings);
        let output = advance_logged(self.sink.as_ref(), &mut candidate, model, prompts)?;
        self.active = Some(candidate);
        Ok(output)
    }

    /// Writes the next chapter, or the epilogue once the target is reached.
    pub fn continue_writing<M: LanguageModel + ?Sized>(
        &mut self,
        model: &M,
        prompts: &PromptRegistry,
    ) -> Result<RenderedOutput, NarrativeError> {
        let Some(active) = self.active.as_mut() else {
            return Err(NarrativeError::NotInitialized);
        };
        advance_logged(self.sink.as_ref(), active, model, prompts)
    }

    pub fn status(&self) -> Result<NovelStatus, NarrativeError> {
        let active = self.active()?;
        Ok(render_status(&active.story, &active.manuscript))
    }

    /// The view of the most recent unit, as `start`/`continue` returned it.
    pub fn latest_output(&self) -> Result<RenderedOutput, NarrativeError> {
        let active = self.active()?;
        RenderedOutput::new(&active.story, &active.manuscript).ok_or(NarrativeError::NotInitialized)
    }

    pub fn reset(&mut self) {
        if let Some(active) = self.active.take() {
            self.log(
                LogLevel::Info,
                format!("已重置《{}》的创作状态", active.story.title()),
            );
        }
    }

    pub fn add_character(&mut self, character: Character) -> Result<(), NarrativeError> {
        let Some(active) = self.active.as_mut() else {
            return Err(NarrativeError::NotInitialized);
        };
        active.story.add_character(character)?;
        Ok(())
    }

    pub fn phase(&self) -> NarrativePhase {
        match &self.active {
            Some(active) => {
                NarrativePhase::of(active.current_chapter(), active.story.total_chapters())
            }
            None => NarrativePhase::Uninitialized,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn next_unit(&self) -> Option<UnitLabel> {
        self.active.as_ref().and_then(ActiveNovel::next_unit)
    }

    pub fn story(&self) -> Option<&Story> {
        self.active.as_ref().map(|active| &active.story)
    }

    pub fn manuscript(&self) -> Option<&Manuscript> {
        self.active.as_ref().map(|active| &active.manuscript)
    }

    pub fn document(&self) -> Option<&str> {
        self.manuscript().map(Manuscript::text)
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.active
            .as_ref()
            .map(|active| active.context.messages())
            .unwrap_or_default()
    }

    /// Saves the document under `novel_{title}_{engine_name}`; returns the id.
    pub fn persist(
        &self,
        store: &dyn DocumentStore,
        engine_name: &str,
    ) -> Result<String, NarrativeError> {
        let active = self.active()?;
        let status = render_status(&active.story, &active.manuscript);
        let id = document_id(active.story.title(), engine_name);
        let document = StoredDocument {
            content: active.manuscript.text().to_string(),
            metadata: DocumentMetadata {
                title: status.title,
                genre: status.genre,
                generator: engine_name.to_string(),
                chapter_labels: status.chapter_labels,
                word_count: status.word_count,
            },
        };
        store.save(&id, &document)?;
        self.log(LogLevel::Debug, format!("文档已保存: {id}"));
        Ok(id)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            novel: self.active.as_ref().map(|active| NovelSnapshot {
                story: active.story.clone(),
                units: active
                    .manuscript
                    .units()
                    .iter()
                    .map(|span| UnitRecord {
                        label: span.label,
                        body: active.manuscript.body(span).to_string(),
                    })
                    .collect(),
                history: active.context.messages(),
            }),
        }
    }

    /// Rebuilds a session, replaying units so the boundary index is recomputed.
    pub fn restore(
        settings: SessionSettings,
        snapshot: SessionSnapshot,
    ) -> Result<Self, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }
        let mut session = Self::new(settings);
        let Some(novel) = snapshot.novel else {
            return Ok(session);
        };

        novel.story.check().map_err(SnapshotError::InvalidStory)?;
        let mut active = ActiveNovel::new(novel.story, &session.settings);
        for (position, unit) in novel.units.into_iter().enumerate() {
            if active.next_unit() != Some(unit.label) {
                return Err(SnapshotError::OutOfSequence {
                    position: position + 1,
                    label: unit.label,
                });
            }
            active.manuscript.append(unit.label, &unit.body);
        }
        if active.manuscript.is_empty() {
            return Ok(session);
        }
        active.context.extend(novel.history);
        session.active = Some(active);
        Ok(session)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SnapshotError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized = serde_json::to_string_pretty(&self.snapshot())?;
        fs::write(path, serialized).map_err(|source| SnapshotError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads a saved session; a missing file yields an idle session.
    pub fn load_from_path(settings: SessionSettings, path: &Path) -> Result<Self, SnapshotError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::new(settings)),
            Err(source) => {
                return Err(SnapshotError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let snapshot: SessionSnapshot =
            serde_json::from_str(&raw).map_err(|source| SnapshotError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::restore(settings, snapshot)
    }

    fn active(&self) -> Result<&ActiveNovel, NarrativeError> {
        self.active.as_ref().ok_or(NarrativeError::NotInitialized)
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}

fn advance_logged<M: LanguageModel + ?Sized>(
    sink: &dyn LogSink,
    novel: &mut ActiveNovel,
    model: &M,
    prompts: &PromptRegistry,
) -> Result<RenderedOutput, NarrativeError> {
    if let Some(unit) = novel.next_unit() {
        sink.log(LogRecord::new(LogLevel::Info, format!("正在创作{unit}")));
    }
    match novel.advance(model, prompts) {
        Ok(output) => {
            sink.log(LogRecord::new(
                LogLevel::Info,
                format!("{}创作完成，当前进度{}", output.unit, output.status.progress),
            ));
            Ok(output)
        }
        Err(err) => {
            sink.log(LogRecord::new(LogLevel::Error, err.to_string()));
            Err(err)
        }
    }
}

impl Default for NovelSession {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

/// Serialized form of a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    #[serde(default)]
    pub novel: Option<NovelSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NovelSnapshot {
    pub story: Story,
    pub units: Vec<UnitRecord>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub label: UnitLabel,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::VecLogSink;
    use crate::model::{LanguageModelError, LanguageModelErrorKind};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, LanguageModelErrorKind>>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<&str, LanguageModelErrorKind>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|reply| reply.map(str::to_string))
                        .collect(),
                ),
            }
        }
    }

    impl LanguageModel for ScriptedModel {
        fn complete(&self, _messages: &[ChatMessage]) -> Result<String, LanguageModelError> {
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(kind)) => Err(LanguageModelError::with_kind(
                    kind,
                    io::Error::new(io::ErrorKind::Other, "scripted failure"),
                )),
                None => panic!("no scripted reply left"),
            }
        }
    }

    fn params() -> StoryParams {
        StoryParams::new("雾城", "悬疑", "林默", 2)
    }

    #[test]
    fn start_rejects_an_active_session() {
        let prompts = PromptRegistry::new().unwrap();
        let model = ScriptedModel::new(vec![Ok("第一章正文")]);
        let mut session = NovelSession::default();
        session.start(&model, &prompts, params()).unwrap();

        let err = session.start(&model, &prompts, params()).unwrap_err();
        assert!(matches!(err, NarrativeError::StateConflict { ref title } if title == "雾城"));
        assert_eq!(session.status().unwrap().chapter_labels, vec!["第1章"]);
    }

    #[test]
    fn validation_failure_leaves_session_idle() {
        let prompts = PromptRegistry::new().unwrap();
        let model = ScriptedModel::new(vec![]);
        let mut session = NovelSession::default();
        let err = session
            .start(&model, &prompts, StoryParams::new("", "悬疑", "林默", 2))
            .unwrap_err();
        assert!(matches!(err, NarrativeError::Validation(_)));
        assert_eq!(session.phase(), NarrativePhase::Uninitialized);
    }

    #[test]
    fn blank_model_output_is_a_generation_failure() {
        let prompts = PromptRegistry::new().unwrap();
        let model = ScriptedModel::new(vec![Ok("  \n ")]);
        let mut session = NovelSession::default();
        let err = session.start(&model, &prompts, params()).unwrap_err();
        match err {
            NarrativeError::Generation { unit, kind, .. } => {
                assert_eq!(unit, UnitLabel::Chapter(1));
                assert_eq!(kind, LanguageModelErrorKind::EmptyResponse);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!session.is_active());
    }

    #[test]
    fn failures_are_logged_at_error_level() {
        let prompts = PromptRegistry::new().unwrap();
        let sink = Arc::new(VecLogSink::new());
        let model = ScriptedModel::new(vec![Ok("一"), Err(LanguageModelErrorKind::Timeout)]);
        let mut session = NovelSession::default().with_sink(sink.clone());
        session.start(&model, &prompts, params()).unwrap();
        let err = session.continue_writing(&model, &prompts).unwrap_err();
        assert!(err.is_generation_failure());

        let errors = sink.messages_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("第2章"));
        assert!(errors[0].contains("请求超时"));
    }

    #[test]
    fn add_character_requires_an_active_session() {
        let mut session = NovelSession::default();
        let err = session
            .add_character(Character::supporting("苏晴", "记者"))
            .unwrap_err();
        assert!(matches!(err, NarrativeError::NotInitialized));
    }

    #[test]
    fn restore_rejects_out_of_order_units() {
        let prompts = PromptRegistry::new().unwrap();
        let model = ScriptedModel::new(vec![Ok("一"), Ok("二")]);
        let mut session = NovelSession::default();
        session.start(&model, &prompts, params()).unwrap();
        session.continue_writing(&model, &prompts).unwrap();

        let mut snapshot = session.snapshot();
        if let Some(novel) = snapshot.novel.as_mut() {
            novel.units.swap(0, 1);
        }
        let err = NovelSession::restore(SessionSettings::default(), snapshot).unwrap_err();
        assert!(matches!(err, SnapshotError::OutOfSequence { position: 1, .. }));
    }

    #[test]
    fn debug_output_omits_the_sink() {
        let session = NovelSession::default().with_sink(Arc::new(VecLogSink::new()));
        let rendered = format!("{session:?}");
        assert!(rendered.starts_with("NovelSession"));
        assert!(rendered.contains("active: None"));
        assert!(!rendered.contains("sink"));
    }

    #[test]
    fn missing_snapshot_file_gives_idle_session() {
        let dir = tempfile::tempdir().unwrap();
        let session =
            NovelSession::load_from_path(SessionSettings::default(), &dir.path().join("none.json"))
                .unwrap();
        assert!(!session.is_active());
    }
}
