use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::{LanguageModelError, LanguageModelErrorKind};
use crate::prompts::PromptError;
use crate::store::StoreError;

use super::story::ValidationError;
use super::unit::UnitLabel;

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error("输入校验失败: {0}")]
    Validation(#[from] ValidationError),
    #[error("没有正在创作的小说，请先开始创作")]
    NotInitialized,
    #[error("《{title}》正在创作中，请先重置后再开始新的小说")]
    StateConflict { title: String },
    #[error("《{title}》已写完尾声，无法继续续写")]
    Concluded { title: String },
    #[error("生成{unit}失败（{kind}）: {source}")]
    Generation {
        unit: UnitLabel,
        kind: LanguageModelErrorKind,
        #[source]
        source: LanguageModelError,
    },
    #[error("渲染提示词失败: {0}")]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NarrativeError {
    pub(crate) fn generation(unit: UnitLabel, source: LanguageModelError) -> Self {
        Self::Generation {
            unit,
            kind: source.kind(),
            source,
        }
    }

    /// Failures after which the caller may simply retry the same operation.
    pub fn is_generation_failure(&self) -> bool {
        matches!(self, Self::Generation { .. })
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("读取会话文件 `{path}` 失败: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("写入会话文件 `{path}` 失败: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("会话文件 `{path}` 格式错误: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("序列化会话失败: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("不支持的会话文件版本 {0}")]
    UnsupportedVersion(u32),
    #[error("会话中第{position}个单元 `{label}` 的顺序不正确")]
    OutOfSequence { position: usize, label: UnitLabel },
    #[error("会话中的小说设定无效: {0}")]
    InvalidStory(#[source] ValidationError),
}
