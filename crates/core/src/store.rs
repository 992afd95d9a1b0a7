use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DOCUMENTS_FILE_NAME: &str = "documents.json";

/// 文档库中的文档编号：`novel_{标题}_{生成器名}`。
pub fn document_id(title: &str, engine_name: &str) -> String {
    format!("novel_{title}_{engine_name}")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub genre: String,
    pub generator: String,
    #[serde(default)]
    pub chapter_labels: Vec<String>,
    #[serde(default)]
    pub word_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("无法创建文档目录 `{path}`: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("读取文档库 `{path}` 失败: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("写入文档库 `{path}` 失败: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("文档库 `{path}` 格式错误: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("序列化文档失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Keyed document persistence; saving an existing id replaces it.
pub trait DocumentStore: Send + Sync {
    fn save(&self, id: &str, document: &StoredDocument) -> Result<(), StoreError>;
    fn load(&self, id: &str) -> Result<Option<StoredDocument>, StoreError>;
    fn ids(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<String, StoredDocument>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn save(&self, id: &str, document: &StoredDocument) -> Result<(), StoreError> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), document.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}

/// All documents in one pretty-printed `documents.json` under a directory.
pub struct JsonDocumentStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonDocumentStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: dir.join(DOCUMENTS_FILE_NAME),
            guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, StoredDocument>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl DocumentStore for JsonDocumentStore {
    fn save(&self, id: &str, document: &StoredDocument) -> Result<(), StoreError> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut documents = self.read_all()?;
        documents.insert(id.to_string(), document.clone());
        let serialized = serde_json::to_string_pretty(&documents)?;
        fs::write(&self.path, serialized).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn load(&self, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.remove(id))
    }

    fn ids(&self) -> Result<Vec<String>, StoreError> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_all()?.into_keys().collect())
    }
}
