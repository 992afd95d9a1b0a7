use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const EPILOGUE_LABEL: &str = "尾声";

static CHAPTER_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^第([1-9]\d*)章$").expect("valid chapter label regex"));

/// Identity of one appended unit: an ordinal chapter or the closing epilogue.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum UnitLabel {
    Chapter(u32),
    Epilogue,
}

impl UnitLabel {
    pub fn chapter_number(&self) -> Option<u32> {
        match self {
            Self::Chapter(number) => Some(*number),
            Self::Epilogue => None,
        }
    }
}

impl fmt::Display for UnitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chapter(number) => write!(f, "第{number}章"),
            Self::Epilogue => f.write_str(EPILOGUE_LABEL),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("无法识别的章节标记 `{0}`")]
pub struct UnitLabelError(String);

impl FromStr for UnitLabel {
    type Err = UnitLabelError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text == EPILOGUE_LABEL {
            return Ok(Self::Epilogue);
        }
        CHAPTER_LABEL_RE
            .captures(text)
            .and_then(|caps| caps[1].parse().ok())
            .map(Self::Chapter)
            .ok_or_else(|| UnitLabelError(text.to_string()))
    }
}

impl Serialize for UnitLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UnitLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Where a narrative stands relative to its target length.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativePhase {
    Uninitialized,
    Drafting,
    EpiloguePending,
    Concluded,
}

impl NarrativePhase {
    pub fn of(current_chapter: u32, total_chapters: u32) -> Self {
        match next_unit(current_chapter, total_chapters) {
            Some(UnitLabel::Chapter(_)) => Self::Drafting,
            Some(UnitLabel::Epilogue) => Self::EpiloguePending,
            None => Self::Concluded,
        }
    }
}

/// Decides the unit that follows `current_chapter` appended units.
///
/// Ordinal chapters run up to `total_chapters`; the unit after that is the
/// epilogue, and nothing follows the epilogue.
pub fn next_unit(current_chapter: u32, total_chapters: u32) -> Option<UnitLabel> {
    let next = current_chapter.checked_add(1)?;
    if next <= total_chapters {
        Some(UnitLabel::Chapter(next))
    } else if current_chapter <= total_chapters {
        Some(UnitLabel::Epilogue)
    } else {
        None
    }
}
