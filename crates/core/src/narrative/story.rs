use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROTAGONIST_ROLE: &str = "主角";
pub const SUPPORTING_ROLE: &str = "配角";

pub const MIN_TARGET_CHAPTERS: u32 = 1;
pub const MAX_TARGET_CHAPTERS: u32 = 1000;
pub const MIN_CHAPTER_LENGTH: u32 = 1000;
pub const MAX_CHAPTER_LENGTH: u32 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("字段 '{label}' 是必填的")]
    MissingField {
        field: &'static str,
        label: &'static str,
    },
    #[error("字段 '{label}' 的值不能小于 {min}")]
    BelowMinimum {
        field: &'static str,
        label: &'static str,
        min: u32,
    },
    #[error("字段 '{label}' 的值不能大于 {max}")]
    AboveMaximum {
        field: &'static str,
        label: &'static str,
        max: u32,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub role: String,
}

impl Character {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            role: role.into(),
        }
    }

    pub fn supporting(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, SUPPORTING_ROLE)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require("name", "角色姓名", &self.name)?;
        require("role", "角色定位", &self.role)
    }
}

/// Caller input for starting a narrative.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoryParams {
    pub title: String,
    pub genre: String,
    pub main_character: String,
    pub character_description: Option<String>,
    pub outline: Option<String>,
    pub target_chapters: u32,
    pub chapter_length: Option<u32>,
    pub style: Option<String>,
}

impl StoryParams {
    pub fn new(
        title: impl Into<String>,
        genre: impl Into<String>,
        main_character: impl Into<String>,
        target_chapters: u32,
    ) -> Self {
        Self {
            title: title.into(),
            genre: genre.into(),
            main_character: main_character.into(),
            target_chapters,
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.character_description = Some(description.into());
        self
    }

    pub fn with_outline(mut self, outline: impl Into<String>) -> Self {
        self.outline = Some(outline.into());
        self
    }

    pub fn with_chapter_length(mut self, length: u32) -> Self {
        self.chapter_length = Some(length);
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

/// The immutable story bible plus the append-only cast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Story {
    title: String,
    genre: String,
    style: String,
    outline: String,
    characters: Vec<Character>,
    total_chapters: u32,
    chapter_length: u32,
}

impl Story {
    /// Validates caller input; blank optional fields fall back to the given defaults.
    pub fn from_params(
        params: StoryParams,
        default_style: &str,
        default_chapter_length: u32,
    ) -> Result<Self, ValidationError> {
        require("title", "小说标题", &params.title)?;
        require("genre", "小说类型", &params.genre)?;
        require("main_character", "主角姓名", &params.main_character)?;
        within(
            "target_chapters",
            "目标章节数",
            params.target_chapters,
            MIN_TARGET_CHAPTERS,
            MAX_TARGET_CHAPTERS,
        )?;
        let chapter_length = params.chapter_length.unwrap_or(default_chapter_length);
        within(
            "chapter_length",
            "每章字数",
            chapter_length,
            MIN_CHAPTER_LENGTH,
            MAX_CHAPTER_LENGTH,
        )?;

        let style = non_blank(params.style).unwrap_or_else(|| default_style.to_string());
        let protagonist = Character::new(
            params.main_character.trim(),
            non_blank(params.character_description).unwrap_or_default(),
            PROTAGONIST_ROLE,
        );

        Ok(Self {
            title: params.title.trim().to_string(),
            genre: params.genre.trim().to_string(),
            style,
            outline: non_blank(params.outline).unwrap_or_default(),
            characters: vec![protagonist],
            total_chapters: params.target_chapters,
            chapter_length,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn genre(&self) -> &str {
        &self.genre
    }

    pub fn style(&self) -> &str {
        &self.style
    }

    pub fn outline(&self) -> &str {
        &self.outline
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn protagonist(&self) -> Option<&Character> {
        self.characters.first()
    }

    pub fn supporting_characters(&self) -> &[Character] {
        self.characters.get(1..).unwrap_or_default()
    }

    pub fn total_chapters(&self) -> u32 {
        self.total_chapters
    }

    pub fn chapter_length(&self) -> u32 {
        self.chapter_length
    }

    /// Re-checks a story restored from outside `from_params`.
    pub(crate) fn check(&self) -> Result<(), ValidationError> {
        require("title", "小说标题", &self.title)?;
        require("genre", "小说类型", &self.genre)?;
        let Some(protagonist) = self.protagonist() else {
            return Err(ValidationError::MissingField {
                field: "main_character",
                label: "主角姓名",
            });
        };
        require("main_character", "主角姓名", &protagonist.name)?;
        within(
            "target_chapters",
            "目标章节数",
            self.total_chapters,
            MIN_TARGET_CHAPTERS,
            MAX_TARGET_CHAPTERS,
        )?;
        within(
            "chapter_length",
            "每章字数",
            self.chapter_length,
            MIN_CHAPTER_LENGTH,
            MAX_CHAPTER_LENGTH,
        )
    }

    pub fn add_character(&mut self, character: Character) -> Result<(), ValidationError> {
        character.validate()?;
        self.characters.push(Character {
            name: character.name.trim().to_string(),
            description: character.description.trim().to_string(),
            role: character.role.trim().to_string(),
        });
        Ok(())
    }
}

fn require(field: &'static str, label: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField { field, label })
    } else {
        Ok(())
    }
}

fn within(
    field: &'static str,
    label: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<(), ValidationError> {
    if value < min {
        Err(ValidationError::BelowMinimum { field, label, min })
    } else if value > max {
        Err(ValidationError::AboveMaximum { field, label, max })
    } else {
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
