use std::fmt;

use serde::Serialize;

use super::manuscript::Manuscript;
use super::story::Story;
use super::unit::UnitLabel;

const FOOTER_HINT: &str = "*提示：您可以继续创作下一章，或查看完整小说内容*";

/// Display-only progress view, derived from the manuscript on every call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NovelStatus {
    pub title: String,
    pub genre: String,
    pub current_chapter: u32,
    pub total_chapters: u32,
    pub progress: String,
    pub word_count: usize,
    pub chapter_labels: Vec<String>,
}

pub fn progress_label(current_chapter: u32, total_chapters: u32) -> String {
    format!("第{current_chapter}章/共{total_chapters}章")
}

pub fn render_status(story: &Story, manuscript: &Manuscript) -> NovelStatus {
    let current_chapter = u32::try_from(manuscript.unit_count()).unwrap_or(u32::MAX);
    NovelStatus {
        title: story.title().to_string(),
        genre: story.genre().to_string(),
        current_chapter,
        total_chapters: story.total_chapters(),
        progress: progress_label(current_chapter, story.total_chapters()),
        word_count: manuscript.char_count(),
        chapter_labels: manuscript
            .labels()
            .iter()
            .map(UnitLabel::to_string)
            .collect(),
    }
}

/// Result of a successful `start` or `continue`.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedOutput {
    pub unit: UnitLabel,
    pub body: String,
    pub style: String,
    pub status: NovelStatus,
}

impl RenderedOutput {
    pub fn new(story: &Story, manuscript: &Manuscript) -> Option<Self> {
        let (unit, body) = manuscript.latest()?;
        Some(Self {
            unit,
            body: body.to_string(),
            style: story.style().to_string(),
            status: render_status(story, manuscript),
        })
    }

    pub fn markdown(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RenderedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = &self.status;
        writeln!(f, "# {}", status.title)?;
        writeln!(f)?;
        writeln!(f, "- 类型：{}", status.genre)?;
        writeln!(f, "- 写作风格：{}", self.style)?;
        writeln!(f)?;
        writeln!(f, "## 创作进度")?;
        writeln!(f, "- 当前章节：{}", status.progress)?;
        writeln!(f, "- 总字数：{}字", status.word_count)?;
        writeln!(f, "- 已创作章节：{}", status.chapter_labels.join(", "))?;
        writeln!(f)?;
        writeln!(f, "## 最新内容")?;
        writeln!(f)?;
        writeln!(f, "{}", self.unit)?;
        writeln!(f, "{}", self.body)?;
        writeln!(f)?;
        writeln!(f, "---")?;
        write!(f, "{FOOTER_HINT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::story::StoryParams;

    fn fixture() -> (Story, Manuscript) {
        let story = Story::from_params(
            StoryParams::new("雾城", "悬疑", "林默", 2).with_style("紧张刺激"),
            "轻松幽默",
            2000,
        )
        .unwrap();
        let mut manuscript = Manuscript::new();
        manuscript.append(UnitLabel::Chapter(1), "雨夜。");
        manuscript.append(UnitLabel::Chapter(2), "枪声。");
        (story, manuscript)
    }

    #[test]
    fn status_is_derived_from_the_manuscript() {
        let (story, manuscript) = fixture();
        let status = render_status(&story, &manuscript);
        assert_eq!(status.current_chapter, 2);
        assert_eq!(status.progress, "第2章/共2章");
        assert_eq!(status.chapter_labels, vec!["第1章", "第2章"]);
        assert_eq!(status.word_count, manuscript.text().chars().count());
        assert_eq!(status, render_status(&story, &manuscript));
    }

    #[test]
    fn markdown_shows_header_progress_and_latest_unit() {
        let (story, manuscript) = fixture();
        let output = RenderedOutput::new(&story, &manuscript).unwrap();
        let text = output.markdown();

        assert!(text.starts_with("# 雾城\n"));
        assert!(text.contains("- 写作风格：紧张刺激"));
        assert!(text.contains("- 当前章节：第2章/共2章"));
        assert!(text.contains("- 已创作章节：第1章, 第2章"));
        assert!(text.contains("## 最新内容\n\n第2章\n枪声。\n"));
        assert!(!text.contains("雨夜"));
        assert!(text.ends_with(FOOTER_HINT));
    }

    #[test]
    fn empty_manuscript_has_no_output() {
        let (story, _) = fixture();
        assert!(RenderedOutput::new(&story, &Manuscript::new()).is_none());
    }
}
