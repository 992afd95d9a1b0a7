use crate::model::ChatMessage;
use crate::prompts::{
    PromptArguments, PromptError, PromptRegistry, EPILOGUE_PROMPT, FIRST_CHAPTER_PROMPT,
    NEXT_CHAPTER_PROMPT, RECAP_PROMPT, SYSTEM_PROMPT,
};

use super::context::ContextWindow;
use super::story::Story;
use super::unit::UnitLabel;

const INFER_CHARACTER: &str = "请根据类型和风格自行设定";
const INFER_OUTLINE: &str = "请根据类型和风格自行发展";

/// Renders the story bible and per-unit instructions from registry templates.
///
/// Every builder is a pure function of its inputs.
#[derive(Clone, Copy)]
pub struct PromptComposer<'a> {
    prompts: &'a PromptRegistry,
}

impl<'a> PromptComposer<'a> {
    pub fn new(prompts: &'a PromptRegistry) -> Self {
        Self { prompts }
    }

    pub fn build_system_prompt(
        &self,
        story: &Story,
        unit: UnitLabel,
    ) -> Result<String, PromptError> {
        let (protagonist, description) = match story.protagonist() {
            Some(character) => (
                character.name.clone(),
                or_infer(&character.description, INFER_CHARACTER),
            ),
            None => (String::new(), INFER_CHARACTER.to_string()),
        };

        let mut args = PromptArguments::new();
        args.insert("title".into(), story.title().to_string());
        args.insert("genre".into(), story.genre().to_string());
        args.insert("style".into(), story.style().to_string());
        args.insert("protagonist".into(), protagonist);
        args.insert("protagonist_description".into(), description);
        args.insert("supporting_characters".into(), supporting_lines(story));
        args.insert("outline".into(), or_infer(story.outline(), INFER_OUTLINE));
        args.insert("unit_name".into(), unit.to_string());
        args.insert("chapter_length".into(), story.chapter_length().to_string());

        self.prompts.format(SYSTEM_PROMPT, &args)
    }

    /// The bare instruction for `unit`; this is what history records.
    pub fn build_instruction(&self, story: &Story, unit: UnitLabel) -> Result<String, PromptError> {
        match unit {
            UnitLabel::Chapter(1) => self
                .prompts
                .format_with(FIRST_CHAPTER_PROMPT, [("title", story.title())]),
            UnitLabel::Chapter(number) => self.prompts.format_with(
                NEXT_CHAPTER_PROMPT,
                [("chapter_number", number.to_string())],
            ),
            UnitLabel::Epilogue => self
                .prompts
                .format_with(EPILOGUE_PROMPT, [("title", story.title())]),
        }
    }

    /// The instruction for `unit`, wrapped with `recap` when one is supplied.
    pub fn build_user_prompt(
        &self,
        story: &Story,
        unit: UnitLabel,
        recap: Option<&str>,
    ) -> Result<String, PromptError> {
        let instruction = self.build_instruction(story, unit)?;
        match recap.map(str::trim).filter(|text| !text.is_empty()) {
            Some(recap) => self.prompts.format_with(
                RECAP_PROMPT,
                [("instruction", instruction.as_str()), ("recap", recap)],
            ),
            None => Ok(instruction),
        }
    }

    /// `[system, history.., user]` for the next unit; `document` feeds the recap.
    pub fn compose(
        &self,
        story: &Story,
        unit: UnitLabel,
        context: &ContextWindow,
        document: &str,
    ) -> Result<ComposedRequest, PromptError> {
        let system = self.build_system_prompt(story, unit)?;
        let instruction = self.build_instruction(story, unit)?;
        let prompt = self.build_user_prompt(story, unit, Some(context.recap(document)))?;

        let mut messages = Vec::with_capacity(context.history().len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(context.history().iter().cloned());
        messages.push(ChatMessage::user(prompt));

        Ok(ComposedRequest {
            instruction,
            messages,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComposedRequest {
    /// Unit instruction without the recap.
    pub instruction: String,
    pub messages: Vec<ChatMessage>,
}

fn or_infer(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn supporting_lines(story: &Story) -> String {
    story
        .supporting_characters()
        .iter()
        .map(|character| {
            if character.description.is_empty() {
                format!("\n- {}（{}）", character.name, character.role)
            } else {
                format!(
                    "\n- {}（{}）：{}",
                    character.name, character.role, character.description
                )
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatRole;
    use crate::narrative::story::{Character, StoryParams};

    fn story() -> Story {
        Story::from_params(
            StoryParams::new("咖啡店的邂逅", "爱情", "小雨", 3),
            "轻松幽默",
            2000,
        )
        .unwrap()
    }

    #[test]
    fn system_prompt_falls_back_when_details_are_missing() {
        let prompts = PromptRegistry::new().unwrap();
        let composer = PromptComposer::new(&prompts);
        let prompt = composer
            .build_system_prompt(&story(), UnitLabel::Chapter(1))
            .unwrap();

        assert!(prompt.contains("《咖啡店的邂逅》"));
        assert!(prompt.contains("主角描述：请根据类型和风格自行设定"));
        assert!(prompt.contains("故事大纲：请根据类型和风格自行发展"));
        assert!(prompt.contains("当前正在创作第1章"));
        assert!(prompt.contains("2000字"));
        assert!(prompt.contains("不要包含章节标题"));
    }

    #[test]
    fn supporting_characters_follow_the_protagonist() {
        let prompts = PromptRegistry::new().unwrap();
        let composer = PromptComposer::new(&prompts);
        let mut story = story();
        story
            .add_character(Character::supporting("阿哲", "咖啡师"))
            .unwrap();

        let prompt = composer
            .build_system_prompt(&story, UnitLabel::Chapter(2))
            .unwrap();
        assert!(prompt.contains("\n- 阿哲（配角）：咖啡师\n- 故事大纲"));
    }

    #[test]
    fn user_prompt_depends_on_unit() {
        let prompts = PromptRegistry::new().unwrap();
        let composer = PromptComposer::new(&prompts);
        let story = story();

        let first = composer
            .build_user_prompt(&story, UnitLabel::Chapter(1), None)
            .unwrap();
        assert!(first.contains("第一章"));
        assert!(first.contains("引入主角"));

        let next = composer
            .build_user_prompt(&story, UnitLabel::Chapter(2), Some("她推开了门。"))
            .unwrap();
        assert!(next.starts_with("请继续创作第2章"));
        assert!(next.ends_with("【前文内容回顾】\n她推开了门。"));

        let epilogue = composer
            .build_user_prompt(&story, UnitLabel::Epilogue, Some("  "))
            .unwrap();
        assert!(epilogue.contains("尾声"));
        assert!(!epilogue.contains("前文内容回顾"));
    }

    #[test]
    fn compose_orders_system_history_user() {
        let prompts = PromptRegistry::new().unwrap();
        let composer = PromptComposer::new(&prompts);
        let mut context = ContextWindow::new(10, 5);
        context.record("上一条指令", "上一章正文");

        let request = composer
            .compose(&story(), UnitLabel::Chapter(2), &context, "第1章\n上一章正文")
            .unwrap();

        let roles: Vec<_> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        let sent = &request.messages[3].content;
        assert!(sent.starts_with(&request.instruction));
        assert!(sent.ends_with("上一章正文"));
        assert!(!request.instruction.contains("上一章正文"));
        assert_eq!(
            request.instruction,
            composer
                .build_instruction(&story(), UnitLabel::Chapter(2))
                .unwrap()
        );
    }
}
