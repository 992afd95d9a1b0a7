use std::collections::VecDeque;

use crate::model::ChatMessage;

/// Fixed-capacity FIFO of chat messages; the oldest entry is dropped first.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRing {
    capacity: usize,
    entries: VecDeque<ChatMessage>,
}

impl HistoryRing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, message: ChatMessage) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> + '_ {
        self.entries.iter()
    }
}

/// Bounded recent exchanges plus the size of the recap quoted from the document tail.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextWindow {
    history: HistoryRing,
    recap_chars: usize,
}

impl ContextWindow {
    /// `history_capacity` counts messages and is rounded down to whole exchanges.
    pub fn new(history_capacity: usize, recap_chars: usize) -> Self {
        Self {
            history: HistoryRing::with_capacity(history_capacity - history_capacity % 2),
            recap_chars,
        }
    }

    pub fn record(&mut self, instruction: impl Into<String>, response: impl Into<String>) {
        self.history.push(ChatMessage::user(instruction));
        self.history.push(ChatMessage::assistant(response));
    }

    /// Replays raw messages, e.g. from a snapshot; the ring still bounds them.
    pub fn extend<I: IntoIterator<Item = ChatMessage>>(&mut self, messages: I) {
        for message in messages {
            self.history.push(message);
        }
    }

    pub fn history(&self) -> &HistoryRing {
        &self.history
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.history.iter().cloned().collect()
    }

    pub fn recap_chars(&self) -> usize {
        self.recap_chars
    }

    pub fn recap<'a>(&self, document: &'a str) -> &'a str {
        tail_excerpt(document, self.recap_chars)
    }
}

/// Last `n_chars` characters of `text`, cut on a character boundary.
pub fn tail_excerpt(text: &str, n_chars: usize) -> &str {
    if n_chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n_chars - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChatRole;

    #[test]
    fn ring_evicts_oldest_first() {
        let mut ring = HistoryRing::with_capacity(3);
        for idx in 0..5 {
            ring.push(ChatMessage::user(format!("m{idx}")));
        }
        let kept: Vec<_> = ring.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(kept, vec!["m2", "m3", "m4"]);
        assert_eq!(ring.len(), ring.capacity());
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut ring = HistoryRing::with_capacity(0);
        ring.push(ChatMessage::user("ignored"));
        assert!(ring.is_empty());
    }

    #[test]
    fn window_keeps_whole_exchanges() {
        let mut window = ContextWindow::new(4, 500);
        window.record("写第一章", "一");
        window.record("写第二章", "二");
        window.record("写第三章", "三");

        let messages = window.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[0].content, "写第二章");
        assert_eq!(messages[3].role, ChatRole::Assistant);
        assert_eq!(messages[3].content, "三");
    }

    #[test]
    fn odd_capacity_never_splits_an_exchange() {
        let mut window = ContextWindow::new(3, 500);
        assert_eq!(window.history().capacity(), 2);
        for idx in 0..3 {
            window.record(format!("指令{idx}"), format!("正文{idx}"));
        }

        let roles: Vec<_> = window.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant]);
        assert_eq!(window.messages()[0].content, "指令2");
    }

    #[test]
    fn tail_excerpt_counts_characters_not_bytes() {
        let text = "春眠不觉晓，处处闻啼鸟。";
        assert_eq!(tail_excerpt(text, 6), "处处闻啼鸟。");
        assert_eq!(tail_excerpt(text, 100), text);
        assert_eq!(tail_excerpt(text, 0), "");
        assert_eq!(tail_excerpt("", 5), "");
    }

    #[test]
    fn recap_uses_configured_length() {
        let window = ContextWindow::new(10, 3);
        assert_eq!(window.recap("abcdef"), "def");
    }
}
