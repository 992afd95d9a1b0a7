use super::unit::UnitLabel;

pub const UNIT_SEPARATOR: &str = "\n\n";

/// Byte offsets of one appended unit inside the manuscript text.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnitSpan {
    pub label: UnitLabel,
    pub start: usize,
    pub body_start: usize,
    pub end: usize,
}

/// Append-only canonical document with an index of unit boundaries.
///
/// The index is the only record of which units exist, so labels and text
/// cannot disagree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manuscript {
    text: String,
    units: Vec<UnitSpan>,
}

impl Manuscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `label` and the trimmed `body`; the first unit has no leading separator.
    pub fn append(&mut self, label: UnitLabel, body: &str) -> UnitSpan {
        if !self.units.is_empty() {
            self.text.push_str(UNIT_SEPARATOR);
        }
        let start = self.text.len();
        self.text.push_str(&label.to_string());
        self.text.push('\n');
        let body_start = self.text.len();
        self.text.push_str(body.trim());
        let span = UnitSpan {
            label,
            start,
            body_start,
            end: self.text.len(),
        };
        self.units.push(span);
        span
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn units(&self) -> &[UnitSpan] {
        &self.units
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn labels(&self) -> Vec<UnitLabel> {
        self.units.iter().map(|span| span.label).collect()
    }

    pub fn body(&self, span: &UnitSpan) -> &str {
        &self.text[span.body_start..span.end]
    }

    pub fn latest(&self) -> Option<(UnitLabel, &str)> {
        self.units
            .last()
            .map(|span| (span.label, self.body(span)))
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_unit_starts_the_document() {
        let mut manuscript = Manuscript::new();
        manuscript.append(UnitLabel::Chapter(1), "  清晨的咖啡店。 \n");
        assert_eq!(manuscript.text(), "第1章\n清晨的咖啡店。");
        assert_eq!(manuscript.latest(), Some((UnitLabel::Chapter(1), "清晨的咖啡店。")));
    }

    #[test]
    fn later_units_are_separated_by_a_blank_line() {
        let mut manuscript = Manuscript::new();
        manuscript.append(UnitLabel::Chapter(1), "甲");
        let before = manuscript.text().to_string();
        let span = manuscript.append(UnitLabel::Epilogue, "乙");

        assert!(manuscript.text().starts_with(&before));
        assert_eq!(manuscript.text(), "第1章\n甲\n\n尾声\n乙");
        assert_eq!(&manuscript.text()[span.start..span.body_start], "尾声\n");
        assert_eq!(manuscript.body(&span), "乙");
        assert_eq!(
            manuscript.labels(),
            vec![UnitLabel::Chapter(1), UnitLabel::Epilogue]
        );
    }

    #[test]
    fn char_count_is_unicode_aware() {
        let mut manuscript = Manuscript::new();
        manuscript.append(UnitLabel::Chapter(1), "你好");
        assert_eq!(manuscript.char_count(), "第1章\n你好".chars().count());
    }
}
