use once_cell::sync::Lazy;
use regex::Regex;

static VERSION_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/v\d+(/|$)").expect("valid version segment regex"));

/// Normalizes a base URL for an OpenAI-compatible API.
///
/// A trailing `#` means "use verbatim"; otherwise `/v1` is appended unless
/// the path already carries a version segment.
pub fn check_base_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if let Some(verbatim) = trimmed.strip_suffix('#') {
        return verbatim.to_string();
    }

    let without_slash = trimmed.trim_end_matches('/');
    if VERSION_SEGMENT_RE.is_match(without_slash) {
        without_slash.to_string()
    } else {
        format!("{without_slash}/v1")
    }
}

pub fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}
