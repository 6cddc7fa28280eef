//! Prompt cleanup before submission.
//!
//! Providers run their own content filters and readily reject prompts that
//! use business slang overlapping with violent, adult or drug vocabulary.
//! [`sanitize`] rewrites those phrases, strips script/markdown artifacts that
//! only confuse the video model and truncates to the provider's limit.

use std::sync::LazyLock;

use regex::Regex;

use crate::provider::ProviderKind;

/// Ordered phrase replacements, longest/most specific first.
///
/// No replacement contains any of the source phrases.
const PHRASE_REPLACEMENTS: &[(&str, &str)] = &[
    ("kill the competition", "outperform the competition"),
    ("killing the game", "leading the field"),
    ("killing it", "excelling"),
    ("killed it", "excelled"),
    ("crushing it", "thriving"),
    ("crushed it", "nailed the result"),
    ("value bomb", "value breakthrough"),
    ("truth bomb", "honest insight"),
    ("bombshell", "big reveal"),
    ("shooting a video", "recording a video"),
    ("shoot a video", "record a video"),
    ("video shoot", "video session"),
    ("photo shoot", "photo session"),
    ("pull the trigger", "make the decision"),
    ("attack the problem", "tackle the problem"),
    ("blow up your", "grow your"),
    ("blowing up", "taking off"),
    ("guerrilla marketing", "grassroots marketing"),
    ("drop dead", "stunningly"),
    ("addicted to", "passionate about"),
    ("addictive", "captivating"),
    ("high as a kite", "overjoyed"),
    ("sexy", "appealing"),
    ("dope", "great"),
];

static PHRASES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    PHRASE_REPLACEMENTS
        .iter()
        .map(|&(phrase, replacement)| {
            let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
            let pattern = format!(r"(?i)\b{}\b", words.join(r"\s+"));
            (Regex::new(&pattern).unwrap(), replacement)
        })
        .collect()
});

static RE_STAGE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\[\s*(?:scene|shot|b-?roll|voice\s*-?over|vo|v/o|cut(?:\s+to)?|music|sfx|transition|intro|outro|hook|cta)\b[^\]]*\]",
    )
    .unwrap()
});

static RE_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\[(]\s*\d{1,2}:\d{2}(?::\d{2})?(?:\s*[-–]\s*\d{1,2}:\d{2}(?::\d{2})?)?\s*[\])]",
    )
    .unwrap()
});

/// Any run of heading and bullet markers at the start of a line.
static RE_LINE_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:#+[ \t]*|(?:[-•*+]|\d{1,2}[.)])[ \t]+)+").unwrap()
});

static RE_EMPHASIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*+|__+").unwrap());

/// Result of [`sanitize_for`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    /// Whether the text differs from the caller's prompt.
    pub changed: bool,
}

/// Clean `prompt` and truncate it to `max_chars` characters.
///
/// Pure and idempotent: `sanitize(&sanitize(x, n), n) == sanitize(x, n)`.
pub fn sanitize(prompt: &str, max_chars: usize) -> String {
    let mut text = prompt.to_string();
    loop {
        let next = truncate(&clean_pass(&text), max_chars);
        if next == text {
            return text;
        }
        text = next;
    }
}

/// [`sanitize`] with the provider's prompt limit.
pub fn sanitize_for(provider: ProviderKind, prompt: &str) -> Sanitized {
    let text = sanitize(prompt, provider.max_prompt_chars());
    let changed = text != prompt;
    Sanitized { text, changed }
}

fn clean_pass(text: &str) -> String {
    let mut text = strip_markup(text);
    for (pattern, replacement) in PHRASES.iter() {
        if pattern.is_match(&text) {
            text = pattern.replace_all(&text, *replacement).into_owned();
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove markup until none is left. Every removal shortens the text.
fn strip_markup(text: &str) -> String {
    let mut text = text.to_string();
    loop {
        // Line markers are anchored, so they go before tags are blanked out.
        let next = RE_LINE_MARKERS.replace_all(&text, "");
        let next = RE_STAGE_TAG.replace_all(&next, " ");
        let next = RE_TIMESTAMP.replace_all(&next, " ");
        let next = RE_EMPHASIS.replace_all(&next, "").into_owned();
        if next == text {
            return text;
        }
        text = next;
    }
}

/// Cut to `max_chars` characters, preferring the last word boundary.
fn truncate(text: &str, max_chars: usize) -> String {
    let Some((cut, next)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let head = &text[..cut];
    if next.is_whitespace() {
        return head.trim_end().to_string();
    }
    match head.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => head[..pos].trim_end().to_string(),
        _ => head.to_string(),
    }
}
