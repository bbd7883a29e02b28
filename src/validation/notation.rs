//! Text scanners used by the content contract.
//!
//! Passages arrive as Markdown with optional LaTeX. These helpers answer three
//! questions about a passage: how many words it has, whether it carries any
//! structural markup, and whether it contains mathematical notation (and if
//! so, whether that notation is wrapped in math delimiters).

use std::sync::LazyLock;

use regex::Regex;

/// Named patterns that indicate mathematical content.
static MATH_INDICATORS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("exponent", r"[A-Za-z0-9)\]}]\s*\^\s*[{(]?[A-Za-z0-9+\-]"),
        // A bare `a/b` only counts inside arithmetic; dates and "24/7" are prose.
        (
            "fraction",
            r"\\frac\s*\{|\b\d+\s*/\s*\d+\s*[-+*=×÷]\s*[\d(]|[\d)]\s*[-+*=×÷]\s*\d+\s*/\s*\d+\b",
        ),
        (
            "greek_letter",
            r"[α-ωΑ-Ω]|\\(?:alpha|beta|gamma|delta|epsilon|theta|lambda|mu|pi|sigma|phi|omega)\b",
        ),
        (
            "differential",
            r"\bd[a-z]\s*/\s*d[a-z]\b|[∂∫∑]|\\(?:int|partial|sum|lim)\b",
        ),
        ("operator", r"[≤≥≠≈±∞√×÷]|\b[A-Za-z]\s*=\s*[A-Za-z0-9(]"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid math indicator regex")))
    .collect()
});

/// Inline (`$...$`, `\(...\)`) and block (`$$...$$`, `\[...\]`) math delimiters.
static MATH_DELIMITERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$[\s\S]+?\$\$|\\\[[\s\S]+?\\\]|\$[^$\n]+\$|\\\([\s\S]+?\\\)")
        .expect("valid math delimiter regex")
});

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s+\S").expect("valid heading regex"));

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*+]|\d+[.)])\s+\S").expect("valid list regex"));

static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*[^*\n]+\*\*|__[^_\n]+__|\*[^*\s][^*\n]*\*|\b_[^_\s][^_\n]*_\b")
        .expect("valid emphasis regex")
});

/// Counts words, ignoring tokens made only of punctuation or markup.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|token| token.chars().any(char::is_alphanumeric))
        .count()
}

/// Returns the names of all math indicators present in `text`.
pub fn math_indicators(text: &str) -> Vec<&'static str> {
    MATH_INDICATORS
        .iter()
        .filter(|(_, re)| re.is_match(text))
        .map(|(name, _)| *name)
        .collect()
}

/// Whether `text` contains at least one recognized math delimiter pair.
pub fn has_math_delimiters(text: &str) -> bool {
    MATH_DELIMITERS.is_match(text)
}

/// Structural markup found in a passage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkupSignals {
    pub headings: bool,
    pub lists: bool,
    pub emphasis: bool,
}

impl MarkupSignals {
    pub fn scan(text: &str) -> Self {
        Self {
            headings: HEADING.is_match(text),
            lists: LIST_ITEM.is_match(text),
            emphasis: EMPHASIS.is_match(text),
        }
    }

    pub fn any(&self) -> bool {
        self.headings || self.lists || self.emphasis
    }
}
