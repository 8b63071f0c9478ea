use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Per-language regex families, all case-insensitive.
pub(super) struct PatternSet {
    pub words: Regex,
    pub numbers: Regex,
    pub email: Regex,
    pub url: Regex,
    pub phone: Regex,
    pub currency: Regex,
    pub date: Regex,
}

const NUMBERS: &str = r"\b\d+(?:[.,]\d+)?\b";
const EMAIL: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b";
const URL: &str =
    r"https?://(?:[-\w.])+(?:[:\d]+)?(?:/(?:[\w/_.])*(?:\?(?:[\w&=%.])*)?(?:#(?:\w*))?)?";
const DATE: &str = r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b|\b\d{4}[/-]\d{1,2}[/-]\d{1,2}\b";

fn ci(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("static regex")
}

static PT: Lazy<PatternSet> = Lazy::new(|| PatternSet {
    // Latin-1 letters, minus × and ÷.
    words: ci(r"[a-zA-ZÀ-ÖØ-öø-ÿ]+"),
    numbers: ci(NUMBERS),
    email: ci(EMAIL),
    url: ci(URL),
    phone: ci(r"(?:\+?55\s?)?(?:\(?[1-9]{2}\)?\s?)?(?:9?\s?\d{4}[-.\s]?\d{4})"),
    currency: ci(r"R\$\s*\d+(?:[.,]\d{2})?"),
    date: ci(DATE),
});

static EN: Lazy<PatternSet> = Lazy::new(|| PatternSet {
    words: ci(r"[a-zA-Z]+"),
    numbers: ci(NUMBERS),
    email: ci(EMAIL),
    url: ci(URL),
    phone: ci(r"(?:\+?1\s?)?(?:\(?[0-9]{3}\)?\s?)?[0-9]{3}[-.\s]?[0-9]{4}"),
    currency: ci(r"\$\s*\d+(?:[.,]\d{2})?"),
    date: ci(DATE),
});

static PT_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "o", "a", "os", "as", "de", "do", "da", "dos", "das", "em", "no", "na", "nos", "nas",
        "por", "para", "com", "sem", "como", "mais", "menos", "muito", "pouco", "que", "quem",
        "qual", "quando", "onde", "porque", "mas", "e", "ou", "se", "não", "sim", "um", "uma",
        "uns", "umas", "este", "esta", "isto", "esse", "essa", "isso", "aquele", "aquela",
        "aquilo",
    ]
    .into_iter()
    .collect()
});

static EN_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "up", "about", "into", "through", "during", "before", "after", "above", "below",
        "between", "under", "again", "further", "then", "once", "here", "there", "when", "where",
        "why", "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such",
        "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very", "can", "will",
        "just", "don", "should", "now",
    ]
    .into_iter()
    .collect()
});

/// Sentence boundaries for the readability estimate.
pub(super) static SENTENCE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+").expect("static regex"));

pub(super) static MULTIPLE_SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" {2,}").expect("static regex"));

/// Punctuation that is expected in OCR output and never flagged.
const ALLOWED_PUNCTUATION: &str = ".,!?;:()-\"'+@#$%&*=<>/\\|`~[]{}";

pub(super) fn is_suspicious(c: char) -> bool {
    !(c.is_alphanumeric() || c == '_' || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(c))
}

/// Tables for a validator language; only `"pt"` has its own, the rest use English.
pub(super) fn tables(language: &str) -> (&'static PatternSet, &'static HashSet<&'static str>) {
    match language {
        "pt" => (&*PT, &*PT_STOPWORDS),
        _ => (&*EN, &*EN_STOPWORDS),
    }
}
