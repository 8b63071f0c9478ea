//! Heuristic scoring of recognised text.
//!
//! [`TextValidator::validate_text`] combines the engine's own confidence with
//! cheap structural checks (character mix, known patterns, common words,
//! typical OCR noise) into a 0 – 100 score plus human-readable advice.

mod patterns;
pub mod thresholds;

use std::collections::HashSet;

use regex::Regex;
use serde::Serialize;

use crate::config::ValidatorConfig;
use patterns::{PatternSet, MULTIPLE_SPACES, SENTENCE_SPLIT};

pub use thresholds::{ConfidenceBand, ConfidenceThresholdManager};

/// Sample matches kept per pattern family and noise list.
const MAX_SAMPLES: usize = 5;

const NO_TEXT: &str = "No text detected";
const VERY_LOW_QUALITY: &str = "Very low quality text. Consider capturing again.";
const LOW_QUALITY: &str = "Low quality. Try preprocessing the image.";
const FAIR_QUALITY: &str = "Reasonable quality. Some errors may be present.";
const SUSPICIOUS: &str = "Check the unusual characters detected.";
const REPEATED: &str = "Possible OCR errors in repeated characters.";
const MIXED_CASE: &str = "Check words with mixed upper/lower case.";
const SPACING: &str = "Check irregular spacing in the text.";
const FEW_LETTERS: &str = "Text has few letters. It may be mostly numbers or symbols.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub text: String,
    pub is_valid: bool,
    pub final_score: f64,
    pub ocr_confidence: f64,
    /// `None` when there was no text to analyse.
    pub basic_analysis: Option<BasicAnalysis>,
    pub pattern_analysis: Option<PatternAnalysis>,
    pub quality_analysis: Option<QualityAnalysis>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicAnalysis {
    pub char_count: usize,
    pub word_count: usize,
    pub letter_count: usize,
    pub number_count: usize,
    pub space_count: usize,
    pub punctuation_count: usize,
    pub letter_ratio: f64,
    pub number_ratio: f64,
    pub space_ratio: f64,
    pub punctuation_ratio: f64,
    pub avg_word_length: f64,
    pub longest_word: String,
    pub shortest_word: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatches {
    pub count: usize,
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopwordStats {
    pub count: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternAnalysis {
    pub words: PatternMatches,
    pub numbers: PatternMatches,
    pub email: PatternMatches,
    pub url: PatternMatches,
    pub phone: PatternMatches,
    pub currency: PatternMatches,
    pub date: PatternMatches,
    pub common_words: StopwordStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousChars {
    pub count: usize,
    /// Distinct, in order of first appearance.
    pub chars: Vec<char>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatedChars {
    /// Runs of four or more identical characters.
    pub count: usize,
    /// The repeated character of the first runs.
    pub patterns: Vec<char>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixedCaseWords {
    pub count: usize,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityAnalysis {
    pub suspicious_chars: SuspiciousChars,
    pub repeated_chars: RepeatedChars,
    pub mixed_case_words: MixedCaseWords,
    pub irregular_spacing: bool,
    pub readability_score: f64,
}

/// Scores text for one language. Holds only `'static` tables and a copy of
/// its configuration, so it can be shared across threads freely.
pub struct TextValidator {
    language: &'static str,
    config: ValidatorConfig,
    patterns: &'static PatternSet,
    stopwords: &'static HashSet<&'static str>,
}

impl TextValidator {
    /// `"pt"` selects the Portuguese tables; anything else uses English.
    pub fn new(language: &str) -> Self {
        Self::with_config(language, ValidatorConfig::default())
    }

    pub fn with_config(language: &str, config: ValidatorConfig) -> Self {
        let language = if language == "pt" { "pt" } else { "en" };
        let (patterns, stopwords) = patterns::tables(language);
        TextValidator {
            language,
            config,
            patterns,
            stopwords,
        }
    }

    pub fn language(&self) -> &'static str {
        self.language
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Pure: the same `(text, ocr_confidence)` always yields the same result.
    pub fn validate_text(&self, text: &str, ocr_confidence: f64) -> ValidationResult {
        let text = text.trim();
        if text.is_empty() {
            return empty_result();
        }

        let basic = analyze_basic(text);
        let patterns = self.analyze_patterns(text);
        let quality = analyze_quality(text);

        let final_score = self.final_score(ocr_confidence, &basic, &patterns, &quality);
        let is_valid = final_score >= self.config.min_score
            && basic.char_count >= self.config.min_chars
            && basic.word_count >= self.config.min_words;
        let recommendations = recommendations(final_score, &basic, &quality);

        log::debug!(
            "[validate] score={final_score:.1} valid={is_valid} chars={} words={}",
            basic.char_count,
            basic.word_count
        );

        ValidationResult {
            text: text.to_string(),
            is_valid,
            final_score,
            ocr_confidence,
            basic_analysis: Some(basic),
            pattern_analysis: Some(patterns),
            quality_analysis: Some(quality),
            recommendations,
        }
    }

    fn analyze_patterns(&self, text: &str) -> PatternAnalysis {
        let p = self.patterns;

        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = p.words.find_iter(&lowered).map(|m| m.as_str()).collect();
        let stopword_count = tokens.iter().filter(|t| self.stopwords.contains(**t)).count();

        PatternAnalysis {
            words: find_all(&p.words, text),
            numbers: find_all(&p.numbers, text),
            email: find_all(&p.email, text),
            url: find_all(&p.url, text),
            phone: find_all(&p.phone, text),
            currency: find_all(&p.currency, text),
            date: find_all(&p.date, text),
            common_words: StopwordStats {
                count: stopword_count,
                ratio: ratio(stopword_count, tokens.len()),
            },
        }
    }

    fn final_score(
        &self,
        ocr_confidence: f64,
        basic: &BasicAnalysis,
        patterns: &PatternAnalysis,
        quality: &QualityAnalysis,
    ) -> f64 {
        // 40 points from the engine, NaN and negatives contribute nothing.
        let ocr = if ocr_confidence > 0.0 {
            (ocr_confidence / 100.0).min(1.0) * 40.0
        } else {
            0.0
        };

        let mut structure = 0.0;
        if basic.char_count >= self.config.min_chars {
            structure += 10.0;
        }
        if basic.word_count >= 1 {
            structure += 10.0;
        }
        if (0.3..=0.9).contains(&basic.letter_ratio) {
            structure += 10.0;
        }

        let mut pattern = 0.0;
        if patterns.common_words.ratio > 0.1 {
            pattern += 5.0;
        }
        if patterns.words.count > 0 {
            pattern += 5.0;
        }
        if patterns.numbers.count > 0 {
            pattern += 5.0;
        }
        if patterns.email.count > 0 || patterns.url.count > 0 {
            pattern += 5.0;
        }

        let mut clean = 0.0;
        if quality.suspicious_chars.count == 0 {
            clean += 3.0;
        }
        if quality.repeated_chars.count == 0 {
            clean += 3.0;
        }
        if !quality.irregular_spacing {
            clean += 2.0;
        }
        if quality.readability_score > 50.0 {
            clean += 2.0;
        }

        (ocr + structure + pattern + clean).min(100.0)
    }
}

fn empty_result() -> ValidationResult {
    ValidationResult {
        text: String::new(),
        is_valid: false,
        final_score: 0.0,
        ocr_confidence: 0.0,
        basic_analysis: None,
        pattern_analysis: None,
        quality_analysis: None,
        recommendations: vec![NO_TEXT.to_string()],
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn find_all(re: &Regex, text: &str) -> PatternMatches {
    let mut count = 0;
    let mut matches = Vec::new();
    for m in re.find_iter(text) {
        if matches.len() < MAX_SAMPLES {
            matches.push(m.as_str().to_string());
        }
        count += 1;
    }
    PatternMatches { count, matches }
}

fn analyze_basic(text: &str) -> BasicAnalysis {
    let words: Vec<&str> = text.split_whitespace().collect();
    let char_count = text.chars().count();

    let (mut letters, mut numbers, mut spaces, mut punctuation) = (0, 0, 0, 0);
    for c in text.chars() {
        if c.is_alphabetic() {
            letters += 1;
        }
        if c.is_numeric() {
            numbers += 1;
        }
        if c.is_whitespace() {
            spaces += 1;
        } else if !c.is_alphanumeric() {
            punctuation += 1;
        }
    }

    // First word wins ties in both directions.
    let mut longest = "";
    let mut shortest = "";
    for (i, w) in words.iter().enumerate() {
        let len = w.chars().count();
        if i == 0 || len > longest.chars().count() {
            longest = w;
        }
        if i == 0 || len < shortest.chars().count() {
            shortest = w;
        }
    }

    BasicAnalysis {
        char_count,
        word_count: words.len(),
        letter_count: letters,
        number_count: numbers,
        space_count: spaces,
        punctuation_count: punctuation,
        letter_ratio: ratio(letters, char_count),
        number_ratio: ratio(numbers, char_count),
        space_ratio: ratio(spaces, char_count),
        punctuation_ratio: ratio(punctuation, char_count),
        avg_word_length: avg_word_length(&words),
        longest_word: longest.to_string(),
        shortest_word: shortest.to_string(),
    }
}

fn avg_word_length(words: &[&str]) -> f64 {
    let total: usize = words.iter().map(|w| w.chars().count()).sum();
    ratio(total, words.len())
}

fn analyze_quality(text: &str) -> QualityAnalysis {
    let mut suspicious_count = 0;
    let mut suspicious = Vec::new();
    for c in text.chars().filter(|&c| patterns::is_suspicious(c)) {
        suspicious_count += 1;
        if !suspicious.contains(&c) {
            suspicious.push(c);
        }
    }

    let runs = repeated_runs(text);

    let mixed: Vec<&str> = text
        .split_whitespace()
        .filter(|w| {
            w.chars().count() > 3
                && w.chars().any(char::is_lowercase)
                && w.chars().any(char::is_uppercase)
        })
        .collect();

    QualityAnalysis {
        suspicious_chars: SuspiciousChars {
            count: suspicious_count,
            chars: suspicious,
        },
        repeated_chars: RepeatedChars {
            count: runs.len(),
            patterns: runs.into_iter().take(MAX_SAMPLES).collect(),
        },
        mixed_case_words: MixedCaseWords {
            count: mixed.len(),
            words: mixed.iter().take(MAX_SAMPLES).map(|w| w.to_string()).collect(),
        },
        irregular_spacing: MULTIPLE_SPACES.is_match(text),
        readability_score: readability(text),
    }
}

/// Character of every maximal run of four or more identical characters.
/// Newlines never form a run.
fn repeated_runs(text: &str) -> Vec<char> {
    let mut runs = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let mut len = 1;
        while chars.peek() == Some(&c) {
            chars.next();
            len += 1;
        }
        if len >= 4 && c != '\n' {
            runs.push(c);
        }
    }
    runs
}

/// Simplified Flesch reading ease, clamped to 0 – 100.
fn readability(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }
    let sentences = SENTENCE_SPLIT.split(text).count();
    let words_per_sentence = words.len() as f64 / sentences as f64;
    let score = 100.0 - words_per_sentence * 1.5 - avg_word_length(&words) * 10.0;
    score.clamp(0.0, 100.0)
}

fn recommendations(score: f64, basic: &BasicAnalysis, quality: &QualityAnalysis) -> Vec<String> {
    let band = if score < 30.0 {
        Some(VERY_LOW_QUALITY)
    } else if score < 50.0 {
        Some(LOW_QUALITY)
    } else if score < 70.0 {
        Some(FAIR_QUALITY)
    } else {
        None
    };

    [
        band,
        (quality.suspicious_chars.count > 0).then_some(SUSPICIOUS),
        (quality.repeated_chars.count > 0).then_some(REPEATED),
        (quality.mixed_case_words.count > 0).then_some(MIXED_CASE),
        quality.irregular_spacing.then_some(SPACING),
        (basic.letter_ratio < 0.3).then_some(FEW_LETTERS),
    ]
    .into_iter()
    .flatten()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_text_is_invalid() {
        let v = TextValidator::new("pt");
        for text in ["", "   ", "\n\t"] {
            let r = v.validate_text(text, 95.0);
            assert!(!r.is_valid);
            assert_eq!(r.final_score, 0.0);
            assert_eq!(r.ocr_confidence, 0.0);
            assert!(r.basic_analysis.is_none());
            assert_eq!(r.recommendations, vec![NO_TEXT.to_string()]);
        }
    }

    #[test]
    fn clean_english_sentence_scores_high() {
        let v = TextValidator::new("en");
        let r = v.validate_text(
            "Hello world, contact me at a@b.com or visit https://x.com",
            90.0,
        );
        // 36 engine + 30 structure + 15 patterns + 8 cleanliness
        assert!(approx(r.final_score, 89.0), "{}", r.final_score);
        assert!(r.is_valid);
        // "Hello" counts as a mixed-case word.
        assert_eq!(r.recommendations, vec![MIXED_CASE]);

        let p = r.pattern_analysis.unwrap();
        assert_eq!(p.email.matches, vec!["a@b.com"]);
        assert_eq!(p.url.matches, vec!["https://x.com"]);
        assert_eq!(p.common_words.count, 3);
    }

    #[test]
    fn repeated_noise_is_flagged() {
        let v = TextValidator::new("en");
        let r = v.validate_text("aaaaaaaa!!!!####", 10.0);
        // 4 engine + 30 structure + 5 patterns + 5 cleanliness
        assert!(approx(r.final_score, 44.0), "{}", r.final_score);
        assert!(r.is_valid);
        assert_eq!(r.recommendations, vec![LOW_QUALITY, REPEATED]);

        let q = r.quality_analysis.unwrap();
        assert_eq!(q.repeated_chars.count, 3);
        assert_eq!(q.repeated_chars.patterns, vec!['a', '!', '#']);
        assert_eq!(q.suspicious_chars.count, 0);
        assert_eq!(q.readability_score, 0.0);
    }

    #[test]
    fn every_recommendation_in_priority_order() {
        let v = TextValidator::new("en");
        // 4 letters in 18 chars, one mixed-case word, a double space, two runs
        let r = v.validate_text("§§§§ AbCd  #######", 0.0);
        assert!(approx(r.final_score, 25.0), "{}", r.final_score);
        assert!(!r.is_valid);
        assert_eq!(
            r.recommendations,
            vec![
                VERY_LOW_QUALITY,
                SUSPICIOUS,
                REPEATED,
                MIXED_CASE,
                SPACING,
                FEW_LETTERS,
            ]
        );
    }

    #[test]
    fn fair_band_with_unusual_symbol() {
        let v = TextValidator::new("en");
        let r = v.validate_text("total € 42 for the order.", 40.0);
        assert!(approx(r.final_score, 68.0), "{}", r.final_score);
        assert!(r.is_valid);
        assert_eq!(r.recommendations, vec![FAIR_QUALITY, SUSPICIOUS]);
    }

    #[test]
    fn validation_is_idempotent() {
        let v = TextValidator::new("pt");
        let text = "Pagamento de R$ 10,50 em 12/03/2024 para João";
        assert_eq!(v.validate_text(text, 72.5), v.validate_text(text, 72.5));
    }

    #[test]
    fn portuguese_patterns_and_stopwords() {
        let v = TextValidator::new("pt");
        let r = v.validate_text("Pagamento de R$ 10,50 em 12/03/2024 para João", 80.0);
        let p = r.pattern_analysis.unwrap();
        assert_eq!(p.currency.matches, vec!["R$ 10,50"]);
        assert_eq!(p.date.matches, vec!["12/03/2024"]);
        assert_eq!(p.words.count, 6);
        assert_eq!(p.words.matches.len(), MAX_SAMPLES);
        // de, em, para out of pagamento/de/r/em/para/joão
        assert_eq!(p.common_words.count, 3);
        assert!(approx(p.common_words.ratio, 0.5));
    }

    #[test]
    fn basic_counts() {
        let b = analyze_basic("ab 12 cd!");
        assert_eq!(b.char_count, 9);
        assert_eq!(b.word_count, 3);
        assert_eq!(b.letter_count, 4);
        assert_eq!(b.number_count, 2);
        assert_eq!(b.space_count, 2);
        assert_eq!(b.punctuation_count, 1);
        assert_eq!(b.longest_word, "cd!");
        assert_eq!(b.shortest_word, "ab");
        assert!(approx(b.avg_word_length, 7.0 / 3.0));
    }

    #[test]
    fn quality_signals() {
        let q = analyze_quality("HeLLo  wOrld § ©§ ok");
        assert_eq!(q.suspicious_chars.count, 3);
        assert_eq!(q.suspicious_chars.chars, vec!['§', '©']);
        assert_eq!(q.mixed_case_words.words, vec!["HeLLo", "wOrld"]);
        assert!(q.irregular_spacing);
        assert_eq!(q.repeated_chars.count, 0);
    }

    #[test]
    fn runs_ignore_newlines_and_short_repeats() {
        assert_eq!(repeated_runs("aaab\n\n\n\n\nxxxx"), vec!['x']);
        assert_eq!(repeated_runs("zzzzzzzzz"), vec!['z']);
        assert!(repeated_runs("abc").is_empty());
    }

    #[test]
    fn readability_counts_empty_sentences() {
        // "Hi." splits into ["Hi", ""]: 1 word over 2 sentences.
        assert!(approx(readability("Hi."), 100.0 - 0.75 - 30.0));
        assert!(approx(readability("a"), 100.0 - 1.5 - 10.0));
    }

    #[test]
    fn digits_only_text() {
        let v = TextValidator::new("en");
        let r = v.validate_text("12345 67890", 50.0);
        assert!(r.recommendations.contains(&FEW_LETTERS.to_string()));
        assert!(!r.recommendations.contains(&REPEATED.to_string()));
    }

    #[test]
    fn negative_confidence_adds_nothing() {
        let v = TextValidator::new("en");
        let low = v.validate_text("just text", -5.0).final_score;
        let zero = v.validate_text("just text", 0.0).final_score;
        assert_eq!(low, zero);
        let capped = v.validate_text("just text", 250.0).final_score;
        assert_eq!(capped, v.validate_text("just text", 100.0).final_score);
    }

    #[test]
    fn min_length_gate() {
        let v = TextValidator::with_config(
            "en",
            ValidatorConfig {
                min_chars: 50,
                ..ValidatorConfig::default()
            },
        );
        let r = v.validate_text("Hello world, contact me at a@b.com", 100.0);
        assert!(!r.is_valid);
        assert!(r.final_score >= 30.0);
    }
}
