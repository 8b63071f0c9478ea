//! Interface-language tags ("pt", "en") ↔ engine-native codes ("por", "eng").

/// Two-letter interface tag → Tesseract language code.
const LANGUAGE_CODES: &[(&str, &str)] = &[
    ("pt", "por"),
    ("en", "eng"),
    ("es", "spa"),
    ("fr", "fra"),
    ("de", "deu"),
    ("it", "ita"),
    ("zh", "chi_sim"),
    ("zh-tw", "chi_tra"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("ru", "rus"),
    ("nl", "nld"),
    ("sv", "swe"),
    ("no", "nor"),
    ("da", "dan"),
    ("fi", "fin"),
    ("pl", "pol"),
    ("cs", "ces"),
    ("hu", "hun"),
    ("ro", "ron"),
    ("bg", "bul"),
    ("hr", "hrv"),
    ("sk", "slk"),
    ("sl", "slv"),
    ("ar", "ara"),
    ("he", "heb"),
    ("fa", "fas"),
    ("ur", "urd"),
    ("hi", "hin"),
    ("th", "tha"),
    ("vi", "vie"),
    ("tr", "tur"),
    ("el", "ell"),
    ("uk", "ukr"),
    ("et", "est"),
    ("lv", "lav"),
    ("lt", "lit"),
];

pub const DEFAULT_ENGINE_CODE: &str = "eng";

/// Map an interface tag to the engine-native code. Codes that are already
/// engine-native pass through; unknown tags become `eng`.
pub fn engine_code(tag: &str) -> &'static str {
    let tag = tag.trim().to_ascii_lowercase().replace('_', "-");
    LANGUAGE_CODES
        .iter()
        .find(|(short, long)| *short == tag || long.replace('_', "-") == tag)
        .map(|(_, long)| *long)
        .unwrap_or(DEFAULT_ENGINE_CODE)
}

/// Reverse of [`engine_code`], for backends that take two-letter hints.
pub fn short_code(engine_code: &str) -> Option<&'static str> {
    let code = engine_code.trim();
    LANGUAGE_CODES
        .iter()
        .find(|(_, long)| *long == code)
        .map(|(short, _)| *short)
}

/// Language the text validator should use for an interface tag: it only
/// carries Portuguese and English tables.
pub fn validator_language(tag: &str) -> &'static str {
    match engine_code(tag) {
        "por" => "pt",
        _ => "en",
    }
}
