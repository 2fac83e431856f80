use anyhow::{Result, anyhow};
use isolang::Language;

use crate::app_config::EngineKind;

/// Language utilities for ISO language code handling
///
/// Codes are ISO 639-1 (2-letter) or ISO 639-2/T (3-letter) primary tags,
/// optionally followed by a region or script subtag (`zh-CN`, `pt_BR`,
/// `zh-Hant`). Engines disagree on the spelling they accept, so each one
/// gets its own normalization.
/// Split a code into its lowercase primary tag and optional subtag
pub fn split_language_code(code: &str) -> (String, Option<String>) {
    let trimmed = code.trim();
    match trimmed.split_once(['-', '_']) {
        Some((primary, subtag)) => (primary.to_lowercase(), Some(subtag.to_string())),
        None => (trimmed.to_lowercase(), None),
    }
}

fn lookup_primary(primary: &str) -> Option<Language> {
    match primary.len() {
        2 => Language::from_639_1(primary),
        3 => Language::from_639_3(primary),
        _ => None,
    }
}

/// Validate a language code; the subtag must be a 2-letter region, a 3-digit
/// region or a 4-letter script.
pub fn validate_language_code(code: &str) -> Result<Language> {
    let (primary, subtag) = split_language_code(code);
    let language = lookup_primary(&primary).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;

    if let Some(subtag) = subtag {
        let valid = match subtag.len() {
            2 => subtag.chars().all(|c| c.is_ascii_alphabetic()),
            3 => subtag.chars().all(|c| c.is_ascii_digit()),
            4 => subtag.chars().all(|c| c.is_ascii_alphabetic()),
            _ => false,
        };
        if !valid {
            return Err(anyhow!("Invalid language subtag in code: {}", code));
        }
    }

    Ok(language)
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let language = validate_language_code(code)?;
    let (primary, subtag) = split_language_code(code);
    let name = language.to_name().to_string();

    if primary == "zh" {
        let traditional = subtag
            .map(|s| matches!(s.to_uppercase().as_str(), "TW" | "HK" | "MO" | "HANT"))
            .unwrap_or(false);
        return Ok(format!("{} ({})", name, if traditional { "Traditional" } else { "Simplified" }));
    }
    Ok(name)
}

/// Whether the language is written with CJK characters
pub fn is_cjk(code: &str) -> bool {
    let (primary, _) = split_language_code(code);
    matches!(primary.as_str(), "zh" | "zho" | "ja" | "jpn" | "ko" | "kor")
}

/// Check if two language codes match (represent the same primary language)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (validate_language_code(code1), validate_language_code(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Spell a code the way the given engine expects it
pub fn normalize_for_engine(code: &str, engine: EngineKind, is_target: bool) -> String {
    let (primary, subtag) = split_language_code(code);
    let primary = lookup_primary(&primary)
        .and_then(|l| l.to_639_1())
        .map(|p| p.to_string())
        .unwrap_or(primary);

    match engine {
        EngineKind::Google => match (primary.as_str(), subtag) {
            ("zh", Some(subtag)) if matches!(subtag.to_uppercase().as_str(), "TW" | "HK" | "HANT") => {
                "zh-TW".to_string()
            }
            ("zh", _) => "zh-CN".to_string(),
            _ => primary.clone(),
        },
        EngineKind::DeepL => {
            let upper = primary.to_uppercase();
            if !is_target {
                return upper;
            }
            match (upper.as_str(), subtag.map(|s| s.to_uppercase())) {
                ("EN", Some(region)) if region == "GB" => "EN-GB".to_string(),
                ("EN", _) => "EN-US".to_string(),
                ("PT", Some(region)) if region == "BR" => "PT-BR".to_string(),
                ("PT", _) => "PT-PT".to_string(),
                ("ZH", _) => "ZH".to_string(),
                _ => upper.clone(),
            }
        }
        EngineKind::OpenAI => get_language_name(code).unwrap_or_else(|_| code.to_string()),
    }
}
