use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for ISO language codes and gettext locales
///
/// This module validates and normalizes ISO 639-1 (2-letter) and ISO 639-2
/// (3-letter) language codes, optionally followed by a region
/// (`pt-BR`, `pt_BR`, `es-419`).
/// Language code type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageCodeType {
    /// ISO 639-1 (2-letter) code
    Part1,
    /// ISO 639-2/T (3-letter) code
    Part2T,
    /// ISO 639-2/B (3-letter) code
    Part2B,
}

/// ISO 639-2/B codes that differ from their ISO 639-2/T form
const PART2B_TO_PART2T: [(&str, &str); 18] = [
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

fn part2b_to_part2t(code: &str) -> Option<&'static str> {
    PART2B_TO_PART2T
        .iter()
        .find(|(b, _)| *b == code)
        .map(|(_, t)| *t)
}

/// A language code split from its optional region subtag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    /// Lowercase language part
    pub language: String,
    /// Uppercase region part (`BR`, `419`)
    pub region: Option<String>,
}

/// Split `pt-BR` / `pt_BR` into language and region
pub fn split_locale(code: &str) -> Result<Locale> {
    let trimmed = code.trim();
    let mut parts = trimmed.splitn(2, ['-', '_']);
    let language = parts.next().unwrap_or_default().to_lowercase();
    let region = match parts.next() {
        Some(region) => {
            let valid = (region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()))
                || (region.len() == 3 && region.chars().all(|c| c.is_ascii_digit()));
            if !valid {
                return Err(anyhow!("Invalid region in language code: {}", code));
            }
            Some(region.to_uppercase())
        }
        None => None,
    };
    Ok(Locale { language, region })
}

/// Validate if a language code is a valid ISO 639-1 or ISO 639-2 code, with an optional region
pub fn validate_language_code(code: &str) -> Result<LanguageCodeType> {
    let locale = split_locale(code)?;
    let language = locale.language.as_str();

    match language.len() {
        2 if Language::from_639_1(language).is_some() => Ok(LanguageCodeType::Part1),
        3 if Language::from_639_3(language).is_some() => Ok(LanguageCodeType::Part2T),
        3 if part2b_to_part2t(language).is_some() => Ok(LanguageCodeType::Part2B),
        _ => Err(anyhow!("Invalid language code: {}", code)),
    }
}

/// Normalize a language code to ISO 639-2/T (3-letter) format; the region is dropped
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let locale = split_locale(code)?;
    let language = locale.language.as_str();

    match language.len() {
        2 => {
            if let Some(lang) = Language::from_639_1(language) {
                return Ok(lang.to_639_3().to_string());
            }
        }
        3 => {
            if Language::from_639_3(language).is_some() {
                return Ok(language.to_string());
            }
            if let Some(part2t) = part2b_to_part2t(language) {
                return Ok(part2t.to_string());
            }
        }
        _ => {}
    }

    Err(anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Normalize a language code to ISO 639-1 (2-letter) format if possible
/// Falls back to ISO 639-2/T if no ISO 639-1 code exists
pub fn normalize_to_part1_or_part2t(code: &str) -> Result<String> {
    let part2t = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&part2t)
        .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))?;

    Ok(lang
        .to_639_1()
        .map(str::to_string)
        .unwrap_or(part2t))
}

/// Gettext locale form of a code (`pt-br` → `pt_BR`), used in headers and file names
pub fn to_po_locale(code: &str) -> Result<String> {
    validate_language_code(code)?;
    let locale = split_locale(code)?;
    Ok(match locale.region {
        Some(region) => format!("{}_{}", locale.language, region),
        None => locale.language,
    })
}

/// Check if two language codes match (represent the same language, ignoring region)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the language name from a code; a region is appended in parentheses
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(match split_locale(code)?.region {
        Some(region) => format!("{} ({})", lang.to_name(), region),
        None => lang.to_name().to_string(),
    })
}
