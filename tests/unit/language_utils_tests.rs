/*!
 * Tests for language code utilities
 */

use transhub::language_utils::{
    get_language_name, language_codes_match, normalize_to_part1_or_part2t, normalize_to_part2t, split_locale,
    to_po_locale, validate_language_code,
};

#[test]
fn test_splitLocale_shouldSeparateRegion() {
    let locale = split_locale(" ZH-tw ").unwrap();
    assert_eq!(locale.language, "zh");
    assert_eq!(locale.region.as_deref(), Some("TW"));
    assert!(split_locale("zh_Hant").is_err());

    let plain = split_locale("de").unwrap();
    assert_eq!(plain.language, "de");
    assert!(plain.region.is_none());
}

#[test]
fn test_normalize_shouldMapBetweenCodeForms() {
    assert_eq!(normalize_to_part2t("fr").unwrap(), "fra");
    assert_eq!(normalize_to_part2t("fre").unwrap(), "fra");
    assert_eq!(normalize_to_part1_or_part2t("fra").unwrap(), "fr");
}

#[test]
fn test_toPoLocale_shouldMatchGettextFileNames() {
    assert_eq!(to_po_locale("es").unwrap(), "es");
    assert_eq!(to_po_locale("pt-BR").unwrap(), "pt_BR");
    assert_eq!(to_po_locale("zh_tw").unwrap(), "zh_TW");
    assert!(to_po_locale("klingon").is_err());
}

#[test]
fn test_languageHelpers_shouldAgreeOnRegionalCodes() {
    assert!(validate_language_code("en-GB").is_ok());
    assert!(language_codes_match("en-GB", "eng"));
    assert_eq!(get_language_name("deu").unwrap(), "German");
}
