/*!
 * Tests for the PO codec and the catalog store
 */

use transhub::catalog::store::write_atomic;
use transhub::catalog::{ApplyOutcome, Catalog, CatalogEntry, CatalogStore, Header, entry_id, po};
use transhub::errors::CatalogError;

use crate::common::{create_temp_dir, create_test_file, pot_text, read_catalog, template};

const CATALOG: &str = r#"msgid ""
msgstr ""
"Language: de\n"
"Content-Type: text/plain; charset=UTF-8\n"

#. Toolbar button
#: ui/toolbar.py:3
msgid "Zoom in"
msgstr "Vergrößern"

#: ui/toolbar.py:4
#, python-format
msgid "%(count)s pages"
msgstr "%(count)s Seiten"

msgid "Tab\there"
msgstr "Tab\thier"

#~ msgid "Legacy"
#~ msgstr "Veraltet"
"#;

#[test]
fn test_roundTrip_shouldKeepEntriesAndOrder() {
    let parsed = po::parse(CATALOG).unwrap();
    let reparsed = po::parse(&po::serialize(&parsed)).unwrap();

    assert_eq!(parsed, reparsed);
    let keys: Vec<&str> = reparsed.keys().collect();
    assert_eq!(keys, vec!["Zoom in", "%(count)s pages", "Tab\there", "Legacy"]);
    assert_eq!(reparsed.get("Tab\there").unwrap().translation, "Tab\thier");
}

#[test]
fn test_serialize_multilineValue_shouldSplitOnNewlines() {
    let catalog = Catalog::from_entries(
        Header::default(),
        vec![CatalogEntry::new("Line one\nLine two").with_translation("Zeile eins\nZeile zwei")],
    );

    let text = po::serialize(&catalog);

    assert!(text.contains("msgid \"\"\n\"Line one\\n\"\n\"Line two\"\n"));
    assert!(text.contains("msgstr \"\"\n\"Zeile eins\\n\"\n\"Zeile zwei\"\n"));
}

#[test]
fn test_parse_template_shouldHaveEveryEntryPending() {
    let catalog = po::parse(&pot_text(&["Open", "Close \"now\""])).unwrap();

    assert_eq!(catalog.pending().count(), 2);
    assert!(catalog.get("Close \"now\"").is_some());
}

#[test]
fn test_merge_existingFile_shouldKeepKeysStable() {
    let existing = po::parse(CATALOG).unwrap();
    let merged = CatalogStore::merge(&template(&["%(count)s pages", "Zoom in", "Zoom out"]), &existing);

    let keys: Vec<&str> = merged.keys().collect();
    assert_eq!(keys, vec!["%(count)s pages", "Zoom in", "Zoom out", "Tab\there", "Legacy"]);
    assert_eq!(merged.header.get("Language"), Some("de"));
    assert_eq!(merged.get("Zoom in").unwrap().translation, "Vergrößern");
    assert!(merged.get("Tab\there").unwrap().obsolete);
    assert!(merged.get("Legacy").unwrap().obsolete);
    assert_eq!(merged.obsolete_count(), 2);
}

#[test]
fn test_merge_repeated_shouldBeIdempotent() {
    let existing = po::parse(CATALOG).unwrap();
    let tpl = template(&["Zoom in", "New"]);

    let once = CatalogStore::merge(&tpl, &existing);
    let twice = CatalogStore::merge(&tpl, &once);

    assert_eq!(po::serialize(&once), po::serialize(&twice));
}

#[test]
fn test_apply_shouldMirrorKeyWhitespace() {
    let mut store = CatalogStore::new("unused.po", template(&["  Indented\n"]));

    store.apply("  Indented\n", "Eingerückt").unwrap();

    assert_eq!(store.catalog().get("  Indented\n").unwrap().translation, "  Eingerückt\n");
}

#[test]
fn test_apply_obsoleteEntry_shouldBeUnknown() {
    let mut store = CatalogStore::new("unused.po", po::parse(CATALOG).unwrap());

    let result = store.apply("Legacy", "Alt");

    assert!(matches!(result, Err(CatalogError::UnknownKey(key)) if key == "Legacy"));
}

#[test]
fn test_apply_sameKeyTwice_shouldKeepFirst() {
    let mut store = CatalogStore::new("unused.po", template(&["Save"]));

    assert_eq!(store.apply("Save", "Speichern").unwrap(), ApplyOutcome::Applied);
    assert_eq!(store.apply("Save", "Sichern").unwrap(), ApplyOutcome::AlreadyApplied);
    assert_eq!(store.applied_count(), 1);
    assert_eq!(store.catalog().get("Save").unwrap().translation, "Speichern");
}

#[test]
fn test_open_missingFile_shouldStartEmpty() {
    let dir = create_temp_dir().unwrap();
    let store = CatalogStore::open(dir.path().join("fr.po")).unwrap();
    assert!(store.catalog().is_empty());
}

#[test]
fn test_persist_shouldStampLanguageAndRoundTrip() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(dir.path(), "de.po", CATALOG).unwrap();

    let mut store = CatalogStore::open(&path).unwrap().with_language("de_AT");
    store.persist().unwrap();

    let saved = read_catalog(&path);
    assert_eq!(saved.header.get("Language"), Some("de_AT"));
    assert!(saved.header.get("PO-Revision-Date").is_some());
    assert_eq!(saved.entries(), po::parse(CATALOG).unwrap().entries());
}

#[test]
fn test_writeAtomic_shouldReplaceWithoutLeftovers() {
    let dir = create_temp_dir().unwrap();
    let path = dir.path().join("nested/out.po");

    write_atomic(&path, b"first").unwrap();
    write_atomic(&path, b"second").unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
}

const CONTEXTS: &str = r#"msgctxt "menu"
msgid "Open"
msgstr "Abrir"

msgctxt "state"
msgid "Open"
msgstr ""

msgid "Open"
msgstr "Abrir"
"#;

#[test]
fn test_roundTrip_sameMsgidInTwoContexts_shouldKeepBoth() {
    let parsed = po::parse(CONTEXTS).unwrap();

    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed.get(&entry_id(Some("menu"), "Open")).unwrap().translation, "Abrir");
    assert!(parsed.get(&entry_id(Some("state"), "Open")).unwrap().translation.is_empty());
    assert_eq!(parsed.get("Open").unwrap().msgctxt, None);

    let text = po::serialize(&parsed);
    assert!(text.contains("msgctxt \"menu\""));
    assert!(text.contains("msgctxt \"state\""));
    assert_eq!(po::parse(&text).unwrap(), parsed);
}

#[test]
fn test_apply_contextEntry_shouldOnlyTouchThatContext() {
    let tpl = Catalog::from_entries(
        Header::default(),
        vec![
            CatalogEntry::new("Open").with_msgctxt("menu"),
            CatalogEntry::new("Open").with_msgctxt("state"),
        ],
    );
    let mut store = CatalogStore::new("unused.po", po::parse(CONTEXTS).unwrap());
    store.merge_template(&tpl);

    let pending: Vec<String> = store.extract_pending().iter().map(|e| e.id().into_owned()).collect();
    assert_eq!(pending, vec![entry_id(Some("state"), "Open").into_owned()]);

    store.apply(&pending[0], "Aberto").unwrap();

    let catalog = store.catalog();
    assert_eq!(catalog.get(&entry_id(Some("state"), "Open")).unwrap().translation, "Aberto");
    assert_eq!(catalog.get(&entry_id(Some("menu"), "Open")).unwrap().translation, "Abrir");
    assert!(catalog.get("Open").unwrap().obsolete);
}
