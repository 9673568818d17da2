use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lingo_transport::TransportError;

use super::*;

struct MapTransport {
    files: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MapTransport {
    fn new(files: Vec<(&str, Vec<u8>)>) -> Arc<Self> {
        Arc::new(Self {
            files: files
                .into_iter()
                .map(|(path, bytes)| (path.to_string(), bytes))
                .collect(),
            fetches: AtomicUsize::new(0),
        })
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Transport for MapTransport {
    fn fetch(&self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.files.get(path).cloned().ok_or_else(|| TransportError {
            message: format!("missing {path}"),
        })
    }
}

fn mo_catalog(header: Option<&str>, entries: &[(&str, &[&str])]) -> Vec<u8> {
    let mut catalog = Catalog::empty();
    if let Some(header) = header {
        catalog
            .entries
            .insert(String::new(), vec![header.to_string()]);
    }
    for (key, forms) in entries {
        catalog.entries.insert(
            key.to_string(),
            forms.iter().map(|form| form.to_string()).collect(),
        );
    }
    mo::encode(&catalog)
}

fn engine_with(files: Vec<(&str, Vec<u8>)>) -> (Engine, Arc<MapTransport>) {
    let transport = MapTransport::new(files);
    let engine = Engine::with_transport(EngineConfig::default(), transport.clone()).unwrap();
    (engine, transport)
}

fn base() -> CatalogSource {
    CatalogSource::Base("locale".to_string())
}

#[test]
fn merge_prefers_the_more_specific_row() {
    let (engine, _) = engine_with(vec![
        (
            "locale/de/LC_MESSAGES/messages.mo",
            mo_catalog(None, &[("View", &["Anzeigen"]), ("Folder", &["Ordner"])]),
        ),
        (
            "locale/de_DE/LC_MESSAGES/messages.mo",
            mo_catalog(None, &[("View", &["Sicht"])]),
        ),
    ]);

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Mo, "de_DE");
    assert_eq!(catalog.entries["View"], vec!["Sicht"]);
    assert_eq!(catalog.entries["Folder"], vec!["Ordner"]);
}

#[test]
fn candidates_within_a_row_stop_at_the_first_success() {
    let (engine, transport) = engine_with(vec![(
        "locale/de_DE.UTF-8/LC_MESSAGES/messages.mo",
        mo_catalog(None, &[("View", &["Sicht"])]),
    )]);

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Mo, "de_DE.utf-8");
    assert_eq!(catalog.entries["View"], vec!["Sicht"]);
    // Row 0 exhausts de.utf-8, de.UTF-8, de; row 1 misses de_DE.utf-8 and
    // then hits de_DE.UTF-8 without trying the bare de_DE.
    assert_eq!(transport.fetch_count(), 5);
}

#[test]
fn second_resolution_is_served_from_the_cache() {
    let (engine, transport) = engine_with(vec![(
        "locale/de/LC_MESSAGES/messages.mo",
        mo_catalog(None, &[("View", &["Anzeigen"])]),
    )]);

    let first = engine.resolve("messages", &base(), CatalogFormat::Mo, "de");
    let fetched = transport.fetch_count();
    let second = engine.resolve("messages", &base(), CatalogFormat::Mo, "de");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.entries["View"], vec!["Anzeigen"]);
    assert_eq!(transport.fetch_count(), fetched);
}

#[test]
fn total_failure_yields_a_cached_empty_catalog() {
    let (engine, transport) = engine_with(Vec::new());

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Mo, "de_DE");
    assert!(catalog.entries.is_empty());
    assert_eq!(catalog.plural_rule.index(1), 0);
    assert_eq!(catalog.plural_rule.index(2), 1);

    let fetched = transport.fetch_count();
    assert!(fetched > 0);
    engine.resolve("messages", &base(), CatalogFormat::Mo, "de_DE");
    assert_eq!(transport.fetch_count(), fetched, "failures must not be retried");
}

#[test]
fn sentinel_locale_skips_cache_and_transport() {
    let (engine, transport) = engine_with(Vec::new());

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Mo, NO_LOCALE);
    assert!(catalog.entries.is_empty());
    assert_eq!(transport.fetch_count(), 0);
    assert!(engine.cache().is_empty());
}

#[test]
fn unparsable_locale_resolves_empty_and_is_cached() {
    let (engine, transport) = engine_with(Vec::new());

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Mo, "no locale!");
    assert!(catalog.entries.is_empty());
    assert_eq!(transport.fetch_count(), 0);
    assert!(matches!(
        engine.cache().lookup("no locale!", "messages"),
        Some(CacheEntry::Ready(_))
    ));
}

#[test]
fn plural_rule_is_compiled_from_the_merged_header() {
    let (engine, _) = engine_with(vec![(
        "locale/cs/LC_MESSAGES/messages.mo",
        mo_catalog(
            Some("Plural-Forms: nplurals=3; plural=(n==1 ? 0 : n>=2 && n<=4 ? 1 : 2);\n"),
            &[("item", &["kus", "kusy", "kusu"])],
        ),
    )]);

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Mo, "cs");
    assert_eq!(lookup(&catalog, None, "item", Some("items"), 1), "kus");
    assert_eq!(lookup(&catalog, None, "item", Some("items"), 3), "kusy");
    assert_eq!(lookup(&catalog, None, "item", Some("items"), 9), "kusu");
}

#[test]
fn decode_failure_counts_as_a_missed_candidate() {
    let (engine, _) = engine_with(vec![
        (
            "locale/de/LC_MESSAGES/messages.mo",
            mo_catalog(None, &[("View", &["Anzeigen"])]),
        ),
        (
            "locale/de_DE/LC_MESSAGES/messages.mo",
            b"not a catalog".to_vec(),
        ),
    ]);

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Mo, "de_DE");
    assert_eq!(catalog.entries["View"], vec!["Anzeigen"]);
}

#[test]
fn json_catalogs_resolve_like_binary_ones() {
    let (engine, _) = engine_with(vec![(
        "locale/de/LC_MESSAGES/messages.json",
        br#"{"entries": {"View": "Anzeigen"}}"#.to_vec(),
    )]);

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Json, "de");
    assert_eq!(catalog.entries["View"], vec!["Anzeigen"]);
}

#[test]
fn container_source_bypasses_the_transport() {
    let (engine, transport) = engine_with(Vec::new());

    let mut container = LocaleContainer::new();
    let mut catalog = Catalog::empty();
    catalog
        .entries
        .insert("View".to_string(), vec!["Anzeigen".to_string()]);
    container.insert("de", "messages", catalog);
    let source = CatalogSource::Container(Arc::new(container));

    // The container only carries "de"; the de_DE row contributes nothing.
    let resolved = engine.resolve("messages", &source, CatalogFormat::Mo, "de_DE");
    assert_eq!(resolved.entries["View"], vec!["Anzeigen"]);
    assert_eq!(transport.fetch_count(), 0);
}

#[test]
fn pending_cache_entries_are_awaited() {
    let (engine, transport) = engine_with(Vec::new());

    let (tx, rx) = watch::channel(None);
    engine.cache().store_pending("de", "messages", rx);

    let cache = Arc::new(CatalogCache::new());
    let publisher = {
        let cache = cache.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut catalog = Catalog::empty();
            catalog
                .entries
                .insert("View".to_string(), vec!["Anzeigen".to_string()]);
            let shared = cache.store_ready("de", "messages", catalog);
            let _ = tx.send(Some(shared));
        })
    };

    let resolved = engine.resolve("messages", &base(), CatalogFormat::Mo, "de");
    publisher.join().unwrap();

    assert_eq!(resolved.entries["View"], vec!["Anzeigen"]);
    assert_eq!(transport.fetch_count(), 0, "the waiter must not load again");
}

#[test]
fn dropped_loader_resolves_waiters_to_empty() {
    let (engine, _) = engine_with(Vec::new());

    let (tx, rx) = watch::channel(None);
    engine.cache().store_pending("de", "messages", rx);
    drop(tx);

    let resolved = engine.resolve("messages", &base(), CatalogFormat::Mo, "de");
    assert!(resolved.entries.is_empty());
}

#[test]
fn concurrent_first_resolutions_both_complete() {
    let (engine, _) = engine_with(vec![(
        "locale/de/LC_MESSAGES/messages.mo",
        mo_catalog(None, &[("View", &["Anzeigen"])]),
    )]);

    let results = thread::scope(|scope| {
        let first = scope.spawn(|| engine.resolve("messages", &base(), CatalogFormat::Mo, "de"));
        let second = scope.spawn(|| engine.resolve("messages", &base(), CatalogFormat::Mo, "de"));
        (first.join().unwrap(), second.join().unwrap())
    });

    assert_eq!(results.0.entries, results.1.entries);
    assert_eq!(results.0.entries["View"], vec!["Anzeigen"]);
}

#[test]
fn resolving_one_domain_refreshes_the_others() {
    let (engine, _) = engine_with(vec![
        (
            "locale/de/LC_MESSAGES/messages.mo",
            mo_catalog(None, &[("View", &["Anzeigen"])]),
        ),
        (
            "locale/de/LC_MESSAGES/errors.mo",
            mo_catalog(None, &[("Failure", &["Fehler"])]),
        ),
    ]);
    engine.add_domain("errors");

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Mo, "de");
    assert_eq!(catalog.entries["View"], vec!["Anzeigen"]);

    let sibling = wait_for_ready(&engine, "de", "errors");
    assert_eq!(sibling.entries["Failure"], vec!["Fehler"]);
}

#[test]
fn sibling_failures_do_not_affect_the_requested_domain() {
    let (engine, _) = engine_with(vec![(
        "locale/de/LC_MESSAGES/messages.mo",
        mo_catalog(None, &[("View", &["Anzeigen"])]),
    )]);
    engine.add_domain("errors");

    let catalog = engine.resolve("messages", &base(), CatalogFormat::Mo, "de");
    assert_eq!(catalog.entries["View"], vec!["Anzeigen"]);

    let sibling = wait_for_ready(&engine, "de", "errors");
    assert!(sibling.entries.is_empty());
}

#[test]
fn set_locale_refreshes_every_registered_domain() {
    let (engine, _) = engine_with(vec![
        (
            "locale/fi/LC_MESSAGES/messages.mo",
            mo_catalog(None, &[("View", &["Näytä"])]),
        ),
        (
            "locale/fi/LC_MESSAGES/errors.mo",
            mo_catalog(None, &[("Failure", &["Virhe"])]),
        ),
    ]);
    engine.add_domain("errors");

    engine.set_locale("fi");
    assert_eq!(engine.locale(), "fi");

    assert_eq!(
        wait_for_ready(&engine, "fi", "messages").entries["View"],
        vec!["Näytä"]
    );
    assert_eq!(
        wait_for_ready(&engine, "fi", "errors").entries["Failure"],
        vec!["Virhe"]
    );
}

#[test]
fn lookup_wrappers_use_the_active_locale_and_domain() {
    let (engine, _) = engine_with(vec![(
        "locale/de/LC_MESSAGES/messages.mo",
        mo_catalog(
            Some("Plural-Forms: nplurals=2; plural=(n != 1);\n"),
            &[
                ("Yes", &["Ja"]),
                ("one year", &["ein Jahr", "{n} Jahre"]),
                ("menu\u{4}Open", &["Öffnen"]),
            ],
        ),
    )]);

    engine.set_locale("de");
    assert_eq!(engine.gettext("Yes"), "Ja");
    assert_eq!(engine.gettext("missing"), "missing");
    assert_eq!(engine.ngettext("one year", "{n} years", 1), "ein Jahr");
    assert_eq!(engine.ngettext("one year", "{n} years", 4), "{n} Jahre");
    assert_eq!(engine.pgettext("menu", "Open"), "Öffnen");
    assert_eq!(engine.npgettext("menu", "day", "days", 3), "days");
}

#[test]
fn wrappers_echo_source_text_without_a_locale() {
    let (engine, transport) = engine_with(Vec::new());
    assert_eq!(engine.gettext("Yes"), "Yes");
    assert_eq!(engine.ngettext("one", "many", 2), "many");
    assert_eq!(transport.fetch_count(), 0);
}

#[test]
fn textdomain_switch_changes_the_wrapper_domain() {
    let (engine, _) = engine_with(vec![
        (
            "locale/de/LC_MESSAGES/messages.mo",
            mo_catalog(None, &[("Yes", &["Ja"])]),
        ),
        (
            "locale/de/LC_MESSAGES/installer.mo",
            mo_catalog(None, &[("Yes", &["Jawohl"])]),
        ),
    ]);

    engine.set_locale("de");
    assert_eq!(engine.gettext("Yes"), "Ja");

    engine.set_textdomain("installer");
    assert_eq!(engine.textdomain(), "installer");
    assert_eq!(engine.gettext("Yes"), "Jawohl");
}

#[test]
fn select_locale_negotiates_against_configured_locales() {
    let transport = MapTransport::new(Vec::new());
    let config = EngineConfig {
        locales: vec!["fi".to_string(), "de-DE".to_string(), "en-US".to_string()],
        ..EngineConfig::default()
    };
    let engine = Engine::with_transport(config, transport).unwrap();

    assert_eq!(engine.select_locale(&["fr", "de-CH", "en-US"]), "en-US");
    assert_eq!(engine.select_locale(&["de-CH"]), "de-DE");
    assert_eq!(engine.select_locale(&["pt"]), NO_LOCALE);
}

#[test]
fn cache_clear_forces_a_reload() {
    let (engine, transport) = engine_with(vec![(
        "locale/de/LC_MESSAGES/messages.mo",
        mo_catalog(None, &[("View", &["Anzeigen"])]),
    )]);

    engine.resolve("messages", &base(), CatalogFormat::Mo, "de");
    let fetched = transport.fetch_count();

    engine.cache().clear();
    engine.resolve("messages", &base(), CatalogFormat::Mo, "de");
    assert!(transport.fetch_count() > fetched);
}

fn wait_for_ready(engine: &Engine, locale: &str, domain: &str) -> Arc<Catalog> {
    for _ in 0..200 {
        if let Some(CacheEntry::Ready(catalog)) = engine.cache().lookup(locale, domain) {
            return catalog;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("no resolution for ({locale}, {domain}) within two seconds");
}
