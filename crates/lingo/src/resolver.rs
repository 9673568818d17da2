//! Catalog resolution: candidate expansion, concurrent per-row loading,
//! merging, plural-rule assignment, and cache population.
//!
//! The engine owns its tokio runtime, driven by a background thread, and
//! exposes a synchronous facade over the async resolution path. Resolution
//! never fails outward: every internal error collapses to an empty catalog
//! with the default plural rule, which is cached so failed resolutions are
//! not retried.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use lingo_transport::{transport_for_base, Transport};

use crate::cache::{CacheEntry, CatalogCache};
use crate::catalog::{lookup, Catalog, LocaleContainer, LC_MESSAGES};
use crate::config::{CatalogFormat, EngineConfig};
use crate::locale::{negotiate, LocaleIdentifier, NO_LOCALE};
use crate::mo;
use crate::LingoError;

#[cfg(test)]
mod tests;

/// Where catalogs come from: a transport base (directory or URL prefix), or
/// pre-built in-memory containers that bypass transport and decoding.
#[derive(Debug, Clone)]
pub enum CatalogSource {
    Base(String),
    Container(Arc<LocaleContainer>),
}

#[derive(Clone)]
struct ResolverContext {
    cache: Arc<CatalogCache>,
    transport: Arc<dyn Transport>,
    region_fallback: bool,
}

/// The localization engine: cache, transport, registered textdomains, and
/// the active locale, behind one owned instance.
pub struct Engine {
    runtime: Arc<Runtime>,
    handle: Handle,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    join_handle: Mutex<Option<thread::JoinHandle<()>>>,
    ctx: ResolverContext,
    config: EngineConfig,
    default_source: CatalogSource,
    domains: Mutex<BTreeSet<String>>,
    textdomain: Mutex<String>,
    locale: Mutex<String>,
}

impl Engine {
    /// Build an engine, selecting the transport from the configured base's
    /// URL scheme.
    pub fn new(config: EngineConfig) -> Result<Self, LingoError> {
        let (transport, base) = transport_for_base(&config.base);
        Self::build(config, Arc::from(transport), base)
    }

    /// Build an engine with a caller-supplied transport. The configured base
    /// is passed to the transport as written.
    pub fn with_transport(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, LingoError> {
        let base = config.base.clone();
        Self::build(config, transport, base)
    }

    fn build(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        base: String,
    ) -> Result<Self, LingoError> {
        let runtime = Builder::new_current_thread()
            .build()
            .map_err(|err| LingoError::Runtime(err.to_string()))?;
        let runtime = Arc::new(runtime);
        let handle = runtime.handle().clone();

        // Park the runtime on a driver thread so spawned work keeps running
        // after a synchronous resolve call returns.
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let driver = runtime.clone();
        let join_handle = thread::spawn(move || {
            driver.block_on(async {
                let _ = shutdown_rx.await;
            });
        });

        let ctx = ResolverContext {
            cache: Arc::new(CatalogCache::new()),
            transport,
            region_fallback: config.region_fallback,
        };
        let mut domains = BTreeSet::new();
        domains.insert(config.domain.clone());

        Ok(Self {
            runtime,
            handle,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            join_handle: Mutex::new(Some(join_handle)),
            ctx,
            default_source: CatalogSource::Base(base),
            textdomain: Mutex::new(config.domain.clone()),
            locale: Mutex::new(NO_LOCALE.to_string()),
            domains: Mutex::new(domains),
            config,
        })
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.ctx.cache
    }

    pub fn runtime_handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Register a textdomain so locale changes and cross-domain refreshes
    /// cover it.
    pub fn add_domain(&self, domain: &str) {
        self.domains
            .lock()
            .expect("domain registry poisoned")
            .insert(domain.to_string());
    }

    pub fn domains(&self) -> Vec<String> {
        self.domains
            .lock()
            .expect("domain registry poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Switch the lookup wrappers to another registered-or-new domain.
    pub fn set_textdomain(&self, domain: &str) {
        self.add_domain(domain);
        *self.textdomain.lock().expect("textdomain poisoned") = domain.to_string();
    }

    pub fn textdomain(&self) -> String {
        self.textdomain.lock().expect("textdomain poisoned").clone()
    }

    /// Negotiate the configured supported locales against a requested list.
    pub fn select_locale(&self, requested: &[&str]) -> String {
        let supported: Vec<&str> = self.config.locales.iter().map(String::as_str).collect();
        negotiate(&supported, requested)
    }

    /// Set the active locale and refresh every registered domain for it in
    /// the background.
    pub fn set_locale(&self, locale_key: &str) {
        *self.locale.lock().expect("locale poisoned") = locale_key.to_string();
        if locale_key == NO_LOCALE {
            return;
        }
        for domain in self.domains() {
            self.spawn_resolution(domain, self.default_source.clone(), self.config.format, locale_key);
        }
    }

    pub fn locale(&self) -> String {
        self.locale.lock().expect("locale poisoned").clone()
    }

    /// Resolve one domain's catalog for a locale.
    ///
    /// Every other registered domain is resolved concurrently for the same
    /// locale (a locale change refreshes all active domains together), but
    /// failures are independent and only the requested domain's catalog is
    /// returned.
    pub fn resolve(
        &self,
        domain: &str,
        source: &CatalogSource,
        format: CatalogFormat,
        locale_key: &str,
    ) -> Arc<Catalog> {
        if locale_key != NO_LOCALE {
            for sibling in self.domains() {
                if sibling != domain {
                    self.spawn_resolution(sibling, source.clone(), format, locale_key);
                }
            }
        }
        self.handle.block_on(resolve_catalog(
            self.ctx.clone(),
            domain.to_string(),
            source.clone(),
            format,
            locale_key.to_string(),
        ))
    }

    fn spawn_resolution(
        &self,
        domain: String,
        source: CatalogSource,
        format: CatalogFormat,
        locale_key: &str,
    ) {
        let ctx = self.ctx.clone();
        let locale_key = locale_key.to_string();
        self.handle.spawn(async move {
            let _ = resolve_catalog(ctx, domain, source, format, locale_key).await;
        });
    }

    fn active_catalog(&self) -> Arc<Catalog> {
        let domain = self.textdomain();
        let locale = self.locale();
        self.resolve(&domain, &self.default_source, self.config.format, &locale)
    }

    /// Translate a plain message.
    pub fn gettext(&self, msgid: &str) -> String {
        lookup(&self.active_catalog(), None, msgid, None, 1).to_string()
    }

    /// Translate a counted message.
    pub fn ngettext(&self, msgid: &str, msgid_plural: &str, n: u64) -> String {
        lookup(&self.active_catalog(), None, msgid, Some(msgid_plural), n).to_string()
    }

    /// Translate a message disambiguated by context.
    pub fn pgettext(&self, msgctxt: &str, msgid: &str) -> String {
        lookup(&self.active_catalog(), Some(msgctxt), msgid, None, 1).to_string()
    }

    /// Translate a counted message disambiguated by context.
    pub fn npgettext(&self, msgctxt: &str, msgid: &str, msgid_plural: &str, n: u64) -> String {
        lookup(&self.active_catalog(), Some(msgctxt), msgid, Some(msgid_plural), n).to_string()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.shutdown_tx.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(());
            }
        }
        if let Ok(mut guard) = self.join_handle.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}

async fn resolve_catalog(
    ctx: ResolverContext,
    domain: String,
    source: CatalogSource,
    format: CatalogFormat,
    locale_key: String,
) -> Arc<Catalog> {
    if locale_key == NO_LOCALE {
        return Arc::new(Catalog::empty());
    }

    match ctx.cache.lookup(&locale_key, &domain) {
        Some(CacheEntry::Ready(catalog)) => return catalog,
        Some(CacheEntry::Pending(waiter)) => return await_pending(waiter).await,
        None => {}
    }

    let (tx, rx) = watch::channel(None);
    ctx.cache.store_pending(&locale_key, &domain, rx);

    let catalog = load_catalog(&ctx, &domain, &source, format, &locale_key).await;
    let shared = ctx.cache.store_ready(&locale_key, &domain, catalog);
    let _ = tx.send(Some(shared.clone()));
    shared
}

async fn await_pending(mut waiter: watch::Receiver<Option<Arc<Catalog>>>) -> Arc<Catalog> {
    loop {
        let published = waiter.borrow().clone();
        if let Some(catalog) = published {
            return catalog;
        }
        if waiter.changed().await.is_err() {
            // The loader went away without publishing; nothing to wait for.
            return Arc::new(Catalog::empty());
        }
    }
}

enum RowTask {
    Immediate(Option<Catalog>),
    Spawned(JoinHandle<Option<Catalog>>),
}

async fn load_catalog(
    ctx: &ResolverContext,
    domain: &str,
    source: &CatalogSource,
    format: CatalogFormat,
    locale_key: &str,
) -> Catalog {
    let id = match LocaleIdentifier::parse(locale_key) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(%err, domain, "unusable locale, resolving to empty catalog");
            return Catalog::empty();
        }
    };

    // Rows are independent until the merge, so each one loads concurrently;
    // within a row, candidates are tried strictly in specificity order.
    let rows = id.explode(ctx.region_fallback);
    let mut row_tasks = Vec::with_capacity(rows.len());
    for row in rows {
        match source {
            CatalogSource::Container(container) => {
                row_tasks.push(RowTask::Immediate(row_from_container(
                    container, &row, domain,
                )));
            }
            CatalogSource::Base(base) => {
                let transport = ctx.transport.clone();
                let base = base.clone();
                let domain = domain.to_string();
                row_tasks.push(RowTask::Spawned(tokio::task::spawn_blocking(move || {
                    load_row(transport.as_ref(), &base, &row, &domain, format)
                })));
            }
        }
    }

    // Awaiting in row index order re-imposes deterministic merge order no
    // matter how the loads interleave.
    let mut merged = Catalog::empty();
    let mut hit = false;
    for task in row_tasks {
        let row_catalog = match task {
            RowTask::Immediate(result) => result,
            RowTask::Spawned(handle) => handle.await.ok().flatten(),
        };
        if let Some(catalog) = row_catalog {
            merged.merge_from(catalog);
            hit = true;
        }
    }
    if !hit {
        tracing::warn!(domain, locale_key, "no candidate produced a catalog");
    }
    merged.compile_plural_rule();
    merged
}

fn row_from_container(container: &LocaleContainer, row: &[String], domain: &str) -> Option<Catalog> {
    row.iter()
        .find_map(|candidate| container.get(candidate, domain).cloned())
}

fn load_row(
    transport: &dyn Transport,
    base: &str,
    row: &[String],
    domain: &str,
    format: CatalogFormat,
) -> Option<Catalog> {
    for candidate in row {
        let path = catalog_path(base, candidate, domain, format);
        let bytes = match transport.fetch(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!(%path, %err, "candidate fetch failed");
                continue;
            }
        };
        match decode_catalog(&bytes, format) {
            Ok(catalog) => return Some(catalog),
            Err(err) => {
                tracing::debug!(%path, %err, "candidate decode failed");
            }
        }
    }
    None
}

fn catalog_path(base: &str, candidate: &str, domain: &str, format: CatalogFormat) -> String {
    let extension = format.extension();
    if base.is_empty() {
        format!("{candidate}/{LC_MESSAGES}/{domain}.{extension}")
    } else {
        format!("{base}/{candidate}/{LC_MESSAGES}/{domain}.{extension}")
    }
}

fn decode_catalog(bytes: &[u8], format: CatalogFormat) -> Result<Catalog, LingoError> {
    match format {
        CatalogFormat::Mo => {
            mo::decode(bytes).map_err(|err| LingoError::Runtime(err.to_string()))
        }
        CatalogFormat::Json => {
            Catalog::from_json(bytes).map_err(|err| LingoError::Runtime(err.to_string()))
        }
    }
}
