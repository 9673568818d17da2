//! Runtime localization engine.
//!
//! Given a requested locale and a textual domain, lingo locates, decodes,
//! merges, and caches gettext-style message catalogs, then answers plain,
//! contextual, and pluralized message lookups against the result. Catalogs
//! that are partial, missing, or malformed degrade to echoing the source
//! text; nothing above [`catalog::lookup`] ever observes an error.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod locale;
pub mod mo;
pub mod plural;
pub mod resolver;

pub use cache::{CacheEntry, CatalogCache};
pub use catalog::{lookup, Catalog, LocaleContainer, CONTEXT_SEPARATOR, LC_MESSAGES};
pub use config::{read_engine_toml, CatalogFormat, EngineConfig};
pub use locale::{from_environment, negotiate, LocaleIdentifier, NO_LOCALE};
pub use plural::PluralRule;
pub use resolver::{CatalogSource, Engine};

#[derive(Debug)]
pub enum LingoError {
    Io(std::io::Error),
    Config(String),
    Runtime(String),
}

impl std::fmt::Display for LingoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LingoError::Io(err) => write!(f, "IO error: {err}"),
            LingoError::Config(message) => write!(f, "config error: {message}"),
            LingoError::Runtime(message) => write!(f, "runtime error: {message}"),
        }
    }
}

impl std::error::Error for LingoError {}

impl From<std::io::Error> for LingoError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
