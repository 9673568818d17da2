use std::collections::HashMap;

use serde::Deserialize;

use crate::plural::PluralRule;

/// Separator between a message context and its msgid in entry keys.
pub const CONTEXT_SEPARATOR: char = '\u{4}';

/// The catalog category level inside a [`LocaleContainer`].
pub const LC_MESSAGES: &str = "LC_MESSAGES";

/// One decoded message catalog.
///
/// Entry keys are the msgid, or `msgctxt \u{4} msgid` for contextual
/// messages; the empty key holds the header block. Form 0 is the singular,
/// higher indices the target-language plural forms. Catalogs are mutable
/// only while being built and merged; once published to the cache they are
/// shared immutably.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub major_version: u32,
    pub minor_version: u32,
    pub plural_rule: PluralRule,
    pub entries: HashMap<String, Vec<String>>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Case-insensitive lookup in the header block (the `""` entry).
    pub fn header(&self, name: &str) -> Option<String> {
        let forms = self.entries.get("")?;
        header_value(forms.first()?, name)
    }

    /// Compile the `Plural-Forms` header into this catalog's rule. Absent or
    /// malformed declarations leave the default rule in place.
    pub fn compile_plural_rule(&mut self) {
        let header = self.header("Plural-Forms");
        self.plural_rule = PluralRule::compile(header.as_deref());
    }

    /// Superimpose `other` onto this catalog.
    ///
    /// Override direction: entries from `other` win for keys both sides
    /// define; keys unique to either side survive. The resolver merges rows
    /// in increasing-specificity order, so the most specific row ends up on
    /// top. Version markers follow the same direction.
    pub fn merge_from(&mut self, other: Catalog) {
        self.major_version = other.major_version;
        self.minor_version = other.minor_version;
        self.entries.extend(other.entries);
    }

    /// Normalize to the canonical shape: entries with no forms are dropped.
    pub fn normalize(&mut self) {
        self.entries.retain(|_, forms| !forms.is_empty());
    }

    /// Decode the JSON catalog format: an `entries` map whose values are a
    /// single form or a form list, plus optional `headers`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: JsonCatalog = serde_json::from_slice(bytes)?;
        let mut catalog = Catalog::empty();
        for (key, forms) in raw.entries {
            let forms = match forms {
                JsonForms::One(form) => vec![form],
                JsonForms::Many(forms) => forms,
            };
            catalog.entries.insert(key, forms);
        }
        if !raw.headers.is_empty() {
            let mut names: Vec<&String> = raw.headers.keys().collect();
            names.sort();
            let mut block = String::new();
            for name in names {
                block.push_str(name);
                block.push_str(": ");
                block.push_str(&raw.headers[name]);
                block.push('\n');
            }
            catalog.entries.insert(String::new(), vec![block]);
        }
        Ok(catalog)
    }
}

#[derive(Debug, Deserialize)]
struct JsonCatalog {
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    entries: HashMap<String, JsonForms>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonForms {
    One(String),
    Many(Vec<String>),
}

/// Find `name: value` in a header block, case-insensitively.
pub(crate) fn header_value(block: &str, name: &str) -> Option<String> {
    for line in block.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case(name) {
            return Some(value.trim().to_string());
        }
    }
    None
}

/// Resolve a translation for `(msgctxt, msgid, msgid_plural, n)`.
///
/// Missing entries echo the source text: the msgid, or the msgid_plural when
/// a plural was requested and the rule picks form 1. When the catalog's
/// declared rule produces an index beyond the supplied forms (malformed
/// headers and partial translations make that possible), the lookup clamps
/// to the only form, or re-derives the index with the default rule. It never
/// indexes out of bounds.
pub fn lookup<'a>(
    catalog: &'a Catalog,
    msgctxt: Option<&str>,
    msgid: &'a str,
    msgid_plural: Option<&'a str>,
    n: u64,
) -> &'a str {
    let forms = match msgctxt {
        Some(ctxt) => catalog
            .entries
            .get(&format!("{ctxt}{CONTEXT_SEPARATOR}{msgid}")),
        None => catalog.entries.get(msgid),
    };

    match forms {
        Some(forms) if !forms.is_empty() => {
            if msgid_plural.is_none() {
                return &forms[0];
            }
            let mut index = catalog.plural_rule.index(n);
            if index >= forms.len() {
                index = if forms.len() == 1 {
                    0
                } else {
                    PluralRule::Germanic.index(n)
                };
            }
            &forms[index]
        }
        _ => match msgid_plural {
            Some(plural) if catalog.plural_rule.index(n) == 1 => plural,
            _ => msgid,
        },
    }
}

/// Pre-built in-memory catalog source, consumed in place of transport and
/// decoding: `locale -> "LC_MESSAGES" -> domain -> Catalog`.
#[derive(Debug, Clone, Default)]
pub struct LocaleContainer {
    locales: HashMap<String, HashMap<String, HashMap<String, Catalog>>>,
}

impl LocaleContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        locale: impl Into<String>,
        domain: impl Into<String>,
        catalog: Catalog,
    ) {
        self.locales
            .entry(locale.into())
            .or_default()
            .entry(LC_MESSAGES.to_string())
            .or_default()
            .insert(domain.into(), catalog);
    }

    pub fn get(&self, locale: &str, domain: &str) -> Option<&Catalog> {
        self.locales.get(locale)?.get(LC_MESSAGES)?.get(domain)
    }
}
