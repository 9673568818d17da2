use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// The POSIX "no locale" sentinel. Resolution against it never touches the
/// cache or the transport and always yields the empty catalog.
pub const NO_LOCALE: &str = "C";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid locale: {0}")]
pub struct LocaleParseError(pub String);

/// A parsed locale identifier: `language[_REGION][.charset][@modifier]`.
///
/// The separator style of the input (`_` vs `-`) is preserved so that
/// candidate strings re-serialize the way the caller wrote the locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleIdentifier {
    pub tags: Vec<String>,
    pub underscore_separator: bool,
    pub charset: Option<String>,
    pub modifier: Option<String>,
}

fn modifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([A-Za-z]+)$").expect("modifier pattern"))
}

fn charset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.([0-9A-Za-z-]+)$").expect("charset pattern"))
}

impl LocaleIdentifier {
    /// Parse a raw locale string.
    ///
    /// The modifier suffix is stripped before the charset suffix since it is
    /// rightmost in the grammar. The remaining tag string must be one or two
    /// alphanumeric tags joined by the detected separator; anything else is
    /// rejected. The language tag is lowercased and the region tag uppercased.
    pub fn parse(raw: &str) -> Result<Self, LocaleParseError> {
        let mut rest = raw;

        let modifier = modifier_re().captures(rest).map(|caps| {
            let text = caps[1].to_string();
            rest = &rest[..rest.len() - caps[0].len()];
            text
        });
        let charset = charset_re().captures(rest).map(|caps| {
            let text = caps[1].to_string();
            rest = &rest[..rest.len() - caps[0].len()];
            text
        });

        let underscore_separator = rest.contains('_');
        let separator = if underscore_separator { '_' } else { '-' };

        let tags: Vec<String> = rest.split(separator).map(str::to_string).collect();
        if tags.is_empty() || tags.len() > 2 {
            return Err(LocaleParseError(raw.to_string()));
        }
        if !tags
            .iter()
            .all(|tag| !tag.is_empty() && tag.chars().all(|ch| ch.is_ascii_alphanumeric()))
        {
            return Err(LocaleParseError(raw.to_string()));
        }

        let tags = tags
            .iter()
            .enumerate()
            .map(|(index, tag)| {
                if index == 0 {
                    tag.to_lowercase()
                } else {
                    tag.to_uppercase()
                }
            })
            .collect();

        Ok(Self {
            tags,
            underscore_separator,
            charset,
            modifier,
        })
    }

    fn separator(&self) -> char {
        if self.underscore_separator {
            '_'
        } else {
            '-'
        }
    }

    /// Expand the identifier into fallback candidate rows.
    ///
    /// Row `i` covers the first `i + 1` tags; within a row, candidates run
    /// from most charset-specific to bare: charset as given, charset
    /// uppercased when that differs, then no charset, each with the modifier
    /// suffix re-attached. Later rows are more specific and must win when
    /// row results are merged. With `region_fallback` off, only the
    /// full-length row is produced.
    pub fn explode(&self, region_fallback: bool) -> Vec<Vec<String>> {
        let separator = self.separator().to_string();
        let modifier = self
            .modifier
            .as_deref()
            .map(|text| format!("@{text}"))
            .unwrap_or_default();

        let prefix_lengths: Vec<usize> = if region_fallback {
            (1..=self.tags.len()).collect()
        } else {
            vec![self.tags.len()]
        };

        let mut rows = Vec::with_capacity(prefix_lengths.len());
        for length in prefix_lengths {
            let prefix = self.tags[..length].join(&separator);
            let mut row = Vec::new();
            if let Some(charset) = &self.charset {
                row.push(format!("{prefix}.{charset}{modifier}"));
                let upper = charset.to_uppercase();
                if upper != *charset {
                    row.push(format!("{prefix}.{upper}{modifier}"));
                }
            }
            row.push(format!("{prefix}{modifier}"));
            rows.push(row);
        }
        rows
    }
}

impl fmt::Display for LocaleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tags.join(&self.separator().to_string()))?;
        if let Some(charset) = &self.charset {
            write!(f, ".{charset}")?;
        }
        if let Some(modifier) = &self.modifier {
            write!(f, "@{modifier}")?;
        }
        Ok(())
    }
}

/// Pick one supported locale for a preference-ordered request list.
///
/// An exact tag-sequence match (case- and separator-insensitive) anywhere in
/// the requested list wins before any language-only match is considered;
/// failing both passes, the result is [`NO_LOCALE`]. This selects an
/// identifier only; it performs no loading.
pub fn negotiate(supported: &[&str], requested: &[&str]) -> String {
    let supported_ids: Vec<(usize, LocaleIdentifier)> = supported
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| LocaleIdentifier::parse(raw).ok().map(|id| (index, id)))
        .collect();
    let requested_ids: Vec<LocaleIdentifier> = requested
        .iter()
        .filter_map(|raw| LocaleIdentifier::parse(raw).ok())
        .collect();

    for requested_id in &requested_ids {
        for (index, supported_id) in &supported_ids {
            if supported_id.tags == requested_id.tags {
                return supported[*index].to_string();
            }
        }
    }

    for (index, supported_id) in &supported_ids {
        if requested_ids
            .iter()
            .any(|requested_id| requested_id.tags[0] == supported_id.tags[0])
        {
            return supported[*index].to_string();
        }
    }

    NO_LOCALE.to_string()
}

/// Read the process locale from the environment.
///
/// Precedence: `LANGUAGE` (first entry of its colon list), `LC_ALL`,
/// `LC_MESSAGES`, `LANG`. Empty values are skipped; `C` and `POSIX` map to
/// the sentinel.
pub fn from_environment() -> String {
    for name in ["LANGUAGE", "LC_ALL", "LC_MESSAGES", "LANG"] {
        let Ok(value) = std::env::var(name) else {
            continue;
        };
        let value = value.split(':').next().unwrap_or("").trim();
        if value.is_empty() {
            continue;
        }
        if value == "C" || value == "POSIX" {
            return NO_LOCALE.to_string();
        }
        return value.to_string();
    }
    NO_LOCALE.to_string()
}
