//! MO binary catalog decoding and encoding.
//!
//! The layout is the offset-table format produced by catalog compilers:
//! magic (4B), revision (4B, major<<16 | minor), string count (4B),
//! original-table offset (4B), translation-table offset (4B), then
//! `(length, offset)` pairs per table, then string bytes. Either byte order
//! is accepted on decode; the encoder always writes little-endian.

use std::collections::HashMap;

use encoding_rs::{Encoding, UTF_8};

use crate::catalog::{header_value, Catalog};

pub const MAGIC: u32 = 0x9504_12de;
pub const MAGIC_SWAPPED: u32 = 0xde12_0495;

const HEADER_LEN: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoError {
    #[error("invalid magic number {0:#010x}")]
    InvalidMagic(u32),
    #[error("unsupported major revision {0}")]
    UnsupportedRevision(u32),
    #[error("catalog truncated reading {0} at offset {1}")]
    Truncated(&'static str, usize),
}

struct Reader<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn word(&self, what: &'static str, offset: usize) -> Result<u32, MoError> {
        let end = offset
            .checked_add(4)
            .ok_or(MoError::Truncated(what, offset))?;
        let slice = self
            .bytes
            .get(offset..end)
            .ok_or(MoError::Truncated(what, offset))?;
        let word = [slice[0], slice[1], slice[2], slice[3]];
        Ok(if self.big_endian {
            u32::from_be_bytes(word)
        } else {
            u32::from_le_bytes(word)
        })
    }

    fn segment(&self, what: &'static str, offset: u32, len: u32) -> Result<&'a [u8], MoError> {
        let start = offset as usize;
        let end = start
            .checked_add(len as usize)
            .ok_or(MoError::Truncated(what, start))?;
        self.bytes
            .get(start..end)
            .ok_or(MoError::Truncated(what, start))
    }
}

fn decode_text(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Decode a binary catalog.
///
/// Fatal failures are a bad magic number, a nonzero major revision, and
/// out-of-range table or string reads; callers treat any of them as "no
/// catalog for this candidate". Text decoding itself never fails: the
/// charset named by the header entry's `Content-Type` is applied to every
/// entry after the header, with lossy replacement for invalid sequences.
pub fn decode(bytes: &[u8]) -> Result<Catalog, MoError> {
    if bytes.len() < 4 {
        return Err(MoError::Truncated("magic", 0));
    }
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let big_endian = match magic {
        MAGIC => false,
        MAGIC_SWAPPED => true,
        other => return Err(MoError::InvalidMagic(other)),
    };

    let reader = Reader { bytes, big_endian };
    let revision = reader.word("revision", 4)?;
    let major = revision >> 16;
    let minor = revision & 0xffff;
    if major != 0 {
        return Err(MoError::UnsupportedRevision(major));
    }
    let count = reader.word("string count", 8)? as usize;
    let originals = reader.word("original table offset", 12)? as usize;
    let translations = reader.word("translation table offset", 16)? as usize;

    // The header entry may switch the charset for the rest of this pass;
    // the header itself always decodes with the ASCII-safe default.
    let mut encoding = UTF_8;
    let mut entries = HashMap::with_capacity(count);

    for index in 0..count {
        let original_len = reader.word("original length", originals + index * 8)?;
        let original_off = reader.word("original offset", originals + index * 8 + 4)?;
        let translation_len = reader.word("translation length", translations + index * 8)?;
        let translation_off = reader.word("translation offset", translations + index * 8 + 4)?;

        let original = reader.segment("original string", original_off, original_len)?;
        let translation = reader.segment("translation string", translation_off, translation_len)?;

        if index == 0 && original.is_empty() {
            let header = decode_text(UTF_8, translation);
            if let Some(charset) = charset_parameter(&header) {
                if let Some(named) = Encoding::for_label(charset.as_bytes()) {
                    encoding = named;
                }
            }
            entries.insert(String::new(), vec![header]);
            continue;
        }

        // Plural originals carry `msgid NUL msgid_plural`; the lookup key is
        // the singular part. Context keys (`msgctxt \x04 msgid`) arrive
        // already joined by the producer.
        let key_bytes = match original.iter().position(|byte| *byte == 0) {
            Some(nul) => &original[..nul],
            None => original,
        };
        let key = decode_text(encoding, key_bytes);
        let forms = translation
            .split(|byte| *byte == 0)
            .map(|part| decode_text(encoding, part))
            .collect();
        entries.insert(key, forms);
    }

    Ok(Catalog {
        major_version: major,
        minor_version: minor,
        plural_rule: Default::default(),
        entries,
    })
}

fn charset_parameter(header: &str) -> Option<String> {
    let content_type = header_value(header, "content-type")?;
    for parameter in content_type.split(';') {
        let Some((name, value)) = parameter.split_once('=') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("charset") {
            return Some(value.trim().to_string());
        }
    }
    None
}

/// Encode a catalog into the little-endian layout.
///
/// Originals are written in sorted order (the header entry's empty key
/// sorts first). The producer counterpart of [`decode`], used by tests and
/// by embedders that pre-compile catalogs.
pub fn encode(catalog: &Catalog) -> Vec<u8> {
    let mut keys: Vec<&String> = catalog.entries.keys().collect();
    keys.sort();

    let count = keys.len() as u32;
    let originals = HEADER_LEN;
    let translations = originals + count * 8;
    let data_start = translations + count * 8;

    let mut original_table = Vec::with_capacity(keys.len());
    let mut translation_table = Vec::with_capacity(keys.len());
    let mut data: Vec<u8> = Vec::new();

    for key in &keys {
        let bytes = key.as_bytes();
        original_table.push((bytes.len() as u32, data_start + data.len() as u32));
        data.extend_from_slice(bytes);
        data.push(0);
    }
    for key in &keys {
        let joined = catalog.entries[*key].join("\0");
        let bytes = joined.as_bytes();
        translation_table.push((bytes.len() as u32, data_start + data.len() as u32));
        data.extend_from_slice(bytes);
        data.push(0);
    }

    let mut out = Vec::with_capacity(data_start as usize + data.len());
    out.extend_from_slice(&MAGIC.to_le_bytes());
    let revision = (catalog.major_version << 16) | (catalog.minor_version & 0xffff);
    out.extend_from_slice(&revision.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&originals.to_le_bytes());
    out.extend_from_slice(&translations.to_le_bytes());
    for (len, offset) in original_table.iter().chain(translation_table.iter()) {
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
    }
    out.extend_from_slice(&data);
    out
}
