//! Zip archive creation.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{MediaError, MediaResult};

/// One file going into an archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Reduce a stored file name to a flat, safe zip entry name.
///
/// Directory components are dropped, so `../../etc/passwd` becomes `passwd`.
pub fn sanitize_entry_name(name: &str) -> String {
    let base = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Make `name` unique against `taken` by inserting ` (n)` before the extension.
fn dedup_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_lowercase()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

/// Build a deflate-compressed zip archive in memory.
///
/// Entry names are sanitized and deduplicated case-insensitively, keeping input order.
pub fn create_zip(entries: &[ArchiveEntry]) -> MediaResult<Vec<u8>> {
    if entries.is_empty() {
        return Err(MediaError::internal("archive has no entries"));
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(entries.iter().any(|e| e.data.len() as u64 >= u32::MAX as u64));

    let mut taken = HashSet::new();
    for entry in entries {
        let name = dedup_name(&sanitize_entry_name(&entry.name), &mut taken);
        writer.start_file(name, options)?;
        writer.write_all(&entry.data)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Names the entries of `entries` will get inside the archive.
pub fn entry_names(entries: &[ArchiveEntry]) -> Vec<String> {
    let mut taken = HashSet::new();
    entries
        .iter()
        .map(|e| dedup_name(&sanitize_entry_name(&e.name), &mut taken))
        .collect()
}
