use chrono::NaiveDateTime;
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::{
    codegen::is_valid_alias,
    error::PersistenceError,
    models::{ShortLink, TIMESTAMP_FORMAT},
    normalize::normalize,
};

pub const HEADER: [&str; 4] = ["code", "short_url", "original_url", "created_at"];

/// Result of reading the link table. Rows that could not be understood are
/// counted in `skipped` rather than failing the whole load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub links: Vec<ShortLink>,
    pub skipped: usize,
}

#[derive(Serialize)]
struct Row<'a> {
    code: &'a str,
    short_url: &'a str,
    original_url: &'a str,
    created_at: String,
}

impl<'a> From<&'a ShortLink> for Row<'a> {
    fn from(link: &'a ShortLink) -> Self {
        Self {
            code: &link.code,
            short_url: &link.short_url,
            original_url: &link.original_url,
            created_at: link.created_at_display(),
        }
    }
}

// ── Load ───────────────────────────────────────────────────────────────────

/// Read the link table at `path`. A missing file is an empty table.
pub fn load(path: &Path) -> Result<LoadReport, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!("No link table at {}, starting empty", path.display());
            return Ok(LoadReport::default());
        }
        Err(source) => {
            return Err(PersistenceError::Load {
                path: path.to_owned(),
                source,
            });
        }
    };

    let report = parse(&String::from_utf8_lossy(&bytes));
    if report.skipped > 0 {
        tracing::warn!(
            "Skipped {} unreadable row(s) in {}",
            report.skipped,
            path.display()
        );
    }
    Ok(report)
}

/// Parse the table text. The first line is the header and is ignored.
pub fn parse(text: &str) -> LoadReport {
    let lines: Vec<&str> = text.lines().collect();
    let mut report = LoadReport::default();

    let mut idx = 1;
    while idx < lines.len() {
        if lines[idx].trim().is_empty() {
            idx += 1;
            continue;
        }

        let (fields, consumed) = read_record(&lines[idx..]);
        match into_link(&fields) {
            Some(link) => report.links.push(link),
            None => {
                tracing::debug!("Skipping row at line {}: {:?}", idx + 1, fields);
                report.skipped += 1;
            }
        }
        idx += consumed;
    }

    report
}

/// Assemble one logical record starting at `lines[0]`.
///
/// A quoted field may span lines, so the record keeps growing while its
/// quotes are unbalanced. A multi-line record is only accepted when it is
/// well quoted and reads as a complete row; otherwise, or if the quotes
/// never balance, the first line alone is split on raw commas. Returns the
/// fields and how many lines were used.
fn read_record(lines: &[&str]) -> (Vec<String>, usize) {
    let mut record = String::new();
    let mut quotes = 0;

    for (n, line) in lines.iter().enumerate() {
        if n > 0 {
            record.push('\n');
        }
        record.push_str(line);
        quotes += line.matches('"').count();

        if quotes % 2 != 0 {
            continue;
        }
        if n == 0 {
            return (parse_fields(&record).unwrap_or_else(|| raw_split(lines[0])), 1);
        }
        match parse_fields(&record) {
            Some(fields) if is_well_quoted(&record) && into_link(&fields).is_some() => {
                return (fields, n + 1);
            }
            _ => break,
        }
    }

    (raw_split(lines[0]), 1)
}

/// Strict RFC-4180 shape check: quotes open only at the start of a field,
/// close only before a comma or the end, and line breaks appear only inside
/// quotes.
fn is_well_quoted(record: &str) -> bool {
    let mut chars = record.chars().peekable();
    let mut field_start = true;

    while let Some(c) = chars.next() {
        match c {
            '"' if field_start => loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                    }
                    Some('"') => match chars.peek() {
                        None | Some(',') => break,
                        Some(_) => return false,
                    },
                    Some(_) => {}
                    None => return false,
                }
            },
            '"' | '\n' | '\r' => return false,
            ',' => {
                field_start = true;
                continue;
            }
            _ => {}
        }
        field_start = false;
    }

    true
}

fn parse_fields(record: &str) -> Option<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(record.as_bytes());

    match reader.records().next()? {
        Ok(fields) => Some(fields.iter().map(str::to_owned).collect()),
        Err(e) => {
            tracing::debug!("CSV parse error, falling back to raw split: {}", e);
            None
        }
    }
}

fn raw_split(line: &str) -> Vec<String> {
    line.split(',')
        .map(|field| field.trim_matches('"').to_owned())
        .collect()
}

/// Turn parsed fields into a link. Rows whose code could never be served or
/// whose URL does not normalize are rejected.
fn into_link(fields: &[String]) -> Option<ShortLink> {
    let [code, short_url, original_url, created_at, ..] = fields else {
        return None;
    };

    let code = code.trim();
    if !is_valid_alias(code) {
        return None;
    }

    let original_url = normalize(original_url).ok()?;
    let created_at = NaiveDateTime::parse_from_str(created_at.trim(), TIMESTAMP_FORMAT).ok()?;

    Some(ShortLink {
        code: code.to_owned(),
        short_url: short_url.clone(),
        original_url,
        created_at,
    })
}

// ── Save ───────────────────────────────────────────────────────────────────

/// Overwrite `path` with the header and one row per link.
///
/// The table is written to a sibling temp file first and renamed over the
/// target, so a failed save leaves the previous file intact.
pub fn save(path: &Path, links: &[ShortLink]) -> Result<(), PersistenceError> {
    let bytes = encode(links)?;
    let tmp = temp_path(path);

    let save_err = |source| PersistenceError::Save {
        path: path.to_owned(),
        source,
    };

    fs::write(&tmp, bytes).map_err(save_err)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        save_err(e)
    })?;

    tracing::info!("Saved {} link(s) to {}", links.len(), path.display());
    Ok(())
}

/// Render the table in its persisted form.
pub fn encode(links: &[ShortLink]) -> Result<Vec<u8>, PersistenceError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;
    for link in links {
        writer.serialize(Row::from(link))?;
    }

    writer
        .into_inner()
        .map_err(|e| PersistenceError::Encode(e.into_error().into()))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
