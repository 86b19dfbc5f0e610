use chrono::NaiveDateTime;
use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::models::{short_url, ShortLink};

/// Bidirectional code ↔ URL table shared by the redirect listener and the
/// control surface.
///
/// Both directions live behind one lock, so readers never see a code whose
/// URL is missing from the reverse map or vice versa. The lock is never held
/// across an `.await`.
#[derive(Debug)]
pub struct MappingStore {
    inner: RwLock<Maps>,
}

#[derive(Debug)]
struct Maps {
    by_code: HashMap<String, Entry>,
    /// original URL -> canonical code
    by_url: HashMap<String, String>,
    base_url: String,
    next_seq: u64,
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    link: ShortLink,
}

impl MappingStore {
    /// Empty store whose display URLs are rendered under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Maps {
                by_code: HashMap::new(),
                by_url: HashMap::new(),
                base_url: base_url.into(),
                next_seq: 0,
            }),
        }
    }

    /// Insert or re-point `code`, making it the canonical code for `original_url`.
    ///
    /// Re-pointing an existing code keeps its `created_at` and list position.
    /// Alias conflicts must already be resolved by the caller.
    pub fn put(
        &self,
        code: impl Into<String>,
        original_url: impl Into<String>,
        created_at: NaiveDateTime,
    ) -> ShortLink {
        let code = code.into();
        let original_url = original_url.into();
        let mut maps = self.write();
        let display = short_url(&maps.base_url, &code);

        let previous_url = match maps.by_code.get_mut(&code) {
            Some(entry) => {
                entry.link.short_url = display;
                Some(std::mem::replace(
                    &mut entry.link.original_url,
                    original_url.clone(),
                ))
            }
            None => {
                let seq = maps.next_seq;
                maps.next_seq += 1;
                maps.by_code.insert(
                    code.clone(),
                    Entry {
                        seq,
                        link: ShortLink {
                            code: code.clone(),
                            short_url: display,
                            original_url: original_url.clone(),
                            created_at,
                        },
                    },
                );
                None
            }
        };

        if let Some(previous_url) = previous_url.filter(|prev| *prev != original_url) {
            maps.release_canonical(&previous_url, &code);
        }
        maps.by_url.insert(original_url, code.clone());

        maps.by_code[&code].link.clone()
    }

    /// Look up the target URL for a short code.
    pub fn get_by_code(&self, code: &str) -> Option<String> {
        self.read()
            .by_code
            .get(code)
            .map(|entry| entry.link.original_url.clone())
    }

    /// Look up the canonical code for a normalized URL.
    pub fn get_by_url(&self, original_url: &str) -> Option<String> {
        self.read().by_url.get(original_url).cloned()
    }

    /// Full record for a code.
    pub fn get(&self, code: &str) -> Option<ShortLink> {
        self.read().by_code.get(code).map(|entry| entry.link.clone())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.read().by_code.contains_key(code)
    }

    /// Remove a code and, if it was canonical, its reverse entry.
    /// Returns the removed link; absent codes are a no-op.
    pub fn delete(&self, code: &str) -> Option<ShortLink> {
        let mut maps = self.write();
        let entry = maps.by_code.remove(code)?;
        maps.release_canonical(&entry.link.original_url, code);
        Some(entry.link)
    }

    /// Snapshot of every link in insertion order.
    pub fn list(&self) -> Vec<ShortLink> {
        let maps = self.read();
        let mut entries: Vec<&Entry> = maps.by_code.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.link.clone()).collect()
    }

    /// Re-render every display URL under a new base (e.g. after a port change).
    /// Codes, targets and timestamps are untouched.
    pub fn rebase_display_urls(&self, new_base: &str) {
        let mut maps = self.write();
        maps.base_url = new_base.trim_end_matches('/').to_owned();
        let Maps {
            by_code, base_url, ..
        } = &mut *maps;
        for entry in by_code.values_mut() {
            entry.link.short_url = short_url(base_url, &entry.link.code);
        }
    }

    pub fn base_url(&self) -> String {
        self.read().base_url.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, Maps> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Maps> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Maps {
    /// Drop the reverse entry for `url` if it currently points at `code`.
    fn release_canonical(&mut self, url: &str, code: &str) {
        if self.by_url.get(url).is_some_and(|canonical| canonical == code) {
            self.by_url.remove(url);
        }
    }
}
