use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU16, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crate::{
    codegen::{is_valid_alias, CodeGenerator},
    config::{AppConfig, MIN_PORT},
    error::{ChangePortError, ListenerError, PersistenceError, ShortenError},
    listener::{ListenerStatus, RedirectListener},
    models::{self, ShortLink},
    normalize::normalize,
    persistence,
    store::MappingStore,
};

/// Command interface used by whatever front end drives the shortener:
/// create, delete, list and change-port, plus startup/shutdown plumbing.
///
/// Store mutations are serialized through the generator lock, so the
/// alias/canonical checks and the following `put` form one step.
pub struct Shortener {
    store: Arc<MappingStore>,
    generator: Mutex<CodeGenerator>,
    listener: RedirectListener,
    public_host: String,
    port: AtomicU16,
    data_file: PathBuf,
    closed: AtomicBool,
}

impl Shortener {
    pub fn new(config: &AppConfig, generator: CodeGenerator) -> Self {
        let store = Arc::new(MappingStore::new(base_url(&config.public_host, config.port)));

        Self {
            listener: RedirectListener::new(Arc::clone(&store), config.host.clone()),
            store,
            generator: Mutex::new(generator),
            public_host: config.public_host.clone(),
            port: AtomicU16::new(config.port),
            data_file: config.data_file.clone(),
            closed: AtomicBool::new(false),
        }
    }

    /// Load the persisted table into the store. Returns how many links were
    /// loaded; unreadable rows are skipped.
    pub fn load(&self) -> Result<usize, PersistenceError> {
        let report = persistence::load(&self.data_file)?;
        let count = report.links.len();

        for link in report.links {
            self.store.put(link.code, link.original_url, link.created_at);
        }

        tracing::info!("Loaded {} link(s) from {}", count, self.data_file.display());
        Ok(count)
    }

    /// Start the redirect listener on the configured port.
    pub async fn start(&self) -> Result<u16, ListenerError> {
        let addr = self.listener.start(self.port()).await?;
        self.apply_port(addr.port());
        Ok(addr.port())
    }

    // ── Commands ───────────────────────────────────────────────────────────

    /// Shorten `raw_url`, optionally under a custom alias.
    ///
    /// Without an alias, a URL that is already stored returns its existing
    /// canonical link. An alias may be reused only for the same URL.
    pub fn create(&self, raw_url: &str, alias: Option<&str>) -> Result<ShortLink, ShortenError> {
        let raw_url = raw_url.trim();
        if raw_url.is_empty() {
            return Err(ShortenError::EmptyUrl);
        }
        let url = normalize(raw_url)?;
        let alias = alias.map(str::trim).filter(|a| !a.is_empty());

        let mut generator = self.generator.lock().unwrap_or_else(PoisonError::into_inner);

        let code = match alias {
            Some(alias) => {
                if !is_valid_alias(alias) {
                    return Err(ShortenError::AliasInvalid(alias.to_owned()));
                }
                match self.store.get_by_code(alias) {
                    Some(existing) if existing != url => {
                        return Err(ShortenError::AliasConflict {
                            alias: alias.to_owned(),
                            existing,
                        });
                    }
                    _ => alias.to_owned(),
                }
            }
            None => {
                let existing = self
                    .store
                    .get_by_url(&url)
                    .and_then(|code| self.store.get(&code));
                if let Some(link) = existing {
                    tracing::debug!("Reusing {} for {}", link.code, url);
                    return Ok(link);
                }
                generator.generate(&url, |candidate| self.store.contains(candidate))?
            }
        };

        let link = self.store.put(code, url, models::now());
        tracing::info!("Short link {} -> {}", link.short_url, link.original_url);
        Ok(link)
    }

    /// Remove a link by code. Returns the removed link, if any.
    pub fn delete(&self, code: &str) -> Option<ShortLink> {
        let _writer = self.generator.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = self.store.delete(code);
        if let Some(link) = &removed {
            tracing::info!("Deleted {} ({})", link.code, link.original_url);
        }
        removed
    }

    /// Snapshot of all links in insertion order.
    pub fn list(&self) -> Vec<ShortLink> {
        self.store.list()
    }

    /// Move the listener to `port` and re-render every short URL.
    ///
    /// The old socket is released before the new one is bound. If `port` is
    /// busy the listener lands on an ephemeral port, which is returned.
    pub async fn change_port(&self, port: u16) -> Result<u16, ChangePortError> {
        if port < MIN_PORT {
            return Err(ChangePortError::PortOutOfRange(port));
        }

        let addr = self.listener.start(port).await?;
        self.apply_port(addr.port());
        if addr.port() != port {
            tracing::warn!("Port {} was busy, listening on {} instead", port, addr.port());
        }
        Ok(addr.port())
    }

    /// Write the current table to an arbitrary path.
    pub fn export(&self, path: &Path) -> Result<(), PersistenceError> {
        persistence::save(path, &self.list())
    }

    /// Stop the listener, then persist the store. Only the first call does
    /// anything; later calls return `Ok(())`.
    pub async fn shutdown(&self) -> Result<(), PersistenceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.listener.stop().await;
        persistence::save(&self.data_file, &self.list())
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub fn base_url(&self) -> String {
        self.store.base_url()
    }

    pub fn listener_status(&self) -> ListenerStatus {
        self.listener.status()
    }

    fn apply_port(&self, port: u16) {
        self.port.store(port, Ordering::SeqCst);
        self.store.rebase_display_urls(&base_url(&self.public_host, port));
    }
}

fn base_url(public_host: &str, port: u16) -> String {
    format!("http://{public_host}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shortener(dir: &TempDir, port: u16) -> Shortener {
        let config = AppConfig {
            host: "127.0.0.1".into(),
            port,
            public_host: "localhost".into(),
            data_file: dir.path().join("urls.csv"),
        };
        Shortener::new(&config, CodeGenerator::seeded(11))
    }

    #[test]
    fn same_url_without_alias_reuses_canonical_code() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir, 8080);

        let first = app.create("example.com/page", None).unwrap();
        let second = app.create("http://EXAMPLE.com/page", None).unwrap();

        assert_eq!(first.code, second.code);
        assert_eq!(first.original_url, "http://example.com/page");
        assert_eq!(first.short_url, format!("http://localhost:8080/{}", first.code));
        assert_eq!(first.code.len(), 11);
        assert_eq!(app.list().len(), 1);
    }

    #[test]
    fn alias_is_used_verbatim() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir, 8080);

        let link = app.create("https://docs.rs", Some(" docs ")).unwrap();
        assert_eq!(link.code, "docs");
        assert_eq!(link.original_url, "https://docs.rs/");

        // Re-submitting the same alias for the same URL is fine.
        let same = app.create("https://docs.rs/", Some("docs")).unwrap();
        assert_eq!(same.created_at, link.created_at);
    }

    #[test]
    fn alias_bound_elsewhere_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir, 8080);
        app.create("https://a.test", Some("mine")).unwrap();
        let before = app.list();

        let err = app.create("https://b.test", Some("mine")).unwrap_err();

        assert_eq!(
            err,
            ShortenError::AliasConflict {
                alias: "mine".into(),
                existing: "https://a.test/".into(),
            }
        );
        assert_eq!(app.list(), before);
    }

    #[test]
    fn invalid_input_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir, 8080);

        assert_eq!(app.create("   ", None).unwrap_err(), ShortenError::EmptyUrl);
        assert!(matches!(
            app.create("http://", None).unwrap_err(),
            ShortenError::Normalization(_)
        ));
        assert_eq!(
            app.create("a.test", Some("no")).unwrap_err(),
            ShortenError::AliasInvalid("no".into())
        );
        assert_eq!(
            app.create("a.test", Some("bad alias")).unwrap_err(),
            ShortenError::AliasInvalid("bad alias".into())
        );
        assert!(app.list().is_empty());
    }

    #[test]
    fn delete_frees_the_url_for_a_new_code() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir, 8080);
        let first = app.create("a.test", None).unwrap();

        assert_eq!(app.delete(&first.code).map(|l| l.code), Some(first.code.clone()));
        assert_eq!(app.delete(&first.code), None);
        assert!(app.list().is_empty());

        let second = app.create("a.test", None).unwrap();
        assert_ne!(first.code, second.code);
    }

    #[tokio::test]
    async fn port_change_rebases_every_short_url() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir, 8080);
        app.create("a.test", None).unwrap();
        app.create("b.test", Some("bee")).unwrap();
        let before = app.list();

        // A busy port exercises the ephemeral fallback as well.
        let squatter = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let busy = squatter.local_addr().unwrap().port();
        let effective = app.change_port(busy).await.unwrap();

        assert_ne!(effective, busy);
        assert_eq!(app.port(), effective);
        assert_eq!(app.base_url(), format!("http://localhost:{effective}"));
        assert!(matches!(
            app.listener_status(),
            ListenerStatus::Listening(addr) if addr.port() == effective
        ));

        let after = app.list();
        for (old, new) in before.iter().zip(&after) {
            assert_eq!(old.code, new.code);
            assert_eq!(old.original_url, new.original_url);
            assert_eq!(
                new.short_url,
                format!("http://localhost:{effective}/{}", new.code)
            );
        }

        let fresh = app.create("c.test", None).unwrap();
        assert!(fresh.short_url.starts_with(&format!("http://localhost:{effective}/")));

        app.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn port_below_range_is_rejected_without_restart() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir, 8080);

        let err = app.change_port(80).await.unwrap_err();
        assert!(matches!(err, ChangePortError::PortOutOfRange(80)));
        assert_eq!(app.port(), 8080);
        assert_eq!(app.listener_status(), ListenerStatus::Stopped);
    }

    #[tokio::test]
    async fn shutdown_persists_once_and_reload_restores_links() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir, 0);
        app.start().await.unwrap();
        let a = app.create("a.test", None).unwrap();
        let b = app.create("b.test/x?y=1,2", Some("bee")).unwrap();

        app.shutdown().await.unwrap();
        assert_eq!(app.listener_status(), ListenerStatus::Stopped);

        // Later mutations are not written by a second shutdown.
        app.create("c.test", None).unwrap();
        app.shutdown().await.unwrap();

        let reopened = shortener(&dir, 9000);
        assert_eq!(reopened.load().unwrap(), 2);

        let links = reopened.list();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].code, a.code);
        assert_eq!(links[0].created_at, a.created_at);
        assert_eq!(links[1].code, "bee");
        assert_eq!(links[1].original_url, b.original_url);
        assert_eq!(links[1].short_url, "http://localhost:9000/bee");
        assert_eq!(
            reopened.create("a.test", None).unwrap().code,
            a.code,
            "loaded links keep canonical reuse"
        );
    }

    #[test]
    fn export_writes_the_current_table() {
        let dir = TempDir::new().unwrap();
        let app = shortener(&dir, 8080);
        app.create("a.test", Some("alpha")).unwrap();

        let target = dir.path().join("export.csv");
        app.export(&target).unwrap();

        let report = persistence::load(&target).unwrap();
        assert_eq!(report.links, app.list());
    }
}
