use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::endpoint::{ProxyEndpoint, ProxyVariant};
use crate::ledger::{JsonLedgerStore, UsageLedger};

/// Per-variant pool breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantStatistics {
    pub total: usize,
    pub active: usize,
    pub commented: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PoolStatistics {
    pub total: usize,
    pub active: usize,
    pub exhausted: usize,
    pub per_variant: HashMap<ProxyVariant, VariantStatistics>,
}

/// Rotates egress proxies across the variant pool files, enforcing the
/// per-endpoint usage cap and retiring exhausted entries durably.
///
/// Selection and ledger updates share one mutex so concurrent attempts
/// serialize through here.
pub struct ProxyRotation {
    inner: Mutex<Inner>,
}

struct Inner {
    pool_dir: PathBuf,
    max_usage: u32,
    ledger: UsageLedger,
    store: JsonLedgerStore,
}

impl ProxyRotation {
    pub fn new(pool_dir: impl Into<PathBuf>, usage_file: impl Into<PathBuf>, max_usage: u32) -> Self {
        let store = JsonLedgerStore::new(usage_file);
        let ledger = store.load();
        Self {
            inner: Mutex::new(Inner {
                pool_dir: pool_dir.into(),
                max_usage,
                ledger,
                store,
            }),
        }
    }

    /// Pick an eligible endpoint, or `None` when every variant is empty or
    /// exhausted. No proxies is a normal condition, not an error.
    pub async fn acquire(&self) -> Option<ProxyEndpoint> {
        let inner = self.inner.lock().await;
        let mut rng = rand::thread_rng();

        let mut remaining: Vec<ProxyVariant> = ProxyVariant::ALL.to_vec();

        while let Some(&variant) = remaining.choose(&mut rng) {
            let path = inner.pool_path(variant);
            let qualifying: Vec<String> = read_active_lines(&path)
                .into_iter()
                .filter(|conn| inner.ledger.count(conn) < inner.max_usage)
                .collect();

            match qualifying.choose(&mut rng) {
                Some(connection) => {
                    let endpoint = ProxyEndpoint {
                        connection: connection.clone(),
                        variant,
                        usage_count: inner.ledger.count(connection),
                        max_usage: inner.max_usage,
                        retired: false,
                    };
                    info!(variant = %variant, proxy = %endpoint.redacted(), "selected proxy");
                    return Some(endpoint);
                }
                None => {
                    debug!(variant = %variant, path = %path.display(), "no eligible proxies in variant");
                    remaining.retain(|v| *v != variant);
                }
            }
        }

        warn!("proxy pool exhausted or absent, continuing without a proxy is up to the caller");
        None
    }

    /// Charge one assignment to the endpoint. At the cap the endpoint is
    /// retired in place in its pool file and the ledger is persisted.
    pub async fn record_usage(&self, endpoint: &ProxyEndpoint) {
        let mut inner = self.inner.lock().await;

        let new_count = inner.ledger.increment(&endpoint.connection);
        info!(
            proxy = %endpoint.redacted(),
            usage = new_count,
            cap = inner.max_usage,
            "recorded proxy usage"
        );

        if new_count >= inner.max_usage {
            let path = inner.pool_path(endpoint.variant);
            match retire_line(&path, &endpoint.connection) {
                Ok(true) => {
                    info!(proxy = %endpoint.redacted(), "proxy reached usage cap, retired in pool file")
                }
                Ok(false) => {
                    warn!(proxy = %endpoint.redacted(), path = %path.display(), "proxy line not found for retirement")
                }
                Err(e) => {
                    warn!(proxy = %endpoint.redacted(), error = %e, "failed to retire proxy line")
                }
            }
        }

        if let Err(e) = inner.store.save(&inner.ledger) {
            warn!(error = %e, "failed to persist usage ledger");
        }
    }

    /// Ledger contents, highest usage first.
    pub async fn usage(&self) -> Vec<(String, u32)> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<(String, u32)> = inner
            .ledger
            .entries()
            .map(|(conn, count)| (conn.to_string(), count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }

    pub async fn statistics(&self) -> PoolStatistics {
        let inner = self.inner.lock().await;
        let mut stats = PoolStatistics::default();

        for variant in ProxyVariant::ALL {
            let mut vs = VariantStatistics::default();
            let path = inner.pool_path(variant);
            for line in read_all_lines(&path) {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                vs.total += 1;
                if line.starts_with('#') {
                    vs.commented += 1;
                } else {
                    vs.active += 1;
                    if inner.ledger.count(line) >= inner.max_usage {
                        stats.exhausted += 1;
                    }
                }
            }
            stats.total += vs.total;
            stats.active += vs.active;
            stats.per_variant.insert(variant, vs);
        }

        stats
    }
}

impl Inner {
    fn pool_path(&self, variant: ProxyVariant) -> PathBuf {
        self.pool_dir.join(variant.file_name())
    }
}

/// Uncommented, non-empty lines of a pool file. Missing or unreadable
/// files count as an empty variant.
fn read_active_lines(path: &Path) -> Vec<String> {
    read_all_lines(path)
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect()
}

fn read_all_lines(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => raw.lines().map(str::to_string).collect(),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "pool file unreadable");
            }
            Vec::new()
        }
    }
}

/// Comment out exactly the line matching `connection`, byte-preserving
/// every other line. Returns whether a line was rewritten.
fn retire_line(path: &Path, connection: &str) -> std::io::Result<bool> {
    let raw = std::fs::read_to_string(path)?;
    let mut out = String::with_capacity(raw.len() + 2);
    let mut rewritten = false;

    for segment in raw.split_inclusive('\n') {
        if !rewritten && segment.trim() == connection {
            out.push_str("# ");
            out.push_str(segment);
            if !segment.ends_with('\n') {
                out.push('\n');
            }
            rewritten = true;
        } else {
            out.push_str(segment);
        }
    }

    if rewritten {
        std::fs::write(path, out)?;
    }
    Ok(rewritten)
}
