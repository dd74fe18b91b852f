use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sheetchat_config::{SheetEntry, SheetSource as SourceConfig};
use sheetchat_kernel::{Snapshot, Table};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::tabular::{parse_csv, parse_jotform};

const JOTFORM_PAGE_LIMIT: u32 = 1000;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("parse error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch(&self, entry: &SheetEntry) -> Result<Table, FetchError>;
}

pub struct HttpSheetSource {
    client: Client,
}

impl HttpSheetSource {
    pub fn new(timeout: Duration) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self { client })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SheetSource for HttpSheetSource {
    async fn fetch(&self, entry: &SheetEntry) -> Result<Table, FetchError> {
        match &entry.source {
            SourceConfig::Csv { url } => {
                let bytes = self.get_bytes(url).await?;
                parse_csv(&bytes).map_err(FetchError::Parse)
            }
            SourceConfig::Jotform {
                api_key,
                form_id,
                base_url,
            } => {
                let url = format!(
                    "{}/form/{form_id}/submissions?apiKey={api_key}&limit={JOTFORM_PAGE_LIMIT}",
                    base_url.trim_end_matches('/')
                );
                let bytes = self.get_bytes(&url).await?;
                let body: serde_json::Value = serde_json::from_slice(&bytes)
                    .map_err(|e| FetchError::Parse(e.to_string()))?;
                parse_jotform(&body).map_err(FetchError::Parse)
            }
        }
    }
}

const RETRY_BACKOFF: Duration = Duration::from_secs(30);

struct Cached {
    snapshot: Arc<Snapshot>,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    cached: Option<Cached>,
    failed_at: Option<Instant>,
}

impl CacheState {
    fn last_known(&self) -> Arc<Snapshot> {
        self.cached
            .as_ref()
            .map(|cached| cached.snapshot.clone())
            .unwrap_or_default()
    }
}

// Process-wide copy of every catalogued dataset, refetched lazily once it
// is older than `ttl`. The mutex also serializes concurrent refreshes.
pub struct SnapshotCache {
    source: Arc<dyn SheetSource>,
    catalog: Vec<SheetEntry>,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl SnapshotCache {
    pub fn new(source: Arc<dyn SheetSource>, catalog: Vec<SheetEntry>, ttl: Duration) -> Self {
        Self {
            source,
            catalog,
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub async fn get_snapshot(&self) -> Arc<Snapshot> {
        let mut state = self.state.lock().await;
        if let Some(cached) = state.cached.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.snapshot.clone();
            }
        }
        if let Some(failed_at) = state.failed_at {
            if failed_at.elapsed() < RETRY_BACKOFF.min(self.ttl) {
                return state.last_known();
            }
        }

        let previous = state.last_known();
        let mut sheets = Vec::with_capacity(self.catalog.len());
        let mut failures = 0;
        for entry in &self.catalog {
            match self.source.fetch(entry).await {
                Ok(table) => sheets.push((entry.name.clone(), table)),
                Err(e) => {
                    failures += 1;
                    let stale = previous.table(&entry.name).cloned();
                    warn!(sheet = %entry.name, err = %e, stale = stale.is_some(), "sheet fetch failed");
                    if let Some(table) = stale {
                        sheets.push((entry.name.clone(), table));
                    }
                }
            }
        }

        if failures > 0 && failures == self.catalog.len() {
            warn!(sheets = failures, "sheet snapshot refresh failed");
            state.failed_at = Some(Instant::now());
            return previous;
        }

        let snapshot = Arc::new(Snapshot::new(sheets));
        info!(
            sheets = self.catalog.len(),
            failed = failures,
            rows = snapshot.total_rows(),
            "sheet snapshot refreshed"
        );
        state.cached = Some(Cached {
            snapshot: snapshot.clone(),
            fetched_at: Instant::now(),
        });
        state.failed_at = None;
        snapshot
    }
}
