use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Values above this are split into sequential chunks (kept under the
/// backend's 1 MB value limit with headroom).
const MAX_CHUNK_SIZE: usize = 900_000;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A key-value cache holding text payloads with expiry. Implemented by
/// the hosting layer (Redis in production); an in-memory version ships
/// for tests and single-process use.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local cache with lazy expiry.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expiry)) if *expiry > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkMeta {
    chunked: bool,
    chunks: usize,
}

/// Serialize and cache a snapshot under `namespace:id`, chunking large
/// payloads. A non-chunked write removes any stale chunk metadata left
/// by a previous larger snapshot.
pub async fn store_snapshot<T: Serialize>(
    cache: &dyn SnapshotCache,
    namespace: &str,
    id: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    store_snapshot_chunked(cache, namespace, id, value, ttl, MAX_CHUNK_SIZE).await
}

async fn store_snapshot_chunked<T: Serialize>(
    cache: &dyn SnapshotCache,
    namespace: &str,
    id: &str,
    value: &T,
    ttl: Duration,
    max_chunk: usize,
) -> Result<()> {
    let serialized = serde_json::to_vec(value).context("Failed to serialize snapshot")?;
    let payload = BASE64.encode(serialized);
    let key = format!("{namespace}:{id}");

    if payload.len() > max_chunk {
        let chunks: Vec<&str> = payload
            .as_bytes()
            .chunks(max_chunk)
            .map(|c| std::str::from_utf8(c).expect("base64 is ascii"))
            .collect();
        let meta = serde_json::to_string(&ChunkMeta {
            chunked: true,
            chunks: chunks.len(),
        })?;
        cache.set(&format!("{key}:meta"), &meta, ttl).await?;
        for (i, chunk) in chunks.iter().enumerate() {
            cache.set(&format!("{key}:chunk:{i}"), chunk, ttl).await?;
        }
        info!(key, chunks = chunks.len(), "snapshot cached (chunked)");
    } else {
        cache.set(&key, &payload, ttl).await?;
        cache.delete(&format!("{key}:meta")).await?;
        debug!(key, bytes = payload.len(), "snapshot cached");
    }
    Ok(())
}

/// Retrieve and deserialize a snapshot, reassembling chunks by index.
pub async fn load_snapshot<T: DeserializeOwned>(
    cache: &dyn SnapshotCache,
    namespace: &str,
    id: &str,
) -> Result<Option<T>> {
    let key = format!("{namespace}:{id}");

    let payload = if let Some(meta) = cache.get(&format!("{key}:meta")).await? {
        let meta: ChunkMeta = serde_json::from_str(&meta).context("Bad chunk metadata")?;
        let mut combined = String::new();
        for i in 0..meta.chunks {
            let chunk = cache
                .get(&format!("{key}:chunk:{i}"))
                .await?
                .ok_or_else(|| anyhow!("missing chunk {i} of {key}"))?;
            combined.push_str(&chunk);
        }
        combined
    } else {
        match cache.get(&key).await? {
            Some(payload) => payload,
            None => return Ok(None),
        }
    };

    let bytes = BASE64
        .decode(payload.as_bytes())
        .context("Snapshot payload is not valid base64")?;
    let value = serde_json::from_slice(&bytes).context("Failed to parse snapshot")?;
    Ok(Some(value))
}
