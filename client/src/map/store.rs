//! Remote key-value store for chunks and the minimap blob

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;

use super::chunk::{Chunk, ChunkCoord};

/// Remote store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("{endpoint} responded with HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("minimap image: {0}")]
    Image(String),

    #[error("store worker disconnected")]
    Disconnected,
}

/// Opaque get/set-by-key service holding chunks and the minimap.
///
/// Calls block; the [`ChunkLoader`](super::loader::ChunkLoader) runs them off
/// the UI thread.
pub trait ChunkStore: Send + Sync {
    /// `Ok(None)` when the chunk was never written
    fn fetch_chunk(&self, coord: ChunkCoord) -> Result<Option<Chunk>, StoreError>;

    fn persist_chunk(&self, coord: ChunkCoord, chunk: &Chunk) -> Result<(), StoreError>;

    /// Minimap data URL, `Ok(None)` when unset
    fn fetch_minimap(&self) -> Result<Option<String>, StoreError>;

    fn persist_minimap(&self, data_url: &str) -> Result<(), StoreError>;
}

/// POST body of the chunk endpoint
#[derive(Serialize)]
struct ChunkUpload<'a> {
    coord: String,
    data: &'a Chunk,
}

pub fn chunk_upload_body(coord: ChunkCoord, chunk: &Chunk) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&ChunkUpload {
        coord: coord.key(),
        data: chunk,
    })?)
}

/// Chunk GET body: `null` or empty means never written
pub fn parse_chunk_body(body: &str) -> Result<Option<Chunk>, StoreError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }
    Ok(serde_json::from_str::<Option<Chunk>>(body)?)
}

/// Minimap GET body: empty means unset
pub fn parse_minimap_body(body: &str) -> Option<String> {
    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Store backed by the HTTP chunk/minimap endpoints
#[cfg(not(target_arch = "wasm32"))]
pub struct HttpStore {
    client: reqwest::blocking::Client,
    api: crate::config::ApiConfig,
}

#[cfg(not(target_arch = "wasm32"))]
impl HttpStore {
    pub fn new(api: crate::config::ApiConfig) -> Result<Self, StoreError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("worldmap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        Ok(Self { client, api })
    }

    fn send(
        &self,
        request: reqwest::blocking::RequestBuilder,
        endpoint: &str,
    ) -> Result<String, StoreError> {
        let response = request
            .send()
            .map_err(|e| StoreError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.text().map_err(|e| StoreError::Network(e.to_string()))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl ChunkStore for HttpStore {
    fn fetch_chunk(&self, coord: ChunkCoord) -> Result<Option<Chunk>, StoreError> {
        let request = self
            .client
            .get(&self.api.chunk_url)
            .query(&[("coord", coord.key())]);
        let body = self.send(request, &self.api.chunk_url)?;
        parse_chunk_body(&body)
    }

    fn persist_chunk(&self, coord: ChunkCoord, chunk: &Chunk) -> Result<(), StoreError> {
        let request = self
            .client
            .post(&self.api.chunk_url)
            .header("Content-Type", "application/json")
            .body(chunk_upload_body(coord, chunk)?);
        self.send(request, &self.api.chunk_url).map(|_| ())
    }

    fn fetch_minimap(&self) -> Result<Option<String>, StoreError> {
        let body = self.send(self.client.get(&self.api.minimap_url), &self.api.minimap_url)?;
        Ok(parse_minimap_body(&body))
    }

    fn persist_minimap(&self, data_url: &str) -> Result<(), StoreError> {
        let request = self
            .client
            .post(&self.api.minimap_url)
            .header("Content-Type", "text/plain")
            .body(data_url.to_string());
        self.send(request, &self.api.minimap_url).map(|_| ())
    }
}

/// In-process store for offline editing, keyed like the remote one
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    chunks: HashMap<String, Chunk>,
    minimap: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Network("memory store poisoned".into()))
    }

    pub fn chunk_count(&self) -> usize {
        self.lock().map(|inner| inner.chunks.len()).unwrap_or(0)
    }
}

impl ChunkStore for MemoryStore {
    fn fetch_chunk(&self, coord: ChunkCoord) -> Result<Option<Chunk>, StoreError> {
        Ok(self.lock()?.chunks.get(&coord.key()).cloned())
    }

    fn persist_chunk(&self, coord: ChunkCoord, chunk: &Chunk) -> Result<(), StoreError> {
        self.lock()?.chunks.insert(coord.key(), chunk.clone());
        Ok(())
    }

    fn fetch_minimap(&self) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.minimap.clone())
    }

    fn persist_minimap(&self, data_url: &str) -> Result<(), StoreError> {
        self.lock()?.minimap = Some(data_url.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::chunk::LocalPos;
    use crate::map::tile::TileId;

    #[test]
    fn test_parse_absent_chunk() {
        assert!(parse_chunk_body("null").unwrap().is_none());
        assert!(parse_chunk_body("  ").unwrap().is_none());
    }

    #[test]
    fn test_parse_present_chunk() {
        let mut chunk = Chunk::default();
        chunk.set(LocalPos::new(2, 3), TileId::ROCK);
        let body = serde_json::to_string(&chunk).unwrap();
        assert_eq!(parse_chunk_body(&body).unwrap(), Some(chunk));
    }

    #[test]
    fn test_parse_malformed_chunk() {
        let err = parse_chunk_body("[[1,2,3]]").unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[test]
    fn test_out_of_range_ids_degrade_to_default_colour() {
        let mut rows = vec![vec![0i64; 16]; 16];
        rows[0][0] = 300;
        rows[0][1] = -1;
        let body = serde_json::to_string(&rows).unwrap();

        let chunk = parse_chunk_body(&body).unwrap().unwrap();
        assert_eq!(chunk.get(LocalPos::new(0, 0)), TileId(300));
        assert_eq!(chunk.get(LocalPos::new(1, 0)), TileId(-1));

        let image = crate::map::renderer::rasterize(&chunk, 24);
        let [r, g, b] = TileId::DEFAULT.legend().rgb;
        assert_eq!(image.get_pixel(0, 0).0, [r, g, b, 255]);
        assert_eq!(image.get_pixel(24, 0).0, [r, g, b, 255]);
        assert_eq!(chunk.average_color(), Chunk::default().average_color());

        // unknown ids are kept verbatim on the way back out
        let upload = chunk_upload_body(ChunkCoord::new(0, 0), &chunk).unwrap();
        assert!(upload.contains("[300,-1,0"));
    }

    #[test]
    fn test_upload_body_shape() {
        let body = chunk_upload_body(ChunkCoord::new(4, 7), &Chunk::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["coord"], "4,7");
        assert_eq!(value["data"].as_array().map(Vec::len), Some(16));
        assert_eq!(value["data"][0].as_array().map(Vec::len), Some(16));
    }

    #[test]
    fn test_minimap_body() {
        assert_eq!(parse_minimap_body(""), None);
        assert_eq!(
            parse_minimap_body("data:image/png;base64,AAAA\n").as_deref(),
            Some("data:image/png;base64,AAAA")
        );
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let coord = ChunkCoord::new(1, 1);
        assert!(store.fetch_chunk(coord).unwrap().is_none());
        store.persist_chunk(coord, &Chunk::filled(TileId::SAND)).unwrap();
        assert_eq!(store.fetch_chunk(coord).unwrap(), Some(Chunk::filled(TileId::SAND)));
        assert_eq!(store.chunk_count(), 1);
        store.persist_minimap("data:x").unwrap();
        assert_eq!(store.fetch_minimap().unwrap().as_deref(), Some("data:x"));
    }
}
