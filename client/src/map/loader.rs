//! Background store requests with platform-specific implementations.
//!
//! The engine never blocks on the network: it queues [`StoreRequest`]s and
//! drains [`StoreResponse`]s from [`ChunkLoader::poll`] once per frame.

use std::collections::HashSet;

use super::chunk::{Chunk, ChunkCoord};
use super::store::StoreError;

/// Correlates a persist request with its response
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct SyncTicket(pub u64);

/// Work for the store
#[derive(Debug)]
pub enum StoreRequest {
    FetchChunk(ChunkCoord),
    PersistChunk {
        ticket: SyncTicket,
        coord: ChunkCoord,
        chunk: Chunk,
    },
    FetchMinimap,
    PersistMinimap {
        ticket: SyncTicket,
        data_url: String,
    },
}

/// Result of a store request
#[derive(Debug)]
pub enum StoreResponse {
    ChunkFetched(ChunkCoord, Result<Option<Chunk>, StoreError>),
    ChunkPersisted(SyncTicket, Result<(), StoreError>),
    MinimapFetched(Result<Option<String>, StoreError>),
    MinimapPersisted(SyncTicket, Result<(), StoreError>),
}

// Platform-specific channel types
#[cfg(not(target_arch = "wasm32"))]
type ResponseReceiver = std::sync::mpsc::Receiver<StoreResponse>;
#[cfg(not(target_arch = "wasm32"))]
type RequestSender = std::sync::mpsc::Sender<StoreRequest>;

#[cfg(target_arch = "wasm32")]
use std::sync::{Arc, Mutex};

#[cfg(target_arch = "wasm32")]
type ResponseReceiver = Arc<Mutex<Vec<StoreResponse>>>;

/// Request pump between the engine and the store
pub struct ChunkLoader {
    response_rx: ResponseReceiver,
    #[cfg(not(target_arch = "wasm32"))]
    request_tx: RequestSender,
    #[cfg(target_arch = "wasm32")]
    api: crate::config::ApiConfig,
    /// Chunks with a fetch in flight
    pending: HashSet<ChunkCoord>,
    in_flight: usize,
    next_ticket: u64,
    /// Responses for requests the worker never received
    #[cfg(not(target_arch = "wasm32"))]
    orphaned: Vec<StoreResponse>,
    #[cfg(not(target_arch = "wasm32"))]
    _worker_handle: Option<std::thread::JoinHandle<()>>,
}

impl ChunkLoader {
    /// Serve requests from `store` on a worker thread.
    /// Requests are executed in submission order.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn spawn(store: std::sync::Arc<dyn super::store::ChunkStore>) -> Self {
        let (request_tx, request_rx) = std::sync::mpsc::channel::<StoreRequest>();
        let (response_tx, response_rx) = std::sync::mpsc::channel::<StoreResponse>();

        let worker_handle = std::thread::Builder::new()
            .name("worldmap-store".into())
            .spawn(move || Self::worker_thread(store, request_rx, response_tx))
            .map_err(|e| log::error!("Failed to spawn store worker: {}", e))
            .ok();

        Self {
            response_rx,
            request_tx,
            pending: HashSet::new(),
            in_flight: 0,
            next_ticket: 0,
            orphaned: Vec::new(),
            _worker_handle: worker_handle,
        }
    }

    /// Serve requests with `fetch` against the HTTP endpoints
    #[cfg(target_arch = "wasm32")]
    pub fn web(api: crate::config::ApiConfig) -> Self {
        Self {
            response_rx: Arc::new(Mutex::new(Vec::new())),
            api,
            pending: HashSet::new(),
            in_flight: 0,
            next_ticket: 0,
        }
    }

    /// Fetch a chunk unless one is already loading
    pub fn request_chunk(&mut self, coord: ChunkCoord) {
        if self.pending.contains(&coord) {
            return;
        }
        if self.submit(StoreRequest::FetchChunk(coord)) {
            self.pending.insert(coord);
        }
    }

    pub fn persist_chunk(&mut self, coord: ChunkCoord, chunk: Chunk) -> SyncTicket {
        let ticket = self.ticket();
        self.submit(StoreRequest::PersistChunk {
            ticket,
            coord,
            chunk,
        });
        ticket
    }

    pub fn request_minimap(&mut self) {
        self.submit(StoreRequest::FetchMinimap);
    }

    pub fn persist_minimap(&mut self, data_url: String) -> SyncTicket {
        let ticket = self.ticket();
        self.submit(StoreRequest::PersistMinimap { ticket, data_url });
        ticket
    }

    fn ticket(&mut self) -> SyncTicket {
        self.next_ticket += 1;
        SyncTicket(self.next_ticket)
    }

    /// Hand a request to the backend. Returns false if it could not be queued;
    /// persist callers then see a `Disconnected` response on the next poll.
    fn submit(&mut self, request: StoreRequest) -> bool {
        self.in_flight += 1;

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.request_tx.send(request) {
                Ok(()) => true,
                Err(std::sync::mpsc::SendError(request)) => {
                    log::warn!("Store worker is gone, dropping {:?}", request);
                    self.orphaned.push(disconnected(request));
                    false
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            self.spawn_wasm_request(request);
            true
        }
    }

    /// Poll for a completed request
    pub fn poll(&mut self) -> Option<StoreResponse> {
        let response = self.next_response()?;
        self.in_flight = self.in_flight.saturating_sub(1);
        if let StoreResponse::ChunkFetched(coord, _) = &response {
            self.pending.remove(coord);
        }
        Some(response)
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn next_response(&mut self) -> Option<StoreResponse> {
        if let Some(response) = self.orphaned.pop() {
            return Some(response);
        }
        match self.response_rx.try_recv() {
            Ok(response) => Some(response),
            Err(std::sync::mpsc::TryRecvError::Empty) => None,
            Err(std::sync::mpsc::TryRecvError::Disconnected) => None,
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn next_response(&mut self) -> Option<StoreResponse> {
        let mut responses = self.response_rx.lock().ok()?;
        if responses.is_empty() {
            None
        } else {
            Some(responses.remove(0))
        }
    }

    /// Check if a chunk is currently being fetched
    pub fn is_loading(&self, coord: &ChunkCoord) -> bool {
        self.pending.contains(coord)
    }

    /// Requests sent but not yet answered through `poll`
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn pending_fetches(&self) -> usize {
        self.pending.len()
    }

    // Native implementation
    #[cfg(not(target_arch = "wasm32"))]
    fn worker_thread(
        store: std::sync::Arc<dyn super::store::ChunkStore>,
        request_rx: std::sync::mpsc::Receiver<StoreRequest>,
        response_tx: std::sync::mpsc::Sender<StoreResponse>,
    ) {
        while let Ok(request) = request_rx.recv() {
            let response = execute(store.as_ref(), request);
            if response_tx.send(response).is_err() {
                break; // Receiver dropped, exit thread
            }
        }
    }

    // WASM implementation using web-sys fetch API
    #[cfg(target_arch = "wasm32")]
    fn spawn_wasm_request(&self, request: StoreRequest) {
        let responses = self.response_rx.clone();
        let api = self.api.clone();

        wasm_bindgen_futures::spawn_local(async move {
            let response = web::execute(&api, request).await;
            if let Ok(mut responses) = responses.lock() {
                responses.push(response);
            }
        });
    }
}

/// Run one request against a blocking store
pub fn execute(store: &dyn super::store::ChunkStore, request: StoreRequest) -> StoreResponse {
    match request {
        StoreRequest::FetchChunk(coord) => {
            StoreResponse::ChunkFetched(coord, store.fetch_chunk(coord))
        }
        StoreRequest::PersistChunk {
            ticket,
            coord,
            chunk,
        } => StoreResponse::ChunkPersisted(ticket, store.persist_chunk(coord, &chunk)),
        StoreRequest::FetchMinimap => StoreResponse::MinimapFetched(store.fetch_minimap()),
        StoreRequest::PersistMinimap { ticket, data_url } => {
            StoreResponse::MinimapPersisted(ticket, store.persist_minimap(&data_url))
        }
    }
}

/// Failure response for a request that never reached the store
#[cfg(not(target_arch = "wasm32"))]
fn disconnected(request: StoreRequest) -> StoreResponse {
    match request {
        StoreRequest::FetchChunk(coord) => {
            StoreResponse::ChunkFetched(coord, Err(StoreError::Disconnected))
        }
        StoreRequest::PersistChunk { ticket, .. } => {
            StoreResponse::ChunkPersisted(ticket, Err(StoreError::Disconnected))
        }
        StoreRequest::FetchMinimap => StoreResponse::MinimapFetched(Err(StoreError::Disconnected)),
        StoreRequest::PersistMinimap { ticket, .. } => {
            StoreResponse::MinimapPersisted(ticket, Err(StoreError::Disconnected))
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod web {
    use wasm_bindgen::JsCast;
    use wasm_bindgen::JsValue;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{Request, RequestInit, RequestMode, Response};

    use super::{StoreRequest, StoreResponse};
    use crate::config::ApiConfig;
    use crate::map::store::{StoreError, chunk_upload_body, parse_chunk_body, parse_minimap_body};

    pub async fn execute(api: &ApiConfig, request: StoreRequest) -> StoreResponse {
        match request {
            StoreRequest::FetchChunk(coord) => {
                let url = format!("{}?coord={}", api.chunk_url, coord.key());
                let result = fetch_text("GET", &url, None)
                    .await
                    .and_then(|body| parse_chunk_body(&body));
                StoreResponse::ChunkFetched(coord, result)
            }
            StoreRequest::PersistChunk {
                ticket,
                coord,
                chunk,
            } => {
                let result = match chunk_upload_body(coord, &chunk) {
                    Ok(body) => fetch_text("POST", &api.chunk_url, Some(("application/json", &body)))
                        .await
                        .map(|_| ()),
                    Err(e) => Err(e),
                };
                StoreResponse::ChunkPersisted(ticket, result)
            }
            StoreRequest::FetchMinimap => {
                let result = fetch_text("GET", &api.minimap_url, None)
                    .await
                    .map(|body| parse_minimap_body(&body));
                StoreResponse::MinimapFetched(result)
            }
            StoreRequest::PersistMinimap { ticket, data_url } => {
                let result = fetch_text("POST", &api.minimap_url, Some(("text/plain", &data_url)))
                    .await
                    .map(|_| ());
                StoreResponse::MinimapPersisted(ticket, result)
            }
        }
    }

    async fn fetch_text(
        method: &str,
        url: &str,
        body: Option<(&str, &str)>,
    ) -> Result<String, StoreError> {
        let network = |what: &str, e: JsValue| StoreError::Network(format!("{what}: {e:?}"));

        let opts = RequestInit::new();
        opts.set_method(method);
        opts.set_mode(RequestMode::Cors);
        if let Some((_, body)) = body {
            opts.set_body(&JsValue::from_str(body));
        }

        let request = Request::new_with_str_and_init(url, &opts)
            .map_err(|e| network("Failed to create request", e))?;
        if let Some((content_type, _)) = body {
            request
                .headers()
                .set("Content-Type", content_type)
                .map_err(|e| network("Failed to set Content-Type", e))?;
        }

        let window = web_sys::window().ok_or_else(|| StoreError::Network("No window object".into()))?;
        let resp_value = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(|e| network("Fetch failed", e))?;
        let resp: Response = resp_value
            .dyn_into()
            .map_err(|_| StoreError::Network("Response is not a Response object".into()))?;

        if !resp.ok() {
            return Err(StoreError::Status {
                endpoint: url.to_string(),
                status: resp.status(),
            });
        }

        let text = JsFuture::from(resp.text().map_err(|e| network("Failed to read body", e))?)
            .await
            .map_err(|e| network("Failed to read body", e))?;
        Ok(text.as_string().unwrap_or_default())
    }
}
