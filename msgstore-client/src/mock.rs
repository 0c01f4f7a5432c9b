//! In-memory [`BackendTransport`]/[`BackendSession`] for exercising the
//! session pool, chunk fetcher, and range streamer without a live backend.
//!
//! Gated behind the `test-util` feature so it ships for `streamgw`'s tests
//! but never builds into a release binary.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::locator::FileLocator;
use crate::transport::{BackendSession, BackendTransport, ExportedAuthorization, FileChunk};

/// Scripted behavior for a mock backend.
#[derive(Default)]
pub struct MockScript {
    /// The file content `get_file` serves, sliced by offset/limit.
    pub file_bytes: Bytes,
    /// How many leading `import_authorization` calls per dc fail with
    /// `AuthBytesInvalid` before succeeding.
    pub import_failures_before_success: u32,
    /// If set, the call-th `get_file` across the whole mock (1-indexed)
    /// returns a flood-control error instead of data.
    pub flood_wait_on_call: Option<(usize, Duration)>,
    /// If set, the call-th `get_file` across the whole mock (1-indexed)
    /// answers with a non-file response, simulating a backend response type
    /// other than a file chunk (spec §4.3).
    pub unexpected_type_on_call: Option<usize>,
}

/// An in-memory backend.
pub struct MockBackendTransport {
    locator: FileLocator,
    script: MockScript,
    pub auth_create_calls: Arc<AtomicUsize>,
    import_attempts: Arc<Mutex<std::collections::HashMap<i32, u32>>>,
    fetch_calls: Arc<AtomicUsize>,
    pub fetched_offsets: Arc<Mutex<Vec<i64>>>,
    /// `(home_dc_id, home_auth_key, target_dc_id)` for every
    /// `export_authorization` call, so tests can confirm each call carries
    /// the exporting worker's own identity rather than an ambiguous shared
    /// one.
    pub export_authorization_calls: Arc<Mutex<Vec<(i32, Vec<u8>, i32)>>>,
}

impl MockBackendTransport {
    pub fn new(locator: FileLocator, script: MockScript) -> Self {
        Self {
            locator,
            script,
            auth_create_calls: Arc::new(AtomicUsize::new(0)),
            import_attempts: Arc::new(Mutex::new(std::collections::HashMap::new())),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            fetched_offsets: Arc::new(Mutex::new(Vec::new())),
            export_authorization_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl BackendTransport for MockBackendTransport {
    async fn get_file_ids(
        &self,
        _channel_id: i64,
        _message_id: i64,
    ) -> Result<Option<FileLocator>> {
        Ok(Some(self.locator.clone()))
    }

    async fn auth_create(&self, _dc_id: i32) -> Result<Vec<u8>> {
        self.auth_create_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xAB; 32])
    }

    async fn export_authorization(
        &self,
        home_dc_id: i32,
        home_auth_key: &[u8],
        dc_id: i32,
    ) -> Result<ExportedAuthorization> {
        self.export_authorization_calls
            .lock()
            .expect("mutex poisoned")
            .push((home_dc_id, home_auth_key.to_vec(), dc_id));
        Ok(ExportedAuthorization {
            id: dc_id as i64,
            bytes: Bytes::from_static(b"exported"),
        })
    }

    async fn open_session(
        &self,
        dc_id: i32,
        auth_key: Vec<u8>,
    ) -> Result<Box<dyn BackendSession>> {
        Ok(Box::new(MockBackendSession {
            dc_id,
            auth_key,
            stopped: AtomicBool::new(false),
            file_bytes: self.script.file_bytes.clone(),
            import_failures_before_success: self.script.import_failures_before_success,
            import_attempts: self.import_attempts.clone(),
            flood_wait_on_call: self.script.flood_wait_on_call,
            unexpected_type_on_call: self.script.unexpected_type_on_call,
            fetch_calls: self.fetch_calls.clone(),
            fetched_offsets: self.fetched_offsets.clone(),
        }))
    }
}

pub struct MockBackendSession {
    dc_id: i32,
    #[allow(dead_code)]
    auth_key: Vec<u8>,
    stopped: AtomicBool,
    file_bytes: Bytes,
    import_failures_before_success: u32,
    import_attempts: Arc<Mutex<std::collections::HashMap<i32, u32>>>,
    flood_wait_on_call: Option<(usize, Duration)>,
    unexpected_type_on_call: Option<usize>,
    fetch_calls: Arc<AtomicUsize>,
    fetched_offsets: Arc<Mutex<Vec<i64>>>,
}

#[async_trait]
impl BackendSession for MockBackendSession {
    fn dc_id(&self) -> i32 {
        self.dc_id
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn import_authorization(&self, _id: i64, _bytes: Bytes) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::Backend {
                status: reqwest::StatusCode::GONE,
                message: "session stopped".into(),
            });
        }

        let mut attempts = self.import_attempts.lock().expect("mutex poisoned");
        let count = attempts.entry(self.dc_id).or_insert(0);
        *count += 1;

        if *count <= self.import_failures_before_success {
            return Err(Error::AuthBytesInvalid);
        }

        Ok(())
    }

    async fn get_file(
        &self,
        _location: &FileLocator,
        offset: i64,
        limit: i32,
    ) -> Result<FileChunk> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::Backend {
                status: reqwest::StatusCode::GONE,
                message: "session stopped".into(),
            });
        }

        let call_index = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.fetched_offsets.lock().expect("mutex poisoned").push(offset);

        if let Some((target_call, delay)) = self.flood_wait_on_call {
            if call_index == target_call {
                return Err(Error::FloodWait(delay));
            }
        }

        if self.unexpected_type_on_call == Some(call_index) {
            // Simulates the backend answering `GetFile` with a response
            // that isn't a file chunk at all; the real transport
            // (`http_transport.rs`) turns that into `FileChunk::eof()`
            // rather than an error.
            return Ok(FileChunk::eof());
        }

        let start = offset.max(0) as usize;
        if start >= self.file_bytes.len() {
            return Ok(FileChunk::eof());
        }

        let end = (start + limit.max(0) as usize).min(self.file_bytes.len());
        Ok(FileChunk {
            bytes: self.file_bytes.slice(start..end),
        })
    }
}
