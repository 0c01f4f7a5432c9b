//! The boundary between this crate and the MsgStore backend.
//!
//! Everything in this module is an interface the core *consumes*; the wire
//! protocol that actually talks to a backend datacenter is out of scope for
//! the streaming engine (spec §6, "consumed from collaborators"). One
//! concrete implementation ships in [`crate::http_transport`]; tests use
//! [`crate::mock`].

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::locator::FileLocator;

/// An exported authorization, handed from a worker's home session to a
/// fresh session in another datacenter.
#[derive(Debug, Clone)]
pub struct ExportedAuthorization {
    pub id: i64,
    pub bytes: Bytes,
}

/// One chunk of file bytes returned by `GetFile`. An empty chunk signals
/// end-of-file.
#[derive(Debug, Clone, Default)]
pub struct FileChunk {
    pub bytes: Bytes,
}

impl FileChunk {
    /// The end-of-file marker: an empty chunk. Returned either because the
    /// backend ran out of bytes or because it answered `GetFile` with a
    /// response that isn't a file chunk at all (spec §4.3: "any response not
    /// of the expected file-chunk type terminates the stream, treated as
    /// EOF") — both cases look identical to the fetch loop.
    pub fn eof() -> Self {
        Self { bytes: Bytes::new() }
    }

    pub fn is_eof(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// RPC primitives the Location Resolver and Session Pool need from the
/// backend, independent of any particular session.
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Resolves a message id in the configured store channel to a
    /// `FileLocator`, or `None` if the message doesn't exist or carries no
    /// file.
    async fn get_file_ids(
        &self,
        channel_id: i64,
        message_id: i64,
    ) -> Result<Option<FileLocator>>;

    /// Derives a fresh authorization key for `dc_id` (the cross-DC path of
    /// session creation).
    async fn auth_create(&self, dc_id: i32) -> Result<Vec<u8>>;

    /// Exports the calling worker's own authorization (identified by its
    /// `home_dc_id`/`home_auth_key`, the same pair it uses for same-DC
    /// sessions) for import into a fresh session in `dc_id`.
    ///
    /// `home_dc_id`/`home_auth_key` scope this call to one worker's identity;
    /// without them a transport shared by multiple workers (as `streamgw`'s
    /// `Engine` does — one `HttpBackendTransport`, one `SessionPool` per
    /// worker) would have no way to know which worker's home session should
    /// perform the export.
    async fn export_authorization(
        &self,
        home_dc_id: i32,
        home_auth_key: &[u8],
        dc_id: i32,
    ) -> Result<ExportedAuthorization>;

    /// Opens a new session to `dc_id` authenticated with `auth_key`. The
    /// session is not started yet; callers call `start()` on it.
    async fn open_session(
        &self,
        dc_id: i32,
        auth_key: Vec<u8>,
    ) -> Result<Box<dyn BackendSession>>;
}

/// An authenticated, long-lived transport to one datacenter.
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// The datacenter this session is authenticated against.
    fn dc_id(&self) -> i32;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Completes the Import-Authorization handshake against this session.
    async fn import_authorization(&self, id: i64, bytes: Bytes) -> Result<()>;

    /// Fetches one chunk of `location`'s bytes. `offset` must be a multiple
    /// of the caller's chunk size; `limit` should equal the chunk size.
    async fn get_file(&self, location: &FileLocator, offset: i64, limit: i32)
        -> Result<FileChunk>;
}
