//! A concrete [`BackendTransport`] that speaks a small JSON-RPC-shaped HTTP
//! protocol to a backend RPC endpoint.
//!
//! Built the same way `gha-cache::Api` wraps `reqwest::Client`: a typed
//! request/response struct per call, a shared `check_json` helper that
//! either decodes the body or turns a non-2xx response into a typed error.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderValue, RETRY_AFTER},
    Client, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::locator::{ChatPeer, ChatPhotoLocation, FileLocator, FileType};
use crate::transport::{BackendSession, BackendTransport, ExportedAuthorization, FileChunk};
use crate::util::{from_hex, to_hex};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The user-facing backend transport: one `reqwest::Client` shared by every
/// session this worker opens.
pub struct HttpBackendTransport {
    client: Client,
    rpc_base: Url,
}

impl HttpBackendTransport {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth_header = HeaderValue::from_str(&format!("Bearer {}", credentials.api_token))
            .map_err(Error::init_error)?;
        auth_header.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth_header);

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(Error::init_error)?;

        let rpc_base = Url::parse(&credentials.backend_url).map_err(Error::init_error)?;

        Ok(Self { client, rpc_base })
    }

    fn rpc_url(&self, method: &str) -> Url {
        let mut url = self.rpc_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .expect("backend_url must be a base URL");
            segments.push("rpc");
            segments.push(method);
        }
        url
    }

    async fn call<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        method: &str,
        req: &Req,
    ) -> Result<Resp> {
        let response = self
            .client
            .post(self.rpc_url(method))
            .json(req)
            .send()
            .await?;

        response.check_json().await
    }
}

#[async_trait]
impl BackendTransport for HttpBackendTransport {
    async fn get_file_ids(
        &self,
        channel_id: i64,
        message_id: i64,
    ) -> Result<Option<FileLocator>> {
        let resp: GetFileIdsResponse = self
            .call(
                "GetFileIds",
                &GetFileIdsRequest {
                    channel_id,
                    message_id,
                },
            )
            .await?;

        resp.located.map(TryInto::try_into).transpose()
    }

    async fn auth_create(&self, dc_id: i32) -> Result<Vec<u8>> {
        let resp: AuthCreateResponse = self.call("AuthCreate", &DcRequest { dc_id }).await?;
        from_hex(&resp.auth_key_hex).map_err(Error::init_error)
    }

    async fn export_authorization(
        &self,
        home_dc_id: i32,
        home_auth_key: &[u8],
        dc_id: i32,
    ) -> Result<ExportedAuthorization> {
        let resp: ExportAuthorizationResponse = self
            .call(
                "ExportAuthorization",
                &ExportAuthorizationRequest {
                    home_dc_id,
                    home_auth_key_hex: to_hex(home_auth_key),
                    dc_id,
                },
            )
            .await?;
        let bytes = from_hex(&resp.bytes_hex).map_err(Error::init_error)?;
        Ok(ExportedAuthorization {
            id: resp.id,
            bytes: Bytes::from(bytes),
        })
    }

    async fn open_session(
        &self,
        dc_id: i32,
        auth_key: Vec<u8>,
    ) -> Result<Box<dyn BackendSession>> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            rpc_base: self.rpc_base.clone(),
            dc_id,
            auth_key_hex: to_hex(&auth_key),
        }))
    }
}

/// A session bound to one datacenter. Every call carries the session's own
/// authorization key so the backend can route it to the right datacenter
/// connection; the session itself holds no persistent socket state here
/// since the wire protocol is a collaborator out of scope for this crate.
struct HttpSession {
    client: Client,
    rpc_base: Url,
    dc_id: i32,
    auth_key_hex: String,
}

impl HttpSession {
    fn rpc_url(&self, method: &str) -> Url {
        let mut url = self.rpc_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .expect("backend_url must be a base URL");
            segments.push("dc");
            segments.push(&self.dc_id.to_string());
            segments.push(method);
        }
        url
    }

    async fn call<Req: Serialize + Sync, Resp: DeserializeOwned>(
        &self,
        method: &str,
        req: &Req,
    ) -> Result<Resp> {
        let response = self
            .client
            .post(self.rpc_url(method))
            .json(req)
            .send()
            .await?;

        response.check_json().await
    }
}

#[async_trait]
impl BackendSession for HttpSession {
    fn dc_id(&self) -> i32 {
        self.dc_id
    }

    async fn start(&self) -> Result<()> {
        let _: SessionStartResponse = self
            .call(
                "SessionStart",
                &SessionStartRequest {
                    auth_key_hex: self.auth_key_hex.clone(),
                    is_media: true,
                },
            )
            .await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _: SessionStopResponse = self
            .call(
                "SessionStop",
                &SessionStopRequest {
                    auth_key_hex: self.auth_key_hex.clone(),
                },
            )
            .await?;
        Ok(())
    }

    async fn import_authorization(&self, id: i64, bytes: Bytes) -> Result<()> {
        let _: ImportAuthorizationResponse = self
            .call(
                "ImportAuthorization",
                &ImportAuthorizationRequest {
                    auth_key_hex: self.auth_key_hex.clone(),
                    id,
                    bytes_hex: to_hex(&bytes),
                },
            )
            .await?;
        Ok(())
    }

    async fn get_file(
        &self,
        location: &FileLocator,
        offset: i64,
        limit: i32,
    ) -> Result<FileChunk> {
        let resp: GetFileResponse = self
            .call(
                "GetFile",
                &GetFileRequest {
                    auth_key_hex: self.auth_key_hex.clone(),
                    location: FileLocatorWire::from(location),
                    offset,
                    limit,
                },
            )
            .await?;

        if resp.type_ != "file" {
            tracing::debug!(
                type_ = %resp.type_,
                "GetFile answered with a non-file response; treating as EOF"
            );
            return Ok(FileChunk::eof());
        }

        let bytes = from_hex(&resp.bytes_hex).map_err(Error::init_error)?;
        Ok(FileChunk {
            bytes: Bytes::from(bytes),
        })
    }
}

// Wire types.

#[derive(Serialize)]
struct GetFileIdsRequest {
    channel_id: i64,
    message_id: i64,
}

#[derive(Deserialize)]
struct GetFileIdsResponse {
    located: Option<FileLocatorWire>,
}

#[derive(Serialize)]
struct DcRequest {
    dc_id: i32,
}

#[derive(Deserialize)]
struct AuthCreateResponse {
    auth_key_hex: String,
}

#[derive(Serialize)]
struct ExportAuthorizationRequest {
    home_dc_id: i32,
    home_auth_key_hex: String,
    dc_id: i32,
}

#[derive(Deserialize)]
struct ExportAuthorizationResponse {
    id: i64,
    bytes_hex: String,
}

#[derive(Serialize)]
struct SessionStartRequest {
    auth_key_hex: String,
    is_media: bool,
}

#[derive(Deserialize)]
struct SessionStartResponse {}

#[derive(Serialize)]
struct SessionStopRequest {
    auth_key_hex: String,
}

#[derive(Deserialize)]
struct SessionStopResponse {}

#[derive(Serialize)]
struct ImportAuthorizationRequest {
    auth_key_hex: String,
    id: i64,
    bytes_hex: String,
}

#[derive(Deserialize)]
struct ImportAuthorizationResponse {}

#[derive(Serialize)]
struct GetFileRequest {
    auth_key_hex: String,
    location: FileLocatorWire,
    offset: i64,
    limit: i32,
}

#[derive(Deserialize)]
struct GetFileResponse {
    #[serde(rename = "type")]
    type_: String,
    bytes_hex: String,
}

#[derive(Serialize, Deserialize)]
struct FileLocatorWire {
    dc_id: i32,
    file_type: String,
    media_id: i64,
    access_hash: i64,
    file_reference_hex: String,
    thumbnail_size: String,
    volume_id: Option<i64>,
    local_id: Option<i32>,
    chat_id: Option<i64>,
    chat_access_hash: Option<i64>,
    thumb_big: Option<bool>,
    /// The disambiguated, backend-addressable peer a `ChatPhoto` belongs to
    /// — "user" | "chat" | "channel" — computed from `chat_id`'s sign and
    /// `chat_access_hash`'s zero-ness (`ChatPhotoLocation::chat_peer`).
    /// `chat_id`/`chat_access_hash` above are carried raw for round-tripping
    /// through a `FileLocator`; the backend needs the resolved peer, not the
    /// raw pair, to address a chat photo unambiguously.
    chat_peer_type: Option<String>,
    chat_peer_id: Option<i64>,
    chat_peer_access_hash: Option<i64>,
}

impl From<&FileLocator> for FileLocatorWire {
    fn from(loc: &FileLocator) -> Self {
        let file_type = match loc.file_type {
            FileType::Document => "document",
            FileType::Photo => "photo",
            FileType::ChatPhoto => "chat_photo",
        }
        .to_string();

        let chat_photo = loc.chat_photo.as_ref();
        let peer = chat_photo.map(|c| c.chat_peer());

        let (chat_peer_type, chat_peer_id, chat_peer_access_hash) = match peer {
            Some(ChatPeer::User { user_id, access_hash }) => {
                (Some("user".to_string()), Some(user_id), Some(access_hash))
            }
            Some(ChatPeer::Chat { chat_id }) => (Some("chat".to_string()), Some(chat_id), None),
            Some(ChatPeer::Channel { channel_id, access_hash }) => (
                Some("channel".to_string()),
                Some(channel_id),
                Some(access_hash),
            ),
            None => (None, None, None),
        };

        Self {
            dc_id: loc.dc_id,
            file_type,
            media_id: loc.media_id,
            access_hash: loc.access_hash,
            file_reference_hex: to_hex(&loc.file_reference),
            thumbnail_size: loc.thumbnail_size.clone(),
            volume_id: chat_photo.map(|c| c.volume_id),
            local_id: chat_photo.map(|c| c.local_id),
            chat_id: chat_photo.map(|c| c.chat_id),
            chat_access_hash: chat_photo.map(|c| c.chat_access_hash),
            thumb_big: chat_photo.map(|c| c.thumb_big),
            chat_peer_type,
            chat_peer_id,
            chat_peer_access_hash,
        }
    }
}

impl TryFrom<FileLocatorWire> for FileLocator {
    type Error = Error;

    fn try_from(wire: FileLocatorWire) -> Result<Self> {
        let file_reference = Bytes::from(
            from_hex(&wire.file_reference_hex).map_err(Error::init_error)?,
        );

        match wire.file_type.as_str() {
            "document" => Ok(FileLocator::document(
                wire.dc_id,
                wire.media_id,
                wire.access_hash,
                file_reference,
                wire.thumbnail_size,
            )),
            "photo" => Ok(FileLocator::photo(
                wire.dc_id,
                wire.media_id,
                wire.access_hash,
                file_reference,
                wire.thumbnail_size,
            )),
            "chat_photo" => Ok(FileLocator::chat_photo(
                wire.dc_id,
                ChatPhotoLocation {
                    volume_id: wire.volume_id.unwrap_or_default(),
                    local_id: wire.local_id.unwrap_or_default(),
                    // `chat_peer_*` is a derived, outbound-only encoding
                    // (see `FileLocatorWire`); a `GetFileIds` response
                    // carries the raw `chat_id`/`chat_access_hash` pair,
                    // from which `chat_peer()` is recomputed whenever this
                    // locator is later sent back to the backend.
                    chat_id: wire.chat_id.unwrap_or_default(),
                    chat_access_hash: wire.chat_access_hash.unwrap_or_default(),
                    thumb_big: wire.thumb_big.unwrap_or_default(),
                },
            )),
            other => {
                tracing::warn!("unknown file_type {other:?} from backend");
                Err(Error::UnexpectedResponse {
                    expected: "document|photo|chat_photo",
                })
            }
        }
    }
}

#[async_trait]
trait ResponseExt {
    async fn check_json<T: DeserializeOwned>(self) -> Result<T>;
}

#[async_trait]
impl ResponseExt for reqwest::Response {
    async fn check_json<T: DeserializeOwned>(self) -> Result<T> {
        let status = self.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = self
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(Error::FloodWait(Duration::from_secs(retry_after)));
        }

        if !status.is_success() {
            let message = self.text().await.unwrap_or_default();
            if message.contains("AUTH_BYTES_INVALID") {
                return Err(Error::AuthBytesInvalid);
            }
            return Err(Error::Backend { status, message });
        }

        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|error| Error::Decode {
            status,
            bytes,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::ChatPhotoLocation;

    #[test]
    fn chat_photo_wire_carries_the_resolved_peer_not_the_raw_pair() {
        let loc = FileLocator::chat_photo(
            1,
            ChatPhotoLocation {
                volume_id: 7,
                local_id: 3,
                chat_id: -1_000_100_123_456,
                chat_access_hash: 999,
                thumb_big: true,
            },
        );

        let wire = FileLocatorWire::from(&loc);

        assert_eq!(wire.chat_peer_type.as_deref(), Some("channel"));
        assert_eq!(
            wire.chat_peer_id,
            Some(-1_000_100_123_456i64 & 0x7FFF_FFFF_FFFF_FFFF)
        );
        assert_eq!(wire.chat_peer_access_hash, Some(999));
        // Raw fields still round-trip a `GetFileIds` response unchanged.
        assert_eq!(wire.chat_id, Some(-1_000_100_123_456));
        assert_eq!(wire.chat_access_hash, Some(999));
    }

    #[test]
    fn chat_photo_wire_small_chat_has_no_access_hash() {
        let loc = FileLocator::chat_photo(
            1,
            ChatPhotoLocation {
                volume_id: 1,
                local_id: 1,
                chat_id: -42,
                chat_access_hash: 0,
                thumb_big: false,
            },
        );

        let wire = FileLocatorWire::from(&loc);

        assert_eq!(wire.chat_peer_type.as_deref(), Some("chat"));
        assert_eq!(wire.chat_peer_id, Some(42));
        assert_eq!(wire.chat_peer_access_hash, None);
    }

    #[test]
    fn document_wire_has_no_chat_peer_fields() {
        let loc = FileLocator::document(1, 1, 1, Bytes::from_static(b"ref"), String::new());
        let wire = FileLocatorWire::from(&loc);

        assert_eq!(wire.chat_peer_type, None);
        assert_eq!(wire.chat_peer_id, None);
        assert_eq!(wire.chat_peer_access_hash, None);
    }
}
