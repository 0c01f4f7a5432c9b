//! Configuration loading: CLI flags (`clap`), the credentials file/env
//! fallback, and the worker pool's per-datacenter home authorization.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use msgstore_client::{util::from_hex, Credentials};
use serde::Deserialize;

use crate::engine::{EngineConfig, WorkerCredentials};
use crate::error::{Error, Result};

/// A media streaming gateway that turns MsgStore messages into
/// HTTP-addressable, byte-range-seekable files.
#[derive(Parser, Debug)]
pub struct Args {
    /// JSON file containing the shared backend credentials.
    ///
    /// If this is not specified, credentials are loaded from the
    /// `MSGSTORE_*` environment variables (see `Credentials::load_from_env`).
    #[arg(short = 'c', long)]
    pub credentials_file: Option<PathBuf>,

    /// JSON file listing the worker pool: `[{"home_dc_id": 2,
    /// "auth_key_hex": "..."}, ...]`.
    ///
    /// If this is not specified, a single worker is built from the
    /// credentials' own `home_dc_id`/`auth_key_hex`.
    #[arg(long)]
    pub workers_file: Option<PathBuf>,

    /// Address to listen on.
    #[arg(short = 'l', long, default_value = "127.0.0.1:3000")]
    pub listen: std::net::SocketAddr,

    /// The chat channel in the MsgStore backend that holds streamed files.
    #[arg(long)]
    pub store_channel_id: i64,

    /// How often the FileLocator cache is swept wholesale, in seconds.
    #[arg(long, default_value_t = 1800)]
    pub clean_interval_secs: u64,

    /// Fixed chunk size used for every backend `GetFile` call, in bytes.
    #[arg(long, default_value_t = 1_048_576)]
    pub chunk_size_bytes: i64,

    /// Maximum `AuthBytesInvalid` attempts during cross-DC import-auth.
    #[arg(long, default_value_t = 3)]
    pub auth_retry_limit: u32,

    /// Settle delay between `ExportAuthorization` and `ImportAuthorization`,
    /// in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub auth_settle_delay_ms: u64,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            store_channel_id: self.store_channel_id,
            clean_interval: Duration::from_secs(self.clean_interval_secs),
            chunk_size_bytes: self.chunk_size_bytes,
            auth_retry_limit: self.auth_retry_limit,
            auth_settle_delay: Duration::from_millis(self.auth_settle_delay_ms),
        }
    }

    pub fn load_credentials(&self) -> Result<Credentials> {
        if let Some(path) = &self.credentials_file {
            tracing::info!(?path, "loading credentials from file");
            let bytes = fs::read(path).map_err(Error::init_error)?;
            serde_json::from_slice(&bytes).map_err(Error::init_error)
        } else {
            tracing::info!("loading credentials from environment");
            Credentials::load_from_env()
                .ok_or_else(|| Error::init_error(MissingEnvCredentials))
        }
    }

    pub fn load_workers(&self, credentials: &Credentials) -> Result<Vec<WorkerCredentials>> {
        if let Some(path) = &self.workers_file {
            tracing::info!(?path, "loading worker pool from file");
            let bytes = fs::read(path).map_err(Error::init_error)?;
            let entries: Vec<WorkerCredentialsEntry> =
                serde_json::from_slice(&bytes).map_err(Error::init_error)?;
            entries
                .into_iter()
                .map(|entry| entry.into_worker_credentials())
                .collect()
        } else {
            let auth_key = credentials.auth_key().map_err(Error::init_error)?;
            Ok(vec![WorkerCredentials {
                home_dc_id: credentials.home_dc_id,
                home_auth_key: auth_key,
            }])
        }
    }
}

#[derive(Deserialize)]
struct WorkerCredentialsEntry {
    home_dc_id: i32,
    auth_key_hex: String,
}

impl WorkerCredentialsEntry {
    fn into_worker_credentials(self) -> Result<WorkerCredentials> {
        let home_auth_key = from_hex(&self.auth_key_hex).map_err(Error::init_error)?;
        Ok(WorkerCredentials {
            home_dc_id: self.home_dc_id,
            home_auth_key,
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("no credentials file given and MSGSTORE_* environment variables are unset")]
struct MissingEnvCredentials;
