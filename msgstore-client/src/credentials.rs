//! Access credentials for the MsgStore backend.

use std::env;

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::util::from_hex;

/// Credentials needed to stand up a worker's home session and, from there,
/// bootstrap sessions in any other datacenter.
#[derive(Clone, Derivative, Deserialize, Serialize)]
#[derivative(Debug)]
pub struct Credentials {
    /// Base URL of the backend RPC endpoint.
    ///
    /// This is the `MSGSTORE_BACKEND_URL` environment variable.
    #[serde(alias = "MSGSTORE_BACKEND_URL")]
    pub backend_url: String,

    /// The datacenter this worker is already authorized in.
    ///
    /// This is the `MSGSTORE_HOME_DC_ID` environment variable.
    #[serde(alias = "MSGSTORE_HOME_DC_ID")]
    pub home_dc_id: i32,

    /// The worker's existing authorization key, hex-encoded.
    ///
    /// Reused as-is for same-DC sessions; used to mint cross-DC sessions via
    /// the Import-Authorization handshake.
    ///
    /// This is the `MSGSTORE_AUTH_KEY` environment variable.
    #[derivative(Debug = "ignore")]
    #[serde(alias = "MSGSTORE_AUTH_KEY")]
    pub auth_key_hex: String,

    /// Bearer token authenticating this worker's RPC calls to the backend.
    ///
    /// This is the `MSGSTORE_API_TOKEN` environment variable.
    #[derivative(Debug = "ignore")]
    #[serde(alias = "MSGSTORE_API_TOKEN")]
    pub api_token: String,
}

impl Credentials {
    /// Tries to load credentials from the environment.
    pub fn load_from_env() -> Option<Self> {
        let backend_url = env::var("MSGSTORE_BACKEND_URL").ok()?;
        let home_dc_id = env::var("MSGSTORE_HOME_DC_ID").ok()?.parse().ok()?;
        let auth_key_hex = env::var("MSGSTORE_AUTH_KEY").ok()?;
        let api_token = env::var("MSGSTORE_API_TOKEN").ok()?;

        Some(Self {
            backend_url,
            home_dc_id,
            auth_key_hex,
            api_token,
        })
    }

    /// Decodes the home authorization key from its hex representation.
    pub fn auth_key(&self) -> Result<Vec<u8>, hex::FromHexError> {
        from_hex(&self.auth_key_hex)
    }
}
