#![deny(
    asm_sub_register,
    deprecated,
    missing_abi,
    unsafe_code,
    unused_macros,
    unused_must_use,
    unused_unsafe
)]
#![deny(clippy::from_over_into, clippy::needless_question_mark)]
#![cfg_attr(
    not(debug_assertions),
    deny(unused_imports, unused_mut, unused_variables,)
)]

pub mod credentials;
pub mod error;
pub mod http_transport;
pub mod locator;
pub mod session;
pub mod transport;
pub mod util;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use credentials::Credentials;
pub use error::{AuthError, Error};
pub use http_transport::HttpBackendTransport;
pub use locator::{ChatPeer, ChatPhotoLocation, FileLocator, FileType};
pub use session::SessionPool;
pub use transport::{BackendSession, BackendTransport, ExportedAuthorization, FileChunk};
