//! The Session Pool: lazily-created, reused, per-datacenter sessions for
//! one worker, and the Import-Authorization state machine that bootstraps
//! cross-datacenter sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};

use crate::error::{AuthError, Error};
use crate::locator::FileLocator;
use crate::transport::BackendTransport;
use crate::transport::BackendSession;

/// At most one session per datacenter, for one worker.
///
/// Creation is coalesced per `dc_id`: concurrent first requests for the
/// same datacenter share a single [`OnceCell`], so exactly one session (and,
/// on the cross-DC path, exactly one `Auth.create()` call) is produced no
/// matter how many callers race for it.
pub struct SessionPool {
    transport: Arc<dyn BackendTransport>,
    home_dc_id: i32,
    home_auth_key: Vec<u8>,
    auth_retry_limit: u32,
    auth_settle_delay: Duration,
    sessions: Mutex<HashMap<i32, Arc<OnceCell<Arc<dyn BackendSession>>>>>,
}

impl SessionPool {
    pub fn new(
        transport: Arc<dyn BackendTransport>,
        home_dc_id: i32,
        home_auth_key: Vec<u8>,
        auth_retry_limit: u32,
        auth_settle_delay: Duration,
    ) -> Self {
        Self {
            transport,
            home_dc_id,
            home_auth_key,
            auth_retry_limit,
            auth_settle_delay,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `locator`'s datacenter, creating (and, if
    /// cross-DC, authenticating) it on first use.
    pub async fn session_for(
        &self,
        locator: &FileLocator,
    ) -> Result<Arc<dyn BackendSession>, AuthError> {
        let dc_id = locator.dc_id;

        let cell = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry(dc_id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        cell.get_or_try_init(|| self.create_session(dc_id))
            .await
            .map(Arc::clone)
    }

    async fn create_session(&self, dc_id: i32) -> Result<Arc<dyn BackendSession>, AuthError> {
        let map_transport_err = |source: Error| AuthError::Transport {
            dc_id,
            source: Arc::new(source),
        };

        if dc_id == self.home_dc_id {
            let session = self
                .transport
                .open_session(dc_id, self.home_auth_key.clone())
                .await
                .map_err(map_transport_err)?;
            session.start().await.map_err(map_transport_err)?;
            tracing::debug!(dc_id, "reusing home authorization for same-dc session");
            return Ok(Arc::from(session));
        }

        let auth_key = self
            .transport
            .auth_create(dc_id)
            .await
            .map_err(map_transport_err)?;
        let session = self
            .transport
            .open_session(dc_id, auth_key)
            .await
            .map_err(map_transport_err)?;
        session.start().await.map_err(map_transport_err)?;
        tracing::debug!(dc_id, "created new media session, importing authorization");

        self.authenticate(dc_id, session.as_ref()).await?;

        Ok(Arc::from(session))
    }

    /// `Exporting -> Importing -> Authorized`, with up to
    /// [`Self::auth_retry_limit`] attempts counted only against
    /// `AuthBytesInvalid`. Flood-control and generic transport errors are
    /// retried without consuming an attempt.
    async fn authenticate(
        &self,
        dc_id: i32,
        session: &dyn BackendSession,
    ) -> Result<(), AuthError> {
        let mut attempts = 0u32;

        loop {
            let export = match self
                .transport
                .export_authorization(self.home_dc_id, &self.home_auth_key, dc_id)
                .await
            {
                Ok(export) => export,
                Err(Error::FloodWait(d)) => {
                    tracing::warn!(dc_id, ?d, "flood wait exporting authorization");
                    tokio::time::sleep(d + Duration::from_secs(1)).await;
                    continue;
                }
                Err(e) => {
                    tracing::error!(dc_id, error = %e, "transport error exporting authorization");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            tokio::time::sleep(self.auth_settle_delay).await;

            match session.import_authorization(export.id, export.bytes).await {
                Ok(()) => {
                    tracing::info!(dc_id, "authorization imported successfully");
                    return Ok(());
                }
                Err(Error::AuthBytesInvalid) => {
                    attempts += 1;
                    tracing::warn!(dc_id, attempts, "invalid auth bytes");
                    if attempts >= self.auth_retry_limit {
                        let _ = session.stop().await;
                        return Err(AuthError::Exhausted {
                            dc_id,
                            attempts,
                            source: Arc::new(Error::AuthBytesInvalid),
                        });
                    }
                }
                Err(Error::FloodWait(d)) => {
                    tracing::warn!(dc_id, ?d, "flood wait importing authorization");
                    tokio::time::sleep(d + Duration::from_secs(1)).await;
                }
                Err(e) => {
                    tracing::error!(dc_id, error = %e, "rpc error importing authorization");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::FileLocator;
    use crate::mock::{MockBackendTransport, MockScript};
    use bytes::Bytes;
    use std::sync::atomic::Ordering;

    fn locator_in_dc(dc_id: i32) -> FileLocator {
        FileLocator::document(dc_id, 1, 1, Bytes::from_static(b"ref"), String::new())
    }

    #[tokio::test]
    async fn same_dc_session_reuses_home_auth_without_importing() {
        let transport = Arc::new(MockBackendTransport::new(
            locator_in_dc(1),
            MockScript::default(),
        ));
        let pool = SessionPool::new(transport, 1, vec![1, 2, 3], 3, Duration::from_millis(1));

        let session = pool.session_for(&locator_in_dc(1)).await.unwrap();
        assert_eq!(session.dc_id(), 1);
    }

    #[tokio::test]
    async fn cross_dc_import_succeeds_on_third_attempt() {
        let transport = Arc::new(MockBackendTransport::new(
            locator_in_dc(2),
            MockScript {
                import_failures_before_success: 2,
                ..Default::default()
            },
        ));
        let auth_create_calls = transport.auth_create_calls.clone();

        let pool = SessionPool::new(transport, 1, vec![1, 2, 3], 3, Duration::from_millis(1));

        let session = pool.session_for(&locator_in_dc(2)).await.unwrap();
        assert_eq!(session.dc_id(), 2);
        assert_eq!(auth_create_calls.load(Ordering::SeqCst), 1);

        // Reusing: no second Auth.create() call.
        let session2 = pool.session_for(&locator_in_dc(2)).await.unwrap();
        assert_eq!(session2.dc_id(), 2);
        assert_eq!(auth_create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cross_dc_import_exhausts_after_three_failures() {
        let transport = Arc::new(MockBackendTransport::new(
            locator_in_dc(2),
            MockScript {
                import_failures_before_success: 5,
                ..Default::default()
            },
        ));
        let pool = SessionPool::new(transport, 1, vec![1, 2, 3], 3, Duration::from_millis(1));

        let err = pool.session_for(&locator_in_dc(2)).await.unwrap_err();
        match err {
            AuthError::Exhausted { attempts, dc_id, .. } => {
                assert_eq!(attempts, 3);
                assert_eq!(dc_id, 2);
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_first_requests_create_exactly_one_session() {
        let transport = Arc::new(MockBackendTransport::new(
            locator_in_dc(2),
            MockScript::default(),
        ));
        let auth_create_calls = transport.auth_create_calls.clone();
        let pool = Arc::new(SessionPool::new(
            transport,
            1,
            vec![1, 2, 3],
            3,
            Duration::from_millis(1),
        ));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.session_for(&locator_in_dc(2)).await.unwrap().dc_id()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 2);
        }

        assert_eq!(auth_create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn export_authorization_is_scoped_to_each_worker_own_identity() {
        // Two `SessionPool`s (two workers) sharing one transport — the shape
        // `streamgw::Engine` builds when multiple workers are configured —
        // must each export under their own home identity, not an ambiguous
        // shared one.
        let transport = Arc::new(MockBackendTransport::new(
            locator_in_dc(2),
            MockScript::default(),
        ));
        let export_calls = transport.export_authorization_calls.clone();

        let worker_a = SessionPool::new(
            transport.clone(),
            1,
            vec![0xAA, 0xAA],
            3,
            Duration::from_millis(1),
        );
        let worker_b = SessionPool::new(transport, 5, vec![0xBB, 0xBB], 3, Duration::from_millis(1));

        worker_a.session_for(&locator_in_dc(2)).await.unwrap();
        worker_b.session_for(&locator_in_dc(2)).await.unwrap();

        let calls = export_calls.lock().expect("mutex poisoned");
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&(1, vec![0xAA, 0xAA], 2)));
        assert!(calls.contains(&(5, vec![0xBB, 0xBB], 2)));
    }
}
