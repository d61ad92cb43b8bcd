//! Session Registry
//!
//! Admits downstream clients and creates one session per admitted client.
//! Sessions are owned by their transport handlers; the registry only keeps a
//! count of live sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::admission::{AdmissionError, AlwaysAdmit, MaxSessions};
use super::session::{ClientSession, SessionHandle, SessionReport};
use crate::application::ports::{
    Admission, AdmissionPolicy, ClientInfo, ClientSink, UpstreamDialer,
};
use crate::domain::session::SessionId;
use crate::infrastructure::config::RelayConfig;
use crate::infrastructure::metrics;
use crate::infrastructure::twelvedata::ConnectorConfig;

/// Admission and accounting for downstream sessions.
pub struct SessionRegistry<D: UpstreamDialer> {
    config: Arc<ConnectorConfig>,
    dialer: Arc<D>,
    policy: Box<dyn AdmissionPolicy>,
    active: AtomicUsize,
}

impl<D: UpstreamDialer> SessionRegistry<D> {
    /// Registry that admits every client.
    #[must_use]
    pub fn new(config: ConnectorConfig, dialer: D) -> Self {
        Self {
            config: Arc::new(config),
            dialer: Arc::new(dialer),
            policy: Box::new(AlwaysAdmit),
            active: AtomicUsize::new(0),
        }
    }

    /// Registry configured from the relay settings, including the session cap.
    #[must_use]
    pub fn from_relay_config(config: &RelayConfig, dialer: D) -> Self {
        let registry = Self::new(ConnectorConfig::from_relay_config(config), dialer);
        match config.server.max_sessions {
            0 => registry,
            limit => registry.with_policy(MaxSessions(limit)),
        }
    }

    /// Replace the admission policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl AdmissionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Admit `client` and start its session.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionError::Rejected` when the policy refuses the client.
    /// No upstream connection is opened in that case.
    pub fn accept_client<S: ClientSink>(
        &self,
        info: &ClientInfo,
        client: S,
    ) -> Result<SessionHandle, AdmissionError> {
        let previous = self.active.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self.evaluate(info, previous) {
            self.active.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }

        metrics::session_attached();

        Ok(ClientSession::attach(
            SessionId::new(),
            info,
            client,
            Arc::clone(&self.config),
            Arc::clone(&self.dialer),
        ))
    }

    /// Run the admission policy against the current session count without
    /// starting a session.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionError::Rejected` when the policy refuses the client.
    pub fn check_admission(&self, info: &ClientInfo) -> Result<(), AdmissionError> {
        self.evaluate(info, self.active_sessions())
    }

    fn evaluate(&self, info: &ClientInfo, active: usize) -> Result<(), AdmissionError> {
        match self.policy.admit(info, active) {
            Admission::Admit => Ok(()),
            Admission::Reject(reason) => {
                metrics::record_session_rejected();
                tracing::warn!(
                    peer = ?info.peer,
                    reason = %reason,
                    "Client session rejected"
                );
                Err(AdmissionError::Rejected(reason))
            }
        }
    }

    /// Tear down a session after its client transport closed.
    pub async fn on_client_transport_close(&self, handle: SessionHandle) -> SessionReport {
        let report = handle.detach().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        metrics::session_detached();
        report
    }

    /// Number of live sessions.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Connector settings shared by every session.
    #[must_use]
    pub fn connector_config(&self) -> &ConnectorConfig {
        &self.config
    }
}

impl<D: UpstreamDialer> std::fmt::Debug for SessionRegistry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("endpoint", &self.config.endpoint)
            .field("active", &self.active_sessions())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        ClientSinkError, MockAdmissionPolicy, UpstreamError, UpstreamFrame, UpstreamLink,
    };
    use crate::domain::quote::InstrumentSet;
    use crate::infrastructure::config::{Credentials, UpstreamEndpoint};
    use async_trait::async_trait;
    use serde_json::Value;

    struct StalledDialer;

    struct NoLink;

    #[async_trait]
    impl UpstreamLink for NoLink {
        async fn send_text(&mut self, _text: String) -> Result<(), UpstreamError> {
            Ok(())
        }
        async fn send_pong(&mut self, _payload: Vec<u8>) -> Result<(), UpstreamError> {
            Ok(())
        }
        async fn next_frame(&mut self) -> Option<Result<UpstreamFrame, UpstreamError>> {
            None
        }
        async fn close(&mut self) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    #[async_trait]
    impl UpstreamDialer for StalledDialer {
        type Link = NoLink;

        async fn dial(&self, _url: &str) -> Result<NoLink, UpstreamError> {
            std::future::pending().await
        }
    }

    struct NullSink;

    #[async_trait]
    impl ClientSink for NullSink {
        async fn emit(&mut self, _event: &str, _payload: &Value) -> Result<(), ClientSinkError> {
            Ok(())
        }
    }

    fn registry() -> SessionRegistry<StalledDialer> {
        SessionRegistry::new(
            ConnectorConfig::new(
                UpstreamEndpoint::new(
                    "ws://127.0.0.1:1/price".to_string(),
                    Credentials::new("k".to_string()),
                ),
                InstrumentSet::default(),
            ),
            StalledDialer,
        )
    }

    #[tokio::test]
    async fn counts_sessions() {
        let registry = registry();
        let a = registry.accept_client(&ClientInfo::default(), NullSink).unwrap();
        let b = registry.accept_client(&ClientInfo::default(), NullSink).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.active_sessions(), 2);

        registry.on_client_transport_close(a).await;
        assert_eq!(registry.active_sessions(), 1);
        registry.on_client_transport_close(b).await;
        assert_eq!(registry.active_sessions(), 0);
    }

    #[tokio::test]
    async fn policy_sees_count_before_admission() {
        let mut policy = MockAdmissionPolicy::new();
        policy
            .expect_admit()
            .withf(|_, active| *active == 0)
            .times(1)
            .returning(|_, _| Admission::Admit);
        policy
            .expect_admit()
            .withf(|_, active| *active == 1)
            .times(1)
            .returning(|_, _| Admission::Reject("full".to_string()));

        let registry = registry().with_policy(policy);
        let handle = registry.accept_client(&ClientInfo::default(), NullSink).unwrap();

        let rejected = registry.accept_client(&ClientInfo::default(), NullSink);
        assert_eq!(
            rejected.unwrap_err(),
            AdmissionError::Rejected("full".to_string())
        );
        assert_eq!(registry.active_sessions(), 1);

        registry.on_client_transport_close(handle).await;
    }

    #[tokio::test]
    async fn session_cap_from_config() {
        let mut relay = RelayConfig::new(Credentials::new("k".to_string()));
        relay.server.max_sessions = 1;
        let registry = SessionRegistry::from_relay_config(&relay, StalledDialer);

        assert!(registry.check_admission(&ClientInfo::default()).is_ok());
        let first = registry.accept_client(&ClientInfo::default(), NullSink).unwrap();
        assert!(registry.check_admission(&ClientInfo::default()).is_err());
        assert!(registry.accept_client(&ClientInfo::default(), NullSink).is_err());

        registry.on_client_transport_close(first).await;
        let again = registry.accept_client(&ClientInfo::default(), NullSink).unwrap();
        registry.on_client_transport_close(again).await;
    }
}
