//! Admission policies for downstream connections.

use crate::application::ports::{Admission, AdmissionPolicy, ClientInfo};

/// Refused admission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The policy rejected the client.
    #[error("session rejected: {0}")]
    Rejected(String),
}

/// Admits every client.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAdmit;

impl AdmissionPolicy for AlwaysAdmit {
    fn admit(&self, _client: &ClientInfo, _active_sessions: usize) -> Admission {
        Admission::Admit
    }
}

/// Caps the number of concurrent sessions. A limit of zero means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxSessions(pub usize);

impl AdmissionPolicy for MaxSessions {
    fn admit(&self, _client: &ClientInfo, active_sessions: usize) -> Admission {
        if self.0 == 0 || active_sessions < self.0 {
            Admission::Admit
        } else {
            Admission::Reject(format!("session limit of {} reached", self.0))
        }
    }
}
