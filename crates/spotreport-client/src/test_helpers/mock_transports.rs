//! In-memory transports for testing without a server

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use spotreport_core::models::{ArtifactKind, MediaKind, ReportPayload, SpotTarget, UploadTicket};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::transport::{
    DeletionTransport, ReportConfirmation, ReportTransport, TokenProvider, TransportError,
    UploadTransport,
};

fn status_error(status: u16) -> TransportError {
    TransportError::Status {
        status,
        body: format!("scripted {}", status),
    }
}

/// Upload transport that records `url:<kind>` and `put:<kind>` calls.
///
/// PUT statuses are consumed in order and default to 200 once exhausted.
#[derive(Default)]
pub struct FakeUploadTransport {
    log: Mutex<Vec<String>>,
    put_statuses: Mutex<VecDeque<u16>>,
    put_bodies: Mutex<Vec<Bytes>>,
    failing_urls: Mutex<HashSet<ArtifactKind>>,
    put_gate: Option<Arc<Semaphore>>,
    issued: AtomicUsize,
    expired_tickets: AtomicBool,
}

impl FakeUploadTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_put_statuses(statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            put_statuses: Mutex::new(statuses.iter().copied().collect()),
            ..Default::default()
        })
    }

    /// Every PUT waits for a permit from `gate`.
    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            put_gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn fail_url_requests(&self, kind: ArtifactKind) {
        self.failing_urls.lock().unwrap().insert(kind);
    }

    /// Issue tickets whose `expires_at` is already in the past.
    pub fn issue_expired_tickets(&self) {
        self.expired_tickets.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn url_requests(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("url:")).count()
    }

    pub fn put_bodies(&self) -> Vec<Bytes> {
        self.put_bodies.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadTransport for FakeUploadTransport {
    async fn request_upload_url(
        &self,
        target: &SpotTarget,
        kind: ArtifactKind,
    ) -> Result<UploadTicket, TransportError> {
        self.log.lock().unwrap().push(format!("url:{}", kind));
        if self.failing_urls.lock().unwrap().contains(&kind) {
            return Err(TransportError::Network("connection reset".to_string()));
        }

        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let issued_at = Utc::now();
        let expires_at = self
            .expired_tickets
            .load(Ordering::SeqCst)
            .then(|| issued_at - chrono::Duration::seconds(1));
        Ok(UploadTicket {
            artifact_kind: kind,
            remote_key: format!("{}/{}/{}-{}", target.country, target.spot, kind, n),
            upload_url: format!("https://blob.test/upload/{}", n),
            issued_at,
            expires_at,
        })
    }

    async fn put_blob(
        &self,
        ticket: &UploadTicket,
        data: Bytes,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("put:{}", ticket.artifact_kind));
        if let Some(gate) = &self.put_gate {
            gate.acquire().await.unwrap().forget();
        }
        self.put_bodies.lock().unwrap().push(data);

        let status = self.put_statuses.lock().unwrap().pop_front().unwrap_or(200);
        match status {
            200 => Ok(()),
            other => Err(status_error(other)),
        }
    }
}

/// Records deletions; keys in `failing` error out.
#[derive(Default)]
pub struct FakeDeletionTransport {
    deleted: Mutex<Vec<(String, MediaKind)>>,
    failing: HashSet<String>,
    attempts: AtomicUsize,
}

impl FakeDeletionTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_for(keys: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn deleted(&self) -> Vec<(String, MediaKind)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeletionTransport for FakeDeletionTransport {
    async fn delete_media(
        &self,
        remote_key: &str,
        storage_type: MediaKind,
    ) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(remote_key) {
            return Err(status_error(500));
        }
        self.deleted
            .lock()
            .unwrap()
            .push((remote_key.to_string(), storage_type));
        Ok(())
    }
}

/// Hands out `token-1`, `token-2`, ...
#[derive(Default)]
pub struct FakeTokenProvider {
    fetches: AtomicUsize,
    failing: bool,
}

impl FakeTokenProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            ..Default::default()
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for FakeTokenProvider {
    async fn fetch_token(&self) -> Result<String, TransportError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing {
            return Err(TransportError::Network("offline".to_string()));
        }
        Ok(format!("token-{}", n))
    }
}

/// Answers report posts with scripted statuses, 200 once exhausted.
#[derive(Default)]
pub struct FakeReportTransport {
    statuses: Mutex<VecDeque<u16>>,
    requests: Mutex<Vec<(ReportPayload, String)>>,
    delay: Option<Duration>,
}

impl FakeReportTransport {
    pub fn with_statuses(statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.iter().copied().collect()),
            ..Default::default()
        })
    }

    /// Succeeds after sleeping for `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn requests(&self) -> Vec<(ReportPayload, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportTransport for FakeReportTransport {
    async fn post_report(
        &self,
        payload: &ReportPayload,
        csrf_token: &str,
    ) -> Result<ReportConfirmation, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push((payload.clone(), csrf_token.to_string()));
            requests.len()
        };

        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        match status {
            200 | 201 => Ok(ReportConfirmation {
                report_id: Some(format!("report-{}", n)),
                submitted_at: Utc::now(),
            }),
            other => Err(status_error(other)),
        }
    }
}
