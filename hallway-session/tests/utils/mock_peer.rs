use anyhow::{Result, bail};
use async_trait::async_trait;
use hallway_core::{IceCandidate, SessionDescription};
use hallway_session::{LinkState, MediaTrack, PeerConnection, PeerConnectionFactory, TransportEvent};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Scripted peer connection.
///
/// Emits `candidates` local candidates whenever it generates a description, reports
/// `Connected` once both descriptions are installed, and refuses remote candidates until a
/// remote description is set.
pub struct MockPeerConnection {
    label: String,
    candidates: usize,
    fail_answer: bool,
    events: mpsc::Sender<TransportEvent>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    remote_sets: AtomicUsize,
    applied: Mutex<Vec<IceCandidate>>,
    tracks: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockPeerConnection {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Remote candidates in the order they were added.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.applied.lock().unwrap().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub fn remote_description_sets(&self) -> usize {
        self.remote_sets.load(Ordering::SeqCst)
    }

    pub fn track_ids(&self) -> Vec<String> {
        self.tracks.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn candidate(label: &str, n: usize) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{label}{n} 1 udp 2122260223 10.0.0.{n} 5000{n} typ host"),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            bail!("peer connection {} is closed", self.label);
        }
        Ok(())
    }

    async fn gather(&self) {
        for n in 0..self.candidates {
            let _ = self
                .events
                .send(TransportEvent::CandidateGenerated(Self::candidate(
                    &self.label,
                    n,
                )))
                .await;
        }
    }

    async fn report_if_negotiated(&self) {
        let negotiated =
            self.local.lock().unwrap().is_some() && self.remote.lock().unwrap().is_some();
        if negotiated {
            let _ = self
                .events
                .send(TransportEvent::StateChanged(LinkState::Connected))
                .await;
        }
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    async fn add_track(&self, track: &MediaTrack) -> Result<()> {
        self.ensure_open()?;
        self.tracks.lock().unwrap().push(track.id().to_string());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.ensure_open()?;
        let offer = SessionDescription::offer(format!("v=0 o={} offer", self.label));
        *self.local.lock().unwrap() = Some(offer.clone());
        self.gather().await;
        Ok(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.ensure_open()?;
        if self.fail_answer {
            bail!("answer generation failed on {}", self.label);
        }
        if self.remote.lock().unwrap().is_none() {
            bail!("cannot answer without a remote offer");
        }
        let answer = SessionDescription::answer(format!("v=0 o={} answer", self.label));
        *self.local.lock().unwrap() = Some(answer.clone());
        self.gather().await;
        self.report_if_negotiated().await;
        Ok(answer)
    }

    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<()> {
        self.ensure_open()?;
        *self.remote.lock().unwrap() = Some(desc.clone());
        self.remote_sets.fetch_add(1, Ordering::SeqCst);
        self.report_if_negotiated().await;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.ensure_open()?;
        if self.remote.lock().unwrap().is_none() {
            bail!("remote description not set");
        }
        self.applied.lock().unwrap().push(candidate.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self
                .events
                .try_send(TransportEvent::StateChanged(LinkState::Closed));
        }
        Ok(())
    }
}

/// Factory that keeps every connection it creates for later inspection.
pub struct MockConnectionFactory {
    candidates: usize,
    fail_answer: bool,
    created: Mutex<Vec<Arc<MockPeerConnection>>>,
}

impl MockConnectionFactory {
    pub fn new(candidates: usize) -> Self {
        Self {
            candidates,
            fail_answer: false,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Connections from this factory cannot produce an answer.
    pub fn failing_answers(candidates: usize) -> Self {
        Self {
            fail_answer: true,
            ..Self::new(candidates)
        }
    }

    pub fn created(&self) -> Vec<Arc<MockPeerConnection>> {
        self.created.lock().unwrap().clone()
    }

    pub fn connection(&self, index: usize) -> Arc<MockPeerConnection> {
        Arc::clone(&self.created.lock().unwrap()[index])
    }
}

#[async_trait]
impl PeerConnectionFactory for MockConnectionFactory {
    async fn create(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Arc<dyn PeerConnection>> {
        let mut created = self.created.lock().unwrap();
        let connection = Arc::new(MockPeerConnection {
            label: format!("pc{}-", created.len()),
            candidates: self.candidates,
            fail_answer: self.fail_answer,
            events,
            local: Mutex::new(None),
            remote: Mutex::new(None),
            remote_sets: AtomicUsize::new(0),
            applied: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        created.push(Arc::clone(&connection));
        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_rejects_candidates_before_remote_description() {
        let (tx, mut rx) = mpsc::channel(16);
        let factory = MockConnectionFactory::new(2);
        let pc = factory.create(tx).await.unwrap();

        let candidate = MockPeerConnection::candidate("x", 1);
        assert!(pc.add_ice_candidate(&candidate).await.is_err());

        pc.create_offer().await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(TransportEvent::CandidateGenerated(_))
        ));

        pc.set_remote_description(&SessionDescription::answer("v=0"))
            .await
            .unwrap();
        pc.add_ice_candidate(&candidate).await.unwrap();
        assert_eq!(factory.connection(0).applied_candidates(), vec![candidate]);
    }
}
