//! In-process stand-in for a real peer-connection stack.
//!
//! Offers and answers are JSON objects whose `sdp` names an entry in a shared
//! `LoopbackHub`; applying the answer opens a `DirectChannel::pair` between
//! the two connectors. Used by tests and demos that need the full
//! negotiation path without a network.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use peerbeam_transfer::{DEFAULT_SEND_WINDOW, DirectChannel};
use peerbeam_types::Role;

use crate::connector::{ConnectorEvent, PeerConnector};
use crate::error::NegotiationError;

const SDP_PREFIX: &str = "loopback:";

struct PendingOffer {
    offerer: mpsc::UnboundedSender<ConnectorEvent>,
    answerer: Option<mpsc::UnboundedSender<ConnectorEvent>>,
}

#[derive(Default)]
struct HubInner {
    offers: HashMap<String, PendingOffer>,
    fail_next_offer: bool,
}

/// Shared "network" that loopback connectors meet on.
#[derive(Clone)]
pub struct LoopbackHub {
    inner: Arc<Mutex<HubInner>>,
    window: usize,
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_WINDOW)
    }
}

impl LoopbackHub {
    /// `window` bounds each direction of the channels this hub opens.
    pub fn new(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner::default())),
            window,
        }
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            hub: self.clone(),
            role: None,
            events: None,
            offer_id: None,
            peer: None,
        }
    }

    /// Make the next `create_offer` on any connector fail.
    pub async fn fail_next_offer(&self) {
        self.inner.lock().await.fail_next_offer = true;
    }

    /// Offers created but not yet completed by an answer.
    pub async fn pending_offers(&self) -> usize {
        self.inner.lock().await.offers.len()
    }
}

pub struct LoopbackConnector {
    hub: LoopbackHub,
    role: Option<Role>,
    events: Option<mpsc::UnboundedSender<ConnectorEvent>>,
    offer_id: Option<String>,
    /// Event sink of the other connector once the two have met
    peer: Option<mpsc::UnboundedSender<ConnectorEvent>>,
}

impl LoopbackConnector {
    fn events(&self) -> Result<&mpsc::UnboundedSender<ConnectorEvent>, NegotiationError> {
        self.events.as_ref().ok_or(NegotiationError::NoEndpoint)
    }

    fn announce_candidate(&self, id: &str) {
        if let (Some(events), Some(role)) = (&self.events, self.role) {
            let side = match role {
                Role::Sender => "offerer",
                Role::Receiver => "answerer",
            };
            let _ = events.send(ConnectorEvent::LocalCandidate(json!({
                "candidate": format!("loopback {id} {side}"),
                "sdpMid": "0",
            })));
        }
    }
}

fn description(kind: &str, id: &str) -> Value {
    json!({ "type": kind, "sdp": format!("{SDP_PREFIX}{id}") })
}

fn description_id(value: &Value) -> Result<String, NegotiationError> {
    value
        .get("sdp")
        .and_then(Value::as_str)
        .and_then(|sdp| sdp.strip_prefix(SDP_PREFIX))
        .map(str::to_string)
        .ok_or_else(|| NegotiationError::RemoteDescription(format!("not a loopback description: {value}")))
}

#[async_trait]
impl PeerConnector for LoopbackConnector {
    async fn open(
        &mut self,
        role: Role,
        events: mpsc::UnboundedSender<ConnectorEvent>,
    ) -> Result<(), NegotiationError> {
        self.close().await;
        self.role = Some(role);
        self.events = Some(events);
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<Value, NegotiationError> {
        let offerer = self.events()?.clone();
        let id = Uuid::new_v4().simple().to_string();
        {
            let mut hub = self.hub.inner.lock().await;
            if std::mem::take(&mut hub.fail_next_offer) {
                return Err(NegotiationError::Description("loopback offer refused".into()));
            }
            hub.offers.insert(
                id.clone(),
                PendingOffer {
                    offerer,
                    answerer: None,
                },
            );
        }
        self.offer_id = Some(id.clone());
        self.announce_candidate(&id);
        Ok(description("offer", &id))
    }

    async fn accept_offer(&mut self, offer: Value) -> Result<Value, NegotiationError> {
        let answerer = self.events()?.clone();
        let id = description_id(&offer)?;
        {
            let mut hub = self.hub.inner.lock().await;
            let pending = hub
                .offers
                .get_mut(&id)
                .ok_or_else(|| NegotiationError::RemoteDescription(format!("unknown offer {id}")))?;
            if pending.answerer.is_some() {
                return Err(NegotiationError::RemoteDescription(format!("offer {id} already answered")));
            }
            pending.answerer = Some(answerer);
            self.peer = Some(pending.offerer.clone());
        }
        self.offer_id = Some(id.clone());
        self.announce_candidate(&id);
        Ok(description("answer", &id))
    }

    async fn apply_answer(&mut self, answer: Value) -> Result<(), NegotiationError> {
        let events = self.events()?.clone();
        let id = description_id(&answer)?;
        if self.offer_id.as_deref() != Some(id.as_str()) {
            return Err(NegotiationError::RemoteDescription(format!("answer {id} does not match our offer")));
        }

        let pending = self
            .hub
            .inner
            .lock()
            .await
            .offers
            .remove(&id)
            .ok_or_else(|| NegotiationError::RemoteDescription(format!("offer {id} is gone")))?;
        let answerer = pending
            .answerer
            .ok_or_else(|| NegotiationError::RemoteDescription(format!("offer {id} was never accepted")))?;

        let (near, far) = DirectChannel::pair(self.hub.window);
        let _ = events.send(ConnectorEvent::ChannelOpen(near));
        let _ = answerer.send(ConnectorEvent::ChannelOpen(far));
        self.peer = Some(answerer);
        Ok(())
    }

    async fn add_remote_candidate(&mut self, candidate: Value) -> Result<(), NegotiationError> {
        self.events()?;
        match candidate.get("candidate").and_then(Value::as_str) {
            Some(_) => Ok(()),
            None => Err(NegotiationError::Candidate(candidate.to_string())),
        }
    }

    async fn close(&mut self) {
        if let Some(peer) = self.peer.take() {
            let _ = peer.send(ConnectorEvent::ChannelClosed);
        }
        if let (Some(Role::Sender), Some(id)) = (self.role, self.offer_id.as_ref()) {
            self.hub.inner.lock().await.offers.remove(id);
        }
        self.offer_id = None;
        self.events = None;
        self.role = None;
    }
}
