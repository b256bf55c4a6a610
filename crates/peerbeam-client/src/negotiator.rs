/// Channel negotiation state machine.
///
/// Pure: `handle` maps (state, input) to (state, effects). The session loop
/// performs the effects and feeds results back in as further inputs.
///
/// ```text
/// Idle -> AwaitingPeer -> Negotiating -> Connected
///              |               |             |
///              +---------------+-------------+--> Disconnected | Failed
/// ```

use std::fmt;

use serde_json::Value;

use peerbeam_types::{ClientMessage, Role, ServerMessage, ShareCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    AwaitingPeer,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
}

impl NegotiationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::AwaitingPeer => "awaiting-peer",
            Self::Negotiating => "negotiating",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// User asked to send; the code is already generated.
    GenerateCode(ShareCode),
    /// User entered a code to receive.
    ConnectWithCode(ShareCode),
    /// Message from the signaling relay.
    Signal(ServerMessage),
    OfferCreated(Value),
    AnswerCreated(Value),
    LocalCandidate(Value),
    ChannelOpen,
    ChannelClosed,
    NegotiationFailed(String),
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Forward to the relay.
    Send(ClientMessage),
    /// Create the local peer endpoint.
    OpenEndpoint(Role),
    CreateOffer,
    /// Apply the remote offer and produce an answer.
    AcceptOffer(Value),
    ApplyAnswer(Value),
    AddRemoteCandidate(Value),
    /// Hand the open channel to the transfer engine.
    BeginTransfer(Role),
    /// Close the endpoint and stop any transfer.
    TearDown,
    Status(String),
}

#[derive(Debug, Default)]
pub struct Negotiator {
    state: NegotiationState,
    role: Option<Role>,
    code: Option<ShareCode>,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn code(&self) -> Option<&ShareCode> {
        self.code.as_ref()
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        use NegotiationState::*;

        if let Input::Reset = input {
            return self.reset();
        }
        if self.state.is_terminal() {
            return Vec::new();
        }

        match (self.state, self.role, input) {
            (Idle, _, Input::GenerateCode(code)) => {
                self.begin(Role::Sender, code.clone());
                vec![
                    Effect::OpenEndpoint(Role::Sender),
                    Effect::Send(ClientMessage::JoinRoom {
                        room_id: code.clone(),
                        is_sender: true,
                    }),
                    Effect::Status(format!("Share code {code} with the receiver")),
                ]
            }
            (Idle, _, Input::ConnectWithCode(code)) => {
                self.begin(Role::Receiver, code.clone());
                vec![
                    Effect::OpenEndpoint(Role::Receiver),
                    Effect::Send(ClientMessage::JoinRoom {
                        room_id: code,
                        is_sender: false,
                    }),
                    Effect::Status("Waiting for the sender".into()),
                ]
            }
            (Idle, _, _) => Vec::new(),

            (AwaitingPeer, Some(Role::Sender), Input::Signal(ServerMessage::ReceiverJoined)) => {
                self.state = Negotiating;
                vec![Effect::Status("Receiver joined, connecting".into()), Effect::CreateOffer]
            }
            (Negotiating, Some(Role::Sender), Input::OfferCreated(offer)) => self.send_with_code(|room_id| {
                ClientMessage::Offer { room_id, offer }
            }),
            (Negotiating, Some(Role::Sender), Input::Signal(ServerMessage::Answer { answer })) => {
                vec![Effect::ApplyAnswer(answer)]
            }

            (AwaitingPeer | Negotiating, Some(Role::Receiver), Input::Signal(ServerMessage::Offer { offer })) => {
                self.state = Negotiating;
                vec![Effect::Status("Offer received, connecting".into()), Effect::AcceptOffer(offer)]
            }
            (Negotiating, Some(Role::Receiver), Input::AnswerCreated(answer)) => self.send_with_code(|room_id| {
                ClientMessage::Answer { room_id, answer }
            }),

            (_, _, Input::LocalCandidate(candidate)) => self.send_with_code(|room_id| {
                ClientMessage::IceCandidate { room_id, candidate }
            }),
            (_, _, Input::Signal(ServerMessage::IceCandidate { candidate })) => {
                vec![Effect::AddRemoteCandidate(candidate)]
            }

            (AwaitingPeer | Negotiating, Some(role), Input::ChannelOpen) => {
                self.state = Connected;
                vec![Effect::Status("Connected".into()), Effect::BeginTransfer(role)]
            }

            (_, _, Input::ChannelClosed) => {
                self.state = Disconnected;
                vec![Effect::TearDown, Effect::Status("Peer connection closed".into())]
            }
            // After Connected the direct channel no longer depends on the room
            (AwaitingPeer | Negotiating, _, Input::Signal(ServerMessage::PeerDisconnected)) => {
                self.state = Disconnected;
                vec![Effect::TearDown, Effect::Status("Peer left before connecting".into())]
            }
            (AwaitingPeer | Negotiating, _, Input::Signal(ServerMessage::RoomOccupied { room_id })) => {
                self.state = Failed;
                vec![
                    Effect::TearDown,
                    Effect::Status(format!("Room {room_id} is already in use")),
                ]
            }
            (_, _, Input::NegotiationFailed(reason)) => {
                self.state = Failed;
                vec![Effect::TearDown, Effect::Status(format!("Connection failed: {reason}"))]
            }

            _ => Vec::new(),
        }
    }

    fn begin(&mut self, role: Role, code: ShareCode) {
        self.state = NegotiationState::AwaitingPeer;
        self.role = Some(role);
        self.code = Some(code);
    }

    fn send_with_code(&self, build: impl FnOnce(ShareCode) -> ClientMessage) -> Vec<Effect> {
        match &self.code {
            Some(code) => vec![Effect::Send(build(code.clone()))],
            None => Vec::new(),
        }
    }

    fn reset(&mut self) -> Vec<Effect> {
        let was_idle = self.state == NegotiationState::Idle;
        *self = Self::default();
        if was_idle {
            return vec![Effect::Status("Ready".into())];
        }
        vec![Effect::TearDown, Effect::Status("Ready".into())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn code() -> ShareCode {
        ShareCode::parse("ab12cd34").unwrap()
    }

    fn sends(effects: &[Effect]) -> Vec<&ClientMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_sender_path() {
        let mut n = Negotiator::new();
        let effects = n.handle(Input::GenerateCode(code()));
        assert_eq!(n.state(), NegotiationState::AwaitingPeer);
        assert_eq!(effects[0], Effect::OpenEndpoint(Role::Sender));
        assert_eq!(
            sends(&effects),
            vec![&ClientMessage::JoinRoom {
                room_id: code(),
                is_sender: true
            }]
        );

        let effects = n.handle(Input::Signal(ServerMessage::ReceiverJoined));
        assert_eq!(n.state(), NegotiationState::Negotiating);
        assert!(effects.contains(&Effect::CreateOffer));

        let offer = json!({"sdp": "o"});
        let effects = n.handle(Input::OfferCreated(offer.clone()));
        assert_eq!(
            effects,
            vec![Effect::Send(ClientMessage::Offer {
                room_id: code(),
                offer
            })]
        );

        let answer = json!({"sdp": "a"});
        assert_eq!(
            n.handle(Input::Signal(ServerMessage::Answer { answer: answer.clone() })),
            vec![Effect::ApplyAnswer(answer)]
        );

        let effects = n.handle(Input::ChannelOpen);
        assert_eq!(n.state(), NegotiationState::Connected);
        assert!(effects.contains(&Effect::BeginTransfer(Role::Sender)));
    }

    #[test]
    fn test_receiver_path() {
        let mut n = Negotiator::new();
        let effects = n.handle(Input::ConnectWithCode(code()));
        assert_eq!(n.state(), NegotiationState::AwaitingPeer);
        assert_eq!(
            sends(&effects),
            vec![&ClientMessage::JoinRoom {
                room_id: code(),
                is_sender: false
            }]
        );

        let offer = json!({"sdp": "o"});
        let effects = n.handle(Input::Signal(ServerMessage::Offer { offer: offer.clone() }));
        assert_eq!(n.state(), NegotiationState::Negotiating);
        assert!(effects.contains(&Effect::AcceptOffer(offer)));

        let answer = json!({"sdp": "a"});
        assert_eq!(
            n.handle(Input::AnswerCreated(answer.clone())),
            vec![Effect::Send(ClientMessage::Answer {
                room_id: code(),
                answer
            })]
        );

        let effects = n.handle(Input::ChannelOpen);
        assert_eq!(n.state(), NegotiationState::Connected);
        assert!(effects.contains(&Effect::BeginTransfer(Role::Receiver)));
    }

    #[test]
    fn test_candidates_flow_both_ways() {
        let mut n = Negotiator::new();
        n.handle(Input::ConnectWithCode(code()));

        let candidate = json!({"candidate": "c1"});
        assert_eq!(
            n.handle(Input::LocalCandidate(candidate.clone())),
            vec![Effect::Send(ClientMessage::IceCandidate {
                room_id: code(),
                candidate: candidate.clone()
            })]
        );
        assert_eq!(
            n.handle(Input::Signal(ServerMessage::IceCandidate { candidate: candidate.clone() })),
            vec![Effect::AddRemoteCandidate(candidate)]
        );
    }

    #[test]
    fn test_idle_ignores_everything_but_start() {
        let mut n = Negotiator::new();
        assert!(n.handle(Input::Signal(ServerMessage::ReceiverJoined)).is_empty());
        assert!(n.handle(Input::ChannelOpen).is_empty());
        assert!(n.handle(Input::LocalCandidate(json!({}))).is_empty());
        assert_eq!(n.state(), NegotiationState::Idle);
    }

    #[test]
    fn test_wrong_role_messages_are_ignored() {
        let mut n = Negotiator::new();
        n.handle(Input::GenerateCode(code()));
        assert!(n.handle(Input::Signal(ServerMessage::Offer { offer: json!({}) })).is_empty());
        assert_eq!(n.state(), NegotiationState::AwaitingPeer);

        let mut r = Negotiator::new();
        r.handle(Input::ConnectWithCode(code()));
        assert!(r.handle(Input::Signal(ServerMessage::ReceiverJoined)).is_empty());
    }

    #[test]
    fn test_channel_closed_disconnects() {
        let mut n = Negotiator::new();
        n.handle(Input::GenerateCode(code()));
        n.handle(Input::Signal(ServerMessage::ReceiverJoined));
        n.handle(Input::ChannelOpen);

        let effects = n.handle(Input::ChannelClosed);
        assert_eq!(n.state(), NegotiationState::Disconnected);
        assert!(effects.contains(&Effect::TearDown));
    }

    #[test]
    fn test_peer_disconnect_only_matters_before_connected() {
        let mut n = Negotiator::new();
        n.handle(Input::ConnectWithCode(code()));
        n.handle(Input::Signal(ServerMessage::PeerDisconnected));
        assert_eq!(n.state(), NegotiationState::Disconnected);

        let mut c = Negotiator::new();
        c.handle(Input::ConnectWithCode(code()));
        c.handle(Input::Signal(ServerMessage::Offer { offer: json!({}) }));
        c.handle(Input::ChannelOpen);
        assert!(c.handle(Input::Signal(ServerMessage::PeerDisconnected)).is_empty());
        assert_eq!(c.state(), NegotiationState::Connected);
    }

    #[test]
    fn test_failure_is_terminal_until_reset() {
        let mut n = Negotiator::new();
        n.handle(Input::GenerateCode(code()));
        n.handle(Input::Signal(ServerMessage::ReceiverJoined));
        let effects = n.handle(Input::NegotiationFailed("boom".into()));
        assert_eq!(n.state(), NegotiationState::Failed);
        assert!(effects.contains(&Effect::TearDown));

        assert!(n.handle(Input::ChannelOpen).is_empty());
        assert!(n.handle(Input::GenerateCode(code())).is_empty());
        assert_eq!(n.state(), NegotiationState::Failed);

        n.handle(Input::Reset);
        assert_eq!(n.state(), NegotiationState::Idle);
        assert_eq!(n.role(), None);
        assert_eq!(n.code(), None);
        n.handle(Input::ConnectWithCode(code()));
        assert_eq!(n.state(), NegotiationState::AwaitingPeer);
    }

    #[test]
    fn test_room_occupied_fails() {
        let mut n = Negotiator::new();
        n.handle(Input::GenerateCode(code()));
        let effects = n.handle(Input::Signal(ServerMessage::RoomOccupied { room_id: code() }));
        assert_eq!(n.state(), NegotiationState::Failed);
        assert!(effects.iter().any(|e| matches!(e, Effect::Status(s) if s.contains("ab12cd34"))));
    }

    #[test]
    fn test_reset_from_idle_has_no_teardown() {
        let mut n = Negotiator::new();
        assert_eq!(n.handle(Input::Reset), vec![Effect::Status("Ready".into())]);
    }
}
