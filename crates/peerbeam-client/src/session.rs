use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use peerbeam_transfer::{
    DirectChannel, DiskSink, FileMeta, Frame, MemorySink, PayloadSink, ProgressReport, ReceivedFile, ReceiverConfig,
    ReceiverEvent, SenderConfig, TracingLogger, TransferError, run_receiver, run_sender,
};
use peerbeam_types::{ClientMessage, Role, ServerMessage, ShareCode};

use crate::config::ClientConfig;
use crate::connector::{ConnectorEvent, PeerConnector};
use crate::error::{NegotiationError, SessionError};
use crate::negotiator::{Effect, Input, NegotiationState, Negotiator};
use crate::signaling::{self, SignalingLink};

/// Builds a fresh sink for every incoming transfer.
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn PayloadSink> + Send + Sync>;

pub fn memory_sinks() -> SinkFactory {
    Arc::new(|| Box::new(MemorySink::new()))
}

pub fn disk_sinks(dir: impl Into<PathBuf>) -> SinkFactory {
    let dir = dir.into();
    Arc::new(move || Box::new(DiskSink::new(dir.clone())))
}

/// Disk sinks when a download directory is configured, memory otherwise.
pub fn sinks_for(config: &ClientConfig) -> SinkFactory {
    match &config.download_dir {
        Some(dir) => disk_sinks(dir.clone()),
        None => memory_sinks(),
    }
}

// ---------------------------------------------------------------------------
// Selected file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Source {
    Path(PathBuf),
    Memory(Bytes),
}

/// A local file picked for sending.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    meta: FileMeta,
    source: Source,
}

impl SelectedFile {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("{} is not a file", path.display())).into());
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let mime_type = mime_guess::from_path(path).first_or_octet_stream().to_string();

        Ok(Self {
            meta: FileMeta {
                name,
                size: metadata.len(),
                mime_type,
            },
            source: Source::Path(path.to_path_buf()),
        })
    }

    /// In-memory content. The MIME type is guessed from `name` when not given.
    pub fn from_bytes(name: impl Into<String>, mime_type: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        let mime_type = match mime_type {
            Some(m) => m.to_string(),
            None => mime_guess::from_path(&name).first_or_octet_stream().to_string(),
        };
        Self {
            meta: FileMeta {
                name,
                size: bytes.len() as u64,
                mime_type,
            },
            source: Source::Memory(bytes),
        }
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    async fn open(&self) -> io::Result<Box<dyn AsyncRead + Send + Unpin>> {
        match &self.source {
            Source::Path(path) => Ok(Box::new(tokio::fs::File::open(path).await?)),
            Source::Memory(bytes) => Ok(Box::new(io::Cursor::new(bytes.clone()))),
        }
    }
}

// ---------------------------------------------------------------------------
// Observable state
// ---------------------------------------------------------------------------

/// Everything a UI needs to render one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub state: NegotiationState,
    pub role: Option<Role>,
    pub code: Option<ShareCode>,
    pub status: String,
    pub is_connected: bool,
    /// 0.0 ..= 100.0
    pub progress: f64,
    /// `None` while still calculating.
    pub estimated_time_seconds: Option<u64>,
    /// File being sent or received.
    pub file: Option<FileMeta>,
    pub signaling_available: bool,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            state: NegotiationState::Idle,
            role: None,
            code: None,
            status: "Ready".into(),
            is_connected: false,
            progress: 0.0,
            estimated_time_seconds: None,
            file: None,
            signaling_available: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    SelectFile(SelectedFile, Reply<()>),
    GenerateCode(Reply<ShareCode>),
    ConnectWithCode(ShareCode, Reply<()>),
    Reset(Reply<()>),
}

/// UI-facing side of a running session. Dropping it stops the session.
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
    deliveries: mpsc::UnboundedReceiver<ReceivedFile>,
}

impl SessionHandle {
    pub async fn select_file(&self, file: SelectedFile) -> Result<(), SessionError> {
        self.request(|reply| Command::SelectFile(file, reply)).await
    }

    /// Start sending the selected file; returns the code to share.
    pub async fn generate_code(&self) -> Result<ShareCode, SessionError> {
        self.request(Command::GenerateCode).await
    }

    pub async fn connect_with_code(&self, code: &str) -> Result<(), SessionError> {
        let code = ShareCode::parse(code)?;
        self.request(|reply| Command::ConnectWithCode(code, reply)).await
    }

    pub async fn reset_connection(&self) -> Result<(), SessionError> {
        self.request(Command::Reset).await
    }

    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Wait until the view satisfies `ready`.
    pub async fn wait_for(&self, ready: impl FnMut(&SessionView) -> bool) -> Result<SessionView, SessionError> {
        let mut view = self.view.clone();
        let seen = view.wait_for(ready).await.map_err(|_| SessionError::SessionClosed)?;
        Ok(seen.clone())
    }

    /// Files received on this session, in completion order.
    pub fn deliveries(&mut self) -> &mut mpsc::UnboundedReceiver<ReceivedFile> {
        &mut self.deliveries
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::SessionClosed)?;
        response.await.map_err(|_| SessionError::SessionClosed)?
    }
}

// ---------------------------------------------------------------------------
// Session actor
// ---------------------------------------------------------------------------

pub struct Session;

impl Session {
    /// Run a session on its own task, talking to the relay through `link`.
    pub fn spawn<C: PeerConnector>(
        config: ClientConfig,
        link: SignalingLink,
        connector: C,
        sinks: SinkFactory,
    ) -> SessionHandle {
        let (commands, commands_rx) = mpsc::channel(32);
        let (view_tx, view) = watch::channel(SessionView::default());
        let (deliveries_tx, deliveries) = mpsc::unbounded_channel();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (receiver_events_tx, receiver_events_rx) = mpsc::unbounded_channel();

        let actor = SessionActor {
            config,
            connector,
            sinks,
            negotiator: Negotiator::new(),
            selected: None,
            signaling_out: Some(link.outbound),
            signaling_in: Some(link.inbound),
            connector_events: None,
            pending_channel: None,
            transfer: None,
            in_flight: None,
            generation: 0,
            outcomes_tx,
            outcomes_rx,
            receiver_events_tx,
            receiver_events_rx,
            view: view_tx,
            deliveries: deliveries_tx,
        };
        tokio::spawn(actor.run(commands_rx));

        SessionHandle {
            commands,
            view,
            deliveries,
        }
    }

    /// Connect to the configured relay and spawn a session. If the relay
    /// cannot be reached the session still starts, reporting signaling as
    /// unavailable.
    pub async fn connect<C: PeerConnector>(config: ClientConfig, connector: C) -> SessionHandle {
        let link = match signaling::connect(&config.relay_url).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!("{}", e);
                SignalingLink::closed()
            }
        };
        let sinks = sinks_for(&config);
        Self::spawn(config, link, connector, sinks)
    }
}

struct ActiveTransfer {
    generation: u64,
    cancel: CancellationToken,
    progress: watch::Receiver<ProgressReport>,
    /// Holds our end of the channel open after a send finishes
    _keepalive: mpsc::Sender<Frame>,
}

struct TransferOutcome {
    generation: u64,
    role: Role,
    /// Bytes sent, or files delivered
    result: Result<u64, TransferError>,
}

struct SessionActor<C> {
    config: ClientConfig,
    connector: C,
    sinks: SinkFactory,
    negotiator: Negotiator,
    selected: Option<SelectedFile>,

    signaling_out: Option<mpsc::UnboundedSender<ClientMessage>>,
    signaling_in: Option<mpsc::UnboundedReceiver<ServerMessage>>,
    connector_events: Option<mpsc::UnboundedReceiver<ConnectorEvent>>,
    pending_channel: Option<DirectChannel>,

    transfer: Option<ActiveTransfer>,
    /// Name of a file that has started moving but not finished
    in_flight: Option<String>,
    generation: u64,
    outcomes_tx: mpsc::UnboundedSender<TransferOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<TransferOutcome>,
    receiver_events_tx: mpsc::UnboundedSender<ReceiverEvent>,
    receiver_events_rx: mpsc::UnboundedReceiver<ReceiverEvent>,

    view: watch::Sender<SessionView>,
    deliveries: mpsc::UnboundedSender<ReceivedFile>,
}

async fn next_or_pending<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn progress_changed(transfer: &mut Option<ActiveTransfer>) -> bool {
    match transfer {
        Some(transfer) => transfer.progress.changed().await.is_ok(),
        None => std::future::pending().await,
    }
}

/// Queue up to `window` frames ahead of `transport`, forwarding them in
/// order. The pump yields `false` if the transport went away first.
fn windowed(transport: mpsc::Sender<Frame>, window: usize) -> (mpsc::Sender<Frame>, JoinHandle<bool>) {
    let (outbound, mut queued) = mpsc::channel(window.max(1));
    let pump = tokio::spawn(async move {
        while let Some(frame) = queued.recv().await {
            if transport.send(frame).await.is_err() {
                return false;
            }
        }
        true
    });
    (outbound, pump)
}

impl<C: PeerConnector> SessionActor<C> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            // Transfer news first, so a file is known to be in flight before
            // a channel close is handled
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
                Some(event) = self.receiver_events_rx.recv() => self.on_receiver_event(event),
                Some(outcome) = self.outcomes_rx.recv() => self.on_outcome(outcome).await,
                true = progress_changed(&mut self.transfer) => self.on_progress(),
                signal = next_or_pending(&mut self.signaling_in) => self.on_signal(signal).await,
                event = next_or_pending(&mut self.connector_events) => self.on_connector_event(event).await,
            }
        }

        self.tear_down().await;
        tracing::debug!("Session stopped");
    }

    // -- UI actions ---------------------------------------------------------

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::SelectFile(file, reply) => {
                let _ = reply.send(self.select_file(file));
            }
            Command::GenerateCode(reply) => {
                let _ = reply.send(self.generate_code().await);
            }
            Command::ConnectWithCode(code, reply) => {
                let _ = reply.send(self.connect_with_code(code).await);
            }
            Command::Reset(reply) => {
                self.reset().await;
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn select_file(&mut self, file: SelectedFile) -> Result<(), SessionError> {
        let (size, max) = (file.meta.size, self.config.max_file_size);
        if size > max {
            return Err(SessionError::OversizedInput { size, max });
        }
        if !matches!(self.negotiator.state(), NegotiationState::Idle | NegotiationState::AwaitingPeer) {
            return Err(SessionError::AlreadyActive);
        }

        tracing::info!("Selected {} ({} bytes, {})", file.meta.name, size, file.meta.mime_type);
        let meta = file.meta.clone();
        self.selected = Some(file);
        self.view.send_modify(|v| v.file = Some(meta));
        Ok(())
    }

    async fn generate_code(&mut self) -> Result<ShareCode, SessionError> {
        if self.selected.is_none() {
            return Err(SessionError::NoFileSelected);
        }
        self.ready_to_join()?;

        let code = ShareCode::generate();
        tracing::info!("Generated share code {}", code);
        self.drive(Input::GenerateCode(code.clone())).await;
        Ok(code)
    }

    async fn connect_with_code(&mut self, code: ShareCode) -> Result<(), SessionError> {
        self.ready_to_join()?;

        tracing::info!("Joining room {} as receiver", code);
        self.view.send_modify(|v| v.file = None);
        self.drive(Input::ConnectWithCode(code)).await;
        Ok(())
    }

    fn ready_to_join(&self) -> Result<(), SessionError> {
        if self.negotiator.state() != NegotiationState::Idle {
            return Err(SessionError::AlreadyActive);
        }
        if self.signaling_out.is_none() {
            return Err(SessionError::SignalingUnavailable("relay connection is closed".into()));
        }
        Ok(())
    }

    async fn reset(&mut self) {
        self.drive(Input::Reset).await;
        let file = self.selected.as_ref().map(|f| f.meta.clone());
        self.view.send_modify(|v| {
            v.progress = 0.0;
            v.estimated_time_seconds = None;
            v.file = file;
        });
    }

    // -- Negotiation --------------------------------------------------------

    /// Feed one input through the negotiator and carry out its effects,
    /// including any inputs those effects produce.
    async fn drive(&mut self, input: Input) {
        let mut inputs = VecDeque::from([input]);
        while let Some(input) = inputs.pop_front() {
            for effect in self.negotiator.handle(input) {
                if let Some(next) = self.apply(effect).await {
                    let failed = matches!(next, Input::NegotiationFailed(_));
                    inputs.push_back(next);
                    if failed {
                        break;
                    }
                }
            }
        }
        self.sync_view();
    }

    async fn apply(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::Send(msg) => {
                self.send_signal(msg);
                None
            }
            Effect::OpenEndpoint(role) => {
                let (events, events_rx) = mpsc::unbounded_channel();
                self.connector_events = Some(events_rx);
                self.connector.open(role, events).await.err().map(failed)
            }
            Effect::CreateOffer => match self.connector.create_offer().await {
                Ok(offer) => Some(Input::OfferCreated(offer)),
                Err(e) => Some(failed(e)),
            },
            Effect::AcceptOffer(offer) => match self.connector.accept_offer(offer).await {
                Ok(answer) => Some(Input::AnswerCreated(answer)),
                Err(e) => Some(failed(e)),
            },
            Effect::ApplyAnswer(answer) => self.connector.apply_answer(answer).await.err().map(failed),
            Effect::AddRemoteCandidate(candidate) => {
                self.connector.add_remote_candidate(candidate).await.err().map(failed)
            }
            Effect::BeginTransfer(role) => self.begin_transfer(role),
            Effect::TearDown => {
                self.tear_down().await;
                None
            }
            Effect::Status(status) => {
                self.set_status(status);
                None
            }
        }
    }

    fn send_signal(&mut self, msg: ClientMessage) {
        let Some(outbound) = &self.signaling_out else {
            tracing::debug!("Dropping {} while signaling is unavailable", msg.kind());
            return;
        };
        if outbound.send(msg).is_err() {
            self.signaling_lost();
        }
    }

    async fn on_signal(&mut self, signal: Option<ServerMessage>) {
        match signal {
            Some(msg) => {
                tracing::debug!("Relay message {} in state {}", msg.kind(), self.negotiator.state());
                self.drive(Input::Signal(msg)).await;
            }
            None => self.signaling_lost(),
        }
    }

    fn signaling_lost(&mut self) {
        if self.signaling_in.take().is_none() && self.signaling_out.is_none() {
            return;
        }
        self.signaling_out = None;
        tracing::warn!("Signaling relay connection lost");
        self.view.send_modify(|v| {
            v.signaling_available = false;
            v.status = "Signaling server unavailable".into();
        });
    }

    async fn on_connector_event(&mut self, event: Option<ConnectorEvent>) {
        match event {
            Some(ConnectorEvent::LocalCandidate(candidate)) => {
                self.drive(Input::LocalCandidate(candidate)).await;
            }
            Some(ConnectorEvent::ChannelOpen(channel)) => {
                self.pending_channel = Some(channel);
                self.drive(Input::ChannelOpen).await;
                // Not picked up by a transfer: the negotiation has moved on
                self.pending_channel = None;
            }
            Some(ConnectorEvent::ChannelClosed) => self.channel_closed(false).await,
            None => self.connector_events = None,
        }
    }

    // -- Transfer -----------------------------------------------------------

    fn begin_transfer(&mut self, role: Role) -> Option<Input> {
        let Some(channel) = self.pending_channel.take() else {
            return Some(Input::NegotiationFailed("direct channel missing".into()));
        };

        self.generation += 1;
        let generation = self.generation;
        let cancel = CancellationToken::new();
        let keepalive = channel.outbound.clone();
        let outcomes = self.outcomes_tx.clone();
        let task_cancel = cancel.clone();

        let progress_rx = match role {
            Role::Sender => {
                let Some(file) = self.selected.clone() else {
                    return Some(Input::NegotiationFailed("no file selected".into()));
                };
                tracing::info!("Sending {} ({} bytes)", file.meta.name, file.meta.size);
                let (progress, progress_rx) = watch::channel(ProgressReport {
                    total_size: file.meta.size,
                    ..Default::default()
                });
                self.in_flight = Some(file.meta.name.clone());
                self.set_status(format!("Sending {}", file.meta.name));

                let config = SenderConfig::new(file.meta.clone()).with_logger(Arc::new(TracingLogger));
                let send_window = self.config.send_window;
                tokio::spawn(async move {
                    let (transport, _inbound) = channel.into_split();
                    let (outbound, mut pump) = windowed(transport, send_window);
                    let mut result: Result<u64, TransferError> = async {
                        let reader = file.open().await?;
                        run_sender(config, reader, &outbound, &progress, &task_cancel).await
                    }
                    .await;
                    drop(outbound);

                    // Frames still queued in the window have to reach the transport
                    tokio::select! {
                        flushed = &mut pump => {
                            if !matches!(flushed, Ok(true)) && result.is_ok() {
                                result = Err(TransferError::ChannelLost);
                            }
                        }
                        _ = task_cancel.cancelled() => {
                            pump.abort();
                            if result.is_ok() {
                                result = Err(TransferError::Cancelled);
                            }
                        }
                    }
                    let _ = outcomes.send(TransferOutcome {
                        generation,
                        role: Role::Sender,
                        result,
                    });
                });
                progress_rx
            }
            Role::Receiver => {
                self.set_status("Connected, waiting for the file".into());
                let (progress, progress_rx) = watch::channel(ProgressReport::default());
                let sink = (self.sinks)();
                let config = ReceiverConfig {
                    max_file_size: self.config.max_file_size,
                    logger: Some(Arc::new(TracingLogger)),
                };
                let events = self.receiver_events_tx.clone();
                tokio::spawn(async move {
                    let (_outbound, mut inbound) = channel.into_split();
                    let result = run_receiver(config, &mut inbound, sink, &events, &progress, &task_cancel)
                        .await
                        .map(|delivered| delivered as u64);
                    let _ = outcomes.send(TransferOutcome {
                        generation,
                        role: Role::Receiver,
                        result,
                    });
                });
                progress_rx
            }
        };

        self.transfer = Some(ActiveTransfer {
            generation,
            cancel,
            progress: progress_rx,
            _keepalive: keepalive,
        });
        self.on_progress();
        None
    }

    async fn on_outcome(&mut self, outcome: TransferOutcome) {
        let current = self.transfer.as_ref().map(|t| t.generation);
        if current != Some(outcome.generation) {
            return;
        }
        // The final report may still be queued behind this outcome
        self.on_progress();

        match (outcome.role, outcome.result) {
            (Role::Sender, Ok(bytes)) => {
                self.in_flight = None;
                let name = self.selected.as_ref().map(|f| f.meta.name.as_str()).unwrap_or_default();
                tracing::info!("Sent {} ({} bytes)", name, bytes);
                self.set_status(format!("Sent {name}"));
            }
            // The receive loop only returns once the channel is gone
            (Role::Receiver, Ok(_)) => self.channel_closed(false).await,
            (_, Err(TransferError::ChannelLost)) => self.channel_closed(true).await,
            (_, Err(TransferError::Cancelled)) => {}
            // Tearing down closes the channel; the peer then drops its partial copy
            (role, Err(e)) => {
                tracing::error!("{:?} transfer failed: {}", role, e);
                self.drive(Input::ChannelClosed).await;
                self.set_status(format!("Transfer failed: {e}"));
            }
        }
    }

    /// The direct channel is gone. A file still moving over it is reported lost.
    async fn channel_closed(&mut self, lost: bool) {
        let interrupted = self.in_flight.take();
        self.drive(Input::ChannelClosed).await;
        if lost || interrupted.is_some() {
            let name = interrupted.unwrap_or_else(|| "the file".into());
            tracing::warn!("Direct channel lost before {} finished", name);
            self.set_status(format!("Connection lost, {name} was not completed"));
        }
    }

    fn on_receiver_event(&mut self, event: ReceiverEvent) {
        match event {
            ReceiverEvent::Started(meta) => {
                if self.transfer.is_some() {
                    self.in_flight = Some(meta.name.clone());
                    self.set_status(format!("Receiving {}", meta.name));
                    self.view.send_modify(|v| v.file = Some(meta));
                }
            }
            ReceiverEvent::Delivered(file) => {
                tracing::info!("Received {} ({} bytes)", file.meta.name, file.meta.size);
                self.in_flight = None;
                self.set_status(format!("Received {}", file.meta.name));
                let _ = self.deliveries.send(file);
            }
            ReceiverEvent::Aborted { name, reason } => {
                self.in_flight = None;
                if self.transfer.is_some() {
                    let name = name.unwrap_or_else(|| "file".into());
                    self.set_status(format!("Transfer of {name} aborted: {reason}"));
                }
            }
        }
    }

    fn on_progress(&mut self) {
        let Some(transfer) = self.transfer.as_mut() else {
            return;
        };
        let report = *transfer.progress.borrow_and_update();
        self.view.send_modify(|v| {
            v.progress = report.percent;
            v.estimated_time_seconds = report.eta.seconds();
        });
    }

    async fn tear_down(&mut self) {
        if let Some(transfer) = self.transfer.take() {
            transfer.cancel.cancel();
        }
        self.in_flight = None;
        self.pending_channel = None;
        self.connector.close().await;
        self.connector_events = None;
    }

    // -- View ---------------------------------------------------------------

    fn set_status(&self, status: String) {
        tracing::debug!("Status: {}", status);
        self.view.send_modify(|v| v.status = status);
    }

    fn sync_view(&self) {
        let state = self.negotiator.state();
        let role = self.negotiator.role();
        let code = self.negotiator.code().cloned();
        self.view.send_if_modified(|v| {
            let changed = v.state != state || v.role != role || v.code != code;
            v.state = state;
            v.role = role;
            v.code = code;
            v.is_connected = state == NegotiationState::Connected;
            changed
        });
    }
}

fn failed(e: NegotiationError) -> Input {
    tracing::warn!("Negotiation failed: {}", e);
    Input::NegotiationFailed(e.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn text(n: usize) -> Frame {
        Frame::Text(format!("frame {n}"))
    }

    #[tokio::test]
    async fn test_send_window_bounds_frames_ahead_of_transport() {
        let (transport, mut far) = mpsc::channel(1);
        let (outbound, pump) = windowed(transport, 2);

        // One in the transport, one held by the pump, two in the window
        let mut accepted = 0;
        while tokio::time::timeout(Duration::from_millis(100), outbound.send(text(accepted)))
            .await
            .is_ok()
        {
            accepted += 1;
        }
        assert_eq!(accepted, 4);

        drop(outbound);
        for n in 0..4 {
            assert_eq!(far.recv().await, Some(text(n)));
        }
        assert!(pump.await.unwrap());
    }

    #[tokio::test]
    async fn test_window_pump_reports_lost_transport() {
        let (transport, far) = mpsc::channel(1);
        let (outbound, pump) = windowed(transport, 2);
        drop(far);

        outbound.send(text(0)).await.unwrap();
        assert!(!pump.await.unwrap());
        assert!(outbound.send(text(1)).await.is_err());
    }
}
