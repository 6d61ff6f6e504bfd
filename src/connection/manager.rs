use crate::connection::state::{ transition, ConnectionState, Effect, LinkEvent, RetryCounter };
use crate::error::{ ChatError, TransportError };
use crate::history::ConversationStore;
use crate::models::chat::{ ChatSnapshot, Origin };
use crate::models::websocket::{ decode_response, encode_outbound, FrameFormat };
use crate::websocket::{ parse_endpoint, Connector, Link };

use futures::{ SinkExt, StreamExt };
use log::{ debug, error, info, warn };
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{ mpsc, oneshot, watch };
use tokio::task::JoinHandle;

pub const DEFAULT_GREETING: &str =
    "Hi! I'm your travel AI assistant. How can I help you plan your next adventure?";
pub const CONNECTION_LOST_MESSAGE: &str = "Connection lost, please retry.";
pub const NOT_CONNECTED_MESSAGE: &str =
    "Could not reach the assistant. Reconnecting now, please send your message again in a moment.";

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    pub endpoint: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub connect_poll_interval: Duration,
    pub connect_poll_checks: u32,
    pub frame_format: FrameFormat,
    pub greeting: String,
}

impl ManagerConfig {
    /// How long a send may wait for the connection to open.
    pub fn ensure_connected_timeout(&self) -> Duration {
        self.connect_poll_interval * self.connect_poll_checks
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:4000".to_string(),
            max_attempts: 5,
            retry_delay: Duration::from_millis(3000),
            connect_poll_interval: Duration::from_millis(100),
            connect_poll_checks: 50,
            frame_format: FrameFormat::Text,
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

enum Command {
    Submit {
        text: String,
        reply: oneshot::Sender<Result<(), ChatError>>,
    },
    StartNew {
        reply: oneshot::Sender<()>,
    },
    Reconnect,
    Teardown {
        reply: oneshot::Sender<()>,
    },
}

/// Notifications from tasks the manager spawned. Each carries the id of the
/// link or timer it belongs to so stale ones can be dropped.
enum Event {
    Opened {
        link: u64,
        outbound: mpsc::UnboundedSender<String>,
    },
    Frame {
        link: u64,
        text: String,
    },
    Lost {
        link: u64,
        reason: TransportError,
    },
    RetryDue {
        timer: u64,
    },
    SendDeadline {
        ticket: u64,
    },
}

struct LinkSlot {
    id: u64,
    task: JoinHandle<()>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

struct TimerSlot {
    id: u64,
    task: JoinHandle<()>,
}

struct QueuedSend {
    ticket: u64,
    text: String,
    reply: oneshot::Sender<Result<(), ChatError>>,
    deadline: JoinHandle<()>,
}

/// Owns the one connection to the assistant and the conversation it feeds.
///
/// Runs as a single tokio task: commands from [`ChatHandle`] and notifications
/// from the link, timer and deadline tasks are processed one at a time, so no
/// state here is ever touched concurrently.
pub struct ConnectionManager {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    state: ConnectionState,
    retry: RetryCounter,
    store: ConversationStore,
    link: Option<LinkSlot>,
    retry_timer: Option<TimerSlot>,
    waiting: VecDeque<QueuedSend>,
    events_tx: mpsc::UnboundedSender<Event>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
    next_id: u64,
}

impl ConnectionManager {
    /// Starts the manager task and connects right away.
    pub fn spawn(config: ManagerConfig, connector: Arc<dyn Connector>) -> ChatHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ChatSnapshot::default());

        let manager = ConnectionManager {
            retry: RetryCounter::new(config.max_attempts),
            config,
            connector,
            state: ConnectionState::Idle,
            store: ConversationStore::new(),
            link: None,
            retry_timer: None,
            waiting: VecDeque::new(),
            events_tx,
            snapshot_tx,
            next_id: 0,
        };
        tokio::spawn(manager.run(commands_rx, events_rx));

        ChatHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>
    ) {
        info!("Chat session started for endpoint {}", self.config.endpoint);
        self.connect();
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Teardown { reply }) => {
                        self.close();
                        self.publish();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All chat handles dropped");
                        self.close();
                        self.publish();
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
            self.publish();
        }
        info!("Chat session for {} torn down", self.config.endpoint);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { text, reply } => self.send(text, reply),
            Command::StartNew { reply } => {
                self.reset_for_new_conversation();
                self.publish();
                let _ = reply.send(());
            }
            Command::Reconnect => {
                info!("Manual reconnect requested");
                self.retry.reset();
                self.connect();
            }
            Command::Teardown { .. } => unreachable!("teardown is handled by the run loop"),
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Opened { link, outbound } => {
                if !self.is_current_link(link) {
                    debug!("Dropping stale open notification for link {}", link);
                    return;
                }
                if let Some(slot) = self.link.as_mut() {
                    slot.outbound = Some(outbound);
                }
                info!("Connected to {}", self.config.endpoint);
                self.apply(LinkEvent::Opened);
                self.flush_waiting();
            }
            Event::Frame { link, text } => {
                if !self.is_current_link(link) {
                    debug!("Dropping frame from stale link {}", link);
                    return;
                }
                let content = decode_response(&text);
                self.append_remote(content);
            }
            Event::Lost { link, reason } => {
                if !self.is_current_link(link) {
                    debug!("Ignoring loss of stale link {}", link);
                    return;
                }
                warn!("Connection to {} lost: {}", self.config.endpoint, reason);
                self.link = None;
                self.apply(LinkEvent::Lost);
            }
            Event::RetryDue { timer } => {
                if self.retry_timer.as_ref().map(|slot| slot.id) != Some(timer) {
                    debug!("Ignoring stale retry timer {}", timer);
                    return;
                }
                self.retry_timer = None;
                info!(
                    "Reconnecting to {} (attempt {}/{})",
                    self.config.endpoint,
                    self.retry.attempts(),
                    self.retry.max()
                );
                self.apply(LinkEvent::RetryDue);
            }
            Event::SendDeadline { ticket } => {
                let position = self.waiting.iter().position(|queued| queued.ticket == ticket);
                if let Some(queued) = position.and_then(|i| self.waiting.remove(i)) {
                    warn!(
                        "Connection not open after {:?}, giving up on send",
                        self.config.ensure_connected_timeout()
                    );
                    self.fail_not_connected(queued.reply);
                }
            }
        }
    }

    /// Starts a connection unless one is already open or on its way.
    pub fn connect(&mut self) {
        self.apply(LinkEvent::Connect);
    }

    /// Sends `text`, first waiting (bounded) for the connection if it is not open.
    fn send(&mut self, text: String, reply: oneshot::Sender<Result<(), ChatError>>) {
        let text = text.trim();
        if text.is_empty() {
            let _ = reply.send(Err(ChatError::EmptyMessage));
            return;
        }
        if self.state == ConnectionState::Open {
            self.transmit(text, reply);
            return;
        }

        self.connect();
        let ticket = self.next_id();
        let events = self.events_tx.clone();
        let timeout = self.config.ensure_connected_timeout();
        let deadline = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(Event::SendDeadline { ticket });
        });
        debug!("Send queued until connection opens (ticket {})", ticket);
        self.waiting.push_back(QueuedSend {
            ticket,
            text: text.to_string(),
            reply,
            deadline,
        });
    }

    /// Tears the connection down. Nothing scheduled before this call can
    /// reach the conversation afterwards.
    pub fn close(&mut self) {
        self.apply(LinkEvent::Shutdown);
        for queued in self.waiting.drain(..) {
            queued.deadline.abort();
            let _ = queued.reply.send(Err(ChatError::ManagerStopped));
        }
    }

    pub fn reset_for_new_conversation(&mut self) {
        self.store.clear();
        let greeting = self.store.stamp(self.config.greeting.clone(), Origin::Remote);
        self.store.append(greeting);
        self.store.set_pending(false);
        self.connect();
    }

    fn transmit(&mut self, text: &str, reply: oneshot::Sender<Result<(), ChatError>>) {
        let frame = encode_outbound(text, self.config.frame_format);
        let delivered = self.link
            .as_ref()
            .and_then(|slot| slot.outbound.as_ref())
            .map(|outbound| outbound.send(frame).is_ok())
            .unwrap_or(false);
        if !delivered {
            warn!("Link writer is gone, message not sent");
            self.fail_not_connected(reply);
            return;
        }

        let message = self.store.stamp(text, Origin::User);
        self.store.append(message);
        self.store.set_pending(true);
        self.publish();
        let _ = reply.send(Ok(()));
    }

    fn flush_waiting(&mut self) {
        while self.state == ConnectionState::Open {
            let Some(queued) = self.waiting.pop_front() else {
                break;
            };
            queued.deadline.abort();
            self.transmit(&queued.text, queued.reply);
        }
    }

    fn fail_not_connected(&mut self, reply: oneshot::Sender<Result<(), ChatError>>) {
        self.append_remote(NOT_CONNECTED_MESSAGE.to_string());
        self.connect();
        self.publish();
        let _ = reply.send(Err(ChatError::NotConnected));
    }

    /// Any remote-side message answers whatever was pending.
    fn append_remote(&mut self, content: String) {
        let message = self.store.stamp(content, Origin::Remote);
        self.store.append(message);
        self.store.set_pending(false);
    }

    fn apply(&mut self, event: LinkEvent) {
        let previous = self.state;
        let step = transition(self.state, &mut self.retry, event);
        self.state = step.next;
        if previous != self.state {
            debug!("Connection {} -> {} on {:?}", previous, self.state, event);
        }
        for effect in step.effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::OpenTransport => self.open_transport(),
            Effect::CloseTransport => {
                if let Some(slot) = self.link.take() {
                    match slot.outbound {
                        // Dropping the writer makes the link close the socket itself.
                        Some(outbound) => drop(outbound),
                        None => slot.task.abort(),
                    }
                }
            }
            Effect::ScheduleRetry { attempt } => {
                self.cancel_retry_timer();
                let id = self.next_id();
                let events = self.events_tx.clone();
                let delay = self.config.retry_delay;
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(Event::RetryDue { timer: id });
                });
                self.retry_timer = Some(TimerSlot { id, task });
                info!(
                    "Retrying connection in {:?} (attempt {}/{})",
                    delay,
                    attempt,
                    self.retry.max()
                );
            }
            Effect::CancelRetry => self.cancel_retry_timer(),
            Effect::AnnounceExhausted => {
                error!(
                    "Giving up on {} after {} failed attempts",
                    self.config.endpoint,
                    self.retry.attempts()
                );
                self.append_remote(CONNECTION_LOST_MESSAGE.to_string());
            }
        }
    }

    fn open_transport(&mut self) {
        let endpoint = match parse_endpoint(&self.config.endpoint) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                error!("Cannot connect: {}", e);
                self.link = None;
                self.apply(LinkEvent::Lost);
                return;
            }
        };

        let id = self.next_id();
        let connector = Arc::clone(&self.connector);
        let events = self.events_tx.clone();
        info!("Connecting to {}", endpoint);
        let task = tokio::spawn(async move {
            match connector.open(&endpoint).await {
                Ok(link) => drive_link(id, link, events).await,
                Err(e) => {
                    let _ = events.send(Event::Lost { link: id, reason: e });
                }
            }
        });
        self.link = Some(LinkSlot { id, task, outbound: None });
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(slot) = self.retry_timer.take() {
            slot.task.abort();
        }
    }

    fn is_current_link(&self, id: u64) -> bool {
        self.link.as_ref().map(|slot| slot.id == id).unwrap_or(false)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(ChatSnapshot {
            messages: self.store.messages().to_vec(),
            pending: self.store.pending(),
            connected: self.state == ConnectionState::Open,
            state: self.state,
            retry_attempts: self.retry.attempts(),
        });
    }
}

/// Pumps one open connection until either side ends it. Frames are forwarded
/// in arrival order; the manager hears about the end only if it did not ask for it.
async fn drive_link(id: u64, link: Link, events: mpsc::UnboundedSender<Event>) {
    let Link { mut sink, mut stream } = link;
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    if events.send(Event::Opened { link: id, outbound: outbound_tx }).is_err() {
        return;
    }

    let reason = loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        break Some(e);
                    }
                }
                None => {
                    if let Err(e) = sink.close().await {
                        debug!("Error closing link {}: {}", id, e);
                    }
                    break None;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(text)) => {
                    if events.send(Event::Frame { link: id, text }).is_err() {
                        break None;
                    }
                }
                Some(Err(e)) => break Some(e),
                None => break Some(TransportError::Closed),
            },
        }
    };

    if let Some(reason) = reason {
        let _ = events.send(Event::Lost { link: id, reason });
    }
}

/// The presentation layer's way into a running [`ConnectionManager`].
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ChatSnapshot>,
}

impl ChatHandle {
    /// Sends a user message. Blank input is rejected without touching anything.
    pub async fn submit(&self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Submit { text: text.to_string(), reply })
            .map_err(|_| ChatError::ManagerStopped)?;
        response.await.map_err(|_| ChatError::ManagerStopped)?
    }

    pub async fn start_new(&self) -> Result<(), ChatError> {
        let (reply, done) = oneshot::channel();
        self.commands.send(Command::StartNew { reply }).map_err(|_| ChatError::ManagerStopped)?;
        done.await.map_err(|_| ChatError::ManagerStopped)
    }

    /// Manual trigger after the automatic retries gave up.
    pub fn reconnect(&self) -> Result<(), ChatError> {
        self.commands.send(Command::Reconnect).map_err(|_| ChatError::ManagerStopped)
    }

    /// Closes the connection and stops the manager. Safe to call more than once.
    pub async fn teardown(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Teardown { reply }).is_ok() {
            let _ = done.await;
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot.clone()
    }
}
