use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// Consecutive failed connection attempts, saturating at `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryCounter {
    attempts: u32,
    max: u32,
}

impl RetryCounter {
    pub fn new(max: u32) -> Self {
        Self { attempts: 0, max }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn bump(&mut self) -> u32 {
        self.attempts = (self.attempts + 1).min(self.max);
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max
    }
}

/// Things that can happen to the link, whoever raised them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// Someone called `connect()`.
    Connect,
    /// The transport finished its handshake.
    Opened,
    /// The transport closed or errored, or could not be created at all.
    Lost,
    /// The reconnect timer fired.
    RetryDue,
    /// The manager is being torn down.
    Shutdown,
}

/// Side effects the manager must carry out after a transition, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    OpenTransport,
    CloseTransport,
    /// Replaces any timer already pending.
    ScheduleRetry {
        attempt: u32,
    },
    CancelRetry,
    AnnounceExhausted,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn stay(state: ConnectionState) -> Self {
        Self { next: state, effects: Vec::new() }
    }

    fn to(next: ConnectionState, effects: Vec<Effect>) -> Self {
        Self { next, effects }
    }
}

/// The whole connection lifecycle. Pure apart from the retry counter it is handed.
pub fn transition(state: ConnectionState, retry: &mut RetryCounter, event: LinkEvent) -> Transition {
    use ConnectionState::*;

    match (state, event) {
        (Open | Connecting, LinkEvent::Connect) => Transition::stay(state),
        (Idle | Closed, LinkEvent::Connect) => {
            Transition::to(Connecting, vec![Effect::CancelRetry, Effect::OpenTransport])
        }

        (Connecting, LinkEvent::Opened) => {
            retry.reset();
            Transition::to(Open, Vec::new())
        }
        (_, LinkEvent::Opened) => Transition::stay(state),

        (Connecting | Open | Closed, LinkEvent::Lost) => {
            let attempt = retry.bump();
            if retry.exhausted() {
                Transition::to(Idle, vec![Effect::CancelRetry, Effect::AnnounceExhausted])
            } else {
                Transition::to(Closed, vec![Effect::ScheduleRetry { attempt }])
            }
        }
        (Idle, LinkEvent::Lost) => Transition::stay(state),

        (Closed, LinkEvent::RetryDue) => Transition::to(Connecting, vec![Effect::OpenTransport]),
        (_, LinkEvent::RetryDue) => Transition::stay(state),

        (_, LinkEvent::Shutdown) => {
            Transition::to(Idle, vec![Effect::CancelRetry, Effect::CloseTransport])
        }
    }
}
