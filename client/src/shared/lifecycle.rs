use tokio::sync::watch;

use super::types::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Open,
    Lost { error: bool },
    Destroyed,
}

/// Connection lifecycle of one channel. Destroyed is terminal; every other
/// phase may loop back to Connecting.
pub(crate) struct Lifecycle {
    phase: Phase,
    status: watch::Sender<ConnectionState>,
}

impl Lifecycle {
    pub fn new() -> (Self, watch::Receiver<ConnectionState>) {
        let (status, rx) = watch::channel(ConnectionState::Idle);
        (
            Self {
                phase: Phase::Idle,
                status,
            },
            rx,
        )
    }

    /// Returns false once destroyed.
    pub fn begin_connect(&mut self) -> bool {
        match self.phase {
            Phase::Destroyed => false,
            _ => {
                self.enter(Phase::Connecting);
                true
            }
        }
    }

    pub fn opened(&mut self) {
        if self.phase == Phase::Connecting {
            self.enter(Phase::Open);
        }
    }

    /// Record a lost or failed connection. Returns true if a reconnect should
    /// be scheduled.
    pub fn lost(&mut self, error: bool) -> bool {
        match self.phase {
            Phase::Destroyed => false,
            _ => {
                self.enter(Phase::Lost { error });
                true
            }
        }
    }

    /// Returns true if a socket may still be live and needs closing.
    pub fn destroy(&mut self) -> bool {
        let live = matches!(self.phase, Phase::Connecting | Phase::Open);
        self.enter(Phase::Destroyed);
        live
    }

    pub fn state(&self) -> ConnectionState {
        match self.phase {
            Phase::Idle => ConnectionState::Idle,
            Phase::Connecting => ConnectionState::Connecting,
            Phase::Open => ConnectionState::Open,
            Phase::Lost { error: false } | Phase::Destroyed => ConnectionState::Closed,
            Phase::Lost { error: true } => ConnectionState::Error,
        }
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    pub fn is_destroyed(&self) -> bool {
        self.phase == Phase::Destroyed
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        let state = self.state();
        self.status.send_if_modified(|current| {
            if *current != state {
                *current = state;
                true
            } else {
                false
            }
        });
    }
}
