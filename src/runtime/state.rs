//! Session lifecycle rules.
//!
//! The state machine is kept free of I/O: each function looks at the current
//! state and tells the worker where to go and what to do on the way. The
//! worker performs the transport calls and fan-outs.

/// Connection lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    #[default]
    Uninitialized,
    Ready,
    Connecting,
    Connected,
    Disconnected,
}

/// What a connect request should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAction {
    /// Call the transport's start and move to `Connecting`.
    Start,
    /// Already connecting or connected; nothing to do.
    AlreadyActive,
    /// The session has not been initialized.
    Refused,
}

/// What a transport lifecycle event (or a stop request) should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    /// Run the registry fan-out for this event.
    pub fan_out: bool,
    /// Issue a transport stop to get back to a known state.
    pub stop_transport: bool,
    /// The event arrived in a state that does not expect it.
    pub anomaly: bool,
}

impl Transition {
    const fn stay(state: SessionState, anomaly: bool) -> Self {
        Self {
            next: state,
            fan_out: false,
            stop_transport: false,
            anomaly,
        }
    }

    /// Stop the transport and go to `Disconnected`. Leaving `Connected` this
    /// way still runs the disconnect fan-out.
    const fn heal(from: SessionState) -> Self {
        Self {
            next: SessionState::Disconnected,
            fan_out: matches!(from, SessionState::Connected),
            stop_transport: true,
            anomaly: true,
        }
    }
}

impl SessionState {
    /// `initialize` is accepted whenever no connection is active or pending.
    pub fn can_initialize(self) -> bool {
        matches!(
            self,
            SessionState::Uninitialized | SessionState::Ready | SessionState::Disconnected
        )
    }

    pub fn connect(self) -> ConnectAction {
        match self {
            SessionState::Ready | SessionState::Disconnected => ConnectAction::Start,
            SessionState::Connecting | SessionState::Connected => ConnectAction::AlreadyActive,
            SessionState::Uninitialized => ConnectAction::Refused,
        }
    }

    /// The transport reports an established connection.
    pub fn on_connected(self) -> Transition {
        match self {
            SessionState::Connecting | SessionState::Disconnected => Transition {
                next: SessionState::Connected,
                fan_out: true,
                stop_transport: false,
                anomaly: false,
            },
            _ => Transition::heal(self),
        }
    }

    /// The transport reports a lost (or failed) connection.
    pub fn on_disconnected(self) -> Transition {
        match self {
            SessionState::Connected | SessionState::Ready => Transition {
                next: SessionState::Disconnected,
                fan_out: true,
                stop_transport: false,
                anomaly: false,
            },
            SessionState::Connecting => Transition::heal(self),
            SessionState::Disconnected => Transition::stay(self, true),
            SessionState::Uninitialized => Transition::stay(self, true),
        }
    }

    /// The application asks the session to go offline.
    pub fn stop(self) -> Transition {
        match self {
            SessionState::Connected => Transition {
                next: SessionState::Disconnected,
                fan_out: true,
                stop_transport: true,
                anomaly: false,
            },
            SessionState::Connecting | SessionState::Disconnected => Transition {
                next: SessionState::Disconnected,
                fan_out: false,
                stop_transport: true,
                anomaly: false,
            },
            SessionState::Uninitialized | SessionState::Ready => Transition::stay(self, false),
        }
    }

    pub fn is_connected(self) -> bool {
        self == SessionState::Connected
    }
}
