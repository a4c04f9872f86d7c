//! Playback state machine shared by every backend adapter.

use std::fmt;

use crate::error::PlayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// No session
    Closed,
    /// A source is being resolved or a topology is being applied
    OpenPending,
    Started,
    Paused,
    /// Ready to play; the next play starts from time zero
    Stopped,
    /// Close requested, waiting for the platform to acknowledge
    Closing,
}

impl PlaybackState {
    pub const ALL: [PlaybackState; 6] = [
        PlaybackState::Closed,
        PlaybackState::OpenPending,
        PlaybackState::Started,
        PlaybackState::Paused,
        PlaybackState::Stopped,
        PlaybackState::Closing,
    ];

    /// A session object graph exists in every state but `Closed`.
    pub fn has_session(self) -> bool {
        self != PlaybackState::Closed
    }

    pub fn next(self, transition: Transition) -> Option<PlaybackState> {
        use PlaybackState::*;
        use Transition as T;

        match (self, transition) {
            (Closed, T::Open) => Some(OpenPending),
            (OpenPending, T::TopologyReady) => Some(Started),
            (OpenPending, T::Built) => Some(Stopped),
            (OpenPending, T::OpenFailed) => Some(Closed),
            (Started, T::Pause) => Some(Paused),
            (Started, T::Stop) => Some(Stopped),
            (Started, T::EndOfStream) => Some(Stopped),
            (Paused | Stopped, T::Play) => Some(Started),
            (Started | Paused | Stopped, T::NewPresentation) => Some(OpenPending),
            (Closed, T::Finish) => None,
            (_, T::Finish) => Some(Closed),
            (_, T::Close) => Some(Closing),
            (Closing, T::SessionClosed) => Some(Closed),
            _ => None,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlaybackState::Closed => "closed",
            PlaybackState::OpenPending => "open pending",
            PlaybackState::Started => "started",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Closing => "closing",
        })
    }
}

/// Calls and platform events that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Open,
    /// Async variant: the queued topology is ready to start
    TopologyReady,
    /// Sync variant: the graph was built inside `open`
    Built,
    OpenFailed,
    Play,
    Pause,
    Stop,
    EndOfStream,
    NewPresentation,
    Finish,
    Close,
    SessionClosed,
}

impl Transition {
    pub const ALL: [Transition; 12] = [
        Transition::Open,
        Transition::TopologyReady,
        Transition::Built,
        Transition::OpenFailed,
        Transition::Play,
        Transition::Pause,
        Transition::Stop,
        Transition::EndOfStream,
        Transition::NewPresentation,
        Transition::Finish,
        Transition::Close,
        Transition::SessionClosed,
    ];

    pub fn op(self) -> &'static str {
        match self {
            Transition::Open => "open",
            Transition::TopologyReady => "topology ready",
            Transition::Built => "graph built",
            Transition::OpenFailed => "open failed",
            Transition::Play => "play",
            Transition::Pause => "pause",
            Transition::Stop => "stop",
            Transition::EndOfStream => "end of stream",
            Transition::NewPresentation => "new presentation",
            Transition::Finish => "finish",
            Transition::Close => "close",
            Transition::SessionClosed => "session closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: PlaybackState,
    pub to: PlaybackState,
}

/// One per player instance. State only moves along [`PlaybackState::next`].
#[derive(Debug)]
pub struct StateMachine {
    state: PlaybackState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Closed,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Validate `transition` without applying it.
    pub fn check(&self, transition: Transition) -> Result<PlaybackState, PlayerError> {
        self.state
            .next(transition)
            .ok_or_else(|| PlayerError::invalid(transition.op(), self.state))
    }

    pub fn apply(&mut self, transition: Transition) -> Result<StateChange, PlayerError> {
        let to = self.check(transition)?;
        let change = StateChange {
            from: self.state,
            to,
        };
        if change.from != change.to {
            tracing::debug!(
                from = %change.from,
                to = %change.to,
                op = transition.op(),
                "playback state change"
            );
        }
        self.state = to;
        Ok(change)
    }
}
