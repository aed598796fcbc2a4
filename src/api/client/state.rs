//! Per-call dispatch state machine.
//!
//! The only transition into `Refreshing` is from `AwaitingResponse` on a 401,
//! so a retried request can never trigger a second refresh.

/// Where one `send` call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchState {
    Idle,
    AwaitingResponse,
    Refreshing,
    /// The retried request is in flight.
    Retrying,
    Done,
    Failed,
}

/// Things that happen to a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchEvent {
    Sent,
    /// Any response other than 401.
    Responded,
    Unauthorized { can_refresh: bool },
    Refreshed,
    Errored,
}

impl DispatchState {
    /// Apply one event. Illegal combinations end in `Failed`.
    pub(crate) fn on(self, event: DispatchEvent) -> Self {
        use DispatchEvent as E;
        use DispatchState as S;
        match (self, event) {
            (S::Done, _) => S::Done,
            (S::Failed, _) => S::Failed,
            (_, E::Errored) => S::Failed,
            (S::Idle, E::Sent) => S::AwaitingResponse,
            (S::AwaitingResponse | S::Retrying, E::Responded) => S::Done,
            (S::AwaitingResponse, E::Unauthorized { can_refresh: true }) => S::Refreshing,
            (S::AwaitingResponse, E::Unauthorized { can_refresh: false }) => S::Failed,
            (S::Retrying, E::Unauthorized { .. }) => S::Failed,
            (S::Refreshing, E::Refreshed) => S::Retrying,
            _ => S::Failed,
        }
    }

    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}
