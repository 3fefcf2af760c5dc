use crate::canonical::StatusCode;

/// Outcome of a single phase handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseDecision {
    /// Decline; the driver moves on to the next handler.
    Continue,

    /// Stop advancing this request until an event hands it back to the driver.
    Suspend,

    /// The handler produced the response; finalize the request.
    Done,

    /// Fail the request with this status.
    Error(StatusCode),
}

/// Describes what the connection loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Return to the reactor and wait for the next timer or readiness event.
    WaitEvent,

    /// Request finalized; write the prepared response.
    Finalize,

    /// Tear the connection down without a response.
    Close,
}
