/// Progress of the delay phase for a single request.
///
/// Only ever moves forward: `NotStarted -> Suspended -> Resumed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayState {
    #[default]
    NotStarted,
    Suspended,
    Resumed,
}

/// Where the resume controller sits while it owns a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    /// Timer armed, not fired yet.
    Waiting,
    /// Timer fired, the next write-side dispatch resumes the pipeline.
    Expired,
}

/// Pipeline positions, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    FindConfig,
    PreAccess,
    Content,
}

/// Component that currently owns event dispatch for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOwner {
    Driver,
    ResumeController,
}

/// What runs when the reactor reports a read-side event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadHandler {
    /// Drop read interest until the pipeline explicitly asks for data.
    BlockReading,
    /// Only watch for the peer going away; never consume data.
    TestReading,
}

/// What runs when the reactor reports a write-side or timer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteHandler {
    RunPhases,
    Delay,
}
