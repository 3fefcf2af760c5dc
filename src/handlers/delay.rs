use tracing::{debug, error};

use crate::{
    canonical::StatusCode,
    connection::{Connection, Request},
    fsm::PhaseDecision,
    handlers::PhaseHandler,
    reactor::Reactor,
    states::{DelayState, DispatchOwner, Phase, ReadHandler, WriteHandler},
};

/// Pre-access stage that holds a request for its configured delay.
pub struct DelayStage;

impl DelayStage {
    /// Arms the delay for `req`, or declines.
    ///
    /// Declines when the request was already delayed (the driver re-runs this
    /// phase after resumption) or when no delay applies to its location. On
    /// `Suspend` the resume controller owns the request's handler slots.
    pub fn enter(
        &self,
        req: &mut Request,
        conn: &mut Connection,
        reactor: &mut dyn Reactor,
    ) -> PhaseDecision {
        if req.delay_state != DelayState::NotStarted {
            return PhaseDecision::Continue;
        }

        let Some(delay) = req.delay_config else {
            return PhaseDecision::Continue;
        };

        debug!(
            conn = conn.id,
            request = req.id,
            delay_ms = delay.as_millis() as u64,
            "delaying request"
        );

        // Read interest is only there so a client going away is noticed.
        if let Err(err) = reactor.handle_read_event(conn) {
            error!(conn = conn.id, request = req.id, %err, "cannot watch client while delaying");
            return PhaseDecision::Error(StatusCode::INTERNAL_SERVER_ERROR);
        }

        req.read_handler = ReadHandler::TestReading;
        req.write_handler = WriteHandler::Delay;
        req.owner = DispatchOwner::ResumeController;

        reactor.add_timer(conn, delay);

        req.delay_state = DelayState::Suspended;
        PhaseDecision::Suspend
    }
}

impl PhaseHandler for DelayStage {
    fn phase(&self) -> Phase {
        Phase::PreAccess
    }

    fn handle(
        &self,
        req: &mut Request,
        conn: &mut Connection,
        reactor: &mut dyn Reactor,
    ) -> PhaseDecision {
        self.enter(req, conn, reactor)
    }
}
