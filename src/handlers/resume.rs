use tracing::{debug, error};

use crate::{
    canonical::StatusCode,
    connection::{Connection, Request},
    fsm::NextStep,
    reactor::Reactor,
    state_machine::PipelineDriver,
    states::{DelayState, DispatchOwner, ReadHandler, ResumeState, WriteHandler},
};

pub fn resume_state(conn: &Connection) -> ResumeState {
    if conn.write.timedout {
        ResumeState::Expired
    } else {
        ResumeState::Waiting
    }
}

/// Write-side handler of a delayed request.
///
/// Before the timer fires every write event is spurious and only re-arms write
/// interest. After it fires, handlers go back to the driver and the pipeline is
/// re-run from the delay phase. Any interest failure ends the request with 500.
pub fn delay_event_handler(
    req: &mut Request,
    conn: &mut Connection,
    reactor: &mut dyn Reactor,
    driver: &dyn PipelineDriver,
) -> NextStep {
    debug!(conn = conn.id, request = req.id, state = ?resume_state(conn), "delay");

    if resume_state(conn) == ResumeState::Waiting {
        if let Err(err) = reactor.handle_write_event(conn) {
            error!(conn = conn.id, request = req.id, %err, "delay wakeup failed");
            return driver.finalize_request(req, conn, Some(StatusCode::INTERNAL_SERVER_ERROR));
        }
        return NextStep::WaitEvent;
    }

    conn.write.timedout = false;

    if let Err(err) = reactor.handle_read_event(conn) {
        error!(conn = conn.id, request = req.id, %err, "delay resume failed");
        return driver.finalize_request(req, conn, Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    req.read_handler = ReadHandler::BlockReading;
    req.write_handler = WriteHandler::RunPhases;
    req.owner = DispatchOwner::Driver;
    req.delay_state = DelayState::Resumed;

    debug!(
        conn = conn.id,
        request = req.id,
        waited_ms = reactor.now().saturating_duration_since(req.started).as_millis() as u64,
        "delay done"
    );

    driver.run_phases(req, conn, reactor)
}
