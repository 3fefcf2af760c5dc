use std::{net::SocketAddr, time::Duration};

use tokio::time::Instant;
use tracing::{error, trace};

use crate::{
    canonical::{RequestHead, Response, StatusCode},
    config::LocationConf,
    event::{Event, ReactorEvent},
    fsm::NextStep,
    handlers::{resume::delay_event_handler, transport},
    reactor::Reactor,
    state_machine::PipelineDriver,
    states::{DelayState, DispatchOwner, ReadHandler, WriteHandler},
};

/// Transport-side state of one client connection.
#[derive(Debug)]
pub struct Connection {
    pub id: u64,
    pub peer: Option<SocketAddr>,
    pub read: Event,
    /// Also carries the connection's timer.
    pub write: Event,
    destroyed: bool,
}

impl Connection {
    pub fn new(id: u64, peer: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer,
            read: Event::default(),
            write: Event::default(),
            destroyed: false,
        }
    }

    /// Tears the connection down, cancelling any pending timer.
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        self.destroyed = true;
        self.read.del_timer();
        self.write.del_timer();
        self.read.active = false;
        self.write.active = false;
        true
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// One in-flight HTTP request and the dispatch state attached to it.
#[derive(Debug)]
pub struct Request {
    pub id: u64,
    pub head: RequestHead,
    pub started: Instant,
    /// Resolved by the find-config phase.
    pub location: Option<LocationConf>,
    pub delay_config: Option<Duration>,
    pub delay_state: DelayState,
    /// Index of the phase handler to (re)run next.
    pub phase_handler: usize,
    pub owner: DispatchOwner,
    pub read_handler: ReadHandler,
    pub write_handler: WriteHandler,
    pub response: Option<Response>,
    pub status: Option<StatusCode>,
    finalized: bool,
}

impl Request {
    pub fn new(id: u64, head: RequestHead, started: Instant) -> Self {
        Self {
            id,
            head,
            started,
            location: None,
            delay_config: None,
            delay_state: DelayState::NotStarted,
            phase_handler: 0,
            owner: DispatchOwner::Driver,
            read_handler: ReadHandler::BlockReading,
            write_handler: WriteHandler::RunPhases,
            response: None,
            status: None,
            finalized: false,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub(crate) fn mark_finalized(&mut self) -> bool {
        !std::mem::replace(&mut self.finalized, true)
    }
}

/// Delivers one reactor event to whichever handler currently owns the request.
pub fn dispatch_event(
    req: &mut Request,
    conn: &mut Connection,
    reactor: &mut dyn Reactor,
    driver: &dyn PipelineDriver,
    event: ReactorEvent,
) -> NextStep {
    if conn.is_destroyed() || req.is_finalized() {
        trace!(conn = conn.id, ?event, "event after teardown ignored");
        return NextStep::Close;
    }

    trace!(
        conn = conn.id,
        request = req.id,
        ?event,
        owner = ?req.owner,
        "dispatch"
    );

    match event {
        ReactorEvent::TimerExpired => {
            conn.write.expire();
            run_write_handler(req, conn, reactor, driver)
        }
        ReactorEvent::Writable => {
            conn.write.ready = true;
            run_write_handler(req, conn, reactor, driver)
        }
        ReactorEvent::Readable => {
            conn.read.ready = true;
            run_read_handler(req, conn, reactor)
        }
        ReactorEvent::PeerClosed => {
            conn.read.ready = true;
            conn.read.eof = true;
            run_read_handler(req, conn, reactor)
        }
        ReactorEvent::Error(_) => {
            conn.read.ready = true;
            conn.read.error = true;
            run_read_handler(req, conn, reactor)
        }
    }
}

fn run_write_handler(
    req: &mut Request,
    conn: &mut Connection,
    reactor: &mut dyn Reactor,
    driver: &dyn PipelineDriver,
) -> NextStep {
    match (req.owner, req.write_handler) {
        (DispatchOwner::ResumeController, WriteHandler::Delay) => {
            delay_event_handler(req, conn, reactor, driver)
        }
        (DispatchOwner::Driver, WriteHandler::RunPhases) => driver.run_phases(req, conn, reactor),
        (owner, handler) => {
            error!(
                conn = conn.id,
                request = req.id,
                ?owner,
                ?handler,
                "write handler does not match dispatch owner"
            );
            driver.finalize_request(req, conn, Some(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn run_read_handler(req: &mut Request, conn: &mut Connection, reactor: &mut dyn Reactor) -> NextStep {
    match req.read_handler {
        ReadHandler::TestReading => transport::test_reading(req, conn, reactor),
        ReadHandler::BlockReading => transport::block_reading(req, conn, reactor),
    }
}
