//! Virtual-clock reactor and a recording pipeline driver for unit tests.

use std::{cell::RefCell, io, time::Duration};

use tokio::time::Instant;

use crate::{
    canonical::RequestHead,
    config::Config,
    connection::{dispatch_event, Connection, Request},
    error::Direction,
    event::ReactorEvent,
    fsm::NextStep,
    reactor::Reactor,
    state_machine::{PhaseEngine, PipelineDriver},
};

pub fn request(uri: &str) -> Request {
    let head = RequestHead {
        method: "GET".into(),
        uri: uri.into(),
        version: 1,
        headers: Vec::new(),
    };
    Request::new(1, head, Instant::now())
}

/// Reactor whose clock only moves when told to, with injectable registration failures.
pub struct ManualReactor {
    now: Instant,
    fail_read: bool,
    fail_write: bool,
    interest: Vec<(Direction, bool)>,
}

impl ManualReactor {
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
            fail_read: false,
            fail_write: false,
            interest: Vec::new(),
        }
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    pub fn set_now(&mut self, now: Instant) {
        self.now = now;
    }

    pub fn fail(&mut self, direction: Direction) {
        match direction {
            Direction::Read => self.fail_read = true,
            Direction::Write => self.fail_write = true,
        }
    }

    /// Successful interest changes, in order.
    pub fn interest_log(&self) -> &[(Direction, bool)] {
        &self.interest
    }
}

impl Reactor for ManualReactor {
    fn now(&self) -> Instant {
        self.now
    }

    fn set_interest(&mut self, direction: Direction, enable: bool) -> io::Result<()> {
        let fail = match direction {
            Direction::Read => self.fail_read,
            Direction::Write => self.fail_write,
        };
        if fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected failure"));
        }
        self.interest.push((direction, enable));
        Ok(())
    }
}

/// Real phase engine that remembers when it was re-run.
pub struct RecordingDriver {
    engine: PhaseEngine,
    reruns: RefCell<Vec<Instant>>,
}

impl RecordingDriver {
    pub fn new(delay: Option<Duration>) -> Self {
        let config = Config {
            delay,
            ..Config::default()
        };
        Self {
            engine: PhaseEngine::new(&config),
            reruns: RefCell::new(Vec::new()),
        }
    }

    /// First pass through the pipeline; not counted as a re-run.
    pub fn start(&self, req: &mut Request, conn: &mut Connection, reactor: &mut dyn Reactor) -> NextStep {
        self.engine.run_phases(req, conn, reactor)
    }

    pub fn reruns(&self) -> usize {
        self.reruns.borrow().len()
    }

    pub fn rerun_times(&self) -> Vec<Instant> {
        self.reruns.borrow().clone()
    }
}

impl PipelineDriver for RecordingDriver {
    fn run_phases(&self, req: &mut Request, conn: &mut Connection, reactor: &mut dyn Reactor) -> NextStep {
        self.reruns.borrow_mut().push(reactor.now());
        self.engine.run_phases(req, conn, reactor)
    }
}

/// One request on one connection driven through the full pipeline on a manual clock.
pub struct Harness {
    pub reactor: ManualReactor,
    pub conn: Connection,
    pub req: Request,
    pub driver: RecordingDriver,
}

impl Harness {
    pub fn new(delay: Option<Duration>) -> Self {
        let reactor = ManualReactor::new();
        let mut req = request("/");
        req.started = reactor.now();
        Self {
            reactor,
            conn: Connection::new(1, None),
            req,
            driver: RecordingDriver::new(delay),
        }
    }

    pub fn start(&mut self) -> NextStep {
        self.driver.start(&mut self.req, &mut self.conn, &mut self.reactor)
    }

    pub fn deliver(&mut self, event: ReactorEvent) -> NextStep {
        dispatch_event(
            &mut self.req,
            &mut self.conn,
            &mut self.reactor,
            &self.driver,
            event,
        )
    }

    /// Moves the clock forward, firing the timer exactly at its deadline if it comes due.
    pub fn advance(&mut self, by: Duration) -> Option<NextStep> {
        let target = self.reactor.now() + by;
        let step = match self.conn.write.deadline() {
            Some(deadline) if deadline <= target => {
                self.reactor.set_now(deadline);
                Some(self.deliver(ReactorEvent::TimerExpired))
            }
            _ => None,
        };
        self.reactor.set_now(target);
        step
    }
}
