use tracing::{debug, trace};

use crate::{
    canonical::{Response, StatusCode},
    config::Config,
    connection::{Connection, Request},
    fsm::{NextStep, PhaseDecision},
    handlers::{content::StaticContent, delay::DelayStage, FindConfig, PhaseHandler},
    reactor::Reactor,
    states::DispatchOwner,
};

/// Entry points the delay machinery uses to hand a request back to the pipeline.
pub trait PipelineDriver {
    /// Runs phase handlers starting from `req.phase_handler`.
    fn run_phases(
        &self,
        req: &mut Request,
        conn: &mut Connection,
        reactor: &mut dyn Reactor,
    ) -> NextStep;

    fn finalize_request(
        &self,
        req: &mut Request,
        conn: &mut Connection,
        status: Option<StatusCode>,
    ) -> NextStep {
        finalize_request(req, conn, status)
    }
}

/// Ends the request: drops its timer and fixes the response to send.
///
/// `status` overrides whatever response a handler prepared. A client-closed
/// status tears the connection down instead of producing a response.
pub fn finalize_request(
    req: &mut Request,
    conn: &mut Connection,
    status: Option<StatusCode>,
) -> NextStep {
    if !req.mark_finalized() {
        return NextStep::Close;
    }
    conn.write.del_timer();

    if status == Some(StatusCode::CLIENT_CLOSED_REQUEST) {
        req.status = status;
        conn.close();
        return NextStep::Close;
    }

    if let Some(status) = status {
        req.response = Some(Response::error(status));
    }
    let response = req
        .response
        .get_or_insert_with(|| Response::error(StatusCode::INTERNAL_SERVER_ERROR));
    req.status = Some(response.status);

    debug!(
        conn = conn.id,
        request = req.id,
        status = response.status.as_u16(),
        "finalize request"
    );
    NextStep::Finalize
}

/// Ordered phase handlers; the pipeline driver for every request on the server.
pub struct PhaseEngine {
    handlers: Vec<Box<dyn PhaseHandler>>,
}

impl PhaseEngine {
    /// The standard pipeline: location lookup, delay, static content.
    pub fn new(config: &Config) -> Self {
        Self::with_handlers(vec![
            Box::new(FindConfig::new(config.locations())),
            Box::new(DelayStage),
            Box::new(StaticContent),
        ])
    }

    pub fn with_handlers(mut handlers: Vec<Box<dyn PhaseHandler>>) -> Self {
        handlers.sort_by_key(|h| h.phase());
        Self { handlers }
    }
}

impl PipelineDriver for PhaseEngine {
    fn run_phases(
        &self,
        req: &mut Request,
        conn: &mut Connection,
        reactor: &mut dyn Reactor,
    ) -> NextStep {
        if req.is_finalized() || conn.is_destroyed() {
            return NextStep::Close;
        }
        debug_assert_eq!(
            req.owner,
            DispatchOwner::Driver,
            "phases must only run while the driver owns the request"
        );

        while let Some(handler) = self.handlers.get(req.phase_handler) {
            trace!(
                request = req.id,
                phase = ?handler.phase(),
                index = req.phase_handler,
                "run phase"
            );

            match handler.handle(req, conn, reactor) {
                PhaseDecision::Continue => req.phase_handler += 1,
                PhaseDecision::Suspend => return NextStep::WaitEvent,
                PhaseDecision::Done => return self.finalize_request(req, conn, None),
                PhaseDecision::Error(status) => {
                    return self.finalize_request(req, conn, Some(status))
                }
            }
        }

        self.finalize_request(req, conn, Some(StatusCode::NOT_FOUND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::ReactorEvent,
        states::{DelayState, Phase},
        testing::{request, Harness, ManualReactor},
    };
    use std::time::Duration;

    struct Decline(Phase);

    impl PhaseHandler for Decline {
        fn phase(&self) -> Phase {
            self.0
        }

        fn handle(&self, _: &mut Request, _: &mut Connection, _: &mut dyn Reactor) -> PhaseDecision {
            PhaseDecision::Continue
        }
    }

    #[test]
    fn handlers_run_in_phase_order() {
        let engine = PhaseEngine::with_handlers(vec![
            Box::new(StaticContent),
            Box::new(Decline(Phase::FindConfig)),
        ]);
        let mut reactor = ManualReactor::new();
        let mut conn = Connection::new(1, None);
        let mut req = request("/");

        // Without a resolved location the content phase falls back to 200.
        assert_eq!(engine.run_phases(&mut req, &mut conn, &mut reactor), NextStep::Finalize);
        assert_eq!(req.phase_handler, 1);
        assert_eq!(req.status, Some(StatusCode::OK));
    }

    #[test]
    fn running_off_the_end_is_not_found() {
        let engine = PhaseEngine::with_handlers(vec![Box::new(Decline(Phase::Content))]);
        let mut reactor = ManualReactor::new();
        let mut conn = Connection::new(1, None);
        let mut req = request("/");

        assert_eq!(engine.run_phases(&mut req, &mut conn, &mut reactor), NextStep::Finalize);
        assert_eq!(req.status, Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn finalize_happens_once() {
        let mut conn = Connection::new(1, None);
        let mut req = request("/");

        assert_eq!(finalize_request(&mut req, &mut conn, Some(StatusCode::BAD_REQUEST)), NextStep::Finalize);
        assert_eq!(finalize_request(&mut req, &mut conn, None), NextStep::Close);
        assert_eq!(req.status, Some(StatusCode::BAD_REQUEST));
    }

    // 500ms delay, no other events.
    #[test]
    fn delayed_request_resumes_after_configured_delay() {
        let delay = Duration::from_millis(500);
        let mut h = Harness::new(Some(delay));
        let t0 = h.reactor.now();

        assert_eq!(h.start(), NextStep::WaitEvent);
        assert_eq!(h.req.delay_state, DelayState::Suspended);

        assert_eq!(h.advance(Duration::from_millis(499)), None);
        assert_eq!(h.driver.reruns(), 0);

        assert_eq!(h.advance(Duration::from_millis(1)), Some(NextStep::Finalize));
        assert_eq!(h.driver.rerun_times(), vec![t0 + delay]);
        assert_eq!(h.req.delay_state, DelayState::Resumed);
        assert_eq!(h.req.status, Some(StatusCode::OK));
    }

    // Nothing configured.
    #[test]
    fn undelayed_request_finishes_in_the_first_run() {
        let mut h = Harness::new(None);

        assert_eq!(h.start(), NextStep::Finalize);
        assert_eq!(h.req.delay_state, DelayState::NotStarted);
        assert!(!h.conn.write.timer_set());
        assert!(h.reactor.interest_log().is_empty());
    }

    // Spurious write readiness at t=50ms.
    #[test]
    fn spurious_write_event_does_not_resume_early() {
        let delay = Duration::from_millis(200);
        let mut h = Harness::new(Some(delay));
        let t0 = h.reactor.now();
        h.start();

        h.advance(Duration::from_millis(50));
        assert_eq!(h.deliver(ReactorEvent::Writable), NextStep::WaitEvent);
        assert_eq!(h.req.delay_state, DelayState::Suspended);

        assert_eq!(h.advance(Duration::from_millis(149)), None);
        assert_eq!(h.driver.reruns(), 0);

        assert_eq!(h.advance(Duration::from_millis(1)), Some(NextStep::Finalize));
        assert_eq!(h.driver.rerun_times(), vec![t0 + delay]);
    }

    // Client leaves at t=100ms.
    #[test]
    fn client_disconnect_tears_down_without_rerun() {
        let mut h = Harness::new(Some(Duration::from_millis(300)));
        h.start();

        h.advance(Duration::from_millis(100));
        assert_eq!(h.deliver(ReactorEvent::PeerClosed), NextStep::Close);
        assert!(h.conn.is_destroyed());
        assert!(!h.conn.write.timer_set());
        assert_eq!(h.req.status, Some(StatusCode::CLIENT_CLOSED_REQUEST));

        assert_eq!(h.advance(Duration::from_secs(1)), None);
        assert_eq!(h.deliver(ReactorEvent::TimerExpired), NextStep::Close);
        assert_eq!(h.driver.reruns(), 0);
        assert!(h.req.response.is_none());
    }

    // Phase re-invoked at t=600ms after the delay already resumed.
    #[test]
    fn reentry_after_resume_does_not_delay_again() {
        let mut h = Harness::new(Some(Duration::from_millis(500)));
        h.start();
        h.advance(Duration::from_millis(500));
        assert_eq!(h.req.delay_state, DelayState::Resumed);

        h.advance(Duration::from_millis(100));
        let mut req = request("/");
        req.delay_state = h.req.delay_state;
        req.delay_config = h.req.delay_config;
        let mut conn = Connection::new(2, None);

        let decision = DelayStage.enter(&mut req, &mut conn, &mut h.reactor);
        assert_eq!(decision, PhaseDecision::Continue);
        assert!(!conn.write.timer_set());
        assert_eq!(req.delay_state, DelayState::Resumed);
    }
}
