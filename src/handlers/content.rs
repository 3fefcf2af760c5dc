use crate::{
    canonical::{Response, StatusCode},
    connection::{Connection, Request},
    fsm::PhaseDecision,
    handlers::PhaseHandler,
    reactor::Reactor,
    states::Phase,
};

/// Answers with the location's configured status and body.
pub struct StaticContent;

impl PhaseHandler for StaticContent {
    fn phase(&self) -> Phase {
        Phase::Content
    }

    fn handle(&self, req: &mut Request, _: &mut Connection, _: &mut dyn Reactor) -> PhaseDecision {
        let (status, body) = match &req.location {
            Some(loc) => (
                StatusCode::new(loc.status).unwrap_or(StatusCode::OK),
                loc.body.clone(),
            ),
            None => (StatusCode::OK, None),
        };

        let body = match body {
            Some(body) => body.into_bytes(),
            None if status.is_error() => return PhaseDecision::Error(status),
            None => format!("{}\n", status.reason()).into_bytes(),
        };

        let body = if req.head.method.eq_ignore_ascii_case("HEAD") {
            Vec::new()
        } else {
            body
        };

        req.response = Some(Response::new(status, body));
        PhaseDecision::Done
    }
}
