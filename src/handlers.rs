pub mod content;
pub mod delay;
pub mod resume;
pub mod shared;
pub mod transport;

use tracing::debug;

use crate::{
    config::Locations,
    connection::{Connection, Request},
    fsm::PhaseDecision,
    reactor::Reactor,
    states::Phase,
};

/// A stage installed at a fixed pipeline position.
pub trait PhaseHandler {
    fn phase(&self) -> Phase;

    fn handle(
        &self,
        req: &mut Request,
        conn: &mut Connection,
        reactor: &mut dyn Reactor,
    ) -> PhaseDecision;
}

/// Resolves the request's location and the settings inherited into it.
pub struct FindConfig {
    locations: Locations,
}

impl FindConfig {
    pub fn new(locations: Locations) -> Self {
        Self { locations }
    }
}

impl PhaseHandler for FindConfig {
    fn phase(&self) -> Phase {
        Phase::FindConfig
    }

    fn handle(&self, req: &mut Request, conn: &mut Connection, _: &mut dyn Reactor) -> PhaseDecision {
        let loc = self.locations.find(&req.head.uri);
        debug!(
            conn = conn.id,
            request = req.id,
            uri = %req.head.uri,
            location = %loc.path,
            delay_ms = loc.delay.map(|d| d.as_millis() as u64),
            "using location"
        );
        req.delay_config = loc.delay;
        req.location = Some(loc.clone());
        PhaseDecision::Continue
    }
}
