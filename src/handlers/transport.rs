use tracing::{error, info};

use crate::{
    canonical::StatusCode,
    connection::{Connection, Request},
    fsm::NextStep,
    reactor::Reactor,
    state_machine::finalize_request,
};

/// Read handler that only watches for the client going away.
///
/// A peer close or socket error finalizes the request as client-closed, which
/// tears the connection down together with its timer. Pending client data is
/// left unread; read interest is dropped so it does not keep firing, and the
/// connection loop keeps watching for the close on its own.
pub fn test_reading(req: &mut Request, conn: &mut Connection, reactor: &mut dyn Reactor) -> NextStep {
    if conn.read.eof || conn.read.error {
        info!(
            conn = conn.id,
            request = req.id,
            peer = ?conn.peer,
            error = conn.read.error,
            "client prematurely closed connection"
        );
        return finalize_request(req, conn, Some(StatusCode::CLIENT_CLOSED_REQUEST));
    }

    reregister_read(req, conn, reactor)
}

/// Read handler used while the pipeline does not want client data.
pub fn block_reading(req: &mut Request, conn: &mut Connection, reactor: &mut dyn Reactor) -> NextStep {
    if !conn.read.active {
        return NextStep::WaitEvent;
    }
    reregister_read(req, conn, reactor)
}

fn reregister_read(req: &mut Request, conn: &mut Connection, reactor: &mut dyn Reactor) -> NextStep {
    if let Err(err) = reactor.handle_read_event(conn) {
        error!(conn = conn.id, request = req.id, %err, "read interest update failed");
        return finalize_request(req, conn, Some(StatusCode::INTERNAL_SERVER_ERROR));
    }
    NextStep::WaitEvent
}
