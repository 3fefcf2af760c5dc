use std::{cell::Cell, io, net::SocketAddr, time::Duration};

use futures::future;
use tokio::{
    io::Interest,
    net::TcpStream,
    time::{sleep_until, timeout, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    canonical::{Response, StatusCode},
    config::Config,
    connection::{dispatch_event, Connection, Request},
    event::ReactorEvent,
    fsm::NextStep,
    handlers::shared::{read_request_head, write_response},
    reactor::SocketReactor,
    state_machine::{PhaseEngine, PipelineDriver},
    states::ReadHandler,
};

/// State shared by every connection task on the worker.
pub struct Server {
    engine: PhaseEngine,
    client_header_timeout: Duration,
    next_conn: Cell<u64>,
    next_request: Cell<u64>,
}

impl Server {
    pub fn new(config: &Config) -> Self {
        Self {
            engine: PhaseEngine::new(config),
            client_header_timeout: config.client_header_timeout,
            next_conn: Cell::new(1),
            next_request: Cell::new(1),
        }
    }

    pub fn next_conn_id(&self) -> u64 {
        let id = self.next_conn.get();
        self.next_conn.set(id + 1);
        id
    }

    fn next_request_id(&self) -> u64 {
        let id = self.next_request.get();
        self.next_request.set(id + 1);
        id
    }

    /// Runs one client connection to completion: one request, then close.
    pub async fn serve_connection(&self, mut stream: TcpStream, peer: SocketAddr, id: u64) {
        let mut conn = Connection::new(id, Some(peer));

        let head = match timeout(self.client_header_timeout, read_request_head(&stream)).await {
            Ok(Ok(Some(head))) => head,
            Ok(Ok(None)) => {
                debug!(conn = id, "client closed connection before sending a request");
                return;
            }
            Ok(Err(err)) => {
                info!(conn = id, %err, "client sent invalid request");
                send(&mut stream, id, &Response::error(StatusCode::BAD_REQUEST)).await;
                return;
            }
            Err(_) => {
                info!(conn = id, "client timed out sending request head");
                send(&mut stream, id, &Response::error(StatusCode::REQUEST_TIMEOUT)).await;
                return;
            }
        };

        let mut req = Request::new(self.next_request_id(), head, Instant::now());
        debug!(
            conn = id,
            request = req.id,
            method = %req.head.method,
            uri = %req.head.uri,
            "request"
        );

        let step = self
            .engine
            .run_phases(&mut req, &mut conn, &mut SocketReactor::new(&stream));
        let step = drive_request(&stream, &mut req, &mut conn, &self.engine, step).await;

        if step == NextStep::Finalize {
            if let Some(response) = &req.response {
                send(&mut stream, id, response).await;
            }
        }

        conn.close();
        access_log(&req, &conn);
    }
}

async fn send(stream: &mut TcpStream, conn: u64, response: &Response) {
    if let Err(err) = write_response(stream, response).await {
        debug!(conn, %err, "response write failed");
    }
}

fn access_log(req: &Request, conn: &Connection) {
    let status = req.status.map(StatusCode::as_u16).unwrap_or(0);
    let elapsed = req.started.elapsed();
    if status >= 500 {
        warn!(
            conn = conn.id,
            request = req.id,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            delay = ?req.delay_state,
            "{} {}",
            req.head.method,
            req.head.uri
        );
    } else {
        info!(
            conn = conn.id,
            request = req.id,
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            delay = ?req.delay_state,
            "{} {}",
            req.head.method,
            req.head.uri
        );
    }
}

/// Feeds reactor events to the request until it stops waiting.
///
/// Returns `Finalize` or `Close`, never `WaitEvent`.
pub async fn drive_request(
    stream: &TcpStream,
    req: &mut Request,
    conn: &mut Connection,
    driver: &dyn PipelineDriver,
    mut step: NextStep,
) -> NextStep {
    while step == NextStep::WaitEvent {
        let watch_close = req.read_handler == ReadHandler::TestReading;
        step = match next_event(stream, conn, watch_close).await {
            Some(event) => {
                dispatch_event(req, conn, &mut SocketReactor::new(stream), driver, event)
            }
            None => {
                error!(
                    conn = conn.id,
                    request = req.id,
                    "request suspended with nothing to wake it"
                );
                driver.finalize_request(req, conn, Some(StatusCode::INTERNAL_SERVER_ERROR))
            }
        };
    }
    step
}

/// Waits for the first of: client read-side readiness, the connection timer,
/// write readiness. Only registered interest and an armed timer are polled.
///
/// With `watch_close` set, a peer close is still reported after read interest
/// was dropped. Unread client data is left in the socket.
///
/// Returns `None` when nothing is armed, since the wait would never end.
pub async fn next_event(
    stream: &TcpStream,
    conn: &Connection,
    watch_close: bool,
) -> Option<ReactorEvent> {
    let deadline = conn.write.deadline();
    if deadline.is_none() && !conn.read.active && !conn.write.active {
        return None;
    }

    let read = async {
        if conn.read.active {
            let mut byte = [0u8; 1];
            return match stream.peek(&mut byte).await {
                Ok(0) => ReactorEvent::PeerClosed,
                Ok(_) => ReactorEvent::Readable,
                Err(err) => ReactorEvent::Error(err.kind()),
            };
        }
        if !watch_close {
            return future::pending::<ReactorEvent>().await;
        }
        wait_read_closed(stream).await
    };

    let timer = async {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => future::pending::<()>().await,
        }
    };

    let write = async {
        if !conn.write.active {
            return future::pending::<ReactorEvent>().await;
        }
        match stream.writable().await {
            Ok(()) => ReactorEvent::Writable,
            Err(err) => ReactorEvent::Error(err.kind()),
        }
    };

    let event = tokio::select! {
        biased;
        event = read => event,
        _ = timer => ReactorEvent::TimerExpired,
        event = write => event,
    };
    Some(event)
}

/// Resolves once the peer has closed its side or the socket failed.
///
/// Plain readability is consumed from the readiness state only, so buffered
/// data neither wakes this up again nor gets read.
async fn wait_read_closed(stream: &TcpStream) -> ReactorEvent {
    loop {
        let ready = match stream.ready(Interest::READABLE).await {
            Ok(ready) => ready,
            Err(err) => return ReactorEvent::Error(err.kind()),
        };
        if ready.is_read_closed() {
            return match stream.take_error() {
                Ok(Some(err)) => ReactorEvent::Error(err.kind()),
                Ok(None) => ReactorEvent::PeerClosed,
                Err(err) => ReactorEvent::Error(err.kind()),
            };
        }
        let _ = stream.try_io(Interest::READABLE, || {
            Err::<(), _>(io::Error::from(io::ErrorKind::WouldBlock))
        });
    }
}
