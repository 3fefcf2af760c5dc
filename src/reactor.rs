use std::{io, time::Duration};

use tokio::{net::TcpStream, time::Instant};

use crate::{
    connection::Connection,
    error::{Direction, Error, Result},
    event::InterestChange,
};

/// Timer and readiness-interest services the delay machinery needs from the event loop.
pub trait Reactor {
    fn now(&self) -> Instant;

    /// Adds or drops interest in one direction of the connection's socket.
    fn set_interest(&mut self, direction: Direction, enable: bool) -> io::Result<()>;

    /// Keeps read interest registered at the idle level.
    fn handle_read_event(&mut self, conn: &mut Connection) -> Result<()> {
        let change = conn.read.idle_interest();
        apply(self, conn, Direction::Read, change)
    }

    /// Keeps write interest registered at the idle level.
    fn handle_write_event(&mut self, conn: &mut Connection) -> Result<()> {
        let change = conn.write.idle_interest();
        apply(self, conn, Direction::Write, change)
    }

    /// Arms the connection's one-shot timer `delay` from now.
    fn add_timer(&mut self, conn: &mut Connection, delay: Duration) {
        let deadline = self.now() + delay;
        conn.write.set_timer(deadline);
    }
}

fn apply<R: Reactor + ?Sized>(
    reactor: &mut R,
    conn: &mut Connection,
    direction: Direction,
    change: InterestChange,
) -> Result<()> {
    let enable = match change {
        InterestChange::Keep => return Ok(()),
        InterestChange::Add => true,
        InterestChange::Remove => false,
    };

    reactor
        .set_interest(direction, enable)
        .map_err(|source| Error::InterestRegistration {
            conn: conn.id,
            direction,
            source,
        })?;

    match direction {
        Direction::Read => conn.read.active = enable,
        Direction::Write => conn.write.active = enable,
    }
    Ok(())
}

/// Reactor view over a live client socket.
///
/// The connection loop polls whatever interest is marked active; registering
/// only has to verify the socket can still be polled.
pub struct SocketReactor<'a> {
    stream: &'a TcpStream,
}

impl<'a> SocketReactor<'a> {
    pub fn new(stream: &'a TcpStream) -> Self {
        Self { stream }
    }
}

impl Reactor for SocketReactor<'_> {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn set_interest(&mut self, _direction: Direction, enable: bool) -> io::Result<()> {
        if !enable {
            return Ok(());
        }
        match self.stream.take_error()? {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
