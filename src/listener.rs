use std::{io, rc::Rc};

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::{config::Config, scheduling::Server};

/// Binds the configured address and serves it until the task is dropped.
///
/// Must run inside a `LocalSet`; connections are spawned as local tasks.
pub async fn run_main_listener(config: &Config) -> io::Result<()> {
    let listener = TcpListener::bind(&config.listen).await?;
    info!(addr = %listener.local_addr()?, "listening");
    serve(listener, config).await
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, config: &Config) -> io::Result<()> {
    let server = Rc::new(Server::new(config));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };

        let id = server.next_conn_id();
        debug!(conn = id, %peer, "accepted connection");

        let server = Rc::clone(&server);
        tokio::task::spawn_local(async move {
            server.serve_connection(stream, peer, id).await;
        });
    }
}
