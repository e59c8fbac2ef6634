use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    select,
};
use tracing::{info, warn};

use crate::{
    registry::{Registry, Session},
    router::{self, Flow},
    wire,
};

type TcpRegistry = Registry<OwnedWriteHalf>;
type TcpSession = Session<OwnedWriteHalf>;

/// Accepts chat connections and owns the shared registry.
pub struct Server {
    listener: TcpListener,
    registry: Arc<TcpRegistry>,
}

impl Server {
    pub fn new(listener: TcpListener) -> Self {
        Self {
            listener,
            registry: Arc::new(Registry::new()),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop, running until the shutdown future resolves. A
    /// failed accept is logged and the loop continues; only listener
    /// setup failure (bind) aborts startup, before this runs.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, registry } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => spawn_session_worker(stream, peer, &registry),
                        Err(err) => warn!(error = ?err, "failed to accept connection"),
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

// One worker owns one connection end-to-end. Workers are unbounded;
// there is no admission control on connection count.
fn spawn_session_worker(stream: TcpStream, peer: SocketAddr, registry: &Arc<TcpRegistry>) {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, registry, peer).await {
            warn!(peer = %peer, error = ?err, "session closed with error");
        }
    });
}

async fn handle_connection(
    stream: TcpStream,
    registry: Arc<TcpRegistry>,
    peer: SocketAddr,
) -> Result<()> {
    let (mut reader, writer) = stream.into_split();
    let session = Arc::new(Session::new(writer));

    let username = match perform_handshake(&registry, &mut reader, &session).await? {
        Some(username) => username,
        None => return Ok(()),
    };

    info!(%peer, %username, "client registered");
    registry.publish_user_list().await;

    let result = run_session_loop(&registry, &session, &mut reader, &username).await;

    // Cleanup runs on the error path too: a transport failure is an
    // implicit disconnect, observed by peers only as a list update.
    // The republish is skipped if a failed broadcast already removed
    // this entry and refreshed the list.
    if registry.unregister(&username).await {
        info!(%peer, %username, "client disconnected");
        registry.publish_user_list().await;
    }
    session.close().await;

    result
}

/// Sends the prompt and resolves one candidate username. Returns
/// `None` when the session ends unregistered: early EOF, or a
/// rejected name, which terminates rather than re-prompts.
async fn perform_handshake(
    registry: &TcpRegistry,
    reader: &mut OwnedReadHalf,
    session: &Arc<TcpSession>,
) -> Result<Option<String>> {
    session.send(wire::USERNAME_PROMPT).await?;

    let candidate = match wire::read_payload(reader).await? {
        Some(payload) => payload.trim().to_string(),
        None => return Ok(None),
    };

    if let Err(error) = registry.register(&candidate, Arc::clone(session)).await {
        info!(username = %candidate, ?error, "registration rejected");
        session.send(wire::REJECTION).await?;
        session.close().await;
        return Ok(None);
    }

    Ok(Some(candidate))
}

async fn run_session_loop(
    registry: &TcpRegistry,
    session: &TcpSession,
    reader: &mut OwnedReadHalf,
    username: &str,
) -> Result<()> {
    loop {
        let payload = match wire::read_payload(reader).await {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(err) => return Err(err.into()),
        };

        match router::dispatch(registry, session, username, &payload).await? {
            Flow::Continue => {}
            Flow::Disconnect => break,
        }
    }
    Ok(())
}
