use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{self, Error, ErrorKind};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::Sender;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

use tracing::{debug, error, info};

use protocol::{Request, ServerCodec};

use crate::registry::SharedRegistry;
use crate::server_types::RouteMsg;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// Drives one accepted connection through its lifetime:
// Connecting (name handshake) -> Active (read loop) -> Closing -> Closed.
// Essentially this models a client actor on the server side.
pub struct SessionHandler {
    client_id: u32,
    fr: FramedRead<OwnedReadHalf, ServerCodec>,
    task_tx: Sender<RouteMsg>,
    registry: SharedRegistry,
}

impl SessionHandler {
    pub fn new(tcp_read: OwnedReadHalf, task_tx: Sender<RouteMsg>, registry: SharedRegistry) -> Self {
        Self {
            client_id: 0, // assigned during register()
            fr: FramedRead::new(tcp_read, ServerCodec),
            task_tx,
            registry,
        }
    }

    // Spawn tokio task to own this connection's reads
    pub fn spawn(mut h: SessionHandler, addr: SocketAddr, tcp_write: OwnedWriteHalf) {
        let _ = tokio::spawn(async move {
            // only a registered session gets a read loop
            if h.register(addr, tcp_write).await.is_ok() {
                h.handle_read().await;
                h.process_disconnect().await;
            }
        });
    }

    // Connecting: exactly one untagged line with the chosen name, then
    // id allocation and registry entry under a single lock acquisition
    async fn register(&mut self, addr: SocketAddr, tcp_write: OwnedWriteHalf) -> io::Result<()> {
        let name = self.read_name().await?;

        let connected = {
            let mut reg = self.registry.lock().await;
            self.client_id = reg.allocate_id();
            reg.join(self.client_id, name.clone(), FramedWrite::new(tcp_write, ServerCodec));
            reg.len()
        };

        info!(
            "registered {:?} as {:?} with id {}, {} client(s) connected",
            addr, name, self.client_id, connected
        );
        Ok(())
    }

    async fn read_name(&mut self) -> io::Result<String> {
        // Wait for the chat name line, bounded so an idle half-open
        // connect cannot pin a task forever
        let first = timeout(HANDSHAKE_TIMEOUT, self.fr.next())
            .await
            .map_err(|_| Error::new(ErrorKind::TimedOut, "no name line within handshake window"))?;

        match first {
            Some(Ok(Request::Hello { name })) => Ok(name),
            Some(Ok(other)) => {
                error!("expected a name line, got {:?}", other);
                Err(Error::new(ErrorKind::InvalidData, "expected a name line"))
            }
            Some(Err(e)) => Err(e),
            None => Err(Error::new(ErrorKind::UnexpectedEof, "connection closed before handshake")),
        }
    }

    // Active: announce the roster, read one request, dispatch, repeat.
    // Any read error counts as a disconnect; nothing is retried.
    async fn handle_read(&mut self) {
        loop {
            self.task_tx.send(RouteMsg::AnnounceRoster).await.expect("Unable to tx");

            match self.fr.next().await {
                Some(Ok(Request::Broadcast { text, .. })) => {
                    // the sender id claimed on the wire is ignored; the
                    // relay carries the id this server assigned
                    self.task_tx
                        .send(RouteMsg::Broadcast(self.client_id, text))
                        .await
                        .expect("Unable to tx");
                }
                Some(Ok(Request::Private { target, text })) => {
                    let resolved = self.registry.lock().await.lookup_by_name(&target);
                    let msg = match resolved {
                        Some(target_id) => RouteMsg::Private {
                            sender_id: self.client_id,
                            target_id,
                            text,
                        },
                        None => RouteMsg::NoSuchTarget {
                            sender_id: self.client_id,
                            name: target,
                        },
                    };
                    self.task_tx.send(msg).await.expect("Unable to tx");
                }
                Some(Ok(Request::RosterRefresh)) => {
                    // loop top announces anyway; nothing further to do
                    debug!("roster refresh requested by {}", self.client_id);
                }
                Some(Ok(Request::Hello { .. })) | Some(Ok(Request::Unknown)) => {
                    debug!("ignoring unroutable line from {}", self.client_id);
                }
                Some(Err(e)) => {
                    debug!("Server connection closing error: {:?}", e);
                    break;
                }
                None => {
                    info!("Client connection has closed");
                    break;
                }
            }
        }
    }

    // Closing: drop out of the registry first, then tell everyone left
    async fn process_disconnect(&mut self) {
        let removed = self.registry.lock().await.leave(self.client_id);

        if let Some(session) = removed {
            info!("User {} has left", session.identity.name);
            self.task_tx
                .send(RouteMsg::Leave(self.client_id))
                .await
                .expect("Unable to tx");
        }
    }
}
