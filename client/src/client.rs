use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::SinkExt;
use tokio::select;
use tokio::sync::broadcast::Sender as BSender;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_stream::StreamExt;

use tracing::{debug, info};

use protocol::Request;

use crate::builder::{Builder, ClientBuilder, FrRead, FrWrite};
use crate::dispatcher::Dispatcher;
use crate::error::ClientError;
use crate::input_handler::InputHandler;
use crate::roster::SELF_UNASSIGNED;
use crate::types::{ChatEvent, ClientConfig};

const SHUTDOWN: u8 = 1;

/// Connection-side core of one chat client. Owns the socket halves
/// until `run` hands them to the read and write tasks; the caller keeps
/// a line sink, the render event stream, and a disconnect handle.
pub struct Client {
    name: String,
    self_id: Arc<AtomicU32>,
    shutdown_tx: BSender<u8>,
    fr: Option<FrRead>,
    fw: Option<FrWrite>,
    local_tx: Option<Sender<String>>,
    local_rx: Option<Receiver<String>>,
    event_tx: Option<Sender<ChatEvent>>,
    event_rx: Option<Receiver<ChatEvent>>,
}

/// Handle for proactive disconnect; idempotent and terminal.
#[derive(Clone)]
pub struct ClientHandle {
    shutdown_tx: BSender<u8>,
}

impl ClientHandle {
    /// Tears the read and write tasks down, which drops both socket
    /// halves. Safe to call any number of times.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(SHUTDOWN);
    }
}

impl Client {
    pub(crate) fn new(mut b: ClientBuilder) -> Self {
        Client {
            name: b.name.take().unwrap(),
            self_id: Arc::new(AtomicU32::new(SELF_UNASSIGNED)),
            shutdown_tx: b.shutdown_tx.take().unwrap(),
            fr: b.fr.take(),
            fw: b.fw.take(),
            local_tx: b.local_tx.take(),
            local_rx: b.local_rx.take(),
            event_tx: b.event_tx.take(),
            event_rx: b.event_rx.take(),
        }
    }

    /// Connect and complete the name handshake.
    pub async fn connect(config: ClientConfig) -> Result<Client, ClientError> {
        // a name with an embedded newline would smuggle extra protocol
        // lines through the handshake
        if config.name.is_empty() || config.name.contains('\n') {
            return Err(ClientError::InvalidName(config.name.clone()));
        }

        let mut builder = ClientBuilder::new(config.name.clone());
        builder.setup_connection(&config).await?;
        builder.setup_channels();

        let mut client = builder.build();
        client.register().await?;
        Ok(client)
    }

    // Handshaking: the chosen name goes out as the untagged first line;
    // there is no ack, the session is live once the line is written
    async fn register(&mut self) -> Result<(), ClientError> {
        self.fw
            .as_mut()
            .unwrap()
            .send(Request::Hello { name: self.name.clone() })
            .await?;
        Ok(())
    }

    /// Spawn the read and write tasks and hand the caller its ends.
    pub fn run(mut self) -> (ClientHandle, Sender<String>, Receiver<ChatEvent>) {
        self.spawn_read();
        self.spawn_write();

        let handle = ClientHandle { shutdown_tx: self.shutdown_tx.clone() };
        (handle, self.local_tx.take().unwrap(), self.event_rx.take().unwrap())
    }

    // Read task: decoded server lines into the dispatcher until the
    // stream ends or shutdown is signalled; either way the renderer
    // hears Disconnected exactly once from here.
    fn spawn_read(&mut self) {
        let mut fr = self.fr.take().unwrap();
        let mut dispatcher = Dispatcher::new(
            self.name.clone(),
            Arc::clone(&self.self_id),
            self.event_tx.take().unwrap(),
        );
        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let _read_handle = tokio::spawn(async move {
            loop {
                select! {
                    value = fr.next() => {
                        match value {
                            Some(Ok(resp)) => dispatcher.handle(resp).await,
                            Some(Err(e)) => {
                                debug!("Client connection closing error: {:?}", e);
                                break;
                            }
                            None => {
                                info!("Server remote has closed");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("reader received shutdown");
                        break;
                    }
                }
            }

            dispatcher.disconnected().await;
            let _ = shutdown_tx.send(SHUTDOWN);
        });
    }

    // Write task: drains caller-composed lines, classifies and frames
    // them out; a write failure is an implicit disconnect
    fn spawn_write(&mut self) {
        let mut local_rx = self.local_rx.take().unwrap();
        let mut fw = self.fw.take().unwrap();
        let self_id = Arc::clone(&self.self_id);
        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let _write_handle = tokio::spawn(async move {
            loop {
                select! {
                    line = local_rx.recv() => {
                        let Some(line) = line else {
                            // caller dropped its sender; treat as disconnect
                            let _ = shutdown_tx.send(SHUTDOWN);
                            break;
                        };

                        let req = InputHandler::parse_input(&line, self_id.load(Ordering::Relaxed));
                        if fw.send(req).await.is_err() {
                            debug!("Unable to write to server");
                            let _ = shutdown_tx.send(SHUTDOWN);
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("writer received shutdown");
                        break;
                    }
                }
            }
        });
    }
}
