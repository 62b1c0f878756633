//! Builder to simplify client construction
//! Provides the connect / channels / build pipeline in one place

use async_trait::async_trait;

use tokio::net::{tcp, TcpStream};
use tokio::sync::broadcast;
use tokio::sync::broadcast::Sender as BSender;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::codec::{FramedRead, FramedWrite};

use tracing::{debug, error};

use protocol::ClientCodec;

use crate::client::Client;
use crate::error::ClientError;
use crate::types::{ChatEvent, ClientConfig};

pub type FrRead = FramedRead<tcp::OwnedReadHalf, ClientCodec>;
pub type FrWrite = FramedWrite<tcp::OwnedWriteHalf, ClientCodec>;

const CHANNEL_SIZE: usize = 64;

#[async_trait]
pub trait Builder {
    type ClientType;

    async fn setup_connection(&mut self, config: &ClientConfig) -> Result<(), ClientError>;
    fn setup_channels(&mut self);
    fn build(self) -> Self::ClientType;
}

pub struct ClientBuilder {
    pub(crate) name: Option<String>,
    pub(crate) fr: Option<FrRead>,
    pub(crate) fw: Option<FrWrite>,
    pub(crate) shutdown_tx: Option<BSender<u8>>,
    pub(crate) local_tx: Option<Sender<String>>,
    pub(crate) local_rx: Option<Receiver<String>>,
    pub(crate) event_tx: Option<Sender<ChatEvent>>,
    pub(crate) event_rx: Option<Receiver<ChatEvent>>,
}

#[async_trait]
impl Builder for ClientBuilder {
    type ClientType = Client;

    // Connect to the chat server
    async fn setup_connection(&mut self, config: &ClientConfig) -> Result<(), ClientError> {
        debug!("Client starting, connecting to server {:?}", config.addr());

        let socket = TcpStream::connect(config.addr()).await.map_err(|e| {
            error!("Unable to connect to server");
            e
        })?;

        // split tcpstream so we can hand off to r & w tasks
        let (tcp_read, tcp_write) = socket.into_split();

        self.fr = Some(FramedRead::new(tcp_read, ClientCodec));
        self.fw = Some(FramedWrite::new(tcp_write, ClientCodec));

        Ok(())
    }

    // Setup channels support:
    // 1) composed lines from the caller into the write task
    // 2) render events out to the caller
    // 3) shutdown fan-out across the spawned tasks
    fn setup_channels(&mut self) {
        let (local_tx, local_rx) = mpsc::channel::<String>(CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(CHANNEL_SIZE);
        let (shutdown_tx, _) = broadcast::channel(16);

        self.local_tx = Some(local_tx);
        self.local_rx = Some(local_rx);
        self.event_tx = Some(event_tx);
        self.event_rx = Some(event_rx);
        self.shutdown_tx = Some(shutdown_tx);
    }

    // Build target structure (Client), moving the builder into it
    fn build(self) -> Client {
        Client::new(self)
    }
}

impl ClientBuilder {
    pub fn new(name: String) -> Self {
        Self {
            name: Some(name),
            fr: None,
            fw: None,
            shutdown_tx: None,
            local_tx: None,
            local_rx: None,
            event_tx: None,
            event_rx: None,
        }
    }
}
