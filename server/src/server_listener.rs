use std::net::SocketAddr;

use tokio::io;
use tokio::net::TcpListener;
use tokio::sync::mpsc::Sender;

use tracing::info;

use crate::registry::SharedRegistry;
use crate::server_types::RouteMsg;
use crate::session_handler::SessionHandler;

pub struct ServerListener {
    listener: TcpListener,
}

impl ServerListener {
    /// Bind failure here is fatal to the whole process at startup.
    pub async fn bind(addr: &str) -> io::Result<Self> {
        Ok(ServerListener {
            listener: TcpListener::bind(addr).await?,
        })
    }

    /// The actual bound address; lets tests bind port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop: one handler task per accepted connection.
    pub fn spawn_accept(
        self,
        registry: SharedRegistry,
        local_tx: Sender<RouteMsg>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Ok((tcp_socket, addr)) = self.listener.accept().await {
                    let (tcp_read, tcp_write) = tcp_socket.into_split();

                    info!("Server received new client connection {:?}", &addr);

                    let handler = SessionHandler::new(tcp_read, local_tx.clone(), registry.clone());
                    SessionHandler::spawn(handler, addr, tcp_write);
                } else {
                    info!("Server abnormally exiting .. ");
                    break;
                }
            }
        })
    }
}
