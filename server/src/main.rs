use tokio::io;
use tokio::sync::mpsc;

use tracing::{info, Level};
use tracing_subscriber::fmt;

use server::delivery::Delivery;
use server::registry::Registry;
use server::server_channel::ChannelReceiver;
use server::server_listener::ServerListener;
use server::server_types::RouteMsg;

const SERVER: &str = "127.0.0.1:54000";
const BOUNDED_CHANNEL_SIZE: usize = 64;

#[tokio::main]
async fn main() -> io::Result<()> {
    fmt()
        .compact()
        .with_max_level(Level::INFO)
        .init();

    let addr = std::env::args().nth(1).unwrap_or_else(|| SERVER.to_owned());

    let listener = ServerListener::bind(&addr).await.expect("Unable to bind to server address");
    info!("Server starting.. {:?}", &addr);

    // Setup registry, shared across handler tasks behind one mutex
    let registry = Registry::shared();
    let outgoing = Delivery::new(&registry);

    // Setup local msg passing channel between handlers and delivery
    let (local_tx, local_rx) = mpsc::channel::<RouteMsg>(BOUNDED_CHANNEL_SIZE);

    let accept_handle = listener.spawn_accept(registry, local_tx);
    let route_handle = ChannelReceiver::spawn_receive(local_rx, outgoing);

    let _ = tokio::join!(accept_handle, route_handle);

    Ok(())
}
