use tokio::sync::mpsc::Receiver;
use tracing::{debug, info};

use protocol::Response;

use crate::delivery::Delivery;
use crate::server_types::RouteMsg;

pub struct ChannelReceiver;

impl ChannelReceiver {
    /// Drain routing messages and turn them into outbound wire lines.
    /// This task is the only writer of client sockets, so messages from
    /// any one sender go out in the order they arrived here.
    pub fn spawn_receive(
        mut local_rx: Receiver<RouteMsg>,
        mut outgoing: Delivery,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Some(message) = local_rx.recv().await {
                    debug!("Local channel msg received {:?}", &message);

                    match message {
                        RouteMsg::AnnounceRoster => {
                            outgoing.announce_roster().await;
                        }
                        RouteMsg::Broadcast(sender_id, text) => {
                            // sender included: its own echo is the one copy it renders
                            outgoing.broadcast(Response::Broadcast { sender_id, text }).await;
                        }
                        RouteMsg::Private { sender_id, target_id, text } => {
                            outgoing
                                .send_pair(target_id, sender_id, Response::Private { sender_id, text })
                                .await;
                        }
                        RouteMsg::NoSuchTarget { sender_id, name } => {
                            outgoing.send(sender_id, Response::NoSuchTarget { name }).await;
                        }
                        RouteMsg::Leave(id) => {
                            outgoing.broadcast(Response::Leave { id }).await;
                        }
                    }
                } else {
                    info!("No more channel senders");
                    break;
                }
            }
        })
    }
}
