use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc::Sender;

use tracing::debug;

use protocol::Response;

use crate::roster::RosterMirror;
use crate::types::ChatEvent;

/// Interprets inbound server messages for one client: maintains the
/// roster mirror, classifies chat lines, and feeds the renderer through
/// the event channel. Owns the mirror exclusively.
pub struct Dispatcher {
    roster: RosterMirror,
    self_id: Arc<AtomicU32>,
    events: Sender<ChatEvent>,
    rng: StdRng,
}

impl Dispatcher {
    pub fn new(own_name: String, self_id: Arc<AtomicU32>, events: Sender<ChatEvent>) -> Self {
        Dispatcher {
            roster: RosterMirror::new(own_name),
            self_id,
            events,
            rng: StdRng::from_entropy(),
        }
    }

    /// One decoded line in, render events out. Every processed line is
    /// followed by a fresh roster snapshot for the renderer.
    pub async fn handle(&mut self, resp: Response) {
        match resp {
            Response::Join { id, name } => {
                self.roster.observe_join(id, &name, &mut self.rng);
                // publish the adopted id for the outbound path
                self.self_id.store(self.roster.self_id(), Ordering::Relaxed);
            }
            Response::Broadcast { sender_id, text } => {
                self.emit_chat(sender_id, text, false).await;
            }
            Response::Private { sender_id, text } => {
                self.emit_chat(sender_id, text, true).await;
            }
            Response::Leave { id } => {
                if let Some(name) = self.roster.remove(id) {
                    self.emit(ChatEvent::Notice(format!("{} disconnected", name))).await;
                }
            }
            Response::NoSuchTarget { name } => {
                self.emit(ChatEvent::Notice(format!("no such user: {}", name))).await;
            }
            Response::Unknown => debug!("dropping unrecognized server line"),
        }

        self.emit(ChatEvent::Roster(self.roster.snapshot())).await;
    }

    /// Surface the end of the connection to the renderer.
    pub async fn disconnected(&mut self) {
        self.emit(ChatEvent::Disconnected).await;
    }

    async fn emit_chat(&mut self, sender_id: u32, text: String, private: bool) {
        // a message from an id we have not seen join yet is dropped,
        // not buffered
        let named = self.roster.name_color(sender_id).map(|(n, c)| (n.to_owned(), c));
        let Some((name, color)) = named else {
            debug!("dropping chat line from unknown sender {}", sender_id);
            return;
        };

        self.emit(ChatEvent::Message { name, color, text, private }).await;
    }

    async fn emit(&mut self, event: ChatEvent) {
        // a gone renderer means nobody is watching; drop quietly
        if self.events.send(event).await.is_err() {
            debug!("render channel closed, dropping event");
        }
    }
}
