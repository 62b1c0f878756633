use std::sync::Arc;

use futures::SinkExt;
use tracing::{debug, warn};

use protocol::Response;

use crate::registry::SharedRegistry;

// handles msg delivery back to clients
pub struct Delivery {
    registry: SharedRegistry,
}

impl Delivery {
    pub fn new(registry: &SharedRegistry) -> Self {
        Delivery {
            registry: Arc::clone(registry),
        }
    }

    /// One framed line to one session; a failed write marks the session
    /// dead so later deliveries skip it (its reader does the cleanup).
    pub async fn send(&mut self, id: u32, resp: Response) {
        let mut reg = self.registry.lock().await;

        if let Some(session) = reg.session_mut(id) {
            if session.alive && session.outbound.send(resp).await.is_err() {
                warn!("write to client {} failed, marking session dead", id);
                session.alive = false;
            }
        }
    }

    /// Private relay: the target gets the line and the sender gets the
    /// same line echoed back, so both render from the one relayed copy.
    pub async fn send_pair(&mut self, target_id: u32, sender_id: u32, resp: Response) {
        self.send(target_id, resp.clone()).await;
        self.send(sender_id, resp).await;
    }

    /// Everyone currently registered, the originator included.
    pub async fn broadcast(&mut self, resp: Response) {
        let mut reg = self.registry.lock().await;

        for session in reg.sessions_mut() {
            if !session.alive {
                continue;
            }
            debug!("delivering {:?} to client {}", &resp, session.identity.id);
            if session.outbound.send(resp.clone()).await.is_err() {
                warn!(
                    "write to client {} failed, marking session dead",
                    session.identity.id
                );
                session.alive = false;
            }
        }
    }

    /// Push a join line for every registered identity to every session.
    /// Receivers dedupe by id, so repeats are harmless. One lock scope,
    /// so the roster can not shift mid-announce.
    pub async fn announce_roster(&mut self) {
        let mut reg = self.registry.lock().await;
        let roster = reg.snapshot();

        for ident in &roster {
            let announce = Response::Join {
                id: ident.id,
                name: ident.name.clone(),
            };
            for session in reg.sessions_mut() {
                if !session.alive {
                    continue;
                }
                if session.outbound.send(announce.clone()).await.is_err() {
                    warn!(
                        "write to client {} failed, marking session dead",
                        session.identity.id
                    );
                    session.alive = false;
                }
            }
        }
    }
}
