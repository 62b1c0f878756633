use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;

use protocol::ServerCodec;

// current client registry data, shared across handler tasks
pub type SharedRegistry = Arc<Mutex<Registry>>;
pub type Outbound = FramedWrite<OwnedWriteHalf, ServerCodec>;

const COUNTER_SEED: u32 = 1;

/// One connected identity: the server-assigned id plus the
/// client-chosen display name (not guaranteed unique).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: u32,
    pub name: String,
}

/// Live per-connection state. The handler task that created it drives
/// its lifecycle; the registry holds it so other sessions can route to
/// its outbound writer.
pub struct Session {
    pub identity: Identity,
    pub outbound: Outbound,
    pub alive: bool,
}

/// Single source of truth for who is connected.
///
/// Sessions, the id -> name directory and the id counter all sit behind
/// one mutex, so every join/leave/lookup and every broadcast iteration
/// is linearizable -- no observer can see a partial join or leave.
pub struct Registry {
    sessions: HashMap<u32, Session>,
    directory: HashMap<u32, String>,
    next_id: u32,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            sessions: HashMap::new(),
            directory: HashMap::new(),
            next_id: COUNTER_SEED,
        }
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Registry::new()))
    }

    // Ids count up under the registry lock; never reused within a run
    pub fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Adds the session; returns false (and changes nothing) if the id
    /// is already taken.
    pub fn join(&mut self, id: u32, name: String, outbound: Outbound) -> bool {
        if self.sessions.contains_key(&id) {
            return false;
        }
        self.directory.insert(id, name.clone());
        self.sessions.insert(
            id,
            Session {
                identity: Identity { id, name },
                outbound,
                alive: true,
            },
        );
        true
    }

    /// Removes the session and its directory entry; None if absent.
    pub fn leave(&mut self, id: u32) -> Option<Session> {
        self.directory.remove(&id);
        self.sessions.remove(&id)
    }

    /// Point-in-time view of everyone connected, ordered by id.
    pub fn snapshot(&self) -> Vec<Identity> {
        let mut all: Vec<Identity> = self.sessions.values().map(|s| s.identity.clone()).collect();
        all.sort_by_key(|ident| ident.id);
        all
    }

    /// Resolves a display name to an id. Names are not unique; the
    /// lowest id wins on collision.
    pub fn lookup_by_name(&self, name: &str) -> Option<u32> {
        self.snapshot().into_iter().find(|ident| ident.name == name).map(|ident| ident.id)
    }

    pub fn session_mut(&mut self, id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    fn consistent(&self) -> bool {
        self.sessions.len() == self.directory.len()
            && self.sessions.keys().all(|id| self.directory.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    // a real write half so Session carries what production code carries
    async fn outbound() -> Outbound {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let _ = accepted.unwrap();
        let (_read, write) = connected.unwrap().into_split();
        FramedWrite::new(write, ServerCodec)
    }

    #[tokio::test]
    async fn join_and_leave_keep_sessions_and_directory_in_step() {
        let mut reg = Registry::new();
        let a = reg.allocate_id();
        let b = reg.allocate_id();
        assert!(reg.join(a, "anna".into(), outbound().await));
        assert!(reg.join(b, "bert".into(), outbound().await));
        assert!(reg.consistent());
        assert_eq!(reg.len(), 2);

        let gone = reg.leave(a).unwrap();
        assert_eq!(gone.identity.name, "anna");
        assert!(reg.consistent());
        assert_eq!(reg.len(), 1);

        // double leave is a no-op
        assert!(reg.leave(a).is_none());
        assert!(reg.consistent());
    }

    #[tokio::test]
    async fn duplicate_id_join_is_rejected() {
        let mut reg = Registry::new();
        let id = reg.allocate_id();
        assert!(reg.join(id, "anna".into(), outbound().await));
        assert!(!reg.join(id, "impostor".into(), outbound().await));
        assert_eq!(reg.snapshot(), vec![Identity { id, name: "anna".into() }]);
    }

    #[tokio::test]
    async fn allocated_ids_count_up_from_one() {
        let mut reg = Registry::new();
        assert_eq!(reg.allocate_id(), 1);
        assert_eq!(reg.allocate_id(), 2);
        assert_eq!(reg.allocate_id(), 3);
    }

    #[tokio::test]
    async fn snapshot_is_ordered_by_id() {
        let mut reg = Registry::new();
        for name in ["anna", "bert", "cara"] {
            let id = reg.allocate_id();
            reg.join(id, name.into(), outbound().await);
        }
        let ids: Vec<u32> = reg.snapshot().iter().map(|ident| ident.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn name_lookup_prefers_lowest_id_on_collision() {
        let mut reg = Registry::new();
        let first = reg.allocate_id();
        let second = reg.allocate_id();
        reg.join(second, "anna".into(), outbound().await);
        reg.join(first, "anna".into(), outbound().await);
        assert_eq!(reg.lookup_by_name("anna"), Some(first));
        assert_eq!(reg.lookup_by_name("nobody"), None);
    }
}
