// server type definitions

/// Routing work produced by session handler tasks and drained by the
/// single channel receiver, which owns all outbound delivery. Funneling
/// through one task keeps registry iteration and socket writes
/// serialized, and preserves per-sender FIFO order.
#[derive(Debug)]
pub enum RouteMsg {
    /// Re-announce every registered identity to every session.
    AnnounceRoster,
    /// Chat text relayed to everyone, sender included.
    Broadcast(u32, String),
    /// Resolved private message: goes to the target plus a sender echo.
    Private { sender_id: u32, target_id: u32, text: String },
    /// Private target did not resolve; only the sender hears about it.
    NoSuchTarget { sender_id: u32, name: String },
    /// Session ended; everyone remaining hears the leave.
    Leave(u32),
}
