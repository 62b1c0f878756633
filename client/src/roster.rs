use std::collections::BTreeMap;

use rand::Rng;

use crate::types::{Color, RosterEntry};

/// Sentinel for "the server has not told us our id yet".
/// Real ids are assigned from 1 up.
pub const SELF_UNASSIGNED: u32 = 0;

/// Local mirror of who is connected, owned exclusively by one
/// dispatcher. Keyed by id so duplicate join announcements collapse
/// to a single entry.
pub struct RosterMirror {
    entries: BTreeMap<u32, (String, Color)>,
    own_name: String,
    self_id: u32,
}

impl RosterMirror {
    pub fn new(own_name: String) -> Self {
        RosterMirror {
            entries: BTreeMap::new(),
            own_name,
            self_id: SELF_UNASSIGNED,
        }
    }

    /// Record a join announcement. Idempotent by id; the color rolled at
    /// first sight sticks. A join echoing our own chosen name while the
    /// self id is still unassigned is how we learn the id the server
    /// gave us -- there is no explicit ack in the protocol, and two
    /// clients picking the same name can misdirect this (known gap).
    pub fn observe_join(&mut self, id: u32, name: &str, rng: &mut impl Rng) {
        self.entries
            .entry(id)
            .or_insert_with(|| (name.to_owned(), random_color(rng)));

        if self.self_id == SELF_UNASSIGNED && name == self.own_name {
            self.self_id = id;
        }
    }

    /// Forget an id; returns its display name for the leave notice.
    pub fn remove(&mut self, id: u32) -> Option<String> {
        self.entries.remove(&id).map(|(name, _)| name)
    }

    pub fn name_color(&self, id: u32) -> Option<(&str, Color)> {
        self.entries.get(&id).map(|(name, color)| (name.as_str(), *color))
    }

    pub fn self_id(&self) -> u32 {
        self.self_id
    }

    /// Everyone currently mirrored, in id order.
    pub fn snapshot(&self) -> Vec<RosterEntry> {
        self.entries
            .iter()
            .map(|(id, (name, color))| RosterEntry {
                id: *id,
                name: name.clone(),
                color: *color,
            })
            .collect()
    }
}

fn random_color(rng: &mut impl Rng) -> Color {
    Color {
        r: rng.gen_range(0..255),
        g: rng.gen_range(0..255),
        b: rng.gen_range(0..255),
    }
}
