use std::collections::{HashMap, VecDeque};
use std::fmt;

use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;

use crate::error::RelayError;
use crate::matchmaker::QueueKind;
use crate::registry::ConnectionId;

/// Short shareable room code. Stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Normalizes a client-supplied code; `None` for a blank one.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim();
        if code.is_empty() {
            None
        } else {
            Some(RoomId(code.to_ascii_uppercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    RandomText,
    RandomVideo,
    Private,
}

impl RoomKind {
    pub fn queue_kind(self) -> Option<QueueKind> {
        match self {
            RoomKind::RandomText => Some(QueueKind::Text),
            RoomKind::RandomVideo => Some(QueueKind::Video),
            RoomKind::Private => None,
        }
    }
}

impl From<QueueKind> for RoomKind {
    fn from(kind: QueueKind) -> Self {
        match kind {
            QueueKind::Text => RoomKind::RandomText,
            QueueKind::Video => RoomKind::RandomVideo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatLine {
    pub sender: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    pub connection: ConnectionId,
    pub name: String,
}

impl Occupant {
    pub fn new(connection: ConnectionId, name: impl Into<String>) -> Self {
        Occupant {
            connection,
            name: name.into(),
        }
    }
}

#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub kind: RoomKind,
    // Arrival order; the head is the offerer.
    occupants: Vec<Occupant>,
    log: VecDeque<ChatLine>,
}

impl Room {
    fn new(id: RoomId, kind: RoomKind) -> Self {
        Room {
            id,
            kind,
            occupants: Vec::new(),
            log: VecDeque::new(),
        }
    }

    pub fn occupants(&self) -> &[Occupant] {
        &self.occupants
    }

    pub fn participants(&self) -> Vec<String> {
        self.occupants.iter().map(|o| o.name.clone()).collect()
    }

    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.occupants.iter().any(|o| o.connection == connection)
    }

    /// True for the first occupant of a room holding exactly two.
    pub fn should_create_offer(&self, connection: ConnectionId) -> bool {
        self.occupants.len() == 2 && self.occupants[0].connection == connection
    }

    pub fn others(&self, connection: ConnectionId) -> impl Iterator<Item = &Occupant> + '_ {
        self.occupants
            .iter()
            .filter(move |o| o.connection != connection)
    }

    pub fn history(&self) -> Vec<ChatLine> {
        self.log.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateJoin {
    pub room_id: RoomId,
    pub created: bool,
    pub newly_joined: bool,
    /// An existing occupant came back under a different name.
    pub renamed: bool,
    /// This join took the room past two occupants.
    pub crowded: bool,
}

/// What is left behind when a connection leaves its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub name: String,
    pub remaining: Vec<Occupant>,
    pub discarded: bool,
}

impl Departure {
    pub fn participants(&self) -> Vec<String> {
        self.remaining.iter().map(|o| o.name.clone()).collect()
    }
}

pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    bindings: HashMap<ConnectionId, RoomId>,
    code_length: usize,
    history_limit: usize,
}

impl RoomRegistry {
    pub fn new(code_length: usize, history_limit: usize) -> Self {
        RoomRegistry {
            rooms: HashMap::new(),
            bindings: HashMap::new(),
            code_length,
            history_limit,
        }
    }

    fn fresh_code(&self, mut draw: impl FnMut() -> String) -> RoomId {
        loop {
            let id = RoomId(draw());
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }

    fn generate_code(&self) -> RoomId {
        let length = self.code_length;
        self.fresh_code(|| {
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(length)
                .map(|b| char::from(b).to_ascii_uppercase())
                .collect()
        })
    }

    /// Pairs `arrival` with the dequeued `waiter`. The arrival is listed
    /// first and is therefore the offerer.
    pub fn create_random_room(&mut self, kind: QueueKind, arrival: Occupant, waiter: Occupant) -> &Room {
        debug_assert!(!self.bindings.contains_key(&arrival.connection));
        debug_assert!(!self.bindings.contains_key(&waiter.connection));

        let id = self.generate_code();
        let mut room = Room::new(id.clone(), kind.into());
        self.bindings.insert(arrival.connection, id.clone());
        self.bindings.insert(waiter.connection, id.clone());
        room.occupants.push(arrival);
        room.occupants.push(waiter);

        self.rooms.entry(id).or_insert(room)
    }

    /// Joins (creating if absent) a private room. `None` asks for a fresh code.
    ///
    /// Re-joining a room the connection already occupies only refreshes its
    /// display name.
    pub fn join_private_room(
        &mut self,
        room_id: Option<RoomId>,
        connection: ConnectionId,
        name: &str,
    ) -> Result<PrivateJoin, RelayError> {
        let room_id = match room_id {
            Some(id) => id,
            None => self.generate_code(),
        };
        if let Some(bound) = self.bindings.get(&connection) {
            debug_assert_eq!(bound, &room_id, "caller must leave its previous room first");
        }

        let created = !self.rooms.contains_key(&room_id);
        let room = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| Room::new(room_id.clone(), RoomKind::Private));
        if room.kind != RoomKind::Private {
            return Err(RelayError::NotPrivate(room_id));
        }

        let newly_joined = !room.contains(connection);
        let mut renamed = false;
        if newly_joined {
            room.occupants.push(Occupant::new(connection, name));
        } else if let Some(occupant) = room.occupants.iter_mut().find(|o| o.connection == connection) {
            renamed = occupant.name != name;
            occupant.name = name.to_string();
        }
        let crowded = newly_joined && room.occupants.len() > 2;
        self.bindings.insert(connection, room_id.clone());

        Ok(PrivateJoin {
            room_id,
            created,
            newly_joined,
            renamed,
            crowded,
        })
    }

    /// Unbinds `connection` from its room.
    ///
    /// A random room is discarded as soon as either member leaves, and its
    /// remaining member is unbound with it. A private room is discarded once
    /// empty.
    pub fn leave(&mut self, connection: ConnectionId) -> Option<Departure> {
        let room_id = self.bindings.remove(&connection)?;
        let room = self.rooms.get_mut(&room_id)?;
        let position = room.occupants.iter().position(|o| o.connection == connection)?;
        let leaver = room.occupants.remove(position);
        let kind = room.kind;

        let discarded = kind != RoomKind::Private || room.occupants.is_empty();
        let remaining = if discarded {
            let room = self.rooms.remove(&room_id)?;
            for occupant in &room.occupants {
                self.bindings.remove(&occupant.connection);
            }
            room.occupants
        } else {
            room.occupants.clone()
        };

        Some(Departure {
            room_id,
            kind,
            name: leaver.name,
            remaining,
            discarded,
        })
    }

    /// Appends to a private room's log, dropping the oldest lines past the limit.
    pub fn append_message(&mut self, room_id: &RoomId, sender: &str, message: &str) -> Result<(), RelayError> {
        let history_limit = self.history_limit;
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| RelayError::NotPrivate(room_id.clone()))?;
        if room.kind != RoomKind::Private {
            return Err(RelayError::NotPrivate(room_id.clone()));
        }
        if history_limit == 0 {
            return Ok(());
        }

        room.log.push_back(ChatLine {
            sender: sender.to_string(),
            message: message.to_string(),
        });
        while room.log.len() > history_limit {
            room.log.pop_front();
        }
        Ok(())
    }

    pub fn room_of(&self, connection: ConnectionId) -> Option<&Room> {
        self.bindings
            .get(&connection)
            .and_then(|id| self.rooms.get(id))
    }

    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupant(name: &str) -> Occupant {
        Occupant::new(ConnectionId::new(), name)
    }

    fn code(raw: &str) -> Option<RoomId> {
        RoomId::parse(raw)
    }

    #[test]
    fn parse_normalizes_codes() {
        assert_eq!(RoomId::parse("  ab12cd "), Some(RoomId("AB12CD".to_string())));
        assert_eq!(RoomId::parse("   "), None);
    }

    #[test]
    fn generated_codes_have_configured_length() {
        let registry = RoomRegistry::new(8, 10);
        let id = registry.generate_code();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn code_generation_retries_on_collision() {
        let mut registry = RoomRegistry::new(6, 10);
        registry
            .join_private_room(code("TAKEN1"), ConnectionId::new(), "a")
            .unwrap();

        let mut draws = vec!["FRESH1".to_string(), "TAKEN1".to_string()];
        let id = registry.fresh_code(|| draws.pop().unwrap());
        assert_eq!(id.as_str(), "FRESH1");
    }

    #[test]
    fn random_room_puts_arrival_first() {
        let mut registry = RoomRegistry::new(6, 10);
        let arrival = occupant("b");
        let waiter = occupant("a");
        let room = registry.create_random_room(QueueKind::Video, arrival.clone(), waiter.clone());

        assert_eq!(room.kind, RoomKind::RandomVideo);
        assert_eq!(room.participants(), vec!["b", "a"]);
        assert!(room.should_create_offer(arrival.connection));
        assert!(!room.should_create_offer(waiter.connection));
        let id = room.id.clone();
        assert_eq!(registry.room_of(waiter.connection).map(|r| r.id.clone()), Some(id));
    }

    #[test]
    fn random_room_is_discarded_when_either_leaves() {
        let mut registry = RoomRegistry::new(6, 10);
        let a = occupant("a");
        let b = occupant("b");
        registry.create_random_room(QueueKind::Text, a.clone(), b.clone());

        let departure = registry.leave(a.connection).unwrap();
        assert!(departure.discarded);
        assert_eq!(departure.remaining, vec![b.clone()]);
        assert!(registry.room_of(b.connection).is_none());
        assert_eq!(registry.room_count(), 0);
        assert_eq!(registry.leave(b.connection), None);
    }

    #[test]
    fn private_join_is_idempotent_per_connection() {
        let mut registry = RoomRegistry::new(6, 10);
        let a = ConnectionId::new();
        let first = registry.join_private_room(code("ab12cd"), a, "A").unwrap();
        assert!(first.created && first.newly_joined);

        let again = registry.join_private_room(code("AB12CD"), a, "A").unwrap();
        assert!(!again.created && !again.newly_joined && !again.renamed);
        assert_eq!(registry.get(&first.room_id).unwrap().participants(), vec!["A"]);

        let renamed = registry.join_private_room(code("AB12CD"), a, "Alias").unwrap();
        assert!(!renamed.newly_joined && renamed.renamed);
        assert_eq!(registry.get(&first.room_id).unwrap().participants(), vec!["Alias"]);
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn same_name_on_two_connections_are_two_occupants() {
        let mut registry = RoomRegistry::new(6, 10);
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let join = registry.join_private_room(code("ROOM42"), a, "Anonymous").unwrap();
        registry.join_private_room(code("ROOM42"), b, "Anonymous").unwrap();

        let departure = registry.leave(b).unwrap();
        assert!(!departure.discarded);
        assert_eq!(departure.remaining, vec![Occupant::new(a, "Anonymous")]);
        assert!(registry.get(&join.room_id).unwrap().contains(a));
    }

    #[test]
    fn offerer_precedence_survives_churn() {
        let mut registry = RoomRegistry::new(6, 10);
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();
        let room_id = registry.join_private_room(code("CHURN1"), a, "A").unwrap().room_id;
        registry.join_private_room(Some(room_id.clone()), b, "B").unwrap();
        registry.leave(b);
        registry.join_private_room(Some(room_id.clone()), c, "C").unwrap();

        let room = registry.get(&room_id).unwrap();
        assert_eq!(room.participants(), vec!["A", "C"]);
        assert!(room.should_create_offer(a));
        assert!(!room.should_create_offer(c));
    }

    #[test]
    fn only_the_join_past_two_is_crowded() {
        let mut registry = RoomRegistry::new(6, 10);
        let (a, b, c) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        assert!(!registry.join_private_room(code("TRIO00"), a, "A").unwrap().crowded);
        assert!(!registry.join_private_room(code("TRIO00"), b, "B").unwrap().crowded);
        assert!(registry.join_private_room(code("TRIO00"), c, "C").unwrap().crowded);

        let rejoin = registry.join_private_room(code("TRIO00"), c, "C").unwrap();
        assert!(!rejoin.crowded);
        let rename = registry.join_private_room(code("TRIO00"), a, "Alias").unwrap();
        assert!(!rename.crowded);
    }

    #[test]
    fn private_room_survives_until_empty_and_can_be_reentered() {
        let mut registry = RoomRegistry::new(6, 10);
        let a = ConnectionId::new();
        let room_id = registry.join_private_room(None, a, "A").unwrap().room_id;
        assert_eq!(room_id.as_str().len(), 6);

        let departure = registry.leave(a).unwrap();
        assert!(departure.discarded);
        assert!(registry.get(&room_id).is_none());

        let back = registry.join_private_room(Some(room_id.clone()), a, "A").unwrap();
        assert!(back.created);
    }

    #[test]
    fn random_room_code_cannot_be_joined_privately() {
        let mut registry = RoomRegistry::new(6, 10);
        let id = registry
            .create_random_room(QueueKind::Text, occupant("a"), occupant("b"))
            .id
            .clone();
        let intruder = ConnectionId::new();
        assert_eq!(
            registry.join_private_room(Some(id.clone()), intruder, "c"),
            Err(RelayError::NotPrivate(id))
        );
        assert!(registry.room_of(intruder).is_none());
    }

    #[test]
    fn message_log_is_bounded() {
        let mut registry = RoomRegistry::new(6, 2);
        let room_id = registry
            .join_private_room(code("LOGGED"), ConnectionId::new(), "A")
            .unwrap()
            .room_id;
        for text in ["one", "two", "three"] {
            registry.append_message(&room_id, "A", text).unwrap();
        }
        let history: Vec<_> = registry
            .get(&room_id)
            .unwrap()
            .history()
            .into_iter()
            .map(|line| line.message)
            .collect();
        assert_eq!(history, vec!["two", "three"]);
    }

    #[test]
    fn random_rooms_keep_no_log() {
        let mut registry = RoomRegistry::new(6, 10);
        let id = registry
            .create_random_room(QueueKind::Text, occupant("a"), occupant("b"))
            .id
            .clone();
        assert_eq!(
            registry.append_message(&id, "a", "hi"),
            Err(RelayError::NotPrivate(id))
        );
    }
}
