use log::{debug, info, warn};

use crate::config::Config;
use crate::error::RelayError;
use crate::matchmaker::{MatchOutcome, Matchmaker, QueueKind};
use crate::messages::{ClientMessage, MatchInfo, ServerMessage};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::relay::{self, Delivery};
use crate::room::{Occupant, PrivateJoin, RoomId, RoomKind, RoomRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Waiting(QueueKind),
    Paired(RoomId),
}

/// Owns every piece of matchmaking state and applies inbound events to it.
///
/// Each call runs to completion without yielding, and returns the frames
/// it produced instead of sending them. Callers serialize access.
pub struct Lobby {
    registry: ConnectionRegistry,
    matchmaker: Matchmaker,
    rooms: RoomRegistry,
}

impl Lobby {
    pub fn new(config: &Config) -> Self {
        Lobby {
            registry: ConnectionRegistry::new(config.default_name.clone()),
            matchmaker: Matchmaker::new(),
            rooms: RoomRegistry::new(config.code_length, config.history_limit),
        }
    }

    pub fn connect(&mut self, id: ConnectionId) -> Vec<Delivery> {
        self.registry.register(id);
        info!("connection {id} registered");
        vec![Delivery::new(
            id,
            ServerMessage::Connected {
                socket_id: id.to_string(),
            },
        )]
    }

    /// Purges all state for `id`. Safe to call more than once.
    pub fn disconnect(&mut self, id: ConnectionId) -> Vec<Delivery> {
        if !self.registry.is_registered(id) {
            debug!("disconnect for unknown connection {id} ignored");
            return Vec::new();
        }
        let deliveries = self.detach(id);
        self.registry.forget(id);
        info!("connection {id} removed");
        deliveries
    }

    pub fn handle(&mut self, id: ConnectionId, message: ClientMessage) -> Vec<Delivery> {
        let event = message.event_name();
        match self.apply(id, message) {
            Ok(deliveries) => {
                debug!("{event} from {id} applied, now {:?}", self.state_of(id));
                deliveries
            }
            Err(err) => {
                debug!("dropping {event} from {id}: {err}");
                Vec::new()
            }
        }
    }

    pub fn state_of(&self, id: ConnectionId) -> Option<ConnectionState> {
        if !self.registry.is_registered(id) {
            return None;
        }
        let state = if let Some(room) = self.rooms.room_of(id) {
            ConnectionState::Paired(room.id.clone())
        } else if let Some(kind) = self.matchmaker.waiting_kind(id) {
            ConnectionState::Waiting(kind)
        } else {
            ConnectionState::Idle
        };
        Some(state)
    }

    fn apply(&mut self, id: ConnectionId, message: ClientMessage) -> Result<Vec<Delivery>, RelayError> {
        if !self.registry.is_registered(id) {
            return Err(RelayError::NotRegistered(id));
        }

        match message {
            ClientMessage::JoinTextChat(request) => {
                self.join_queue(id, QueueKind::Text, request.username.as_deref())
            }
            ClientMessage::JoinVideoChat(request) => {
                self.join_queue(id, QueueKind::Video, request.username.as_deref())
            }
            ClientMessage::JoinPrivateRoom { room_id, username } => self.join_private(
                id,
                room_id.as_deref().and_then(RoomId::parse),
                username.as_deref(),
            ),
            ClientMessage::SendMessage { message } => {
                let sender = self.registry.identity_of(id)?.to_string();
                relay::relay(&self.rooms, id, &ServerMessage::MessageReceived { message, sender })
            }
            ClientMessage::SendRoomMessage {
                room_id,
                message,
                sender,
            } => self.send_room_message(id, &room_id, message, sender),
            ClientMessage::WebrtcOffer(payload) => {
                relay::relay(&self.rooms, id, &ServerMessage::WebrtcOffer(payload))
            }
            ClientMessage::WebrtcAnswer(payload) => {
                relay::relay(&self.rooms, id, &ServerMessage::WebrtcAnswer(payload))
            }
            ClientMessage::WebrtcIceCandidate(payload) => {
                relay::relay(&self.rooms, id, &ServerMessage::WebrtcIceCandidate(payload))
            }
            ClientMessage::FindNewPartner => self.find_new_partner(id),
            ClientMessage::LeaveRoom => Ok(self.detach(id)),
        }
    }

    fn join_queue(
        &mut self,
        id: ConnectionId,
        kind: QueueKind,
        username: Option<&str>,
    ) -> Result<Vec<Delivery>, RelayError> {
        let name = self.registry.set_identity(id, username)?;
        self.registry.remember_queue(id, kind);
        let mut deliveries = self.detach(id);
        deliveries.extend(self.enqueue(id, kind, &name));
        Ok(deliveries)
    }

    fn enqueue(&mut self, id: ConnectionId, kind: QueueKind, name: &str) -> Vec<Delivery> {
        let partner = match self.matchmaker.request_match(kind, id, name) {
            MatchOutcome::Queued => {
                debug!(
                    "{id} waiting in {kind:?} queue ({} waiting)",
                    self.matchmaker.waiting(kind)
                );
                return Vec::new();
            }
            MatchOutcome::Matched(partner) => partner,
        };

        let room = self.rooms.create_random_room(
            kind,
            Occupant::new(id, name),
            Occupant::new(partner.connection, partner.name.clone()),
        );
        info!(
            "matched {id} with {} in {:?} room {}",
            partner.connection, partner.kind, room.id
        );
        let room_id = room.id.clone();

        let matched = |partner_username: String, room_id: RoomId, should_create_offer: Option<bool>| {
            let info = MatchInfo {
                partner_username,
                room_id,
                should_create_offer,
            };
            match kind {
                QueueKind::Text => ServerMessage::ChatMatched(info),
                QueueKind::Video => ServerMessage::VideoChatMatched(info),
            }
        };
        // The arrival is listed first in the room, so it creates the offer.
        let (arrival_offers, waiter_offers) = match kind {
            QueueKind::Text => (None, None),
            QueueKind::Video => (Some(true), Some(false)),
        };
        vec![
            Delivery::new(id, matched(partner.name, room_id.clone(), arrival_offers)),
            Delivery::new(
                partner.connection,
                matched(name.to_string(), room_id, waiter_offers),
            ),
        ]
    }

    fn join_private(
        &mut self,
        id: ConnectionId,
        room_id: Option<RoomId>,
        username: Option<&str>,
    ) -> Result<Vec<Delivery>, RelayError> {
        if let Some(wanted) = &room_id {
            if let Some(room) = self.rooms.get(wanted) {
                if room.kind != RoomKind::Private {
                    return Err(RelayError::NotPrivate(wanted.clone()));
                }
            }
        }

        let name = self.registry.set_identity(id, username)?;
        let already_inside = match (&room_id, self.rooms.room_of(id)) {
            (Some(wanted), Some(current)) => &current.id == wanted,
            _ => false,
        };
        let mut deliveries = if already_inside {
            Vec::new()
        } else {
            self.detach(id)
        };

        let join = self.rooms.join_private_room(room_id, id, &name)?;
        deliveries.extend(self.announce_join(id, &name, &join)?);
        Ok(deliveries)
    }

    fn announce_join(
        &self,
        id: ConnectionId,
        name: &str,
        join: &PrivateJoin,
    ) -> Result<Vec<Delivery>, RelayError> {
        let room = self.rooms.get(&join.room_id).ok_or(RelayError::NotBound(id))?;
        if join.created {
            info!("private room {} opened by {id} ({} rooms live)", room.id, self.rooms.room_count());
        }
        if join.crowded {
            warn!(
                "{}",
                RelayError::RoomCapacityExceeded {
                    room: room.id.clone(),
                    occupants: room.occupants().len(),
                }
            );
        }

        let participants = room.participants();
        let mut deliveries = vec![Delivery::new(
            id,
            ServerMessage::RoomJoined {
                room_id: room.id.clone(),
                participants: participants.clone(),
                should_create_offer: room.should_create_offer(id),
                messages: room.history(),
            },
        )];
        if join.newly_joined || join.renamed {
            deliveries.extend(room.others(id).map(|other| {
                Delivery::new(
                    other.connection,
                    ServerMessage::UserJoinedRoom {
                        username: name.to_string(),
                        participants: participants.clone(),
                        should_create_offer: room.should_create_offer(other.connection),
                    },
                )
            }));
        }
        Ok(deliveries)
    }

    fn send_room_message(
        &mut self,
        id: ConnectionId,
        addressed: &str,
        message: String,
        claimed_sender: Option<String>,
    ) -> Result<Vec<Delivery>, RelayError> {
        let (bound, _) = relay::recipients(&self.rooms, id)?;
        if RoomId::parse(addressed).as_ref() != Some(&bound) {
            return Err(RelayError::RoomMismatch {
                bound,
                addressed: addressed.to_string(),
            });
        }

        let sender = self.registry.identity_of(id)?.to_string();
        if let Some(claimed) = claimed_sender.filter(|claimed| claimed != &sender) {
            debug!("{id} claimed sender {claimed:?}, relaying as {sender:?}");
        }
        if let Err(err) = self.rooms.append_message(&bound, &sender, &message) {
            debug!("not logging message from {id}: {err}");
        }
        relay::relay(&self.rooms, id, &ServerMessage::RoomMessage { message, sender })
    }

    fn find_new_partner(&mut self, id: ConnectionId) -> Result<Vec<Delivery>, RelayError> {
        if let Some(kind) = self.matchmaker.waiting_kind(id) {
            debug!("{id} asked for a new partner while already waiting in {kind:?} queue");
            return Ok(Vec::new());
        }

        let kind = self
            .rooms
            .room_of(id)
            .and_then(|room| room.kind.queue_kind())
            .or_else(|| self.registry.last_queue(id));
        let mut deliveries = self.detach(id);
        if let Some(kind) = kind {
            let name = self.registry.identity_of(id)?.to_string();
            self.registry.remember_queue(id, kind);
            deliveries.extend(self.enqueue(id, kind, &name));
        }
        Ok(deliveries)
    }

    /// Takes `id` out of any queue and any room, notifying whoever is left.
    fn detach(&mut self, id: ConnectionId) -> Vec<Delivery> {
        if self.matchmaker.remove_if_waiting(id) {
            debug!("{id} left the waiting queue");
        }
        let Some(departure) = self.rooms.leave(id) else {
            return Vec::new();
        };
        if departure.discarded {
            info!("room {} discarded", departure.room_id);
        }

        match departure.kind {
            RoomKind::Private => {
                let participants = departure.participants();
                departure
                    .remaining
                    .iter()
                    .map(|o| {
                        Delivery::new(
                            o.connection,
                            ServerMessage::UserLeftRoom {
                                username: departure.name.clone(),
                                participants: participants.clone(),
                            },
                        )
                    })
                    .collect()
            }
            RoomKind::RandomText | RoomKind::RandomVideo => departure
                .remaining
                .iter()
                .map(|o| Delivery::new(o.connection, ServerMessage::PartnerDisconnected))
                .collect(),
        }
    }
}
