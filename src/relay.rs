use crate::error::RelayError;
use crate::messages::ServerMessage;
use crate::registry::ConnectionId;
use crate::room::{RoomId, RoomRegistry};

/// One outbound frame addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub message: ServerMessage,
}

impl Delivery {
    pub fn new(to: ConnectionId, message: ServerMessage) -> Self {
        Delivery { to, message }
    }
}

/// Room the sender is bound to plus every other occupant of it.
pub fn recipients(
    rooms: &RoomRegistry,
    sender: ConnectionId,
) -> Result<(RoomId, Vec<ConnectionId>), RelayError> {
    let room = rooms.room_of(sender).ok_or(RelayError::NotBound(sender))?;
    let others = room.others(sender).map(|o| o.connection).collect();
    Ok((room.id.clone(), others))
}

/// Fans `message` out to the sender's room, never back to the sender.
///
/// The payload is not inspected.
pub fn relay(
    rooms: &RoomRegistry,
    sender: ConnectionId,
    message: &ServerMessage,
) -> Result<Vec<Delivery>, RelayError> {
    let (_, others) = recipients(rooms, sender)?;
    Ok(others
        .into_iter()
        .map(|to| Delivery::new(to, message.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::matchmaker::QueueKind;
    use crate::room::Occupant;

    #[test]
    fn unbound_sender_is_reported() {
        let rooms = RoomRegistry::new(6, 0);
        let lonely = ConnectionId::new();
        assert_eq!(
            relay(&rooms, lonely, &ServerMessage::PartnerDisconnected),
            Err(RelayError::NotBound(lonely))
        );
    }

    #[test]
    fn relays_to_everyone_but_the_sender() {
        let mut rooms = RoomRegistry::new(6, 0);
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();
        let outsider = ConnectionId::new();
        let room_id = rooms.join_private_room(RoomId::parse("GROUP1"), a, "A").unwrap().room_id;
        rooms.join_private_room(Some(room_id.clone()), b, "B").unwrap();
        rooms.join_private_room(Some(room_id), c, "C").unwrap();
        rooms.join_private_room(RoomId::parse("ELSEWH"), outsider, "O").unwrap();

        let payload = ServerMessage::WebrtcIceCandidate(json!({"candidate": "not even sdp"}));
        let deliveries = relay(&rooms, a, &payload).unwrap();
        let targets: Vec<_> = deliveries.iter().map(|d| d.to).collect();
        assert_eq!(targets, vec![b, c]);
        assert!(deliveries.iter().all(|d| d.message == payload));
    }

    #[test]
    fn random_pair_relays_to_partner() {
        let mut rooms = RoomRegistry::new(6, 0);
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        rooms.create_random_room(QueueKind::Text, Occupant::new(a, "A"), Occupant::new(b, "B"));

        let (_, others) = recipients(&rooms, b).unwrap();
        assert_eq!(others, vec![a]);
    }
}
