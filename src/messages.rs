use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::room::{ChatLine, RoomId};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub username: Option<String>,
}

/// Inbound frames: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "joinTextChat")]
    JoinTextChat(JoinRequest),
    #[serde(rename = "joinVideoChat")]
    JoinVideoChat(JoinRequest),
    #[serde(rename = "joinPrivateRoom")]
    JoinPrivateRoom {
        #[serde(rename = "roomId", default)]
        room_id: Option<String>,
        #[serde(default)]
        username: Option<String>,
    },
    #[serde(rename = "sendMessage")]
    SendMessage { message: String },
    #[serde(rename = "sendRoomMessage")]
    SendRoomMessage {
        #[serde(rename = "roomId")]
        room_id: String,
        message: String,
        // Display name comes from the registry; the claimed one is only logged.
        #[serde(default)]
        sender: Option<String>,
    },
    #[serde(rename = "webrtc-offer")]
    WebrtcOffer(Value),
    #[serde(rename = "webrtc-answer")]
    WebrtcAnswer(Value),
    #[serde(rename = "webrtc-ice-candidate")]
    WebrtcIceCandidate(Value),
    #[serde(rename = "findNewPartner")]
    FindNewPartner,
    #[serde(rename = "leaveRoom")]
    LeaveRoom,
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::JoinTextChat(_) => "joinTextChat",
            ClientMessage::JoinVideoChat(_) => "joinVideoChat",
            ClientMessage::JoinPrivateRoom { .. } => "joinPrivateRoom",
            ClientMessage::SendMessage { .. } => "sendMessage",
            ClientMessage::SendRoomMessage { .. } => "sendRoomMessage",
            ClientMessage::WebrtcOffer(_) => "webrtc-offer",
            ClientMessage::WebrtcAnswer(_) => "webrtc-answer",
            ClientMessage::WebrtcIceCandidate(_) => "webrtc-ice-candidate",
            ClientMessage::FindNewPartner => "findNewPartner",
            ClientMessage::LeaveRoom => "leaveRoom",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchInfo {
    #[serde(rename = "partnerUsername")]
    pub partner_username: String,
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    #[serde(rename = "shouldCreateOffer", skip_serializing_if = "Option::is_none")]
    pub should_create_offer: Option<bool>,
}

/// Outbound frames, same envelope as [`ClientMessage`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "socketId")]
        socket_id: String,
    },
    #[serde(rename = "chatMatched")]
    ChatMatched(MatchInfo),
    #[serde(rename = "videoChatMatched")]
    VideoChatMatched(MatchInfo),
    #[serde(rename = "roomJoined")]
    RoomJoined {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        participants: Vec<String>,
        #[serde(rename = "shouldCreateOffer")]
        should_create_offer: bool,
        messages: Vec<ChatLine>,
    },
    #[serde(rename = "userJoinedRoom")]
    UserJoinedRoom {
        username: String,
        participants: Vec<String>,
        #[serde(rename = "shouldCreateOffer")]
        should_create_offer: bool,
    },
    #[serde(rename = "messageReceived")]
    MessageReceived { message: String, sender: String },
    #[serde(rename = "roomMessage")]
    RoomMessage { message: String, sender: String },
    #[serde(rename = "webrtc-offer")]
    WebrtcOffer(Value),
    #[serde(rename = "webrtc-answer")]
    WebrtcAnswer(Value),
    #[serde(rename = "webrtc-ice-candidate")]
    WebrtcIceCandidate(Value),
    #[serde(rename = "partnerDisconnected")]
    PartnerDisconnected,
    #[serde(rename = "userLeftRoom")]
    UserLeftRoom {
        username: String,
        participants: Vec<String>,
    },
}
