use crate::config::ServerConfig;
use std::collections::{BTreeMap, HashMap};
use swayroom_shared::protocol::{
    clamp_unit, ColorRef, HelloMsg, Role, RosterMsg, UpdateMsg, UserWire,
};
use thiserror::Error;

/// Identifies one accepted socket for its whole lifetime.
pub type ConnId = u64;

/// Largest lean angle the aggregator will store, in degrees.
const MAX_STORED_THETA: f64 = 180.0;
/// Hex strings longer than this are not colors.
const MAX_COLOR_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    #[error("room id must not be empty")]
    EmptyRoom,
    #[error("room {0} requires a valid secret")]
    BadSecret(String),
    #[error("room {0} is full")]
    RoomFull(String),
}

/// Latest state reported by one participant socket.
#[derive(Debug, Clone)]
pub struct Participant {
    pub nickname: String,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub color: ColorRef,
}

impl Participant {
    fn new(nickname: String) -> Self {
        Self {
            nickname,
            x: 0.5,
            y: 0.5,
            theta: 0.0,
            color: ColorRef::default(),
        }
    }

    pub fn to_wire(&self) -> UserWire {
        UserWire {
            x: self.x,
            y: self.y,
            theta: self.theta,
            color: self.color.clone(),
            nickname: self.nickname.clone(),
        }
    }
}

/// One room. Participants are keyed by connection id, so iteration is join order.
#[derive(Debug, Default)]
pub struct Room {
    pub participants: BTreeMap<ConnId, Participant>,
    pub display_count: usize,
    dirty: bool,
}

impl Room {
    fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.display_count == 0
    }
}

#[derive(Debug, Clone)]
struct Membership {
    room: String,
    role: Role,
}

/// Central room state owned by the hub task.
pub struct HubState {
    rooms: HashMap<String, Room>,
    members: HashMap<ConnId, Membership>,
    room_secrets: HashMap<String, String>,
    max_participants_per_room: usize,
    next_conn_id: ConnId,
}

impl HubState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            rooms: HashMap::new(),
            members: HashMap::new(),
            room_secrets: config.room_secrets.clone(),
            max_participants_per_room: config.max_participants_per_room,
            next_conn_id: 1,
        }
    }

    /// Admit a socket that sent `hello`. Returns its connection id.
    pub fn join(&mut self, hello: &HelloMsg) -> Result<ConnId, JoinError> {
        let room_id = hello.room_id.trim();
        if room_id.is_empty() {
            return Err(JoinError::EmptyRoom);
        }
        if let Some(expected) = self.room_secrets.get(room_id) {
            if hello.secret.as_deref() != Some(expected.as_str()) {
                return Err(JoinError::BadSecret(room_id.to_string()));
            }
        }

        let room = self.rooms.entry(room_id.to_string()).or_default();
        if hello.role == Role::Participant
            && room.participants.len() >= self.max_participants_per_room
        {
            return Err(JoinError::RoomFull(room_id.to_string()));
        }

        let id = self.next_conn_id;
        self.next_conn_id += 1;

        match hello.role {
            Role::Participant => {
                room.participants
                    .insert(id, Participant::new(hello.display_name()));
                room.dirty = true;
            }
            Role::Display => room.display_count += 1,
        }

        self.members.insert(
            id,
            Membership {
                room: room_id.to_string(),
                role: hello.role,
            },
        );
        Ok(id)
    }

    /// Remove a socket. Returns the room it was in.
    pub fn leave(&mut self, id: ConnId) -> Option<String> {
        let membership = self.members.remove(&id)?;
        if let Some(room) = self.rooms.get_mut(&membership.room) {
            match membership.role {
                Role::Participant => {
                    if room.participants.remove(&id).is_some() {
                        room.dirty = true;
                    }
                }
                Role::Display => room.display_count = room.display_count.saturating_sub(1),
            }
            if room.is_empty() {
                self.rooms.remove(&membership.room);
            }
        }
        Some(membership.room)
    }

    /// Store a participant update. Returns false if it was dropped.
    pub fn apply_update(&mut self, id: ConnId, update: &UpdateMsg) -> bool {
        if !update.theta.is_finite() || !update.x.is_finite() || !update.y.is_finite() {
            return false;
        }
        if let ColorRef::Hex(hex) = &update.color {
            if hex.len() > MAX_COLOR_LEN {
                return false;
            }
        }

        let Some(membership) = self.members.get(&id) else {
            return false;
        };
        if membership.role != Role::Participant {
            return false;
        }
        let Some(room) = self.rooms.get_mut(&membership.room) else {
            return false;
        };
        let Some(participant) = room.participants.get_mut(&id) else {
            return false;
        };

        participant.x = clamp_unit(update.x);
        participant.y = clamp_unit(update.y);
        participant.theta = update.theta.clamp(-MAX_STORED_THETA, MAX_STORED_THETA);
        participant.color = update.color.clone();
        room.dirty = true;
        true
    }

    /// Full roster for a room (empty if the room does not exist).
    pub fn roster(&self, room_id: &str) -> RosterMsg {
        RosterMsg {
            room: room_id.to_string(),
            users: self
                .rooms
                .get(room_id)
                .map(|room| room.participants.values().map(Participant::to_wire).collect())
                .unwrap_or_default(),
        }
    }

    /// Rosters for every room that changed since the last call.
    pub fn take_dirty_rosters(&mut self) -> Vec<RosterMsg> {
        let dirty: Vec<String> = self
            .rooms
            .iter_mut()
            .filter(|(_, room)| room.dirty)
            .map(|(id, room)| {
                room.dirty = false;
                id.clone()
            })
            .collect();
        dirty.iter().map(|id| self.roster(id)).collect()
    }

    pub fn room_of(&self, id: ConnId) -> Option<&str> {
        self.members.get(&id).map(|m| m.room.as_str())
    }

    pub fn participant_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|r| r.participants.len())
            .unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
