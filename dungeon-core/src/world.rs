//! Dungeon world types.
//!
//! A [`Session`] owns a graph of [`RoomNode`]s; rooms hold the monsters and
//! loot that turns mutate. The serialized shape of these types is the
//! on-disk session format.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when the room graph or its contents break an invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Invalid entity state: {0}")]
    InvalidEntity(String),
}

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a session; also its storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// A fresh id with a random UUID suffix.
    pub fn generate() -> Self {
        Self(format!("sess_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a room, unique within its session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Room Contents
// ============================================================================

/// A named attack with its damage expression, e.g. `Scimitar` / `1d6+2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attack {
    pub name: String,
    #[serde(alias = "dmg")]
    pub damage: String,
}

impl Attack {
    pub fn new(name: impl Into<String>, damage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            damage: damage.into(),
        }
    }
}

/// A piece of treasure. Loot table entries and room loot share this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LootItem {
    pub name: String,
    pub value_gp: u32,
    pub description: String,
    pub is_magical: bool,
}

impl LootItem {
    pub fn new(
        name: impl Into<String>,
        value_gp: u32,
        description: impl Into<String>,
        is_magical: bool,
    ) -> Self {
        Self {
            name: name.into(),
            value_gp,
            description: description.into(),
            is_magical,
        }
    }
}

/// A live monster in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInstance {
    pub name: String,
    pub hp_current: i32,
    pub hp_max: i32,
    #[serde(alias = "ac")]
    pub armor_class: i32,
    #[serde(default)]
    pub attacks: Vec<Attack>,
    #[serde(default)]
    pub challenge_rating: f64,
}

impl EntityInstance {
    /// A new entity at full health.
    pub fn new(name: impl Into<String>, hp_max: i32, armor_class: i32) -> Self {
        Self {
            name: name.into(),
            hp_current: hp_max,
            hp_max,
            armor_class,
            attacks: Vec::new(),
            challenge_rating: 0.0,
        }
    }

    pub fn with_attack(mut self, attack: Attack) -> Self {
        self.attacks.push(attack);
        self
    }

    pub fn with_challenge_rating(mut self, challenge_rating: f64) -> Self {
        self.challenge_rating = challenge_rating;
        self
    }

    /// Subtract damage. Returns `true` if the entity dropped to zero or below.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        self.hp_current -= amount.max(0);
        self.is_dead()
    }

    pub fn is_dead(&self) -> bool {
        self.hp_current <= 0
    }
}

// ============================================================================
// Rooms
// ============================================================================

/// What kind of space a room is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Entrance,
    Corridor,
    Chamber,
    SafeHaven,
}

/// One location in the dungeon graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomNode {
    pub id: RoomId,
    pub title: String,
    #[serde(alias = "type")]
    pub room_type: RoomType,
    pub description_initial: String,
    pub description_cleared: String,
    /// Direction (e.g. `north`) to the id of the neighbouring room.
    #[serde(default)]
    pub exits: HashMap<String, RoomId>,
    #[serde(default)]
    pub entities: Vec<EntityInstance>,
    #[serde(default)]
    pub loot: Vec<LootItem>,
    #[serde(default)]
    pub visited: bool,
}

impl RoomNode {
    pub fn new(id: impl Into<RoomId>, title: impl Into<String>, room_type: RoomType) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            room_type,
            description_initial: String::new(),
            description_cleared: String::new(),
            exits: HashMap::new(),
            entities: Vec::new(),
            loot: Vec::new(),
            visited: false,
        }
    }

    pub fn with_descriptions(
        mut self,
        initial: impl Into<String>,
        cleared: impl Into<String>,
    ) -> Self {
        self.description_initial = initial.into();
        self.description_cleared = cleared.into();
        self
    }

    pub fn with_exit(mut self, direction: impl Into<String>, target: impl Into<RoomId>) -> Self {
        self.exits.insert(direction.into(), target.into());
        self
    }

    pub fn with_entity(mut self, entity: EntityInstance) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_loot(mut self, item: LootItem) -> Self {
        self.loot.push(item);
        self
    }

    /// No monsters left standing.
    pub fn is_cleared(&self) -> bool {
        self.entities.is_empty()
    }

    /// The description matching the room's current state.
    pub fn description(&self) -> &str {
        if self.is_cleared() && !self.description_cleared.is_empty() {
            &self.description_cleared
        } else {
            &self.description_initial
        }
    }

    /// Names an intent may refer to: entity names then exit directions.
    pub fn valid_targets(&self) -> Vec<String> {
        let mut directions: Vec<String> = self.exits.keys().cloned().collect();
        directions.sort();
        self.entities
            .iter()
            .map(|e| e.name.clone())
            .chain(directions)
            .collect()
    }

    /// Index of the first entity whose name matches, ignoring case.
    pub fn find_entity(&self, name: &str) -> Option<usize> {
        self.entities
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name.trim()))
    }
}

// ============================================================================
// Session
// ============================================================================

/// The complete persisted state of one playthrough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub location_name: String,
    pub dungeon_level: u32,
    pub rooms: HashMap<RoomId, RoomNode>,
    /// The room the party currently occupies. Files written before this
    /// field existed start in the entrance room.
    #[serde(default = "entrance_room")]
    pub active_room: RoomId,
}

fn entrance_room() -> RoomId {
    RoomId::from("room_01")
}

impl Session {
    /// An empty session. Rooms must be inserted and `active_room` set before
    /// the session validates.
    pub fn new(session_id: SessionId, location_name: impl Into<String>, dungeon_level: u32) -> Self {
        Self {
            session_id,
            location_name: location_name.into(),
            dungeon_level,
            rooms: HashMap::new(),
            active_room: RoomId::from(""),
        }
    }

    /// The fallback session used when stored data is unreadable.
    pub fn starter(session_id: SessionId) -> Self {
        let crypt = RoomNode::new("room_01", "Damp Crypt", RoomType::Chamber)
            .with_descriptions("A cold, damp crypt.", "A cold, damp crypt, now silent.")
            .with_exit("north", "room_02")
            .with_entity(
                EntityInstance::new("goblin_01", 10, 12)
                    .with_attack(Attack::new("Scimitar", "1d6+2"))
                    .with_challenge_rating(0.25),
            );
        let passage = RoomNode::new("room_02", "Collapsed Passage", RoomType::Corridor)
            .with_descriptions(
                "Rubble chokes a narrow passage.",
                "Rubble chokes a narrow passage.",
            )
            .with_exit("south", "room_01");

        let mut session = Self::new(session_id, "Starter Dungeon", 1);
        session.insert_room(crypt);
        session.insert_room(passage);
        session.active_room = RoomId::from("room_01");
        session
    }

    /// Insert or replace a room under its own id.
    pub fn insert_room(&mut self, room: RoomNode) {
        self.rooms.insert(room.id.clone(), room);
    }

    pub fn room(&self, id: &RoomId) -> Result<&RoomNode, WorldError> {
        self.rooms
            .get(id)
            .ok_or_else(|| WorldError::InvalidReference(format!("unknown room {id}")))
    }

    pub fn room_mut(&mut self, id: &RoomId) -> Result<&mut RoomNode, WorldError> {
        self.rooms
            .get_mut(id)
            .ok_or_else(|| WorldError::InvalidReference(format!("unknown room {id}")))
    }

    pub fn current_room(&self) -> Result<&RoomNode, WorldError> {
        self.room(&self.active_room)
    }

    pub fn current_room_mut(&mut self) -> Result<&mut RoomNode, WorldError> {
        let id = self.active_room.clone();
        self.room_mut(&id)
    }

    /// Check referential integrity and entity invariants.
    pub fn validate(&self) -> Result<(), WorldError> {
        if !self.rooms.contains_key(&self.active_room) {
            return Err(WorldError::InvalidReference(format!(
                "active room {} does not exist",
                self.active_room
            )));
        }

        for (key, room) in &self.rooms {
            if key != &room.id {
                return Err(WorldError::InvalidReference(format!(
                    "room stored under {key} has id {}",
                    room.id
                )));
            }

            for (direction, target) in &room.exits {
                if !self.rooms.contains_key(target) {
                    return Err(WorldError::InvalidReference(format!(
                        "exit {direction} of {key} leads to unknown room {target}"
                    )));
                }
            }

            for entity in &room.entities {
                if entity.hp_current > entity.hp_max {
                    return Err(WorldError::InvalidEntity(format!(
                        "{} in {key} has {} hp over its maximum of {}",
                        entity.name, entity.hp_current, entity.hp_max
                    )));
                }
                if entity.is_dead() {
                    return Err(WorldError::InvalidEntity(format!(
                        "{} in {key} is dead but still present",
                        entity.name
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_session;

    #[test]
    fn test_session_id_generation_is_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("sess_"));
    }

    #[test]
    fn test_entity_damage() {
        let mut goblin = EntityInstance::new("Goblin", 7, 12);
        assert!(!goblin.take_damage(3));
        assert_eq!(goblin.hp_current, 4);
        assert!(goblin.take_damage(4));
        assert!(goblin.is_dead());
    }

    #[test]
    fn test_room_description_switches_when_cleared() {
        let mut room = RoomNode::new("r1", "Hall", RoomType::Chamber)
            .with_descriptions("Goblins snarl.", "Silence.")
            .with_entity(EntityInstance::new("Goblin", 7, 12));
        assert_eq!(room.description(), "Goblins snarl.");
        room.entities.clear();
        assert_eq!(room.description(), "Silence.");
    }

    #[test]
    fn test_valid_targets_lists_entities_then_exits() {
        let room = RoomNode::new("r1", "Hall", RoomType::Corridor)
            .with_exit("south", "r0")
            .with_exit("north", "r2")
            .with_entity(EntityInstance::new("Zombie", 22, 8));
        assert_eq!(room.valid_targets(), vec!["Zombie", "north", "south"]);
        assert_eq!(room.find_entity("zombie"), Some(0));
    }

    #[test]
    fn test_validate_rejects_dangling_exit() {
        let mut session = sample_session("sess_test");
        session
            .rooms
            .get_mut(&RoomId::from("room_03"))
            .unwrap()
            .exits
            .insert("down".to_string(), RoomId::from("room_99"));

        let err = session.validate().unwrap_err();
        assert!(matches!(err, WorldError::InvalidReference(ref m) if m.contains("room_99")));
    }

    #[test]
    fn test_validate_rejects_unknown_active_room() {
        let mut session = sample_session("sess_test");
        session.active_room = RoomId::from("nowhere");
        assert!(matches!(
            session.validate(),
            Err(WorldError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_validate_rejects_overhealed_entity() {
        let mut session = sample_session("sess_test");
        session
            .current_room_mut()
            .unwrap()
            .entities
            .push(EntityInstance {
                hp_current: 12,
                ..EntityInstance::new("Ogre", 10, 11)
            });
        assert!(matches!(
            session.validate(),
            Err(WorldError::InvalidEntity(_))
        ));
    }

    #[test]
    fn test_starter_session_is_valid() {
        let session = Session::starter(SessionId::from("sess_starter"));
        assert!(session.validate().is_ok());
        assert_eq!(session.current_room().unwrap().title, "Damp Crypt");
    }

    #[test]
    fn test_session_json_shape() {
        let session = sample_session("sess_json");
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["session_id"], "sess_json");
        let room = &value["rooms"]["room_02"];
        assert_eq!(room["room_type"], "corridor");
        assert_eq!(room["exits"]["north"], "room_03");
        assert_eq!(room["entities"][0]["hp_current"], 7);
        assert_eq!(value["active_room"], "room_01");
    }
}
