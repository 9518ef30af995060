//! Testing utilities.
//!
//! - `ScriptedDice` replays forced draws for deterministic scenarios
//! - `sample_session` builds a small, valid dungeon without random content

use crate::dice::DiceSource;
use crate::world::{EntityInstance, LootItem, RoomId, RoomNode, RoomType, Session, SessionId};
use std::collections::VecDeque;

/// A dice source that returns scripted values in order.
///
/// Each kind of draw has its own queue. When a queue runs dry the source
/// falls back to the lowest outcome: a roll of 1, index 0, and `false`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    rolls: VecDeque<u32>,
    picks: VecDeque<usize>,
    chances: VecDeque<bool>,
}

impl ScriptedDice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue die results, returned verbatim by `roll` regardless of sides.
    pub fn with_rolls(mut self, rolls: impl IntoIterator<Item = u32>) -> Self {
        self.rolls.extend(rolls);
        self
    }

    /// Queue indices returned by `pick`, clamped to the requested length.
    pub fn with_picks(mut self, picks: impl IntoIterator<Item = usize>) -> Self {
        self.picks.extend(picks);
        self
    }

    /// Queue outcomes returned by `chance`.
    pub fn with_chances(mut self, chances: impl IntoIterator<Item = bool>) -> Self {
        self.chances.extend(chances);
        self
    }

    /// Number of scripted draws not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rolls.len() + self.picks.len() + self.chances.len()
    }
}

impl DiceSource for ScriptedDice {
    fn roll(&mut self, _sides: u32) -> u32 {
        self.rolls.pop_front().unwrap_or(1)
    }

    fn pick(&mut self, len: usize) -> usize {
        self.picks
            .pop_front()
            .unwrap_or(0)
            .min(len.saturating_sub(1))
    }

    fn chance(&mut self, _probability: f64) -> bool {
        self.chances.pop_front().unwrap_or(false)
    }
}

/// A three-room session with fixed content, useful for persistence and turn tests.
pub fn sample_session(session_id: impl Into<String>) -> Session {
    let entrance = RoomNode::new("room_01", "Entrance", RoomType::Entrance)
        .with_descriptions("You stand at the entrance.", "The entrance is quiet.")
        .with_exit("north", "room_02")
        .with_loot(LootItem::new("Rusted Dagger", 1, "A worn dagger.", false));

    let corridor = RoomNode::new("room_02", "Dark Hallway", RoomType::Corridor)
        .with_descriptions(
            "A long, dark hallway stretches ahead.",
            "The hallway is empty.",
        )
        .with_exit("south", "room_01")
        .with_exit("north", "room_03")
        .with_entity(EntityInstance::new("Goblin Scavenger", 7, 12).with_challenge_rating(0.25));

    let chamber = RoomNode::new("room_03", "Main Chamber", RoomType::Chamber)
        .with_descriptions(
            "A large chamber with high ceilings.",
            "The chamber is silent, dust settling.",
        )
        .with_exit("south", "room_02")
        .with_entity(EntityInstance::new("Orc Grunt", 15, 13).with_challenge_rating(1.0))
        .with_loot(LootItem::new("Gemstone", 50, "A shiny ruby.", false))
        .with_loot(LootItem::new("Potion of Healing", 25, "A red liquid.", true));

    let mut session = Session::new(SessionId::from(session_id.into()), "Sample Dungeon", 1);
    for room in [entrance, corridor, chamber] {
        session.insert_room(room);
    }
    session.active_room = RoomId::from("room_01");
    session
}
