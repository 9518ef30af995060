//! Procedural room population.
//!
//! Rooms are filled greedily from a biome's monster table until the
//! challenge-rating budget runs out, then rolled once for loot. Tables are
//! immutable after load and shared behind an `Arc`.

use crate::dice::{DiceExpression, DiceSource, DieType};
use crate::world::{Attack, EntityInstance, LootItem, RoomId, RoomNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;

/// Percentile at or below which a room has no monsters.
const EMPTY_ROOM_THRESHOLD: u32 = 30;

/// Budget at or below which the fill stops, whatever remains affordable.
const MIN_SPEND: f64 = 0.25;

/// Probability that a room gets one loot item.
const LOOT_CHANCE: f64 = 0.5;


/// Errors from loading or validating content tables.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid monster {name}: {reason}")]
    InvalidMonster { name: String, reason: String },

    #[error("Unknown difficulty: {0}")]
    UnknownDifficulty(String),
}

// ============================================================================
// Content Tables
// ============================================================================

/// A monster as written in a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsterTemplate {
    pub name: String,
    pub challenge_rating: f64,
    pub hp: i32,
    #[serde(default = "default_armor_class")]
    pub armor_class: i32,
    #[serde(default)]
    pub attacks: Vec<Attack>,
}

fn default_armor_class() -> i32 {
    10
}

impl MonsterTemplate {
    pub fn new(name: impl Into<String>, challenge_rating: f64, hp: i32, armor_class: i32) -> Self {
        Self {
            name: name.into(),
            challenge_rating,
            hp,
            armor_class,
            attacks: Vec::new(),
        }
    }

    pub fn with_attack(mut self, name: &str, damage: &str) -> Self {
        self.attacks.push(Attack::new(name, damage));
        self
    }

    /// A fresh entity at full health.
    pub fn instantiate(&self) -> EntityInstance {
        EntityInstance {
            name: self.name.clone(),
            hp_current: self.hp,
            hp_max: self.hp,
            armor_class: self.armor_class,
            attacks: self.attacks.clone(),
            challenge_rating: self.challenge_rating,
        }
    }
}

/// Monster tables keyed by biome plus a flat loot table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentTables {
    pub monsters: HashMap<String, Vec<MonsterTemplate>>,
    pub loot: Vec<LootItem>,
}

lazy_static::lazy_static! {
    static ref BUILTIN_TABLES: Arc<ContentTables> = Arc::new(ContentTables {
        monsters: HashMap::from([
            (
                "dungeon".to_string(),
                vec![
                    MonsterTemplate::new("Goblin Scavenger", 0.25, 7, 12)
                        .with_attack("Scimitar", "1d6+2"),
                    MonsterTemplate::new("Skeleton Warrior", 0.5, 13, 13)
                        .with_attack("Shortsword", "1d6+2"),
                    MonsterTemplate::new("Orc Grunt", 1.0, 15, 13)
                        .with_attack("Greataxe", "1d12+3"),
                ],
            ),
            (
                "crypt".to_string(),
                vec![
                    MonsterTemplate::new("Zombie", 0.25, 22, 8).with_attack("Slam", "1d6+1"),
                    MonsterTemplate::new("Ghoul", 1.0, 22, 12).with_attack("Claws", "2d4+2"),
                ],
            ),
        ]),
        loot: vec![
            LootItem::new("Rusted Dagger", 1, "A worn dagger.", false),
            LootItem::new("Gold Pouch", 10, "A pouch containing 10gp.", false),
            LootItem::new("Gemstone", 50, "A shiny ruby.", false),
            LootItem::new("Potion of Healing", 25, "A red liquid.", true),
        ],
    });
}

impl ContentTables {
    /// The built-in dungeon and crypt tables.
    pub fn builtin() -> Arc<ContentTables> {
        BUILTIN_TABLES.clone()
    }

    /// Load and validate tables from a JSON file.
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Arc<ContentTables>, ContentError> {
        let content = fs::read_to_string(path.as_ref()).await?;
        let tables: ContentTables = serde_json::from_str(&content)?;
        tables.validate()?;
        tracing::info!(
            path = %path.as_ref().display(),
            biomes = tables.monsters.len(),
            loot = tables.loot.len(),
            "Loaded content tables"
        );
        Ok(Arc::new(tables))
    }

    /// Monsters for a biome; unknown biomes have none.
    pub fn monsters_for(&self, biome: &str) -> &[MonsterTemplate] {
        self.monsters.get(biome).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reject templates the generator cannot use.
    pub fn validate(&self) -> Result<(), ContentError> {
        let invalid = |name: &str, reason: String| ContentError::InvalidMonster {
            name: name.to_string(),
            reason,
        };

        for monster in self.monsters.values().flatten() {
            if !monster.challenge_rating.is_finite() || monster.challenge_rating <= 0.0 {
                return Err(invalid(
                    &monster.name,
                    format!("challenge rating {} must be positive", monster.challenge_rating),
                ));
            }
            if monster.hp <= 0 {
                return Err(invalid(&monster.name, format!("hp {} must be positive", monster.hp)));
            }
            for attack in &monster.attacks {
                let damage = DiceExpression::parse(&attack.damage).map_err(|e| {
                    invalid(&monster.name, format!("attack {}: {e}", attack.name))
                })?;
                if damage.max() < 1 {
                    return Err(invalid(
                        &monster.name,
                        format!("attack {} can never deal damage ({damage})", attack.name),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Encounter difficulty; scales the challenge budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Deadly,
}

impl Difficulty {
    pub fn multiplier(&self) -> f64 {
        match self {
            Difficulty::Easy => 0.5,
            Difficulty::Medium => 1.0,
            Difficulty::Hard => 1.5,
            Difficulty::Deadly => 2.5,
        }
    }
}

impl FromStr for Difficulty {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            "deadly" => Ok(Difficulty::Deadly),
            other => Err(ContentError::UnknownDifficulty(other.to_string())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::Deadly => "deadly",
        })
    }
}

/// Generated contents for one room.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomContent {
    pub room_id: RoomId,
    pub entities: Vec<EntityInstance>,
    pub loot: Vec<LootItem>,
    pub description_tags: Vec<String>,
}

impl RoomContent {
    /// Total challenge rating spent on the room's monsters.
    pub fn total_challenge(&self) -> f64 {
        self.entities.iter().map(|e| e.challenge_rating).sum()
    }

    /// Move the generated monsters and loot into a room.
    pub fn apply_to(self, room: &mut RoomNode) {
        room.entities.extend(self.entities);
        room.loot.extend(self.loot);
    }
}

/// Pick the biome a campaign prompt asks for. Defaults to the crypt.
pub fn biome_for_prompt(prompt: &str) -> &'static str {
    let prompt = prompt.to_lowercase();
    if prompt.contains("forest") {
        "forest"
    } else if prompt.contains("dungeon") {
        "dungeon"
    } else {
        "crypt"
    }
}

/// Fills rooms from content tables for a party of a given level.
#[derive(Debug, Clone)]
pub struct EncounterGenerator {
    tables: Arc<ContentTables>,
    player_level: u32,
}

impl EncounterGenerator {
    pub fn new(tables: Arc<ContentTables>, player_level: u32) -> Self {
        Self {
            tables,
            player_level,
        }
    }

    pub fn tables(&self) -> &ContentTables {
        &self.tables
    }

    /// Challenge-rating allowance for a room.
    pub fn budget(&self, difficulty: Difficulty) -> f64 {
        f64::from(self.player_level) * difficulty.multiplier()
    }

    /// Roll monsters and loot for a room.
    pub fn generate_room_content(
        &self,
        room_id: &RoomId,
        biome: &str,
        difficulty: Difficulty,
        dice: &mut dyn DiceSource,
    ) -> RoomContent {
        let mut content = RoomContent {
            room_id: room_id.clone(),
            entities: Vec::new(),
            loot: Vec::new(),
            description_tags: Vec::new(),
        };

        let encounter_roll = dice.roll(100);
        if encounter_roll <= EMPTY_ROOM_THRESHOLD {
            content
                .description_tags
                .push("is quiet and empty".to_string());
        } else {
            let table = self.tables.monsters_for(biome);
            if table.is_empty() {
                tracing::warn!(biome, room = %room_id, "No monster table for biome");
            }

            // Compare running sums against the fixed budget; subtracting from
            // it lets decimal CRs drift past the cap.
            let budget = self.budget(difficulty);
            let mut spent = 0.0;
            while budget - spent > MIN_SPEND {
                // Zero-CR templates would never drain the budget.
                let affordable: Vec<&MonsterTemplate> = table
                    .iter()
                    .filter(|m| m.challenge_rating > 0.0 && spent + m.challenge_rating <= budget)
                    .collect();
                if affordable.is_empty() {
                    break;
                }

                let choice = affordable[dice.pick(affordable.len())];
                content.entities.push(choice.instantiate());
                content
                    .description_tags
                    .push(format!("contains {}", choice.name));
                spent += choice.challenge_rating;
            }
        }

        if !self.tables.loot.is_empty() && dice.chance(LOOT_CHANCE) {
            let item = self.tables.loot[dice.pick(self.tables.loot.len())].clone();
            content.description_tags.push(format!("has {}", item.name));
            content.loot.push(item);
        }

        tracing::debug!(
            room = %room_id,
            biome,
            %difficulty,
            encounter_roll,
            monsters = content.entities.len(),
            loot = content.loot.len(),
            "Generated room content"
        );

        content
    }
}

// ============================================================================
// Player Actions
// ============================================================================

/// The table-level verbs a room understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Search,
    Attack,
    Other(String),
}

impl ActionKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "search" => ActionKind::Search,
            "attack" => ActionKind::Attack,
            other => ActionKind::Other(other.to_string()),
        }
    }
}

/// Apply a search or attack to a room and describe what happened.
pub fn process_player_action(
    action: &ActionKind,
    room: &mut RoomNode,
    dice: &mut dyn DiceSource,
) -> String {
    match action {
        ActionKind::Search => {
            if room.loot.is_empty() {
                "You search thoroughly but find nothing of value.".to_string()
            } else {
                let found = room.loot.remove(0);
                format!("You search the room and find a {}!", found.name)
            }
        }
        ActionKind::Attack => {
            if room.entities.is_empty() {
                "There is nothing here to attack.".to_string()
            } else {
                strike_entity(room, 0, dice)
            }
        }
        ActionKind::Other(_) => "I don't understand that action.".to_string(),
    }
}

lazy_static::lazy_static! {
    /// Damage dealt by a plain attack action: one d8.
    static ref PLAYER_DAMAGE: DiceExpression = DiceExpression::single(1, DieType::D8);
}

/// Roll player damage against the entity at `index`, removing it if it dies.
pub fn strike_entity(room: &mut RoomNode, index: usize, dice: &mut dyn DiceSource) -> String {
    let Some(target) = room.entities.get_mut(index) else {
        return "There is nothing here to attack.".to_string();
    };

    let damage = PLAYER_DAMAGE.roll(dice);
    let died = target.take_damage(damage);
    let name = target.name.clone();

    if died {
        room.entities.remove(index);
        format!("You hit the {name} for {damage} damage! It is dead.")
    } else {
        format!("You hit the {name} for {damage} damage! It is wounded.")
    }
}
