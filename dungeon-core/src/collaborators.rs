//! Seams to the services around the engine.
//!
//! Intent parsing, narration and lore retrieval are normally backed by
//! language models or a vector store. The engine only sees these traits; the
//! local implementations here keep the game playable offline and in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors reported by an external collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Intent resolution failed: {0}")]
    Intent(String),

    #[error("Narration failed: {0}")]
    Narration(String),

    #[error("Lore lookup failed: {0}")]
    Lore(String),
}

/// A parsed player action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionIntent {
    pub action: String,
    #[serde(default)]
    pub target: Option<String>,
}

impl ActionIntent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Turns free text into an [`ActionIntent`].
#[async_trait]
pub trait IntentResolver: Send + Sync {
    /// `valid_targets` lists the entity names and exit directions in scope.
    async fn resolve(
        &self,
        text: &str,
        valid_targets: &[String],
    ) -> Result<ActionIntent, CollaboratorError>;
}

/// Writes the prose the player reads.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CollaboratorError>;
}

/// Background lore for a set of tags.
#[async_trait]
pub trait LoreSource: Send + Sync {
    async fn lore_for(&self, tags: &[String]) -> Result<Vec<String>, CollaboratorError>;
}

// ============================================================================
// Keyword intent resolution
// ============================================================================

const ATTACK_WORDS: &[&str] = &["attack", "hit", "strike", "fight", "stab", "slash"];
const SEARCH_WORDS: &[&str] = &["search", "loot", "look", "examine", "inspect"];
const MOVE_WORDS: &[&str] = &["go", "move", "walk", "head", "run", "enter"];
const DIRECTIONS: &[&str] = &["north", "south", "east", "west", "up", "down"];

/// Verb matching for offline play.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordIntentResolver;

impl KeywordIntentResolver {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of [`IntentResolver::resolve`].
    pub fn classify(text: &str, valid_targets: &[String]) -> ActionIntent {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
            .filter(|w| !w.is_empty())
            .collect();

        let has_any = |list: &[&str]| words.iter().any(|w| list.contains(w));
        let direction = words.iter().find(|w| DIRECTIONS.contains(w)).copied();

        if has_any(ATTACK_WORDS) {
            let target = mentioned_target(&lower, valid_targets);
            return ActionIntent {
                action: "attack".to_string(),
                target,
            };
        }

        if has_any(MOVE_WORDS) || (direction.is_some() && words.len() <= 2) {
            return ActionIntent {
                action: "move".to_string(),
                target: direction.map(str::to_string),
            };
        }

        if has_any(SEARCH_WORDS) {
            return ActionIntent::new("search");
        }

        ActionIntent::new(words.first().copied().unwrap_or("wait"))
    }
}

/// The longest valid target named in the text.
fn mentioned_target(lower_text: &str, valid_targets: &[String]) -> Option<String> {
    valid_targets
        .iter()
        .filter(|t| !t.is_empty() && lower_text.contains(&t.to_lowercase()))
        .max_by_key(|t| t.len())
        .cloned()
}

#[async_trait]
impl IntentResolver for KeywordIntentResolver {
    async fn resolve(
        &self,
        text: &str,
        valid_targets: &[String],
    ) -> Result<ActionIntent, CollaboratorError> {
        let intent = Self::classify(text, valid_targets);
        tracing::debug!(text, action = %intent.action, target = ?intent.target, "Resolved intent");
        Ok(intent)
    }
}

// ============================================================================
// Plain narration
// ============================================================================

/// Narrator that hands the action result back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainNarrator;

#[async_trait]
impl Narrator for PlainNarrator {
    async fn narrate(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CollaboratorError> {
        Ok(user_prompt.to_string())
    }
}

// ============================================================================
// Static lore
// ============================================================================

/// Lore looked up by exact tag.
#[derive(Debug, Clone, Default)]
pub struct StaticLore {
    entries: HashMap<String, Vec<String>>,
}

impl StaticLore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment under a tag. Tags are case-insensitive.
    pub fn with_entry(mut self, tag: &str, fragment: impl Into<String>) -> Self {
        self.entries
            .entry(tag.to_lowercase())
            .or_default()
            .push(fragment.into());
        self
    }

    /// A few fragments for the built-in biomes and monsters.
    pub fn builtin() -> Self {
        Self::new()
            .with_entry("crypt", "The crypts were sealed after the Plague of Whispers.")
            .with_entry("crypt", "Grave-robbers say the dead here do not stay buried.")
            .with_entry("dungeon", "The old keep's cells were dug by prisoners of the Iron Legion.")
            .with_entry("forest", "Travellers leave bread at the forest edge for the Green Warden.")
            .with_entry("goblin", "Goblins hoard anything that shines, however worthless.")
            .with_entry("orc", "Orc raiding bands answer to whoever last beat them in a duel.")
            .with_entry("skeleton", "Skeletons remember their last orders and nothing else.")
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl LoreSource for StaticLore {
    async fn lore_for(&self, tags: &[String]) -> Result<Vec<String>, CollaboratorError> {
        let mut found: Vec<String> = Vec::new();
        for tag in tags {
            for fragment in self.entries.get(&tag.to_lowercase()).into_iter().flatten() {
                if !found.contains(fragment) {
                    found.push(fragment.clone());
                }
            }
        }
        Ok(found)
    }
}
