//! GameMaster - the primary public API for dungeon play.
//!
//! Wires the rules, encounter generator, session store and asset cache
//! together with the external collaborators. Every turn that changes a
//! session is committed to the store before the caller sees its outcome.

use crate::assets::{AssetCache, AssetError};
use crate::collaborators::{
    ActionIntent, CollaboratorError, IntentResolver, KeywordIntentResolver, LoreSource, Narrator,
    PlainNarrator, StaticLore,
};
use crate::config::{ConfigError, EngineConfig};
use crate::dice::{DiceSource, RngDice, RollResult};
use crate::encounter::{
    biome_for_prompt, process_player_action, strike_entity, ActionKind, ContentError,
    ContentTables, Difficulty, EncounterGenerator,
};
use crate::persist::{PersistError, SessionStore};
use crate::rules::resolve_attack;
use crate::world::{RoomId, RoomNode, RoomType, Session, SessionId, WorldError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Errors from GameMaster operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("World error: {0}")]
    World(#[from] WorldError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),
}

/// Result of a single turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// What happened, as the player should read it.
    pub description: String,

    /// The d20 roll behind the outcome, if one was made.
    pub roll: Option<RollResult>,

    /// The session as committed after the turn.
    pub session: Session,
}

/// Static layout of a freshly generated dungeon.
struct RoomBlueprint {
    id: &'static str,
    title: &'static str,
    room_type: RoomType,
    difficulty: Difficulty,
    initial: &'static str,
    cleared: &'static str,
    exits: &'static [(&'static str, &'static str)],
}

const LAYOUT: &[RoomBlueprint] = &[
    RoomBlueprint {
        id: "room_01",
        title: "Entrance",
        room_type: RoomType::Entrance,
        difficulty: Difficulty::Easy,
        initial: "You stand at the entrance.",
        cleared: "The entrance is quiet.",
        exits: &[("north", "room_02")],
    },
    RoomBlueprint {
        id: "room_02",
        title: "Dark Hallway",
        room_type: RoomType::Corridor,
        difficulty: Difficulty::Medium,
        initial: "A long, dark hallway stretches ahead.",
        cleared: "The hallway is empty.",
        exits: &[("south", "room_01"), ("north", "room_03")],
    },
    RoomBlueprint {
        id: "room_03",
        title: "Main Chamber",
        room_type: RoomType::Chamber,
        difficulty: Difficulty::Hard,
        initial: "A large chamber with high ceilings.",
        cleared: "The chamber is silent, dust settling.",
        exits: &[("south", "room_02")],
    },
];

const DM_PERSONA: &str = "You are the Dungeon Master of a dark fantasy adventure. \
Answer in two vivid sentences and never contradict the action result.";

/// Runs sessions: bootstrap, turns, persistence and recovery.
pub struct GameMaster {
    config: EngineConfig,
    store: SessionStore,
    assets: AssetCache,
    generator: EncounterGenerator,
    intents: Arc<dyn IntentResolver>,
    narrator: Arc<dyn Narrator>,
    lore: Arc<dyn LoreSource>,
    dice: Mutex<Box<dyn DiceSource + Send>>,
}

impl GameMaster {
    /// Open the store, asset cache and content tables named by `config`.
    ///
    /// Collaborators default to the offline implementations and dice to an
    /// entropy-seeded source; replace them with the `with_*` methods.
    pub async fn open(config: EngineConfig) -> Result<Self, SessionError> {
        let store = SessionStore::open(config.sessions_dir()).await?;
        let assets = AssetCache::open(config.asset_cache_config()).await?;

        let tables = match &config.content_tables {
            Some(path) => ContentTables::from_json_file(path).await?,
            None => ContentTables::builtin(),
        };
        let generator = EncounterGenerator::new(tables, config.player_level);

        tracing::info!(
            data_dir = %config.data_dir.display(),
            player_level = config.player_level,
            "Game master ready"
        );

        let dice: Box<dyn DiceSource + Send> = Box::new(RngDice::from_entropy());

        Ok(Self {
            config,
            store,
            assets,
            generator,
            intents: Arc::new(KeywordIntentResolver::new()),
            narrator: Arc::new(PlainNarrator),
            lore: Arc::new(StaticLore::builtin()),
            dice: Mutex::new(dice),
        })
    }

    pub fn with_dice(mut self, dice: impl DiceSource + Send + 'static) -> Self {
        let dice: Box<dyn DiceSource + Send> = Box::new(dice);
        self.dice = Mutex::new(dice);
        self
    }

    pub fn with_intent_resolver(mut self, resolver: Arc<dyn IntentResolver>) -> Self {
        self.intents = resolver;
        self
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn Narrator>) -> Self {
        self.narrator = narrator;
        self
    }

    pub fn with_lore(mut self, lore: Arc<dyn LoreSource>) -> Self {
        self.lore = lore;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn assets(&self) -> &AssetCache {
        &self.assets
    }

    fn dice(&self) -> MutexGuard<'_, Box<dyn DiceSource + Send>> {
        self.dice.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Bootstrap
    // ========================================================================

    /// Generate, validate and save a new three-room dungeon.
    pub async fn start_session(
        &self,
        campaign_id: &str,
        prompt: &str,
    ) -> Result<Session, SessionError> {
        let biome = biome_for_prompt(prompt);
        let session = self.build_session(SessionId::generate(), biome)?;
        self.store.save(&session).await?;

        tracing::info!(
            campaign_id,
            session_id = %session.session_id,
            biome,
            monsters = session.rooms.values().map(|r| r.entities.len()).sum::<usize>(),
            "Started session"
        );
        Ok(session)
    }

    fn build_session(&self, session_id: SessionId, biome: &str) -> Result<Session, SessionError> {
        let mut session = Session::new(session_id, format!("Generated {}", capitalize(biome)), 1);
        let mut dice = self.dice();

        for blueprint in LAYOUT {
            let mut room = RoomNode::new(blueprint.id, blueprint.title, blueprint.room_type)
                .with_descriptions(blueprint.initial, blueprint.cleared);
            for (direction, target) in blueprint.exits {
                room = room.with_exit(*direction, *target);
            }

            let content = self.generator.generate_room_content(
                &room.id,
                biome,
                blueprint.difficulty,
                &mut **dice,
            );
            content.apply_to(&mut room);
            session.insert_room(room);
        }

        let entrance = RoomId::from(LAYOUT[0].id);
        session.room_mut(&entrance)?.visited = true;
        session.active_room = entrance;
        session.validate()?;
        Ok(session)
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Apply one parsed action to the active room and commit the result.
    ///
    /// Nothing is saved when the action is rejected.
    pub async fn take_turn(
        &self,
        mut session: Session,
        character_id: &str,
        intent: &ActionIntent,
    ) -> Result<TurnOutcome, SessionError> {
        let (description, roll) = self.resolve_action(&mut session, character_id, intent)?;
        self.store.save(&session).await?;

        tracing::info!(
            session_id = %session.session_id,
            character_id,
            action = %intent.action,
            room = %session.active_room,
            "Turn committed"
        );

        Ok(TurnOutcome {
            description,
            roll,
            session,
        })
    }

    fn resolve_action(
        &self,
        session: &mut Session,
        character_id: &str,
        intent: &ActionIntent,
    ) -> Result<(String, Option<RollResult>), SessionError> {
        let action = intent.action.trim().to_lowercase();
        match action.as_str() {
            "attack" => self.attack(session, character_id, intent.target.as_deref()),
            "move" | "go" => Ok((travel(session, intent.target.as_deref())?, None)),
            other => {
                let kind = ActionKind::from_name(other);
                let room = session.current_room_mut()?;
                let description = process_player_action(&kind, room, &mut **self.dice());
                Ok((description, None))
            }
        }
    }

    fn attack(
        &self,
        session: &mut Session,
        character_id: &str,
        target: Option<&str>,
    ) -> Result<(String, Option<RollResult>), SessionError> {
        let room = session.current_room_mut()?;

        let index = match target {
            Some(name) => room.find_entity(name).ok_or_else(|| {
                WorldError::InvalidReference(format!("no target named {name} in {}", room.id))
            })?,
            None if room.entities.is_empty() => {
                return Ok(("There is nothing here to attack.".to_string(), None))
            }
            None => 0,
        };

        let mut dice = self.dice();
        let armor_class = room.entities[index].armor_class;
        let resolution = resolve_attack(
            character_id,
            armor_class,
            self.config.weapon_modifier,
            &mut **dice,
        );

        let mut description = resolution.summary();
        if resolution.outcome.lands() {
            description.push(' ');
            description.push_str(&strike_entity(room, index, &mut **dice));
        }

        Ok((description, Some(resolution.roll)))
    }

    /// Load, resolve free text, take the turn, then narrate it.
    ///
    /// Narration and lore are best effort: the turn is already committed, so
    /// their failures fall back to the plain description.
    pub async fn play_turn(
        &self,
        session_id: &SessionId,
        character_id: &str,
        text: &str,
    ) -> Result<TurnOutcome, SessionError> {
        let session = self.store.load(session_id).await?;
        let targets = session.current_room()?.valid_targets();
        let intent = self.intents.resolve(text, &targets).await?;

        let mut outcome = self.take_turn(session, character_id, &intent).await?;

        let tags = lore_tags(&outcome.session)?;
        let lore = match self.lore.lore_for(&tags).await {
            Ok(lore) => lore,
            Err(e) => {
                tracing::warn!(error = %e, "Lore lookup failed, narrating without it");
                Vec::new()
            }
        };

        let room = outcome.session.current_room()?;
        let system_prompt = format!(
            "{DM_PERSONA}\nLocation: {} - {}. {}\nLore: {}\nPlayer input: {text}",
            outcome.session.location_name,
            room.title,
            room.description(),
            lore.join(" "),
        );

        match self.narrator.narrate(&system_prompt, &outcome.description).await {
            Ok(narrative) => outcome.description = narrative,
            Err(e) => tracing::warn!(error = %e, "Narration failed, using plain result"),
        }

        Ok(outcome)
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Load a stored session, replacing unreadable data with the starter
    /// dungeon under the same id.
    pub async fn resume_session(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        match self.store.load(session_id).await {
            Ok(session) => Ok(session),
            Err(PersistError::CorruptData { id, reason }) => {
                tracing::warn!(session_id = %id, %reason, "Session data corrupt, regenerating starter");
                let session = Session::starter(id);
                self.store.save(&session).await?;
                Ok(session)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Follow an exit from the active room.
fn travel(session: &mut Session, direction: Option<&str>) -> Result<String, WorldError> {
    let Some(direction) = direction.map(str::to_lowercase) else {
        return Ok("Which way do you want to go?".to_string());
    };

    let Some(next) = session.current_room()?.exits.get(&direction).cloned() else {
        return Ok(format!("You can't go {direction} from here."));
    };

    let room = session.room_mut(&next)?;
    room.visited = true;
    let mut description = format!(
        "You head {direction} into the {}. {}",
        room.title,
        room.description()
    );
    if !room.entities.is_empty() {
        let names: Vec<&str> = room.entities.iter().map(|e| e.name.as_str()).collect();
        description.push_str(&format!(" You are not alone: {}.", names.join(", ")));
    }

    session.active_room = next;
    Ok(description)
}

/// Lowercase words from the location and the active room's occupants.
fn lore_tags(session: &Session) -> Result<Vec<String>, WorldError> {
    let room = session.current_room()?;
    let mut tags: Vec<String> = Vec::new();
    let words = session
        .location_name
        .split_whitespace()
        .chain(room.entities.iter().flat_map(|e| e.name.split(['_', ' '])));

    for word in words {
        let word = word.to_lowercase();
        if !word.is_empty() && !word.chars().all(|c| c.is_ascii_digit()) && !tags.contains(&word) {
            tags.push(word);
        }
    }
    Ok(tags)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
