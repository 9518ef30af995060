//! Dungeon session engine.
//!
//! This crate provides:
//! - d20 checks and damage dice with an injectable random source
//! - Attack and skill check resolution
//! - Budgeted procedural room population
//! - A room-graph world model with integrity checks
//! - Durable, per-session locked persistence
//! - A content-addressed cache for generated images, audio and NPC casting
//!
//! # Quick Start
//!
//! ```ignore
//! use dungeon_core::{ActionIntent, EngineConfig, GameMaster};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gm = GameMaster::open(EngineConfig::new("data")).await?;
//!
//!     let session = gm.start_session("camp_001", "a forgotten crypt").await?;
//!     let outcome = gm
//!         .play_turn(&session.session_id, "hero", "go north")
//!         .await?;
//!     println!("{}", outcome.description);
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod collaborators;
pub mod config;
pub mod dice;
pub mod encounter;
pub mod persist;
pub mod rules;
pub mod session;
mod storage;
pub mod testing;
pub mod world;

// Primary public API
pub use assets::{AssetCache, AssetCacheConfig, AssetError, AssetIndex, GeneratedAsset, NpcAssets};
pub use collaborators::{ActionIntent, IntentResolver, LoreSource, Narrator};
pub use config::{ConfigError, EngineConfig};
pub use dice::{Advantage, DiceExpression, DiceSource, RngDice, RollResult};
pub use encounter::{ContentTables, Difficulty, EncounterGenerator};
pub use persist::{PersistError, SessionStore};
pub use rules::{AttackOutcome, AttackResolution};
pub use session::{GameMaster, SessionError, TurnOutcome};
pub use world::{RoomId, RoomNode, Session, SessionId};
