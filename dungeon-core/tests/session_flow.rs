//! End-to-end play through the public API: bootstrap, turns, persistence and
//! recovery, all with scripted dice.

use dungeon_core::collaborators::ActionIntent;
use dungeon_core::testing::{sample_session, ScriptedDice};
use dungeon_core::world::WorldError;
use dungeon_core::{
    EngineConfig, GameMaster, PersistError, RoomId, Session, SessionError, SessionId,
};
use tempfile::TempDir;

async fn game_master(dir: &TempDir, dice: ScriptedDice) -> GameMaster {
    GameMaster::open(EngineConfig::new(dir.path()))
        .await
        .expect("Failed to open game master")
        .with_dice(dice)
}

#[tokio::test]
async fn clear_the_dungeon() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    // Move (no dice), then two attacks on the goblin (7 hp): 4 damage, then 6.
    let dice = ScriptedDice::new().with_rolls([15, 1, 4, 19, 1, 6]);
    let gm = game_master(&dir, dice).await;

    gm.store().save(&sample_session("sess_e2e")).await.unwrap();
    let id = SessionId::from("sess_e2e");

    let moved = gm.play_turn(&id, "hero", "walk north").await.expect("move");
    assert_eq!(moved.session.active_room, RoomId::from("room_02"));

    let first = gm
        .play_turn(&id, "hero", "attack the goblin scavenger")
        .await
        .expect("first attack");
    assert!(first.description.contains("It is wounded."));

    let second = gm
        .play_turn(&id, "hero", "strike goblin scavenger again")
        .await
        .expect("second attack");
    assert!(second.description.contains("It is dead."));

    let stored = gm.store().load(&id).await.expect("load");
    let hallway = stored.current_room().unwrap();
    assert!(hallway.is_cleared());
    assert_eq!(hallway.description(), "The hallway is empty.");
    assert!(stored.validate().is_ok());
}

#[tokio::test]
async fn new_sessions_survive_a_restart() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let session = {
        let gm = game_master(&dir, ScriptedDice::new().with_rolls([90, 90, 90])).await;
        gm.start_session("camp_001", "a goblin dungeon")
            .await
            .expect("start")
    };

    let gm = game_master(&dir, ScriptedDice::new()).await;
    let resumed = gm.resume_session(&session.session_id).await.expect("resume");
    assert_eq!(resumed, session);
    assert_eq!(resumed.location_name, "Generated Dungeon");

    let listed = gm.store().list().await.expect("list");
    assert_eq!(listed, vec![session.session_id.clone()]);
}

#[tokio::test]
async fn rejected_turn_leaves_stored_state_alone() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let gm = game_master(&dir, ScriptedDice::new().with_rolls([20, 20, 8])).await;

    let mut session = sample_session("sess_reject");
    session.active_room = RoomId::from("room_03");
    gm.store().save(&session).await.unwrap();

    let err = gm
        .take_turn(
            session.clone(),
            "hero",
            &ActionIntent::new("attack").with_target("Beholder"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::World(WorldError::InvalidReference(_))
    ));

    let stored = gm.store().load(&session.session_id).await.unwrap();
    assert_eq!(stored, session);
}

#[tokio::test]
async fn corrupt_and_missing_sessions() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let gm = game_master(&dir, ScriptedDice::new()).await;

    let broken = SessionId::from("sess_truncated");
    let full = serde_json::to_string(&sample_session("sess_truncated")).unwrap();
    std::fs::write(
        gm.store().session_path(&broken).unwrap(),
        &full[..full.len() / 2],
    )
    .unwrap();

    assert!(matches!(
        gm.store().load(&broken).await,
        Err(PersistError::CorruptData { .. })
    ));
    let recovered = gm.resume_session(&broken).await.expect("recover");
    assert_eq!(recovered, Session::starter(broken.clone()));

    let missing = gm
        .resume_session(&SessionId::from("sess_never_saved"))
        .await
        .unwrap_err();
    assert!(matches!(
        missing,
        SessionError::Persist(PersistError::NotFound(_))
    ));
}
