//! Turn state machine driven through the engine.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use rampart::config::ResolutionSchedule;
use rampart::engine::{ManualClock, SeatView};
use rampart::game::Phase;
use rampart::{
    Action, ActionError, Engine, EngineConfig, ErrorKind, GameId, Opponent, PlayerId, Position,
    ScriptGateway, Side, TowerId,
};

fn engine(rules: EngineConfig) -> Engine {
    Engine::new(rules, Arc::new(ScriptGateway)).with_clock(ManualClock::new(5_000))
}

fn duel(engine: &Engine) -> (GameId, PlayerId, PlayerId) {
    let alice = PlayerId::new("alice");
    let bob = PlayerId::new("bob");
    let view = engine
        .create_game(&alice, Opponent::Human(bob.clone()))
        .unwrap();
    assert_eq!(view.player2, SeatView::Human(bob.clone()));
    (view.id, alice, bob)
}

fn install(at: Position, projectile: bool) -> Action {
    Action::Install { at, projectile }
}

fn tower_at(engine: &Engine, game: GameId, at: Position) -> TowerId {
    engine.board(game).unwrap().tower_at(at).unwrap().id
}

#[test]
fn test_turns_alternate_and_rounds_count() {
    let engine = engine(EngineConfig::default());
    let (game, alice, bob) = duel(&engine);

    let err = engine
        .submit_action(game, &bob, install(Position::new(10, 2), false))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfTurn);

    let view = engine
        .submit_action(game, &alice, install(Position::new(2, 2), true))
        .unwrap();
    assert_eq!(view.action_count, 1);
    let view = engine.submit_action(game, &alice, Action::EndTurn).unwrap();
    assert_eq!(view.turn, Side::Player2);
    assert_eq!(view.phase, Phase::AwaitingPlayer2);
    assert_eq!(view.action_count, 0);
    assert_eq!(view.round_count, 0);
    assert!(engine.last_round(game).unwrap().is_none());

    let err = engine.submit_action(game, &bob, Action::EndTurn).unwrap_err();
    assert_eq!(err, ActionError::EndTurnWithoutAction);

    engine
        .submit_action(game, &bob, install(Position::new(10, 5), false))
        .unwrap();
    let view = engine.submit_action(game, &bob, Action::EndTurn).unwrap();
    assert_eq!(view.turn, Side::Player1);
    assert_eq!(view.round_count, 1);
    assert!(engine.last_round(game).unwrap().is_some());
}

#[test]
fn test_second_action_is_rejected_without_side_effects() {
    let engine = engine(EngineConfig::default());
    let (game, alice, _) = duel(&engine);

    engine
        .submit_action(game, &alice, install(Position::new(2, 2), false))
        .unwrap();
    let before = engine.game(game).unwrap();
    let err = engine
        .submit_action(game, &alice, install(Position::new(3, 3), false))
        .unwrap_err();
    assert_eq!(err, ActionError::ActionBudgetExceeded { budget: 1 });
    assert_eq!(engine.game(game).unwrap(), before);
    assert!(engine.board(game).unwrap().tower_at(Position::new(3, 3)).is_none());
}

#[test]
fn test_oversized_logic_keeps_previous_handle() {
    let mut rules = EngineConfig::default();
    rules.logic.size_limit = 32;
    let engine = engine(rules);
    let (game, alice, bob) = duel(&engine);

    engine
        .submit_action(game, &alice, install(Position::new(2, 2), true))
        .unwrap();
    engine.submit_action(game, &alice, Action::EndTurn).unwrap();
    engine
        .submit_action(game, &bob, install(Position::new(10, 5), false))
        .unwrap();
    engine.submit_action(game, &bob, Action::EndTurn).unwrap();

    let tower = tower_at(&engine, game, Position::new(2, 2));
    let before = engine.logic_size(game, tower).unwrap();
    assert!(before.is_some());

    let long = format!("x = x + 1{}", " + t - t".repeat(12));
    let err = engine
        .submit_action(game, &alice, Action::ModifyLogic { tower, source: long })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SizeLimitExceeded);
    assert_eq!(engine.logic_size(game, tower).unwrap(), before);
    assert_eq!(engine.game(game).unwrap().action_count, 0);

    // The rejected submission did not use up the turn.
    let view = engine
        .submit_action(game, &alice, Action::Move { tower, to: Position::new(2, 4) })
        .unwrap();
    assert_eq!(view.action_count, 1);
    engine.submit_action(game, &alice, Action::EndTurn).unwrap();
    engine
        .submit_action(game, &bob, install(Position::new(11, 1), false))
        .unwrap();
    let view = engine.submit_action(game, &bob, Action::EndTurn).unwrap();
    assert_eq!(view.round_count, 2);

    // The tower still fires its previous logic: one column forward per tick.
    let round = engine.last_round(game).unwrap().unwrap();
    let traj = &round.trajectories[&tower];
    assert!(traj.is_valid());
    assert_eq!(traj.origin, Position::new(2, 4));
    assert_eq!(traj.at(1), Some(Position::new(3, 4)));
    assert_eq!(traj.at(5), Some(Position::new(7, 4)));
}

#[test]
fn test_compile_errors_are_reported() {
    let engine = engine(EngineConfig::default());
    let (game, alice, _) = duel(&engine);
    engine
        .submit_action(game, &alice, install(Position::new(2, 2), true))
        .unwrap();
    engine.submit_action(game, &alice, Action::EndTurn).unwrap();

    // Player 2 cannot reprogram player 1's tower.
    let bob = PlayerId::new("bob");
    let tower = tower_at(&engine, game, Position::new(2, 2));
    let err = engine
        .submit_action(
            game,
            &bob,
            Action::ModifyLogic { tower, source: "x = x + 1".into() },
        )
        .unwrap_err();
    assert_eq!(err, ActionError::NoActiveTower { tower, side: Side::Player2 });

    engine
        .submit_action(game, &bob, install(Position::new(11, 1), true))
        .unwrap();
    engine.submit_action(game, &bob, Action::EndTurn).unwrap();
    let err = engine
        .submit_action(
            game,
            &alice,
            Action::ModifyLogic { tower, source: "x = ".into() },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CompileFailure);
}

#[test]
fn test_strangers_and_unknown_games() {
    let engine = engine(EngineConfig::default());
    let (game, _, _) = duel(&engine);
    let carol = PlayerId::new("carol");
    let err = engine.submit_action(game, &carol, Action::EndTurn).unwrap_err();
    assert_eq!(err, ActionError::NotAParticipant { player: carol.clone(), game });
    let err = engine
        .submit_action(GameId(999), &carol, Action::EndTurn)
        .unwrap_err();
    assert_eq!(err, ActionError::UnknownGame(GameId(999)));
}

#[test]
fn test_round_cap_ends_game_for_defender() {
    let mut rules = EngineConfig::default();
    rules.turns.max_rounds = 1;
    let engine = engine(rules);
    let alice = PlayerId::new("alice");
    let game = engine.create_game(&alice, Opponent::Ladder).unwrap().id;

    engine
        .submit_action(game, &alice, install(Position::new(2, 0), false))
        .unwrap();
    let view = engine.submit_action(game, &alice, Action::EndTurn).unwrap();
    assert_eq!(view.phase, Phase::Ended);
    assert_eq!(view.winner, Some(Side::Player2));
    assert_eq!(view.round_count, 1);
    assert_eq!(view.end_timestamp, 5_000);

    let err = engine
        .submit_action(game, &alice, install(Position::new(3, 0), false))
        .unwrap_err();
    assert_eq!(err, ActionError::GameEnded(game));
    assert_eq!(engine.current_game(&alice).unwrap(), None);
    assert!(engine.create_game(&alice, Opponent::Ladder).is_ok());
}

#[test]
fn test_overrun_rejects_end_turn() {
    let mut rules = EngineConfig::default();
    rules.simulation.round_fuel_cap = 1;
    let engine = engine(rules);
    let (game, alice, bob) = duel(&engine);

    engine
        .submit_action(game, &alice, install(Position::new(2, 2), true))
        .unwrap();
    engine.submit_action(game, &alice, Action::EndTurn).unwrap();
    engine
        .submit_action(game, &bob, install(Position::new(10, 5), false))
        .unwrap();
    let before = engine.game(game).unwrap();
    let err = engine.submit_action(game, &bob, Action::EndTurn).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RoundResolutionOverrun);
    assert_eq!(engine.game(game).unwrap(), before);
}

#[test]
fn test_every_turn_schedule_resolves_after_player1() {
    let mut rules = EngineConfig::default();
    rules.turns.resolution = ResolutionSchedule::EveryTurn;
    let engine = engine(rules);
    let (game, alice, _) = duel(&engine);

    engine
        .submit_action(game, &alice, install(Position::new(1, 3), true))
        .unwrap();
    let view = engine.submit_action(game, &alice, Action::EndTurn).unwrap();
    let round = engine.last_round(game).unwrap().unwrap();
    assert_eq!(round.damage.len(), 1);
    assert_eq!(view.round_count, 0);
    let castle = view.board.castle(Side::Player2);
    assert_eq!(castle.health, castle.max_health - 1);
}

#[test]
fn test_concurrent_games_do_not_interfere() {
    let engine = Arc::new(engine(EngineConfig::default()));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let player = PlayerId::new(format!("player-{i}"));
                let game = engine.create_game(&player, Opponent::Ladder).unwrap().id;
                engine
                    .submit_action(game, &player, install(Position::new(2, 2), true))
                    .unwrap();
                engine.submit_action(game, &player, Action::EndTurn).unwrap()
            })
        })
        .collect();

    let mut ids: Vec<_> = handles
        .into_iter()
        .map(|h| {
            let view = h.join().unwrap();
            assert_eq!(view.round_count, 1);
            assert_eq!(view.turn, Side::Player1);
            view.id
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}
