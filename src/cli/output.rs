//! Output formatting utilities for CLI.

use super::script::GameSummary;
use rampart::engine::SeatView;
use rampart::ledger::LeaderboardEntry;
use rampart::{Board, Position, Side};
use std::fmt::Write;

/// Render the board as text, one row per line.
///
/// `A`/`B` are the castles of player 1 and 2. Towers are `T` (offensive)
/// and `D` (defensive), lowercase for player 2.
pub(super) fn render_board(board: &Board) -> String {
    let mut out = String::new();
    for y in 0..board.height() {
        for x in 0..board.width() {
            let pos = Position::new(x, y);
            let castle = board.castles().iter().find(|c| c.position == pos);
            let c = match (castle, board.tower_at(pos)) {
                (Some(c), _) if c.side == Side::Player1 => 'A',
                (Some(_), _) => 'B',
                (None, Some(t)) => match (t.owner, t.projectile) {
                    (Side::Player1, true) => 'T',
                    (Side::Player1, false) => 'D',
                    (Side::Player2, true) => 't',
                    (Side::Player2, false) => 'd',
                },
                (None, None) if x == board.width() / 2 => '|',
                (None, None) => '.',
            };
            out.push(c);
        }
        out.push('\n');
    }
    out
}

/// Format a game summary as human-readable text.
pub(super) fn format_summary(summary: &GameSummary) -> String {
    let mut out = String::new();
    let opponent = match &summary.opponent {
        SeatView::Human(p) => p.to_string(),
        SeatView::Ghost(Some(saved)) => format!("ghost of {saved}"),
        SeatView::Ghost(None) => "empty ghost".to_string(),
    };
    let _ = writeln!(out, "{} (level {}) vs {opponent}", summary.player, summary.level);
    match summary.winner {
        Some(Side::Player1) => out.push_str("  Result:  challenger won\n"),
        Some(Side::Player2) => out.push_str("  Result:  defender won\n"),
        None => out.push_str("  Result:  unfinished (script ran out)\n"),
    }
    let _ = writeln!(out, "  Rounds:  {}", summary.rounds);
    let _ = writeln!(
        out,
        "  Castles: {} / {}",
        summary.castles[0], summary.castles[1]
    );
    let _ = writeln!(out, "  Streak:  {}", summary.streak);
    for reason in &summary.rejected {
        let _ = writeln!(out, "  rejected {reason}");
    }
    out
}

/// Format the leaderboard as a table.
pub(super) fn format_leaderboard(entries: &[LeaderboardEntry]) -> String {
    if entries.is_empty() {
        return "No champions yet.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:>5}  {:>6}  {:<24}  GAME", "LEVEL", "STREAK", "PLAYER");
    for entry in entries {
        let name = entry
            .username
            .clone()
            .unwrap_or_else(|| entry.player.to_string());
        let _ = writeln!(
            out,
            "{:>5}  {:>6}  {:<24}  {}",
            entry.level, entry.streak, name, entry.saved
        );
    }
    out
}
