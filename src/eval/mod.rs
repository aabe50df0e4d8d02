//! Static evaluation: material plus piece-square tables, tapered by the
//! amount of non-pawn material left on the board.
//!
//! The search treats this module as a black box returning a centipawn score
//! from the side to move's point of view.

pub mod pst;

use chess::{Board, Color, ALL_COLORS, ALL_PIECES};

use crate::defs::VALUE_TB_WIN_IN_MAX_PLY;

const MG_MATERIAL: [i32; 6] = [82, 337, 365, 477, 1025, 0];
const EG_MATERIAL: [i32; 6] = [94, 281, 297, 512, 936, 0];

const PHASE_WEIGHT: [i32; 6] = [0, 1, 1, 2, 4, 0];
const PHASE_MAX: i32 = 24;

const TEMPO: i32 = 10;

/// Game phase on a 0..=24 scale, 24 meaning all non-pawn material is still
/// present.
fn phase(board: &Board) -> i32 {
    let mut total = 0;
    for piece in ALL_PIECES {
        total += PHASE_WEIGHT[piece.to_index()] * (board.pieces(piece).popcnt() as i32);
    }
    total.min(PHASE_MAX)
}

/// Evaluate `board` from the side to move's perspective.
pub fn evaluate(board: &Board) -> i32 {
    let phase = phase(board);
    let mut score = 0;

    for color in ALL_COLORS {
        let sign = if color == Color::White { 1 } else { -1 };
        let own = *board.color_combined(color);

        for piece in ALL_PIECES {
            let idx = piece.to_index();
            let material =
                (MG_MATERIAL[idx] * phase + EG_MATERIAL[idx] * (PHASE_MAX - phase)) / PHASE_MAX;

            for square in *board.pieces(piece) & own {
                score += sign * (material + pst::bonus(piece, square, color, phase));
            }
        }
    }

    let mut result = match board.side_to_move() {
        Color::White => score,
        Color::Black => -score,
    };
    result += TEMPO;

    result.clamp(-VALUE_TB_WIN_IN_MAX_PLY + 1, VALUE_TB_WIN_IN_MAX_PLY - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn startpos_is_roughly_balanced() {
        let board = Board::default();
        let score = evaluate(&board);
        assert!(score.abs() < 50, "startpos eval {score}");
    }

    #[test]
    fn perspective_flips_with_side_to_move() {
        // Same structure, opposite side to move. Tempo shifts both the same
        // way, so the sum of the two views is exactly twice the tempo bonus.
        let white = Board::from_str("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        let black = Board::from_str("4k3/8/8/8/8/8/8/R3K3 b - - 0 1").unwrap();
        assert_eq!(evaluate(&white) + evaluate(&black), 2 * TEMPO);
    }

    #[test]
    fn material_advantage_shows_up() {
        let board = Board::from_str("4k3/8/8/8/8/8/8/Q3K3 w - - 0 1").unwrap();
        assert!(evaluate(&board) > 700);
    }
}
