//! Static exchange evaluation.
//!
//! Resolves the capture sequence on a single square without searching, by
//! swapping off attackers from least to most valuable. Used to prune losing
//! captures and to split the move picker's capture list into winning and
//! losing halves.

use chess::{
    get_bishop_moves, get_king_moves, get_knight_moves, get_pawn_attacks, get_rook_moves,
    BitBoard, Board, ChessMove, Color, Piece, Square, EMPTY,
};

use crate::defs::SEE_VALUES;

/// Every piece of either color attacking `sq` on the occupancy `occ`.
pub fn all_attackers(board: &Board, sq: Square, occ: BitBoard) -> BitBoard {
    let white = *board.color_combined(Color::White);
    let black = *board.color_combined(Color::Black);
    let pawns = *board.pieces(Piece::Pawn);
    let diag = *board.pieces(Piece::Bishop) | *board.pieces(Piece::Queen);
    let line = *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);

    // A white pawn attacks sq from exactly the squares a black pawn standing
    // on sq would attack, and vice versa.
    get_pawn_attacks(sq, Color::Black, pawns & white)
        | get_pawn_attacks(sq, Color::White, pawns & black)
        | (get_knight_moves(sq) & *board.pieces(Piece::Knight))
        | (get_king_moves(sq) & *board.pieces(Piece::King))
        | (get_bishop_moves(sq, occ) & diag)
        | (get_rook_moves(sq, occ) & line)
}

#[inline]
fn value_on(board: &Board, sq: Square) -> i32 {
    board
        .piece_on(sq)
        .map_or(0, |p| SEE_VALUES[p.to_index()])
}

/// Does the exchange starting with `m` win at least `threshold` centipawns
/// for the moving side?
///
/// Quiet moves have a victim value of zero, so `see(b, quiet, 0)` asks
/// whether the moved piece survives on its destination square. En passant
/// destinations are empty; the victim is counted as a pawn.
pub fn see(board: &Board, m: ChessMove, threshold: i32) -> bool {
    let from = m.get_source();
    let to = m.get_dest();
    let stm = board.side_to_move();

    let attacker = match board.piece_on(from) {
        Some(p) => p,
        None => return true,
    };

    let en_passant = attacker == Piece::Pawn
        && board.piece_on(to).is_none()
        && from.get_file() != to.get_file();
    let victim_value = if en_passant { SEE_VALUES[Piece::Pawn.to_index()] } else { value_on(board, to) };

    let mut balance = victim_value - threshold;
    if balance < 0 {
        return false;
    }
    balance -= SEE_VALUES[attacker.to_index()];
    if balance >= 0 {
        return true;
    }

    let diag = *board.pieces(Piece::Bishop) | *board.pieces(Piece::Queen);
    let line = *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);

    let mut occ =
        (*board.combined() ^ BitBoard::from_square(from)) | BitBoard::from_square(to);
    let mut attackers = all_attackers(board, to, occ) & occ;
    let mut side = !stm;

    loop {
        attackers &= occ;
        let mine = attackers & *board.color_combined(side);
        if mine == EMPTY {
            break;
        }

        // Least valuable attacker still on the board.
        let mut piece = Piece::King;
        let mut piece_bb = EMPTY;
        for p in [Piece::Pawn, Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen, Piece::King] {
            let bb = mine & *board.pieces(p);
            if bb != EMPTY {
                piece = p;
                piece_bb = bb;
                break;
            }
        }

        side = !side;
        balance = -balance - 1 - SEE_VALUES[piece.to_index()];

        if balance >= 0 {
            // A king "capture" only stands if the opponent has run out of
            // attackers; otherwise the exchange ends one step earlier.
            if piece == Piece::King && attackers & *board.color_combined(side) != EMPTY {
                side = !side;
            }
            break;
        }

        occ ^= BitBoard::from_square(piece_bb.to_square());

        // Removing an attacker can uncover a slider behind it.
        if matches!(piece, Piece::Pawn | Piece::Bishop | Piece::Queen) {
            attackers |= get_bishop_moves(to, occ) & diag;
        }
        if matches!(piece, Piece::Rook | Piece::Queen) {
            attackers |= get_rook_moves(to, occ) & line;
        }
    }

    side != stm
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn mv(text: &str) -> ChessMove {
        ChessMove::from_str(text).unwrap()
    }

    #[test]
    fn free_pawn_is_a_clean_win() {
        let board = Board::from_str("k7/8/8/3p4/8/8/B7/K7 w - - 0 1").unwrap();
        assert!(see(&board, mv("a2d5"), 0));
        assert!(see(&board, mv("a2d5"), 100));
        assert!(!see(&board, mv("a2d5"), 101));
    }

    #[test]
    fn defended_pawn_loses_the_bishop() {
        let board = Board::from_str("k7/8/4p3/3p4/8/8/B7/K7 w - - 0 1").unwrap();
        // Bxd5 exd5 nets pawn minus bishop.
        assert!(!see(&board, mv("a2d5"), 0));
        assert!(see(&board, mv("a2d5"), -200));
        assert!(!see(&board, mv("a2d5"), -199));
    }

    #[test]
    fn quiet_move_onto_an_attacked_square_fails() {
        let board = Board::from_str("k7/8/8/2p5/8/8/1R6/K7 w - - 0 1").unwrap();
        // b4 hangs the rook to the c5 pawn, b3 is safe.
        assert!(!see(&board, mv("b2b4"), 0));
        assert!(see(&board, mv("b2b3"), 0));
    }

    #[test]
    fn xray_recaptures_are_seen() {
        // Three white rooks stacked on the d-file against two black ones;
        // each capture uncovers the next attacker behind it.
        let board = Board::from_str("1k1r4/3r4/8/3p4/8/3R4/3R4/K2R4 w - - 0 1").unwrap();
        // RxP RxR RxR RxR RxR leaves White up exactly one pawn.
        assert!(see(&board, mv("d3d5"), 0));
        assert!(see(&board, mv("d3d5"), 100));
        assert!(!see(&board, mv("d3d5"), 101));
    }

    #[test]
    fn king_recapture_depends_on_protection() {
        // With the b3 bishop eyeing f7 the king cannot take the queen back.
        let protected = Board::from_str("5k2/5p2/8/8/8/1B6/5Q2/K7 w - - 0 1").unwrap();
        assert!(see(&protected, mv("f2f7"), 0));

        // Without it, Qxf7 Kxf7 just loses the queen.
        let bare = Board::from_str("5k2/5p2/8/8/8/8/5Q2/K7 w - - 0 1").unwrap();
        assert!(!see(&bare, mv("f2f7"), 0));
    }
}
