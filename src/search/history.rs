//! Per-worker move-ordering statistics: butterfly history, continuation
//! history, killer moves and counter moves.
//!
//! All history counters use the gravity update `h += bonus - h*|bonus|/16384`,
//! which pulls values back towards zero as they grow and keeps them inside
//! ±16384 without explicit clamping.

use chess::{Board, ChessMove, Color, Piece, Square};

use crate::defs::MAX_PLY;

/// Upper bound the gravity update converges to.
pub const HISTORY_CAP: i32 = 16384;

/// Number of (color, piece) combinations used to index continuation history.
pub const PIECE_KEYS: usize = 12;

/// A (piece, destination) pair describing a move that was just played, as
/// seen by the continuation history of later plies.
pub type PieceTo = (usize, Square);

/// Index for the continuation history: side to move times piece kind.
#[inline]
pub fn piece_key(color: Color, piece: Piece) -> usize {
    color.to_index() * 6 + piece.to_index()
}

type ContTable = [[[[i16; 64]; PIECE_KEYS]; 64]; PIECE_KEYS];

/// Allocate a zeroed continuation table directly on the heap. The table is
/// over a megabyte, so going through `Box::new` would copy it across the
/// stack.
fn zeroed_cont() -> Box<ContTable> {
    // SAFETY: ContTable is a nested array of i16, for which all-zero bytes
    // are a valid (and the intended) value.
    unsafe {
        let layout = std::alloc::Layout::new::<ContTable>();
        let ptr = std::alloc::alloc_zeroed(layout) as *mut ContTable;
        if ptr.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        Box::from_raw(ptr)
    }
}

pub struct Histories {
    /// Butterfly table, indexed by side to move, from and to square.
    butterfly: Box<[[[i16; 64]; 64]; 2]>,
    /// Continuation history, indexed by a previous move's (piece, to) and the
    /// current move's (piece, to).
    cont: Box<ContTable>,
    /// Refutation of the move that arrived on (from, to) one ply earlier.
    counters: Box<[[Option<ChessMove>; 64]; 64]>,
    /// Two killer slots per ply.
    pub killers: [[Option<ChessMove>; MAX_PLY]; 2],
}

impl Default for Histories {
    fn default() -> Self {
        Self {
            butterfly: Box::new([[[0; 64]; 64]; 2]),
            cont: zeroed_cont(),
            counters: Box::new([[None; 64]; 64]),
            killers: [[None; MAX_PLY]; 2],
        }
    }
}

#[inline]
fn gravity(slot: &mut i16, bonus: i32) {
    let value = *slot as i32;
    *slot = (value + bonus - value * bonus.abs() / HISTORY_CAP) as i16;
}

fn butterfly_bonus(depth: i32) -> i32 {
    (155 * depth).min(2000)
}

fn cont_bonus(depth: i32) -> i32 {
    (4 * depth * depth * depth).min(1500)
}

impl Histories {
    pub fn butterfly(&self, stm: Color, m: ChessMove) -> i32 {
        self.butterfly[stm.to_index()][m.get_source().to_index()][m.get_dest().to_index()] as i32
    }

    pub fn continuation(&self, prev: PieceTo, piece: usize, to: Square) -> i32 {
        self.cont[prev.0][prev.1.to_index()][piece][to.to_index()] as i32
    }

    pub fn counter(&self, from: Square, to: Square) -> Option<ChessMove> {
        self.counters[from.to_index()][to.to_index()]
    }

    /// Combined quiet-move ordering score: butterfly plus the continuation
    /// entries for the previous one and two plies.
    pub fn quiet_score(
        &self,
        stm: Color,
        m: ChessMove,
        piece: usize,
        prev: &[Option<PieceTo>; 2],
    ) -> i32 {
        let mut score = self.butterfly(stm, m);
        for p in prev.iter().flatten() {
            score += self.continuation(*p, piece, m.get_dest());
        }
        score
    }

    fn bump_butterfly(&mut self, stm: Color, m: ChessMove, bonus: i32) {
        gravity(
            &mut self.butterfly[stm.to_index()][m.get_source().to_index()][m.get_dest().to_index()],
            bonus,
        );
    }

    fn bump_continuation(&mut self, prev: PieceTo, piece: usize, to: Square, bonus: i32) {
        gravity(
            &mut self.cont[prev.0][prev.1.to_index()][piece][to.to_index()],
            bonus,
        );
    }

    /// Update every table after a beta cutoff at `ply`.
    ///
    /// `best` is the cutoff move, `quiets` the quiet moves searched before it
    /// (the losers), `prev` the (piece, to) pairs played one and two plies
    /// up, and `counter_key` the from/to of the opponent's previous move.
    pub fn update(
        &mut self,
        board: &Board,
        best: ChessMove,
        depth: i32,
        ply: usize,
        quiets: &[ChessMove],
        prev: &[Option<PieceTo>; 2],
        counter_key: Option<(Square, Square)>,
    ) {
        if let Some((from, to)) = counter_key {
            self.counters[from.to_index()][to.to_index()] = Some(best);
        }

        // Captures refute themselves; only quiet cutoffs train the tables.
        if board.piece_on(best.get_dest()).is_some() {
            return;
        }

        self.killers[1][ply] = self.killers[0][ply];
        self.killers[0][ply] = Some(best);

        let stm = board.side_to_move();
        let bonus = butterfly_bonus(depth);
        if depth > 1 {
            self.bump_butterfly(stm, best, bonus);
        }
        for &q in quiets {
            self.bump_butterfly(stm, q, -bonus);
        }

        let bonus = cont_bonus(depth);
        let key_of = |m: ChessMove| {
            board
                .piece_on(m.get_source())
                .map(|p| piece_key(stm, p))
                .unwrap_or(0)
        };

        for p in prev.iter().flatten() {
            self.bump_continuation(*p, key_of(best), best.get_dest(), bonus);
            for &q in quiets {
                self.bump_continuation(*p, key_of(q), q.get_dest(), -bonus);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn gravity_stays_bounded() {
        let mut slot = 0i16;
        for _ in 0..1000 {
            gravity(&mut slot, 2000);
            assert!((slot as i32).abs() <= HISTORY_CAP);
        }
        for _ in 0..1000 {
            gravity(&mut slot, -2000);
            assert!((slot as i32).abs() <= HISTORY_CAP);
        }
    }

    #[test]
    fn cutoff_promotes_the_best_move() {
        let board = Board::default();
        let mut hist = Histories::default();
        let best = ChessMove::from_str("g1f3").unwrap();
        let loser = ChessMove::from_str("b1a3").unwrap();

        hist.update(&board, best, 6, 0, &[loser], &[None, None], None);

        assert!(hist.butterfly(Color::White, best) > 0);
        assert!(hist.butterfly(Color::White, loser) < 0);
        assert_eq!(hist.killers[0][0], Some(best));
    }

    #[test]
    fn capture_cutoff_leaves_quiet_tables_alone() {
        let board =
            Board::from_str("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2")
                .unwrap();
        let mut hist = Histories::default();
        let capture = ChessMove::from_str("e4d5").unwrap();

        hist.update(&board, capture, 6, 0, &[], &[None, None], None);

        assert_eq!(hist.killers[0][0], None);
        assert_eq!(hist.butterfly(Color::White, capture), 0);
    }
}
