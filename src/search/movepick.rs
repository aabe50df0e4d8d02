//! Staged move picker.
//!
//! Yields moves one at a time in the order the search wants to try them:
//! the hash move first, then winning captures, killers and the counter move,
//! quiet moves by history score, and finally the losing captures. Generating
//! and scoring lazily per stage means a node that cuts off on the hash move
//! never pays for scoring the rest.

use chess::{BitBoard, Board, ChessMove, MoveGen, Piece, EMPTY};

use crate::defs::ORDER_VALUES;
use crate::search::history::{piece_key, Histories, PieceTo};
use crate::search::see::see;

const MAX_MOVES: usize = 256;

/// Flat move/score arrays with in-place selection picking, so each call pulls
/// out the best remaining move without a full sort.
struct MoveList {
    moves: [ChessMove; MAX_MOVES],
    scores: [i32; MAX_MOVES],
    len: usize,
}

impl MoveList {
    fn new() -> Self {
        Self {
            moves: [ChessMove::default(); MAX_MOVES],
            scores: [0; MAX_MOVES],
            len: 0,
        }
    }

    #[inline]
    fn push(&mut self, m: ChessMove, score: i32) {
        if self.len < MAX_MOVES {
            self.moves[self.len] = m;
            self.scores[self.len] = score;
            self.len += 1;
        }
    }

    /// Swap the best move in `index..` to `index` and return it.
    fn pick(&mut self, index: usize) -> Option<ChessMove> {
        if index >= self.len {
            return None;
        }

        let mut best = index;
        for i in index + 1..self.len {
            if self.scores[i] > self.scores[best] {
                best = i;
            }
        }
        if best != index {
            self.moves.swap(index, best);
            self.scores.swap(index, best);
        }
        Some(self.moves[index])
    }

    /// Return the move at `index` in insertion order.
    fn get(&self, index: usize) -> Option<ChessMove> {
        (index < self.len).then(|| self.moves[index])
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    TtMove,
    GenCaptures,
    GoodCaptures,
    Killer1,
    Killer2,
    Counter,
    GenQuiets,
    Quiets,
    BadCaptures,
    Done,
}

pub struct MovePicker {
    board: Board,
    gen: MoveGen,
    stage: Stage,
    qsearch: bool,

    tt_move: Option<ChessMove>,
    killers: [Option<ChessMove>; 2],
    counter: Option<ChessMove>,
    prev: [Option<PieceTo>; 2],
    /// Root `searchmoves` restriction; empty means unrestricted.
    whitelist: Vec<ChessMove>,

    captures: MoveList,
    bad_captures: MoveList,
    quiets: MoveList,
    capture_idx: usize,
    quiet_idx: usize,
    bad_idx: usize,
}

impl MovePicker {
    /// Picker for the main search.
    pub fn new(
        board: &Board,
        tt_move: Option<ChessMove>,
        killers: [Option<ChessMove>; 2],
        counter: Option<ChessMove>,
        prev: [Option<PieceTo>; 2],
        whitelist: Vec<ChessMove>,
    ) -> Self {
        Self {
            board: *board,
            gen: MoveGen::new_legal(board),
            stage: Stage::TtMove,
            qsearch: false,
            tt_move,
            killers,
            counter,
            prev,
            whitelist,
            captures: MoveList::new(),
            bad_captures: MoveList::new(),
            quiets: MoveList::new(),
            capture_idx: 0,
            quiet_idx: 0,
            bad_idx: 0,
        }
    }

    /// Picker for quiescence: the hash move when it is tactical, then
    /// captures only.
    pub fn new_qsearch(board: &Board, tt_move: Option<ChessMove>) -> Self {
        let tt_move = tt_move.filter(|&m| {
            board.legal(m) && (is_capture(board, m) || gives_check(board, m))
        });

        Self {
            board: *board,
            gen: MoveGen::new_legal(board),
            stage: Stage::TtMove,
            qsearch: true,
            tt_move,
            killers: [None; 2],
            counter: None,
            prev: [None; 2],
            whitelist: Vec::new(),
            captures: MoveList::new(),
            bad_captures: MoveList::new(),
            quiets: MoveList::new(),
            capture_idx: 0,
            quiet_idx: 0,
            bad_idx: 0,
        }
    }

    #[inline]
    fn allowed(&self, m: ChessMove) -> bool {
        self.whitelist.is_empty() || self.whitelist.contains(&m)
    }

    fn capture_score(&self, m: ChessMove) -> i32 {
        let victim = if is_en_passant(&self.board, m) {
            Piece::Pawn
        } else {
            self.board.piece_on(m.get_dest()).unwrap_or(Piece::Pawn)
        };
        let attacker = self.board.piece_on(m.get_source()).unwrap_or(Piece::Pawn);

        ORDER_VALUES[victim.to_index()] * 1000
            + (ORDER_VALUES[Piece::King.to_index()] - ORDER_VALUES[attacker.to_index()])
    }

    fn gen_captures(&mut self) {
        let mut targets = *self.board.color_combined(!self.board.side_to_move());
        if let Some(ep) = self.board.en_passant() {
            if let Some(dest) = ep.backward(!self.board.side_to_move()) {
                targets |= BitBoard::from_square(dest);
            }
        }

        self.gen.set_iterator_mask(targets);
        while let Some(m) = self.gen.next() {
            if !self.allowed(m) {
                continue;
            }
            let score = self.capture_score(m);
            if self.qsearch || see(&self.board, m, 0) {
                self.captures.push(m, score);
            } else {
                self.bad_captures.push(m, score);
            }
        }
    }

    fn gen_quiets(&mut self, hist: &Histories) {
        let stm = self.board.side_to_move();
        self.gen.set_iterator_mask(!EMPTY);
        while let Some(m) = self.gen.next() {
            if !self.allowed(m) {
                continue;
            }
            let piece = self
                .board
                .piece_on(m.get_source())
                .map_or(0, |p| piece_key(stm, p));
            self.quiets.push(m, hist.quiet_score(stm, m, piece, &self.prev));
        }
    }

    /// A quiet move usable as a killer or counter at this node: legal, not a
    /// capture and not already tried via the hash move.
    fn viable_quiet_hint(&self, m: ChessMove) -> bool {
        Some(m) != self.tt_move
            && self.allowed(m)
            && self.board.legal(m)
            && !is_capture(&self.board, m)
    }

    pub fn next(&mut self, hist: &Histories) -> Option<ChessMove> {
        loop {
            match self.stage {
                Stage::TtMove => {
                    self.stage = Stage::GenCaptures;
                    if let Some(m) = self.tt_move {
                        if self.allowed(m) && self.board.legal(m) {
                            return Some(m);
                        }
                    }
                }

                Stage::GenCaptures => {
                    self.gen_captures();
                    self.stage = Stage::GoodCaptures;
                }

                Stage::GoodCaptures => {
                    while let Some(m) = self.captures.pick(self.capture_idx) {
                        self.capture_idx += 1;
                        if Some(m) != self.tt_move {
                            return Some(m);
                        }
                    }
                    self.stage = if self.qsearch { Stage::Done } else { Stage::Killer1 };
                }

                Stage::Killer1 => {
                    self.stage = Stage::Killer2;
                    if let Some(m) = self.killers[0] {
                        if self.viable_quiet_hint(m) {
                            return Some(m);
                        }
                    }
                }

                Stage::Killer2 => {
                    self.stage = Stage::Counter;
                    if let Some(m) = self.killers[1] {
                        if self.killers[0] != Some(m) && self.viable_quiet_hint(m) {
                            return Some(m);
                        }
                    }
                }

                Stage::Counter => {
                    self.stage = Stage::GenQuiets;
                    if let Some(m) = self.counter {
                        if !self.killers.contains(&Some(m)) && self.viable_quiet_hint(m) {
                            return Some(m);
                        }
                    }
                }

                Stage::GenQuiets => {
                    self.gen_quiets(hist);
                    self.stage = Stage::Quiets;
                }

                Stage::Quiets => {
                    while let Some(m) = self.quiets.pick(self.quiet_idx) {
                        self.quiet_idx += 1;
                        let seen = Some(m) == self.tt_move
                            || self.killers.contains(&Some(m))
                            || self.counter == Some(m);
                        if !seen {
                            return Some(m);
                        }
                    }
                    self.stage = Stage::BadCaptures;
                }

                Stage::BadCaptures => {
                    while let Some(m) = self.bad_captures.get(self.bad_idx) {
                        self.bad_idx += 1;
                        if Some(m) != self.tt_move {
                            return Some(m);
                        }
                    }
                    self.stage = Stage::Done;
                }

                Stage::Done => return None,
            }
        }
    }
}

/// Captures include en passant, whose destination square is empty.
#[inline]
pub fn is_capture(board: &Board, m: ChessMove) -> bool {
    board.piece_on(m.get_dest()).is_some() || is_en_passant(board, m)
}

#[inline]
pub fn is_en_passant(board: &Board, m: ChessMove) -> bool {
    board.piece_on(m.get_source()) == Some(Piece::Pawn)
        && board.piece_on(m.get_dest()).is_none()
        && m.get_source().get_file() != m.get_dest().get_file()
}

fn gives_check(board: &Board, m: ChessMove) -> bool {
    *board.make_move_new(m).checkers() != EMPTY
}

/// Dedicated helper for the killer/counter validity checks in the picker and
/// for qsearch's delta pruning margin.
pub fn captured_piece(board: &Board, m: ChessMove) -> Option<Piece> {
    if is_en_passant(board, m) {
        Some(Piece::Pawn)
    } else {
        board.piece_on(m.get_dest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn drain(mut picker: MovePicker) -> Vec<ChessMove> {
        let hist = Histories::default();
        let mut out = Vec::new();
        while let Some(m) = picker.next(&hist) {
            out.push(m);
        }
        out
    }

    #[test]
    fn yields_every_legal_move_exactly_once() {
        let board =
            Board::from_str("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
                .unwrap();
        let tt_move = Some(ChessMove::from_str("e2a6").unwrap());
        let killer = Some(ChessMove::from_str("a2a4").unwrap());

        let picker = MovePicker::new(&board, tt_move, [killer, None], None, [None; 2], Vec::new());
        let mut yielded = drain(picker);

        let mut all: Vec<ChessMove> = MoveGen::new_legal(&board).collect();
        all.sort_by_key(|m| (m.get_source().to_index(), m.get_dest().to_index()));
        yielded.sort_by_key(|m| (m.get_source().to_index(), m.get_dest().to_index()));
        assert_eq!(yielded, all);
    }

    #[test]
    fn tt_move_comes_first_and_captures_before_quiets() {
        let board =
            Board::from_str("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2")
                .unwrap();
        let tt_move = ChessMove::from_str("b1c3").unwrap();

        let mut picker =
            MovePicker::new(&board, Some(tt_move), [None; 2], None, [None; 2], Vec::new());
        let hist = Histories::default();

        assert_eq!(picker.next(&hist), Some(tt_move));
        // exd5 is the only capture and must come before every quiet move.
        assert_eq!(picker.next(&hist), Some(ChessMove::from_str("e4d5").unwrap()));
    }

    #[test]
    fn whitelist_restricts_the_root() {
        let board = Board::default();
        let only = ChessMove::from_str("d2d4").unwrap();
        let picker = MovePicker::new(&board, None, [None; 2], None, [None; 2], vec![only]);
        assert_eq!(drain(picker), vec![only]);
    }

    #[test]
    fn qsearch_yields_captures_only() {
        let board =
            Board::from_str("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2")
                .unwrap();
        let picker = MovePicker::new_qsearch(&board, None);
        assert_eq!(drain(picker), vec![ChessMove::from_str("e4d5").unwrap()]);
    }
}
