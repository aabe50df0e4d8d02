//! Syzygy endgame tablebase collaborator.
//!
//! Wraps shakmaty-syzygy behind the two narrow probes the search needs: a
//! WDL probe inside the tree and a DTZ-ranked best move at the root.
//! Positions are converted from `chess::Board` through FEN, which only
//! happens at low piece counts.

use std::path::Path;
use std::str::FromStr;

use chess::{Board, ChessMove};
use shakmaty::fen::Fen;
use shakmaty::CastlingMode;
use shakmaty_syzygy::{Tablebase, Wdl};

/// Win/draw/loss from the side to move's point of view. Cursed wins and
/// blessed losses are draws under the 50-move rule and are reported as such.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TbWdl {
    Win,
    Draw,
    Loss,
}

pub struct SyzygyTb {
    tb: Tablebase<shakmaty::Chess>,
    max_pieces: usize,
}

impl SyzygyTb {
    /// Load every table found under `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut tb = Tablebase::new();
        let count = tb.add_directory(path.as_ref())?;
        anyhow::ensure!(count > 0, "no syzygy tables under {}", path.as_ref().display());
        let max_pieces = tb.max_pieces();
        Ok(Self { tb, max_pieces })
    }

    #[inline]
    pub fn can_probe(&self, board: &Board) -> bool {
        (board.combined().popcnt() as usize) <= self.max_pieces
    }

    fn to_shakmaty(board: &Board) -> Option<shakmaty::Chess> {
        let fen: Fen = format!("{board}").parse().ok()?;
        fen.into_position(CastlingMode::Standard).ok()
    }

    /// WDL for the side to move, or `None` when the position is not covered.
    pub fn probe_wdl(&self, board: &Board) -> Option<TbWdl> {
        if !self.can_probe(board) {
            return None;
        }
        let pos = Self::to_shakmaty(board)?;
        match self.tb.probe_wdl_after_zeroing(&pos).ok()? {
            Wdl::Win => Some(TbWdl::Win),
            Wdl::Loss => Some(TbWdl::Loss),
            Wdl::Draw | Wdl::CursedWin | Wdl::BlessedLoss => Some(TbWdl::Draw),
        }
    }

    /// DTZ-optimal root move, converted back into the `chess` move type.
    /// Returns `None` when the position is not covered or conversion fails.
    pub fn probe_dtz_move(&self, board: &Board) -> Option<ChessMove> {
        if !self.can_probe(board) {
            return None;
        }
        let pos = Self::to_shakmaty(board)?;
        let (best, _dtz) = self.tb.best_move(&pos).ok()??;

        let uci = best.to_uci(CastlingMode::Standard).to_string();
        let m = ChessMove::from_str(&uci).ok()?;
        board.legal(m).then_some(m)
    }
}
