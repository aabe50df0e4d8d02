//! The search: a negamax alpha-beta with iterative deepening, aspiration
//! windows, a shared transposition table and the usual pruning arsenal.
//!
//! One [`Worker`] owns everything a single thread needs: its board copy, the
//! per-ply stack, the history tables and the local node counters. Workers
//! only ever share the transposition table, two atomic counters and the stop
//! flag.

pub mod history;
pub mod lazy_smp;
pub mod movepick;
pub mod see;
pub mod syzygy;
pub mod time;
pub mod tt;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

use chess::{Board, ChessMove, Color, Piece, Square, EMPTY};

use crate::defs::*;
use crate::eval::evaluate;
use history::{piece_key, Histories, PieceTo};
use movepick::{captured_piece, is_capture, MovePicker};
use see::see;
use syzygy::{SyzygyTb, TbWdl};
use time::Time;
use tt::{score_from_tt, score_to_tt, Bound, TranspositionTable};

/// Node kind inside the tree. Root and PV nodes are searched with a full
/// window, everything else with a null window.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Node {
    Root,
    Pv,
    NonPv,
}

/// Search limits as handed over by `go`.
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub depth: i32,
    pub nodes: u64,
    pub time: Time,
    pub infinite: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            depth: MAX_PLY as i32,
            nodes: 0,
            time: Time::default(),
            infinite: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchResult {
    pub best_move: Option<ChessMove>,
    pub score: i32,
}

/// What happened at a ply, as seen by deeper plies.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Played {
    #[default]
    None,
    Null,
    Normal {
        mv: ChessMove,
        piece: usize,
    },
}

impl Played {
    fn piece_to(self) -> Option<PieceTo> {
        match self {
            Played::Normal { mv, piece } => Some((piece, mv.get_dest())),
            _ => None,
        }
    }

    fn from_to(self) -> Option<(Square, Square)> {
        match self {
            Played::Normal { mv, .. } => Some((mv.get_source(), mv.get_dest())),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Default)]
struct Frame {
    eval: i32,
    played: Played,
    excluded: Option<ChessMove>,
}

/// Offset into the stack so that plies -2..=+1 around any node are valid
/// indices. `stack[ply + STACK_OFFSET]` is the frame of `ply`.
const STACK_OFFSET: usize = 2;

pub struct Worker {
    pub id: usize,
    pub board: Board,
    pub limit: Limits,
    pub nodes: u64,

    tt: Arc<TranspositionTable>,
    tb: Option<Arc<SyzygyTb>>,
    stop: Arc<AtomicBool>,
    shared_nodes: Arc<AtomicU64>,
    shared_tbhits: Arc<AtomicU64>,
    printer: Option<Sender<String>>,

    /// Zobrist keys of every game position before the root.
    game_hashes: Arc<Vec<u64>>,
    /// (hash, halfmove clock) of the root and every position on the current
    /// search path.
    path: Vec<(u64, u32)>,
    searchmoves: Vec<ChessMove>,

    history: Histories,
    stack: [Frame; MAX_PLY + 4],
    pv_table: Box<[[ChessMove; MAX_PLY]; MAX_PLY]>,
    pv_len: [usize; MAX_PLY + 1],
    node_effort: Box<[[u64; 64]; 64]>,
    reductions: Box<[[i32; 64]; 64]>,

    reported_nodes: u64,
    tbhits: u64,
    seldepth: usize,
    check_time: i32,
    start: Instant,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        board: Board,
        game_hashes: Arc<Vec<u64>>,
        halfmoves: u32,
        limit: Limits,
        searchmoves: Vec<ChessMove>,
        tt: Arc<TranspositionTable>,
        tb: Option<Arc<SyzygyTb>>,
        stop: Arc<AtomicBool>,
        shared_nodes: Arc<AtomicU64>,
        shared_tbhits: Arc<AtomicU64>,
        history: Histories,
        printer: Option<Sender<String>>,
    ) -> Self {
        let mut reductions = Box::new([[0i32; 64]; 64]);
        for depth in 1..64 {
            for moves in 1..64 {
                reductions[depth][moves] =
                    1 + ((depth as f64).ln() * (moves as f64).ln() / 1.75) as i32;
            }
        }

        Self {
            id,
            path: vec![(board.get_hash(), halfmoves)],
            board,
            limit,
            nodes: 0,
            tt,
            tb,
            stop,
            shared_nodes,
            shared_tbhits,
            printer,
            game_hashes,
            searchmoves,
            history,
            stack: [Frame::default(); MAX_PLY + 4],
            pv_table: Box::new([[ChessMove::default(); MAX_PLY]; MAX_PLY]),
            pv_len: [0; MAX_PLY + 1],
            node_effort: Box::new([[0; 64]; 64]),
            reductions,
            reported_nodes: 0,
            tbhits: 0,
            seldepth: 0,
            check_time: 0,
            start: Instant::now(),
        }
    }

    /// Entry point for a search thread. Consumes the worker and returns its
    /// result together with the history tables, which the pool keeps alive
    /// across searches for the main worker.
    pub fn run(mut self) -> (SearchResult, Histories) {
        self.start = Instant::now();
        self.check_time = 0;

        // With few enough pieces and a ticking clock the tablebase move is
        // played outright.
        if self.id == 0 && self.limit.time.optimum != 0 {
            if let Some(m) = self.tb.as_ref().and_then(|tb| tb.probe_dtz_move(&self.board)) {
                self.send(format!("bestmove {m}"));
                self.stop.store(true, Ordering::Relaxed);
                return (
                    SearchResult {
                        best_move: Some(m),
                        score: 0,
                    },
                    self.history,
                );
            }
        }

        let result = self.iterative_deepening();
        self.sync_nodes();
        (result, self.history)
    }

    fn iterative_deepening(&mut self) -> SearchResult {
        let mut result = SearchResult::default();
        let mut score = -VALUE_INFINITE;
        let mut bestmove_changes = 0;
        let mut eval_average: i64 = 0;

        let mut depth = 1;
        while depth <= self.limit.depth {
            self.seldepth = 0;
            let previous = score;
            score = self.aspiration(depth, score);
            eval_average += score as i64;

            if self.limit_reached() {
                break;
            }

            // Only the main worker manages time and the reported best move.
            if self.id == 0 {
                if self.pv_len[0] > 0 {
                    let bm = self.pv_table[0][0];
                    if result.best_move != Some(bm) {
                        bestmove_changes += 1;
                    }
                    result.best_move = Some(bm);
                    result.score = score;
                }

                if self.limit.time.optimum != 0 {
                    let elapsed = self.elapsed_ms();

                    // Spending most of the nodes on the best move means the
                    // decision is stable and the rest of the budget is
                    // unlikely to change it (node-effort idea from Koivisto).
                    if let Some(bm) = result.best_move {
                        let effort = self.node_effort[bm.get_source().to_index()]
                            [bm.get_dest().to_index()]
                            * 100
                            / self.nodes.max(1);
                        if depth > 10
                            && self.limit.time.optimum * (110 - effort.min(90)) / 100 < elapsed
                        {
                            break;
                        }
                    }

                    // A sinking score buys more time, in both senses.
                    if (score as i64 + 30) < eval_average / depth as i64 {
                        self.limit.time.optimum = self.limit.time.optimum * 110 / 100;
                    }
                    if score > -200 && score - previous < -20 {
                        self.limit.time.optimum = self.limit.time.optimum * 110 / 100;
                    }
                    if bestmove_changes > 4 {
                        self.limit.time.optimum = self.limit.time.maximum * 3 / 4;
                    }

                    if depth > 10 && elapsed * 10 > self.limit.time.maximum * 6 {
                        break;
                    }
                }
            }

            depth += 1;
        }

        // In infinite mode the result is held back until the GUI says stop.
        while self.limit.infinite && !self.stop.load(Ordering::Relaxed) {
            std::thread::yield_now();
        }

        if result.best_move.is_none() && self.pv_len[0] > 0 {
            result.best_move = Some(self.pv_table[0][0]);
            result.score = score;
        }

        if self.id == 0 {
            let text = result
                .best_move
                .map_or_else(|| "0000".to_string(), |m| m.to_string());
            self.send(format!("bestmove {text}"));
            self.stop.store(true, Ordering::Relaxed);
        }

        result
    }

    /// One iteration of the deepening loop: search `depth` with a window
    /// around the previous score, widening on fail-high or fail-low.
    fn aspiration(&mut self, depth: i32, previous: i32) -> i32 {
        let mut alpha = -VALUE_INFINITE;
        let mut beta = VALUE_INFINITE;
        let mut delta = 30;

        // Shallow iterations are too unstable to be worth a narrow window.
        if depth >= 9 {
            alpha = previous - delta;
            beta = previous + delta;
        }

        let result = loop {
            if alpha < -3500 {
                alpha = -VALUE_INFINITE;
            }
            if beta > 3500 {
                beta = VALUE_INFINITE;
            }

            let result = self.absearch(Node::Root, depth, alpha, beta, 0);

            if self.stop.load(Ordering::Relaxed) {
                return 0;
            }
            if self.id == 0 && self.limit.nodes != 0 && self.nodes >= self.limit.nodes {
                return 0;
            }

            if result <= alpha {
                beta = (alpha + beta) / 2;
                alpha = (alpha - delta).max(-VALUE_INFINITE);
                delta += delta / 2;
            } else if result >= beta {
                beta = (beta + delta).min(VALUE_INFINITE);
                delta += delta / 2;
            } else {
                break result;
            }
        };

        if self.id == 0 {
            self.print_info(result, depth);
        }

        result
    }

    fn absearch(&mut self, node: Node, depth: i32, mut alpha: i32, mut beta: i32, ply: usize) -> i32 {
        if self.limit_reached() {
            return 0;
        }

        let root = node == Node::Root;
        let pv_node = node != Node::NonPv;
        let stm = self.board.side_to_move();
        let in_check = *self.board.checkers() != EMPTY;
        let excluded = self.stack[ply + STACK_OFFSET].excluded;

        let mut best = -VALUE_INFINITE;
        let mut max_value = VALUE_INFINITE;

        if ply >= MAX_PLY {
            return if in_check { 0 } else { evaluate(&self.board) };
        }

        self.pv_len[ply] = ply;

        if !root {
            if self.is_repetition(1 + pv_node as usize) {
                return -1 + (self.nodes & 2) as i32;
            }
            if self.is_drawn() {
                return 0;
            }

            // Mate distance pruning: the window cannot be beaten by any mate
            // further out than the current ply.
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        let mut depth = depth;
        if in_check {
            depth += 1;
        }

        if depth <= 0 {
            return self.qsearch(node, alpha, beta, ply);
        }

        debug_assert!(alpha < beta);
        self.stack[ply + STACK_OFFSET + 1].excluded = None;

        if pv_node && ply > self.seldepth {
            self.seldepth = ply;
        }

        let hash = self.board.get_hash();
        let tte = self.tt.probe(hash);
        let tt_hit = tte.is_some();
        let tt_move = tte.and_then(|e| e.best_move);
        let tt_depth = tte.map_or(0, |e| e.depth);
        let tt_bound = tte.map_or(Bound::None, |e| e.bound);
        let tt_score = tte.map_or(VALUE_NONE, |e| score_from_tt(e.score, ply));

        if !root
            && excluded.is_none()
            && !pv_node
            && tt_hit
            && tt_score != VALUE_NONE
            && tt_depth >= depth
            && self.stack[ply + STACK_OFFSET - 1].played != Played::Null
        {
            match tt_bound {
                Bound::Exact => return tt_score,
                Bound::Lower => alpha = alpha.max(tt_score),
                Bound::Upper => beta = beta.min(tt_score),
                Bound::None => {}
            }
            if alpha >= beta {
                return tt_score;
            }
        }

        if !root {
            if let Some(wdl) = self.tb.as_ref().and_then(|tb| tb.probe_wdl(&self.board)) {
                self.tbhits += 1;
                self.shared_tbhits.fetch_add(1, Ordering::Relaxed);

                let (tb_score, bound) = match wdl {
                    TbWdl::Win => (VALUE_MATE_IN_MAX_PLY - ply as i32 - 1, Bound::Lower),
                    TbWdl::Loss => (VALUE_MATED_IN_MAX_PLY + ply as i32 + 1, Bound::Upper),
                    TbWdl::Draw => (0, Bound::Exact),
                };

                if bound == Bound::Exact
                    || (bound == Bound::Lower && tb_score >= beta)
                    || (bound == Bound::Upper && tb_score <= alpha)
                {
                    self.tt
                        .store(depth + 6, score_to_tt(tb_score, ply), bound, hash, None);
                    return tb_score;
                }

                if pv_node {
                    if bound == Bound::Lower {
                        best = tb_score;
                        alpha = alpha.max(tb_score);
                    } else {
                        max_value = tb_score;
                    }
                }
            }
        }

        let mut improving = false;
        if in_check {
            self.stack[ply + STACK_OFFSET].eval = VALUE_NONE;
        } else {
            // The table score doubles as a sharper static eval when present.
            let eval = if tt_hit && tt_score != VALUE_NONE {
                tt_score
            } else {
                evaluate(&self.board)
            };
            self.stack[ply + STACK_OFFSET].eval = eval;
            let two_ago = self.stack[ply + STACK_OFFSET - 2].eval;
            improving = two_ago != VALUE_NONE && eval > two_ago;

            if !root {
                // Internal iterative reductions instead of re-searching for a
                // hash move that is not there.
                if depth >= 3 && !tt_hit {
                    depth -= 1;
                }
                if pv_node && !tt_hit {
                    depth -= 1;
                }
                if depth <= 0 {
                    return self.qsearch(Node::Pv, alpha, beta, ply);
                }

                if !pv_node {
                    // Razoring.
                    if depth < 3 && eval + 129 < alpha {
                        return self.qsearch(Node::NonPv, alpha, beta, ply);
                    }

                    // Reverse futility: the static eval is so far above beta
                    // that a reduced-margin stand still keeps the cutoff.
                    if beta.abs() < VALUE_TB_WIN_IN_MAX_PLY
                        && depth < 7
                        && eval - 64 * depth + 71 * improving as i32 >= beta
                    {
                        return beta;
                    }

                    // Null move pruning.
                    if self.has_non_pawn_material(stm)
                        && excluded.is_none()
                        && self.stack[ply + STACK_OFFSET - 1].played != Played::Null
                        && depth >= 3
                        && eval >= beta
                    {
                        let r = 5 + (depth / 5).min(4) + ((eval - beta) / 214).min(3);

                        if let Some(null_board) = self.board.null_move() {
                            let prev = self.board;
                            let hmc = self.path.last().map_or(0, |e| e.1) + 1;
                            self.board = null_board;
                            self.path.push((self.board.get_hash(), hmc));
                            self.stack[ply + STACK_OFFSET].played = Played::Null;

                            let score =
                                -self.absearch(Node::NonPv, depth - r, -beta, -beta + 1, ply + 1);

                            self.board = prev;
                            self.path.pop();

                            if score >= beta {
                                // A null-move refutation is never trusted as
                                // a mate score.
                                return if score >= VALUE_TB_WIN_IN_MAX_PLY { beta } else { score };
                            }
                        }
                    }
                }
            }
        }

        let killers = [
            self.history.killers[0][ply],
            self.history.killers[1][ply],
        ];
        let counter = self.stack[ply + STACK_OFFSET - 1]
            .played
            .from_to()
            .and_then(|(from, to)| self.history.counter(from, to));
        let prev_frames = [
            self.stack[ply + STACK_OFFSET - 1].played.piece_to(),
            self.stack[ply + STACK_OFFSET - 2].played.piece_to(),
        ];
        let whitelist = if root { self.searchmoves.clone() } else { Vec::new() };

        let mut picker = MovePicker::new(&self.board, tt_move, killers, counter, prev_frames, whitelist);

        let mut quiets: Vec<ChessMove> = Vec::new();
        let mut bestmove: Option<ChessMove> = None;
        let mut made_moves = 0;

        while let Some(m) = picker.next(&self.history) {
            if Some(m) == excluded {
                continue;
            }

            made_moves += 1;

            let capture = self.board.piece_on(m.get_dest()).is_some();
            let mut extension = 0;

            if !root && best > VALUE_TB_LOSS_IN_MAX_PLY {
                if capture {
                    // Losing captures are not worth much depth.
                    if depth < 6 && !see(&self.board, m, -92 * depth) {
                        continue;
                    }
                } else {
                    // Late quiet moves at shallow depth rarely save a node.
                    if !in_check
                        && !pv_node
                        && m.get_promotion().is_none()
                        && depth <= 5
                        && quiets.len() as i32 > 4 + depth * depth
                    {
                        continue;
                    }
                    if depth < 7 && !see(&self.board, m, -93 * depth) {
                        continue;
                    }
                }
            }

            // Singular extension: when the hash move beats a lowered beta on
            // a reduced search with every other move excluded, it is the
            // only move and deserves one more ply.
            if !root
                && depth >= 8
                && tt_hit
                && tt_move == Some(m)
                && excluded.is_none()
                && tt_score.abs() < 10000
                && tt_bound.has_lower()
                && tt_depth >= depth - 3
            {
                let singular_beta = tt_score - 3 * depth;
                let singular_depth = (depth - 1) / 2;

                self.stack[ply + STACK_OFFSET].excluded = Some(m);
                let value =
                    self.absearch(Node::NonPv, singular_depth, singular_beta - 1, singular_beta, ply);
                self.stack[ply + STACK_OFFSET].excluded = None;

                if value < singular_beta {
                    extension = 1;
                } else if singular_beta >= beta {
                    // Multicut: a second move also beats beta.
                    return singular_beta;
                }
            }

            let new_depth = depth - 1 + extension;

            if self.id == 0 && root && !self.stop.load(Ordering::Relaxed) && self.elapsed_ms() > 10_000
            {
                self.send(format!(
                    "info depth {} currmove {} currmovenumber {}",
                    depth - in_check as i32,
                    m,
                    made_moves
                ));
            }

            self.count_node();
            let moved_piece = self
                .board
                .piece_on(m.get_source())
                .map_or(0, |p| piece_key(stm, p));
            let prev = self.do_move(m);
            self.stack[ply + STACK_OFFSET].played = Played::Normal {
                mv: m,
                piece: moved_piece,
            };
            let nodes_before = self.nodes;

            let mut score = VALUE_NONE;
            let do_full_search;

            // Late move reductions: moves this far down the ordering start
            // at reduced depth and only get the full treatment on promise.
            if depth >= 3 && !in_check && made_moves > 3 + 2 * pv_node as i32 {
                let mut r = self.reductions[depth.min(63) as usize][(made_moves as usize).min(63)];
                r -= (self.id & 1) as i32;
                r += improving as i32;
                r -= pv_node as i32;
                r -= capture as i32;
                let rdepth = (new_depth - r).clamp(1, new_depth + 1);

                score = -self.absearch(Node::NonPv, rdepth, -alpha - 1, -alpha, ply + 1);
                do_full_search = score > alpha && rdepth < new_depth;
            } else {
                do_full_search = !pv_node || made_moves > 1;
            }

            if do_full_search {
                score = -self.absearch(Node::NonPv, new_depth, -alpha - 1, -alpha, ply + 1);
            }

            // PVS: the first move, and any move that lands inside the
            // window, gets a full-window search.
            if pv_node && (made_moves == 1 || (score > alpha && score < beta)) {
                score = -self.absearch(Node::Pv, new_depth, -beta, -alpha, ply + 1);
            }

            self.undo_move(prev);

            debug_assert!(score > -VALUE_INFINITE && score < VALUE_INFINITE);

            if self.id == 0 {
                self.node_effort[m.get_source().to_index()][m.get_dest().to_index()] +=
                    self.nodes - nodes_before;
            }

            if score > best {
                best = score;

                if score > alpha {
                    alpha = score;
                    bestmove = Some(m);
                    self.update_pv(ply, m);

                    if score >= beta {
                        self.tt.prefetch(hash);
                        let counter_key = self.stack[ply + STACK_OFFSET - 1].played.from_to();
                        self.history.update(
                            &self.board,
                            m,
                            depth,
                            ply,
                            &quiets,
                            &prev_frames,
                            counter_key,
                        );
                        break;
                    }
                }
            }

            if !capture && quiets.len() < 64 {
                quiets.push(m);
            }
        }

        if made_moves == 0 {
            best = if excluded.is_some() {
                alpha
            } else if in_check {
                mated_in(ply)
            } else {
                0
            };
        }

        if pv_node {
            best = best.min(max_value);
        }

        let bound = if best >= beta {
            Bound::Lower
        } else if pv_node && bestmove.is_some() {
            Bound::Exact
        } else {
            Bound::Upper
        };

        if excluded.is_none() && !self.stop.load(Ordering::Relaxed) {
            self.tt
                .store(depth, score_to_tt(best, ply), bound, hash, bestmove);
        }

        debug_assert!(best > -VALUE_INFINITE && best < VALUE_INFINITE);
        best
    }

    fn qsearch(&mut self, node: Node, mut alpha: i32, beta: i32, ply: usize) -> i32 {
        if self.limit_reached() {
            return 0;
        }

        let pv_node = node != Node::NonPv;
        let in_check = *self.board.checkers() != EMPTY;

        if ply >= MAX_PLY {
            return evaluate(&self.board);
        }

        if self.is_repetition(1 + pv_node as usize) {
            return -1 + (self.nodes & 2) as i32;
        }
        if self.is_drawn() {
            return 0;
        }

        let hash = self.board.get_hash();
        let tte = self.tt.probe(hash);
        let tt_move = tte.and_then(|e| e.best_move);
        let tt_score = tte.map_or(VALUE_NONE, |e| score_from_tt(e.score, ply));

        if let Some(e) = tte {
            if !pv_node && tt_score != VALUE_NONE && e.bound != Bound::None {
                match e.bound {
                    Bound::Exact => return tt_score,
                    Bound::Lower if tt_score >= beta => return tt_score,
                    Bound::Upper if tt_score <= alpha => return tt_score,
                    _ => {}
                }
            }
        }

        // Stand pat: doing nothing is always an option outside of check.
        let mut best = evaluate(&self.board);
        if best >= beta {
            return best;
        }
        if best > alpha {
            alpha = best;
        }

        let mut bestmove: Option<ChessMove> = None;
        let mut picker = MovePicker::new_qsearch(&self.board, tt_move);

        while let Some(m) = picker.next(&self.history) {
            if best > VALUE_TB_LOSS_IN_MAX_PLY {
                // Delta pruning: even capturing the victim plus a wide
                // margin cannot lift this above alpha.
                if let Some(victim) = captured_piece(&self.board, m) {
                    if !in_check
                        && m.get_promotion().is_none()
                        && self.has_non_pawn_material(self.board.side_to_move())
                        && best + 400 + EG_VALUES[victim.to_index()] < alpha
                    {
                        continue;
                    }
                }

                if !in_check && !see(&self.board, m, 0) {
                    continue;
                }
            }

            self.count_node();
            let prev = self.do_move(m);
            let score = -self.qsearch(node, -beta, -alpha, ply + 1);
            self.undo_move(prev);

            debug_assert!(score > -VALUE_INFINITE && score < VALUE_INFINITE);

            if score > best {
                best = score;

                if score > alpha {
                    alpha = score;
                    bestmove = Some(m);

                    if score >= beta {
                        break;
                    }
                }
            }
        }

        let bound = if best >= beta { Bound::Lower } else { Bound::Upper };
        if !self.stop.load(Ordering::Relaxed) {
            self.tt.store(0, score_to_tt(best, ply), bound, hash, bestmove);
        }

        debug_assert!(best > -VALUE_INFINITE && best < VALUE_INFINITE);
        best
    }

    /// Stop flag, node budget and (on the main worker) the wall clock. The
    /// clock is only consulted every 2048 calls.
    fn limit_reached(&mut self) -> bool {
        if self.stop.load(Ordering::Relaxed) {
            return true;
        }
        if self.id != 0 {
            return false;
        }
        if self.limit.nodes != 0 && self.nodes >= self.limit.nodes {
            return true;
        }

        self.check_time -= 1;
        if self.check_time > 0 {
            return false;
        }
        self.check_time = 2047;

        if self.limit.time.maximum != 0 && self.elapsed_ms() >= self.limit.time.maximum {
            self.stop.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// Has the current position already occurred `threshold` times, looking
    /// back through the search path and the game history no further than the
    /// halfmove clock allows?
    pub fn is_repetition(&self, threshold: usize) -> bool {
        let hash = self.board.get_hash();
        let reach = self.path.last().map_or(0, |e| e.1) as usize;
        let mut count = 0;
        let mut steps = 0;

        for &(h, _) in self.path.iter().rev().skip(1) {
            if steps >= reach {
                return false;
            }
            steps += 1;
            if h == hash {
                count += 1;
                if count >= threshold {
                    return true;
                }
            }
        }

        for &h in self.game_hashes.iter().rev() {
            if steps >= reach {
                break;
            }
            steps += 1;
            if h == hash {
                count += 1;
                if count >= threshold {
                    return true;
                }
            }
        }

        false
    }

    /// Fifty-move rule and dead material. Stalemate is handled by the move
    /// loop finding nothing to play.
    pub fn is_drawn(&self) -> bool {
        if self.path.last().map_or(0, |e| e.1) >= 100 {
            return true;
        }
        insufficient_material(&self.board)
    }

    fn has_non_pawn_material(&self, color: Color) -> bool {
        let own = *self.board.color_combined(color);
        let minors_and_majors = *self.board.pieces(Piece::Knight)
            | *self.board.pieces(Piece::Bishop)
            | *self.board.pieces(Piece::Rook)
            | *self.board.pieces(Piece::Queen);
        minors_and_majors & own != EMPTY
    }

    fn do_move(&mut self, m: ChessMove) -> Board {
        let prev = self.board;
        let irreversible =
            prev.piece_on(m.get_source()) == Some(Piece::Pawn) || is_capture(&prev, m);
        let hmc = if irreversible {
            0
        } else {
            self.path.last().map_or(0, |e| e.1) + 1
        };
        self.board = prev.make_move_new(m);
        self.path.push((self.board.get_hash(), hmc));
        prev
    }

    fn undo_move(&mut self, prev: Board) {
        self.board = prev;
        self.path.pop();
    }

    fn update_pv(&mut self, ply: usize, m: ChessMove) {
        self.pv_table[ply][ply] = m;
        let child_len = self.pv_len[ply + 1].max(ply + 1);
        for i in ply + 1..child_len.min(MAX_PLY) {
            self.pv_table[ply][i] = self.pv_table[ply + 1][i];
        }
        self.pv_len[ply] = child_len;
    }

    fn count_node(&mut self) {
        self.nodes += 1;
        if self.nodes & 2047 == 0 {
            self.sync_nodes();
        }
    }

    fn sync_nodes(&mut self) {
        let delta = self.nodes - self.reported_nodes;
        if delta > 0 {
            self.shared_nodes.fetch_add(delta, Ordering::Relaxed);
            self.reported_nodes = self.nodes;
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn send(&self, text: String) {
        if let Some(tx) = &self.printer {
            let _ = tx.send(text);
        }
    }

    fn print_info(&mut self, score: i32, depth: i32) {
        if self.printer.is_none() {
            return;
        }
        self.sync_nodes();

        let elapsed = self.elapsed_ms().max(1);
        let nodes = self.shared_nodes.load(Ordering::Relaxed);
        let nps = nodes * 1000 / elapsed;
        let tbhits = self.shared_tbhits.load(Ordering::Relaxed);

        let mut pv = String::new();
        for i in 0..self.pv_len[0].min(MAX_PLY) {
            pv.push(' ');
            pv.push_str(&self.pv_table[0][i].to_string());
        }

        self.send(format!(
            "info depth {} seldepth {} score {} nodes {} nps {} hashfull {} tbhits {} time {} pv{}",
            depth,
            self.seldepth,
            crate::uci::format_score(score),
            nodes,
            nps,
            self.tt.hashfull(),
            tbhits,
            elapsed,
            pv
        ));
    }
}

/// Neither side can possibly mate: bare kings, a lone minor piece, or only
/// bishops that all live on the same square color.
pub fn insufficient_material(board: &Board) -> bool {
    let majors_or_pawns = *board.pieces(Piece::Pawn)
        | *board.pieces(Piece::Rook)
        | *board.pieces(Piece::Queen);
    if majors_or_pawns != EMPTY {
        return false;
    }

    let minors = *board.pieces(Piece::Knight) | *board.pieces(Piece::Bishop);
    if minors.popcnt() <= 1 {
        return true;
    }

    if *board.pieces(Piece::Knight) == EMPTY {
        let bishops = *board.pieces(Piece::Bishop);
        let light = chess::BitBoard(0x55AA_55AA_55AA_55AA);
        return bishops & light == bishops || bishops & light == EMPTY;
    }

    false
}
