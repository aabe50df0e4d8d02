//! UCI protocol front-end.
//!
//! A blocking stdin loop that owns the game state (board, hash history,
//! halfmove clock) and drives the search pool. All engine output funnels
//! through one printer thread so info lines from the search never interleave
//! mid-line with command responses.

use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::{mpsc, Arc};

use chess::{Board, ChessMove, MoveGen, Piece};

use crate::defs::{MAX_PLY, VALUE_MATE, VALUE_MATE_IN_MAX_PLY};
use crate::eval;
use crate::search::lazy_smp::ThreadPool;
use crate::search::movepick::is_capture;
use crate::search::syzygy::SyzygyTb;
use crate::search::time::{optimum_time, Time};
use crate::search::tt::TranspositionTable;
use crate::search::Limits;

const DEFAULT_HASH_MB: usize = 64;
const DEFAULT_MOVE_OVERHEAD: u64 = 30;

/// Render a score for an `info` line: centipawns, or moves-to-mate once the
/// score is inside the mate band.
pub fn format_score(score: i32) -> String {
    if score.abs() >= VALUE_MATE_IN_MAX_PLY {
        let plies = VALUE_MATE - score.abs();
        let moves = (plies + 1) / 2;
        if score > 0 {
            format!("mate {moves}")
        } else {
            format!("mate -{moves}")
        }
    } else {
        format!("cp {score}")
    }
}

pub struct UciHandler {
    board: Board,
    /// Zobrist keys of every position played before the current one.
    game_hashes: Vec<u64>,
    halfmoves: u32,

    tt: Arc<TranspositionTable>,
    tb: Option<Arc<SyzygyTb>>,
    pool: ThreadPool,

    threads: usize,
    move_overhead: u64,
    tx: mpsc::Sender<String>,
}

impl UciHandler {
    pub fn new() -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            while let Ok(line) = rx.recv() {
                println!("{line}");
            }
        });

        Ok(Self {
            board: Board::default(),
            game_hashes: Vec::new(),
            halfmoves: 0,
            tt: Arc::new(TranspositionTable::new(DEFAULT_HASH_MB)),
            tb: None,
            pool: ThreadPool::new(),
            threads: 1,
            move_overhead: DEFAULT_MOVE_OVERHEAD,
            tx,
        })
    }

    pub fn run(&mut self) {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(command) = line else { break };
            let command = command.trim();
            if command.is_empty() {
                continue;
            }
            if !self.handle_command(command) {
                break;
            }
        }
        self.pool.stop();
    }

    /// Dispatch one command; returns false on `quit`.
    fn handle_command(&mut self, command: &str) -> bool {
        let tokens: Vec<&str> = command.split_whitespace().collect();

        match tokens[0] {
            "uci" => {
                println!("id name Sable {}", env!("CARGO_PKG_VERSION"));
                println!("id author the Sable developers");
                println!("option name Hash type spin default {DEFAULT_HASH_MB} min 1 max 65536");
                println!("option name Threads type spin default 1 min 1 max 256");
                println!(
                    "option name Move Overhead type spin default {DEFAULT_MOVE_OVERHEAD} min 0 max 5000"
                );
                println!("option name SyzygyPath type string default <empty>");
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "ucinewgame" => {
                self.pool.stop();
                self.board = Board::default();
                self.game_hashes.clear();
                self.halfmoves = 0;
                self.tt.clear();
            }
            "position" => self.handle_position(&tokens[1..]),
            "go" => self.handle_go(&tokens[1..]),
            "stop" => self.pool.stop(),
            "setoption" => self.handle_setoption(&tokens[1..]),
            "quit" => return false,

            // Debug helpers.
            "print" => println!("{}", self.board),
            "eval" => println!("{}", eval::evaluate(&self.board)),
            "moves" => {
                let moves: Vec<String> =
                    MoveGen::new_legal(&self.board).map(|m| m.to_string()).collect();
                println!("{} ({})", moves.join(" "), moves.len());
            }
            "rep" => {
                let hash = self.board.get_hash();
                let seen = self.game_hashes.iter().filter(|&&h| h == hash).count();
                println!("{}", seen >= 2);
            }
            "perft" => {
                let depth = tokens.get(1).and_then(|t| t.parse().ok()).unwrap_or(1);
                let start = std::time::Instant::now();
                let nodes = perft(&self.board, depth);
                println!("nodes {nodes} time {} ms", start.elapsed().as_millis());
            }
            _ => println!("Unknown command: {command}"),
        }

        true
    }

    fn handle_setoption(&mut self, tokens: &[&str]) {
        let Some(value_at) = tokens.iter().position(|&t| t == "value") else {
            return;
        };
        if tokens.first() != Some(&"name") || value_at + 1 >= tokens.len() {
            return;
        }

        let name = tokens[1..value_at].join(" ").to_lowercase();
        let value = tokens[value_at + 1..].join(" ");

        match name.as_str() {
            "hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    self.pool.stop();
                    // Resizing needs exclusive access; the workers have all
                    // been joined, so the only other owner is the pool's
                    // argument clone from the previous search.
                    if let Some(tt) = Arc::get_mut(&mut self.tt) {
                        tt.allocate_mb(mb.clamp(1, 65536));
                    }
                }
            }
            "threads" => {
                if let Ok(n) = value.parse::<usize>() {
                    self.threads = n.clamp(1, 256);
                }
            }
            "move overhead" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.move_overhead = ms.min(5000);
                }
            }
            "syzygypath" => {
                if value == "<empty>" || value.is_empty() {
                    self.tb = None;
                } else {
                    match SyzygyTb::new(&value) {
                        Ok(tb) => self.tb = Some(Arc::new(tb)),
                        Err(err) => println!("info string syzygy: {err}"),
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_position(&mut self, tokens: &[&str]) {
        self.game_hashes.clear();
        self.halfmoves = 0;

        let mut index = 0;
        match tokens.first() {
            Some(&"startpos") => {
                self.board = Board::default();
                index = 1;
            }
            Some(&"fen") => {
                let mut fen_parts = Vec::new();
                index = 1;
                while index < tokens.len() && tokens[index] != "moves" {
                    fen_parts.push(tokens[index]);
                    index += 1;
                }
                let fen = fen_parts.join(" ");
                match Board::from_str(&fen) {
                    Ok(board) => {
                        self.board = board;
                        // The board value does not carry the clock field.
                        self.halfmoves = fen_parts
                            .get(4)
                            .and_then(|f| f.parse().ok())
                            .unwrap_or(0);
                    }
                    Err(err) => {
                        println!("info string bad fen: {err}");
                        return;
                    }
                }
            }
            _ => return,
        }

        if tokens.get(index) == Some(&"moves") {
            for token in &tokens[index + 1..] {
                let Ok(m) = ChessMove::from_str(token) else { continue };
                if !self.board.legal(m) {
                    continue;
                }
                if is_capture(&self.board, m)
                    || self.board.piece_on(m.get_source()) == Some(Piece::Pawn)
                {
                    self.halfmoves = 0;
                } else {
                    self.halfmoves += 1;
                }
                self.game_hashes.push(self.board.get_hash());
                self.board = self.board.make_move_new(m);
            }
        }
    }

    fn handle_go(&mut self, tokens: &[&str]) {
        self.pool.stop();

        let find = |name: &str| -> Option<u64> {
            tokens
                .iter()
                .position(|&t| t == name)
                .and_then(|i| tokens.get(i + 1))
                .and_then(|v| v.parse().ok())
        };

        let mut limits = Limits::default();

        if let Some(depth) = find("depth") {
            limits.depth = (depth as i32).min(MAX_PLY as i32);
        }
        if let Some(nodes) = find("nodes") {
            limits.nodes = nodes;
        }
        if let Some(ms) = find("movetime") {
            limits.time = Time {
                optimum: ms,
                maximum: ms,
            };
        }
        limits.infinite = tokens.contains(&"infinite");

        let (clock, inc) = match self.board.side_to_move() {
            chess::Color::White => ("wtime", "winc"),
            chess::Color::Black => ("btime", "binc"),
        };
        if let Some(remaining) = find(clock) {
            limits.time = optimum_time(
                remaining,
                find(inc).unwrap_or(0),
                find("movestogo").unwrap_or(0),
                self.move_overhead,
                self.game_hashes.len() as u32,
            );
        }

        let mut searchmoves = Vec::new();
        if let Some(at) = tokens.iter().position(|&t| t == "searchmoves") {
            for token in &tokens[at + 1..] {
                match ChessMove::from_str(token) {
                    Ok(m) if self.board.legal(m) => searchmoves.push(m),
                    _ => break,
                }
            }
        }

        self.pool.start(
            self.board,
            self.game_hashes.clone(),
            self.halfmoves,
            limits,
            searchmoves,
            self.threads,
            Arc::clone(&self.tt),
            self.tb.clone(),
            Some(self.tx.clone()),
        );
    }
}

fn perft(board: &Board, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }
    let mut nodes = 0;
    for m in MoveGen::new_legal(board) {
        if depth == 1 {
            nodes += 1;
        } else {
            nodes += perft(&board.make_move_new(m), depth - 1);
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_formatting() {
        assert_eq!(format_score(25), "cp 25");
        assert_eq!(format_score(-130), "cp -130");
        assert_eq!(format_score(VALUE_MATE - 1), "mate 1");
        assert_eq!(format_score(VALUE_MATE - 4), "mate 2");
        assert_eq!(format_score(-(VALUE_MATE - 3)), "mate -2");
    }

    #[test]
    fn perft_startpos() {
        let board = Board::default();
        assert_eq!(perft(&board, 1), 20);
        assert_eq!(perft(&board, 2), 400);
        assert_eq!(perft(&board, 3), 8902);
    }
}
