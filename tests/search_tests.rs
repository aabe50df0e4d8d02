//! End-to-end searches through the thread pool, observing only the public
//! surface: the result slot and the printer channel.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use chess::{Board, ChessMove};
use sable::defs::{VALUE_INFINITE, VALUE_MATE};
use sable::search::history::Histories;
use sable::search::lazy_smp::ThreadPool;
use sable::search::time::Time;
use sable::search::tt::TranspositionTable;
use sable::search::{Limits, SearchResult, Worker};

fn run_search(
    fen: &str,
    limits: Limits,
    threads: usize,
    searchmoves: Vec<ChessMove>,
) -> (SearchResult, Vec<String>) {
    let board = Board::from_str(fen).expect("test fen");
    let tt = Arc::new(TranspositionTable::new(16));
    let mut pool = ThreadPool::new();
    let (tx, rx) = mpsc::channel();

    pool.start(
        board,
        Vec::new(),
        0,
        limits,
        searchmoves,
        threads,
        tt,
        None,
        Some(tx),
    );
    pool.wait();

    (pool.last_result(), rx.try_iter().collect())
}

fn depth_limits(depth: i32) -> Limits {
    Limits {
        depth,
        ..Limits::default()
    }
}

#[test]
fn finds_mate_in_one() {
    let (result, lines) = run_search("6k1/8/6K1/8/8/8/8/7R w - - 0 1", depth_limits(4), 1, vec![]);

    assert_eq!(result.best_move, Some(ChessMove::from_str("h1h8").unwrap()));
    assert!(result.score >= VALUE_MATE - 2, "score {}", result.score);
    assert!(lines.iter().any(|l| l.contains("score mate 1")));
    assert!(lines.last().unwrap().starts_with("bestmove h1h8"));
}

#[test]
fn finds_mate_with_multiple_threads() {
    let (result, _) = run_search("6k1/8/6K1/8/8/8/8/7R w - - 0 1", depth_limits(6), 3, vec![]);
    assert_eq!(result.best_move, Some(ChessMove::from_str("h1h8").unwrap()));
    assert!(result.score >= VALUE_MATE - 2);
}

#[test]
fn stalemate_scores_zero_with_no_move() {
    let (result, lines) = run_search("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", depth_limits(6), 1, vec![]);

    assert_eq!(result.best_move, None);
    assert_eq!(result.score, 0);
    assert!(lines.last().unwrap().starts_with("bestmove 0000"));
}

#[test]
fn startpos_prefers_a_main_opening() {
    let (result, _) = run_search(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        depth_limits(10),
        1,
        vec![],
    );

    let book = ["e2e4", "d2d4", "g1f3", "c2c4"]
        .map(|m| ChessMove::from_str(m).unwrap());
    let bm = result.best_move.expect("a best move");
    assert!(book.contains(&bm), "unexpected opening {bm}");
    assert!(result.score.abs() <= 50, "score {}", result.score);
    assert!(result.score.abs() < VALUE_INFINITE);
}

#[test]
fn searchmoves_restricts_the_root() {
    let only = ChessMove::from_str("a2a3").unwrap();
    let (result, _) = run_search(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        depth_limits(5),
        1,
        vec![only],
    );
    assert_eq!(result.best_move, Some(only));
}

#[test]
fn movetime_returns_promptly() {
    let limits = Limits {
        time: Time {
            optimum: 100,
            maximum: 100,
        },
        ..Limits::default()
    };

    let start = Instant::now();
    let (result, lines) = run_search(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        limits,
        1,
        vec![],
    );
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
    assert!(result.best_move.is_some());
    // Nothing may follow the bestmove line.
    assert!(lines.last().unwrap().starts_with("bestmove"));
}

#[test]
fn stop_cancels_an_infinite_search() {
    let board = Board::default();
    let tt = Arc::new(TranspositionTable::new(16));
    let mut pool = ThreadPool::new();
    let (tx, rx) = mpsc::channel();

    let limits = Limits {
        infinite: true,
        ..Limits::default()
    };
    pool.start(board, Vec::new(), 0, limits, vec![], 1, tt, None, Some(tx));

    std::thread::sleep(Duration::from_millis(100));
    let start = Instant::now();
    pool.stop();
    assert!(start.elapsed() < Duration::from_secs(1));

    let lines: Vec<String> = rx.try_iter().collect();
    assert!(lines.last().unwrap().starts_with("bestmove"));
    assert!(pool.best_move().is_some());
}

#[test]
fn reported_pv_is_a_legal_line() {
    let (_, lines) = run_search(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        depth_limits(6),
        1,
        vec![],
    );

    let info = lines
        .iter()
        .rev()
        .find(|l| l.contains(" pv "))
        .expect("an info line with a pv");
    let pv: Vec<&str> = info.split(" pv ").nth(1).unwrap().split_whitespace().collect();
    assert!(!pv.is_empty());

    let mut board =
        Board::from_str("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
            .unwrap();
    for token in pv {
        let m = ChessMove::from_str(token).expect("parsable pv move");
        assert!(board.legal(m), "illegal pv move {m}");
        board = board.make_move_new(m);
    }
}

#[test]
fn knight_shuffle_is_recognized_as_repetition() {
    let moves = [
        "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
    ];

    let mut board = Board::default();
    let mut hashes = Vec::new();
    for text in moves {
        let m = ChessMove::from_str(text).unwrap();
        assert!(board.legal(m));
        hashes.push(board.get_hash());
        board = board.make_move_new(m);
    }

    let worker = Worker::new(
        0,
        board,
        Arc::new(hashes),
        moves.len() as u32,
        depth_limits(1),
        vec![],
        Arc::new(TranspositionTable::new(1)),
        None,
        Arc::new(AtomicBool::new(false)),
        Arc::new(AtomicU64::new(0)),
        Arc::new(AtomicU64::new(0)),
        Histories::default(),
        None,
    );

    // The position on the board has already been seen twice before.
    assert!(worker.is_repetition(2));
    assert!(!worker.is_repetition(3));
}

#[test]
fn depth_limit_is_respected() {
    let (result, lines) = run_search(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        depth_limits(3),
        1,
        vec![],
    );

    assert!(result.best_move.is_some());
    let deepest = lines
        .iter()
        .filter(|l| l.starts_with("info depth"))
        .filter_map(|l| l.split_whitespace().nth(2))
        .filter_map(|d| d.parse::<i32>().ok())
        .max()
        .unwrap();
    assert!(deepest <= 3);
    assert!(deepest >= 1);
}
