//! Lazy SMP thread pool.
//!
//! Every worker runs the same iterative deepening loop on its own board and
//! history tables; coordination happens implicitly through the shared
//! transposition table and explicitly through one atomic stop flag. Worker 0
//! is special: it keeps its history tables across searches, owns the clock
//! and is the only one that reports.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use chess::{Board, ChessMove};
use parking_lot::Mutex;

use crate::search::history::Histories;
use crate::search::syzygy::SyzygyTb;
use crate::search::tt::TranspositionTable;
use crate::search::{Limits, SearchResult, Worker};

/// Deep recursion plus per-frame move lists need more room than the default
/// thread stack provides.
const STACK_SIZE: usize = 16 * 1024 * 1024;

pub struct ThreadPool {
    pub stop: Arc<AtomicBool>,
    nodes: Arc<AtomicU64>,
    tbhits: Arc<AtomicU64>,
    result: Arc<Mutex<SearchResult>>,
    /// Worker 0's history tables, carried over between searches.
    saved_history: Arc<Mutex<Option<Histories>>>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPool {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            nodes: Arc::new(AtomicU64::new(0)),
            tbhits: Arc::new(AtomicU64::new(0)),
            result: Arc::new(Mutex::new(SearchResult::default())),
            saved_history: Arc::new(Mutex::new(None)),
            handles: Vec::new(),
        }
    }

    /// Launch `worker_count` search threads on `board`. Any previous search
    /// is stopped and joined first.
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        &mut self,
        board: Board,
        game_hashes: Vec<u64>,
        halfmoves: u32,
        limits: Limits,
        searchmoves: Vec<ChessMove>,
        worker_count: usize,
        tt: Arc<TranspositionTable>,
        tb: Option<Arc<SyzygyTb>>,
        printer: Option<Sender<String>>,
    ) {
        self.stop();

        self.stop.store(false, Ordering::Relaxed);
        self.nodes.store(0, Ordering::Relaxed);
        self.tbhits.store(0, Ordering::Relaxed);

        let game_hashes = Arc::new(game_hashes);

        for id in 0..worker_count.max(1) {
            let game_hashes = Arc::clone(&game_hashes);
            let searchmoves = searchmoves.clone();
            let tt = Arc::clone(&tt);
            let tb = tb.clone();
            let stop = Arc::clone(&self.stop);
            let nodes = Arc::clone(&self.nodes);
            let tbhits = Arc::clone(&self.tbhits);
            let result = Arc::clone(&self.result);
            let saved_history = Arc::clone(&self.saved_history);
            let printer = if id == 0 { printer.clone() } else { None };

            // Helpers start from scratch every search; the main worker picks
            // its tables back up.
            let history = if id == 0 {
                self.saved_history.lock().take()
            } else {
                None
            };

            let handle = std::thread::Builder::new()
                .name(format!("sable-search-{id}"))
                .stack_size(STACK_SIZE)
                .spawn(move || {
                    let worker = Worker::new(
                        id,
                        board,
                        game_hashes,
                        halfmoves,
                        limits,
                        searchmoves,
                        tt,
                        tb,
                        stop,
                        nodes,
                        tbhits,
                        history.unwrap_or_default(),
                        printer,
                    );

                    let (search_result, tables) = worker.run();

                    if id == 0 {
                        *result.lock() = search_result;
                        *saved_history.lock() = Some(tables);
                    }
                })
                .expect("failed to spawn search thread");

            self.handles.push(handle);
        }
    }

    /// Raise the stop flag and wait for every worker to come home.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            handle.join().expect("search thread panicked");
        }
    }

    /// Block until the current search finishes on its own.
    pub fn wait(&mut self) {
        for handle in self.handles.drain(..) {
            handle.join().expect("search thread panicked");
        }
    }

    pub fn is_searching(&self) -> bool {
        !self.handles.is_empty() && !self.stop.load(Ordering::Relaxed)
    }

    /// Result of the last completed search on the main worker.
    pub fn best_move(&self) -> Option<ChessMove> {
        self.result.lock().best_move
    }

    pub fn last_result(&self) -> SearchResult {
        *self.result.lock()
    }

    pub fn total_nodes(&self) -> u64 {
        self.nodes.load(Ordering::Relaxed)
    }

    pub fn total_tbhits(&self) -> u64 {
        self.tbhits.load(Ordering::Relaxed)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
    }
}
