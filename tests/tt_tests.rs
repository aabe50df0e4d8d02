use std::str::FromStr;

use chess::ChessMove;
use sable::defs::{mate_in, VALUE_MATE};
use sable::search::tt::{score_from_tt, score_to_tt, Bound, TranspositionTable};

#[test]
fn store_then_probe_round_trips() {
    let tt = TranspositionTable::new(1);
    let m = ChessMove::from_str("e2e4").unwrap();

    tt.store(5, 42, Bound::Exact, 0xdead_beef, Some(m));

    let entry = tt.probe(0xdead_beef).expect("entry should be found");
    assert_eq!(entry.depth, 5);
    assert_eq!(entry.score, 42);
    assert_eq!(entry.bound, Bound::Exact);
    assert_eq!(entry.best_move, Some(m));
}

#[test]
fn zero_size_table_still_works() {
    let tt = TranspositionTable::new(0);
    tt.store(3, -7, Bound::Lower, 0x1234, None);
    let entry = tt.probe(0x1234).expect("entry should be found");
    assert_eq!(entry.depth, 3);
    assert_eq!(entry.score, -7);
}

#[test]
fn probe_misses_on_key_mismatch() {
    let tt = TranspositionTable::new(1);
    tt.store(5, 42, Bound::Exact, 0xaaaa, None);
    assert!(tt.probe(0xbbbb).is_none());
}

#[test]
fn overwrite_without_a_move_keeps_the_old_one() {
    let tt = TranspositionTable::new(1);
    let hash = 0x00c0_ffee_u64;
    let m1 = ChessMove::from_str("g1f3").unwrap();

    tt.store(5, 100, Bound::Exact, hash, Some(m1));
    tt.store(3, 50, Bound::Upper, hash, None);

    let entry = tt.probe(hash).expect("entry should be found");
    assert_eq!(entry.depth, 3);
    assert_eq!(entry.score, 50);
    assert_eq!(entry.bound, Bound::Upper);
    assert_eq!(entry.best_move, Some(m1), "move must survive the overwrite");
}

#[test]
fn overwrite_with_a_move_replaces_it() {
    let tt = TranspositionTable::new(1);
    let hash = 0x5eed;
    let m1 = ChessMove::from_str("g1f3").unwrap();
    let m2 = ChessMove::from_str("d2d4").unwrap();

    tt.store(5, 100, Bound::Exact, hash, Some(m1));
    tt.store(2, -30, Bound::Lower, hash, Some(m2));

    assert_eq!(tt.probe(hash).unwrap().best_move, Some(m2));
}

#[test]
fn all_bounds_survive_packing() {
    let tt = TranspositionTable::new(1);
    for (i, bound) in [Bound::Exact, Bound::Lower, Bound::Upper].into_iter().enumerate() {
        let hash = 0xfeed_0000 + i as u64;
        tt.store(5, -200, bound, hash, None);
        let entry = tt.probe(hash).expect("entry should be found");
        assert_eq!(entry.bound, bound);
        assert_eq!(entry.score, -200);
    }
}

#[test]
fn clear_empties_the_table() {
    let tt = TranspositionTable::new(1);
    tt.store(2, 10, Bound::Lower, 0xabc, None);
    assert!(tt.probe(0xabc).is_some());
    tt.clear();
    assert!(tt.probe(0xabc).is_none());
    assert_eq!(tt.hashfull(), 0);
}

#[test]
fn hashfull_counts_used_slots() {
    let tt = TranspositionTable::new(1);
    assert_eq!(tt.hashfull(), 0);
    for i in 0..(64 * 1024_u64) {
        tt.store(1, 0, Bound::Exact, i.wrapping_mul(0x9e37_79b9_7f4a_7c15), None);
    }
    assert!(tt.hashfull() > 0);
}

#[test]
fn mate_scores_stay_anchored_to_the_node() {
    // A mate stored at ply 3 must read back as the same distance when probed
    // from ply 3 again.
    let tt = TranspositionTable::new(1);
    let score = mate_in(8);

    tt.store(9, score_to_tt(score, 3), Bound::Exact, 0x77, None);
    let entry = tt.probe(0x77).unwrap();
    assert_eq!(score_from_tt(entry.score, 3), score);

    // The stored value itself is distance-from-node, so it sits higher.
    assert_eq!(entry.score, VALUE_MATE - 8 + 3);
}
