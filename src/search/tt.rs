use chess::{ChessMove, Piece, Square};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::defs::{VALUE_TB_LOSS_IN_MAX_PLY, VALUE_TB_WIN_IN_MAX_PLY};

/// Bound type of a stored score. `Exact` carries both bound bits so that
/// "has a lower bound" can be tested with a mask, which the singular
/// extension condition relies on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    None = 0,
    Upper = 1,
    Lower = 2,
    Exact = 3,
}

impl Bound {
    #[inline]
    pub fn has_lower(self) -> bool {
        self as u8 & Bound::Lower as u8 != 0
    }

    fn from_bits(bits: u8) -> Bound {
        match bits & 3 {
            1 => Bound::Upper,
            2 => Bound::Lower,
            3 => Bound::Exact,
            _ => Bound::None,
        }
    }
}

/// Decoded snapshot of a table slot.
#[derive(Clone, Copy, Debug)]
pub struct TtEntry {
    pub score: i32,
    pub best_move: Option<ChessMove>,
    pub depth: i32,
    pub bound: Bound,
}

// A slot is two relaxed atomic words: the packed payload and the position key
// XORed with it. A torn read (payload from one store, key from another) fails
// the key check on probe, so no locking is needed.
//
// Payload layout, low to high:
//   [Score:16][Move:16][Depth:8][Bound:2]
struct Slot {
    key: AtomicU64,
    data: AtomicU64,
}

pub struct TranspositionTable {
    slots: Vec<Slot>,
}

impl TranspositionTable {
    pub fn new(size_mb: usize) -> Self {
        let mut tt = Self { slots: Vec::new() };
        tt.allocate_mb(size_mb);
        tt
    }

    /// Resize to the largest power-of-two slot count that fits in `size_mb`
    /// mebibytes, clearing every entry.
    pub fn allocate_mb(&mut self, size_mb: usize) {
        let bytes = size_mb * 1024 * 1024;
        let mut count = bytes / std::mem::size_of::<Slot>();
        if !count.is_power_of_two() {
            count = count.next_power_of_two() / 2;
        }
        count = count.max(1);

        let mut slots = Vec::with_capacity(count);
        slots.resize_with(count, || Slot {
            key: AtomicU64::new(0),
            data: AtomicU64::new(0),
        });
        self.slots = slots;
    }

    pub fn clear(&self) {
        for slot in &self.slots {
            slot.key.store(0, Ordering::Relaxed);
            slot.data.store(0, Ordering::Relaxed);
        }
    }

    #[inline]
    fn index(&self, hash: u64) -> usize {
        // Fastrange: maps the full 64-bit key space onto the table without a
        // modulo.
        ((hash as u128 * self.slots.len() as u128) >> 64) as usize
    }

    /// Look up `hash`. Returns a decoded snapshot on a key match, with the
    /// score still in table space (see [`score_from_tt`]).
    pub fn probe(&self, hash: u64) -> Option<TtEntry> {
        let slot = &self.slots[self.index(hash)];
        let data = slot.data.load(Ordering::Relaxed);
        let key = slot.key.load(Ordering::Relaxed);

        if data == 0 || key ^ data != hash {
            return None;
        }

        Some(TtEntry {
            score: (data as u16 as i16) as i32,
            best_move: decode_move((data >> 16) as u16),
            depth: ((data >> 32) as u8) as i32,
            bound: Bound::from_bits((data >> 40) as u8),
        })
    }

    /// Store an entry, replacing whatever occupied the slot. When the slot
    /// already describes this position and no new best move is known, the
    /// previous move survives the overwrite.
    pub fn store(&self, depth: i32, score: i32, bound: Bound, hash: u64, best_move: Option<ChessMove>) {
        let slot = &self.slots[self.index(hash)];

        let mut move_bits = best_move.map_or(0, encode_move);
        if best_move.is_none() {
            let old_data = slot.data.load(Ordering::Relaxed);
            let old_key = slot.key.load(Ordering::Relaxed);
            if old_key ^ old_data == hash {
                move_bits = (old_data >> 16) as u16;
            }
        }

        let data = (score as i16 as u16 as u64)
            | (move_bits as u64) << 16
            | (depth as u8 as u64) << 32
            | (bound as u64) << 40;

        slot.data.store(data, Ordering::Relaxed);
        slot.key.store(hash ^ data, Ordering::Relaxed);
    }

    /// Hint the slot for `hash` into cache ahead of a store.
    #[inline]
    pub fn prefetch(&self, hash: u64) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            let ptr = self.slots.as_ptr().add(self.index(hash)) as *const i8;
            _mm_prefetch(ptr, _MM_HINT_T0);
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = hash;
    }

    /// Permill-style fill estimate over the first thousand slots.
    pub fn hashfull(&self) -> usize {
        self.slots
            .iter()
            .take(1000)
            .filter(|slot| slot.data.load(Ordering::Relaxed) != 0)
            .count()
    }
}

/// Shift a mate or tablebase score into "plies from this node" space before
/// storing it.
#[inline]
pub fn score_to_tt(score: i32, ply: usize) -> i32 {
    if score >= VALUE_TB_WIN_IN_MAX_PLY {
        score + ply as i32
    } else if score <= VALUE_TB_LOSS_IN_MAX_PLY {
        score - ply as i32
    } else {
        score
    }
}

/// Undo [`score_to_tt`] relative to the probing node.
#[inline]
pub fn score_from_tt(score: i32, ply: usize) -> i32 {
    if score >= VALUE_TB_WIN_IN_MAX_PLY {
        score - ply as i32
    } else if score <= VALUE_TB_LOSS_IN_MAX_PLY {
        score + ply as i32
    } else {
        score
    }
}

// 16-bit move codec: source (6) | destination (6) | promotion tag (3).
// The all-zero pattern doubles as "no move"; a1a1 is never a legal move.

fn encode_move(m: ChessMove) -> u16 {
    let src = m.get_source().to_index() as u16;
    let dst = m.get_dest().to_index() as u16;
    let promo = match m.get_promotion() {
        Some(Piece::Knight) => 1,
        Some(Piece::Bishop) => 2,
        Some(Piece::Rook) => 3,
        Some(Piece::Queen) => 4,
        _ => 0,
    };
    (promo << 12) | (dst << 6) | src
}

fn decode_move(bits: u16) -> Option<ChessMove> {
    if bits == 0 {
        return None;
    }
    let src = unsafe {
        // SAFETY: bits & 0x3F is always in 0..64
        Square::new((bits & 0x3F) as u8)
    };
    let dst = unsafe {
        // SAFETY: (bits >> 6) & 0x3F is always in 0..64
        Square::new(((bits >> 6) & 0x3F) as u8)
    };
    let promo = match (bits >> 12) & 0x7 {
        1 => Some(Piece::Knight),
        2 => Some(Piece::Bishop),
        3 => Some(Piece::Rook),
        4 => Some(Piece::Queen),
        _ => None,
    };
    Some(ChessMove::new(src, dst, promo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn move_codec_round_trip() {
        for text in ["e2e4", "g1f3", "e7e8q", "a7a8n", "h2h1r", "b7b8b"] {
            let m = ChessMove::from_str(text).unwrap();
            assert_eq!(decode_move(encode_move(m)), Some(m), "{text}");
        }
    }

    #[test]
    fn sizes_round_down_to_powers_of_two() {
        let tt = TranspositionTable::new(3);
        assert!(tt.slots.len().is_power_of_two());
        assert!(tt.slots.len() * std::mem::size_of::<Slot>() <= 3 * 1024 * 1024);

        // Degenerate request still yields a usable table.
        let tiny = TranspositionTable::new(0);
        assert_eq!(tiny.slots.len(), 1);
    }

    #[test]
    fn mate_scores_are_ply_relative() {
        use crate::defs::{mate_in, mated_in};
        let stored = score_to_tt(mate_in(7), 3);
        assert_eq!(score_from_tt(stored, 3), mate_in(7));
        assert_eq!(score_from_tt(stored, 5), mate_in(9));

        let stored = score_to_tt(mated_in(4), 2);
        assert_eq!(score_from_tt(stored, 2), mated_in(4));
    }
}
