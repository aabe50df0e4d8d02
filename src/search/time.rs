//! Wall-clock budgeting.
//!
//! Converts the clock situation handed over by `go` into a soft and a hard
//! bound. The soft bound (`optimum`) is what the iterative deepening driver
//! aims for and adjusts as the search wobbles; the hard bound (`maximum`) is
//! enforced inside the search and is never exceeded.

/// Millisecond budgets for one search. Zero in both fields means "no time
/// limit".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Time {
    pub optimum: u64,
    pub maximum: u64,
}

/// Compute budgets from the remaining clock, the increment, the number of
/// moves to the next time control (0 when unknown) and the game ply.
///
/// `overhead` is subtracted per expected move to absorb I/O latency.
pub fn optimum_time(remaining: u64, inc: u64, movestogo: u64, overhead: u64, ply: u32) -> Time {
    let remaining = remaining as f64;
    let inc = inc as f64;
    let overhead = overhead as f64;
    let ply = ply as f64;

    // Horizon: either the real moves-to-go, or an estimate that shrinks as
    // the game progresses.
    let mtg = if movestogo > 0 {
        movestogo as f64
    } else {
        (50.0 - 0.4 * ply).clamp(20.0, 50.0)
    };

    let pool = (remaining + inc * (mtg - 1.0) - overhead * mtg).max(1.0);

    let (optimum, maximum) = if movestogo == 0 {
        // Sudden death: spend a growing share early, trailing off later.
        let share = (0.015 + 0.01 * (ply + 3.0).powf(0.45)).min(0.20);
        let opt = share * pool;
        (opt, (5.5 * opt).min(0.8 * remaining - overhead))
    } else {
        // Classical: an even split with some room to run over.
        let opt = (0.90 + ply / 120.0).min(0.90) * pool / mtg;
        (opt, (1.5 + 0.12 * mtg) * opt)
    };

    let optimum = optimum.max(10.0);
    let maximum = maximum.max(optimum).min((remaining - overhead).max(10.0));

    Time {
        optimum: optimum as u64,
        maximum: maximum as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maximum_never_below_optimum() {
        for remaining in [50u64, 1000, 60_000, 300_000] {
            for inc in [0u64, 100, 2000] {
                for mtg in [0u64, 1, 10, 40] {
                    for ply in [0u32, 20, 90] {
                        let t = optimum_time(remaining, inc, mtg, 30, ply);
                        assert!(t.optimum <= t.maximum, "{remaining} {inc} {mtg} {ply}: {t:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn budgets_fit_inside_the_clock() {
        let t = optimum_time(10_000, 0, 0, 30, 10);
        assert!(t.maximum < 10_000);
        assert!(t.optimum > 0);
    }

    #[test]
    fn short_clocks_still_get_a_budget() {
        let t = optimum_time(80, 0, 0, 30, 40);
        assert!(t.optimum >= 10);
        assert!(t.maximum >= t.optimum);
    }
}
