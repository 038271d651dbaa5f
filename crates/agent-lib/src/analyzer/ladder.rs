//! Scoring ladders
//!
//! Each dimension maps a statistic to a discrete score through an ordered
//! table of `(bound, score)` rungs. The first rung the value satisfies wins;
//! a value past every rung gets the ladder's floor score.

use crate::models::StorageType;

/// Direction in which a ladder's bounds are tested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Rung matches when `value < bound`
    Below,
    /// Rung matches when `value > bound`
    Above,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rung {
    pub bound: f64,
    pub score: f64,
}

const fn rung(bound: f64, score: f64) -> Rung {
    Rung { bound, score }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreLadder {
    pub direction: Bound,
    pub rungs: &'static [Rung],
    pub floor: f64,
}

impl ScoreLadder {
    pub fn score(&self, value: f64) -> f64 {
        self.rungs
            .iter()
            .find(|r| match self.direction {
                Bound::Below => value < r.bound,
                Bound::Above => value > r.bound,
            })
            .map_or(self.floor, |r| r.score)
    }
}

/// Average steal %
pub const CPU_STEAL: ScoreLadder = ScoreLadder {
    direction: Bound::Below,
    rungs: &[rung(3.0, 100.0), rung(8.0, 70.0), rung(15.0, 40.0)],
    floor: 0.0,
};

/// Average iowait %
pub const CPU_IOWAIT: ScoreLadder = ScoreLadder {
    direction: Bound::Below,
    rungs: &[rung(5.0, 100.0), rung(15.0, 70.0), rung(30.0, 40.0)],
    floor: 0.0,
};

/// Benchmark coefficient of variation
pub const CPU_STABILITY: ScoreLadder = ScoreLadder {
    direction: Bound::Below,
    rungs: &[rung(0.05, 100.0), rung(0.15, 70.0)],
    floor: 30.0,
};

/// Sequential write+fsync P95 (ms), SSD or unknown media
pub const IO_LATENCY_SSD: ScoreLadder = ScoreLadder {
    direction: Bound::Below,
    rungs: &[rung(20.0, 100.0), rung(50.0, 70.0), rung(100.0, 40.0)],
    floor: 0.0,
};

pub const IO_LATENCY_HDD: ScoreLadder = ScoreLadder {
    direction: Bound::Below,
    rungs: &[rung(50.0, 100.0), rung(100.0, 70.0), rung(200.0, 40.0)],
    floor: 0.0,
};

/// Random 4KB write P95 (ms), SSD or unknown media
pub const RANDOM_IO_SSD: ScoreLadder = ScoreLadder {
    direction: Bound::Below,
    rungs: &[rung(30.0, 100.0), rung(80.0, 70.0), rung(150.0, 40.0)],
    floor: 0.0,
};

pub const RANDOM_IO_HDD: ScoreLadder = ScoreLadder {
    direction: Bound::Below,
    rungs: &[rung(100.0, 100.0), rung(200.0, 70.0), rung(500.0, 40.0)],
    floor: 0.0,
};

/// Average disk busy %
pub const DISK_BUSY: ScoreLadder = ScoreLadder {
    direction: Bound::Below,
    rungs: &[rung(30.0, 100.0), rung(60.0, 70.0), rung(85.0, 40.0)],
    floor: 0.0,
};

/// Available memory %
pub const MEMORY: ScoreLadder = ScoreLadder {
    direction: Bound::Above,
    rungs: &[rung(90.0, 100.0), rung(80.0, 80.0)],
    floor: 50.0,
};

/// Absolute baseline deviation %
pub const BASELINE: ScoreLadder = ScoreLadder {
    direction: Bound::Below,
    rungs: &[rung(10.0, 100.0), rung(25.0, 70.0), rung(50.0, 40.0)],
    floor: 20.0,
};

pub fn io_latency(storage: StorageType) -> &'static ScoreLadder {
    match storage {
        StorageType::Hdd => &IO_LATENCY_HDD,
        StorageType::Ssd | StorageType::Unknown => &IO_LATENCY_SSD,
    }
}

pub fn random_io(storage: StorageType) -> &'static ScoreLadder {
    match storage {
        StorageType::Hdd => &RANDOM_IO_HDD,
        StorageType::Ssd | StorageType::Unknown => &RANDOM_IO_SSD,
    }
}
