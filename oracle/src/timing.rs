// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Process-wide record of time spent in oracle calls, for reporting.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use itertools::Itertools;
use lazy_static::lazy_static;

use crate::basics::Decision;

/// The kind of event being timed.
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimeType {
    Valid,
    Invalid,
    Unknown,
}

impl TimeType {
    fn name(&self) -> &'static str {
        match self {
            TimeType::Valid => "oracle (valid)",
            TimeType::Invalid => "oracle (invalid)",
            TimeType::Unknown => "oracle (unknown)",
        }
    }

    /// Classify an oracle decision.
    pub fn of(decision: &Decision) -> Self {
        match decision {
            Decision::Valid => TimeType::Valid,
            Decision::Invalid(_) => TimeType::Invalid,
            Decision::Unknown(_) => TimeType::Unknown,
        }
    }
}

/// A single timing event.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct TimeInfo {
    typ: TimeType,
    dur: Duration,
}

/// A record of timing measurements.
///
/// `Sync` to support concurrent time recording.
pub struct Timings(Mutex<Vec<TimeInfo>>, Instant);

impl Timings {
    #[allow(clippy::new_without_default)]
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Timings(Mutex::new(vec![]), Instant::now())
    }

    /// Hack to make sure start time is initialized
    pub fn init(&self) {}

    /// Record a timing elapsed since `start`.
    pub fn elapsed(&self, typ: TimeType, start: Instant) {
        let dur = start.elapsed();
        self.0.lock().unwrap().push(TimeInfo { typ, dur });
    }

    /// The number of recorded events of each type, in a fixed order.
    pub fn counts(&self) -> Vec<(TimeType, usize)> {
        let times = self.0.lock().unwrap();
        [TimeType::Valid, TimeType::Invalid, TimeType::Unknown]
            .into_iter()
            .map(|typ| (typ, times.iter().filter(|info| info.typ == typ).count()))
            .collect()
    }

    /// Print a full timing report to stdout.
    pub fn report(&self) {
        if cfg!(debug_assertions) {
            eprintln!("warning: this is a debug build, non-oracle time will be worse");
        }
        let total_time = self.1.elapsed().as_secs_f64();
        println!("{:<22}: {total_time:.1}s", "total");

        let times = self.0.lock().unwrap().clone();
        let count = times.len();
        let oracle_total = times
            .iter()
            .map(|info| info.dur)
            .sum::<Duration>()
            .as_secs_f64();
        println!("  {:<20}: {:.1}s", "non-oracle", total_time - oracle_total);
        println!(
            "  {:<20}: {oracle_total:.1}s {count:>4} calls",
            "oracle total",
        );

        let totals = times
            .iter()
            .into_grouping_map_by(|info| info.typ)
            .fold((Duration::ZERO, 0), |(dur, count), _key, t| {
                (dur + t.dur, count + 1)
            });
        for typ in [TimeType::Valid, TimeType::Invalid, TimeType::Unknown] {
            let (time, count) = totals.get(&typ).unwrap_or(&(Duration::ZERO, 0));
            if *count > 0 {
                println!(
                    "    {:<18}: {:.1}s {count:>4} calls ",
                    typ.name(),
                    time.as_secs_f64()
                );
            }
        }
    }
}

lazy_static! {
    /// The process-wide timing table.
    pub static ref TIMES: Timings = Timings::new();
}

/// Start timing an event.
pub fn start() -> Instant {
    Instant::now()
}

/// Record an event that started at `start`.
pub fn elapsed(typ: TimeType, start: Instant) {
    TIMES.elapsed(typ, start)
}

/// Make sure the total time is measured from program start.
pub fn init() {
    TIMES.init()
}

/// Print the timing report.
pub fn report() {
    TIMES.report()
}
