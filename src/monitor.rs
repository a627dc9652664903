use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use crate::StreamHandler;
use crate::StreamParams;

/// Gap in the sample sequence numbers of two consecutive deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceAnomaly {
    /// First sample number that was expected.
    pub expected: u32,
    /// First sample number that was delivered.
    pub actual: u32,
}

impl SequenceAnomaly {
    /// Samples missing between the two deliveries, modulo 2^32.
    pub fn dropped(&self) -> u32 {
        self.actual.wrapping_sub(self.expected)
    }
}

impl std::fmt::Display for SequenceAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "jump in sample sequence number - from {} to {} ({} samples dropped)",
            self.expected,
            self.actual,
            self.dropped()
        )
    }
}

/// Tracks sample sequence numbers across deliveries. Purely diagnostic.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    next: Mutex<Option<u32>>,
    total: AtomicU64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a delivery of `num_samples` samples starting at `first_sample_num`.
    ///
    /// Returns the anomaly, if the delivery doesn't continue where the previous one ended.
    /// The anomaly is also logged.
    pub fn track(&self, first_sample_num: u32, num_samples: u32) -> Option<SequenceAnomaly> {
        self.total.fetch_add(num_samples as u64, Ordering::Relaxed);
        let mut next = match self.next.lock() {
            Ok(n) => n,
            Err(poisoned) => poisoned.into_inner(),
        };
        let anomaly = match *next {
            Some(expected) if expected != first_sample_num => Some(SequenceAnomaly {
                expected,
                actual: first_sample_num,
            }),
            _ => None,
        };
        *next = Some(first_sample_num.wrapping_add(num_samples));
        if let Some(a) = anomaly {
            log::warn!("{a}");
        }
        anomaly
    }

    /// Samples delivered so far.
    pub fn total_samples(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// First sample number expected with the next delivery.
    pub fn next_expected(&self) -> Option<u32> {
        match self.next.lock() {
            Ok(n) => *n,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Logs a progress line every `every` changes.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    every: u32,
}

impl Progress {
    /// Progress interval of the gain change loop.
    pub const DEFAULT_EVERY: u32 = 1000;

    pub fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
        }
    }

    /// Returns true, and logs, if change `n` is due for a progress line.
    pub fn change(&self, n: u32) -> bool {
        if n % self.every == 0 {
            log::info!("gain change #{n}");
            true
        } else {
            false
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EVERY)
    }
}

#[derive(Debug, Default)]
struct TimingState {
    previous: Option<Instant>,
    callbacks: u64,
    slow: u64,
}

/// Stream handler that only measures the time between deliveries.
///
/// Gaps above the threshold are logged as `<callback count> <samples> <gap in ns>`.
#[derive(Debug)]
pub struct TimingProbe {
    threshold: Duration,
    state: Mutex<TimingState>,
}

impl TimingProbe {
    pub const DEFAULT_THRESHOLD: Duration = Duration::from_millis(5);

    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            state: Mutex::new(TimingState::default()),
        }
    }

    /// Record a delivery at `now`. Returns the gap if it exceeded the threshold.
    pub fn tick(&self, now: Instant, num_samples: u32) -> Option<Duration> {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slow = state
            .previous
            .map(|p| now.saturating_duration_since(p))
            .filter(|gap| *gap > self.threshold);
        if let Some(gap) = slow {
            log::warn!("{} {} {}", state.callbacks, num_samples, gap.as_nanos());
            state.slow += 1;
        }
        state.previous = Some(now);
        state.callbacks += 1;
        slow
    }

    /// Deliveries seen, and how many of them came late.
    pub fn counts(&self) -> (u64, u64) {
        match self.state.lock() {
            Ok(s) => (s.callbacks, s.slow),
            Err(poisoned) => {
                let s = poisoned.into_inner();
                (s.callbacks, s.slow)
            }
        }
    }
}

impl Default for TimingProbe {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl StreamHandler for TimingProbe {
    fn samples(&self, _xi: &[i16], _xq: &[i16], params: &StreamParams, _reset: bool) {
        self.tick(Instant::now(), params.num_samples);
    }
}
