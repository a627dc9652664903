use num_complex::Complex;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::Instant;

use crate::Error;
use crate::SequenceTracker;
use crate::StreamHandler;
use crate::StreamParams;

/// Placeholder in the output file name for the measured sample rate in kHz.
pub const SAMPLERATE_TOKEN: &str = "SAMPLERATE";

/// Replace the first [`SAMPLERATE_TOKEN`] in `path` with `khz`, if there is one.
pub fn samplerate_filename(path: &str, khz: u64) -> Option<String> {
    path.contains(SAMPLERATE_TOKEN)
        .then(|| path.replacen(SAMPLERATE_TOKEN, &khz.to_string(), 1))
}

/// Smallest and largest I and Q values seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IqRange {
    pub min: Complex<i16>,
    pub max: Complex<i16>,
}

impl IqRange {
    fn of(xi: &[i16], xq: &[i16]) -> Option<Self> {
        let mut samples = xi.iter().zip(xq.iter()).map(|(i, q)| Complex::new(*i, *q));
        let first = samples.next()?;
        Some(samples.fold(
            IqRange {
                min: first,
                max: first,
            },
            |r, s| r.include(s),
        ))
    }

    fn include(self, s: Complex<i16>) -> Self {
        IqRange {
            min: Complex::new(self.min.re.min(s.re), self.min.im.min(s.im)),
            max: Complex::new(self.max.re.max(s.re), self.max.im.max(s.im)),
        }
    }

    fn merge(self, other: IqRange) -> Self {
        self.include(other.min).include(other.max)
    }
}

impl std::fmt::Display for IqRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "I_range=[{},{}] Q_range=[{},{}]",
            self.min.re, self.max.re, self.min.im, self.max.im
        )
    }
}

#[derive(Debug, Default)]
struct Stats {
    earliest: Option<Instant>,
    latest: Option<Instant>,
    range: Option<IqRange>,
}

/// Outcome of a recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordSummary {
    pub total_samples: u64,
    /// Time between the first and the last delivery.
    pub elapsed: Duration,
    pub range: Option<IqRange>,
}

impl RecordSummary {
    /// Samples per second, estimated from the delivery times.
    pub fn actual_sample_rate(&self) -> Option<f64> {
        if self.elapsed.is_zero() {
            return None;
        }
        Some(self.total_samples as f64 / self.elapsed.as_secs_f64())
    }

    pub fn rounded_sample_rate_khz(&self) -> Option<u64> {
        self.actual_sample_rate()
            .map(|r| (r / 1000.0 + 0.5).floor() as u64)
    }
}

impl std::fmt::Display for RecordSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "total_samples={}", self.total_samples)?;
        match (self.actual_sample_rate(), self.rounded_sample_rate_khz()) {
            (Some(rate), Some(khz)) => write!(
                f,
                " actual_sample_rate={rate:.0} rounded_sample_rate_kHz={khz}"
            )?,
            _ => write!(f, " actual_sample_rate=n/a")?,
        }
        if let Some(range) = self.range {
            write!(f, "\n{range}")?;
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Stream handler that writes interleaved 16 bit I/Q samples to a file and keeps
/// statistics about the stream.
pub struct Recorder {
    sequence: SequenceTracker,
    stats: Mutex<Stats>,
    output: Mutex<Option<BufWriter<File>>>,
    path: Option<PathBuf>,
}

impl Recorder {
    /// Record statistics only.
    pub fn new() -> Self {
        Self {
            sequence: SequenceTracker::new(),
            stats: Mutex::new(Stats::default()),
            output: Mutex::new(None),
            path: None,
        }
    }

    /// Record to `path`, truncating it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            log::error!("open({}) for writing failed: {e}", path.display());
            e
        })?;
        Ok(Self {
            output: Mutex::new(Some(BufWriter::new(file))),
            path: Some(path.to_path_buf()),
            ..Self::new()
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sequence(&self) -> &SequenceTracker {
        &self.sequence
    }

    fn write(&self, xi: &[i16], xq: &[i16]) {
        let mut output = lock(&self.output);
        let Some(w) = output.as_mut() else {
            return;
        };
        let mut buf = Vec::with_capacity(xi.len() * 4);
        for (i, q) in xi.iter().zip(xq.iter()) {
            buf.extend_from_slice(&i.to_le_bytes());
            buf.extend_from_slice(&q.to_le_bytes());
        }
        if let Err(e) = w.write_all(&buf) {
            log::error!("write() failed: {e}");
        }
    }

    /// Flush and close the output, and summarize the recording.
    ///
    /// Call after streaming stopped. Close failures are logged.
    pub fn finish(&self) -> RecordSummary {
        if let Some(mut w) = lock(&self.output).take() {
            if let Err(e) = w.flush() {
                log::error!("close() failed: {e}");
            }
        }
        let stats = lock(&self.stats);
        let elapsed = match (stats.earliest, stats.latest) {
            (Some(a), Some(b)) => b.saturating_duration_since(a),
            _ => Duration::ZERO,
        };
        RecordSummary {
            total_samples: self.sequence.total_samples(),
            elapsed,
            range: stats.range,
        }
    }

    /// Put the measured rate into the output file name. Returns the new name, if renamed.
    ///
    /// A failed rename is logged and the recording keeps its name.
    pub fn rename_with_rate(&self, summary: &RecordSummary) -> Option<PathBuf> {
        let path = self.path.as_ref()?;
        let khz = summary.rounded_sample_rate_khz()?;
        let renamed = PathBuf::from(samplerate_filename(path.to_str()?, khz)?);
        match std::fs::rename(path, &renamed) {
            Ok(()) => Some(renamed),
            Err(e) => {
                log::error!(
                    "rename({}, {}) failed: {e}",
                    path.display(),
                    renamed.display()
                );
                None
            }
        }
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamHandler for Recorder {
    fn samples(&self, xi: &[i16], xq: &[i16], params: &StreamParams, reset: bool) {
        let now = Instant::now();
        {
            let mut stats = lock(&self.stats);
            stats.earliest.get_or_insert(now);
            stats.latest = Some(now);
            if let Some(r) = IqRange::of(xi, xq) {
                stats.range = Some(stats.range.map_or(r, |s| s.merge(r)));
            }
        }
        if reset {
            log::warn!("stream reset at sample {}", params.first_sample_num);
        }
        self.sequence
            .track(params.first_sample_num, params.num_samples);
        self.write(xi, xq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("rsp-tools-{}-{nanos}-{name}", std::process::id()))
    }

    fn block(first: u32, xi: &[i16], xq: &[i16]) -> StreamParams {
        assert_eq!(xi.len(), xq.len());
        StreamParams {
            first_sample_num: first,
            num_samples: xi.len() as u32,
            ..Default::default()
        }
    }

    #[test]
    fn filename_token() {
        assert_eq!(
            samplerate_filename("/tmp/rec-SAMPLERATE.iq", 2000).as_deref(),
            Some("/tmp/rec-2000.iq")
        );
        assert_eq!(samplerate_filename("/tmp/rec.iq", 2000), None);
        assert_eq!(
            samplerate_filename("SAMPLERATE-SAMPLERATE", 62).as_deref(),
            Some("62-SAMPLERATE")
        );
    }
    #[test]
    fn writes_interleaved_little_endian() {
        let path = temp_path("out.iq");
        let rec = Recorder::create(&path).unwrap();
        let (xi, xq) = ([1i16, -2], [3i16, 0x1234]);
        rec.samples(&xi, &xq, &block(0, &xi, &xq), false);
        let (xi, xq) = ([-32768i16], [32767i16]);
        rec.samples(&xi, &xq, &block(2, &xi, &xq), false);
        let summary = rec.finish();
        assert_eq!(summary.total_samples, 3);

        let bytes = std::fs::read(&path).unwrap();
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![1, 3, -2, 0x1234, -32768, 32767]);
        std::fs::remove_file(&path).unwrap();
    }
    #[test]
    fn create_truncates() {
        let path = temp_path("trunc.iq");
        std::fs::write(&path, [0u8; 64]).unwrap();
        let rec = Recorder::create(&path).unwrap();
        rec.finish();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        std::fs::remove_file(&path).unwrap();
    }
    #[test]
    fn unwritable_output_is_an_error() {
        let path = temp_path("missing-dir").join("out.iq");
        assert!(matches!(Recorder::create(path), Err(Error::Io(_))));
    }
    #[test]
    fn tracks_iq_range() {
        let rec = Recorder::new();
        let (xi, xq) = ([5i16, -7, 3], [0i16, 9, -1]);
        rec.samples(&xi, &xq, &block(0, &xi, &xq), false);
        let (xi, xq) = ([100i16], [-50i16]);
        rec.samples(&xi, &xq, &block(3, &xi, &xq), false);
        let range = rec.finish().range.unwrap();
        assert_eq!(range.to_string(), "I_range=[-7,100] Q_range=[-50,9]");
    }
    #[test]
    fn rate_estimate() {
        let s = RecordSummary {
            total_samples: 2_000_400,
            elapsed: Duration::from_secs(1),
            range: None,
        };
        assert_eq!(s.actual_sample_rate(), Some(2_000_400.0));
        assert_eq!(s.rounded_sample_rate_khz(), Some(2000));
        assert_eq!(
            s.to_string(),
            "total_samples=2000400 actual_sample_rate=2000400 rounded_sample_rate_kHz=2000"
        );
        let s = RecordSummary {
            total_samples: 1_999_500,
            ..s
        };
        assert_eq!(s.rounded_sample_rate_khz(), Some(2000));

        let empty = RecordSummary {
            total_samples: 0,
            elapsed: Duration::ZERO,
            range: None,
        };
        assert_eq!(empty.rounded_sample_rate_khz(), None);
    }
    #[test]
    fn renames_with_measured_rate() {
        let path = temp_path("rec-SAMPLERATE.iq");
        let rec = Recorder::create(&path).unwrap();
        rec.finish();
        let summary = RecordSummary {
            total_samples: 6_000_000,
            elapsed: Duration::from_secs(3),
            range: None,
        };
        let renamed = rec.rename_with_rate(&summary).unwrap();
        assert!(renamed.to_str().unwrap().ends_with("rec-2000.iq"));
        assert!(renamed.exists());
        assert!(!path.exists());
        std::fs::remove_file(renamed).unwrap();
    }
}
