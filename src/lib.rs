//! Exercisers for the RF front-end of SDRplay RSP receivers.
//!
//! The crate drives a receiver through the vendor control API, modelled by [`DeviceTrait`],
//! and ships two front ends on top of a shared [`Session`]: a gain-change cycler that waits
//! for every tuner gain update to be confirmed by the sample stream, and an I/Q recorder.
mod args;
pub use args::Args;

pub mod cli;

mod confirm;
pub use confirm::Confirmation;
pub use confirm::NotificationFlag;
pub use confirm::UpdateConfirmer;
pub use confirm::UpdateState;
pub use confirm::POLL_INTERVAL;
pub use confirm::UPDATE_TIMEOUT_POLLS;

mod cycle;
pub use cycle::CycleReport;
pub use cycle::GainChangeContext;
pub use cycle::GainCycle;

mod device;
pub use device::open;
pub use device::DeviceTrait;
pub use device::GenericDevice;

pub mod impls;

mod info;
pub use info::DeviceInfo;
pub use info::HwVersion;
pub use info::RspDuoMode;
pub use info::TunerSelect;

mod monitor;
pub use monitor::Progress;
pub use monitor::SequenceAnomaly;
pub use monitor::SequenceTracker;
pub use monitor::TimingProbe;

mod params;
pub use params::AgcControl;
pub use params::Bandwidth;
pub use params::DcOffsetTuner;
pub use params::DeviceParams;
pub use params::IfType;
pub use params::Mismatch;

mod range;
pub use range::Range;
pub use range::RangeItem;

mod recorder;
pub use recorder::samplerate_filename;
pub use recorder::IqRange;
pub use recorder::RecordSummary;
pub use recorder::Recorder;
pub use recorder::SAMPLERATE_TOKEN;

mod schedule;
pub use schedule::GainSchedule;
pub use schedule::GainSetting;

mod session;
pub use session::enumerate;
pub use session::Session;

mod stream;
pub use stream::Event;
pub use stream::StreamHandler;
pub use stream::StreamParams;
pub use stream::UpdateReason;

use std::str::FromStr;
use thiserror::Error;

/// API version the session expects from the control library.
pub const API_VERSION: f32 = 3.15;

/// Error codes reported by the control library.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("generic failure")]
    Fail,
    #[error("invalid parameter")]
    InvalidParam,
    #[error("parameter out of range")]
    OutOfRange,
    #[error("gain update error")]
    GainUpdateError,
    #[error("RF frequency update error")]
    RfUpdateError,
    #[error("sample rate update error")]
    FsUpdateError,
    #[error("hardware error")]
    HwError,
    #[error("aliasing error")]
    AliasingError,
    #[error("already initialised")]
    AlreadyInitialised,
    #[error("not initialised")]
    NotInitialised,
    #[error("not enabled")]
    NotEnabled,
    #[error("hardware version error")]
    HwVerError,
    #[error("out of memory")]
    OutOfMemory,
    #[error("service not responding")]
    ServiceNotResponding,
    #[error("start pending")]
    StartPending,
    #[error("stop pending")]
    StopPending,
    #[error("invalid mode")]
    InvalidMode,
    #[error("device API not locked")]
    NotLocked,
    #[error("device not selected")]
    NotSelected,
}

/// Crate Error
#[derive(Debug, Error)]
pub enum Error {
    #[error("{call}() failed: {code}")]
    Api { call: &'static str, code: ApiError },
    #[error("API version mismatch - expected={expected:.2} found={found:.2}")]
    VersionMismatch { expected: f32, found: f32 },
    #[error("RSP not found or not available")]
    NotFound,
    #[error("RSPduo single tuner mode not available")]
    SingleTunerUnavailable,
    #[error("device rejected the configuration ({} unexpected changes)", .0.len())]
    ConfigurationRejected(Vec<Mismatch>),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Value Error")]
    ValueError,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Failure of the control library call `call`.
    pub fn api(call: &'static str, code: ApiError) -> Self {
        Error::Api { call, code }
    }
}

/// Drivers that can back a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    #[cfg(feature = "dummy")]
    Dummy,
}

impl FromStr for Driver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        #[cfg(feature = "dummy")]
        if s == "dummy" || s == "sim" {
            return Ok(Driver::Dummy);
        }
        Err(Error::ValueError)
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            #[cfg(feature = "dummy")]
            Driver::Dummy => write!(f, "dummy"),
        }
    }
}
