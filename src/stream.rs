use crate::TunerSelect;

/// Per-delivery parameters passed along with a block of samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamParams {
    /// Sequence number of the first sample in the block, wraps at 2^32.
    pub first_sample_num: u32,
    /// A pending gain reduction change took effect with this block.
    pub gr_changed: bool,
    /// A pending RF frequency change took effect with this block.
    pub rf_changed: bool,
    /// A pending sample rate change took effect with this block.
    pub fs_changed: bool,
    /// Number of samples in the block.
    pub num_samples: u32,
}

/// Asynchronous device events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// A gain update was applied by the tuner.
    GainChange {
        gain_reduction: i32,
        lna_gain_reduction: i32,
        current_gain: f64,
    },
    PowerOverloadDetected,
    PowerOverloadCorrected,
    DeviceRemoved,
    RspDuoModeChange,
}

/// Which sub-system of the device should apply its pending parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    DevFs,
    TunerGr,
    TunerFrf,
    TunerBwType,
    TunerIfType,
    TunerDcOffset,
    CtrlDecimation,
    CtrlAgc,
    CtrlDcOffsetIqImbalance,
}

/// Receives samples and events from a streaming device.
///
/// Both methods are called from the driver's delivery thread, concurrently with whatever the
/// thread that started the stream is doing. A handler is the only state shared between the
/// two, so it has to do its own synchronization.
pub trait StreamHandler: Send + Sync {
    /// A block of `params.num_samples` samples, I and Q in separate buffers.
    ///
    /// `reset` is set when the driver restarted the stream, e.g. after a sample rate change.
    fn samples(&self, xi: &[i16], xq: &[i16], params: &StreamParams, reset: bool);

    /// A device event for `tuner`.
    fn event(&self, event: Event, tuner: TunerSelect) {
        log::trace!("event {event:?} on tuner {tuner}");
    }
}
