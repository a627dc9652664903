//! Simulated RSP for CI and for trying the tools without hardware.
//!
//! Behaves like the control library in the ways the tools depend on: settings outside of the
//! hardware limits are silently replaced by the closest supported value on init, samples are
//! delivered from a separate thread at the configured rate, and a requested gain update is
//! reported with the next block of samples.
use serde::Deserialize;
use serde_with::serde_as;
use serde_with::DisplayFromStr;
use std::f64::consts::TAU;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

use crate::ApiError;
use crate::Args;
use crate::DeviceInfo;
use crate::DeviceParams;
use crate::DeviceTrait;
use crate::Driver;
use crate::Error;
use crate::Event;
use crate::GainSetting;
use crate::HwVersion;
use crate::Range;
use crate::RangeItem;
use crate::RspDuoMode;
use crate::StreamHandler;
use crate::StreamParams;
use crate::TunerSelect;
use crate::UpdateReason;
use crate::API_VERSION;

const DEFAULT_SERIAL: &str = "dummy-0";
const DEFAULT_BLOCK_SIZE: u32 = 1008;
/// Nominal gain reduction of one LNA state step.
const LNA_STEP_DB: i32 = 6;

/// Options, passed as [`Args`] next to `driver=dummy`.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
struct DummyOptions {
    /// Serial number of the simulated device.
    serial: Option<String>,
    /// Hardware variant, by name or id.
    #[serde_as(as = "Option<DisplayFromStr>")]
    hw_ver: Option<HwVersion>,
    /// Samples per delivery.
    #[serde_as(as = "Option<DisplayFromStr>")]
    block_size: Option<u32>,
    /// Skip the sample numbers of every n-th block.
    #[serde_as(as = "Option<DisplayFromStr>")]
    drop_every: Option<u32>,
    /// Report gain updates in the stream. Defaults to true.
    #[serde_as(as = "Option<DisplayFromStr>")]
    confirm: Option<bool>,
    /// Reported API version.
    #[serde_as(as = "Option<DisplayFromStr>")]
    api_version: Option<f32>,
    /// Sequence number of the first sample.
    #[serde_as(as = "Option<DisplayFromStr>")]
    first_sample_num: Option<u32>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Dummy Device
#[derive(Clone)]
pub struct Dummy {
    inner: Arc<DummyInner>,
}

struct DummyInner {
    device: DeviceInfo,
    api_version: f32,
    block_size: u32,
    drop_every: Option<u32>,
    confirm: bool,
    first_sample_num: u32,
    state: Mutex<DummyState>,
}

#[derive(Default)]
struct DummyState {
    opened: bool,
    locked: bool,
    debug: bool,
    selected: Option<DeviceInfo>,
    params: DeviceParams,
    initialized: bool,
    stream: Option<Stream>,
}

/// A running delivery thread.
struct Stream {
    shared: Arc<Shared>,
    thread: JoinHandle<()>,
}

impl Stream {
    fn stop(self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if self.thread.join().is_err() {
            log::error!("dummy delivery thread panicked");
        }
    }
}

/// State shared with the delivery thread.
struct Shared {
    stop: AtomicBool,
    /// Gain update waiting to be reported.
    pending: Mutex<Option<GainSetting>>,
    gain: Mutex<GainSetting>,
}

impl Dummy {
    /// Create a Dummy Device
    pub fn new(args: &Args) -> Result<Self, Error> {
        let options: DummyOptions = args.deserialize()?;
        let hw_ver = options.hw_ver.unwrap_or_default();
        let device = if hw_ver == HwVersion::RspDuo {
            DeviceInfo {
                serial: options.serial.unwrap_or_else(|| DEFAULT_SERIAL.to_string()),
                hw_ver,
                tuner: TunerSelect::Both,
                rsp_duo_mode: RspDuoMode::SINGLE_TUNER
                    | RspDuoMode::DUAL_TUNER
                    | RspDuoMode::MASTER,
                rsp_duo_sample_freq: 0.0,
                valid: true,
            }
        } else {
            DeviceInfo {
                serial: options.serial.unwrap_or_else(|| DEFAULT_SERIAL.to_string()),
                hw_ver,
                tuner: TunerSelect::A,
                valid: true,
                ..Default::default()
            }
        };
        let block_size = options.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
        if block_size == 0 {
            log::warn!("dummy block size must not be zero");
            return Err(Error::ValueError);
        }
        Ok(Self {
            inner: Arc::new(DummyInner {
                device,
                api_version: options.api_version.unwrap_or(API_VERSION),
                block_size,
                drop_every: options.drop_every.filter(|n| *n > 0),
                confirm: options.confirm.unwrap_or(true),
                first_sample_num: options.first_sample_num.unwrap_or(0),
                state: Mutex::new(DummyState::default()),
            }),
        })
    }

    /// RF frequencies the simulated tuner can be set to.
    pub fn frequency_range() -> Range {
        Range::new(vec![RangeItem::Interval(1e3, 2e9)])
    }

    /// ADC sample rates.
    pub fn sample_rate_range() -> Range {
        Range::new(vec![RangeItem::Interval(2e6, 10.66e6)])
    }

    /// Gain reductions in dB.
    pub fn gain_reduction_range() -> Range {
        Range::new(vec![RangeItem::Step(20.0, 59.0, 1.0)])
    }

    /// LNA states of the simulated hardware variant.
    pub fn lna_state_range(&self) -> Range {
        Range::new(vec![RangeItem::Step(
            0.0,
            self.inner.device.hw_ver.max_lna_state() as f64,
            1.0,
        )])
    }

    /// Decimation factors.
    pub fn decimation_range() -> Range {
        Range::new(
            [1.0, 2.0, 4.0, 8.0, 16.0, 32.0]
                .into_iter()
                .map(RangeItem::Value)
                .collect(),
        )
    }

    fn normalize_gain(&self, params: &mut DeviceParams) {
        let closest = |r: Range, v: f64| r.closest(v).unwrap_or(v);
        params.gain_reduction =
            closest(Self::gain_reduction_range(), params.gain_reduction as f64) as i32;
        params.lna_state = closest(self.lna_state_range(), params.lna_state as f64) as u8;
    }

    /// What the hardware makes of `params`.
    fn normalize(&self, params: &mut DeviceParams) {
        let closest = |r: Range, v: f64| r.closest(v).unwrap_or(v);
        params.rf_frequency = closest(Self::frequency_range(), params.rf_frequency);
        params.sample_rate = closest(Self::sample_rate_range(), params.sample_rate);
        if params.decimation_enable {
            params.decimation_factor =
                closest(Self::decimation_range(), params.decimation_factor as f64) as u8;
        } else {
            params.decimation_factor = 1;
        }
        self.normalize_gain(params);
    }

    fn state(&self) -> MutexGuard<'_, DummyState> {
        lock(&self.inner.state)
    }

    fn spawn(&self, params: &DeviceParams, handler: Arc<dyn StreamHandler>) -> Result<Stream, Error> {
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            pending: Mutex::new(None),
            gain: Mutex::new(GainSetting {
                gain_reduction: params.gain_reduction,
                lna_state: params.lna_state,
            }),
        });
        let mut delivery = Delivery {
            shared: shared.clone(),
            handler,
            block_size: self.inner.block_size,
            drop_every: self.inner.drop_every,
            output_rate: params.sample_rate / params.decimation_factor.max(1) as f64,
            first_sample_num: self.inner.first_sample_num,
            phase: 0.0,
        };
        let thread = thread::Builder::new()
            .name("dummy-rx".to_string())
            .spawn(move || delivery.run())?;
        Ok(Stream { shared, thread })
    }
}

/// The delivery thread.
struct Delivery {
    shared: Arc<Shared>,
    handler: Arc<dyn StreamHandler>,
    block_size: u32,
    drop_every: Option<u32>,
    output_rate: f64,
    first_sample_num: u32,
    phase: f64,
}

impl Delivery {
    fn run(&mut self) {
        let n = self.block_size as usize;
        let period = Duration::from_secs_f64(n as f64 / self.output_rate);
        let mut xi = vec![0i16; n];
        let mut xq = vec![0i16; n];
        let mut deadline = Instant::now();
        let mut block = 0u64;
        log::debug!("dummy stream: {n} samples every {period:?}");

        while !self.shared.stop.load(Ordering::SeqCst) {
            deadline += period;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }

            block += 1;
            if self.drop_every.is_some_and(|d| block % d as u64 == 0) {
                self.first_sample_num = self.first_sample_num.wrapping_add(self.block_size);
            }

            let applied = lock(&self.shared.pending).take();
            if let Some(g) = applied {
                *lock(&self.shared.gain) = g;
            }
            let gain = *lock(&self.shared.gain);
            self.tone(&mut xi, &mut xq, gain);

            let params = StreamParams {
                first_sample_num: self.first_sample_num,
                gr_changed: applied.is_some(),
                num_samples: self.block_size,
                ..Default::default()
            };
            self.handler.samples(&xi, &xq, &params, false);
            if let Some(g) = applied {
                let lna_gain_reduction = g.lna_state as i32 * LNA_STEP_DB;
                self.handler.event(
                    Event::GainChange {
                        gain_reduction: g.gain_reduction,
                        lna_gain_reduction,
                        current_gain: -(g.gain_reduction + lna_gain_reduction) as f64,
                    },
                    TunerSelect::A,
                );
            }
            self.first_sample_num = self.first_sample_num.wrapping_add(self.block_size);
        }
        log::debug!("dummy stream stopped after {block} blocks");
    }

    /// A tone at 1/100 of the output rate, attenuated by the gain reduction.
    fn tone(&mut self, xi: &mut [i16], xq: &mut [i16], gain: GainSetting) {
        let attenuation = (gain.gain_reduction - 20 + gain.lna_state as i32 * LNA_STEP_DB) as f64;
        let amplitude = 16384.0 * 10f64.powf(-attenuation / 20.0);
        for (i, q) in xi.iter_mut().zip(xq.iter_mut()) {
            *i = (amplitude * self.phase.cos()) as i16;
            *q = (amplitude * self.phase.sin()) as i16;
            self.phase = (self.phase + TAU / 100.0) % TAU;
        }
    }
}

impl Drop for DummyInner {
    fn drop(&mut self) {
        if let Some(stream) = lock(&self.state).stream.take() {
            stream.stop();
        }
    }
}

impl DeviceTrait for Dummy {
    fn driver(&self) -> Driver {
        Driver::Dummy
    }

    fn open(&self) -> Result<(), Error> {
        let mut s = self.state();
        if s.opened {
            return Err(Error::api("Open", ApiError::AlreadyInitialised));
        }
        s.opened = true;
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        let stream = {
            let mut s = self.state();
            if !s.opened {
                return Err(Error::api("Close", ApiError::NotInitialised));
            }
            std::mem::take(&mut *s).stream
        };
        if let Some(stream) = stream {
            stream.stop();
        }
        Ok(())
    }

    fn api_version(&self) -> Result<f32, Error> {
        if !self.state().opened {
            return Err(Error::api("ApiVersion", ApiError::ServiceNotResponding));
        }
        Ok(self.inner.api_version)
    }

    fn lock_device_api(&self) -> Result<(), Error> {
        let mut s = self.state();
        if !s.opened {
            return Err(Error::api("LockDeviceApi", ApiError::ServiceNotResponding));
        }
        s.locked = true;
        Ok(())
    }

    fn unlock_device_api(&self) -> Result<(), Error> {
        let mut s = self.state();
        if !s.locked {
            return Err(Error::api("UnlockDeviceApi", ApiError::NotLocked));
        }
        s.locked = false;
        Ok(())
    }

    fn debug_enable(&self, enable: bool) -> Result<(), Error> {
        let mut s = self.state();
        if s.selected.is_none() {
            return Err(Error::api("DebugEnable", ApiError::NotSelected));
        }
        s.debug = enable;
        log::debug!("dummy API debug output: {enable}");
        Ok(())
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        let s = self.state();
        if !s.opened {
            return Err(Error::api("GetDevices", ApiError::ServiceNotResponding));
        }
        if s.selected.is_some() {
            return Ok(Vec::new());
        }
        Ok(vec![self.inner.device.clone()])
    }

    fn select_device(&self, device: &DeviceInfo) -> Result<DeviceInfo, Error> {
        let mut s = self.state();
        if !s.locked {
            return Err(Error::api("SelectDevice", ApiError::NotLocked));
        }
        if s.selected.is_some() || device.serial != self.inner.device.serial {
            return Err(Error::api("SelectDevice", ApiError::InvalidParam));
        }
        let mut selected = device.clone();
        if self.inner.device.hw_ver == HwVersion::RspDuo {
            if !self.inner.device.rsp_duo_mode.contains(device.rsp_duo_mode)
                || device.rsp_duo_mode == RspDuoMode::UNKNOWN
            {
                return Err(Error::api("SelectDevice", ApiError::InvalidMode));
            }
        } else {
            selected.tuner = TunerSelect::A;
            selected.rsp_duo_mode = RspDuoMode::UNKNOWN;
            selected.rsp_duo_sample_freq = 0.0;
        }
        if s.debug {
            log::debug!("dummy selected {selected}");
        }
        s.selected = Some(selected.clone());
        Ok(selected)
    }

    fn selected_device(&self) -> Result<DeviceInfo, Error> {
        self.state()
            .selected
            .clone()
            .ok_or(Error::api("GetDeviceParams", ApiError::NotSelected))
    }

    fn release_device(&self) -> Result<(), Error> {
        let stream = {
            let mut s = self.state();
            if !s.locked {
                return Err(Error::api("ReleaseDevice", ApiError::NotLocked));
            }
            if s.selected.take().is_none() {
                return Err(Error::api("ReleaseDevice", ApiError::NotSelected));
            }
            s.initialized = false;
            s.stream.take()
        };
        if let Some(stream) = stream {
            stream.stop();
        }
        Ok(())
    }

    fn params(&self) -> Result<DeviceParams, Error> {
        let s = self.state();
        if s.selected.is_none() {
            return Err(Error::api("GetDeviceParams", ApiError::NotSelected));
        }
        Ok(s.params.clone())
    }

    fn set_params(&self, params: &DeviceParams) -> Result<(), Error> {
        let mut s = self.state();
        if s.selected.is_none() {
            return Err(Error::api("GetDeviceParams", ApiError::NotSelected));
        }
        s.params = params.clone();
        Ok(())
    }

    fn update(&self, tuner: TunerSelect, reason: UpdateReason) -> Result<(), Error> {
        let mut s = self.state();
        if !s.initialized {
            return Err(Error::api("Update", ApiError::NotInitialised));
        }
        if tuner != TunerSelect::A {
            return Err(Error::api("Update", ApiError::InvalidParam));
        }
        match reason {
            UpdateReason::TunerGr => {
                let mut params = s.params.clone();
                self.normalize_gain(&mut params);
                let setting = GainSetting {
                    gain_reduction: params.gain_reduction,
                    lna_state: params.lna_state,
                };
                s.params = params;
                if s.debug {
                    log::debug!(
                        "dummy gain update gR={} LNA={}",
                        setting.gain_reduction,
                        setting.lna_state
                    );
                }
                match (&s.stream, self.inner.confirm) {
                    (Some(stream), true) => *lock(&stream.shared.pending) = Some(setting),
                    (Some(stream), false) => *lock(&stream.shared.gain) = setting,
                    (None, _) => {}
                }
            }
            reason => {
                let mut params = s.params.clone();
                self.normalize(&mut params);
                s.params = params;
                log::debug!("dummy update {reason:?} applied without notification");
            }
        }
        Ok(())
    }

    fn init(&self, handler: Option<Arc<dyn StreamHandler>>) -> Result<(), Error> {
        let mut s = self.state();
        if s.selected.is_none() {
            return Err(Error::api("Init", ApiError::NotSelected));
        }
        if s.initialized {
            return Err(Error::api("Init", ApiError::AlreadyInitialised));
        }
        let mut params = s.params.clone();
        self.normalize(&mut params);
        if let Some(handler) = handler {
            s.stream = Some(self.spawn(&params, handler)?);
        }
        s.params = params;
        s.initialized = true;
        Ok(())
    }

    fn uninit(&self) -> Result<(), Error> {
        let stream = {
            let mut s = self.state();
            if !s.initialized {
                return Err(Error::api("Uninit", ApiError::NotInitialised));
            }
            s.initialized = false;
            s.stream.take()
        };
        if let Some(stream) = stream {
            stream.stop();
        }
        Ok(())
    }
}
