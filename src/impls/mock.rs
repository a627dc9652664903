//! Scripted driver for unit tests. Records the control library calls it receives.
use std::sync::Arc;
use std::sync::Mutex;

use crate::ApiError;
use crate::DeviceInfo;
use crate::DeviceParams;
use crate::DeviceTrait;
use crate::Driver;
use crate::Error;
use crate::GainSetting;
use crate::HwVersion;
use crate::RspDuoMode;
use crate::StreamHandler;
use crate::StreamParams;
use crate::TunerSelect;
use crate::UpdateReason;
use crate::API_VERSION;

const BLOCK: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open,
    Close,
    ApiVersion,
    Lock,
    Unlock,
    Debug(bool),
    Devices,
    Select,
    Release,
    Init(bool),
    Uninit,
    Update(UpdateReason),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    selected: Option<DeviceInfo>,
    params: DeviceParams,
    handler: Option<Arc<dyn StreamHandler>>,
    initialized: bool,
    gains: Vec<GainSetting>,
    next_sample: u32,
}

pub struct Mock {
    version: f32,
    devices: Vec<DeviceInfo>,
    max_frequency: f64,
    fail_release: bool,
    max_updates: Option<usize>,
    notify: bool,
    hook: Option<Box<dyn Fn() + Send + Sync>>,
    state: Mutex<State>,
}

impl Mock {
    pub fn new() -> Self {
        let devices = (0..2)
            .map(|i| DeviceInfo {
                serial: format!("mock-{i}"),
                valid: true,
                ..Default::default()
            })
            .collect();
        Self {
            version: API_VERSION,
            devices,
            max_frequency: f64::MAX,
            fail_release: false,
            max_updates: None,
            notify: true,
            hook: None,
            state: Mutex::new(State::default()),
        }
    }
    pub fn with_version(mut self, version: f32) -> Self {
        self.version = version;
        self
    }
    pub fn with_hw_ver(mut self, hw_ver: HwVersion, modes: RspDuoMode) -> Self {
        for d in self.devices.iter_mut() {
            d.hw_ver = hw_ver;
            d.rsp_duo_mode = modes;
            d.tuner = TunerSelect::Both;
        }
        self
    }
    /// RF frequencies above `max` are clamped on init.
    pub fn with_max_frequency(mut self, max: f64) -> Self {
        self.max_frequency = max;
        self
    }
    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }
    /// Updates after the first `n` fail.
    pub fn failing_update_after(mut self, n: usize) -> Self {
        self.max_updates = Some(n);
        self
    }
    /// Never report a gain change.
    pub fn silent(mut self) -> Self {
        self.notify = false;
        self
    }
    /// Run `f` on every accepted update, before the stream reports it.
    pub fn on_update(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(f));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }
    /// Gain settings applied by updates, in order.
    pub fn gains(&self) -> Vec<GainSetting> {
        self.state.lock().unwrap().gains.clone()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl DeviceTrait for Mock {
    fn driver(&self) -> Driver {
        Driver::Dummy
    }
    fn open(&self) -> Result<(), Error> {
        self.record(Call::Open);
        Ok(())
    }
    fn close(&self) -> Result<(), Error> {
        self.record(Call::Close);
        Ok(())
    }
    fn api_version(&self) -> Result<f32, Error> {
        self.record(Call::ApiVersion);
        Ok(self.version)
    }
    fn lock_device_api(&self) -> Result<(), Error> {
        self.record(Call::Lock);
        Ok(())
    }
    fn unlock_device_api(&self) -> Result<(), Error> {
        self.record(Call::Unlock);
        Ok(())
    }
    fn debug_enable(&self, enable: bool) -> Result<(), Error> {
        self.record(Call::Debug(enable));
        Ok(())
    }
    fn devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        self.record(Call::Devices);
        Ok(self.devices.clone())
    }
    fn select_device(&self, device: &DeviceInfo) -> Result<DeviceInfo, Error> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Select);
        s.selected = Some(device.clone());
        Ok(device.clone())
    }
    fn selected_device(&self) -> Result<DeviceInfo, Error> {
        self.state
            .lock()
            .unwrap()
            .selected
            .clone()
            .ok_or(Error::api("GetDeviceParams", ApiError::NotSelected))
    }
    fn release_device(&self) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Release);
        s.selected = None;
        if self.fail_release {
            return Err(Error::api("ReleaseDevice", ApiError::Fail));
        }
        Ok(())
    }
    fn params(&self) -> Result<DeviceParams, Error> {
        Ok(self.state.lock().unwrap().params.clone())
    }
    fn set_params(&self, params: &DeviceParams) -> Result<(), Error> {
        self.state.lock().unwrap().params = params.clone();
        Ok(())
    }
    fn update(&self, _tuner: TunerSelect, reason: UpdateReason) -> Result<(), Error> {
        let (handler, first) = {
            let mut s = self.state.lock().unwrap();
            s.calls.push(Call::Update(reason));
            if !s.initialized {
                return Err(Error::api("Update", ApiError::NotInitialised));
            }
            if self.max_updates.is_some_and(|n| s.gains.len() >= n) {
                return Err(Error::api("Update", ApiError::GainUpdateError));
            }
            let gain = GainSetting {
                gain_reduction: s.params.gain_reduction,
                lna_state: s.params.lna_state,
            };
            s.gains.push(gain);
            let first = s.next_sample;
            s.next_sample = first.wrapping_add(BLOCK as u32);
            (s.handler.clone(), first)
        };
        if let Some(hook) = &self.hook {
            hook();
        }
        if let Some(handler) = handler.filter(|_| self.notify) {
            let params = StreamParams {
                first_sample_num: first,
                gr_changed: reason == UpdateReason::TunerGr,
                num_samples: BLOCK as u32,
                ..Default::default()
            };
            handler.samples(&[0; BLOCK], &[0; BLOCK], &params, false);
        }
        Ok(())
    }
    fn init(&self, handler: Option<Arc<dyn StreamHandler>>) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Init(handler.is_some()));
        s.params.rf_frequency = s.params.rf_frequency.min(self.max_frequency);
        s.handler = handler;
        s.initialized = true;
        Ok(())
    }
    fn uninit(&self) -> Result<(), Error> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Uninit);
        s.handler = None;
        s.initialized = false;
        Ok(())
    }
}
