use std::sync::Arc;

use crate::DeviceInfo;
use crate::DeviceParams;
use crate::DeviceTrait;
use crate::Error;
use crate::GainSetting;
use crate::HwVersion;
use crate::Mismatch;
use crate::RspDuoMode;
use crate::StreamHandler;
use crate::TunerSelect;
use crate::UpdateReason;
use crate::API_VERSION;

/// An opened control library with one selected device.
///
/// Owns the lifecycle open → select → configure → stream → stop → release → close. Teardown
/// is best-effort and idempotent: every step is attempted even if an earlier one failed, and
/// a dropped session tears down whatever it still holds.
pub struct Session<D: DeviceTrait> {
    dev: D,
    device: DeviceInfo,
    params: DeviceParams,
    opened: bool,
    selected: bool,
    initialized: bool,
}

fn check_version(found: f32) -> Result<(), Error> {
    if (found - API_VERSION).abs() > f32::EPSILON {
        return Err(Error::VersionMismatch {
            expected: API_VERSION,
            found,
        });
    }
    Ok(())
}

/// Lists the devices of `dev` without selecting one.
pub fn enumerate<D: DeviceTrait>(dev: &D) -> Result<Vec<DeviceInfo>, Error> {
    dev.open()?;
    let devices = check_version(dev.api_version()?).and_then(|_| {
        dev.lock_device_api()?;
        let devices = dev.devices();
        if let Err(e) = dev.unlock_device_api() {
            log::warn!("{e}");
        }
        devices
    });
    if let Err(e) = dev.close() {
        log::warn!("{e}");
    }
    devices
}

impl<D: DeviceTrait> Session<D> {
    /// Open the control library and select a device.
    ///
    /// With a `serial`, the device with that serial number is selected, otherwise the first
    /// one found. An RSPduo is forced into single tuner mode on tuner A.
    pub fn open(dev: D, serial: Option<&str>, api_debug: bool) -> Result<Self, Error> {
        dev.open()?;
        let mut session = Session {
            dev,
            device: DeviceInfo::default(),
            params: DeviceParams::default(),
            opened: true,
            selected: false,
            initialized: false,
        };
        check_version(session.dev.api_version()?)?;

        session.dev.lock_device_api()?;
        let selected = session.select(serial);
        let unlocked = session.dev.unlock_device_api();
        match (selected, unlocked) {
            (Ok(()), Ok(())) => {}
            (Err(e), unlocked) => {
                if let Err(u) = unlocked {
                    log::warn!("{u}");
                }
                return Err(e);
            }
            (Ok(()), Err(e)) => return Err(e),
        }

        if api_debug {
            session.dev.debug_enable(true)?;
        }
        Ok(session)
    }

    fn select(&mut self, serial: Option<&str>) -> Result<(), Error> {
        let devices = self.dev.devices()?;
        log::debug!("found {} device(s)", devices.len());
        let mut device = devices
            .into_iter()
            .find(|d| serial.map_or(true, |s| d.serial == s))
            .ok_or(Error::NotFound)?;

        if device.hw_ver == HwVersion::RspDuo {
            if !device.rsp_duo_mode.contains(RspDuoMode::SINGLE_TUNER) {
                return Err(Error::SingleTunerUnavailable);
            }
            device.rsp_duo_mode = RspDuoMode::SINGLE_TUNER;
            device.tuner = TunerSelect::A;
            device.rsp_duo_sample_freq = 0.0;
        }

        self.device = self.dev.select_device(&device)?;
        self.selected = true;
        log::info!("selected {}", self.device);
        Ok(())
    }

    /// The selected device.
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// The underlying driver.
    pub fn driver(&self) -> &D {
        &self.dev
    }

    /// Write `params`, let the hardware normalize them, and verify nothing was changed.
    ///
    /// Initializes without a handler, reads everything back, and uninitializes again.
    /// Returns the parameters as reported by the device. Any difference, in the parameters or
    /// in the tuner and RSPduo mode of the selected device, is logged and rejected with
    /// [`Error::ConfigurationRejected`].
    pub fn apply_initial_configuration(
        &mut self,
        params: &DeviceParams,
    ) -> Result<DeviceParams, Error> {
        self.dev.set_params(params)?;
        self.dev.init(None)?;
        self.initialized = true;

        let checked = self.read_back(params);
        let uninit = self.stop_streaming();
        let (actual, mismatches) = checked?;
        if !mismatches.is_empty() {
            for m in mismatches.iter() {
                log::error!("{m}");
            }
            if let Err(e) = uninit {
                log::warn!("{e}");
            }
            return Err(Error::ConfigurationRejected(mismatches));
        }
        uninit?;
        self.params = params.clone();
        Ok(actual)
    }

    fn read_back(&self, params: &DeviceParams) -> Result<(DeviceParams, Vec<Mismatch>), Error> {
        let actual = self.dev.params()?;
        let device = self.dev.selected_device()?;

        let mut mismatches = Vec::new();
        if device.tuner != TunerSelect::A {
            mismatches.push(Mismatch::new("tuner", TunerSelect::A, device.tuner));
        }
        let mode = if device.hw_ver == HwVersion::RspDuo {
            RspDuoMode::SINGLE_TUNER
        } else {
            RspDuoMode::UNKNOWN
        };
        if device.rsp_duo_mode != mode {
            mismatches.push(Mismatch::new("rspDuoMode", mode, device.rsp_duo_mode));
        }
        if device.rsp_duo_sample_freq != 0.0 {
            mismatches.push(Mismatch::new(
                "rspDuoSampleFreq",
                0,
                format!("{:.0}", device.rsp_duo_sample_freq),
            ));
        }
        mismatches.extend(params.verify(&actual));
        Ok((actual, mismatches))
    }

    /// Initialize again, now delivering samples and events to `handler`.
    pub fn start_streaming(&mut self, handler: Arc<dyn StreamHandler>) -> Result<(), Error> {
        self.dev.init(Some(handler))?;
        self.initialized = true;
        Ok(())
    }

    /// Write a new gain setting to the pending parameters. It takes effect with the next
    /// [`request_tuner_gain_update`](Self::request_tuner_gain_update).
    pub fn set_gain(&mut self, setting: GainSetting) -> Result<(), Error> {
        self.params.gain_reduction = setting.gain_reduction;
        self.params.lna_state = setting.lna_state;
        self.dev.set_params(&self.params)
    }

    /// Ask the selected tuner to apply its pending gain reduction and LNA state, nothing else.
    pub fn request_tuner_gain_update(&self) -> Result<(), Error> {
        self.dev.update(self.device.tuner, UpdateReason::TunerGr)
    }

    /// Stop streaming. Does nothing if not streaming.
    pub fn stop_streaming(&mut self) -> Result<(), Error> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;
        self.dev.uninit()
    }

    /// Release the selected device under the device API lock. Does nothing if released.
    pub fn release(&mut self) -> Result<(), Error> {
        if !self.selected {
            return Ok(());
        }
        self.selected = false;
        let locked = self.dev.lock_device_api();
        if let Err(e) = &locked {
            log::warn!("{e}");
        }
        let released = self.dev.release_device();
        let unlocked = if locked.is_ok() {
            self.dev.unlock_device_api()
        } else {
            Ok(())
        };
        locked.and(released).and(unlocked)
    }

    /// Close the control library. Does nothing if closed.
    pub fn close(&mut self) -> Result<(), Error> {
        if !self.opened {
            return Ok(());
        }
        self.opened = false;
        self.dev.close()
    }

    /// Stop, release and close, in that order. Every step is attempted; each failure is
    /// logged and the first one is returned.
    pub fn shutdown(mut self) -> Result<(), Error> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), Error> {
        let mut first = None;
        for step in [
            Self::stop_streaming as fn(&mut Self) -> Result<(), Error>,
            Self::release,
            Self::close,
        ] {
            if let Err(e) = step(self) {
                log::error!("{e}");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl<D: DeviceTrait> Drop for Session<D> {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}
