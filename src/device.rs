use std::sync::Arc;

use crate::Args;
use crate::DeviceInfo;
use crate::DeviceParams;
use crate::Driver;
use crate::Error;
use crate::StreamHandler;
use crate::TunerSelect;
use crate::UpdateReason;

#[cfg(feature = "dummy")]
use crate::impls;

/// Central trait, implemented by drivers of the control library.
///
/// The methods mirror the calls of the vendor API one to one. Ordering constraints, like
/// holding the API lock around selection, are enforced by [`Session`](crate::Session), not by
/// the driver.
pub trait DeviceTrait: Send + Sync {
    /// SDR [driver](Driver)
    fn driver(&self) -> Driver;

    //================================ API ============================================
    /// Open the control library.
    fn open(&self) -> Result<(), Error>;
    /// Close the control library.
    fn close(&self) -> Result<(), Error>;
    /// Version of the control library.
    fn api_version(&self) -> Result<f32, Error>;
    /// Take the exclusive lock needed for device selection and release.
    fn lock_device_api(&self) -> Result<(), Error>;
    /// Release the device API lock.
    fn unlock_device_api(&self) -> Result<(), Error>;
    /// Enable verbose logging inside the control library.
    fn debug_enable(&self, enable: bool) -> Result<(), Error>;

    //================================ DEVICES ============================================
    /// Devices that are present and not in use.
    fn devices(&self) -> Result<Vec<DeviceInfo>, Error>;
    /// Select a device, returning it as the library recorded it.
    fn select_device(&self, device: &DeviceInfo) -> Result<DeviceInfo, Error>;
    /// The selected device, as currently known to the library.
    fn selected_device(&self) -> Result<DeviceInfo, Error>;
    /// Release the selected device.
    fn release_device(&self) -> Result<(), Error>;

    //================================ PARAMETERS ============================================
    /// Current parameters of the selected tuner.
    ///
    /// Before [`init`](Self::init) these are the values last written; afterwards, the values
    /// as normalized by the hardware.
    fn params(&self) -> Result<DeviceParams, Error>;
    /// Write parameters. They take effect on the next [`init`](Self::init), or, for a
    /// running stream, when the sub-system is told to pick them up with
    /// [`update`](Self::update).
    fn set_params(&self, params: &DeviceParams) -> Result<(), Error>;
    /// Ask `tuner` to apply the pending parameters of sub-system `reason`.
    ///
    /// Returns once the request is queued; completion is signalled through the stream.
    fn update(&self, tuner: TunerSelect, reason: UpdateReason) -> Result<(), Error>;

    //================================ STREAMING ============================================
    /// Initialize the selected device with the written parameters.
    ///
    /// Without a handler, no samples are delivered. This is still useful to let the
    /// hardware normalize the parameters.
    fn init(&self, handler: Option<Arc<dyn StreamHandler>>) -> Result<(), Error>;
    /// Stop streaming and undo [`init`](Self::init).
    fn uninit(&self) -> Result<(), Error>;
}

/// Type-erased driver.
pub type GenericDevice = Arc<dyn DeviceTrait>;

#[doc(hidden)]
impl<T: DeviceTrait + ?Sized> DeviceTrait for Arc<T> {
    fn driver(&self) -> Driver {
        self.as_ref().driver()
    }
    fn open(&self) -> Result<(), Error> {
        self.as_ref().open()
    }
    fn close(&self) -> Result<(), Error> {
        self.as_ref().close()
    }
    fn api_version(&self) -> Result<f32, Error> {
        self.as_ref().api_version()
    }
    fn lock_device_api(&self) -> Result<(), Error> {
        self.as_ref().lock_device_api()
    }
    fn unlock_device_api(&self) -> Result<(), Error> {
        self.as_ref().unlock_device_api()
    }
    fn debug_enable(&self, enable: bool) -> Result<(), Error> {
        self.as_ref().debug_enable(enable)
    }
    fn devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        self.as_ref().devices()
    }
    fn select_device(&self, device: &DeviceInfo) -> Result<DeviceInfo, Error> {
        self.as_ref().select_device(device)
    }
    fn selected_device(&self) -> Result<DeviceInfo, Error> {
        self.as_ref().selected_device()
    }
    fn release_device(&self) -> Result<(), Error> {
        self.as_ref().release_device()
    }
    fn params(&self) -> Result<DeviceParams, Error> {
        self.as_ref().params()
    }
    fn set_params(&self, params: &DeviceParams) -> Result<(), Error> {
        self.as_ref().set_params(params)
    }
    fn update(&self, tuner: TunerSelect, reason: UpdateReason) -> Result<(), Error> {
        self.as_ref().update(tuner, reason)
    }
    fn init(&self, handler: Option<Arc<dyn StreamHandler>>) -> Result<(), Error> {
        self.as_ref().init(handler)
    }
    fn uninit(&self) -> Result<(), Error> {
        self.as_ref().uninit()
    }
}

/// Opens the driver named by `driver` in the `args`, or the first driver compiled in.
///
/// Remaining `args` are passed to the driver as options.
pub fn open<A: TryInto<Args>>(args: A) -> Result<GenericDevice, Error> {
    let args: Args = args.try_into().or(Err(Error::ValueError))?;
    let driver = match args.get::<Driver>("driver") {
        Ok(d) => Some(d),
        Err(Error::NotFound) => None,
        Err(e) => return Err(e),
    };
    #[cfg(feature = "dummy")]
    {
        if driver.is_none() || matches!(driver, Some(Driver::Dummy)) {
            log::debug!("opening dummy driver with {args}");
            return Ok(Arc::new(impls::Dummy::new(&args)?));
        }
    }
    log::warn!("no driver available for {args} (requested: {driver:?})");
    Err(Error::NotFound)
}
