//! Command line pieces shared by the binaries.
use clap::Parser;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use crate::AgcControl;
use crate::Bandwidth;
use crate::DcOffsetTuner;
use crate::DeviceInfo;
use crate::DeviceParams;
use crate::Error;
use crate::GainSetting;
use crate::GenericDevice;
use crate::IfType;
use crate::Session;

/// Device selection and receiver settings.
#[derive(clap::Args, Debug, Clone)]
pub struct RadioArgs {
    /// Serial number of the RSP (default: first one found)
    #[clap(short, long)]
    pub serial: Option<String>,
    /// Driver and device options, e.g. "driver=dummy, hw_ver=rspduo"
    #[clap(short, long, default_value = "")]
    pub args: String,
    /// RSP sample rate in Hz
    #[clap(short = 'r', long, default_value_t = 2e6)]
    pub sample_rate: f64,
    /// Decimation factor, 1 to disable
    #[clap(short, long, default_value_t = 1)]
    pub decimation: u8,
    /// IF frequency in kHz (0, 450, 1620, 2048)
    #[clap(short = 'i', long = "if", default_value = "0")]
    pub if_type: IfType,
    /// IF bandwidth in kHz (200, 300, 600, 1536, 5000, 6000, 7000, 8000)
    #[clap(short, long, default_value = "200")]
    pub bandwidth: Bandwidth,
    /// Disable post tuner DC offset compensation
    #[clap(short = 'D', long)]
    pub no_dc_correction: bool,
    /// Disable post tuner I/Q balance compensation
    #[clap(short = 'I', long)]
    pub no_iq_correction: bool,
    /// Tuner DC offset compensation: dcCal,speedUp,trackTime,refreshRateTime
    #[clap(short = 'y', long, default_value = "3,0,1,2048")]
    pub dc_offset_tuner: DcOffsetTuner,
    /// Center frequency in Hz
    #[clap(short, long, default_value_t = 100e6)]
    pub frequency: f64,
    /// Enable debug output of the control library
    #[clap(short = 'L', long)]
    pub api_debug: bool,
}

impl RadioArgs {
    /// Receiver parameters for the initial configuration.
    pub fn params(&self, gain: GainSetting, agc: AgcControl) -> DeviceParams {
        DeviceParams {
            sample_rate: self.sample_rate,
            decimation_enable: self.decimation > 1,
            decimation_factor: self.decimation,
            if_type: self.if_type,
            bandwidth: self.bandwidth,
            agc,
            gain_reduction: gain.gain_reduction,
            lna_state: gain.lna_state,
            dc_enable: !self.no_dc_correction,
            iq_enable: !self.no_iq_correction,
            dc_offset_tuner: self.dc_offset_tuner,
            rf_frequency: self.frequency,
        }
    }

    /// Open the driver and select the device.
    pub fn open(&self) -> Result<Session<GenericDevice>, Error> {
        let dev = crate::open(self.args.as_str())?;
        Session::open(dev, self.serial.as_deref(), self.api_debug)
    }
}

/// Fixed gain reduction in dB, or AGC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainArg {
    Agc,
    Reduction(i32),
}

impl FromStr for GainArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("agc") {
            return Ok(GainArg::Agc);
        }
        s.parse().map(GainArg::Reduction).or(Err(Error::ValueError))
    }
}

/// Parse the command line. Usage errors exit with status 1, help with 0.
pub fn parse_or_exit<P: Parser>() -> P {
    match P::try_parse() {
        Ok(p) => p,
        Err(e) => {
            let code = i32::from(e.use_stderr());
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Log to stderr, at `info` unless `RUST_LOG` says otherwise, or at `debug` if `verbose`.
pub fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Flag that is set on Ctrl-C.
pub fn stop_on_ctrl_c() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let handler = ctrlc::set_handler({
        let stop = stop.clone();
        move || {
            log::info!("terminating...");
            stop.store(true, Ordering::Relaxed);
        }
    });
    if let Err(e) = handler {
        log::warn!("Ctrl-C handler not installed: {e}");
    }
    stop
}

/// Sleep for `duration`, returning early if `stop` is set. Returns false if stopped.
pub fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) -> bool {
    let end = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= end {
            return true;
        }
        std::thread::sleep((end - now).min(Duration::from_millis(100)));
    }
}

/// Print the selected device and its settings to stdout.
pub fn print_settings(device: &DeviceInfo, params: &DeviceParams) {
    println!("{device}");
    println!("{}", params.summary());
    println!("{}", params.correction_summary());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser, Debug)]
    struct Cli {
        #[clap(flatten)]
        radio: RadioArgs,
    }

    fn parse(args: &[&str]) -> Result<RadioArgs, clap::Error> {
        Cli::try_parse_from(std::iter::once("test").chain(args.iter().copied())).map(|c| c.radio)
    }

    #[test]
    fn defaults() {
        let r = parse(&[]).unwrap();
        let p = r.params(
            GainSetting {
                gain_reduction: 40,
                lna_state: 0,
            },
            AgcControl::Disable,
        );
        assert_eq!(p, DeviceParams::default());
        assert!(r.serial.is_none());
    }
    #[test]
    fn radio_flags() {
        let r = parse(&[
            "-s", "1234", "-r", "6e6", "-d", "4", "-i", "1620", "-b", "1536", "-D", "-y",
            "0,1,2,3", "-f", "14.1e6", "-L",
        ])
        .unwrap();
        let p = r.params(
            GainSetting {
                gain_reduction: 30,
                lna_state: 2,
            },
            AgcControl::Hz50,
        );
        assert_eq!(r.serial.as_deref(), Some("1234"));
        assert!(r.api_debug);
        assert_eq!(p.sample_rate, 6e6);
        assert!(p.decimation_enable);
        assert_eq!(p.decimation_factor, 4);
        assert_eq!(p.if_type, IfType::Khz1620);
        assert_eq!(p.bandwidth, Bandwidth::Khz1536);
        assert!(!p.dc_enable);
        assert!(p.iq_enable);
        assert_eq!(p.dc_offset_tuner.refresh_rate_time, 3);
        assert_eq!(p.rf_frequency, 14.1e6);
        assert_eq!(p.agc, AgcControl::Hz50);
    }
    #[test]
    fn invalid_values_rejected() {
        assert!(parse(&["-i", "455"]).is_err());
        assert!(parse(&["-b", "250"]).is_err());
        assert!(parse(&["-y", "3,0,1"]).is_err());
        assert!(parse(&["-r", "fast"]).is_err());
    }
    #[test]
    fn gain_arg() {
        assert_eq!("AGC".parse::<GainArg>().unwrap(), GainArg::Agc);
        assert_eq!("agc".parse::<GainArg>().unwrap(), GainArg::Agc);
        assert_eq!("35".parse::<GainArg>().unwrap(), GainArg::Reduction(35));
        assert!("loud".parse::<GainArg>().is_err());
    }
    #[test]
    fn sleep_stops_early() {
        let stop = AtomicBool::new(true);
        let t = Instant::now();
        assert!(!sleep_unless_stopped(Duration::from_secs(10), &stop));
        assert!(t.elapsed() < Duration::from_secs(1));
        assert!(sleep_unless_stopped(Duration::from_millis(1), &AtomicBool::new(false)));
    }
}
