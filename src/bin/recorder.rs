//! Stream I/Q samples from an RSP tuner to a file.
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use rsp_tools::cli;
use rsp_tools::cli::GainArg;
use rsp_tools::cli::RadioArgs;
use rsp_tools::AgcControl;
use rsp_tools::DeviceParams;
use rsp_tools::Error;
use rsp_tools::GainSetting;
use rsp_tools::Recorder;
use rsp_tools::TimingProbe;

#[derive(Parser, Debug)]
struct Args {
    #[clap(flatten)]
    radio: RadioArgs,
    /// IF gain reduction in dB, or "AGC" to enable the AGC
    #[clap(short = 'g', long, default_value = "40")]
    gain: GainArg,
    /// LNA state
    #[clap(short = 'l', long, default_value_t = 0)]
    lna_state: u8,
    /// Streaming time in seconds
    #[clap(short = 'x', long, default_value_t = 10)]
    time: u64,
    /// Output file; "SAMPLERATE" is replaced by the measured sample rate in kHz
    #[clap(short, long)]
    output: Option<PathBuf>,
    /// Only measure the time between callbacks, no output
    #[clap(short = 'T', long)]
    timing: bool,
    /// Debug logging
    #[clap(short = 'V', long)]
    verbose: bool,
}

fn run(cli: Args) -> Result<(), Error> {
    let stop = cli::stop_on_ctrl_c();
    let (gain_reduction, agc) = match cli.gain {
        GainArg::Agc => (DeviceParams::default().gain_reduction, AgcControl::Hz50),
        GainArg::Reduction(g) => (g, AgcControl::Disable),
    };
    let gain = GainSetting {
        gain_reduction,
        lna_state: cli.lna_state,
    };

    let mut session = cli.radio.open()?;
    let params = cli.radio.params(gain, agc);
    let actual = session.apply_initial_configuration(&params)?;
    cli::print_settings(session.device(), &actual);

    if cli.timing {
        let probe = Arc::new(TimingProbe::default());
        session.start_streaming(probe.clone())?;
        log::info!("measuring callback times for {} seconds", cli.time);
        cli::sleep_unless_stopped(Duration::from_secs(cli.time), &stop);
        session.stop_streaming()?;
        let (callbacks, slow) = probe.counts();
        log::info!("{callbacks} callbacks, {slow} above threshold");
        return session.shutdown();
    }

    let recorder = Arc::new(match &cli.output {
        Some(path) => Recorder::create(path)?,
        None => Recorder::new(),
    });
    session.start_streaming(recorder.clone())?;
    log::info!("streaming for {} seconds", cli.time);
    cli::sleep_unless_stopped(Duration::from_secs(cli.time), &stop);
    session.stop_streaming()?;

    // late deliveries may still arrive after uninit
    std::thread::sleep(Duration::from_secs(1));
    let summary = recorder.finish();
    log::info!("{summary}");
    if let Some(path) = recorder.rename_with_rate(&summary) {
        log::info!("output renamed to {}", path.display());
    }

    session.shutdown()
}

fn main() -> ExitCode {
    let cli: Args = cli::parse_or_exit();
    cli::init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
