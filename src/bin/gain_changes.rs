//! Cycle the gain of an RSP tuner through a list of settings, waiting for every change to
//! show up in the sample stream.
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use rsp_tools::cli;
use rsp_tools::cli::RadioArgs;
use rsp_tools::AgcControl;
use rsp_tools::Error;
use rsp_tools::GainChangeContext;
use rsp_tools::GainCycle;
use rsp_tools::GainSchedule;
use rsp_tools::UpdateConfirmer;

#[derive(Parser, Debug)]
struct Args {
    #[clap(flatten)]
    radio: RadioArgs,
    /// IF gain reductions in dB to cycle through
    #[clap(short = 'g', long, value_delimiter = ',', default_value = "40")]
    gain_reductions: Vec<i32>,
    /// LNA states to cycle through
    #[clap(short = 'l', long, value_delimiter = ',', default_value = "0")]
    lna_states: Vec<u8>,
    /// Number of gain changes (default: unlimited)
    #[clap(short = 'n', long, default_value_t = u32::MAX)]
    count: u32,
    /// Wait time before each gain change in microseconds
    #[clap(short, long, default_value_t = 0)]
    wait: u64,
    /// Log every gain change
    #[clap(short = 'V', long)]
    verbose: bool,
}

fn run(cli: Args) -> Result<(), Error> {
    let schedule = GainSchedule::new(cli.gain_reductions, cli.lna_states)?;
    let stop = cli::stop_on_ctrl_c();

    let mut session = cli.radio.open()?;
    let params = cli.radio.params(schedule.initial(), AgcControl::Disable);
    let actual = session.apply_initial_configuration(&params)?;
    cli::print_settings(session.device(), &actual);

    let context = Arc::new(GainChangeContext::new());
    session.start_streaming(context.clone())?;

    let mut cycle = GainCycle::new(schedule);
    cycle.count = cli.count;
    cycle.wait = Duration::from_micros(cli.wait);
    let mut confirmer = UpdateConfirmer::default();
    let report = cycle.run(&mut session, &context, &mut confirmer, &stop)?;
    log::info!(
        "{} gain changes, {} confirmed, {} timed out, {} samples received",
        report.changes,
        report.confirmed,
        report.timed_out,
        context.sequence().total_samples()
    );

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
