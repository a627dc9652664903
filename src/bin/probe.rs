use clap::Parser;
use std::process::ExitCode;

use rsp_tools::cli;
use rsp_tools::enumerate;
use rsp_tools::RspDuoMode;

#[derive(Parser, Debug)]
struct Args {
    /// Driver and device options
    #[clap(short, long, default_value = "")]
    args: String,
}

pub fn main() -> ExitCode {
    let cli: Args = cli::parse_or_exit();
    cli::init_logging(false);

    let devices = rsp_tools::open(cli.args.as_str()).and_then(|dev| {
        println!("driver:      {}", dev.driver());
        enumerate(&dev)
    });
    let devices = match devices {
        Ok(d) => d,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    println!("devices:     {}", devices.len());
    for d in devices {
        print!("{d}");
        if d.rsp_duo_mode.contains(RspDuoMode::DUAL_TUNER) {
            print!(" rspDuoMode={}", d.rsp_duo_mode);
        }
        println!();
    }
    ExitCode::SUCCESS
}
