mod app;
mod cli;
mod logging;
mod participant;

use clap::Parser;
use cogex_timing::{HighPrecisionTimer, ManualClock};

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    logging::init_logging(args.log_format, args.verbose);

    let report = if args.virtual_clock {
        app::run_session(&args, ManualClock::new())?
    } else {
        app::run_session(&args, HighPrecisionTimer::new())?
    };
    report.print();

    Ok(())
}
