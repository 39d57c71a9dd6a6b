use crate::logging::LogFormat;
use clap::{ArgAction, Parser, ValueEnum};
use cogex_core::Paradigm;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ParadigmArg {
    Flanker,
    Stroop,
    VisualSearch,
    NBack,
    Posner,
    MentalRotation,
}

impl From<ParadigmArg> for Paradigm {
    fn from(arg: ParadigmArg) -> Self {
        match arg {
            ParadigmArg::Flanker => Paradigm::Flanker,
            ParadigmArg::Stroop => Paradigm::Stroop,
            ParadigmArg::VisualSearch => Paradigm::VisualSearch,
            ParadigmArg::NBack => Paradigm::NBack,
            ParadigmArg::Posner => Paradigm::Posner,
            ParadigmArg::MentalRotation => Paradigm::MentalRotation,
        }
    }
}

/// Runs one practice + main session of a cognitive task with a simulated
/// participant and writes the results as JSON.
#[derive(Parser, Debug, Clone)]
#[command(name = "cogex", author, version, about)]
pub struct Args {
    /// Task to run (ignored when --plan is given)
    #[arg(long, value_enum, default_value_t = ParadigmArg::Flanker)]
    pub paradigm: ParadigmArg,

    /// Number of practice trials
    #[arg(long, default_value_t = 20)]
    pub practice: usize,

    /// Number of main trials
    #[arg(long = "main", default_value_t = 100)]
    pub main_trials: usize,

    /// Seed for trial generation and the simulated participant
    #[arg(long, env = "COGEX_SEED")]
    pub seed: Option<u64>,

    /// Session plan JSON (paradigm parameters, counts, seed, timing)
    #[arg(long, value_name = "PATH")]
    pub plan: Option<PathBuf>,

    /// Timing JSON overriding the plan's stage durations
    #[arg(long, value_name = "PATH")]
    pub timing: Option<PathBuf>,

    /// Directory for the session record and summary
    #[arg(long, value_name = "DIR", default_value = "results")]
    pub out_dir: PathBuf,

    /// Participant id; the session record is stored under this key
    #[arg(long, default_value = "participant")]
    pub participant: String,

    /// Run on a virtual clock that jumps straight to each deadline
    #[arg(long)]
    pub virtual_clock: bool,

    /// Probability the simulated participant answers correctly
    #[arg(long, default_value_t = 0.9, value_parser = parse_probability)]
    pub accuracy: f64,

    /// Mean simulated reaction time in milliseconds
    #[arg(long, default_value_t = 450.0, value_parser = parse_duration_ms)]
    pub mean_rt_ms: f64,

    /// Probability the simulated participant does not respond at all
    #[arg(long, default_value_t = 0.05, value_parser = parse_probability)]
    pub miss_rate: f64,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Human)]
    pub log_format: LogFormat,
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{s} is not a probability between 0 and 1"))
    }
}

fn parse_duration_ms(s: &str) -> Result<f64, String> {
    let ms: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if ms.is_finite() && ms > 0.0 {
        Ok(ms)
    } else {
        Err(format!("{s} is not a positive, finite number of milliseconds"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["cogex"]).unwrap();
        assert_eq!(args.paradigm, ParadigmArg::Flanker);
        assert_eq!(args.practice, 20);
        assert_eq!(args.main_trials, 100);
        assert_eq!(args.verbose, 0);
        assert!(!args.virtual_clock);
        assert_eq!(args.log_format, LogFormat::Human);
    }

    #[test]
    fn paradigm_names_are_kebab_case() {
        let args = Args::try_parse_from(["cogex", "--paradigm", "visual-search", "-vv"]).unwrap();
        assert_eq!(Paradigm::from(args.paradigm), Paradigm::VisualSearch);
        assert_eq!(args.verbose, 2);
        assert!(Args::try_parse_from(["cogex", "--paradigm", "go-no-go"]).is_err());
    }

    #[test]
    fn session_shape_flags() {
        let args = Args::try_parse_from([
            "cogex",
            "--practice",
            "0",
            "--main",
            "12",
            "--seed",
            "9",
            "--participant",
            "p-07",
            "--virtual-clock",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.practice, 0);
        assert_eq!(args.main_trials, 12);
        assert_eq!(args.seed, Some(9));
        assert_eq!(args.participant, "p-07");
        assert!(args.virtual_clock);
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn simulation_rates_must_be_finite() {
        for bad in [
            ["--accuracy", "NaN"],
            ["--accuracy", "1.5"],
            ["--miss-rate", "nan"],
            ["--miss-rate", "-0.1"],
            ["--mean-rt-ms", "inf"],
            ["--mean-rt-ms", "0"],
        ] {
            let argv = ["cogex", bad[0], bad[1]];
            assert!(Args::try_parse_from(argv).is_err(), "{bad:?} accepted");
        }
        let args = Args::try_parse_from(["cogex", "--accuracy", "1", "--miss-rate", "0", "--mean-rt-ms", "300"]).unwrap();
        assert_eq!(args.accuracy, 1.0);
        assert_eq!(args.miss_rate, 0.0);
        assert_eq!(args.mean_rt_ms, 300.0);
    }
}
