use crate::cli::Args;
use crate::participant::SimulatedParticipant;
use anyhow::{Context, Result, bail};
use cogex_core::{EngineStage, ExperimentPhase, Paradigm};
use cogex_experiment::{
    EngineEvent, EventLog, ExperimentConfig, ExperimentPlan, JsonFileStore, KeyValueStore, ParadigmAdapter,
    ParadigmParams, SessionBatch, SessionSummary, TimingConfig, TrialEngine, adapter_for,
};
use cogex_timing::{Clock, TimingStats};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything written to `<participant>_summary.json`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub participant_id: String,
    pub paradigm: Paradigm,
    pub seed: u64,
    pub practice: SessionSummary,
    pub main: SessionSummary,
    pub timing: LatenessReport,
    pub record_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatenessReport {
    pub transitions: usize,
    pub average_ms: f64,
    pub jitter_ms: f64,
    pub max_ms: f64,
}

impl From<TimingStats> for LatenessReport {
    fn from(stats: TimingStats) -> Self {
        Self {
            transitions: stats.samples,
            average_ms: stats.average_lateness_ns / 1e6,
            jitter_ms: stats.jitter_ns / 1e6,
            max_ms: stats.max_lateness_ns / 1e6,
        }
    }
}

impl SessionReport {
    pub fn print(&self) {
        println!("=== SESSION COMPLETE ===");
        println!("Participant: {}", self.participant_id);
        println!("Paradigm: {} (seed {})", self.paradigm, self.seed);
        for (label, s) in [("Practice", &self.practice), ("Main", &self.main)] {
            println!(
                "{label}: {} trials, accuracy {:.1}%, {} timeouts",
                s.trials,
                s.accuracy * 100.0,
                s.timeouts
            );
            if let Some(rt) = s.mean_rt_ms {
                println!("  mean RT (correct): {rt:.1} ms");
            }
            for (condition, c) in &s.by_condition {
                let rt = c.mean_rt_ms.map_or_else(|| "-".to_string(), |rt| format!("{rt:.1} ms"));
                println!("  {condition}: {:.1}% correct, mean RT {rt}", c.accuracy * 100.0);
            }
        }
        println!(
            "Timer lateness: avg {:.3} ms, jitter {:.3} ms, max {:.3} ms over {} transitions",
            self.timing.average_ms, self.timing.jitter_ms, self.timing.max_ms, self.timing.transitions
        );
        println!("Session record: {}", self.record_path.display());
    }
}

/// Resolves the session plan from the command line. Returns the plan with
/// its seed filled in so the run can be reproduced.
pub fn resolve_plan(args: &Args) -> Result<ExperimentPlan> {
    let mut plan = match &args.plan {
        Some(path) => ExperimentPlan::from_path(path).with_context(|| format!("loading plan {}", path.display()))?,
        None => {
            let mut plan = ExperimentPlan::new(ParadigmParams::defaults(args.paradigm.into()));
            plan.practice_count = args.practice;
            plan.main_count = args.main_trials;
            plan
        }
    };
    if let Some(path) = &args.timing {
        plan.timing =
            TimingConfig::from_path(path).with_context(|| format!("loading timing {}", path.display()))?;
    }
    if args.seed.is_some() {
        plan.seed = args.seed;
    }
    if plan.seed.is_none() {
        plan.seed = Some(rand::random());
    }
    Ok(plan)
}

struct PendingResponse {
    key: String,
    at_ns: u64,
}

/// Drives one engine to completion on `clock`, answering with `participant`.
pub struct SessionDriver<C: Clock> {
    engine: TrialEngine<Box<dyn ParadigmAdapter>, C>,
    clock: C,
    events: EventLog,
    participant: SimulatedParticipant,
    pending: Option<PendingResponse>,
}

impl<C: Clock> SessionDriver<C> {
    pub fn new(
        config: ExperimentConfig,
        paradigm: Paradigm,
        clock: C,
        participant: SimulatedParticipant,
        batch: SessionBatch,
    ) -> Result<Self> {
        let events = EventLog::new();
        let engine = TrialEngine::new(config, adapter_for(paradigm), clock.clone())?
            .with_persistence(batch)
            .with_observer(events.clone());
        Ok(Self {
            engine,
            clock,
            events,
            participant,
            pending: None,
        })
    }

    pub fn engine(&self) -> &TrialEngine<Box<dyn ParadigmAdapter>, C> {
        &self.engine
    }

    pub fn run(&mut self) -> Result<()> {
        self.engine.start_practice()?;
        loop {
            self.handle_events();
            match self.engine.current_phase() {
                EngineStage::Complete => return Ok(()),
                EngineStage::PracticeComplete => {
                    info!("practice finished, starting main task");
                    self.engine.start_main_task()?;
                    continue;
                }
                _ => {}
            }

            let now = self.clock.now();
            if let Some(due) = self.pending.take_if(|p| p.at_ns <= now) {
                let outcome = self.engine.submit_response(&due.key, due.at_ns)?;
                debug!(key = %due.key, ?outcome, "simulated key press");
                continue;
            }

            let until_response = self
                .pending
                .as_ref()
                .map(|p| Duration::from_nanos(p.at_ns.saturating_sub(now)));
            let wait = match (self.engine.time_until_next_deadline(), until_response) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => bail!("engine is idle in the {} stage", self.engine.current_phase()),
            };
            self.clock.sleep(wait);
            self.engine.tick()?;
        }
    }

    fn handle_events(&mut self) {
        for event in self.events.drain() {
            match event {
                EngineEvent::TrialStarted {
                    trial,
                    index,
                    phase,
                    frame,
                    started_at_ns,
                } => {
                    debug!(%phase, trial = index, stimulus = %frame.text, "stimulus shown");
                    let valid = self.engine.adapter().valid_responses(&trial);
                    self.pending = self.participant.respond(&trial, &valid).map(|r| PendingResponse {
                        key: r.key,
                        at_ns: started_at_ns.saturating_add(r.after.as_nanos() as u64),
                    });
                }
                EngineEvent::ResponseTimedOut { index, phase } => {
                    // a planned press after the deadline never reaches the engine
                    self.pending = None;
                    debug!(%phase, trial = index, "no response");
                }
                EngineEvent::TrialEnded { result, phase, .. } if phase.is_practice() => {
                    info!(
                        trial = result.trial_index,
                        correct = result.is_correct,
                        rt_ms = ?result.reaction_time_ms,
                        "practice feedback"
                    );
                }
                EngineEvent::ResultSaved { index, phase, outcome } if !outcome.success => {
                    warn!(%phase, trial = index, "result only kept in memory");
                }
                EngineEvent::PhaseCompleted { phase, results } => {
                    let summary = SessionSummary::from_results(&results);
                    info!(%phase, trials = summary.trials, accuracy = summary.accuracy, "phase summary");
                }
                EngineEvent::SessionFlushed { outcome } => {
                    info!(shared = outcome.shared, fallback = outcome.fallback, "session stored");
                }
                _ => {}
            }
        }
    }
}

/// Builds the session from `args`, runs it on `clock` and writes the summary.
pub fn run_session<C: Clock>(args: &Args, clock: C) -> Result<SessionReport> {
    let plan = resolve_plan(args)?;
    let seed = plan.seed.unwrap_or_default();
    let paradigm = plan.params.paradigm();
    let config = plan.build()?;
    info!(
        %paradigm,
        seed,
        practice = config.practice_trials.len(),
        main = config.main_trials.len(),
        "session planned"
    );

    let mut store = JsonFileStore::new(&args.out_dir)
        .with_context(|| format!("creating output directory {}", args.out_dir.display()))?;
    let fallback = JsonFileStore::new(std::env::temp_dir().join("cogex-fallback"))?;
    let record_path = store.path_for(&args.participant);
    let batch = SessionBatch::new(args.participant.clone(), store.clone())
        .with_fallback(fallback)
        .with_metadata("paradigm", paradigm.as_str())
        .with_metadata("seed", seed.to_string());

    let participant = SimulatedParticipant::new(
        seed.rotate_left(17),
        args.accuracy,
        args.mean_rt_ms,
        args.miss_rate,
    );
    let mut driver = SessionDriver::new(config, paradigm, clock, participant, batch)?;
    driver.run()?;

    let engine = driver.engine();
    let report = SessionReport {
        participant_id: args.participant.clone(),
        paradigm,
        seed,
        practice: SessionSummary::from_results(engine.results(ExperimentPhase::Practice)),
        main: SessionSummary::from_results(engine.results(ExperimentPhase::Main)),
        timing: engine.timing_stats().into(),
        record_path,
    };

    let summary_key = format!("{}_summary", args.participant);
    store
        .upsert(&summary_key, &serde_json::to_value(&report)?)
        .with_context(|| format!("writing {}", store.path_for(&summary_key).display()))?;
    info!(path = %store.path_for(&summary_key).display(), "summary written");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use cogex_experiment::SessionRecord;
    use cogex_timing::ManualClock;

    fn args(dir: &std::path::Path, extra: &[&str]) -> Args {
        let mut argv = vec![
            "cogex".to_string(),
            "--out-dir".to_string(),
            dir.display().to_string(),
            "--virtual-clock".to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn virtual_session_writes_record_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(
            dir.path(),
            &["--paradigm", "stroop", "--practice", "3", "--main", "8", "--seed", "21", "--participant", "p/01"],
        );
        let report = run_session(&args, ManualClock::new()).unwrap();

        assert_eq!(report.practice.trials, 3);
        assert_eq!(report.main.trials, 8);
        assert_eq!(report.seed, 21);
        assert_eq!(report.timing.max_ms, 0.0);

        let record: SessionRecord =
            serde_json::from_reader(std::fs::File::open(&report.record_path).unwrap()).unwrap();
        assert_eq!(record.participant_id, "p/01");
        assert_eq!(record.results.len(), 11);
        assert_eq!(record.metadata["paradigm"], "stroop");
        let summary = dir.path().join("p_01_summary.json");
        assert_eq!(JsonFileStore::new(dir.path()).unwrap().path_for("p/01_summary"), summary);
        let written: serde_json::Value = serde_json::from_reader(std::fs::File::open(&summary).unwrap()).unwrap();
        assert_eq!(written["main"]["trials"], 8);
        assert!(!summary.with_extension("json.tmp").exists());
    }

    #[test]
    fn same_seed_reproduces_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let a = args(dir.path(), &["--practice", "2", "--main", "6", "--seed", "4", "--participant", "a"]);
        let b = args(dir.path(), &["--practice", "2", "--main", "6", "--seed", "4", "--participant", "b"]);
        let ra = run_session(&a, ManualClock::new()).unwrap();
        let rb = run_session(&b, ManualClock::new()).unwrap();
        assert_eq!(ra.main, rb.main);
        assert_eq!(ra.practice, rb.practice);
    }

    #[test]
    fn absent_participant_times_out_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), &["--practice", "0", "--main", "4", "--seed", "1", "--miss-rate", "1"]);
        let report = run_session(&args, ManualClock::new()).unwrap();
        assert_eq!(report.practice.trials, 0);
        assert_eq!(report.main.timeouts, 4);
        assert_eq!(report.main.mean_rt_ms, None);
    }

    #[test]
    fn plan_file_and_timing_override() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan.json");
        std::fs::write(
            &plan,
            r#"{"params": {"paradigm": "n_back", "n": 1, "letters": "XYZ"}, "practice_count": 2, "main_count": 5, "seed": 8}"#,
        )
        .unwrap();
        let timing = dir.path().join("timing.json");
        std::fs::write(&timing, r#"{"response_timeout_ms": 1500}"#).unwrap();

        let args = args(
            dir.path(),
            &["--plan", plan.to_str().unwrap(), "--timing", timing.to_str().unwrap()],
        );
        let resolved = resolve_plan(&args).unwrap();
        assert_eq!(resolved.params.paradigm(), Paradigm::NBack);
        assert_eq!(resolved.seed, Some(8));
        assert_eq!(resolved.timing.response_timeout_ms, 1500);
        assert_eq!(resolved.timing.fixation_delay_ms, 500);
    }

    #[test]
    fn missing_plan_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), &["--plan", "/nonexistent/plan.json"]);
        let err = resolve_plan(&args).unwrap_err();
        assert!(format!("{err:#}").contains("loading plan"));
    }
}
