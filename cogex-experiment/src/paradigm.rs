//! Per-paradigm adapters consumed generically by the engine.

use cogex_core::{Direction, ExperimentPhase, InkColor, Paradigm, StimulusPayload, TrialSpec, keys};
use serde::Serialize;
use std::collections::BTreeSet;

/// What a renderer needs to draw for the stimulus stage of one trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StimulusFrame {
    pub paradigm: Paradigm,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<[u8; 4]>,
    /// Practice trials show accuracy feedback, main trials do not.
    pub show_feedback: bool,
}

pub trait ParadigmAdapter {
    fn paradigm(&self) -> Paradigm;

    fn render_stimulus(&self, trial: &TrialSpec, phase: ExperimentPhase) -> StimulusFrame;

    /// Keys that count as a response for `trial`. Anything else is ignored.
    fn valid_responses(&self, trial: &TrialSpec) -> BTreeSet<String>;
}

impl<T: ParadigmAdapter + ?Sized> ParadigmAdapter for Box<T> {
    fn paradigm(&self) -> Paradigm {
        (**self).paradigm()
    }

    fn render_stimulus(&self, trial: &TrialSpec, phase: ExperimentPhase) -> StimulusFrame {
        (**self).render_stimulus(trial, phase)
    }

    fn valid_responses(&self, trial: &TrialSpec) -> BTreeSet<String> {
        (**self).valid_responses(trial)
    }
}

fn response_set(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

fn frame(paradigm: Paradigm, text: String, phase: ExperimentPhase) -> StimulusFrame {
    StimulusFrame {
        paradigm,
        text,
        color: None,
        show_feedback: phase.is_practice(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlankerTask;

impl ParadigmAdapter for FlankerTask {
    fn paradigm(&self) -> Paradigm {
        Paradigm::Flanker
    }

    fn render_stimulus(&self, trial: &TrialSpec, phase: ExperimentPhase) -> StimulusFrame {
        frame(Paradigm::Flanker, trial.stimulus.description(), phase)
    }

    fn valid_responses(&self, _trial: &TrialSpec) -> BTreeSet<String> {
        response_set(&[keys::LEFT, keys::RIGHT])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StroopTask;

impl ParadigmAdapter for StroopTask {
    fn paradigm(&self) -> Paradigm {
        Paradigm::Stroop
    }

    fn render_stimulus(&self, trial: &TrialSpec, phase: ExperimentPhase) -> StimulusFrame {
        match &trial.stimulus {
            StimulusPayload::Stroop { word, ink } => StimulusFrame {
                color: Some(ink.rgba()),
                ..frame(Paradigm::Stroop, word.word().to_string(), phase)
            },
            other => frame(Paradigm::Stroop, other.description(), phase),
        }
    }

    fn valid_responses(&self, _trial: &TrialSpec) -> BTreeSet<String> {
        InkColor::ALL.iter().map(|c| c.key().to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VisualSearchTask;

impl ParadigmAdapter for VisualSearchTask {
    fn paradigm(&self) -> Paradigm {
        Paradigm::VisualSearch
    }

    fn render_stimulus(&self, trial: &TrialSpec, phase: ExperimentPhase) -> StimulusFrame {
        let text = match &trial.stimulus {
            StimulusPayload::VisualSearch { set_size, .. } => format!("search array of {set_size} items"),
            other => other.description(),
        };
        frame(Paradigm::VisualSearch, text, phase)
    }

    fn valid_responses(&self, _trial: &TrialSpec) -> BTreeSet<String> {
        response_set(&[keys::PRESENT, keys::ABSENT])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NBackTask;

impl ParadigmAdapter for NBackTask {
    fn paradigm(&self) -> Paradigm {
        Paradigm::NBack
    }

    fn render_stimulus(&self, trial: &TrialSpec, phase: ExperimentPhase) -> StimulusFrame {
        let text = match &trial.stimulus {
            StimulusPayload::NBack { letter, .. } => letter.to_string(),
            other => other.description(),
        };
        frame(Paradigm::NBack, text, phase)
    }

    fn valid_responses(&self, _trial: &TrialSpec) -> BTreeSet<String> {
        response_set(&[keys::MATCH, keys::NON_MATCH])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PosnerTask;

impl ParadigmAdapter for PosnerTask {
    fn paradigm(&self) -> Paradigm {
        Paradigm::Posner
    }

    fn render_stimulus(&self, trial: &TrialSpec, phase: ExperimentPhase) -> StimulusFrame {
        let text = match &trial.stimulus {
            StimulusPayload::Posner { cue, target } => {
                let box_for = |side: Direction| {
                    let cued = if *cue == side { "=" } else { " " };
                    let star = if *target == side { "*" } else { " " };
                    format!("[{cued}{star}{cued}]")
                };
                format!("{}   +   {}", box_for(Direction::Left), box_for(Direction::Right))
            }
            other => other.description(),
        };
        frame(Paradigm::Posner, text, phase)
    }

    fn valid_responses(&self, _trial: &TrialSpec) -> BTreeSet<String> {
        response_set(&[keys::LEFT, keys::RIGHT])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MentalRotationTask;

impl ParadigmAdapter for MentalRotationTask {
    fn paradigm(&self) -> Paradigm {
        Paradigm::MentalRotation
    }

    fn render_stimulus(&self, trial: &TrialSpec, phase: ExperimentPhase) -> StimulusFrame {
        let text = match &trial.stimulus {
            StimulusPayload::MentalRotation {
                angle_deg,
                mirrored,
            } => format!("R | {} rotated {angle_deg}\u{b0}", if *mirrored { "\u{42f}" } else { "R" }),
            other => other.description(),
        };
        frame(Paradigm::MentalRotation, text, phase)
    }

    fn valid_responses(&self, _trial: &TrialSpec) -> BTreeSet<String> {
        response_set(&[keys::SAME, keys::MIRRORED])
    }
}

pub fn adapter_for(paradigm: Paradigm) -> Box<dyn ParadigmAdapter> {
    match paradigm {
        Paradigm::Flanker => Box::new(FlankerTask),
        Paradigm::Stroop => Box::new(StroopTask),
        Paradigm::VisualSearch => Box::new(VisualSearchTask),
        Paradigm::NBack => Box::new(NBackTask),
        Paradigm::Posner => Box::new(PosnerTask),
        Paradigm::MentalRotation => Box::new(MentalRotationTask),
    }
}
