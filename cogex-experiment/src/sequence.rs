//! Trial sequence generation.
//!
//! Every paradigm is balanced the same way: the number of trials in the
//! primary condition is fixed up front (`round(count * ratio)`) and the
//! order is shuffled afterwards, so a block of 40 flanker trials at a 0.5
//! ratio always holds exactly 20 congruent trials. Seeded generation is
//! reproducible byte for byte.

use cogex_core::{
    Direction, EngineError, InkColor, Paradigm, Result, StimulusPayload, TrialSpec, keys,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

fn half() -> f64 {
    0.5
}

fn default_target_ratio() -> f64 {
    0.3
}

fn default_valid_ratio() -> f64 {
    0.8
}

fn all_colors() -> Vec<InkColor> {
    InkColor::ALL.to_vec()
}

/// Paradigm-specific generation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "paradigm", rename_all = "snake_case")]
pub enum ParadigmParams {
    Flanker {
        #[serde(default = "half")]
        congruent_ratio: f64,
    },
    Stroop {
        #[serde(default = "all_colors")]
        colors: Vec<InkColor>,
        #[serde(default = "half")]
        congruent_ratio: f64,
    },
    VisualSearch {
        set_sizes: Vec<u32>,
        #[serde(default = "half")]
        present_ratio: f64,
    },
    NBack {
        n: u32,
        letters: String,
        #[serde(default = "default_target_ratio")]
        target_ratio: f64,
    },
    Posner {
        #[serde(default = "default_valid_ratio")]
        valid_ratio: f64,
    },
    MentalRotation {
        angles: Vec<u32>,
        #[serde(default = "half")]
        mirrored_ratio: f64,
    },
}

impl ParadigmParams {
    /// Commonly used parameters for each paradigm.
    pub fn defaults(paradigm: Paradigm) -> Self {
        match paradigm {
            Paradigm::Flanker => ParadigmParams::Flanker {
                congruent_ratio: half(),
            },
            Paradigm::Stroop => ParadigmParams::Stroop {
                colors: all_colors(),
                congruent_ratio: half(),
            },
            Paradigm::VisualSearch => ParadigmParams::VisualSearch {
                set_sizes: vec![4, 8, 16],
                present_ratio: half(),
            },
            Paradigm::NBack => ParadigmParams::NBack {
                n: 2,
                letters: "BCDFGHJKLM".to_string(),
                target_ratio: default_target_ratio(),
            },
            Paradigm::Posner => ParadigmParams::Posner {
                valid_ratio: default_valid_ratio(),
            },
            Paradigm::MentalRotation => ParadigmParams::MentalRotation {
                angles: vec![0, 60, 120, 180, 240, 300],
                mirrored_ratio: half(),
            },
        }
    }

    pub fn paradigm(&self) -> Paradigm {
        match self {
            ParadigmParams::Flanker { .. } => Paradigm::Flanker,
            ParadigmParams::Stroop { .. } => Paradigm::Stroop,
            ParadigmParams::VisualSearch { .. } => Paradigm::VisualSearch,
            ParadigmParams::NBack { .. } => Paradigm::NBack,
            ParadigmParams::Posner { .. } => Paradigm::Posner,
            ParadigmParams::MentalRotation { .. } => Paradigm::MentalRotation,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ParadigmParams::Flanker { congruent_ratio } => check_ratio("congruent_ratio", *congruent_ratio),
            ParadigmParams::Stroop {
                colors,
                congruent_ratio,
            } => {
                let mut distinct = colors.clone();
                distinct.sort_unstable();
                distinct.dedup();
                if distinct.len() < 2 {
                    return Err(EngineError::invalid_config(
                        "colors",
                        "Stroop needs at least two distinct colours",
                    ));
                }
                check_ratio("congruent_ratio", *congruent_ratio)
            }
            ParadigmParams::VisualSearch {
                set_sizes,
                present_ratio,
            } => {
                if set_sizes.is_empty() || set_sizes.contains(&0) {
                    return Err(EngineError::invalid_config(
                        "set_sizes",
                        "at least one set size, each holding at least one item",
                    ));
                }
                check_ratio("present_ratio", *present_ratio)
            }
            ParadigmParams::NBack {
                n,
                letters,
                target_ratio,
            } => {
                if *n == 0 {
                    return Err(EngineError::invalid_config("n", "must be at least 1"));
                }
                let mut distinct: Vec<char> = letters.chars().collect();
                distinct.sort_unstable();
                distinct.dedup();
                if distinct.len() < 2 || distinct.len() != letters.chars().count() {
                    return Err(EngineError::invalid_config(
                        "letters",
                        "needs at least two letters, without repeats",
                    ));
                }
                check_ratio("target_ratio", *target_ratio)
            }
            ParadigmParams::Posner { valid_ratio } => check_ratio("valid_ratio", *valid_ratio),
            ParadigmParams::MentalRotation {
                angles,
                mirrored_ratio,
            } => {
                if angles.is_empty() {
                    return Err(EngineError::invalid_config(
                        "angles",
                        "at least one rotation angle is required",
                    ));
                }
                check_ratio("mirrored_ratio", *mirrored_ratio)
            }
        }
    }
}

fn check_ratio(field: &str, ratio: f64) -> Result<()> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(())
    } else {
        Err(EngineError::invalid_config(
            field,
            format!("{ratio} is not within [0, 1]"),
        ))
    }
}

/// Generates `count` trials for the paradigm described by `params`.
///
/// With `Some(seed)` the output is fully determined by `(params, count,
/// seed)`. Without a seed the generator is seeded from the OS.
pub fn generate(params: &ParadigmParams, count: usize, seed: Option<u64>) -> Result<Vec<TrialSpec>> {
    if count < 1 {
        return Err(EngineError::invalid_config(
            "count",
            "at least one trial must be generated",
        ));
    }
    params.validate()?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let trials = match params {
        ParadigmParams::Flanker { congruent_ratio } => flanker(count, *congruent_ratio, &mut rng),
        ParadigmParams::Stroop {
            colors,
            congruent_ratio,
        } => stroop(count, colors, *congruent_ratio, &mut rng),
        ParadigmParams::VisualSearch {
            set_sizes,
            present_ratio,
        } => visual_search(count, set_sizes, *present_ratio, &mut rng),
        ParadigmParams::NBack {
            n,
            letters,
            target_ratio,
        } => n_back(count, *n, letters, *target_ratio, &mut rng),
        ParadigmParams::Posner { valid_ratio } => posner(count, *valid_ratio, &mut rng),
        ParadigmParams::MentalRotation {
            angles,
            mirrored_ratio,
        } => mental_rotation(count, angles, *mirrored_ratio, &mut rng),
    };

    debug!(
        paradigm = %params.paradigm(),
        count,
        seeded = seed.is_some(),
        "generated trial sequence"
    );
    Ok(trials)
}

/// `round(count * ratio)` trues in shuffled order.
fn balanced_flags(count: usize, ratio: f64, rng: &mut StdRng) -> Vec<bool> {
    let primary = ((count as f64 * ratio).round() as usize).min(count);
    let mut flags: Vec<bool> = (0..count).map(|i| i < primary).collect();
    flags.shuffle(rng);
    flags
}

/// Cycles through `levels` evenly, then shuffles.
fn balanced_levels<T: Copy>(count: usize, levels: &[T], rng: &mut StdRng) -> Vec<T> {
    let mut out: Vec<T> = (0..count).map(|i| levels[i % levels.len()]).collect();
    out.shuffle(rng);
    out
}

fn pick<T: Copy>(items: &[T], rng: &mut StdRng) -> T {
    items[rng.random_range(0..items.len())]
}

fn random_direction(rng: &mut StdRng) -> Direction {
    if rng.random_bool(0.5) {
        Direction::Left
    } else {
        Direction::Right
    }
}

fn flanker(count: usize, congruent_ratio: f64, rng: &mut StdRng) -> Vec<TrialSpec> {
    let congruent = balanced_flags(count, congruent_ratio, rng);
    let mut trials = Vec::with_capacity(count);
    for (index, congruent) in congruent.into_iter().enumerate() {
        let target = random_direction(rng);
        let flanker = if congruent { target } else { target.opposite() };
        trials.push(TrialSpec {
            index,
            stimulus: StimulusPayload::Flanker { target, flanker },
            correct_response: target.key().to_string(),
            condition: Some(if congruent { "congruent" } else { "incongruent" }.to_string()),
            set_size: None,
        });
    }
    trials
}

fn stroop(count: usize, colors: &[InkColor], congruent_ratio: f64, rng: &mut StdRng) -> Vec<TrialSpec> {
    let mut palette = colors.to_vec();
    palette.sort_unstable();
    palette.dedup();

    let congruent = balanced_flags(count, congruent_ratio, rng);
    let mut trials = Vec::with_capacity(count);
    for (index, congruent) in congruent.into_iter().enumerate() {
        let word = pick(&palette, rng);
        let ink = if congruent {
            word
        } else {
            let others: Vec<InkColor> = palette.iter().copied().filter(|c| *c != word).collect();
            pick(&others, rng)
        };
        trials.push(TrialSpec {
            index,
            stimulus: StimulusPayload::Stroop { word, ink },
            correct_response: ink.key().to_string(),
            condition: Some(if congruent { "congruent" } else { "incongruent" }.to_string()),
            set_size: None,
        });
    }
    trials
}

fn visual_search(count: usize, set_sizes: &[u32], present_ratio: f64, rng: &mut StdRng) -> Vec<TrialSpec> {
    let present = balanced_flags(count, present_ratio, rng);
    let sizes = balanced_levels(count, set_sizes, rng);
    present
        .into_iter()
        .zip(sizes)
        .enumerate()
        .map(|(index, (target_present, set_size))| TrialSpec {
            index,
            stimulus: StimulusPayload::VisualSearch {
                set_size,
                target_present,
            },
            correct_response: if target_present { keys::PRESENT } else { keys::ABSENT }.to_string(),
            condition: Some(if target_present { "present" } else { "absent" }.to_string()),
            set_size: Some(set_size),
        })
        .collect()
}

fn n_back(count: usize, n: u32, letters: &str, target_ratio: f64, rng: &mut StdRng) -> Vec<TrialSpec> {
    let alphabet: Vec<char> = letters.chars().collect();
    let lag = n as usize;
    // only positions with a letter `n` back can be targets
    let targets = balanced_flags(count.saturating_sub(lag), target_ratio, rng);

    let mut sequence: Vec<char> = Vec::with_capacity(count);
    let mut trials = Vec::with_capacity(count);
    for index in 0..count {
        let is_match = index >= lag && targets[index - lag];
        let letter = if is_match {
            sequence[index - lag]
        } else if index >= lag {
            let back = sequence[index - lag];
            let others: Vec<char> = alphabet.iter().copied().filter(|c| *c != back).collect();
            pick(&others, rng)
        } else {
            pick(&alphabet, rng)
        };
        sequence.push(letter);
        trials.push(TrialSpec {
            index,
            stimulus: StimulusPayload::NBack { letter, n, is_match },
            correct_response: if is_match { keys::MATCH } else { keys::NON_MATCH }.to_string(),
            condition: Some(if is_match { "target" } else { "non_target" }.to_string()),
            set_size: None,
        });
    }
    trials
}

fn posner(count: usize, valid_ratio: f64, rng: &mut StdRng) -> Vec<TrialSpec> {
    let valid = balanced_flags(count, valid_ratio, rng);
    let mut trials = Vec::with_capacity(count);
    for (index, valid) in valid.into_iter().enumerate() {
        let cue = random_direction(rng);
        let target = if valid { cue } else { cue.opposite() };
        trials.push(TrialSpec {
            index,
            stimulus: StimulusPayload::Posner { cue, target },
            correct_response: target.key().to_string(),
            condition: Some(if valid { "valid" } else { "invalid" }.to_string()),
            set_size: None,
        });
    }
    trials
}

fn mental_rotation(count: usize, angles: &[u32], mirrored_ratio: f64, rng: &mut StdRng) -> Vec<TrialSpec> {
    let mirrored = balanced_flags(count, mirrored_ratio, rng);
    let angles = balanced_levels(count, angles, rng);
    mirrored
        .into_iter()
        .zip(angles)
        .enumerate()
        .map(|(index, (mirrored, angle_deg))| TrialSpec {
            index,
            stimulus: StimulusPayload::MentalRotation {
                angle_deg,
                mirrored,
            },
            correct_response: if mirrored { keys::MIRRORED } else { keys::SAME }.to_string(),
            condition: Some(if mirrored { "mirrored" } else { "same" }.to_string()),
            set_size: None,
        })
        .collect()
}
