use serde::{Deserialize, Serialize};
use std::fmt;

/// Response key names, as delivered by the input source.
pub mod keys {
    pub const LEFT: &str = "ArrowLeft";
    pub const RIGHT: &str = "ArrowRight";
    pub const PRESENT: &str = "f";
    pub const ABSENT: &str = "j";
    pub const MATCH: &str = "j";
    pub const NON_MATCH: &str = "f";
    pub const SAME: &str = "s";
    pub const MIRRORED: &str = "d";
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Paradigm {
    Flanker,
    Stroop,
    VisualSearch,
    NBack,
    Posner,
    MentalRotation,
}

impl Paradigm {
    pub const ALL: [Paradigm; 6] = [
        Paradigm::Flanker,
        Paradigm::Stroop,
        Paradigm::VisualSearch,
        Paradigm::NBack,
        Paradigm::Posner,
        Paradigm::MentalRotation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Paradigm::Flanker => "flanker",
            Paradigm::Stroop => "stroop",
            Paradigm::VisualSearch => "visual_search",
            Paradigm::NBack => "n_back",
            Paradigm::Posner => "posner",
            Paradigm::MentalRotation => "mental_rotation",
        }
    }
}

impl fmt::Display for Paradigm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Direction::Left => keys::LEFT,
            Direction::Right => keys::RIGHT,
        }
    }

    pub fn arrow(&self) -> char {
        match self {
            Direction::Left => '<',
            Direction::Right => '>',
        }
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InkColor {
    Red,
    Green,
    Blue,
    Yellow,
}

impl InkColor {
    pub const ALL: [InkColor; 4] = [InkColor::Red, InkColor::Green, InkColor::Blue, InkColor::Yellow];

    /// Response key: the first letter of the colour name.
    pub fn key(&self) -> &'static str {
        match self {
            InkColor::Red => "r",
            InkColor::Green => "g",
            InkColor::Blue => "b",
            InkColor::Yellow => "y",
        }
    }

    pub fn word(&self) -> &'static str {
        match self {
            InkColor::Red => "RED",
            InkColor::Green => "GREEN",
            InkColor::Blue => "BLUE",
            InkColor::Yellow => "YELLOW",
        }
    }

    pub fn rgba(&self) -> [u8; 4] {
        match self {
            InkColor::Red => [255, 0, 0, 255],
            InkColor::Green => [0, 255, 0, 255],
            InkColor::Blue => [0, 0, 255, 255],
            InkColor::Yellow => [255, 255, 0, 255],
        }
    }
}

/// Paradigm-specific stimulus description carried by a trial.
///
/// The engine never looks inside; only the paradigm adapters and the
/// sequence generator do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "paradigm", rename_all = "snake_case")]
pub enum StimulusPayload {
    Flanker {
        target: Direction,
        flanker: Direction,
    },
    Stroop {
        word: InkColor,
        ink: InkColor,
    },
    VisualSearch {
        set_size: u32,
        target_present: bool,
    },
    NBack {
        letter: char,
        n: u32,
        is_match: bool,
    },
    Posner {
        cue: Direction,
        target: Direction,
    },
    MentalRotation {
        angle_deg: u32,
        mirrored: bool,
    },
}

impl StimulusPayload {
    pub fn paradigm(&self) -> Paradigm {
        match self {
            StimulusPayload::Flanker { .. } => Paradigm::Flanker,
            StimulusPayload::Stroop { .. } => Paradigm::Stroop,
            StimulusPayload::VisualSearch { .. } => Paradigm::VisualSearch,
            StimulusPayload::NBack { .. } => Paradigm::NBack,
            StimulusPayload::Posner { .. } => Paradigm::Posner,
            StimulusPayload::MentalRotation { .. } => Paradigm::MentalRotation,
        }
    }

    pub fn description(&self) -> String {
        match self {
            StimulusPayload::Flanker { target, flanker } => {
                let f = flanker.arrow();
                format!("{f}{f}{}{f}{f}", target.arrow())
            }
            StimulusPayload::Stroop { word, ink } => {
                format!("{} in {:?} ink", word.word(), ink)
            }
            StimulusPayload::VisualSearch {
                set_size,
                target_present,
            } => format!(
                "{set_size} items, target {}",
                if *target_present { "present" } else { "absent" }
            ),
            StimulusPayload::NBack { letter, n, .. } => format!("{letter} ({n}-back)"),
            StimulusPayload::Posner { cue, target } => {
                format!("cue {cue:?}, target {target:?}")
            }
            StimulusPayload::MentalRotation {
                angle_deg,
                mirrored,
            } => format!(
                "{angle_deg}\u{b0} rotation, {}",
                if *mirrored { "mirrored" } else { "same" }
            ),
        }
    }
}
