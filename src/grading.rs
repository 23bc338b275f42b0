//! Mark-to-grade mapping.
//!
//! Letter grades band performance on the overall mark; pass/fail and division
//! are derived from a percentage and use their own thresholds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const PASS_PERCENTAGE: f64 = 33.0;

/// Letter grade, ordered from lowest (`E`) to highest (`A+`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "E")]
    E,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

const GRADE_BANDS: &[(f64, Grade)] = &[
    (90.0, Grade::APlus),
    (80.0, Grade::A),
    (70.0, Grade::BPlus),
    (60.0, Grade::B),
    (50.0, Grade::CPlus),
    (45.0, Grade::C),
    (40.0, Grade::D),
];

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
        }
    }

    pub fn is_fail(self) -> bool {
        self == Grade::E
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown grade `{0}`")]
pub struct UnknownGrade(pub String);

impl FromStr for Grade {
    type Err = UnknownGrade;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "A+" => Ok(Grade::APlus),
            "A" => Ok(Grade::A),
            "B+" => Ok(Grade::BPlus),
            "B" => Ok(Grade::B),
            "C+" => Ok(Grade::CPlus),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "E" | "F" => Ok(Grade::E),
            _ => Err(UnknownGrade(value.to_string())),
        }
    }
}

/// Clamps a mark into `[0, 100]`. NaN is treated as zero so every input maps somewhere.
pub fn clamp_mark(mark: f64) -> f64 {
    if mark.is_nan() {
        0.0
    } else {
        mark.clamp(0.0, 100.0)
    }
}

pub fn grade(overall_mark: f64) -> Grade {
    let mark = clamp_mark(overall_mark);
    GRADE_BANDS
        .iter()
        .find(|(threshold, _)| mark >= *threshold)
        .map(|(_, grade)| *grade)
        .unwrap_or(Grade::E)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PassFail {
    Pass,
    Fail,
}

impl PassFail {
    pub fn as_str(self) -> &'static str {
        match self {
            PassFail::Pass => "PASS",
            PassFail::Fail => "FAIL",
        }
    }
}

impl fmt::Display for PassFail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn pass_fail(percentage: f64) -> PassFail {
    if clamp_mark(percentage) >= PASS_PERCENTAGE {
        PassFail::Pass
    } else {
        PassFail::Fail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Division {
    Fail,
    Third,
    Second,
    First,
    Distinction,
}

impl Division {
    pub fn label(self) -> &'static str {
        match self {
            Division::Distinction => "First Division with Distinction",
            Division::First => "First Division",
            Division::Second => "Second Division",
            Division::Third => "Third Division",
            Division::Fail => "Fail",
        }
    }
}

pub fn division(percentage: f64) -> Division {
    let percentage = clamp_mark(percentage);
    if percentage >= 75.0 {
        Division::Distinction
    } else if percentage >= 60.0 {
        Division::First
    } else if percentage >= 45.0 {
        Division::Second
    } else if percentage >= PASS_PERCENTAGE {
        Division::Third
    } else {
        Division::Fail
    }
}
