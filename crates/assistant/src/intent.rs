//! The five intake categories plus the human-handoff fallback.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// 1: blood needed within ~48 hours.
    UrgentBloodLogistics,
    /// 2: booking or moving a future transfusion.
    RoutineScheduling,
    /// 3: general questions.
    GeneralInformation,
    /// 4: emotional or community support.
    EmotionalSupport,
    /// 5: red-flag symptoms; overrides 1.
    MedicalAttention,
    /// Anything the classifier could not place.
    Unknown,
}

impl Intent {
    /// Map a category number to its intent. Only 1–5 are categories.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Intent::UrgentBloodLogistics,
            2 => Intent::RoutineScheduling,
            3 => Intent::GeneralInformation,
            4 => Intent::EmotionalSupport,
            5 => Intent::MedicalAttention,
            _ => Intent::Unknown,
        }
    }

    /// Category number; `Unknown` is 6.
    pub fn code(self) -> u8 {
        match self {
            Intent::UrgentBloodLogistics => 1,
            Intent::RoutineScheduling => 2,
            Intent::GeneralInformation => 3,
            Intent::EmotionalSupport => 4,
            Intent::MedicalAttention => 5,
            Intent::Unknown => 6,
        }
    }

    /// Read the category from raw model output: the first ASCII digit
    /// found decides, and anything but 1–5 is `Unknown`.
    pub fn parse(output: &str) -> Self {
        output
            .trim()
            .chars()
            .find_map(|c| c.to_digit(10))
            .map_or(Intent::Unknown, Intent::from_code)
    }

    pub fn label(self) -> &'static str {
        match self {
            Intent::UrgentBloodLogistics => "urgent_blood_logistics",
            Intent::RoutineScheduling => "routine_scheduling",
            Intent::GeneralInformation => "general_information",
            Intent::EmotionalSupport => "emotional_support",
            Intent::MedicalAttention => "medical_attention",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
