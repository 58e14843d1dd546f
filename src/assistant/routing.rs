//! Mapping the router's free-text label onto a specialist.

use serde::Serialize;

use super::{CALENDAR, FITNESS, GENERAL, WEATHER};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Specialist {
    Recovery,
    Fitness,
    Weather,
    Calendar,
    General,
}

/// Match order. Recovery is checked before fitness so a label naming both
/// still gets recovery advice.
const PRIORITY: [Specialist; 4] = [
    Specialist::Recovery,
    Specialist::Fitness,
    Specialist::Weather,
    Specialist::Calendar,
];

impl Specialist {
    pub fn label(self) -> &'static str {
        match self {
            Specialist::Recovery => "RecoveryCoach",
            Specialist::Fitness => "StravaCoach",
            Specialist::Weather => "WeatherAssistant",
            Specialist::Calendar => "CalendarAssistant",
            Specialist::General => "GeneralAssistant",
        }
    }

    /// First step to run for this specialist. Recovery starts by fetching
    /// fitness data.
    pub fn step(self) -> &'static str {
        match self {
            Specialist::Recovery | Specialist::Fitness => FITNESS,
            Specialist::Weather => WEATHER,
            Specialist::Calendar => CALENDAR,
            Specialist::General => GENERAL,
        }
    }
}

/// Case-insensitive substring match against the known labels. Anything
/// unrecognised goes to the general assistant.
pub fn select_specialist(label: &str) -> Specialist {
    let label = label.to_lowercase();
    PRIORITY
        .into_iter()
        .find(|s| label.contains(&s.label().to_lowercase()))
        .unwrap_or(Specialist::General)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_labels() {
        assert_eq!(select_specialist("StravaCoach"), Specialist::Fitness);
        assert_eq!(select_specialist("WeatherAssistant"), Specialist::Weather);
        assert_eq!(select_specialist("CalendarAssistant"), Specialist::Calendar);
        assert_eq!(select_specialist("RecoveryCoach"), Specialist::Recovery);
        assert_eq!(select_specialist("GeneralAssistant"), Specialist::General);
    }

    #[test]
    fn test_label_with_noise_and_case() {
        assert_eq!(select_specialist("  I think: stravacoach.\n"), Specialist::Fitness);
        assert_eq!(select_specialist("'WEATHERASSISTANT'"), Specialist::Weather);
    }

    #[test]
    fn test_unknown_label_falls_back_to_general() {
        assert_eq!(select_specialist(""), Specialist::General);
        assert_eq!(select_specialist("NutritionCoach"), Specialist::General);
    }

    #[test]
    fn test_priority_when_several_labels_match() {
        assert_eq!(select_specialist("StravaCoach or RecoveryCoach"), Specialist::Recovery);
        assert_eq!(select_specialist("WeatherAssistant, StravaCoach"), Specialist::Fitness);
        assert_eq!(select_specialist("CalendarAssistant WeatherAssistant"), Specialist::Weather);
    }

    #[test]
    fn test_recovery_starts_at_fitness_step() {
        assert_eq!(Specialist::Recovery.step(), FITNESS);
        assert_eq!(Specialist::General.step(), GENERAL);
    }
}
