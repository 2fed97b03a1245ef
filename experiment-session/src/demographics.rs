use serde::{Deserialize, Serialize};

pub use common_types::{MAX_AGE, MIN_AGE};

use crate::error::ValidationError;

/// Choices offered by the participant form. Validation does not restrict
/// answers to these.
pub const SEX_OPTIONS: [&str; 4] = ["Weiblich", "Männlich", "Divers", "Keine Angabe"];

pub const DEGREE_OPTIONS: [&str; 12] = [
    "Kein Abschluss",
    "Hauptschulabschluss",
    "Realschulabschluss / Mittlere Reife",
    "Fachhochschulreife",
    "Abitur / Allgemeine Hochschulreife",
    "Berufsausbildung (IHK/HWK)",
    "Bachelor",
    "Master",
    "Staatsexamen",
    "Promotion",
    "Habilitation",
    "Sonstiges",
];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Demographics {
    pub sex: String,
    pub age: i32,
    pub degree: String,
}

impl Demographics {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sex.trim().is_empty() {
            return Err(ValidationError::SexRequired);
        }
        if !(MIN_AGE..=MAX_AGE).contains(&self.age) {
            return Err(ValidationError::AgeOutOfRange(self.age));
        }
        if self.degree.trim().is_empty() {
            return Err(ValidationError::DegreeRequired);
        }
        Ok(())
    }
}

pub fn validate_confidence(confidence: i32) -> Result<(), ValidationError> {
    if (0..=100).contains(&confidence) {
        Ok(())
    } else {
        Err(ValidationError::ConfidenceOutOfRange(confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demographics(sex: &str, age: i32, degree: &str) -> Demographics {
        Demographics {
            sex: sex.to_string(),
            age,
            degree: degree.to_string(),
        }
    }

    #[test]
    fn test_form_options_are_valid_answers() {
        for sex in SEX_OPTIONS {
            for degree in DEGREE_OPTIONS {
                demographics(sex, 30, degree).validate().unwrap();
            }
        }
    }

    #[test]
    fn test_age_bounds_are_inclusive() {
        demographics("Divers", 13, "Master").validate().unwrap();
        demographics("Divers", 120, "Master").validate().unwrap();

        assert_eq!(
            demographics("Divers", 12, "Master").validate(),
            Err(ValidationError::AgeOutOfRange(12))
        );
        assert_eq!(
            demographics("Divers", 121, "Master").validate(),
            Err(ValidationError::AgeOutOfRange(121))
        );
    }

    #[test]
    fn test_blank_answers_are_rejected() {
        assert_eq!(
            demographics(" ", 30, "Master").validate(),
            Err(ValidationError::SexRequired)
        );
        assert_eq!(
            demographics("Weiblich", 30, "").validate(),
            Err(ValidationError::DegreeRequired)
        );
    }

    #[test]
    fn test_confidence_range() {
        validate_confidence(0).unwrap();
        validate_confidence(100).unwrap();
        assert_eq!(
            validate_confidence(101),
            Err(ValidationError::ConfidenceOutOfRange(101))
        );
        assert_eq!(
            validate_confidence(-1),
            Err(ValidationError::ConfidenceOutOfRange(-1))
        );
    }
}
