//! Three-tier risk zones.

use serde::{Deserialize, Serialize};

use crate::profile::ExposureProfile;

/// Risk zone for a dose fraction or a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskZone {
    Safe,
    Caution,
    Danger,
}

impl RiskZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskZone::Safe => "SAFE",
            RiskZone::Caution => "CAUTION",
            RiskZone::Danger => "DANGER",
        }
    }
}

impl std::fmt::Display for RiskZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `< 0.5` SAFE, `< 1.0` CAUTION, otherwise DANGER.
pub fn zone_from_dose_fraction(dose: f64) -> RiskZone {
    if dose < 0.5 {
        RiskZone::Safe
    } else if dose < 1.0 {
        RiskZone::Caution
    } else {
        RiskZone::Danger
    }
}

/// `< ref_db - 15` SAFE, `< ref_db` CAUTION, otherwise DANGER.
pub fn zone_from_level(level_db: f64, profile: &ExposureProfile) -> RiskZone {
    if level_db < profile.safe_level_db() {
        RiskZone::Safe
    } else if level_db < profile.ref_db {
        RiskZone::Caution
    } else {
        RiskZone::Danger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dose_bands() {
        assert_eq!(zone_from_dose_fraction(0.0), RiskZone::Safe);
        assert_eq!(zone_from_dose_fraction(0.49), RiskZone::Safe);
        assert_eq!(zone_from_dose_fraction(0.5), RiskZone::Caution);
        assert_eq!(zone_from_dose_fraction(0.999), RiskZone::Caution);
        assert_eq!(zone_from_dose_fraction(1.0), RiskZone::Danger);
        assert_eq!(zone_from_dose_fraction(3.5), RiskZone::Danger);
    }

    #[test]
    fn level_bands() {
        let p = ExposureProfile::niosh();
        assert_eq!(zone_from_level(69.9, &p), RiskZone::Safe);
        assert_eq!(zone_from_level(70.0, &p), RiskZone::Caution);
        assert_eq!(zone_from_level(84.9, &p), RiskZone::Caution);
        assert_eq!(zone_from_level(85.0, &p), RiskZone::Danger);
    }

    #[test]
    fn serializes_upper_case() {
        assert_eq!(serde_json::to_string(&RiskZone::Caution).unwrap(), "\"CAUTION\"");
    }
}
