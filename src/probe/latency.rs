//! Round-trip latency ratings for network and database checks

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Which thresholds apply to a measured round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Socket connect or TLS handshake to a directory or identity provider
    Network,
    /// Round trip reported by a database connection helper
    Database,
}

impl ProbeKind {
    /// `(low, high)` thresholds
    #[must_use]
    pub const fn thresholds(&self) -> (Duration, Duration) {
        match self {
            Self::Network => (Duration::from_millis(100), Duration::from_millis(300)),
            Self::Database => (Duration::from_millis(10), Duration::from_millis(30)),
        }
    }
}

/// Advisory latency rating; never fails a validation on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyClass {
    Acceptable,
    PerformanceDegradation,
    PotentialFailure,
}

impl LatencyClass {
    /// Rate `round_trip` against the thresholds of `kind`
    #[must_use]
    pub fn classify(round_trip: Duration, kind: ProbeKind) -> Self {
        let (low, high) = kind.thresholds();
        if round_trip < low {
            Self::Acceptable
        } else if round_trip < high {
            Self::PerformanceDegradation
        } else {
            Self::PotentialFailure
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Acceptable => "Acceptable",
            Self::PerformanceDegradation => "Performance Degradation",
            Self::PotentialFailure => "Potential Failure",
        }
    }
}

impl fmt::Display for LatencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_network_thresholds() {
        assert_eq!(LatencyClass::classify(ms(50), ProbeKind::Network), LatencyClass::Acceptable);
        assert_eq!(
            LatencyClass::classify(ms(150), ProbeKind::Network),
            LatencyClass::PerformanceDegradation
        );
        assert_eq!(LatencyClass::classify(ms(400), ProbeKind::Network), LatencyClass::PotentialFailure);
    }

    #[test]
    fn test_database_thresholds() {
        assert_eq!(LatencyClass::classify(ms(5), ProbeKind::Database), LatencyClass::Acceptable);
        assert_eq!(
            LatencyClass::classify(ms(20), ProbeKind::Database),
            LatencyClass::PerformanceDegradation
        );
        assert_eq!(LatencyClass::classify(ms(40), ProbeKind::Database), LatencyClass::PotentialFailure);
    }

    #[test]
    fn test_boundaries_belong_to_the_worse_class() {
        assert_eq!(
            LatencyClass::classify(ms(100), ProbeKind::Network),
            LatencyClass::PerformanceDegradation
        );
        assert_eq!(LatencyClass::classify(ms(30), ProbeKind::Database), LatencyClass::PotentialFailure);
    }

    #[test]
    fn test_classification_is_monotonic() {
        for kind in [ProbeKind::Network, ProbeKind::Database] {
            let mut previous = LatencyClass::Acceptable;
            for millis in 0..500 {
                let class = LatencyClass::classify(ms(millis), kind);
                assert!(class >= previous, "{kind:?} regressed at {millis}ms");
                previous = class;
            }
        }
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(LatencyClass::PerformanceDegradation.to_string(), "Performance Degradation");
        assert_eq!(
            serde_json::to_string(&LatencyClass::PotentialFailure).unwrap(),
            "\"potential_failure\""
        );
    }
}
