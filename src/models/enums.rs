use serde::{Deserialize, Serialize};

use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The wire name (serde) and the `as_str` name are the same literal.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Gender {
    Male => "male",
    Female => "female",
    Other => "other",
});

str_enum!(LifeExpectancy {
    LessThanOneYear => "less_than_1_year",
    OneToFiveYears => "1_to_5_years",
    FiveToTenYears => "5_to_10_years",
    MoreThanTenYears => "more_than_10_years",
});

str_enum!(DurationCategory {
    ShortTerm => "short_term",
    LongTerm => "long_term",
    Unknown => "unknown",
});

str_enum!(RiskCategory {
    Red => "RED",
    Yellow => "YELLOW",
    Green => "GREEN",
});

str_enum!(DocumentKind {
    Prescription => "prescription",
    BrownBag => "brown-bag",
});

str_enum!(Confidence {
    High => "high",
    Medium => "medium",
    Low => "low",
});

str_enum!(FocusKind {
    TaperPlan => "taper",
    MonitoringDetail => "monitoring",
    InteractionDetail => "interaction",
});

impl RiskCategory {
    /// Display order: RED first.
    pub const ALL: [RiskCategory; 3] = [Self::Red, Self::Yellow, Self::Green];
}

impl Default for DurationCategory {
    fn default() -> Self {
        Self::Unknown
    }
}

impl DurationCategory {
    /// Lenient mapping for free-text durations coming back from extraction.
    pub fn from_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "short_term" | "short" => Self::ShortTerm,
            "long_term" | "long" | "chronic" => Self::LongTerm,
            _ => Self::Unknown,
        }
    }
}

/// Herb–drug interaction severity.
///
/// Values outside Major/Moderate/Minor are kept as `Unrecognised` so a new
/// server label never fails the whole analysis payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Major,
    Moderate,
    Minor,
    #[serde(untagged)]
    Unrecognised(String),
}

impl Severity {
    /// Sort rank, lower sorts first: Major > Moderate > Minor > anything else.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Major => 0,
            Self::Moderate => 1,
            Self::Minor => 2,
            Self::Unrecognised(_) => 3,
        }
    }
}
