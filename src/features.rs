use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ValueError;

pub const BASE_FEATURE_NAMES: [&str; 9] = [
    "overall",
    "potential",
    "wage",
    "international_reputation",
    "skill_moves",
    "weak_foot",
    "age",
    "height_cm",
    "weight_kg",
];

pub const POSITION_PREFIX: &str = "position_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum Position {
    CB,
    CDM,
    CF,
    CM,
    GK,
    LAM,
    LB,
    LCB,
    LCM,
    LDM,
    LF,
    LM,
    LS,
    LW,
    LWB,
    RAM,
    RB,
    RCB,
    RCM,
    RDM,
    RF,
    RM,
    RS,
    RW,
    RWB,
    ST,
}

impl Position {
    pub const ALL: [Position; 26] = [
        Position::CB,
        Position::CDM,
        Position::CF,
        Position::CM,
        Position::GK,
        Position::LAM,
        Position::LB,
        Position::LCB,
        Position::LCM,
        Position::LDM,
        Position::LF,
        Position::LM,
        Position::LS,
        Position::LW,
        Position::LWB,
        Position::RAM,
        Position::RB,
        Position::RCB,
        Position::RCM,
        Position::RDM,
        Position::RF,
        Position::RM,
        Position::RS,
        Position::RW,
        Position::RWB,
        Position::ST,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Position::CB => "CB",
            Position::CDM => "CDM",
            Position::CF => "CF",
            Position::CM => "CM",
            Position::GK => "GK",
            Position::LAM => "LAM",
            Position::LB => "LB",
            Position::LCB => "LCB",
            Position::LCM => "LCM",
            Position::LDM => "LDM",
            Position::LF => "LF",
            Position::LM => "LM",
            Position::LS => "LS",
            Position::LW => "LW",
            Position::LWB => "LWB",
            Position::RAM => "RAM",
            Position::RB => "RB",
            Position::RCB => "RCB",
            Position::RCM => "RCM",
            Position::RDM => "RDM",
            Position::RF => "RF",
            Position::RM => "RM",
            Position::RS => "RS",
            Position::RW => "RW",
            Position::RWB => "RWB",
            Position::ST => "ST",
        }
    }

    pub fn indicator_name(self) -> String {
        format!("{POSITION_PREFIX}{}", self.code())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Position {
    type Err = ValueError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let code = raw.trim();
        Position::ALL
            .iter()
            .copied()
            .find(|p| p.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| ValueError::InvalidPosition(raw.to_string()))
    }
}

/// Closed domain of one manual-input attribute, plus the form default and step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub min: u32,
    pub max: u32,
    pub default: u32,
    pub step: u32,
}

impl AttributeSpec {
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn clamp(&self, value: u32) -> u32 {
        value.clamp(self.min, self.max)
    }
}

// Same order as BASE_FEATURE_NAMES.
pub const ATTRIBUTE_SPECS: [AttributeSpec; 9] = [
    AttributeSpec {
        name: "overall",
        label: "Overall",
        min: 40,
        max: 99,
        default: 75,
        step: 1,
    },
    AttributeSpec {
        name: "potential",
        label: "Potential",
        min: 40,
        max: 99,
        default: 80,
        step: 1,
    },
    AttributeSpec {
        name: "wage",
        label: "Wage (€/week)",
        min: 1_000,
        max: 1_000_000,
        default: 12_000,
        step: 1_000,
    },
    AttributeSpec {
        name: "international_reputation",
        label: "International Reputation",
        min: 1,
        max: 5,
        default: 2,
        step: 1,
    },
    AttributeSpec {
        name: "skill_moves",
        label: "Skill Moves",
        min: 1,
        max: 5,
        default: 3,
        step: 1,
    },
    AttributeSpec {
        name: "weak_foot",
        label: "Weak Foot",
        min: 1,
        max: 5,
        default: 3,
        step: 1,
    },
    AttributeSpec {
        name: "age",
        label: "Age",
        min: 16,
        max: 45,
        default: 25,
        step: 1,
    },
    AttributeSpec {
        name: "height_cm",
        label: "Height (cm)",
        min: 150,
        max: 210,
        default: 180,
        step: 1,
    },
    AttributeSpec {
        name: "weight_kg",
        label: "Weight (kg)",
        min: 50,
        max: 120,
        default: 75,
        step: 1,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerAttributes {
    pub overall: u32,
    pub potential: u32,
    pub wage: u32,
    pub international_reputation: u32,
    pub skill_moves: u32,
    pub weak_foot: u32,
    pub age: u32,
    pub height_cm: u32,
    pub weight_kg: u32,
}

impl Default for PlayerAttributes {
    fn default() -> Self {
        Self::from_values(ATTRIBUTE_SPECS.map(|spec| spec.default))
    }
}

impl PlayerAttributes {
    pub fn from_values(values: [u32; 9]) -> Self {
        let [
            overall,
            potential,
            wage,
            international_reputation,
            skill_moves,
            weak_foot,
            age,
            height_cm,
            weight_kg,
        ] = values;
        Self {
            overall,
            potential,
            wage,
            international_reputation,
            skill_moves,
            weak_foot,
            age,
            height_cm,
            weight_kg,
        }
    }

    pub fn values(&self) -> [u32; 9] {
        [
            self.overall,
            self.potential,
            self.wage,
            self.international_reputation,
            self.skill_moves,
            self.weak_foot,
            self.age,
            self.height_cm,
            self.weight_kg,
        ]
    }

    pub fn check_ranges(&self) -> Result<(), ValueError> {
        for (spec, value) in ATTRIBUTE_SPECS.iter().zip(self.values()) {
            if !spec.contains(value) {
                return Err(ValueError::InvalidRange {
                    field: spec.name,
                    value: value as f64,
                    min: spec.min as f64,
                    max: spec.max as f64,
                });
            }
        }
        Ok(())
    }
}

/// Feature name to value, in build order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    entries: Vec<(String, f64)>,
}

impl FeatureRecord {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn key_set(&self) -> HashSet<&str> {
        self.keys().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position_indicator_sum(&self) -> f64 {
        self.entries
            .iter()
            .filter(|(key, _)| key.starts_with(POSITION_PREFIX))
            .map(|(_, value)| *value)
            .sum()
    }
}

/// The 35 input columns the value model is trained on.
pub fn feature_schema() -> Vec<String> {
    BASE_FEATURE_NAMES
        .iter()
        .map(|name| name.to_string())
        .chain(Position::ALL.iter().map(|p| p.indicator_name()))
        .collect()
}

pub fn build_feature_record(
    attrs: &PlayerAttributes,
    position: &str,
) -> Result<FeatureRecord, ValueError> {
    attrs.check_ranges()?;
    let selected: Position = position.parse()?;

    let mut entries = Vec::with_capacity(BASE_FEATURE_NAMES.len() + Position::ALL.len());
    for (name, value) in BASE_FEATURE_NAMES.iter().zip(attrs.values()) {
        entries.push((name.to_string(), value as f64));
    }
    for pos in Position::ALL {
        let indicator = if pos == selected { 1.0 } else { 0.0 };
        entries.push((pos.indicator_name(), indicator));
    }
    Ok(FeatureRecord { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_parse_ignores_case_and_padding() {
        assert_eq!(" st ".parse::<Position>().unwrap(), Position::ST);
        assert_eq!("rwb".parse::<Position>().unwrap(), Position::RWB);
        assert!("XX".parse::<Position>().is_err());
    }

    #[test]
    fn defaults_are_within_ranges() {
        for spec in ATTRIBUTE_SPECS {
            assert!(spec.contains(spec.default), "{} default", spec.name);
        }
        assert!(PlayerAttributes::default().check_ranges().is_ok());
    }

    #[test]
    fn specs_follow_base_feature_order() {
        let names: Vec<&str> = ATTRIBUTE_SPECS.iter().map(|s| s.name).collect();
        assert_eq!(names, BASE_FEATURE_NAMES);
    }
}
