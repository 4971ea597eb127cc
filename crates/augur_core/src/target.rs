use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{DataType, TypedValue};
use crate::{AugurError, AugurResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TargetType {
    Continuous = 1,
    Discrete = 2,
    Nominal = 3,
    Binary = 4,
    Date = 5,
}

impl TargetType {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(TargetType::Continuous),
            2 => Some(TargetType::Discrete),
            3 => Some(TargetType::Nominal),
            4 => Some(TargetType::Binary),
            5 => Some(TargetType::Date),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TargetType::Continuous => "continuous",
            TargetType::Discrete => "discrete",
            TargetType::Nominal => "nominal",
            TargetType::Binary => "binary",
            TargetType::Date => "date",
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            TargetType::Continuous => DataType::Float,
            TargetType::Discrete => DataType::Integer,
            TargetType::Nominal => DataType::Text,
            TargetType::Binary => DataType::Boolean,
            TargetType::Date => DataType::Date,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named distribution families. Codes are persisted; do not renumber.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Family {
    Norm = 0,
    Lnorm = 1,
    Gamma = 2,
    Beta = 3,
    Bern = 4,
    Binom = 5,
    Pois = 6,
    Nbinom = 7,
    Nbinom2 = 8,
}

pub const ALL_FAMILIES: [Family; 9] = [
    Family::Norm,
    Family::Lnorm,
    Family::Gamma,
    Family::Beta,
    Family::Bern,
    Family::Binom,
    Family::Pois,
    Family::Nbinom,
    Family::Nbinom2,
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParamDomain {
    Any,
    NonNegative,
    Positive,
    Probability,
}

impl ParamDomain {
    pub fn contains(self, value: f64) -> bool {
        match self {
            ParamDomain::Any => value.is_finite(),
            ParamDomain::NonNegative => value >= 0.0,
            ParamDomain::Positive => value > 0.0,
            ParamDomain::Probability => (0.0..=1.0).contains(&value),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ParamDomain::Any => "any finite number",
            ParamDomain::NonNegative => ">= 0",
            ParamDomain::Positive => "> 0",
            ParamDomain::Probability => "in [0, 1]",
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub domain: ParamDomain,
}

const fn param(name: &'static str, domain: ParamDomain) -> ParamSpec {
    ParamSpec { name, domain }
}

const NORM_PARAMS: [ParamSpec; 2] = [
    param("mean", ParamDomain::Any),
    param("sd", ParamDomain::NonNegative),
];
const GAMMA_PARAMS: [ParamSpec; 2] = [
    param("shape", ParamDomain::Positive),
    param("rate", ParamDomain::Positive),
];
const BETA_PARAMS: [ParamSpec; 2] = [
    param("a", ParamDomain::Positive),
    param("b", ParamDomain::Positive),
];
const BERN_PARAMS: [ParamSpec; 1] = [param("p", ParamDomain::Probability)];
const BINOM_PARAMS: [ParamSpec; 2] = [
    param("n", ParamDomain::NonNegative),
    param("p", ParamDomain::Probability),
];
const POIS_PARAMS: [ParamSpec; 1] = [param("rate", ParamDomain::NonNegative)];
const NBINOM_PARAMS: [ParamSpec; 2] = [
    param("r", ParamDomain::Positive),
    param("p", ParamDomain::Probability),
];
const NBINOM2_PARAMS: [ParamSpec; 2] = [
    param("mean", ParamDomain::Positive),
    param("disp", ParamDomain::Positive),
];

impl Family {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        ALL_FAMILIES
            .into_iter()
            .find(|family| family.as_i16() == value)
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Family::Norm => "norm",
            Family::Lnorm => "lnorm",
            Family::Gamma => "gamma",
            Family::Beta => "beta",
            Family::Bern => "bern",
            Family::Binom => "binom",
            Family::Pois => "pois",
            Family::Nbinom => "nbinom",
            Family::Nbinom2 => "nbinom2",
        }
    }

    pub fn from_abbreviation(value: &str) -> AugurResult<Self> {
        ALL_FAMILIES
            .into_iter()
            .find(|family| family.abbreviation() == value)
            .ok_or_else(|| {
                let known = ALL_FAMILIES
                    .iter()
                    .map(|family| family.abbreviation())
                    .collect::<Vec<_>>();
                AugurError::invalid_argument(format!(
                    "unknown family {value:?}; family must be one of {known:?}"
                ))
            })
    }

    /// Ordered parameter definitions; `param1` is the first entry.
    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            Family::Norm | Family::Lnorm => &NORM_PARAMS,
            Family::Gamma => &GAMMA_PARAMS,
            Family::Beta => &BETA_PARAMS,
            Family::Bern => &BERN_PARAMS,
            Family::Binom => &BINOM_PARAMS,
            Family::Pois => &POIS_PARAMS,
            Family::Nbinom => &NBINOM_PARAMS,
            Family::Nbinom2 => &NBINOM2_PARAMS,
        }
    }

    pub fn arity(self) -> usize {
        self.params().len()
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

pub fn valid_named_families(target_type: TargetType) -> &'static [Family] {
    match target_type {
        TargetType::Continuous => &[Family::Norm, Family::Lnorm, Family::Gamma, Family::Beta],
        TargetType::Discrete => &[Family::Pois, Family::Nbinom, Family::Nbinom2],
        TargetType::Nominal | TargetType::Binary | TargetType::Date => &[],
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub name: String,
    pub target_type: TargetType,
    pub description: String,
    pub is_step_ahead: bool,
    pub step_ahead_increment: Option<i64>,
    pub unit: Option<String>,
    pub range: Option<(TypedValue, TypedValue)>,
    pub cats: Vec<TypedValue>,
}

impl Target {
    pub fn data_type(&self) -> DataType {
        self.target_type.data_type()
    }

    /// Declared categories, sorted and de-duplicated.
    pub fn declared_cats(&self) -> Vec<TypedValue> {
        let mut cats = self.cats.clone();
        cats.sort_by(|a, b| a.total_cmp(b));
        cats.dedup();
        cats
    }

    /// Categories a bin prediction may use. Binary targets never declare cats and accept
    /// `false` and `true`.
    pub fn cats_values(&self) -> Vec<TypedValue> {
        match self.target_type {
            TargetType::Binary => vec![TypedValue::Bool(false), TypedValue::Bool(true)],
            _ => self.declared_cats(),
        }
    }

    pub fn range(&self) -> Option<(TypedValue, TypedValue)> {
        self.range.clone()
    }
}

/// Read-only snapshot of one project's targets keyed by name.
#[derive(Clone, Debug, Default)]
pub struct TargetRegistry {
    targets: BTreeMap<String, Target>,
}

impl TargetRegistry {
    pub fn new(targets: impl IntoIterator<Item = Target>) -> Self {
        Self {
            targets: targets
                .into_iter()
                .map(|target| (target.name.clone(), target))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> AugurResult<&Target> {
        self.targets.get(name).ok_or_else(|| {
            AugurError::not_found(format!(
                "target {name:?} not found; known targets: {:?}",
                self.names().collect::<Vec<_>>()
            ))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn data_type(&self, name: &str) -> AugurResult<DataType> {
        Ok(self.get(name)?.data_type())
    }

    pub fn cats_values(&self, name: &str) -> AugurResult<Vec<TypedValue>> {
        Ok(self.get(name)?.cats_values())
    }

    pub fn range(&self, name: &str) -> AugurResult<Option<(TypedValue, TypedValue)>> {
        Ok(self.get(name)?.range())
    }
}
