use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use time::Date;

use crate::target::{Target, TargetType};
use crate::validate::ProjectSchema;
use crate::value::{DataType, TypedValue, coerce};
use crate::{AugurError, AugurResult};

time::serde::format_description!(ymd, Date, "[year]-[month]-[day]");

/// Units accepted for date targets.
pub const DATE_UNITS: [&str; 4] = ["day", "week", "biweek", "month"];

pub const PROJECT_CONFIG_KEYS: [&str; 11] = [
    "name",
    "is_public",
    "description",
    "home_url",
    "logo_url",
    "core_data",
    "time_interval_type",
    "visualization_y_label",
    "locations",
    "targets",
    "timezeros",
];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum TimeIntervalType {
    Week = 1,
    Biweek = 2,
    Month = 3,
}

impl TimeIntervalType {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(TimeIntervalType::Week),
            2 => Some(TimeIntervalType::Biweek),
            3 => Some(TimeIntervalType::Month),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TimeIntervalType::Week => "week",
            TimeIntervalType::Biweek => "biweek",
            TimeIntervalType::Month => "month",
        }
    }

    pub fn parse(value: &str) -> AugurResult<Self> {
        [
            TimeIntervalType::Week,
            TimeIntervalType::Biweek,
            TimeIntervalType::Month,
        ]
        .into_iter()
        .find(|kind| kind.name().eq_ignore_ascii_case(value))
        .ok_or_else(|| {
            AugurError::config(format!(
                "invalid time_interval_type {value:?}; must be one of \"week\", \"biweek\", \"month\""
            ))
        })
    }
}

impl fmt::Display for TimeIntervalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for TimeIntervalType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for TimeIntervalType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        TimeIntervalType::parse(&value).map_err(|err| serde::de::Error::custom(err.message()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeZeroConfig {
    #[serde(with = "ymd")]
    pub timezero_date: Date,
    #[serde(default, with = "ymd::option")]
    pub data_version_date: Option<Date>,
    pub is_season_start: bool,
    #[serde(default)]
    pub season_name: Option<String>,
}

impl TimeZeroConfig {
    pub fn validate(&self) -> AugurResult<()> {
        let has_season_name = self
            .season_name
            .as_deref()
            .is_some_and(|name| !name.is_empty());
        if self.is_season_start && !has_season_name {
            return Err(AugurError::config(format!(
                "timezero {}: is_season_start passed with no season_name",
                self.date_key()
            )));
        }
        if !self.is_season_start && self.season_name.is_some() {
            return Err(AugurError::config(format!(
                "timezero {}: season_name {:?} passed but not is_season_start",
                self.date_key(),
                self.season_name
            )));
        }
        Ok(())
    }

    pub fn date_key(&self) -> String {
        crate::value::format_date(self.timezero_date)
    }
}

/// Target document. `range` and `cats` stay raw until checked against the target's data type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub target_type: TargetType,
    pub description: String,
    pub is_step_ahead: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_ahead_increment: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Vec<JsonValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cats: Option<Vec<JsonValue>>,
}

impl TargetConfig {
    /// Document form of a stored target: type, name, description and is_step_ahead always;
    /// step_ahead_increment only for step-ahead targets; unit when set; range and cats sorted;
    /// nominal and date targets always list their cats.
    pub fn from_target(target: &Target) -> Self {
        let cats = target.declared_cats();
        let cats = if !cats.is_empty()
            || matches!(target.target_type, TargetType::Nominal | TargetType::Date)
        {
            Some(cats.iter().map(TypedValue::to_json).collect())
        } else {
            None
        };
        let range = target.range.as_ref().map(|(lo, hi)| {
            let mut bounds = [lo.clone(), hi.clone()];
            bounds.sort_by(|a, b| a.total_cmp(b));
            bounds.iter().map(TypedValue::to_json).collect()
        });
        Self {
            name: target.name.clone(),
            target_type: target.target_type,
            description: target.description.clone(),
            is_step_ahead: target.is_step_ahead,
            step_ahead_increment: if target.is_step_ahead {
                target.step_ahead_increment
            } else {
                None
            },
            unit: target.unit.clone(),
            range,
            cats,
        }
    }

    pub fn to_target(&self) -> AugurResult<Target> {
        let name = &self.name;
        let target_type = self.target_type;
        let data_type = target_type.data_type();
        if self.is_step_ahead && self.step_ahead_increment.is_none() {
            return Err(AugurError::config(format!(
                "target {name:?}: 'step_ahead_increment' not found but is_step_ahead is true"
            )));
        }

        match (target_type, &self.unit) {
            (TargetType::Continuous | TargetType::Discrete | TargetType::Date, None) => {
                return Err(AugurError::config(format!(
                    "target {name:?}: 'unit' is required for {target_type:?} targets"
                )));
            }
            (TargetType::Nominal | TargetType::Binary, Some(unit)) => {
                return Err(AugurError::config(format!(
                    "target {name:?}: 'unit' is not valid for {target_type:?} targets. unit={unit:?}"
                )));
            }
            (TargetType::Date, Some(unit)) if !DATE_UNITS.contains(&unit.as_str()) => {
                return Err(AugurError::config(format!(
                    "target {name:?}: unit {unit:?} is not valid for date targets; valid units: {DATE_UNITS:?}"
                )));
            }
            _ => {}
        }

        let range = match &self.range {
            None => None,
            Some(raw) => {
                if !data_type.is_numeric() {
                    return Err(AugurError::config(format!(
                        "target {name:?}: 'range' is not valid for {target_type:?} targets"
                    )));
                }
                if raw.len() != 2 {
                    return Err(AugurError::config(format!(
                        "target {name:?}: 'range' must have exactly two items. range={}",
                        JsonValue::Array(raw.clone())
                    )));
                }
                let lo = config_value(name, "range", &raw[0], data_type)?;
                let hi = config_value(name, "range", &raw[1], data_type)?;
                if lo.total_cmp(&hi).is_le() {
                    Some((lo, hi))
                } else {
                    Some((hi, lo))
                }
            }
        };

        let cats = match (&self.cats, target_type) {
            (Some(_), TargetType::Binary) => {
                return Err(AugurError::config(format!(
                    "target {name:?}: 'cats' is not valid for binary targets"
                )));
            }
            (None, TargetType::Nominal | TargetType::Date) => {
                return Err(AugurError::config(format!(
                    "target {name:?}: 'cats' is required for {target_type:?} targets"
                )));
            }
            (None, _) => Vec::new(),
            (Some(raw), _) => raw
                .iter()
                .map(|value| config_value(name, "cats", value, data_type))
                .collect::<AugurResult<Vec<_>>>()?,
        };
        if let Some((lo, hi)) = &range
            && let Some(outside) = cats
                .iter()
                .find(|cat| cat.total_cmp(lo).is_lt() || cat.total_cmp(hi).is_gt())
        {
            return Err(AugurError::config(format!(
                "target {name:?}: cat {outside} is outside of range [{lo}, {hi}]"
            )));
        }

        Ok(Target {
            name: self.name.clone(),
            target_type,
            description: self.description.clone(),
            is_step_ahead: self.is_step_ahead,
            step_ahead_increment: if self.is_step_ahead {
                self.step_ahead_increment
            } else {
                None
            },
            unit: self.unit.clone(),
            range,
            cats,
        })
    }
}

fn config_value(
    target: &str,
    field: &str,
    raw: &JsonValue,
    data_type: DataType,
) -> AugurResult<TypedValue> {
    coerce(raw, data_type)
        .map_err(|err| AugurError::config(format!("target {target:?}: '{field}' {}", err.message())))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: String,
    pub is_public: bool,
    pub description: String,
    pub home_url: Option<String>,
    pub logo_url: Option<String>,
    pub core_data: Option<String>,
    pub time_interval_type: TimeIntervalType,
    pub visualization_y_label: Option<String>,
    pub locations: Vec<LocationConfig>,
    pub targets: Vec<TargetConfig>,
    pub timezeros: Vec<TimeZeroConfig>,
}

impl ProjectConfig {
    /// Parses and validates a configuration document. The top-level key set must match exactly.
    pub fn from_json(raw: &JsonValue) -> AugurResult<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| AugurError::config("project config is not an object"))?;
        let actual = object.keys().map(String::as_str).collect::<BTreeSet<_>>();
        let expected = PROJECT_CONFIG_KEYS.into_iter().collect::<BTreeSet<_>>();
        if actual != expected {
            let missing = expected.difference(&actual).collect::<Vec<_>>();
            let unexpected = actual.difference(&expected).collect::<Vec<_>>();
            return Err(AugurError::config(format!(
                "wrong project config keys. missing={missing:?}, unexpected={unexpected:?}"
            )));
        }
        let config: ProjectConfig = serde_json::from_value(raw.clone())
            .map_err(|err| AugurError::config(format!("malformed project config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> AugurResult<JsonValue> {
        serde_json::to_value(self)
            .map_err(|err| AugurError::config(format!("serialize project config: {err}")))
    }

    pub fn validate(&self) -> AugurResult<()> {
        if self.name.trim().is_empty() {
            return Err(AugurError::config("project name must not be empty"));
        }
        let mut names = BTreeSet::new();
        for location in &self.locations {
            if !names.insert(location.name.as_str()) {
                return Err(AugurError::config(format!(
                    "found duplicate location name {:?}",
                    location.name
                )));
            }
        }
        self.checked_targets()?;
        let mut dates = BTreeSet::new();
        for timezero in &self.timezeros {
            if !dates.insert(timezero.timezero_date) {
                return Err(AugurError::config(format!(
                    "found duplicate timezero_date {}",
                    timezero.date_key()
                )));
            }
            timezero.validate()?;
        }
        Ok(())
    }

    /// Validated targets in document order.
    pub fn checked_targets(&self) -> AugurResult<Vec<Target>> {
        let mut names = BTreeSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for config in &self.targets {
            if !names.insert(config.name.as_str()) {
                return Err(AugurError::config(format!(
                    "found duplicate target name {:?}",
                    config.name
                )));
            }
            targets.push(config.to_target()?);
        }
        Ok(targets)
    }

    /// Validation snapshot built straight from the document, without storage.
    pub fn schema(&self) -> AugurResult<ProjectSchema> {
        Ok(ProjectSchema::new(
            self.locations.iter().map(|location| location.name.clone()),
            self.checked_targets()?,
        ))
    }

    /// Canonical ordering used when a configuration is rebuilt from storage.
    pub fn sorted(mut self) -> Self {
        self.locations.sort_by(|a, b| a.name.cmp(&b.name));
        self.targets.sort_by(|a, b| a.name.cmp(&b.name));
        self.timezeros.sort_by_key(|timezero| timezero.timezero_date);
        self
    }
}
