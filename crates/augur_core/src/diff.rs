use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::project::{LocationConfig, ProjectConfig, TargetConfig, TimeZeroConfig};
use crate::value::{DataType, TypedValue, coerce};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Project,
    Location,
    TimeZero,
    Target,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    FieldEdited,
    FieldAdded,
    FieldRemoved,
    ObjectAdded,
    ObjectRemoved,
}

impl ChangeType {
    pub fn is_field_change(self) -> bool {
        matches!(
            self,
            ChangeType::FieldEdited | ChangeType::FieldAdded | ChangeType::FieldRemoved
        )
    }

    fn execution_rank(self) -> u8 {
        match self {
            ChangeType::ObjectRemoved => 0,
            ChangeType::ObjectAdded => 1,
            ChangeType::FieldEdited | ChangeType::FieldAdded | ChangeType::FieldRemoved => 2,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::FieldEdited => "field-edited",
            ChangeType::FieldAdded => "field-added",
            ChangeType::FieldRemoved => "field-removed",
            ChangeType::ObjectAdded => "object-added",
            ChangeType::ObjectRemoved => "object-removed",
        };
        f.write_str(name)
    }
}

/// Replacement document carried by a change.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChangeDocument {
    Project(Box<ProjectConfig>),
    Location(LocationConfig),
    TimeZero(TimeZeroConfig),
    Target(TargetConfig),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Change {
    pub object_type: ObjectType,
    /// Natural key: location name, timezero date or target name. `None` for the project itself.
    pub object_key: Option<String>,
    pub change_type: ChangeType,
    pub field_name: Option<String>,
    pub document: Option<ChangeDocument>,
}

impl Change {
    fn new(
        object_type: ObjectType,
        object_key: Option<String>,
        change_type: ChangeType,
        field_name: Option<&str>,
        document: Option<ChangeDocument>,
    ) -> Self {
        Self {
            object_type,
            object_key,
            change_type,
            field_name: field_name.map(str::to_string),
            document,
        }
    }

    fn object(&self) -> (ObjectType, Option<&str>) {
        (self.object_type, self.object_key.as_deref())
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.object_type)?;
        if let Some(key) = &self.object_key {
            write!(f, " {key:?}")?;
        }
        write!(f, " {}", self.change_type)?;
        if let Some(field) = &self.field_name {
            write!(f, " {field}")?;
        }
        Ok(())
    }
}

/// Dependent stored rows a destructive change would delete.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangeImpact {
    pub change: Change,
    pub num_points: u64,
    pub num_named: u64,
    pub num_bins: u64,
    pub num_samples: u64,
    pub num_truth: u64,
}

pub fn diff(old: &ProjectConfig, new: &ProjectConfig) -> Vec<Change> {
    let mut changes = Vec::new();
    diff_project_fields(old, new, &mut changes);
    diff_locations(&old.locations, &new.locations, &mut changes);
    diff_timezeros(&old.timezeros, &new.timezeros, &mut changes);
    diff_targets(&old.targets, &new.targets, &mut changes);
    changes
}

fn diff_project_fields(old: &ProjectConfig, new: &ProjectConfig, out: &mut Vec<Change>) {
    let fields = [
        ("name", old.name != new.name),
        ("is_public", old.is_public != new.is_public),
        ("description", old.description != new.description),
        ("home_url", old.home_url != new.home_url),
        ("logo_url", old.logo_url != new.logo_url),
        ("core_data", old.core_data != new.core_data),
        (
            "time_interval_type",
            old.time_interval_type != new.time_interval_type,
        ),
        (
            "visualization_y_label",
            old.visualization_y_label != new.visualization_y_label,
        ),
    ];
    for (field, differs) in fields {
        if differs {
            out.push(Change::new(
                ObjectType::Project,
                None,
                ChangeType::FieldEdited,
                Some(field),
                Some(ChangeDocument::Project(Box::new(new.clone()))),
            ));
        }
    }
}

/// Emits object-removed for keys only in `old`, object-added for keys only in `new`, and
/// returns the pairs present in both.
fn diff_keyed<'a, T, K, D>(
    object_type: ObjectType,
    old: &'a [T],
    new: &'a [T],
    key: K,
    document: D,
    out: &mut Vec<Change>,
) -> Vec<(&'a T, &'a T)>
where
    K: Fn(&T) -> String,
    D: Fn(&T) -> ChangeDocument,
{
    let old_by_key = old.iter().map(|item| (key(item), item)).collect::<BTreeMap<_, _>>();
    let new_by_key = new.iter().map(|item| (key(item), item)).collect::<BTreeMap<_, _>>();
    for item in old {
        let item_key = key(item);
        if !new_by_key.contains_key(&item_key) {
            out.push(Change::new(
                object_type,
                Some(item_key),
                ChangeType::ObjectRemoved,
                None,
                None,
            ));
        }
    }
    for item in new {
        let item_key = key(item);
        if !old_by_key.contains_key(&item_key) {
            out.push(Change::new(
                object_type,
                Some(item_key),
                ChangeType::ObjectAdded,
                None,
                Some(document(item)),
            ));
        }
    }
    old.iter()
        .filter_map(|item| new_by_key.get(&key(item)).map(|other| (item, *other)))
        .collect()
}

fn diff_locations(old: &[LocationConfig], new: &[LocationConfig], out: &mut Vec<Change>) {
    diff_keyed(
        ObjectType::Location,
        old,
        new,
        |location| location.name.clone(),
        |location| ChangeDocument::Location(location.clone()),
        out,
    );
}

fn diff_timezeros(old: &[TimeZeroConfig], new: &[TimeZeroConfig], out: &mut Vec<Change>) {
    let shared = diff_keyed(
        ObjectType::TimeZero,
        old,
        new,
        TimeZeroConfig::date_key,
        |timezero| ChangeDocument::TimeZero(timezero.clone()),
        out,
    );
    for (before, after) in shared {
        let fields = [
            (
                "data_version_date",
                before.data_version_date != after.data_version_date,
            ),
            (
                "is_season_start",
                before.is_season_start != after.is_season_start,
            ),
            ("season_name", before.season_name != after.season_name),
        ];
        for (field, differs) in fields {
            if differs {
                out.push(Change::new(
                    ObjectType::TimeZero,
                    Some(after.date_key()),
                    ChangeType::FieldEdited,
                    Some(field),
                    Some(ChangeDocument::TimeZero(after.clone())),
                ));
            }
        }
    }
}

fn diff_targets(old: &[TargetConfig], new: &[TargetConfig], out: &mut Vec<Change>) {
    let shared = diff_keyed(
        ObjectType::Target,
        old,
        new,
        |target| target.name.clone(),
        |target| ChangeDocument::Target(target.clone()),
        out,
    );
    for (before, after) in shared {
        let key = Some(after.name.clone());
        let edited = |field: &str| {
            Change::new(
                ObjectType::Target,
                key.clone(),
                ChangeType::FieldEdited,
                Some(field),
                Some(ChangeDocument::Target(after.clone())),
            )
        };
        if before.description != after.description {
            out.push(edited("description"));
        }
        if before.is_step_ahead != after.is_step_ahead {
            out.push(edited("is_step_ahead"));
        }
        optional_field_change(
            "unit",
            before.unit.is_some(),
            after.unit.is_some(),
            before.unit != after.unit,
            after,
            out,
        );
        optional_field_change(
            "step_ahead_increment",
            before.step_ahead_increment.is_some(),
            after.step_ahead_increment.is_some(),
            before.step_ahead_increment != after.step_ahead_increment,
            after,
            out,
        );

        let data_type = after.target_type.data_type();
        let replaced = [
            before.target_type != after.target_type,
            !value_sets_equivalent(&before.range, &after.range, data_type),
            !value_sets_equivalent(&before.cats, &after.cats, data_type),
        ];
        for _ in replaced.into_iter().filter(|differs| *differs) {
            out.push(Change::new(
                ObjectType::Target,
                key.clone(),
                ChangeType::ObjectRemoved,
                None,
                None,
            ));
            out.push(Change::new(
                ObjectType::Target,
                key.clone(),
                ChangeType::ObjectAdded,
                None,
                Some(ChangeDocument::Target(after.clone())),
            ));
        }
    }
}

fn optional_field_change(
    field: &str,
    had: bool,
    has: bool,
    differs: bool,
    after: &TargetConfig,
    out: &mut Vec<Change>,
) {
    let change_type = match (had, has) {
        (false, true) => ChangeType::FieldAdded,
        (true, false) => ChangeType::FieldRemoved,
        (true, true) if differs => ChangeType::FieldEdited,
        _ => return,
    };
    let document = (change_type != ChangeType::FieldRemoved)
        .then(|| ChangeDocument::Target(after.clone()));
    out.push(Change::new(
        ObjectType::Target,
        Some(after.name.clone()),
        change_type,
        Some(field),
        document,
    ));
}

/// Cats and range bounds are sets: order and repeats do not matter once typed. Lists with values
/// the target's data type rejects fall back to element-wise comparison.
fn value_sets_equivalent(
    a: &Option<Vec<JsonValue>>,
    b: &Option<Vec<JsonValue>>,
    data_type: DataType,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => match (typed_set(a, data_type), typed_set(b, data_type)) {
            (Some(a), Some(b)) => a == b,
            _ => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_equivalent(x, y)),
        },
        _ => false,
    }
}

fn typed_set(values: &[JsonValue], data_type: DataType) -> Option<Vec<TypedValue>> {
    let mut typed = values
        .iter()
        .map(|value| coerce(value, data_type).ok())
        .collect::<Option<Vec<_>>>()?;
    typed.sort_by(|x, y| x.total_cmp(y));
    typed.dedup();
    Some(typed)
}

/// Structural equality where numbers compare by value, so `0` equals `0.0`.
pub fn json_equivalent(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_equivalent(x, y))
        }
        _ => a == b,
    }
}

/// Drops duplicate changes and field changes on objects that are also removed, then sequences
/// removals, additions and field changes in that order.
pub fn order(changes: Vec<Change>) -> Vec<Change> {
    let mut unique: Vec<Change> = Vec::with_capacity(changes.len());
    for change in changes {
        if !unique.contains(&change) {
            unique.push(change);
        }
    }
    let removed = unique
        .iter()
        .filter(|change| change.change_type == ChangeType::ObjectRemoved)
        .map(|change| {
            let (object_type, key) = change.object();
            (object_type, key.map(str::to_string))
        })
        .collect::<HashSet<_>>();
    unique.retain(|change| {
        !(change.change_type.is_field_change()
            && removed.contains(&(change.object_type, change.object_key.clone())))
    });
    unique.sort_by_key(|change| change.change_type.execution_rank());
    unique
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::project::tests::sample_config;

    fn config(raw: &JsonValue) -> ProjectConfig {
        ProjectConfig::from_json(raw).expect("config")
    }

    fn summary(changes: &[Change]) -> Vec<(ObjectType, Option<String>, ChangeType, Option<String>)> {
        changes
            .iter()
            .map(|change| {
                (
                    change.object_type,
                    change.object_key.clone(),
                    change.change_type,
                    change.field_name.clone(),
                )
            })
            .collect()
    }

    /// Edits touching every object kind; yields 13 raw changes, 10 once ordered.
    pub(crate) fn edited_config() -> JsonValue {
        let mut raw = sample_config();
        raw["name"] = json!("new project name");
        raw["locations"] = json!([{"name": "location1"}, {"name": "location2"}, {"name": "location4"}]);
        raw["timezeros"] = json!([
            {"timezero_date": "2011-10-09", "data_version_date": "2011-10-20",
             "is_season_start": false, "season_name": null},
            {"timezero_date": "2011-10-16", "data_version_date": null,
             "is_season_start": false, "season_name": null},
            {"timezero_date": "2011-10-22", "data_version_date": null,
             "is_season_start": true, "season_name": "2011-2012"}
        ]);
        raw["targets"][0]["description"] = json!("new descr");
        raw["targets"][0]["type"] = json!("discrete");
        raw["targets"][0]["range"] = json!([0, 100]);
        raw["targets"][0]["cats"] = json!([0, 1, 2, 3, 5, 10, 50]);
        raw["targets"][1]["is_step_ahead"] = json!(false);
        raw["targets"][1]
            .as_object_mut()
            .expect("target")
            .remove("step_ahead_increment");
        raw
    }

    #[test]
    fn identical_configs_have_no_changes() {
        let old = config(&sample_config());
        assert!(diff(&old, &old.clone()).is_empty());
    }

    #[test]
    fn reordered_cats_and_range_are_not_changes() {
        let old = config(&sample_config());
        let mut raw = sample_config();
        raw["targets"][1]["range"] = json!([100000, 0]);
        raw["targets"][1]["cats"] = json!([50, 0.0, 2, 0]);
        raw["targets"][2]["cats"] = json!(["severe", "moderate", "mild", "high"]);
        let new = config(&raw);
        assert!(diff(&old, &new).is_empty());

        raw["targets"][2]["cats"] = json!(["severe", "moderate", "mild"]);
        let changes = diff(&old, &config(&raw));
        assert_eq!(
            summary(&changes),
            vec![
                (
                    ObjectType::Target,
                    Some("season severity".to_string()),
                    ChangeType::ObjectRemoved,
                    None
                ),
                (
                    ObjectType::Target,
                    Some("season severity".to_string()),
                    ChangeType::ObjectAdded,
                    None
                ),
            ]
        );
    }

    #[test]
    fn project_field_edit_is_one_change_with_whole_document() {
        let old = config(&sample_config());
        let mut raw = sample_config();
        raw["description"] = json!("edited");
        let new = config(&raw);
        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::FieldEdited);
        assert_eq!(changes[0].field_name.as_deref(), Some("description"));
        assert_eq!(
            changes[0].document,
            Some(ChangeDocument::Project(Box::new(new)))
        );
    }

    #[test]
    fn target_type_change_is_remove_add_pair() {
        let old = config(&sample_config());
        let mut raw = sample_config();
        raw["targets"][1]["type"] = json!("continuous");
        let new = config(&raw);
        let changes = diff(&old, &new);
        assert_eq!(
            summary(&changes),
            vec![
                (
                    ObjectType::Target,
                    Some("cases next week".to_string()),
                    ChangeType::ObjectRemoved,
                    None
                ),
                (
                    ObjectType::Target,
                    Some("cases next week".to_string()),
                    ChangeType::ObjectAdded,
                    None
                ),
            ]
        );
        assert!(changes.iter().all(|change| change.field_name.as_deref() != Some("type")));
    }

    #[test]
    fn optional_target_fields_are_added_and_removed() {
        let old = config(&sample_config());
        let mut raw = sample_config();
        raw["targets"][0]
            .as_object_mut()
            .expect("target")
            .remove("unit");
        raw["targets"][0]["unit"] = json!("pct");
        raw["targets"][2]["is_step_ahead"] = json!(true);
        raw["targets"][2]["step_ahead_increment"] = json!(3);
        let new = config(&raw);
        let changes = diff(&old, &new);
        assert_eq!(
            summary(&changes),
            vec![
                (
                    ObjectType::Target,
                    Some("pct next week".to_string()),
                    ChangeType::FieldEdited,
                    Some("unit".to_string())
                ),
                (
                    ObjectType::Target,
                    Some("season severity".to_string()),
                    ChangeType::FieldEdited,
                    Some("is_step_ahead".to_string())
                ),
                (
                    ObjectType::Target,
                    Some("season severity".to_string()),
                    ChangeType::FieldAdded,
                    Some("step_ahead_increment".to_string())
                ),
            ]
        );
    }

    #[test]
    fn numeric_lists_compare_by_value() {
        assert!(json_equivalent(&json!([0.0, 100.0]), &json!([0, 100])));
        assert!(!json_equivalent(&json!([1.1]), &json!([1])));
        assert!(!json_equivalent(&json!(["0"]), &json!([0])));
    }

    #[test]
    fn full_edit_diffs_and_orders() {
        let old = config(&sample_config());
        let new = config(&edited_config());
        let changes = diff(&old, &new);
        assert_eq!(changes.len(), 13, "{:#?}", summary(&changes));
        let target_pct = Some("pct next week".to_string());
        let pct_removals = changes
            .iter()
            .filter(|change| {
                change.object_key == target_pct && change.change_type == ChangeType::ObjectRemoved
            })
            .count();
        assert_eq!(pct_removals, 2);
        assert!(changes.iter().any(|change| {
            change.object_key.as_deref() == Some("cases next week")
                && change.change_type == ChangeType::FieldRemoved
                && change.document.is_none()
        }));

        let ordered = order(changes.clone());
        assert_eq!(ordered.len(), 10, "{:#?}", summary(&ordered));
        assert!(!ordered.iter().any(|change| {
            change.object_key == target_pct && change.change_type.is_field_change()
        }));
        let ranks = ordered
            .iter()
            .map(|change| change.change_type.execution_rank())
            .collect::<Vec<_>>();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);
        assert!(ordered.len() <= changes.len());
    }

    #[test]
    fn order_keeps_removal_before_addition_for_same_key() {
        let add = Change::new(
            ObjectType::Location,
            Some("x".to_string()),
            ChangeType::ObjectAdded,
            None,
            Some(ChangeDocument::Location(LocationConfig {
                name: "x".to_string(),
            })),
        );
        let remove = Change::new(
            ObjectType::Location,
            Some("x".to_string()),
            ChangeType::ObjectRemoved,
            None,
            None,
        );
        let ordered = order(vec![add.clone(), remove.clone(), add.clone()]);
        assert_eq!(ordered, vec![remove, add]);
    }
}
