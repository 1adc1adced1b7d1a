// src/catalog/filters.rs
//! Request-scoped filter selection and its translation into SQL over the
//! JSON `attributes` column of `materials`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::pagination::OffsetQueryBuilder;
use crate::validator::FieldValidator;

/// Upper bound on options per key, keeps the generated `IN (...)` list small.
const MAX_OPTIONS_PER_KEY: usize = 50;
const MAX_KEYS: usize = 20;

/// Wire shape of one selected filter value: `true`, `"red"` or `["red", "blue"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawFilterValue {
    Flag(bool),
    Single(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Boolean facet. Only `true` constrains.
    Flag(bool),
    /// Option facet. Matches when the attribute shares at least one option.
    Options(BTreeSet<String>),
}

impl FilterValue {
    pub fn is_unconstrained(&self) -> bool {
        match self {
            FilterValue::Flag(flag) => !flag,
            FilterValue::Options(options) => options.is_empty(),
        }
    }
}

impl From<RawFilterValue> for FilterValue {
    fn from(raw: RawFilterValue) -> Self {
        let clean = |s: String| {
            let s = s.trim().to_string();
            if s.is_empty() { None } else { Some(s) }
        };
        match raw {
            RawFilterValue::Flag(flag) => FilterValue::Flag(flag),
            RawFilterValue::Single(value) => FilterValue::Options(clean(value).into_iter().collect()),
            RawFilterValue::Many(values) => {
                FilterValue::Options(values.into_iter().filter_map(clean).collect())
            }
        }
    }
}

/// Filter key -> selected value. Keys absent from the map are unconstrained;
/// multiple keys AND together, options within one key OR together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    entries: BTreeMap<String, FilterValue>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options<I, S>(mut self, key: &str, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            key.to_string(),
            FilterValue::Options(options.into_iter().map(Into::into).collect()),
        );
        self
    }

    pub fn with_flag(mut self, key: &str, flag: bool) -> Self {
        self.entries.insert(key.to_string(), FilterValue::Flag(flag));
        self
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.entries.get(key)
    }

    /// Constraining entries only.
    pub fn active(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.entries
            .iter()
            .filter(|(_, value)| !value.is_unconstrained())
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }

    /// Parses the `filters` query parameter: a JSON object such as
    /// `{"colors": ["red", "green"], "certified": true}`. Blank input is an empty selection.
    pub fn parse(raw: Option<&str>) -> ApiResult<Self> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Ok(Self::new()),
            Some(raw) => raw,
        };

        let parsed: BTreeMap<String, Option<RawFilterValue>> = serde_json::from_str(raw)
            .map_err(|_| {
                ApiError::validation(
                    "filters",
                    "Filters must be a JSON object mapping keys to true/false, an option or a list of options",
                )
            })?;

        if parsed.len() > MAX_KEYS {
            return Err(ApiError::validation("filters", format!("At most {} filters may be combined", MAX_KEYS)));
        }

        let mut selection = Self::new();
        for (key, value) in parsed {
            if FieldValidator::filter_key(&key).is_err() {
                return Err(ApiError::validation("filters", format!("Unknown filter key '{}'", key)));
            }
            let Some(value) = value else { continue };
            let value = FilterValue::from(value);
            if let FilterValue::Options(ref options) = value {
                if options.len() > MAX_OPTIONS_PER_KEY {
                    return Err(ApiError::validation(
                        "filters",
                        format!("Too many options selected for '{}'", key),
                    ));
                }
            }
            selection.entries.insert(key, value);
        }

        Ok(selection)
    }

    /// Adds one `EXISTS` condition per constraining key to `builder`.
    /// Expects the materials table to be aliased as `m`.
    pub fn apply(&self, builder: &mut OffsetQueryBuilder) {
        for (key, value) in self.active() {
            match value {
                FilterValue::Flag(_) => {
                    builder.add_condition(
                        "EXISTS (SELECT 1 FROM json_each(m.attributes) a \
                         WHERE a.key = ? AND json_type(a.value, '$.value') = 'true')",
                        key.to_string(),
                    );
                }
                FilterValue::Options(options) => {
                    // Numeric attributes are stored as JSON numbers, options arrive as text.
                    let numeric: Vec<&String> = options
                        .iter()
                        .filter(|o| o.parse::<f64>().map(f64::is_finite).unwrap_or(false))
                        .collect();

                    let mut matcher = format!("v.value IN ({})", vec!["?"; options.len()].join(", "));
                    if !numeric.is_empty() {
                        matcher = format!(
                            "({} OR (v.type IN ('integer', 'real') AND v.value IN ({})))",
                            matcher,
                            vec!["CAST(? AS REAL)"; numeric.len()].join(", ")
                        );
                    }
                    let condition = format!(
                        "EXISTS (SELECT 1 FROM json_each(m.attributes) a, json_each(a.value, '$.value') v \
                         WHERE a.key = ? AND {})",
                        matcher
                    );

                    let mut params = Vec::with_capacity(options.len() + numeric.len() + 1);
                    params.push(key.to_string());
                    params.extend(options.iter().cloned());
                    params.extend(numeric.into_iter().cloned());
                    builder.add_condition_with_params(&condition, params);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_selection() {
        let selection = FilterSelection::parse(Some(
            r#"{"colors": ["red", " green ", ""], "certified": true, "grade": "food"}"#,
        ))
        .unwrap();

        assert_eq!(
            selection.get("colors"),
            Some(&FilterValue::Options(["green".to_string(), "red".to_string()].into_iter().collect()))
        );
        assert_eq!(selection.get("certified"), Some(&FilterValue::Flag(true)));
        assert_eq!(
            selection.get("grade"),
            Some(&FilterValue::Options(["food".to_string()].into_iter().collect()))
        );
    }

    #[test]
    fn test_false_and_empty_are_unconstrained() {
        let selection = FilterSelection::parse(Some(r#"{"certified": false, "colors": [], "x": null}"#)).unwrap();
        assert!(selection.is_empty());

        let mut builder = OffsetQueryBuilder::new("materials m");
        selection.apply(&mut builder);
        let (sql, params) = builder.build_count();
        assert_eq!(sql, "SELECT COUNT(*) FROM materials m");
        assert!(params.is_empty());
    }

    #[test]
    fn test_blank_input_is_empty_selection() {
        assert!(FilterSelection::parse(None).unwrap().is_empty());
        assert!(FilterSelection::parse(Some("  ")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_input_is_a_validation_error() {
        for raw in [r#"["colors"]"#, r#"{"colors": 5}"#, "not json", r#"{"bad key": true}"#] {
            match FilterSelection::parse(Some(raw)) {
                Err(ApiError::ValidationFailed(errors)) => assert!(errors.contains_key("filters")),
                other => panic!("expected validation failure for {}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_apply_binds_key_then_options() {
        let selection = FilterSelection::new()
            .with_options("colors", ["red", "green"])
            .with_flag("certified", true);

        let mut builder = OffsetQueryBuilder::new("materials m");
        selection.apply(&mut builder);
        let (sql, params) = builder.build_count();

        assert_eq!(sql.matches("EXISTS").count(), 2);
        assert!(sql.contains("v.value IN (?, ?)"));
        // BTreeMap order: certified, colors
        assert_eq!(params, vec!["certified", "colors", "green", "red"]);
        assert!(!sql.contains("CAST"));
    }

    #[test]
    fn test_numeric_options_also_compare_as_numbers() {
        let selection = FilterSelection::new().with_options("thickness", ["5", "thin"]);

        let mut builder = OffsetQueryBuilder::new("materials m");
        selection.apply(&mut builder);
        let (sql, params) = builder.build_count();

        assert!(sql.contains("v.value IN (?, ?) OR (v.type IN ('integer', 'real') AND v.value IN (CAST(? AS REAL)))"));
        assert_eq!(params, vec!["thickness", "5", "thin", "5"]);
    }
}
