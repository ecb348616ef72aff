//! Structured filter conditions and their evaluation.
//!
//! A [`SearchFilter`] names a dotted field path, an [`Operator`], and an
//! optional operand. [`FilterEvaluator`] applies one filter to one record.
//!
//! # Operator semantics
//!
//! | Operator | Rule |
//! |----------|------|
//! | `equals` | case-insensitive text equality when both sides are scalars, otherwise strict equality |
//! | `contains` / `startsWith` / `endsWith` | lowercase text comparison; an absent field never matches |
//! | `greaterThan` / `lessThan` | numeric when both sides parse as numbers, otherwise lexicographic |
//! | `between` | closed interval `[lo, hi]` with the same numeric-or-lexicographic rule |
//! | `in` / `notIn` | membership using the `equals` rule per element |
//!
//! A filter without a value is *unbound*: it takes its operand from the
//! free-text query during [`search`](crate::engine::SearchEngine::search)
//! and passes every record otherwise.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::field::{as_number, as_text, is_scalar, resolve};
use crate::{Result, SearchError};

/// Comparison operator of a [`SearchFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    Between,
    In,
    NotIn,
}

impl Operator {
    /// Every operator, in the order UIs present them.
    pub fn all() -> [Operator; 9] {
        [
            Operator::Equals,
            Operator::Contains,
            Operator::StartsWith,
            Operator::EndsWith,
            Operator::GreaterThan,
            Operator::LessThan,
            Operator::Between,
            Operator::In,
            Operator::NotIn,
        ]
    }

    /// Wire name, as used in JSON and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::GreaterThan => "greaterThan",
            Operator::LessThan => "lessThan",
            Operator::Between => "between",
            Operator::In => "in",
            Operator::NotIn => "notIn",
        }
    }

    /// Human-readable label for dropdowns.
    pub fn label(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Contains => "contains",
            Operator::StartsWith => "starts with",
            Operator::EndsWith => "ends with",
            Operator::GreaterThan => "greater than",
            Operator::LessThan => "less than",
            Operator::Between => "between",
            Operator::In => "in list",
            Operator::NotIn => "not in list",
        }
    }

    /// Operators that compare text and can be served by the text matcher.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            Operator::Contains | Operator::StartsWith | Operator::EndsWith
        )
    }

    /// Operators whose operand must be a list.
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::Between | Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        Operator::all()
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SearchError::configuration(format!("unknown filter operator: {}", s)))
    }
}

/// One structured condition applied to every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Dotted field path, e.g. `"profile.name"`.
    pub field: String,
    pub operator: Operator,
    /// Operand. `None` makes the filter unbound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Display label for filter chips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SearchFilter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: Some(value.into()),
            label: None,
        }
    }

    /// A filter whose operand comes from the search query.
    pub fn unbound(field: impl Into<String>, operator: Operator) -> Self {
        Self {
            field: field.into(),
            operator,
            value: None,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_bound(&self) -> bool {
        self.value.is_some()
    }

    /// Render the operand for display; lists are joined with `", "`.
    pub fn display_value(&self) -> String {
        match &self.value {
            None => String::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| as_text(v).unwrap_or_else(|| "null".to_string()))
                .collect::<Vec<_>>()
                .join(", "),
            Some(v) => as_text(v).unwrap_or_else(|| "null".to_string()),
        }
    }

    /// Check the operand shape for the operator. Unbound filters are valid.
    pub fn validate(&self) -> Result<()> {
        match &self.value {
            Some(value) => check_operand(&self.field, self.operator, value),
            None => Ok(()),
        }
    }
}

/// Flatten several filter groups into one list.
pub fn combine_filters<I>(groups: I) -> Vec<SearchFilter>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = SearchFilter>,
{
    groups.into_iter().flatten().collect()
}

fn check_operand(field: &str, operator: Operator, value: &Value) -> Result<()> {
    match operator {
        Operator::Between => match value {
            Value::Array(items) if items.len() == 2 => Ok(()),
            _ => Err(SearchError::configuration(format!(
                "filter on '{}': between requires a two-element array, got {}",
                field, value
            ))),
        },
        Operator::In | Operator::NotIn => match value {
            Value::Array(_) => Ok(()),
            _ => Err(SearchError::configuration(format!(
                "filter on '{}': {} requires an array, got {}",
                field, operator, value
            ))),
        },
        _ => Ok(()),
    }
}

/// Evaluates a single filter against a single record.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterEvaluator;

impl FilterEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `filter` against `record`. Unbound filters pass.
    pub fn evaluate(&self, record: &Value, filter: &SearchFilter) -> Result<bool> {
        match &filter.value {
            Some(operand) => self.evaluate_with(record, &filter.field, filter.operator, operand),
            None => Ok(true),
        }
    }

    /// Evaluate `field <operator> operand` against `record`.
    pub fn evaluate_with(
        &self,
        record: &Value,
        field: &str,
        operator: Operator,
        operand: &Value,
    ) -> Result<bool> {
        check_operand(field, operator, operand)?;
        let actual = resolve(record, field);

        let matched = match operator {
            Operator::Equals => loose_equals(actual, operand),
            Operator::Contains => text_pair(actual, operand).is_some_and(|(a, b)| a.contains(&b)),
            Operator::StartsWith => {
                text_pair(actual, operand).is_some_and(|(a, b)| a.starts_with(&b))
            }
            Operator::EndsWith => text_pair(actual, operand).is_some_and(|(a, b)| a.ends_with(&b)),
            Operator::GreaterThan => {
                actual.and_then(|a| compare(a, operand)) == Some(Ordering::Greater)
            }
            Operator::LessThan => actual.and_then(|a| compare(a, operand)) == Some(Ordering::Less),
            Operator::Between => {
                let (lo, hi) = match operand {
                    Value::Array(bounds) => (&bounds[0], &bounds[1]),
                    _ => return Ok(false),
                };
                match actual {
                    Some(a) => {
                        matches!(compare(a, lo), Some(Ordering::Greater | Ordering::Equal))
                            && matches!(compare(a, hi), Some(Ordering::Less | Ordering::Equal))
                    }
                    None => false,
                }
            }
            Operator::In => list_contains(actual, operand),
            Operator::NotIn => !list_contains(actual, operand),
        };
        Ok(matched)
    }
}

fn lowercase_text(value: &Value) -> Option<String> {
    as_text(value).map(|s| s.to_lowercase())
}

fn text_pair(actual: Option<&Value>, operand: &Value) -> Option<(String, String)> {
    let a = lowercase_text(actual?)?;
    let b = lowercase_text(operand)?;
    Some((a, b))
}

fn loose_equals(actual: Option<&Value>, operand: &Value) -> bool {
    let actual = actual.unwrap_or(&Value::Null);
    if is_scalar(actual) && is_scalar(operand) {
        lowercase_text(actual) == lowercase_text(operand)
    } else {
        actual == operand
    }
}

fn list_contains(actual: Option<&Value>, list: &Value) -> bool {
    match list {
        Value::Array(items) => items.iter().any(|item| loose_equals(actual, item)),
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    if !is_scalar(a) || !is_scalar(b) {
        return None;
    }
    Some(as_text(a)?.cmp(&as_text(b)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(record: &Value, filter: SearchFilter) -> bool {
        FilterEvaluator::new().evaluate(record, &filter).unwrap()
    }

    #[test]
    fn test_operator_wire_names_round_trip() {
        for op in Operator::all() {
            assert_eq!(op.as_str().parse::<Operator>().unwrap(), op);
            let json = serde_json::to_value(op).unwrap();
            assert_eq!(json, json!(op.as_str()));
        }
    }

    #[test]
    fn test_unknown_operator_is_configuration_error() {
        let err = "fuzzy".parse::<Operator>().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("fuzzy"));
    }

    #[test]
    fn test_equals_is_case_insensitive_for_scalars() {
        let r = json!({"status": "Active", "age": 30});
        assert!(eval(&r, SearchFilter::new("status", Operator::Equals, "active")));
        assert!(eval(&r, SearchFilter::new("age", Operator::Equals, "30")));
        assert!(!eval(&r, SearchFilter::new("status", Operator::Equals, "inactive")));
    }

    #[test]
    fn test_equals_strict_for_structures() {
        let r = json!({"tags": ["a", "b"]});
        assert!(eval(&r, SearchFilter::new("tags", Operator::Equals, json!(["a", "b"]))));
        assert!(!eval(&r, SearchFilter::new("tags", Operator::Equals, json!(["A", "b"]))));
    }

    #[test]
    fn test_text_operators() {
        let r = json!({"name": "Alice Johnson", "email": "alice@example.com"});
        assert!(eval(&r, SearchFilter::new("name", Operator::Contains, "JOHN")));
        assert!(eval(&r, SearchFilter::new("name", Operator::StartsWith, "a")));
        assert!(eval(&r, SearchFilter::new("email", Operator::EndsWith, ".COM")));
        assert!(!eval(&r, SearchFilter::new("name", Operator::EndsWith, "alice")));
    }

    #[test]
    fn test_absent_field_never_matches_text_operators() {
        let r = json!({"name": null});
        for op in [Operator::Contains, Operator::StartsWith, Operator::EndsWith] {
            assert!(!eval(&r, SearchFilter::new("name", op, "")));
            assert!(!eval(&r, SearchFilter::new("missing", op, "")));
        }
    }

    #[test]
    fn test_numeric_and_lexicographic_comparison() {
        let r = json!({"age": 30, "createdAt": "2024-01-03", "score": "9"});
        assert!(eval(&r, SearchFilter::new("age", Operator::GreaterThan, 28)));
        assert!(eval(&r, SearchFilter::new("age", Operator::LessThan, "31")));
        assert!(!eval(&r, SearchFilter::new("age", Operator::GreaterThan, 30)));
        // "9" < "10" numerically even though "9" > "10" as text
        assert!(eval(&r, SearchFilter::new("score", Operator::LessThan, 10)));
        assert!(eval(&r, SearchFilter::new("createdAt", Operator::GreaterThan, "2024-01-02")));
        assert!(!eval(&r, SearchFilter::new("createdAt", Operator::LessThan, "2024-01-03")));
    }

    #[test]
    fn test_between_is_closed_interval() {
        let r = json!({"age": 30});
        assert!(eval(&r, SearchFilter::new("age", Operator::Between, json!([30, 35]))));
        assert!(eval(&r, SearchFilter::new("age", Operator::Between, json!([25, 30]))));
        assert!(!eval(&r, SearchFilter::new("age", Operator::Between, json!([31, 40]))));
        assert!(!eval(&r, SearchFilter::new("missing", Operator::Between, json!([0, 100]))));
    }

    #[test]
    fn test_between_requires_pair() {
        let r = json!({"age": 30});
        let filter = SearchFilter::new("age", Operator::Between, json!([1, 2, 3]));
        let err = FilterEvaluator::new().evaluate(&r, &filter).unwrap_err();
        assert!(err.is_configuration());
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_in_and_not_in() {
        let r = json!({"status": "Active"});
        assert!(eval(&r, SearchFilter::new("status", Operator::In, json!(["active", "pending"]))));
        assert!(!eval(&r, SearchFilter::new("status", Operator::NotIn, json!(["active"]))));
        assert!(eval(&r, SearchFilter::new("status", Operator::NotIn, json!(["pending"]))));
    }

    #[test]
    fn test_in_requires_array() {
        let filter = SearchFilter::new("status", Operator::NotIn, "active");
        assert!(FilterEvaluator::new()
            .evaluate(&json!({}), &filter)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_absent_field_and_not_in() {
        let r = json!({"status": null});
        assert!(eval(&r, SearchFilter::new("status", Operator::NotIn, json!(["active"]))));
        assert!(!eval(&r, SearchFilter::new("status", Operator::NotIn, json!([null]))));
        assert!(eval(&r, SearchFilter::new("missing", Operator::In, json!([null]))));
    }

    #[test]
    fn test_nested_field_path() {
        let r = json!({"profile": {"name": "Bob"}});
        assert!(eval(&r, SearchFilter::new("profile.name", Operator::Equals, "bob")));
        assert!(!eval(&r, SearchFilter::new("profile.age", Operator::GreaterThan, 1)));
    }

    #[test]
    fn test_unbound_filter_passes() {
        let r = json!({"name": "x"});
        assert!(eval(&r, SearchFilter::unbound("name", Operator::Equals)));
        assert!(eval(&r, SearchFilter::unbound("name", Operator::Between)));
    }

    #[test]
    fn test_filter_serialization_shape() {
        let filter: SearchFilter =
            serde_json::from_value(json!({"field": "age", "operator": "notIn", "value": [1, 2]}))
                .unwrap();
        assert_eq!(filter.operator, Operator::NotIn);
        assert_eq!(filter.display_value(), "1, 2");

        let unbound: SearchFilter =
            serde_json::from_value(json!({"field": "name", "operator": "contains"})).unwrap();
        assert!(!unbound.is_bound());
        assert_eq!(
            serde_json::to_value(&unbound).unwrap(),
            json!({"field": "name", "operator": "contains"})
        );
    }

    #[test]
    fn test_combine_filters_flattens() {
        let a = vec![SearchFilter::new("a", Operator::Equals, 1)];
        let b = vec![
            SearchFilter::new("b", Operator::Equals, 2),
            SearchFilter::new("c", Operator::Equals, 3).with_label("C"),
        ];
        let combined = combine_filters([a, b]);
        assert_eq!(combined.len(), 3);
        assert_eq!(combined[2].label.as_deref(), Some("C"));
    }
}
