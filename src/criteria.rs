//! Static catalog of filterable segment fields and the compiler that turns
//! user-edited builder conditions into the typed criteria query the backend
//! consumes.
//!
//! The compiler is defensive against stale UI state: an unknown field, an
//! operator outside the field's allowed set, or a value that does not parse
//! to the field's type all drop the offending condition silently instead of
//! failing the submission.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::normalize::{parse_loose_number, parse_timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SegmentType {
    Rfm,
    Behavioral,
    Demographic,
    Custom,
}

impl SegmentType {
    pub(crate) fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "rfm" => Some(Self::Rfm),
            "behavioral" => Some(Self::Behavioral),
            "demographic" => Some(Self::Demographic),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub(crate) fn as_key(self) -> &'static str {
        match self {
            Self::Rfm => "rfm",
            Self::Behavioral => "behavioral",
            Self::Demographic => "demographic",
            Self::Custom => "custom",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Contains,
    In,
    NotIn,
}

impl Operator {
    pub(crate) fn from_key(key: &str) -> Option<Self> {
        match key.trim() {
            "equals" => Some(Self::Equals),
            "not_equals" => Some(Self::NotEquals),
            "greater_than" => Some(Self::GreaterThan),
            "greater_or_equal" => Some(Self::GreaterOrEqual),
            "less_than" => Some(Self::LessThan),
            "less_or_equal" => Some(Self::LessOrEqual),
            "contains" => Some(Self::Contains),
            "in" => Some(Self::In),
            "not_in" => Some(Self::NotIn),
            _ => None,
        }
    }

    pub(crate) fn as_key(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::LessThan => "less_than",
            Self::LessOrEqual => "less_or_equal",
            Self::Contains => "contains",
            Self::In => "in",
            Self::NotIn => "not_in",
        }
    }

    fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ValueType {
    Number,
    Integer,
    Date,
    Text,
}

/// One entry of the field catalog: the dot-notation target field, its value
/// type, the segment types it applies to, and its legal operators.
#[derive(Debug)]
pub(crate) struct FieldDefinition {
    pub(crate) id: &'static str,
    pub(crate) label: &'static str,
    pub(crate) value_type: ValueType,
    pub(crate) segment_types: &'static [SegmentType],
    pub(crate) default_operator: Operator,
    /// Empty means "use the value-type default table".
    pub(crate) operators: &'static [Operator],
    pub(crate) placeholder: Option<&'static str>,
    pub(crate) step: Option<f64>,
    pub(crate) min: Option<f64>,
}

use Operator::{
    Contains, Equals, GreaterOrEqual, GreaterThan, In, LessOrEqual, LessThan, NotEquals, NotIn,
};
use SegmentType::{Behavioral, Custom, Demographic, Rfm};

const ORDERING: &[Operator] = &[
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
];
const TEXTUAL: &[Operator] = &[Equals, NotEquals, Contains];

/// Single source of truth for which filter fields are legal per segment type.
pub(crate) const CATALOG: &[FieldDefinition] = &[
    FieldDefinition {
        id: "order.total",
        label: "Order total",
        value_type: ValueType::Number,
        segment_types: &[Rfm, Behavioral, Custom],
        default_operator: GreaterThan,
        operators: &[],
        placeholder: Some("250.00"),
        step: Some(0.01),
        min: Some(0.0),
    },
    FieldDefinition {
        id: "order.count",
        label: "Number of orders",
        value_type: ValueType::Integer,
        segment_types: &[Rfm, Behavioral, Custom],
        default_operator: GreaterOrEqual,
        operators: &[],
        placeholder: Some("3"),
        step: Some(1.0),
        min: Some(0.0),
    },
    FieldDefinition {
        id: "order.last_date",
        label: "Last order date",
        value_type: ValueType::Date,
        segment_types: &[Rfm, Custom],
        default_operator: GreaterOrEqual,
        operators: &[],
        placeholder: Some("2025-01-01"),
        step: None,
        min: None,
    },
    FieldDefinition {
        id: "customer.total_spent",
        label: "Total spent",
        value_type: ValueType::Number,
        segment_types: &[Rfm, Custom],
        default_operator: GreaterOrEqual,
        operators: &[],
        placeholder: Some("1000.00"),
        step: Some(0.01),
        min: Some(0.0),
    },
    FieldDefinition {
        id: "customer.created_at",
        label: "Customer since",
        value_type: ValueType::Date,
        segment_types: &[Demographic, Custom],
        default_operator: GreaterOrEqual,
        operators: &[],
        placeholder: Some("2024-01-01"),
        step: None,
        min: None,
    },
    FieldDefinition {
        id: "customer.city",
        label: "City",
        value_type: ValueType::Text,
        segment_types: &[Demographic, Custom],
        default_operator: Equals,
        operators: &[],
        placeholder: Some("Berlin"),
        step: None,
        min: None,
    },
    FieldDefinition {
        id: "customer.country",
        label: "Country",
        value_type: ValueType::Text,
        segment_types: &[Demographic, Custom],
        default_operator: Equals,
        operators: &[Equals, NotEquals, In, NotIn],
        placeholder: Some("DE"),
        step: None,
        min: None,
    },
    FieldDefinition {
        id: "customer.tags",
        label: "Customer tags",
        value_type: ValueType::Text,
        segment_types: &[Behavioral, Custom],
        default_operator: In,
        operators: &[Contains, In, NotIn],
        placeholder: Some("vip, newsletter"),
        step: None,
        min: None,
    },
    FieldDefinition {
        id: "product.category",
        label: "Purchased category",
        value_type: ValueType::Text,
        segment_types: &[Behavioral, Custom],
        default_operator: Equals,
        operators: &[Equals, NotEquals, Contains, In, NotIn],
        placeholder: Some("shoes"),
        step: None,
        min: None,
    },
    FieldDefinition {
        id: "product.id",
        label: "Purchased product",
        value_type: ValueType::Integer,
        segment_types: &[Behavioral, Custom],
        default_operator: In,
        operators: &[Equals, NotEquals, In, NotIn],
        placeholder: Some("101, 102"),
        step: Some(1.0),
        min: None,
    },
];

pub(crate) fn field_by_id(id: &str) -> Option<&'static FieldDefinition> {
    CATALOG.iter().find(|f| f.id == id)
}

pub(crate) fn fields_for_type(segment_type: SegmentType) -> Vec<&'static FieldDefinition> {
    CATALOG
        .iter()
        .filter(|f| f.segment_types.contains(&segment_type))
        .collect()
}

/// First catalog field for the type, or the global fallback when a type has
/// no dedicated fields.
pub(crate) fn default_field_for_type(segment_type: SegmentType) -> &'static FieldDefinition {
    CATALOG
        .iter()
        .find(|f| f.segment_types.contains(&segment_type))
        .unwrap_or(&CATALOG[0])
}

pub(crate) fn operators_for(field: &FieldDefinition) -> &'static [Operator] {
    if !field.operators.is_empty() {
        return field.operators;
    }
    match field.value_type {
        ValueType::Number | ValueType::Integer | ValueType::Date => ORDERING,
        ValueType::Text => TEXTUAL,
    }
}

/// Raw, UI-entered condition value: a free-form string or a list of parts.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub(crate) enum ConditionValue {
    Text(String),
    List(Vec<String>),
}

impl Default for ConditionValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// One row of the criteria builder, untyped as the UI edits it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub(crate) struct Condition {
    pub(crate) field: String,
    pub(crate) operator: String,
    #[serde(default)]
    pub(crate) value: ConditionValue,
}

/// A value after type conversion, ready for the wire.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub(crate) enum CriteriaValue {
    Int(i64),
    Number(f64),
    Text(String),
    IntList(Vec<i64>),
    NumberList(Vec<f64>),
    TextList(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct CompiledCondition {
    pub(crate) field: String,
    pub(crate) operator: Operator,
    pub(crate) value: CriteriaValue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Logic {
    And,
    Or,
}

impl Logic {
    /// `"or"` (case-insensitive) means or; everything else, including absent,
    /// means and.
    pub(crate) fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.trim().eq_ignore_ascii_case("or") => Self::Or,
            _ => Self::And,
        }
    }
}

/// The compiled boolean filter sent to the backend. With no surviving
/// conditions both fields stay unset, so the query serializes to `{}` and the
/// backend treats it as unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct CriteriaQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) logic: Option<Logic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) conditions: Option<Vec<CompiledCondition>>,
}

impl CriteriaQuery {
    pub(crate) fn is_unconstrained(&self) -> bool {
        self.conditions.is_none()
    }
}

/// Compiles the ordered condition list into a typed query, dropping every
/// condition that cannot be validated against the catalog.
pub(crate) fn compile(conditions: &[Condition], logic: Option<&str>) -> CriteriaQuery {
    let compiled: Vec<CompiledCondition> = conditions
        .iter()
        .filter_map(compile_condition)
        .collect();
    if compiled.is_empty() {
        return CriteriaQuery::default();
    }
    CriteriaQuery {
        logic: Some(Logic::from_raw(logic)),
        conditions: Some(compiled),
    }
}

fn compile_condition(condition: &Condition) -> Option<CompiledCondition> {
    let field = field_by_id(&condition.field)?;
    let operator = Operator::from_key(&condition.operator)?;
    if !operators_for(field).contains(&operator) {
        return None;
    }
    let value = compile_value(field.value_type, operator, &condition.value)?;
    Some(CompiledCondition {
        field: field.id.to_string(),
        operator,
        value,
    })
}

fn compile_value(
    value_type: ValueType,
    operator: Operator,
    raw: &ConditionValue,
) -> Option<CriteriaValue> {
    if operator.takes_list() {
        return compile_list(value_type, raw);
    }
    let text = match raw {
        ConditionValue::Text(s) => s.clone(),
        // A leftover list on a scalar operator: take its first entry.
        ConditionValue::List(parts) => parts.first().cloned().unwrap_or_default(),
    };
    match value_type {
        ValueType::Number => parse_loose_number(&text).map(CriteriaValue::Number),
        ValueType::Integer => parse_leading_integer(&text).map(CriteriaValue::Int),
        ValueType::Date => {
            let ts = parse_timestamp(&text)?;
            Some(CriteriaValue::Text(
                ts.to_rfc3339_opts(SecondsFormat::Secs, true),
            ))
        }
        ValueType::Text => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(CriteriaValue::Text(trimmed.to_string()))
        }
    }
}

fn compile_list(value_type: ValueType, raw: &ConditionValue) -> Option<CriteriaValue> {
    let parts: Vec<String> = match raw {
        ConditionValue::Text(s) => s.split(',').map(str::trim).map(str::to_string).collect(),
        ConditionValue::List(parts) => parts.iter().map(|p| p.trim().to_string()).collect(),
    };
    let parts: Vec<String> = parts.into_iter().filter(|p| !p.is_empty()).collect();

    let value = match value_type {
        ValueType::Number => CriteriaValue::NumberList(
            parts
                .iter()
                .filter_map(|p| parse_loose_number(p))
                .collect(),
        ),
        ValueType::Integer => CriteriaValue::IntList(
            parts
                .iter()
                .filter_map(|p| parse_leading_integer(p))
                .collect(),
        ),
        ValueType::Date | ValueType::Text => CriteriaValue::TextList(parts),
    };
    let empty = match &value {
        CriteriaValue::NumberList(v) => v.is_empty(),
        CriteriaValue::IntList(v) => v.is_empty(),
        CriteriaValue::TextList(v) => v.is_empty(),
        _ => true,
    };
    if empty {
        return None;
    }
    Some(value)
}

/// Base-10 integer prefix parse: `"12 items"` is 12, `"3.9"` is 3, no digits
/// is `None`.
fn parse_leading_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, s.strip_prefix('+').unwrap_or(s)),
    };
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<i64>().ok().map(|n| sign * n)
}

/// Editable builder state: an ordered condition list plus the logic flag.
/// Updated exclusively through [`apply`], which returns a fresh state.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BuilderState {
    pub(crate) segment_type: SegmentType,
    pub(crate) logic: Logic,
    pub(crate) conditions: Vec<Condition>,
}

impl BuilderState {
    pub(crate) fn new(segment_type: SegmentType) -> Self {
        Self {
            segment_type,
            logic: Logic::And,
            conditions: vec![default_condition(segment_type)],
        }
    }
}

fn default_condition(segment_type: SegmentType) -> Condition {
    let field = default_field_for_type(segment_type);
    Condition {
        field: field.id.to_string(),
        operator: field.default_operator.as_key().to_string(),
        value: ConditionValue::default(),
    }
}

#[derive(Clone, Debug)]
pub(crate) enum BuilderAction {
    ChangeType(SegmentType),
    ChangeField { index: usize, field: String },
    ChangeOperator { index: usize, operator: String },
    ChangeValue { index: usize, value: ConditionValue },
    AddCondition,
    RemoveCondition(usize),
    ResetCriteria,
}

/// Pure reducer over the builder state. Out-of-range indices and unknown
/// fields leave the state unchanged.
pub(crate) fn apply(state: &BuilderState, action: BuilderAction) -> BuilderState {
    let mut next = state.clone();
    match action {
        BuilderAction::ChangeType(segment_type) => {
            next.segment_type = segment_type;
            next.conditions = vec![default_condition(segment_type)];
        }
        BuilderAction::ChangeField { index, field } => {
            if let (Some(condition), Some(def)) =
                (next.conditions.get_mut(index), field_by_id(&field))
            {
                // A different field may have incompatible operators and value
                // semantics, so both reset.
                condition.field = def.id.to_string();
                condition.operator = def.default_operator.as_key().to_string();
                condition.value = ConditionValue::default();
            }
        }
        BuilderAction::ChangeOperator { index, operator } => {
            if let Some(condition) = next.conditions.get_mut(index) {
                condition.operator = operator;
            }
        }
        BuilderAction::ChangeValue { index, value } => {
            if let Some(condition) = next.conditions.get_mut(index) {
                condition.value = value;
            }
        }
        BuilderAction::AddCondition => {
            next.conditions.push(default_condition(next.segment_type));
        }
        BuilderAction::RemoveCondition(index) => {
            if next.conditions.len() > 1 && index < next.conditions.len() {
                next.conditions.remove(index);
            }
        }
        BuilderAction::ResetCriteria => {
            next = BuilderState::new(next.segment_type);
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        apply, compile, default_field_for_type, field_by_id, fields_for_type, operators_for,
        BuilderAction, BuilderState, Condition, ConditionValue, Logic, Operator, SegmentType,
    };

    fn cond(field: &str, operator: &str, value: &str) -> Condition {
        Condition {
            field: field.to_string(),
            operator: operator.to_string(),
            value: ConditionValue::Text(value.to_string()),
        }
    }

    #[test]
    fn catalog_scopes_fields_by_segment_type() {
        let rfm: Vec<_> = fields_for_type(SegmentType::Rfm)
            .iter()
            .map(|f| f.id)
            .collect();
        assert!(rfm.contains(&"order.total"));
        assert!(!rfm.contains(&"customer.city"));
        assert_eq!(default_field_for_type(SegmentType::Rfm).id, "order.total");
        assert_eq!(
            default_field_for_type(SegmentType::Demographic).id,
            "customer.created_at"
        );
    }

    #[test]
    fn operator_defaults_follow_value_type() {
        let numeric = field_by_id("order.total").unwrap();
        assert!(operators_for(numeric).contains(&Operator::GreaterThan));
        assert!(!operators_for(numeric).contains(&Operator::Contains));

        let city = field_by_id("customer.city").unwrap();
        assert!(operators_for(city).contains(&Operator::Contains));
        assert!(!operators_for(city).contains(&Operator::GreaterThan));

        // Explicit operator lists override the defaults.
        let tags = field_by_id("customer.tags").unwrap();
        assert!(!operators_for(tags).contains(&Operator::Equals));
        assert!(operators_for(tags).contains(&Operator::In));
    }

    #[test]
    fn compile_round_trips_a_valid_number_condition() {
        let query = compile(
            &[cond("order.total", "greater_than", "250.00")],
            Some("and"),
        );
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "logic": "and",
                "conditions": [
                    {"field": "order.total", "operator": "greater_than", "value": 250.0}
                ]
            })
        );
    }

    #[test]
    fn unknown_field_or_operator_is_dropped() {
        let query = compile(
            &[
                cond("order.weight", "greater_than", "5"),
                cond("order.total", "contains", "250"),
                cond("order.total", "launch_missiles", "1"),
                cond("order.total", "less_than", "300"),
            ],
            None,
        );
        let conditions = query.conditions.unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].field, "order.total");
        assert_eq!(conditions[0].operator, Operator::LessThan);
    }

    #[test]
    fn values_convert_per_field_type() {
        let query = compile(
            &[
                cond("order.count", "greater_or_equal", "3.9"),
                cond("order.last_date", "greater_or_equal", "2025-01-01"),
                cond("customer.city", "equals", "  Berlin  "),
                cond("order.total", "greater_than", "$1,250.50"),
            ],
            None,
        );
        assert_eq!(
            serde_json::to_value(&query).unwrap()["conditions"],
            json!([
                {"field": "order.count", "operator": "greater_or_equal", "value": 3},
                {"field": "order.last_date", "operator": "greater_or_equal", "value": "2025-01-01T00:00:00Z"},
                {"field": "customer.city", "operator": "equals", "value": "Berlin"},
                {"field": "order.total", "operator": "greater_than", "value": 1250.50}
            ])
        );
    }

    #[test]
    fn unparseable_values_drop_the_condition() {
        let query = compile(
            &[
                cond("order.total", "greater_than", "free shipping"),
                cond("order.last_date", "less_than", "whenever"),
                cond("customer.city", "equals", "   "),
            ],
            None,
        );
        assert!(query.is_unconstrained());
        assert_eq!(serde_json::to_value(&query).unwrap(), json!({}));
    }

    #[test]
    fn in_operator_splits_and_filters_parts() {
        let query = compile(
            &[cond("product.id", "in", "101, 102, soon, , 103")],
            Some("OR"),
        );
        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "logic": "or",
                "conditions": [
                    {"field": "product.id", "operator": "in", "value": [101, 102, 103]}
                ]
            })
        );

        // All parts unparseable: the whole condition goes away.
        let query = compile(&[cond("product.id", "in", "a, b")], None);
        assert!(query.is_unconstrained());
    }

    #[test]
    fn in_operator_accepts_arrays() {
        let query = compile(
            &[Condition {
                field: "customer.tags".to_string(),
                operator: "not_in".to_string(),
                value: ConditionValue::List(vec![
                    " vip ".to_string(),
                    String::new(),
                    "churned".to_string(),
                ]),
            }],
            None,
        );
        assert_eq!(
            serde_json::to_value(&query).unwrap()["conditions"][0]["value"],
            json!(["vip", "churned"])
        );
    }

    #[test]
    fn empty_input_compiles_to_empty_object() {
        let query = compile(&[], Some("or"));
        assert!(query.is_unconstrained());
        assert_eq!(serde_json::to_string(&query).unwrap(), "{}");
    }

    #[test]
    fn logic_normalizes_to_or_only_explicitly() {
        assert_eq!(Logic::from_raw(Some("or")), Logic::Or);
        assert_eq!(Logic::from_raw(Some(" OR ")), Logic::Or);
        assert_eq!(Logic::from_raw(Some("xor")), Logic::And);
        assert_eq!(Logic::from_raw(Some("")), Logic::And);
        assert_eq!(Logic::from_raw(None), Logic::And);
    }

    #[test]
    fn builder_seeds_one_default_condition() {
        let state = BuilderState::new(SegmentType::Rfm);
        assert_eq!(state.conditions.len(), 1);
        assert_eq!(state.conditions[0].field, "order.total");
        assert_eq!(state.conditions[0].operator, "greater_than");
        assert_eq!(state.logic, Logic::And);
    }

    #[test]
    fn builder_change_type_resets_conditions() {
        let mut state = BuilderState::new(SegmentType::Rfm);
        state = apply(&state, BuilderAction::AddCondition);
        assert_eq!(state.conditions.len(), 2);

        let state = apply(&state, BuilderAction::ChangeType(SegmentType::Demographic));
        assert_eq!(state.conditions.len(), 1);
        assert_eq!(state.conditions[0].field, "customer.created_at");
    }

    #[test]
    fn builder_change_field_resets_operator_and_value() {
        let mut state = BuilderState::new(SegmentType::Behavioral);
        state = apply(
            &state,
            BuilderAction::ChangeValue {
                index: 0,
                value: ConditionValue::Text("500".to_string()),
            },
        );
        let state = apply(
            &state,
            BuilderAction::ChangeField {
                index: 0,
                field: "customer.tags".to_string(),
            },
        );
        assert_eq!(state.conditions[0].field, "customer.tags");
        assert_eq!(state.conditions[0].operator, "in");
        assert_eq!(state.conditions[0].value, ConditionValue::default());

        // Unknown fields leave the row untouched.
        let unchanged = apply(
            &state,
            BuilderAction::ChangeField {
                index: 0,
                field: "no.such.field".to_string(),
            },
        );
        assert_eq!(unchanged, state);
    }

    #[test]
    fn builder_never_drops_below_one_condition() {
        let state = BuilderState::new(SegmentType::Custom);
        let state = apply(&state, BuilderAction::RemoveCondition(0));
        assert_eq!(state.conditions.len(), 1);

        let state = apply(&state, BuilderAction::AddCondition);
        let state = apply(&state, BuilderAction::RemoveCondition(1));
        assert_eq!(state.conditions.len(), 1);
    }

    #[test]
    fn builder_reset_returns_to_seed_state() {
        let mut state = BuilderState::new(SegmentType::Rfm);
        state = apply(&state, BuilderAction::AddCondition);
        state = apply(
            &state,
            BuilderAction::ChangeOperator {
                index: 1,
                operator: "less_than".to_string(),
            },
        );
        let state = apply(&state, BuilderAction::ResetCriteria);
        assert_eq!(state, BuilderState::new(SegmentType::Rfm));
    }
}
