use async_graphql::{Context, Object, Result, SimpleObject};

use crate::criteria::{fields_for_type, operators_for, FieldDefinition, SegmentType, ValueType};

/// One catalog entry as the criteria-builder UI consumes it.
#[derive(SimpleObject, Debug)]
pub(crate) struct CriteriaField {
    id: String,
    label: String,
    value_type: String,
    default_operator: String,
    operators: Vec<String>,
    placeholder: Option<String>,
    step: Option<f64>,
    min: Option<f64>,
}

impl From<&'static FieldDefinition> for CriteriaField {
    fn from(field: &'static FieldDefinition) -> Self {
        let value_type = match field.value_type {
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::Date => "date",
            ValueType::Text => "string",
        };
        CriteriaField {
            id: field.id.to_string(),
            label: field.label.to_string(),
            value_type: value_type.to_string(),
            default_operator: field.default_operator.as_key().to_string(),
            operators: operators_for(field)
                .iter()
                .map(|op| op.as_key().to_string())
                .collect(),
            placeholder: field.placeholder.map(str::to_string),
            step: field.step,
            min: field.min,
        }
    }
}

#[derive(Default)]
pub(super) struct CriteriaFieldQuery;

#[Object]
impl CriteriaFieldQuery {
    /// Filter fields applicable to the given segment type. Unknown types get
    /// an empty list.
    #[allow(clippy::unused_async)]
    async fn criteria_fields(
        &self,
        _ctx: &Context<'_>,
        segment_type: String,
    ) -> Result<Vec<CriteriaField>> {
        let Some(segment_type) = SegmentType::from_key(&segment_type) else {
            return Ok(Vec::new());
        };
        Ok(fields_for_type(segment_type)
            .into_iter()
            .map(Into::into)
            .collect())
    }
}
