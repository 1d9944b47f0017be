use async_graphql::{Context, InputObject, Object, Result};
use tracing::info;

use crate::{
    criteria::{compile, Condition, ConditionValue, SegmentType},
    outbound::{self, Backend, CreateSegmentRequest},
    store::Store,
};

/// One criteria-builder row as submitted by the dashboard. `values` is set
/// for list operators, `value` for everything else.
#[derive(InputObject, Debug)]
pub(crate) struct ConditionInput {
    field: String,
    operator: String,
    value: Option<String>,
    values: Option<Vec<String>>,
}

impl From<ConditionInput> for Condition {
    fn from(input: ConditionInput) -> Self {
        let value = match input.values {
            Some(values) => ConditionValue::List(values),
            None => ConditionValue::Text(input.value.unwrap_or_default()),
        };
        Condition {
            field: input.field,
            operator: input.operator,
            value,
        }
    }
}

#[derive(InputObject, Debug)]
pub(crate) struct CreateSegmentInput {
    name: String,
    description: Option<String>,
    segment_type: String,
    logic: Option<String>,
    conditions: Vec<ConditionInput>,
}

#[derive(Default)]
pub(super) struct SegmentMutation;

#[Object]
impl SegmentMutation {
    /// Compiles the criteria builder state and submits the new segment to the
    /// backend. Invalid conditions are dropped during compilation; a fully
    /// invalid list submits an unconstrained criteria object.
    async fn create_segment(&self, ctx: &Context<'_>, input: CreateSegmentInput) -> Result<bool> {
        let segment_type = SegmentType::from_key(&input.segment_type)
            .ok_or_else(|| format!("unknown segment type: {}", input.segment_type))?;

        let conditions: Vec<Condition> = input.conditions.into_iter().map(Into::into).collect();
        let criteria = compile(&conditions, input.logic.as_deref());

        let request = CreateSegmentRequest {
            name: input.name,
            description: input.description.unwrap_or_default(),
            criteria,
            segment_type: segment_type.as_key().to_string(),
            is_active: true,
            auto_update: true,
        };

        let backend = ctx.data::<Backend>()?;
        backend
            .create_segment(&request)
            .await
            .map_err(|e| format!("{e:#}"))?;
        info!(name = %request.name, "created segment");
        Ok(true)
    }

    /// Asks the backend to recalculate a segment's membership, then refreshes
    /// the raw snapshot so the next reconciliation sees the new numbers.
    async fn recalculate_segment(&self, ctx: &Context<'_>, segment_id: String) -> Result<bool> {
        let backend = ctx.data::<Backend>()?;
        backend
            .recalculate_segment(&segment_id)
            .await
            .map_err(|e| format!("{e:#}"))?;

        let store = ctx.data::<Store>()?;
        outbound::refresh(backend, store)
            .await
            .map_err(|e| format!("{e:#}"))?;
        Ok(true)
    }
}
