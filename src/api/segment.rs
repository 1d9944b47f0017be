use std::fmt;

use async_graphql::{
    connection::{query, Connection, EmptyFields},
    Context, Enum, Object, Result, SimpleObject,
};

use crate::{
    api::{self, DateTimeUtc},
    normalize::normalize_key,
    reconcile::{reconcile, CanonicalSegment, SegmentStatus},
    store::Store,
};

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum Status {
    Active,
    Inactive,
}

impl From<SegmentStatus> for Status {
    fn from(status: SegmentStatus) -> Self {
        match status {
            SegmentStatus::Active => Self::Active,
            SegmentStatus::Inactive => Self::Inactive,
        }
    }
}

#[derive(SimpleObject, Debug)]
pub(crate) struct SegmentMetadata {
    pub(crate) update_frequency: Option<String>,
    pub(crate) segment_type: Option<String>,
    pub(crate) top_products: Vec<String>,
}

/// One reconciled segment as the dashboard sees it.
#[derive(SimpleObject, Debug)]
pub(crate) struct Segment {
    pub(crate) segment_id: String,
    pub(crate) segment_name: String,
    pub(crate) description: String,
    pub(crate) member_count: i64,
    pub(crate) orders_count: i64,
    pub(crate) avg_order_value: f64,
    pub(crate) total_revenue: f64,
    pub(crate) revenue_per_member: f64,
    /// 0-100 percentage.
    pub(crate) conversion_rate: f64,
    pub(crate) created_at: Option<DateTimeUtc>,
    pub(crate) updated_at: Option<DateTimeUtc>,
    pub(crate) status: Status,
    pub(crate) metadata: SegmentMetadata,
}

impl From<CanonicalSegment> for Segment {
    fn from(segment: CanonicalSegment) -> Self {
        Segment {
            segment_id: segment.segment_id,
            segment_name: segment.segment_name,
            description: segment.description,
            member_count: segment.member_count.min(i64::MAX as u64) as i64,
            orders_count: segment.orders_count.min(i64::MAX as u64) as i64,
            avg_order_value: segment.avg_order_value,
            total_revenue: segment.total_revenue,
            revenue_per_member: segment.revenue_per_member,
            conversion_rate: segment.conversion_rate,
            created_at: segment.created_at.map(DateTimeUtc),
            updated_at: segment.updated_at.map(DateTimeUtc),
            status: segment.status.into(),
            metadata: SegmentMetadata {
                update_frequency: segment.metadata.update_frequency,
                segment_type: segment.metadata.segment_type,
                top_products: segment.metadata.top_products,
            },
        }
    }
}

impl fmt::Display for Segment {
    /// Cursor identity. The id alone can repeat across registry rows, so the
    /// name is appended to keep cursors unique per reconciled segment.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.segment_id, self.segment_name)
    }
}

pub(crate) fn reconciled_segments(store: &Store) -> Vec<Segment> {
    reconcile(&store.snapshot()).into_iter().map(Into::into).collect()
}

#[derive(Default)]
pub(super) struct SegmentQuery;

#[Object]
impl SegmentQuery {
    /// Reconciled segments, largest membership first.
    async fn segments(
        &self,
        ctx: &Context<'_>,
        after: Option<String>,
        before: Option<String>,
        first: Option<i32>,
        last: Option<i32>,
    ) -> Result<Connection<String, Segment, EmptyFields, EmptyFields>> {
        let segments = reconciled_segments(ctx.data::<Store>()?);
        query(
            after,
            before,
            first,
            last,
            |after, before, first, last| async move {
                api::paginate(segments, after, before, first, last)
            },
        )
        .await
    }

    /// Single segment lookup by id or name, case-insensitive.
    async fn segment(&self, ctx: &Context<'_>, key: String) -> Result<Option<Segment>> {
        let wanted = normalize_key(Some(key.as_str()));
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(reconciled_segments(ctx.data::<Store>()?)
            .into_iter()
            .find(|s| {
                normalize_key(Some(s.segment_id.as_str())) == wanted
                    || normalize_key(Some(s.segment_name.as_str())) == wanted
            }))
    }
}
