use async_graphql::{Context, InputObject, Object, Result, SimpleObject};

use crate::{
    api::segment::{reconciled_segments, Segment, Status},
    store::Store,
};

#[derive(InputObject, Debug, Default)]
pub(crate) struct SegmentStatFilter {
    /// Filter by segment status.
    status: Option<Status>,
    /// Filter by segment type as recorded in the registry metadata.
    segment_type: Option<String>,
    /// Case-insensitive substring match on the segment name.
    name_contains: Option<String>,
}

impl SegmentStatFilter {
    fn filter_segments(&self, segments: Vec<Segment>) -> Vec<Segment> {
        segments
            .into_iter()
            .filter(|segment| {
                self.status.is_none_or(|status| segment.status == status)
                    && self.segment_type.as_ref().is_none_or(|wanted| {
                        segment
                            .metadata
                            .segment_type
                            .as_ref()
                            .is_some_and(|t| t.eq_ignore_ascii_case(wanted))
                    })
                    && self.name_contains.as_ref().is_none_or(|needle| {
                        segment
                            .segment_name
                            .to_lowercase()
                            .contains(&needle.to_lowercase())
                    })
            })
            .collect()
    }
}

#[derive(SimpleObject)]
struct SegmentStat {
    /// The number of segments after filtering.
    segment_count: i64,

    /// How many of those are active.
    active_segment_count: i64,

    /// Sum of member counts.
    total_members: i64,

    /// Sum of order counts.
    total_orders: i64,

    /// Sum of total revenue.
    total_revenue: f64,

    /// Conversion rate averaged over segments, weighted by membership when
    /// any members exist.
    avg_conversion_rate: Option<f64>,
}

#[derive(Default)]
pub(super) struct SegmentStatQuery;

#[Object]
impl SegmentStatQuery {
    async fn segment_stat(
        &self,
        ctx: &Context<'_>,
        filter: SegmentStatFilter,
    ) -> Result<SegmentStat> {
        let segments = filter.filter_segments(reconciled_segments(ctx.data::<Store>()?));

        let segment_count = segments.len() as i64;
        let active_segment_count = segments
            .iter()
            .filter(|s| s.status == Status::Active)
            .count() as i64;
        let total_members: i64 = segments.iter().map(|s| s.member_count).sum();
        let total_orders: i64 = segments.iter().map(|s| s.orders_count).sum();
        let total_revenue: f64 = segments.iter().map(|s| s.total_revenue).sum();

        let avg_conversion_rate = if segments.is_empty() {
            None
        } else if total_members > 0 {
            let weighted: f64 = segments
                .iter()
                .map(|s| s.conversion_rate * s.member_count as f64)
                .sum();
            Some(weighted / total_members as f64)
        } else {
            let sum: f64 = segments.iter().map(|s| s.conversion_rate).sum();
            Some(sum / segments.len() as f64)
        };

        Ok(SegmentStat {
            segment_count,
            active_segment_count,
            total_members,
            total_orders,
            total_revenue,
            avg_conversion_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        api::TestSchema,
        outbound::{RawPerformanceRecord, RawSegmentMeta},
        store::RawSnapshot,
    };

    fn performance(name: &str, users: i64, rate: f64, orders: i64) -> RawPerformanceRecord {
        RawPerformanceRecord {
            segment_name: Some(name.to_string()),
            user_count: Some(json!(users)),
            conversion_rate: Some(json!(rate)),
            orders_count: Some(json!(orders)),
            ..Default::default()
        }
    }

    fn snapshot() -> RawSnapshot {
        RawSnapshot {
            meta: vec![
                RawSegmentMeta {
                    name: Some("VIP".to_string()),
                    segment_type: Some("rfm".to_string()),
                    ..Default::default()
                },
                RawSegmentMeta {
                    name: Some("Window shoppers".to_string()),
                    segment_type: Some("behavioral".to_string()),
                    ..Default::default()
                },
            ],
            performance: vec![
                performance("VIP", 100, 0.40, 40),
                performance("Window shoppers", 300, 0.10, 30),
            ],
            analytics: vec![],
        }
    }

    #[tokio::test]
    async fn stat_aggregates_all_segments() {
        let schema = TestSchema::new();
        schema.store.replace(snapshot());

        let query = r"
        {
            segmentStat(filter: {}) {
                segmentCount
                activeSegmentCount
                totalMembers
                totalOrders
                avgConversionRate
            }
        }";
        let data = schema.execute(query).await.data.into_json().unwrap();
        let stat = &data["segmentStat"];
        assert_eq!(stat["segmentCount"], 2);
        assert_eq!(stat["activeSegmentCount"], 2);
        assert_eq!(stat["totalMembers"], 400);
        assert_eq!(stat["totalOrders"], 70);
        // (40 * 100 + 10 * 300) / 400
        assert_eq!(stat["avgConversionRate"], 17.5);
    }

    #[tokio::test]
    async fn stat_filters_by_segment_type() {
        let schema = TestSchema::new();
        schema.store.replace(snapshot());

        let query = r#"
        {
            segmentStat(filter: {segmentType: "rfm"}) {
                segmentCount
                totalMembers
            }
        }"#;
        let data = schema.execute(query).await.data.into_json().unwrap();
        assert_eq!(data["segmentStat"]["segmentCount"], 1);
        assert_eq!(data["segmentStat"]["totalMembers"], 100);
    }

    #[tokio::test]
    async fn stat_filters_by_name_substring() {
        let schema = TestSchema::new();
        schema.store.replace(snapshot());

        let query = r#"
        {
            segmentStat(filter: {nameContains: "window"}) {
                segmentCount
            }
        }"#;
        let data = schema.execute(query).await.data.into_json().unwrap();
        assert_eq!(data["segmentStat"]["segmentCount"], 1);
    }

    #[tokio::test]
    async fn stat_on_empty_store() {
        let schema = TestSchema::new();
        let query = r"
        {
            segmentStat(filter: {}) {
                segmentCount
                avgConversionRate
            }
        }";
        let data = schema.execute(query).await.data.into_json().unwrap();
        assert_eq!(data["segmentStat"]["segmentCount"], 0);
        assert!(data["segmentStat"]["avgConversionRate"].is_null());
    }
}
