//! Three-way reconciliation of the segment registry, performance, and
//! analytics payloads into one canonical record per segment.
//!
//! Per-field priority when the sources disagree: analytics first (the most
//! aggregated source), then performance, then registry metadata, then a
//! computed fallback, then zero/none. A key present in only one source still
//! yields a full record with defaults; a malformed record degrades field by
//! field instead of failing the whole pass.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    normalize::{derive_conversion_rate, normalize_key, normalize_number, parse_timestamp},
    outbound::{RawAnalyticsRecord, RawPerformanceRecord, RawSegmentMeta},
    store::RawSnapshot,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SegmentStatus {
    Active,
    Inactive,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct SegmentMetadata {
    pub(crate) update_frequency: Option<String>,
    pub(crate) segment_type: Option<String>,
    pub(crate) top_products: Vec<String>,
}

/// The single reconciled view of a segment.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CanonicalSegment {
    pub(crate) segment_id: String,
    pub(crate) segment_name: String,
    pub(crate) description: String,
    pub(crate) member_count: u64,
    pub(crate) orders_count: u64,
    pub(crate) avg_order_value: f64,
    pub(crate) total_revenue: f64,
    pub(crate) revenue_per_member: f64,
    /// Always a 0-100 percentage, never a raw fraction.
    pub(crate) conversion_rate: f64,
    pub(crate) created_at: Option<DateTime<Utc>>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) status: SegmentStatus,
    pub(crate) metadata: SegmentMetadata,
}

/// Merges the three raw lists into one canonical record per distinct
/// non-empty normalized key, sorted by member count descending.
pub(crate) fn reconcile(snapshot: &RawSnapshot) -> Vec<CanonicalSegment> {
    let meta_by_key = index_first(&snapshot.meta, meta_key);
    let analytics_by_key = index_first(&snapshot.analytics, |r| {
        normalize_key(r.segment_name.as_deref())
    });

    let mut seen: HashSet<String> = HashSet::new();
    let mut segments = Vec::new();

    // Performance is the primary source, so its records come first.
    for record in &snapshot.performance {
        let key = normalize_key(record.segment_name.as_deref());
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        segments.push(build_segment(
            &key,
            Some(record),
            analytics_by_key.get(&key).copied(),
            meta_by_key.get(&key).copied(),
        ));
    }

    for record in &snapshot.analytics {
        let key = normalize_key(record.segment_name.as_deref());
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        segments.push(build_segment(
            &key,
            None,
            Some(record),
            meta_by_key.get(&key).copied(),
        ));
    }

    // Registry-only segments: all performance-derived numbers default to 0.
    for record in &snapshot.meta {
        let key = meta_key(record);
        if key.is_empty() || !seen.insert(key.clone()) {
            continue;
        }
        segments.push(build_segment(&key, None, None, Some(record)));
    }

    segments.sort_by(|a, b| b.member_count.cmp(&a.member_count));
    segments
}

fn meta_key(record: &RawSegmentMeta) -> String {
    let by_name = normalize_key(record.name.as_deref());
    if !by_name.is_empty() {
        return by_name;
    }
    normalize_key(id_string(record.id.as_ref()).as_deref())
}

/// First-write-wins index from normalized key to record.
fn index_first<T, F>(records: &[T], key_of: F) -> HashMap<String, &T>
where
    F: Fn(&T) -> String,
{
    let mut map = HashMap::new();
    for record in records {
        let key = key_of(record);
        if key.is_empty() {
            continue;
        }
        map.entry(key).or_insert(record);
    }
    map
}

/// First value that is actually present (not absent, not JSON null).
fn pick<'a>(candidates: &[Option<&'a Value>]) -> Option<&'a Value> {
    candidates
        .iter()
        .copied()
        .flatten()
        .find(|v| !v.is_null())
}

fn non_negative_count(value: Option<&Value>) -> u64 {
    let n = normalize_number(value);
    if n > 0.0 {
        n as u64
    } else {
        0
    }
}

fn non_negative(n: f64) -> f64 {
    if n.is_finite() && n > 0.0 {
        n
    } else {
        0.0
    }
}

fn id_string(id: Option<&Value>) -> Option<String> {
    match id {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "active"),
        _ => false,
    }
}

fn timestamp_of(raw: Option<&str>) -> Option<DateTime<Utc>> {
    parse_timestamp(raw?)
}

fn display_name<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn build_segment(
    key: &str,
    performance: Option<&RawPerformanceRecord>,
    analytics: Option<&RawAnalyticsRecord>,
    meta: Option<&RawSegmentMeta>,
) -> CanonicalSegment {
    let member_count = non_negative_count(pick(&[
        analytics.and_then(|a| a.member_count.as_ref()),
        performance.and_then(|p| p.user_count.as_ref()),
        meta.and_then(|m| m.member_count.as_ref()),
    ]));
    let orders_count = non_negative_count(pick(&[
        analytics.and_then(|a| a.orders_count.as_ref()),
        performance.and_then(|p| p.orders_count.as_ref()),
    ]));
    let avg_order_value = non_negative(normalize_number(pick(&[
        analytics.and_then(|a| a.avg_order_value.as_ref()),
        performance.and_then(|p| p.avg_order_value.as_ref()),
    ])));
    let total_revenue = non_negative(normalize_number(
        analytics.and_then(|a| a.total_revenue.as_ref()),
    ));

    let revenue_per_member = match pick(&[analytics.and_then(|a| a.revenue_per_member.as_ref())]) {
        Some(value) => non_negative(normalize_number(Some(value))),
        None if member_count > 0 => total_revenue / member_count as f64,
        None => 0.0,
    };

    let conversion_rate = derive_conversion_rate(
        &[
            analytics.and_then(|a| a.conversion_rate.as_ref()),
            performance.and_then(|p| p.conversion_rate.as_ref()),
        ],
        orders_count as f64,
        member_count as f64,
    )
    .clamp(0.0, 100.0);

    let segment_name = display_name(&[
        analytics.and_then(|a| a.segment_name.as_deref()),
        performance.and_then(|p| p.segment_name.as_deref()),
        meta.and_then(|m| m.name.as_deref()),
    ])
    .unwrap_or(key)
    .to_string();

    let segment_id = meta
        .and_then(|m| id_string(m.id.as_ref()))
        .unwrap_or_else(|| key.to_string());

    let status = if member_count > 0 || truthy(meta.and_then(|m| m.is_active.as_ref())) {
        SegmentStatus::Active
    } else {
        SegmentStatus::Inactive
    };

    CanonicalSegment {
        segment_id,
        segment_name,
        description: meta
            .and_then(|m| m.description.clone())
            .unwrap_or_default(),
        member_count,
        orders_count,
        avg_order_value,
        total_revenue,
        revenue_per_member,
        conversion_rate,
        created_at: timestamp_of(meta.and_then(|m| m.created_at.as_deref())),
        updated_at: timestamp_of(analytics.and_then(|a| a.last_updated.as_deref()))
            .or_else(|| timestamp_of(meta.and_then(|m| m.updated_at.as_deref()))),
        status,
        metadata: SegmentMetadata {
            update_frequency: meta.and_then(|m| m.update_frequency.clone()),
            segment_type: meta.and_then(|m| m.segment_type.clone()),
            top_products: analytics
                .and_then(|a| a.top_products.clone())
                .unwrap_or_default(),
        },
    }
}
