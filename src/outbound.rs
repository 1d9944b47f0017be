//! Typed contracts for the commerce backend's segment endpoints and the
//! periodic fetch loop that keeps the in-memory snapshot current.
//!
//! The three read payloads are deliberately loose: every field is optional and
//! numeric-ish fields arrive as numbers, currency strings, or fractional rates
//! depending on the backend version. Shape repair happens downstream in the
//! reconciler, never here.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time;
use tracing::{error, info};

use crate::{
    criteria::CriteriaQuery,
    store::{RawSnapshot, Store},
};

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Segment registry record. `id`/`segment_id` and `name`/`segment_name` are
/// both seen in the wild.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct RawSegmentMeta {
    #[serde(default, alias = "segment_id")]
    pub(crate) id: Option<Value>,
    #[serde(default, alias = "segment_name")]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) member_count: Option<Value>,
    #[serde(default)]
    pub(crate) is_active: Option<Value>,
    #[serde(default)]
    pub(crate) auto_update: Option<bool>,
    #[serde(default)]
    pub(crate) update_frequency: Option<String>,
    #[serde(default)]
    pub(crate) segment_type: Option<String>,
    #[serde(default)]
    pub(crate) created_at: Option<String>,
    #[serde(default)]
    pub(crate) updated_at: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct RawPerformanceRecord {
    #[serde(default)]
    pub(crate) segment_name: Option<String>,
    #[serde(default)]
    pub(crate) user_count: Option<Value>,
    #[serde(default)]
    pub(crate) conversion_rate: Option<Value>,
    #[serde(default)]
    pub(crate) orders_count: Option<Value>,
    #[serde(default)]
    pub(crate) avg_order_value: Option<Value>,
    #[serde(default)]
    pub(crate) revenue_contribution: Option<Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct RawAnalyticsRecord {
    #[serde(default)]
    pub(crate) segment_name: Option<String>,
    #[serde(default)]
    pub(crate) member_count: Option<Value>,
    #[serde(default)]
    pub(crate) orders_count: Option<Value>,
    #[serde(default)]
    pub(crate) total_revenue: Option<Value>,
    #[serde(default)]
    pub(crate) avg_order_value: Option<Value>,
    #[serde(default)]
    pub(crate) revenue_per_member: Option<Value>,
    #[serde(default)]
    pub(crate) conversion_rate: Option<Value>,
    #[serde(default, alias = "top_tags")]
    pub(crate) top_products: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) last_updated: Option<String>,
}

/// Body for the segment-creation endpoint.
#[derive(Debug, Serialize)]
pub(crate) struct CreateSegmentRequest {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) criteria: CriteriaQuery,
    pub(crate) segment_type: String,
    pub(crate) is_active: bool,
    pub(crate) auto_update: bool,
}

/// Thin client over the backend's segment endpoints.
#[derive(Clone)]
pub(crate) struct Backend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl Backend {
    pub(crate) fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.get(format!("{}/{path}", self.base_url));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.post(format!("{}/{path}", self.base_url));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    pub(crate) async fn segments(&self) -> Result<Vec<RawSegmentMeta>> {
        let resp = self.get("segments").send().await?.error_for_status()?;
        resp.json()
            .await
            .context("invalid segment registry payload")
    }

    pub(crate) async fn performance(&self) -> Result<Vec<RawPerformanceRecord>> {
        let resp = self
            .get("segments/performance")
            .send()
            .await?
            .error_for_status()?;
        resp.json()
            .await
            .context("invalid segment performance payload")
    }

    pub(crate) async fn analytics(&self) -> Result<Vec<RawAnalyticsRecord>> {
        let resp = self
            .get("segments/performance/analytics")
            .send()
            .await?
            .error_for_status()?;
        resp.json()
            .await
            .context("invalid segment analytics payload")
    }

    pub(crate) async fn create_segment(&self, body: &CreateSegmentRequest) -> Result<()> {
        self.post("segments")
            .json(body)
            .send()
            .await?
            .error_for_status()
            .context("segment creation was rejected by the backend")?;
        Ok(())
    }

    /// Fire-and-forget recalculation trigger; the response body is not
    /// consumed beyond the status line.
    pub(crate) async fn recalculate_segment(&self, segment_id: &str) -> Result<()> {
        self.post(&format!("segments/{segment_id}/recalculate"))
            .send()
            .await?
            .error_for_status()
            .context("segment recalculation was rejected by the backend")?;
        Ok(())
    }

    /// Fetches all three sources and returns the complete snapshot. The three
    /// requests are independent and may finish in any order.
    pub(crate) async fn fetch_snapshot(&self) -> Result<RawSnapshot> {
        let (meta, performance, analytics) =
            tokio::try_join!(self.segments(), self.performance(), self.analytics())?;
        Ok(RawSnapshot {
            meta,
            performance,
            analytics,
        })
    }
}

/// Re-fetches the raw sources on demand, e.g. after a recalculation request.
pub(crate) async fn refresh(backend: &Backend, store: &Store) -> Result<()> {
    let snapshot = backend.fetch_snapshot().await?;
    store.replace(snapshot);
    Ok(())
}

/// Keeps the store's snapshot current. A failed pass is retried on its own
/// (shorter) interval until it succeeds, then the regular period resumes.
pub(crate) async fn fetch_periodically(
    backend: Backend,
    store: Store,
    period: Duration,
    retry: Duration,
) {
    let mut itv = time::interval(period);
    loop {
        itv.tick().await;
        let mut re_itv = time::interval(retry);
        loop {
            re_itv.tick().await;
            match backend.fetch_snapshot().await {
                Ok(snapshot) => {
                    info!(
                        meta = snapshot.meta.len(),
                        performance = snapshot.performance.len(),
                        analytics = snapshot.analytics.len(),
                        "fetched segment snapshot"
                    );
                    store.replace(snapshot);
                    break;
                }
                Err(error) => {
                    error!("Problem while fetching segment snapshot. Retrying shortly. {error:#}");
                }
            }
            itv.reset();
        }
    }
}
