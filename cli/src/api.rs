use anyhow::{Context, Result, bail};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use bodytrend_core::entries::{MetricEdit, MetricEntry, MetricHistory, Verification, VerifyAck};
use bodytrend_core::models::{
    ChartRange, ChartResponse, Goal, GoalDraft, GoalProgressResult, MetricKind,
};
use bodytrend_core::service::MetricsProvider;

/// Where the metrics backend lives and whose data to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub user_id: String,
}

pub struct MetricsApiClient {
    client: reqwest::Client,
    endpoint: Endpoint,
    rt: tokio::runtime::Handle,
}

impl MetricsApiClient {
    pub fn new(endpoint: Endpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "bodytrend-cli/{} (body metrics)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            rt: tokio::runtime::Handle::current(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint.base_url.trim_end_matches('/'))
    }

    /// Send a request and fail on any non-2xx status.
    async fn send(&self, request: RequestBuilder, method: &str, url: &str) -> Result<Response> {
        tracing::debug!(url, "{method}");
        let resp = request
            .send()
            .await
            .context("Failed to reach metrics API")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Metrics API returned {status} for {method} {url}");
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let resp = self
            .send(self.client.get(url).query(query), "GET", url)
            .await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {url}"))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.send(self.client.delete(url), "DELETE", url).await?;
        Ok(())
    }

    pub async fn chart_async(&self, metric: MetricKind, range: ChartRange) -> Result<ChartResponse> {
        let url = self.url("metrics");
        self.get_json(
            &url,
            &[
                ("user_id", self.endpoint.user_id.as_str()),
                ("metric", metric.key()),
                ("metric_range", range.as_str()),
            ],
        )
        .await
    }

    pub async fn goals_async(&self) -> Result<Vec<Goal>> {
        let url = self.url(&format!("goals/{}", self.endpoint.user_id));
        self.get_json(&url, &[]).await
    }

    pub async fn goal_progress_async(&self, goal_id: i64) -> Result<GoalProgressResult> {
        let url = self.url(&format!(
            "goals/{}/progress/{goal_id}",
            self.endpoint.user_id
        ));
        self.get_json(&url, &[]).await
    }

    pub async fn create_goal_async(&self, draft: &GoalDraft) -> Result<()> {
        let url = self.url("goals");
        let body = GoalPayload {
            user_id: &self.endpoint.user_id,
            goal: draft,
        };
        self.send(self.client.post(&url).json(&body), "POST", &url)
            .await?;
        Ok(())
    }

    pub async fn update_goal_async(&self, goal_id: i64, draft: &GoalDraft) -> Result<()> {
        let url = self.url(&format!("goals/{goal_id}"));
        let body = GoalPayload {
            user_id: &self.endpoint.user_id,
            goal: draft,
        };
        self.send(self.client.put(&url).json(&body), "PUT", &url)
            .await?;
        Ok(())
    }

    pub async fn entries_async(&self) -> Result<Vec<MetricEntry>> {
        let url = self.url(&format!("metrics/{}", self.endpoint.user_id));
        let history: MetricHistory = self.get_json(&url, &[]).await?;
        Ok(history.metrics)
    }

    /// `None` when the user has no uploads yet (404 or a `null` body).
    pub async fn latest_entry_async(&self) -> Result<Option<MetricEntry>> {
        let url = self.url("metrics/latest");
        tracing::debug!(url, "GET");
        let resp = self
            .client
            .get(&url)
            .query(&[("user_id", self.endpoint.user_id.as_str())])
            .send()
            .await
            .context("Failed to reach metrics API")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = resp.status();
        if !status.is_success() {
            bail!("Metrics API returned {status} for GET {url}");
        }
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {url}"))
    }

    pub async fn update_entry_async(&self, entry_id: i64, edit: &MetricEdit) -> Result<()> {
        let url = self.url(&format!("metrics/{entry_id}"));
        self.send(self.client.put(&url).form(edit), "PUT", &url)
            .await?;
        Ok(())
    }

    pub async fn verify_entry_async(
        &self,
        entry_id: i64,
        verification: &Verification,
    ) -> Result<VerifyAck> {
        let url = self.url(&format!("metrics_verify/{entry_id}"));
        let resp = self
            .send(self.client.put(&url).form(verification), "PUT", &url)
            .await?;
        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {url}"))
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        tokio::task::block_in_place(|| self.rt.block_on(fut))
    }
}

impl MetricsProvider for MetricsApiClient {
    fn fetch_chart(&self, metric: MetricKind, range: ChartRange) -> Result<ChartResponse> {
        self.block_on(self.chart_async(metric, range))
    }

    fn fetch_goals(&self) -> Result<Vec<Goal>> {
        self.block_on(self.goals_async())
    }

    fn fetch_goal_progress(&self, goal_id: i64) -> Result<GoalProgressResult> {
        self.block_on(self.goal_progress_async(goal_id))
    }

    fn create_goal(&self, draft: &GoalDraft) -> Result<()> {
        self.block_on(self.create_goal_async(draft))
    }

    fn update_goal(&self, goal_id: i64, draft: &GoalDraft) -> Result<()> {
        self.block_on(self.update_goal_async(goal_id, draft))
    }

    fn delete_goal(&self, goal_id: i64) -> Result<()> {
        let url = self.url(&format!("goals/{goal_id}"));
        self.block_on(self.delete(&url))
    }

    fn fetch_entries(&self) -> Result<Vec<MetricEntry>> {
        self.block_on(self.entries_async())
    }

    fn fetch_latest_entry(&self) -> Result<Option<MetricEntry>> {
        self.block_on(self.latest_entry_async())
    }

    fn update_entry(&self, entry_id: i64, edit: &MetricEdit) -> Result<()> {
        self.block_on(self.update_entry_async(entry_id, edit))
    }

    fn delete_entry(&self, entry_id: i64) -> Result<()> {
        let url = self.url(&format!("metrics/{entry_id}"));
        self.block_on(self.delete(&url))
    }

    fn verify_entry(&self, entry_id: i64, verification: &Verification) -> Result<VerifyAck> {
        self.block_on(self.verify_entry_async(entry_id, verification))
    }
}

/// JSON body for goal create and edit.
#[derive(Serialize)]
struct GoalPayload<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    goal: &'a GoalDraft,
}
