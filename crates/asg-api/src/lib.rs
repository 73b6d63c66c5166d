//! Typed Rust client for the cloud autoscaling REST API.
//!
//! Covers the subset needed for fleet reconciliation: launch templates
//! (list, create, delete), scaling groups (list, create, update), batch tag
//! upsert, notification config, scaling policies, and metric alarms.

mod types;

pub use types::*;

const BASE_URL: &str = "https://api.autoscale.dev/v1";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("autoscale api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("autoscale api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Client for the autoscaling REST API, scoped to one region.
#[derive(Clone)]
pub struct AsgClient {
    token: String,
    region: String,
    base_url: String,
    http: reqwest::Client,
}

impl AsgClient {
    pub fn new(token: impl Into<String>, region: impl Into<String>) -> Self {
        Self::with_base_url(token, region, BASE_URL)
    }

    /// Same as `new` but against a non-default endpoint (test servers,
    /// private deployments).
    pub fn with_base_url(
        token: impl Into<String>,
        region: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            region: region.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn url(&self, path: &str) -> String {
        format!("{}/regions/{}{path}", self.base_url, self.region)
    }

    fn auth(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { endpoint, status, body });
        }
        Ok(resp)
    }

    /// Like `check` but also treats 404 as success (for delete idempotency).
    async fn check_allow_404(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() && status.as_u16() != 404 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api { endpoint, status, body });
        }
        Ok(resp)
    }

    // ── Launch templates ─────────────────────────────────────────────

    pub async fn list_launch_templates(&self) -> Result<Vec<LaunchTemplate>> {
        let resp = self
            .http
            .get(self.url("/launch-templates"))
            .header("Authorization", self.auth())
            .send()
            .await?;

        let list: LaunchTemplateList = Self::check(resp, "list launch templates")
            .await?
            .json()
            .await?;
        Ok(list.launch_templates)
    }

    pub async fn create_launch_template(
        &self,
        req: &CreateLaunchTemplateRequest,
    ) -> Result<LaunchTemplate> {
        let resp = self
            .http
            .post(self.url("/launch-templates"))
            .header("Authorization", self.auth())
            .json(req)
            .send()
            .await?;

        Self::check(resp, "create launch template")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    pub async fn delete_launch_template(&self, name: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/launch-templates/{name}")))
            .header("Authorization", self.auth())
            .send()
            .await?;

        Self::check_allow_404(resp, "delete launch template").await?;
        Ok(())
    }

    // ── Scaling groups ───────────────────────────────────────────────

    pub async fn list_scaling_groups(&self) -> Result<Vec<ScalingGroup>> {
        let resp = self
            .http
            .get(self.url("/scaling-groups"))
            .header("Authorization", self.auth())
            .send()
            .await?;

        let list: ScalingGroupList = Self::check(resp, "list scaling groups")
            .await?
            .json()
            .await?;
        Ok(list.scaling_groups)
    }

    pub async fn create_scaling_group(&self, cfg: &ScalingGroupConfig) -> Result<ScalingGroup> {
        let resp = self
            .http
            .post(self.url("/scaling-groups"))
            .header("Authorization", self.auth())
            .json(cfg)
            .send()
            .await?;

        Self::check(resp, "create scaling group")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    /// Full-replace update; the provider overwrites every field from `cfg`.
    pub async fn update_scaling_group(
        &self,
        name: &str,
        cfg: &ScalingGroupConfig,
    ) -> Result<ScalingGroup> {
        let resp = self
            .http
            .put(self.url(&format!("/scaling-groups/{name}")))
            .header("Authorization", self.auth())
            .json(cfg)
            .send()
            .await?;

        Self::check(resp, "update scaling group")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    /// Batch tag upsert. Tags with an existing key are overwritten; keys not
    /// present in the batch are left untouched by the provider.
    pub async fn put_tags(&self, group: &str, tags: &[Tag]) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("/scaling-groups/{group}/tags")))
            .header("Authorization", self.auth())
            .json(&TagBatch { tags: tags.to_vec() })
            .send()
            .await?;

        Self::check(resp, "put tags").await?;
        Ok(())
    }

    // ── Notifications ────────────────────────────────────────────────

    /// Bind lifecycle notifications to a topic. Re-binding the same topic is
    /// a provider-side no-op.
    pub async fn put_notification_config(
        &self,
        group: &str,
        cfg: &NotificationConfig,
    ) -> Result<()> {
        let resp = self
            .http
            .put(self.url(&format!("/scaling-groups/{group}/notification-config")))
            .header("Authorization", self.auth())
            .json(cfg)
            .send()
            .await?;

        Self::check(resp, "put notification config").await?;
        Ok(())
    }

    // ── Scaling policies ─────────────────────────────────────────────

    /// Upserts by policy name: submitting a name that already exists on the
    /// group replaces that policy and returns the same `policy_ref`. Policy
    /// names may contain characters that are not URL-safe, so the name
    /// travels in the body.
    pub async fn put_scaling_policy(
        &self,
        group: &str,
        req: &PutScalingPolicyRequest,
    ) -> Result<ScalingPolicy> {
        let resp = self
            .http
            .put(self.url(&format!("/scaling-groups/{group}/policies")))
            .header("Authorization", self.auth())
            .json(req)
            .send()
            .await?;

        Self::check(resp, "put scaling policy")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Metric alarms ────────────────────────────────────────────────

    /// Upserts by alarm name.
    pub async fn put_metric_alarm(&self, req: &PutMetricAlarmRequest) -> Result<()> {
        let resp = self
            .http
            .put(self.url("/metric-alarms"))
            .header("Authorization", self.auth())
            .json(req)
            .send()
            .await?;

        Self::check(resp, "put metric alarm").await?;
        Ok(())
    }
}
