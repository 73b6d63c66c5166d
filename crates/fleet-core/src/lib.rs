pub mod config;
pub mod reconcile;
pub mod snapshot;

use async_trait::async_trait;
use tracing::info;

use asg_api::{
    AsgClient, CreateLaunchTemplateRequest, LaunchTemplate, NotificationConfig,
    PutMetricAlarmRequest, PutScalingPolicyRequest, ScalingGroup, ScalingGroupConfig,
    ScalingPolicy, Tag,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("autoscale api error: {0}")]
    Api(#[from] asg_api::Error),

    #[error("cannot read fleet document at {path}: {source}")]
    DocumentRead {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid fleet document: {0}")]
    DocumentParse(#[from] serde_yaml::Error),

    #[error("launch template name {0:?} is not of the form <fleet>-<version>")]
    TemplateName(String),

    #[error("fleet task failed: {0}")]
    Task(String),

    #[error("missing env var: {0}")]
    MissingEnv(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Provider operations the reconciler is written against.
///
/// `ApiProvider` is the HTTP-backed implementation; tests substitute an
/// in-memory one. Every call is a single attempt; retry and deadline
/// behavior belong to the provider's own transport, not to this engine.
#[async_trait]
pub trait AutoscaleProvider: Send + Sync + 'static {
    async fn list_launch_templates(&self) -> Result<Vec<LaunchTemplate>>;

    async fn create_launch_template(
        &self,
        req: &CreateLaunchTemplateRequest,
    ) -> Result<LaunchTemplate>;

    async fn delete_launch_template(&self, name: &str) -> Result<()>;

    async fn list_scaling_groups(&self) -> Result<Vec<ScalingGroup>>;

    async fn create_scaling_group(&self, cfg: &ScalingGroupConfig) -> Result<ScalingGroup>;

    /// Full-replace update of every field in `cfg`.
    async fn update_scaling_group(
        &self,
        name: &str,
        cfg: &ScalingGroupConfig,
    ) -> Result<ScalingGroup>;

    /// Batch upsert; keys absent from `tags` are left untouched.
    async fn put_tags(&self, group: &str, tags: &[Tag]) -> Result<()>;

    async fn put_notification_config(&self, group: &str, cfg: &NotificationConfig) -> Result<()>;

    /// Upserts by policy name and returns the provider-assigned reference.
    async fn put_scaling_policy(
        &self,
        group: &str,
        req: &PutScalingPolicyRequest,
    ) -> Result<ScalingPolicy>;

    /// Upserts by alarm name.
    async fn put_metric_alarm(&self, req: &PutMetricAlarmRequest) -> Result<()>;
}

/// HTTP-backed provider delegating to `asg_api::AsgClient`.
pub struct ApiProvider {
    client: AsgClient,
}

impl ApiProvider {
    /// Create from env vars:
    ///
    /// - `AUTOSCALE_API_TOKEN` (required)
    /// - `AUTOSCALE_API_URL` (optional base-URL override)
    pub fn from_env(region: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let token = std::env::var("AUTOSCALE_API_TOKEN")
            .map_err(|_| Error::MissingEnv("AUTOSCALE_API_TOKEN".into()))?;

        let client = match std::env::var("AUTOSCALE_API_URL") {
            Ok(url) => AsgClient::with_base_url(token, region, url),
            Err(_) => AsgClient::new(token, region),
        };

        Ok(Self { client })
    }
}

#[async_trait]
impl AutoscaleProvider for ApiProvider {
    async fn list_launch_templates(&self) -> Result<Vec<LaunchTemplate>> {
        Ok(self.client.list_launch_templates().await?)
    }

    async fn create_launch_template(
        &self,
        req: &CreateLaunchTemplateRequest,
    ) -> Result<LaunchTemplate> {
        let template = self.client.create_launch_template(req).await?;
        info!(template = %template.name, "launch template created");
        Ok(template)
    }

    async fn delete_launch_template(&self, name: &str) -> Result<()> {
        self.client.delete_launch_template(name).await?;
        info!(template = %name, "launch template deleted");
        Ok(())
    }

    async fn list_scaling_groups(&self) -> Result<Vec<ScalingGroup>> {
        Ok(self.client.list_scaling_groups().await?)
    }

    async fn create_scaling_group(&self, cfg: &ScalingGroupConfig) -> Result<ScalingGroup> {
        let group = self.client.create_scaling_group(cfg).await?;
        info!(group = %group.name, "scaling group created");
        Ok(group)
    }

    async fn update_scaling_group(
        &self,
        name: &str,
        cfg: &ScalingGroupConfig,
    ) -> Result<ScalingGroup> {
        let group = self.client.update_scaling_group(name, cfg).await?;
        info!(group = %name, "scaling group updated");
        Ok(group)
    }

    async fn put_tags(&self, group: &str, tags: &[Tag]) -> Result<()> {
        self.client.put_tags(group, tags).await?;
        info!(group = %group, count = tags.len(), "tags upserted");
        Ok(())
    }

    async fn put_notification_config(&self, group: &str, cfg: &NotificationConfig) -> Result<()> {
        self.client.put_notification_config(group, cfg).await?;
        info!(group = %group, topic = %cfg.topic, "notifications bound");
        Ok(())
    }

    async fn put_scaling_policy(
        &self,
        group: &str,
        req: &PutScalingPolicyRequest,
    ) -> Result<ScalingPolicy> {
        let policy = self.client.put_scaling_policy(group, req).await?;
        info!(group = %group, policy = %policy.name, "scaling policy upserted");
        Ok(policy)
    }

    async fn put_metric_alarm(&self, req: &PutMetricAlarmRequest) -> Result<()> {
        self.client.put_metric_alarm(req).await?;
        info!(alarm = %req.name, "metric alarm upserted");
        Ok(())
    }
}
