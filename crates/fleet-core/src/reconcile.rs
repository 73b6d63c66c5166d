//! The convergence pass: per fleet, match-or-mint the launch template,
//! assert the scaling group, tags, notifications and alarms, then collect
//! superseded templates. Every step re-asserts desired state in full; a
//! partially applied fleet self-heals on the next pass.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use asg_api::{
    CreateLaunchTemplateRequest, LaunchTemplate, NotificationConfig, PutMetricAlarmRequest,
    PutScalingPolicyRequest, ScalingGroupConfig, Tag,
};

use crate::config::{FleetDocument, FleetSpec, PolicySpec};
use crate::snapshot::{Snapshot, TemplateName};
use crate::{AutoscaleProvider, Error, Result};

/// Lifecycle events bound to the notification topic for every group.
pub const LIFECYCLE_NOTIFICATIONS: [&str; 4] = [
    "autoscaling:instance-launch",
    "autoscaling:instance-launch-error",
    "autoscaling:instance-terminate",
    "autoscaling:instance-terminate-error",
];

/// Alarms watch their group through this single dimension.
const GROUP_DIMENSION: &str = "ScalingGroupName";

pub const DEFAULT_FLEET_CONCURRENCY: usize = 4;

/// Template plan for one fleet: at most one survivor, everything else goes.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TemplatePlan {
    pub reuse: Option<LaunchTemplate>,
    pub delete: Vec<LaunchTemplate>,
}

/// Pick the template to keep for a fleet.
///
/// `live` is in ascending version order; the first equivalent template wins,
/// and every other template of the fleet, matching or not, is queued for
/// deletion. A fleet never ends a pass owning two templates. No match means
/// the caller mints at `max_version + 1`.
pub fn plan_templates(spec: &FleetSpec, user_data: &str, live: &[LaunchTemplate]) -> TemplatePlan {
    let mut plan = TemplatePlan::default();
    for template in live {
        if plan.reuse.is_none() && template_matches(template, spec, user_data) {
            plan.reuse = Some(template.clone());
        } else {
            plan.delete.push(template.clone());
        }
    }
    plan
}

/// Bit-for-bit equivalence on every launch-relevant field.
fn template_matches(template: &LaunchTemplate, spec: &FleetSpec, user_data: &str) -> bool {
    template.image == spec.ami
        && template.ssh_key == spec.ssh_key
        && template.instance_type == spec.instance_type
        && matches!(template.security_groups.as_slice(), [sg] if *sg == spec.security_group)
        && template.user_data == user_data
}

/// What one fleet's reconciliation did, for reporting.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FleetSummary {
    /// Template the group references after this pass.
    pub template: String,
    /// Whether that template was minted this pass (false: reused).
    pub minted: bool,
    /// Whether the group was created (false: updated in place).
    pub created_group: bool,
    pub alarms_bound: usize,
    pub alarms_skipped: usize,
    pub templates_deleted: usize,
    pub delete_failures: usize,
}

/// Captured per-fleet result; one fleet failing never aborts the others.
#[derive(Debug)]
pub struct FleetOutcome {
    pub fleet: String,
    pub result: Result<FleetSummary>,
}

/// Drives one convergence pass: snapshot once, then every fleet in the
/// document against that snapshot.
pub struct Reconciler {
    provider: Arc<dyn AutoscaleProvider>,
    document: FleetDocument,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(provider: Arc<dyn AutoscaleProvider>, document: FleetDocument) -> Self {
        Self {
            provider,
            document,
            concurrency: DEFAULT_FLEET_CONCURRENCY,
        }
    }

    /// Bound on fleets reconciled at once. Calls within a fleet are always
    /// sequential; only whole fleets overlap.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run one pass.
    ///
    /// Errors returned here are fatal and precede any mutation (listing
    /// failures, malformed template names). Everything later is captured in
    /// the per-fleet outcomes.
    pub async fn run(&self) -> Result<Vec<FleetOutcome>> {
        let snapshot = Snapshot::fetch(self.provider.as_ref()).await?;

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(self.document.groups.len());

        for (fleet, spec) in &self.document.groups {
            let job = FleetJob {
                fleet: fleet.clone(),
                spec: spec.clone(),
                user_data: self.document.user_data_for(spec),
                notification_topic: self.document.notification_topic.clone(),
                policies: self.document.policies.clone(),
                live_templates: snapshot.templates_for(fleet).to_vec(),
                max_version: snapshot.max_version(fleet),
                group_exists: snapshot.group(fleet).is_some(),
            };
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);

            handles.push((
                fleet.clone(),
                tokio::spawn(async move {
                    // Never closed, so acquire cannot fail.
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    job.reconcile(provider.as_ref()).await
                }),
            ));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (fleet, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(Error::Task(join_err.to_string())),
            };
            if let Err(e) = &result {
                tracing::error!(fleet = %fleet, error = %e, "fleet reconciliation failed");
            }
            outcomes.push(FleetOutcome { fleet, result });
        }
        Ok(outcomes)
    }
}

/// Everything one fleet's reconciliation needs, detached from shared state
/// so each fleet runs as its own task with its own error boundary.
struct FleetJob {
    fleet: String,
    spec: FleetSpec,
    user_data: String,
    notification_topic: Option<String>,
    policies: BTreeMap<String, PolicySpec>,
    live_templates: Vec<LaunchTemplate>,
    max_version: u32,
    group_exists: bool,
}

impl FleetJob {
    async fn reconcile(self, provider: &dyn AutoscaleProvider) -> Result<FleetSummary> {
        info!(fleet = %self.fleet, "reconciling fleet");
        let mut summary = FleetSummary::default();

        let plan = plan_templates(&self.spec, &self.user_data, &self.live_templates);

        let template = match &plan.reuse {
            Some(template) => {
                info!(fleet = %self.fleet, template = %template.name, "reusing launch template");
                template.name.clone()
            }
            None => {
                let name = TemplateName::format(&self.fleet, self.max_version + 1);
                provider
                    .create_launch_template(&CreateLaunchTemplateRequest {
                        name: name.clone(),
                        image: self.spec.ami.clone(),
                        ssh_key: self.spec.ssh_key.clone(),
                        instance_type: self.spec.instance_type.clone(),
                        security_groups: vec![self.spec.security_group.clone()],
                        user_data: self.user_data.clone(),
                    })
                    .await?;
                info!(fleet = %self.fleet, template = %name, "minted launch template");
                summary.minted = true;
                name
            }
        };
        summary.template = template.clone();

        self.assert_group(provider, &template, &mut summary).await?;
        self.sync_tags(provider).await?;
        self.bind_notifications(provider).await?;
        self.bind_alarms(provider, &mut summary).await?;
        self.collect_garbage(provider, &plan.delete, &mut summary).await;

        Ok(summary)
    }

    /// Exactly one create-or-update call. Desired fields fully overwrite the
    /// live group; there is no partial-update path.
    async fn assert_group(
        &self,
        provider: &dyn AutoscaleProvider,
        template: &str,
        summary: &mut FleetSummary,
    ) -> Result<()> {
        let cfg = ScalingGroupConfig {
            name: self.fleet.clone(),
            launch_template: template.to_string(),
            zones: self.spec.zones.clone(),
            desired_capacity: self.spec.capacity,
            min_size: self.spec.min_size,
            max_size: self.spec.max_size,
        };

        if self.group_exists {
            provider.update_scaling_group(&self.fleet, &cfg).await?;
        } else {
            provider.create_scaling_group(&cfg).await?;
            summary.created_group = true;
        }
        Ok(())
    }

    /// Unconditional batch upsert, even when the mapping is empty. Keys
    /// removed from the document are NOT cleared from the live group; see
    /// DESIGN.md for the convergence gap this preserves.
    async fn sync_tags(&self, provider: &dyn AutoscaleProvider) -> Result<()> {
        let tags: Vec<Tag> = self
            .spec
            .tags
            .iter()
            .map(|(key, value)| Tag {
                key: key.clone(),
                value: value.clone(),
                resource_id: self.fleet.clone(),
                propagate_at_launch: true,
            })
            .collect();
        provider.put_tags(&self.fleet, &tags).await
    }

    /// No topic configured means no call at all; an existing binding on the
    /// group is left in place.
    async fn bind_notifications(&self, provider: &dyn AutoscaleProvider) -> Result<()> {
        let Some(topic) = &self.notification_topic else {
            return Ok(());
        };
        provider
            .put_notification_config(
                &self.fleet,
                &NotificationConfig {
                    topic: topic.clone(),
                    notification_types: LIFECYCLE_NOTIFICATIONS
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                },
            )
            .await
    }

    async fn bind_alarms(
        &self,
        provider: &dyn AutoscaleProvider,
        summary: &mut FleetSummary,
    ) -> Result<()> {
        for (alarm_name, alarm) in &self.spec.alarms {
            let Some(policy) = self.policies.get(&alarm.policy) else {
                warn!(
                    fleet = %self.fleet,
                    alarm = %alarm_name,
                    policy = %alarm.policy,
                    "policy not in catalog, skipping alarm"
                );
                summary.alarms_skipped += 1;
                continue;
            };

            // The policy reference is provider-assigned; it must come from
            // the upsert response, never be guessed from the name.
            let policy_name = format!("{}|{}", self.fleet, alarm.policy);
            let created = provider
                .put_scaling_policy(
                    &self.fleet,
                    &PutScalingPolicyRequest {
                        name: policy_name.clone(),
                        adjustment_type: policy.adjustment_type.clone(),
                        scaling_adjustment: policy.adjustment,
                        cooldown: policy.cooldown,
                    },
                )
                .await?;

            provider
                .put_metric_alarm(&PutMetricAlarmRequest {
                    name: format!("{policy_name}|{}", alarm.metric),
                    namespace: alarm.namespace.clone(),
                    metric: alarm.metric.clone(),
                    statistic: "Average".into(),
                    dimensions: HashMap::from([(
                        GROUP_DIMENSION.to_string(),
                        self.fleet.clone(),
                    )]),
                    comparison: alarm.comparison.clone(),
                    threshold: alarm.threshold,
                    period: alarm.period,
                    evaluation_periods: alarm.evaluation_periods,
                    alarm_actions: vec![created.policy_ref],
                })
                .await?;
            summary.alarms_bound += 1;
        }
        Ok(())
    }

    /// Delete failures are survivable: the template stays in the next
    /// snapshot and is retried on a future pass.
    async fn collect_garbage(
        &self,
        provider: &dyn AutoscaleProvider,
        doomed: &[LaunchTemplate],
        summary: &mut FleetSummary,
    ) {
        for template in doomed {
            match provider.delete_launch_template(&template.name).await {
                Ok(()) => {
                    info!(fleet = %self.fleet, template = %template.name, "deleted superseded launch template");
                    summary.templates_deleted += 1;
                }
                Err(e) => {
                    warn!(
                        fleet = %self.fleet,
                        template = %template.name,
                        error = %e,
                        "failed to delete launch template"
                    );
                    summary.delete_failures += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec() -> FleetSpec {
        FleetSpec {
            ami: "img-123".into(),
            ssh_key: "ops".into(),
            instance_type: "m1.small".into(),
            security_group: "web-sg".into(),
            zones: vec!["us-west-1a".into()],
            capacity: 2,
            min_size: 1,
            max_size: 4,
            user_data: None,
            tags: BTreeMap::new(),
            alarms: BTreeMap::new(),
        }
    }

    fn matching_template(name: &str) -> LaunchTemplate {
        LaunchTemplate {
            name: name.into(),
            image: "img-123".into(),
            ssh_key: "ops".into(),
            instance_type: "m1.small".into(),
            security_groups: vec!["web-sg".into()],
            user_data: String::new(),
        }
    }

    #[test]
    fn first_match_wins_rest_deleted() {
        // Both equivalent; ascending order means web-1 survives.
        let live = [matching_template("web-1"), matching_template("web-3")];
        let plan = plan_templates(&spec(), "", &live);

        assert_eq!(plan.reuse.as_ref().map(|t| t.name.as_str()), Some("web-1"));
        assert_eq!(plan.delete.len(), 1);
        assert_eq!(plan.delete[0].name, "web-3");
    }

    #[test]
    fn no_match_queues_everything() {
        let mut stale = matching_template("web-1");
        stale.image = "img-old".into();
        let plan = plan_templates(&spec(), "", &[stale, matching_template("web-2")]);

        // web-2 matches, so only web-1 goes.
        assert_eq!(plan.reuse.as_ref().map(|t| t.name.as_str()), Some("web-2"));
        assert_eq!(plan.delete[0].name, "web-1");

        let mut other = matching_template("web-2");
        other.user_data = "different".into();
        let plan = plan_templates(&spec(), "", &[other]);
        assert!(plan.reuse.is_none());
        assert_eq!(plan.delete.len(), 1);
    }

    #[test]
    fn equivalence_requires_every_field() {
        let spec = spec();

        let mut t = matching_template("web-1");
        assert!(template_matches(&t, &spec, ""));

        t.ssh_key = "other".into();
        assert!(!template_matches(&t, &spec, ""));

        let mut t = matching_template("web-1");
        t.security_groups = vec!["web-sg".into(), "extra-sg".into()];
        assert!(!template_matches(&t, &spec, ""));

        let t = matching_template("web-1");
        assert!(!template_matches(&t, &spec, "#!/bin/sh"));
    }

    #[test]
    fn boot_script_compared_byte_for_byte() {
        let mut t = matching_template("web-1");
        t.user_data = "a\nb\nc".into();

        assert!(template_matches(&t, &spec(), "a\nb\nc"));
        assert!(!template_matches(&t, &spec(), "a\nb\nc\n"));
    }
}
