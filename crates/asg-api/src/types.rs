use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Launch templates ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateLaunchTemplateRequest {
    pub name: String,
    pub image: String,
    pub ssh_key: String,
    pub instance_type: String,
    pub security_groups: Vec<String>,
    pub user_data: String,
}

/// A launch template as reported by the provider. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LaunchTemplate {
    pub name: String,
    pub image: String,
    pub ssh_key: String,
    pub instance_type: String,
    pub security_groups: Vec<String>,
    pub user_data: String,
}

#[derive(Debug, Deserialize)]
pub struct LaunchTemplateList {
    pub launch_templates: Vec<LaunchTemplate>,
}

// ── Scaling groups ───────────────────────────────────────────────────

/// Full desired shape of a scaling group. Used for both create and update;
/// the provider replaces every field on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalingGroupConfig {
    pub name: String,
    pub launch_template: String,
    pub zones: Vec<String>,
    pub desired_capacity: u32,
    pub min_size: u32,
    pub max_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScalingGroup {
    pub name: String,
    pub launch_template: String,
    pub zones: Vec<String>,
    pub desired_capacity: u32,
    pub min_size: u32,
    pub max_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct ScalingGroupList {
    pub scaling_groups: Vec<ScalingGroup>,
}

// ── Tags ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
    pub resource_id: String,
    pub propagate_at_launch: bool,
}

#[derive(Debug, Serialize)]
pub struct TagBatch {
    pub tags: Vec<Tag>,
}

// ── Notifications ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationConfig {
    pub topic: String,
    pub notification_types: Vec<String>,
}

// ── Scaling policies ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PutScalingPolicyRequest {
    pub name: String,
    pub adjustment_type: String,
    pub scaling_adjustment: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown: Option<u32>,
}

/// Provider response for a scaling policy. `policy_ref` is assigned by the
/// provider and is the only handle alarms may use as an action target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScalingPolicy {
    pub name: String,
    pub policy_ref: String,
}

// ── Metric alarms ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PutMetricAlarmRequest {
    pub name: String,
    pub namespace: String,
    pub metric: String,
    pub statistic: String,
    pub dimensions: HashMap<String, String>,
    pub comparison: String,
    pub threshold: f64,
    pub period: u32,
    pub evaluation_periods: u32,
    pub alarm_actions: Vec<String>,
}
