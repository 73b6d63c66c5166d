//! Desired-state document: the YAML file declaring fleets, policies and
//! alarms. Mappings deserialize into `BTreeMap` so every pass walks them in
//! a deterministic order.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::{Error, Result};

pub const DEFAULT_REGION: &str = "us-west-1";

/// The whole desired-state document.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetDocument {
    #[serde(default = "default_region")]
    pub region: String,

    /// Topic to receive lifecycle notifications for every group. Absent
    /// means notifications are left alone, including any existing binding.
    pub notification_topic: Option<String>,

    /// Document-level boot script, applied to every fleet that does not
    /// carry its own.
    pub user_data: Option<UserData>,

    /// Global policy catalog; instantiated per fleet per alarm.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicySpec>,

    pub groups: BTreeMap<String, FleetSpec>,
}

impl FleetDocument {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::DocumentRead {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Effective boot script for one fleet: the fleet's own, else the
    /// document default, else empty.
    pub fn user_data_for(&self, spec: &FleetSpec) -> String {
        spec.user_data
            .as_ref()
            .or(self.user_data.as_ref())
            .map(UserData::render)
            .unwrap_or_default()
    }
}

fn default_region() -> String {
    DEFAULT_REGION.into()
}

/// One fleet: exactly one scaling group plus its launch-template lineage.
#[derive(Debug, Clone, Deserialize)]
pub struct FleetSpec {
    pub ami: String,
    pub ssh_key: String,
    pub instance_type: String,
    pub security_group: String,
    pub zones: Vec<String>,
    pub capacity: u32,
    pub min_size: u32,
    pub max_size: u32,

    /// Per-fleet boot script, overriding the document-level one.
    pub user_data: Option<UserData>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default)]
    pub alarms: BTreeMap<String, AlarmSpec>,
}

/// A named adjustment rule from the global catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySpec {
    #[serde(rename = "type")]
    pub adjustment_type: String,
    pub adjustment: i32,
    pub cooldown: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlarmSpec {
    /// Name into the policy catalog. Unresolvable names skip the alarm with
    /// a warning; the fleet's other alarms still process.
    pub policy: String,
    pub namespace: String,
    pub metric: String,
    pub comparison: String,
    pub threshold: f64,
    pub period: u32,
    #[serde(default = "default_evaluation_periods")]
    pub evaluation_periods: u32,
}

fn default_evaluation_periods() -> u32 {
    1
}

/// Boot script, either a literal string or an ordered list of lines.
///
/// Lists are joined with `\n`. Cloud-config payloads are YAML themselves and
/// multiline YAML strings make the indentation miserable; the list form
/// sidesteps that.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserData {
    Text(String),
    Lines(Vec<String>),
}

impl UserData {
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Lines(lines) => lines.join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOC: &str = r##"
notification_topic: arn:topic:ops
user_data:
  - "#cloud-config"
  - "runcmd:"
  - "  - systemctl start app"
policies:
  scale-up:
    type: ChangeInCapacity
    adjustment: 2
    cooldown: 300
groups:
  web:
    ami: img-123
    ssh_key: ops
    instance_type: m1.small
    security_group: web-sg
    zones: [us-west-1a, us-west-1b]
    capacity: 4
    min_size: 2
    max_size: 8
    tags:
      role: web
    alarms:
      cpu-high:
        policy: scale-up
        namespace: compute
        metric: CPUUtilization
        comparison: ">"
        threshold: 80
        period: 60
"##;

    #[test]
    fn parses_full_document() {
        let doc: FleetDocument = serde_yaml::from_str(DOC).unwrap();

        assert_eq!(doc.region, DEFAULT_REGION);
        assert_eq!(doc.notification_topic.as_deref(), Some("arn:topic:ops"));
        assert_eq!(doc.policies["scale-up"].adjustment, 2);
        assert_eq!(doc.policies["scale-up"].cooldown, Some(300));

        let web = &doc.groups["web"];
        assert_eq!(web.capacity, 4);
        assert_eq!(web.tags["role"], "web");

        let alarm = &web.alarms["cpu-high"];
        assert_eq!(alarm.metric, "CPUUtilization");
        assert_eq!(alarm.evaluation_periods, 1);
    }

    #[test]
    fn user_data_list_and_string_render_identically() {
        let listed: UserData = serde_yaml::from_str("[a, b, c]").unwrap();
        let literal: UserData = serde_yaml::from_str("\"a\\nb\\nc\"").unwrap();

        assert_eq!(listed.render(), "a\nb\nc");
        assert_eq!(listed.render(), literal.render());
    }

    #[test]
    fn fleet_user_data_overrides_document_default() {
        let doc: FleetDocument = serde_yaml::from_str(
            r#"
user_data: global
groups:
  web:
    ami: img-123
    ssh_key: ops
    instance_type: m1.small
    security_group: web-sg
    zones: [us-west-1a]
    capacity: 1
    min_size: 1
    max_size: 1
    user_data: [own, script]
  api:
    ami: img-123
    ssh_key: ops
    instance_type: m1.small
    security_group: api-sg
    zones: [us-west-1a]
    capacity: 1
    min_size: 1
    max_size: 1
"#,
        )
        .unwrap();

        assert_eq!(doc.user_data_for(&doc.groups["web"]), "own\nscript");
        assert_eq!(doc.user_data_for(&doc.groups["api"]), "global");
    }

    #[test]
    fn missing_user_data_renders_empty() {
        let doc: FleetDocument = serde_yaml::from_str(
            r#"
groups:
  web:
    ami: img-123
    ssh_key: ops
    instance_type: m1.small
    security_group: web-sg
    zones: [us-west-1a]
    capacity: 1
    min_size: 1
    max_size: 1
"#,
        )
        .unwrap();

        assert_eq!(doc.user_data_for(&doc.groups["web"]), "");
    }

    #[test]
    fn load_reports_missing_file_with_path() {
        let err = FleetDocument::load("/nonexistent/autoscale.yaml").unwrap_err();
        assert!(matches!(err, Error::DocumentRead { ref path, .. } if path.contains("autoscale.yaml")));
    }

    #[test]
    fn load_reads_document_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOC.as_bytes()).unwrap();

        let doc = FleetDocument::load(file.path()).unwrap();
        assert!(doc.groups.contains_key("web"));
    }
}
