//! Point-in-time view of live autoscaling state, indexed for reconciliation.
//! Rebuilt from scratch every pass; nothing here survives across runs.

use std::collections::HashMap;

use asg_api::{LaunchTemplate, ScalingGroup};

use crate::{AutoscaleProvider, Error, Result};

/// Parsed `<fleet>-<version>` launch template name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateName {
    pub fleet: String,
    pub version: u32,
}

impl TemplateName {
    /// Split on the last `-`; fleet names may themselves contain dashes.
    ///
    /// The version must be a positive integer. Anything else is fatal for
    /// the whole run: a template outside the naming scheme means the account
    /// holds resources this tool must not touch.
    pub fn parse(raw: &str) -> Result<Self> {
        let (fleet, version) = raw
            .rsplit_once('-')
            .ok_or_else(|| Error::TemplateName(raw.into()))?;
        let version: u32 = version
            .parse()
            .map_err(|_| Error::TemplateName(raw.into()))?;
        if fleet.is_empty() || version == 0 {
            return Err(Error::TemplateName(raw.into()));
        }
        Ok(Self {
            fleet: fleet.into(),
            version,
        })
    }

    pub fn format(fleet: &str, version: u32) -> String {
        format!("{fleet}-{version}")
    }
}

#[derive(Debug, Default)]
pub struct Snapshot {
    templates_by_fleet: HashMap<String, Vec<LaunchTemplate>>,
    max_version_by_fleet: HashMap<String, u32>,
    groups_by_name: HashMap<String, ScalingGroup>,
}

impl Snapshot {
    /// One list call per resource kind; pure read, no side effects.
    pub async fn fetch(provider: &dyn AutoscaleProvider) -> Result<Self> {
        let templates = provider.list_launch_templates().await?;
        let groups = provider.list_scaling_groups().await?;
        Self::index(templates, groups)
    }

    /// Pure indexing from the raw listings.
    pub fn index(templates: Vec<LaunchTemplate>, groups: Vec<ScalingGroup>) -> Result<Self> {
        let mut parsed: HashMap<String, Vec<(u32, LaunchTemplate)>> = HashMap::new();
        for template in templates {
            let name = TemplateName::parse(&template.name)?;
            parsed.entry(name.fleet).or_default().push((name.version, template));
        }

        let mut templates_by_fleet = HashMap::new();
        let mut max_version_by_fleet = HashMap::new();
        for (fleet, mut list) in parsed {
            // Ascending version order keeps template matching deterministic.
            list.sort_by_key(|(version, _)| *version);
            let max = list.last().map(|(version, _)| *version).unwrap_or(0);
            max_version_by_fleet.insert(fleet.clone(), max);
            templates_by_fleet.insert(fleet, list.into_iter().map(|(_, t)| t).collect());
        }

        let groups_by_name = groups.into_iter().map(|g| (g.name.clone(), g)).collect();

        Ok(Self {
            templates_by_fleet,
            max_version_by_fleet,
            groups_by_name,
        })
    }

    /// Live templates for one fleet, ascending by version.
    pub fn templates_for(&self, fleet: &str) -> &[LaunchTemplate] {
        self.templates_by_fleet
            .get(fleet)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Highest existing version for a fleet, 0 when it owns no templates.
    /// Versions only grow; deletion never frees a number for reuse.
    pub fn max_version(&self, fleet: &str) -> u32 {
        self.max_version_by_fleet.get(fleet).copied().unwrap_or(0)
    }

    pub fn group(&self, name: &str) -> Option<&ScalingGroup> {
        self.groups_by_name.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str) -> LaunchTemplate {
        LaunchTemplate {
            name: name.to_string(),
            image: "img-123".into(),
            ssh_key: "ops".into(),
            instance_type: "m1.small".into(),
            security_groups: vec!["web-sg".into()],
            user_data: String::new(),
        }
    }

    #[test]
    fn parses_simple_name() {
        let name = TemplateName::parse("web-3").unwrap();
        assert_eq!(name.fleet, "web");
        assert_eq!(name.version, 3);
    }

    #[test]
    fn splits_on_last_dash_only() {
        let name = TemplateName::parse("billing-workers-12").unwrap();
        assert_eq!(name.fleet, "billing-workers");
        assert_eq!(name.version, 12);
    }

    #[test]
    fn rejects_malformed_names() {
        for raw in ["web", "web-", "-3", "web-abc", "web-0", "web-1.5"] {
            assert!(
                matches!(TemplateName::parse(raw), Err(Error::TemplateName(_))),
                "{raw:?} should not parse"
            );
        }
    }

    #[test]
    fn format_round_trips() {
        assert_eq!(TemplateName::format("web", 4), "web-4");
        assert_eq!(
            TemplateName::parse(&TemplateName::format("billing-workers", 7)).unwrap(),
            TemplateName {
                fleet: "billing-workers".into(),
                version: 7
            }
        );
    }

    #[test]
    fn indexes_templates_by_fleet_ascending() {
        let snapshot = Snapshot::index(
            vec![template("web-3"), template("api-2"), template("web-1")],
            vec![],
        )
        .unwrap();

        let names: Vec<&str> = snapshot
            .templates_for("web")
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, ["web-1", "web-3"]);
        assert_eq!(snapshot.max_version("web"), 3);
        assert_eq!(snapshot.max_version("api"), 2);
    }

    #[test]
    fn unknown_fleet_defaults_to_empty() {
        let snapshot = Snapshot::index(vec![], vec![]).unwrap();
        assert!(snapshot.templates_for("web").is_empty());
        assert_eq!(snapshot.max_version("web"), 0);
        assert!(snapshot.group("web").is_none());
    }

    #[test]
    fn one_malformed_name_fails_the_whole_index() {
        let result = Snapshot::index(vec![template("web-1"), template("orphan")], vec![]);
        assert!(matches!(result, Err(Error::TemplateName(ref n)) if n == "orphan"));
    }
}
