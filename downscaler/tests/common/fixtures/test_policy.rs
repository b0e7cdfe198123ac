//! Builder for policy documents

use downscaler::policy::Policy;

/// Builds the YAML of a policy ConfigMap entry
pub struct PolicyBuilder {
    time_zone: String,
    recurrence: String,
    operator: String,
    excluded: Vec<String>,
    rules: Vec<(Vec<String>, String)>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self {
            time_zone: "UTC".to_string(),
            recurrence: "MON-FRI".to_string(),
            operator: "exclude".to_string(),
            excluded: vec!["kube-system".to_string()],
            rules: Vec::new(),
        }
    }

    pub fn time_zone(mut self, time_zone: &str) -> Self {
        self.time_zone = time_zone.to_string();
        self
    }

    pub fn recurrence(mut self, recurrence: &str) -> Self {
        self.recurrence = recurrence.to_string();
        self
    }

    pub fn operator(mut self, operator: &str) -> Self {
        self.operator = operator.to_string();
        self
    }

    pub fn exclude(mut self, namespaces: &[&str]) -> Self {
        self.excluded = namespaces.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn rule(mut self, namespaces: &[&str], window: &str) -> Self {
        self.rules.push((
            namespaces.iter().map(|n| n.to_string()).collect(),
            window.to_string(),
        ));
        self
    }

    pub fn to_yaml(&self) -> String {
        let mut yaml = format!(
            r#"kind: Downscaler
metadata:
  name: downscaler
spec:
  executionOpts:
    time:
      timeZone: "{}"
      recurrence: "{}"
      downscaler:
        downscalerSelectorTerms:
          matchExpressions:
            key: namespace
            operator: {}
            values: [{}]
        withNamespaceOpts:
          downscaleNamespacesWithTimeRules:
"#,
            self.time_zone,
            self.recurrence,
            self.operator,
            self.excluded.join(", ")
        );

        if self.rules.is_empty() {
            yaml.push_str("            rules: []\n");
            return yaml;
        }

        yaml.push_str("            rules:\n");
        for (namespaces, window) in &self.rules {
            yaml.push_str(&format!(
                "              - namespaces: [{}]\n                withCron: \"{}\"\n",
                namespaces.join(", "),
                window
            ));
        }
        yaml
    }

    pub fn build(&self) -> Policy {
        Policy::from_yaml(&self.to_yaml()).expect("fixture policy should parse")
    }
}
