//! Samples and gauge families produced by collectors.
//!
//! Collectors build flat [`MetricSample`]s and [`group`] them into
//! [`GaugeFamily`] values, which are what snapshots hold and what the
//! exposition registry turns into Prometheus metric families.

use std::collections::HashMap;

use prometheus::{GaugeVec, Opts, core::Collector, proto::MetricFamily};
use tracing::{debug, warn};

/// Ordered `(label name, label value)` pairs.
pub type Labels = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub help: String,
    pub labels: Labels,
    pub value: f64,
}

impl MetricSample {
    pub fn new(name: impl Into<String>, help: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            labels: Labels::new(),
            value,
        }
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((name.into(), value.into()));
        self
    }

    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// A gauge metric family: one name, one help text, one ordered label-name set.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeFamily {
    name: String,
    help: String,
    label_names: Vec<String>,
    samples: Vec<(Vec<String>, f64)>,
}

impl GaugeFamily {
    pub fn new<I, S>(name: &str, help: impl Into<String>, label_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: sanitize_metric_name(name),
            help: help.into(),
            label_names: label_names
                .into_iter()
                .map(|l| sanitize_label_name(l.as_ref()))
                .collect(),
            samples: Vec::new(),
        }
    }

    /// A label-less family with a single value.
    pub fn scalar(name: &str, help: impl Into<String>, value: f64) -> Self {
        let mut family = Self::new(name, help, Vec::<String>::new());
        family.samples.push((Vec::new(), value));
        family
    }

    /// Adds a sample. Returns `false` when the label value count does not
    /// match the family's label names.
    pub fn push<I, S>(&mut self, label_values: I, value: f64) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = label_values.into_iter().map(Into::into).collect();
        if values.len() != self.label_names.len() {
            return false;
        }
        self.samples.push((values, value));
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn samples(&self) -> &[(Vec<String>, f64)] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Value of the last sample carrying exactly `label_values`.
    pub fn value(&self, label_values: &[&str]) -> Option<f64> {
        self.samples
            .iter()
            .rev()
            .find(|(values, _)| values.iter().map(String::as_str).eq(label_values.iter().copied()))
            .map(|(_, value)| *value)
    }

    /// Converts the family into Prometheus protobuf families. Samples sharing a
    /// label set collapse into one series holding the last value.
    pub fn to_metric_families(&self) -> Vec<MetricFamily> {
        if self.samples.is_empty() {
            return Vec::new();
        }

        let help = if self.help.trim().is_empty() {
            self.name.clone()
        } else {
            self.help.clone()
        };
        let label_names: Vec<&str> = self.label_names.iter().map(String::as_str).collect();
        let gauges = match GaugeVec::new(Opts::new(self.name.clone(), help), &label_names) {
            Ok(gauges) => gauges,
            Err(e) => {
                warn!(
                    event.name = "sample.family_rejected",
                    metric.name = %self.name,
                    error.message = %e,
                    "dropping metric family"
                );
                return Vec::new();
            }
        };

        for (values, value) in &self.samples {
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            match gauges.get_metric_with_label_values(&values) {
                Ok(gauge) => gauge.set(*value),
                Err(e) => debug!(
                    event.name = "sample.series_rejected",
                    metric.name = %self.name,
                    error.message = %e,
                    "dropping series"
                ),
            }
        }

        gauges.collect()
    }
}

/// Groups samples into families by name, keeping first-appearance order. The
/// first sample of a name fixes its help text and label names; later samples
/// with a different label-name sequence are dropped.
pub fn group(samples: impl IntoIterator<Item = MetricSample>) -> Vec<GaugeFamily> {
    let mut families: Vec<GaugeFamily> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for sample in samples {
        let name = sanitize_metric_name(&sample.name);
        let position = *index.entry(name).or_insert_with(|| {
            families.push(GaugeFamily::new(
                &sample.name,
                sample.help.clone(),
                sample.labels.iter().map(|(k, _)| k.as_str()),
            ));
            families.len() - 1
        });

        let family = &mut families[position];
        let same_labels = family.label_names.len() == sample.labels.len()
            && family
                .label_names
                .iter()
                .zip(&sample.labels)
                .all(|(expected, (name, _))| *expected == sanitize_label_name(name));
        if !same_labels {
            debug!(
                event.name = "sample.label_mismatch",
                metric.name = %family.name,
                "dropping sample whose label names differ from its family"
            );
            continue;
        }
        family
            .samples
            .push((sample.labels.into_iter().map(|(_, v)| v).collect(), sample.value));
    }

    families
}

fn sanitize(name: &str, allow_colon: bool) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.chars().next().is_none_or(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Rewrites a metric name into the `[a-zA-Z_:][a-zA-Z0-9_:]*` charset.
pub fn sanitize_metric_name(name: &str) -> String {
    sanitize(name, true)
}

/// Rewrites a label name into `[a-zA-Z_][a-zA-Z0-9_]*`, avoiding the reserved
/// `__` prefix.
pub fn sanitize_label_name(name: &str) -> String {
    let mut out = sanitize(name, false);
    while out.starts_with("__") {
        out.remove(0);
    }
    out
}

#[cfg(test)]
mod tests {
    use prometheus::TextEncoder;

    use super::{GaugeFamily, MetricSample, group, sanitize_label_name, sanitize_metric_name};

    fn render(family: &GaugeFamily) -> String {
        TextEncoder::new()
            .encode_to_string(&family.to_metric_families())
            .unwrap()
    }

    #[test]
    fn groups_by_name_in_first_appearance_order() {
        let families = group([
            MetricSample::new("es_b", "b", 1.0).with_label("node", "n1"),
            MetricSample::new("es_a", "a", 2.0).with_label("node", "n1"),
            MetricSample::new("es_b", "ignored help", 3.0).with_label("node", "n2"),
        ]);

        assert_eq!(families.len(), 2);
        assert_eq!(families[0].name(), "es_b");
        assert_eq!(families[0].help(), "b");
        assert_eq!(families[0].len(), 2);
        assert_eq!(families[0].value(&["n2"]), Some(3.0));
        assert_eq!(families[1].name(), "es_a");
    }

    #[test]
    fn drops_samples_with_mismatched_label_names() {
        let families = group([
            MetricSample::new("es_x", "x", 1.0).with_label("index", "i1"),
            MetricSample::new("es_x", "x", 2.0).with_label("node", "n1"),
            MetricSample::new("es_x", "x", 3.0),
        ]);
        assert_eq!(families[0].len(), 1);
        assert_eq!(families[0].label_names(), ["index".to_string()]);
    }

    #[test]
    fn renders_gauges_with_labels() {
        let mut family = GaugeFamily::new("es_cluster_status", "status", ["cluster_name"]);
        assert!(family.push(["c1"], 1.0));
        assert!(!family.push(["c1", "extra"], 1.0));

        let text = render(&family);
        assert!(text.contains("# HELP es_cluster_status status"));
        assert!(text.contains("# TYPE es_cluster_status gauge"));
        assert!(text.contains("es_cluster_status{cluster_name=\"c1\"} 1"));
    }

    #[test]
    fn duplicate_label_sets_keep_the_last_value() {
        let families = group([
            MetricSample::new("es_node_count", "a", 1.0).with_label("node", "n1"),
            MetricSample::new("es_node_count", "b", 5.0).with_label("node", "n1"),
        ]);
        let text = render(&families[0]);
        assert!(text.contains("es_node_count{node=\"n1\"} 5"));
        assert!(!text.contains("es_node_count{node=\"n1\"} 1"));
    }

    #[test]
    fn empty_help_falls_back_to_name() {
        let text = render(&GaugeFamily::scalar("es_q_hits_total", "", 4.0));
        assert!(text.contains("# HELP es_q_hits_total es_q_hits_total"));
        assert!(text.contains("es_q_hits_total 4"));
    }

    #[test]
    fn empty_family_renders_nothing() {
        let family = GaugeFamily::new("es_empty", "e", ["a"]);
        assert!(family.is_empty());
        assert!(family.to_metric_families().is_empty());
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_metric_name("es_node_cpu.percent"), "es_node_cpu_percent");
        assert_eq!(sanitize_metric_name("1st:metric"), "_1st:metric");
        assert_eq!(sanitize_label_name("by-status"), "by_status");
        assert_eq!(sanitize_label_name("a:b"), "a_b");
        assert_eq!(sanitize_label_name("__name"), "_name");
        assert_eq!(sanitize_label_name(""), "_");
    }

    #[test]
    fn sanitized_names_still_group_together() {
        let families = group([
            MetricSample::new("es.q", "q", 1.0).with_label("by-host", "h1"),
            MetricSample::new("es_q", "q", 2.0).with_label("by_host", "h2"),
        ]);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name(), "es_q");
        assert_eq!(families[0].label_names(), ["by_host".to_string()]);
        assert_eq!(families[0].len(), 2);
    }
}
