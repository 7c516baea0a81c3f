use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;

use crate::parser::{Exemplar, MetricFamily, MetricSet, MetricType, Sample};

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::GaugeHistogram => "gaugehistogram",
            Self::Histogram => "histogram",
            Self::Info => "info",
            Self::StateSet => "stateset",
            Self::Summary => "summary",
            Self::Unknown => "unknown",
        };

        f.pad(name)
    }
}

/// Renders the whole document, ending with the `# EOF` marker.  Feeding
/// the output back through the parser reproduces the set.
impl fmt::Display for MetricSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for family in &self.families {
            write!(f, "{}", family)?;
        }

        f.write_str("# EOF\n")
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# TYPE {} {}", self.name, self.family_type)?;
        if let Some(help) = &self.help {
            writeln!(f, "# HELP {} {}", self.name, escape_help(help))?;
        }
        if let Some(unit) = &self.unit {
            writeln!(f, "# UNIT {} {}", self.name, unit)?;
        }
        for sample in &self.samples {
            writeln!(f, "{}", sample)?;
        }

        Ok(())
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            write!(f, "{} {}", self.name, fmt_number(self.value))?;
        } else {
            write!(
                f,
                "{}{{{}}} {}",
                self.name,
                label_body(&self.labels),
                fmt_number(self.value)
            )?;
        }

        if let Some(timestamp) = self.timestamp {
            write!(f, " {}", timestamp)?;
        }
        if let Some(exemplar) = &self.exemplar {
            write!(f, "{}", exemplar)?;
        }

        Ok(())
    }
}

/// Rendered with its leading ` # ` separator so it can be appended
/// directly to a sample line.  The label block is always braced, even
/// when empty.
impl fmt::Display for Exemplar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " # {{{}}} {}",
            label_body(&self.labels),
            fmt_number(self.value)
        )?;
        if let Some(timestamp) = self.timestamp {
            write!(f, " {}", timestamp)?;
        }

        Ok(())
    }
}

fn label_body(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(name, value)| format!(r#"{}="{}""#, name, escape_label(value)))
        .join(",")
}

fn fmt_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

/// Label values escape backslash, double quote, and line feed.
fn escape_label(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', r#"\""#)
        .replace('\n', r"\n")
}

/// Help text escapes backslash and line feed only.
fn escape_help(text: &str) -> String {
    text.replace('\\', r"\\").replace('\n', r"\n")
}
