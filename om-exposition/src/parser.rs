use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[cfg(not(feature = "hash_fnv"))]
use std::collections::hash_map::DefaultHasher;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serializer;
use serde_derive::Serialize;
use tracing::{debug, trace};

use crate::lexer;
use crate::{ParseError, Warning};

lazy_static! {
    // Pattern used to check for escape characters
    static ref UNESCAPE_RE: Regex = Regex::new(r#"(\\[n"\\])"#).unwrap();
}

/// A parsed document: metric families in the order their names were first
/// seen.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct MetricSet {
    pub families: Vec<MetricFamily>,
}

impl MetricSet {
    /// Looks a family up by its base name.
    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|family| family.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricFamily> {
        self.families.iter()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

impl<'a> IntoIterator for &'a MetricSet {
    type Item = &'a MetricFamily;
    type IntoIter = std::slice::Iter<'a, MetricFamily>;

    fn into_iter(self) -> Self::IntoIter {
        self.families.iter()
    }
}

/// A MetricFamily is a collection of related (and similarly named) metrics
#[derive(Debug, PartialEq, Serialize)]
pub struct MetricFamily {
    pub name: String,
    pub family_type: MetricType,
    pub help: Option<String>,
    pub unit: Option<String>,
    pub samples: Vec<Sample>,
}

/// [`MetricFamily`] type.  Families never introduced by a `# TYPE` line
/// report `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MetricType {
    /// Counters measure discrete events.
    Counter,
    /// Gauges are current measurements, such as bytes of memory currently used or the number of items in a queue.
    Gauge,
    /// GaugeHistograms measure current distributions. Common examples are how long items have been waiting in a queue, or size of the requests in a queue.
    GaugeHistogram,
    /// Histograms measure distributions of discrete events.
    Histogram,
    /// Info metrics are used to expose textual information which SHOULD NOT change during process lifetime.
    Info,
    /// StateSets represent a series of related boolean values, also called a bitset.
    StateSet,
    /// Summaries also measure distributions of discrete events and MAY be used when Histograms are too expensive and/or an average event size is sufficient.
    Summary,
    /// Unknown SHOULD NOT be used. Unknown MAY be used when it is impossible to determine the types of individual metrics from 3rd party systems.
    Unknown,
}

impl FromStr for MetricType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            "gaugehistogram" => Ok(Self::GaugeHistogram),
            "histogram" => Ok(Self::Histogram),
            "info" => Ok(Self::Info),
            "stateset" => Ok(Self::StateSet),
            "summary" => Ok(Self::Summary),
            "unknown" => Ok(Self::Unknown),
            _ => Err(()),
        }
    }
}

impl MetricType {
    /// Maps a sample-name suffix to the role the sample plays for this
    /// type, or `None` when the type does not admit the suffix.  The empty
    /// suffix marks a sample carrying the bare family name.
    fn role(&self, suffix: &str) -> Option<SampleRole> {
        match self {
            Self::Counter => match suffix {
                "_total" => Some(SampleRole::Total),
                "_created" => Some(SampleRole::Created),
                _ => None,
            },
            Self::Gauge => match suffix {
                "" => Some(SampleRole::Plain),
                _ => None,
            },
            Self::GaugeHistogram => match suffix {
                "_bucket" => Some(SampleRole::Bucket),
                "_gcount" => Some(SampleRole::GCount),
                "_gsum" => Some(SampleRole::GSum),
                _ => None,
            },
            Self::Histogram => match suffix {
                "_bucket" => Some(SampleRole::Bucket),
                "_count" => Some(SampleRole::Count),
                "_created" => Some(SampleRole::Created),
                "_sum" => Some(SampleRole::Sum),
                _ => None,
            },
            Self::Info => match suffix {
                "_info" => Some(SampleRole::Info),
                _ => None,
            },
            Self::StateSet => match suffix {
                "" => Some(SampleRole::State),
                _ => None,
            },
            Self::Summary => match suffix {
                "" => Some(SampleRole::Quantile),
                "_count" => Some(SampleRole::Count),
                "_created" => Some(SampleRole::Created),
                "_sum" => Some(SampleRole::Sum),
                _ => None,
            },
            Self::Unknown => match suffix {
                "" => Some(SampleRole::Plain),
                _ => None,
            },
        }
    }

    fn suffix_requirement(&self) -> &'static str {
        match self {
            Self::Counter => "counter samples end in `_total` or `_created`",
            Self::Gauge => "gauge samples carry no suffix",
            Self::GaugeHistogram => {
                "gaugehistogram samples end in `_bucket`, `_gcount`, or `_gsum`"
            }
            Self::Histogram => "histogram samples end in `_bucket`, `_count`, `_sum`, or `_created`",
            Self::Info => "info samples end in `_info`",
            Self::StateSet => "stateset samples carry no suffix",
            Self::Summary => {
                "summary samples carry a `quantile` label or end in `_count`, `_sum`, or `_created`"
            }
            Self::Unknown => "unknown-typed samples carry no suffix",
        }
    }

    fn can_have_unit(&self) -> bool {
        match self {
            Self::Info | Self::StateSet => false,
            Self::Counter
            | Self::Gauge
            | Self::GaugeHistogram
            | Self::Histogram
            | Self::Summary
            | Self::Unknown => true,
        }
    }

    /// The label this type reserves on its distribution samples.  It is
    /// excluded when samples are grouped into series.
    fn reserved_label(&self) -> &'static str {
        match self {
            Self::Histogram | Self::GaugeHistogram => "le",
            Self::Summary => "quantile",
            Self::Counter | Self::Gauge | Self::Info | Self::StateSet | Self::Unknown => "",
        }
    }
}

/// How a sample relates to its family's declared type.  `Bucket` and
/// `Quantile` carry the parsed bound.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum SampleKind {
    /// No type-mandated suffix (gauge, stateset-free bare names, unknown).
    Plain,
    Total,
    Created,
    Count,
    Sum,
    GCount,
    GSum,
    Bucket(f64),
    Quantile(f64),
    Info,
    State,
}

/// [`SampleKind`] before the `le`/`quantile` bound is parsed.
#[derive(Clone, Copy, Debug, PartialEq)]
enum SampleRole {
    Plain,
    Total,
    Created,
    Count,
    Sum,
    GCount,
    GSum,
    Bucket,
    Quantile,
    Info,
    State,
}

#[derive(Clone, Debug, Serialize)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_number")]
    pub value: f64,
    pub timestamp: Option<f64>,
    pub exemplar: Option<Exemplar>,

    pub kind: SampleKind,
}

impl PartialEq for Sample {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.labels == other.labels
            && number_eq(self.value, other.value)
            && self.timestamp == other.timestamp
            && self.exemplar == other.exemplar
            && self.kind == other.kind
    }
}

/// Exemplars are references to data outside of the MetricSet. A common use case are IDs of program traces.
///
/// Exemplars MUST consist of a LabelSet and a value, and MAY have a timestamp.
#[derive(Clone, Debug, Serialize)]
pub struct Exemplar {
    pub labels: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_number")]
    pub value: f64,
    pub timestamp: Option<f64>,
}

impl PartialEq for Exemplar {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
            && number_eq(self.value, other.value)
            && self.timestamp == other.timestamp
    }
}

/// Equality that treats two NaNs as the same value.
pub(crate) fn number_eq(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b
}

fn serialize_number<S>(number: &f64, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if number.is_nan() {
        s.serialize_str("NaN")
    } else if number.is_infinite() && number.is_sign_positive() {
        s.serialize_str("+Inf")
    } else if number.is_infinite() {
        s.serialize_str("-Inf")
    } else {
        s.serialize_f64(*number)
    }
}

/// Per-parse configuration.
#[derive(Clone, Copy, Debug)]
pub struct ParseOptions {
    /// Fail on out-of-order `le`/`quantile` bounds.  When false the
    /// violation is collected as a [`Warning`] and parsing continues.
    pub strict_ordering: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict_ordering: true,
        }
    }
}

/// Distribution bookkeeping for one series (a family's label set minus the
/// reserved `le`/`quantile` label).
#[derive(Debug, Default)]
struct GroupState {
    has_bucket: bool,
    has_inf_bucket: bool,
    has_count: bool,
    has_sum: bool,
    has_quantile: bool,
    last_bound: Option<f64>,
}

#[derive(Debug)]
struct FamilyBuilder {
    name: String,
    family_type: Option<MetricType>,
    help: Option<String>,
    unit: Option<String>,
    samples: Vec<Sample>,
    groups: HashMap<u64, GroupState>,
    last_line: usize,
}

impl FamilyBuilder {
    fn new(name: &str, line: usize) -> Self {
        Self {
            name: name.to_string(),
            family_type: None,
            help: None,
            unit: None,
            samples: Vec::new(),
            groups: HashMap::new(),
            last_line: line,
        }
    }

    /// The role `sample_name` would play in this family, or `None` when the
    /// name does not belong here.
    fn role_of(&self, sample_name: &str) -> Option<SampleRole> {
        let suffix = sample_name.strip_prefix(self.name.as_str())?;
        self.family_type.unwrap_or(MetricType::Unknown).role(suffix)
    }

    /// Validates required-suffix completeness and converts to the model.
    /// Runs once, at end of assembly, so interleaved emission may complete
    /// a family late.
    fn finish(self) -> Result<MetricFamily, ParseError> {
        let family_type = self.family_type.unwrap_or(MetricType::Unknown);

        let missing = match family_type {
            MetricType::Histogram | MetricType::GaugeHistogram => {
                let (sum_name, count_name) = if family_type == MetricType::GaugeHistogram {
                    ("_gsum", "_gcount")
                } else {
                    ("_sum", "_count")
                };

                self.groups.values().find_map(|state| {
                    if !state.has_bucket {
                        Some("a `_bucket` sample".to_string())
                    } else if !state.has_inf_bucket {
                        Some("a `+Inf` bucket".to_string())
                    } else if !state.has_sum {
                        Some(format!("a `{}` sample", sum_name))
                    } else if !state.has_count {
                        Some(format!("a `{}` sample", count_name))
                    } else {
                        None
                    }
                })
            }
            MetricType::Summary => self.groups.values().find_map(|state| {
                if !state.has_quantile {
                    Some("a `quantile` sample".to_string())
                } else if !state.has_sum {
                    Some("a `_sum` sample".to_string())
                } else if !state.has_count {
                    Some("a `_count` sample".to_string())
                } else {
                    None
                }
            }),
            MetricType::Counter => {
                if !self.samples.is_empty()
                    && !self
                        .samples
                        .iter()
                        .any(|sample| sample.kind == SampleKind::Total)
                {
                    Some("a `_total` sample".to_string())
                } else {
                    None
                }
            }
            MetricType::Gauge | MetricType::Info | MetricType::StateSet | MetricType::Unknown => {
                None
            }
        };

        if let Some(missing) = missing {
            return Err(ParseError::IncompleteFamily {
                line: self.last_line,
                family: self.name,
                missing,
            });
        }

        Ok(MetricFamily {
            name: self.name,
            family_type,
            help: self.help,
            unit: self.unit,
            samples: self.samples,
        })
    }
}

/// The parse state machine.  Feed logical lines in document order, then
/// call [`finish`](Self::finish).
///
/// ```
/// use om_exposition::parser::Parser;
///
/// let mut parser = Parser::new();
/// for line in ["# TYPE up gauge", "up 1", "# EOF"] {
///     parser.feed_line(line)?;
/// }
/// let (set, warnings) = parser.finish()?;
/// assert_eq!(set.len(), 1);
/// assert!(warnings.is_empty());
/// # Ok::<(), om_exposition::ParseError>(())
/// ```
#[derive(Debug)]
pub struct Parser {
    options: ParseOptions,
    families: Vec<FamilyBuilder>,
    current: Option<usize>,
    seen: HashSet<u64>,
    warnings: Vec<Warning>,
    lineno: usize,
    eof_seen: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self::with_options(ParseOptions::default())
    }

    pub fn with_options(options: ParseOptions) -> Self {
        Self {
            options,
            families: Vec::new(),
            current: None,
            seen: HashSet::new(),
            warnings: Vec::new(),
            lineno: 0,
            eof_seen: false,
        }
    }

    /// Consumes one logical line, without its terminator.
    pub fn feed_line(&mut self, line: &str) -> Result<(), ParseError> {
        self.lineno += 1;
        let line = lexer::classify_line(line, self.lineno)?;
        self.consume(line)
    }

    fn consume(&mut self, line: lexer::Line<'_>) -> Result<(), ParseError> {
        if self.eof_seen && !matches!(line, lexer::Line::Blank) {
            return Err(ParseError::TrailingDataAfterEof { line: self.lineno });
        }

        match line {
            lexer::Line::Blank | lexer::Line::Comment => Ok(()),
            lexer::Line::Eof => {
                trace!(line = self.lineno, "eof marker");
                self.eof_seen = true;
                Ok(())
            }
            lexer::Line::Metadata(meta) => self.metadata(meta),
            lexer::Line::Sample(sample) => self.sample(sample),
        }
    }

    /// Ends the document and returns the assembled families.
    pub fn finish(self) -> Result<(MetricSet, Vec<Warning>), ParseError> {
        if !self.eof_seen {
            return Err(ParseError::MissingEofMarker {
                line: self.lineno.max(1),
            });
        }

        debug!(families = self.families.len(), "assembly complete");

        let mut families = Vec::with_capacity(self.families.len());
        for builder in self.families {
            families.push(builder.finish()?);
        }

        Ok((MetricSet { families }, self.warnings))
    }

    /// Resolves the family a metadata line names, creating it on first
    /// reference.
    fn family_for_metadata(&mut self, name: &str) -> usize {
        let at = match self
            .families
            .iter()
            .position(|family| family.name == name)
        {
            Some(at) => at,
            None => {
                trace!(family = name, line = self.lineno, "new family");
                self.families.push(FamilyBuilder::new(name, self.lineno));
                self.families.len() - 1
            }
        };

        self.current = Some(at);
        at
    }

    /// Resolves the family owning a sample: the current family first, then
    /// any earlier family (interleaved emission merges), then a fresh
    /// untyped family under the sample's full name.  A name that collides
    /// with an existing family without fitting its type is a violation.
    fn family_for_sample(&mut self, name: &str) -> Result<(usize, SampleRole), ParseError> {
        if let Some(at) = self.current {
            if let Some(role) = self.families[at].role_of(name) {
                return Ok((at, role));
            }
        }

        for (at, family) in self.families.iter().enumerate() {
            if let Some(role) = family.role_of(name) {
                trace!(family = %family.name, line = self.lineno, "family re-opened");
                self.current = Some(at);
                return Ok((at, role));
            }
        }

        if let Some(family) = self.families.iter().find(|family| family.name == name) {
            let family_type = family.family_type.unwrap_or(MetricType::Unknown);
            return Err(ParseError::MalformedLine {
                line: self.lineno,
                reason: format!(
                    "sample `{}` does not fit family `{}`: {}",
                    name,
                    family.name,
                    family_type.suffix_requirement()
                ),
            });
        }

        trace!(family = name, line = self.lineno, "new family");
        let at = self.families.len();
        self.families.push(FamilyBuilder::new(name, self.lineno));
        self.current = Some(at);
        Ok((at, SampleRole::Plain))
    }

    fn metadata(&mut self, meta: lexer::Metadata<'_>) -> Result<(), ParseError> {
        let line = self.lineno;

        match meta {
            lexer::Metadata::Type { name, family_type } => {
                let at = self.family_for_metadata(name);
                let family = &mut self.families[at];

                if family.family_type.is_some() || !family.samples.is_empty() {
                    return Err(ParseError::DuplicateTypeDeclaration {
                        line,
                        family: family.name.clone(),
                    });
                }
                if family.unit.is_some() && !family_type.can_have_unit() {
                    return Err(ParseError::MalformedLine {
                        line,
                        reason: format!("`{}` families take no unit", family_type),
                    });
                }

                family.family_type = Some(family_type);
                family.last_line = line;
                Ok(())
            }
            lexer::Metadata::Help { name, text } => {
                let at = self.family_for_metadata(name);
                let family = &mut self.families[at];

                if family.help.is_some() || !family.samples.is_empty() {
                    return Err(ParseError::DuplicateMetadata {
                        line,
                        family: family.name.clone(),
                        what: "HELP",
                    });
                }

                family.help = Some(unescape_string(text).into_owned());
                family.last_line = line;
                Ok(())
            }
            lexer::Metadata::Unit { name, unit } => {
                let at = self.family_for_metadata(name);

                // An empty UNIT value reads the same as no UNIT line.
                let unit = match unit {
                    Some(unit) => unit,
                    None => return Ok(()),
                };

                let family = &mut self.families[at];

                if family.unit.is_some() || !family.samples.is_empty() {
                    return Err(ParseError::DuplicateMetadata {
                        line,
                        family: family.name.clone(),
                        what: "UNIT",
                    });
                }
                if let Some(family_type) = family.family_type {
                    if !family_type.can_have_unit() {
                        return Err(ParseError::MalformedLine {
                            line,
                            reason: format!("`{}` families take no unit", family_type),
                        });
                    }
                }
                if !family.name.ends_with(&format!("_{}", unit)) {
                    return Err(ParseError::UnitSuffixMismatch {
                        line,
                        family: family.name.clone(),
                        unit: unit.to_string(),
                    });
                }

                family.unit = Some(unit.to_string());
                family.last_line = line;
                Ok(())
            }
        }
    }

    fn sample(&mut self, raw: lexer::RawSample<'_>) -> Result<(), ParseError> {
        let line = self.lineno;
        let labels = assemble_labels(raw.labels, line)?;
        let (at, role) = self.family_for_sample(raw.name)?;

        let family = &mut self.families[at];
        let family_type = family.family_type.unwrap_or(MetricType::Unknown);

        let kind = build_kind(role, &labels, family.name.as_str(), line)?;
        check_value(kind, raw.value, line)?;
        trace!(sample = raw.name, ?kind, line);

        // A MetricPoint in a Metric's Counter's Total MAY have an exemplar.
        // Histogram and GaugeHistogram bucket values MAY have exemplars.
        // Nothing else may.
        let exemplar = match raw.exemplar {
            None => None,
            Some(raw_exemplar) => {
                let allowed = match (family_type, kind) {
                    (MetricType::Counter, SampleKind::Total) => true,
                    (MetricType::Histogram, SampleKind::Bucket(_)) => true,
                    (MetricType::GaugeHistogram, SampleKind::Bucket(_)) => true,
                    _ => false,
                };
                if !allowed {
                    return Err(ParseError::MalformedLine {
                        line,
                        reason:
                            "exemplars are only allowed on counter `_total` and histogram buckets"
                                .into(),
                    });
                }
                Some(assemble_exemplar(raw_exemplar, line)?)
            }
        };

        if !self.seen.insert(sample_key(raw.name, &labels)) {
            return Err(ParseError::DuplicateSample {
                line,
                name: raw.name.to_string(),
            });
        }

        // Distribution bookkeeping: completeness flags, and the bound
        // ordering rule for `le`/`quantile` within one series.
        let group = group_key(&labels, family_type.reserved_label());
        match kind {
            SampleKind::Bucket(bound) | SampleKind::Quantile(bound) => {
                let ordered_label = match kind {
                    SampleKind::Bucket(_) => "le",
                    _ => "quantile",
                };
                let state = family.groups.entry(group).or_default();

                match kind {
                    SampleKind::Bucket(_) => {
                        state.has_bucket = true;
                        if bound.is_infinite() {
                            state.has_inf_bucket = true;
                        }
                    }
                    _ => state.has_quantile = true,
                }

                if let Some(previous) = state.last_bound {
                    if bound < previous {
                        let violation = ParseError::NonMonotonicBuckets {
                            line,
                            family: family.name.clone(),
                            label: ordered_label,
                            previous,
                            value: bound,
                        };
                        if self.options.strict_ordering {
                            return Err(violation);
                        }
                        self.warnings.push(Warning {
                            line,
                            message: violation.to_string(),
                        });
                    }
                }
                state.last_bound = Some(bound);
            }
            SampleKind::Sum | SampleKind::GSum => {
                family.groups.entry(group).or_default().has_sum = true;
            }
            SampleKind::Count | SampleKind::GCount => {
                family.groups.entry(group).or_default().has_count = true;
            }
            SampleKind::Plain
            | SampleKind::Total
            | SampleKind::Created
            | SampleKind::Info
            | SampleKind::State => {}
        }

        family.samples.push(Sample {
            name: raw.name.to_string(),
            labels,
            value: raw.value,
            timestamp: raw.timestamp,
            exemplar,
            kind,
        });
        family.last_line = line;

        Ok(())
    }
}

/// Parses the reserved bound labels and enforces the shape rules a role
/// puts on its labels.
fn build_kind(
    role: SampleRole,
    labels: &BTreeMap<String, String>,
    family_name: &str,
    line: usize,
) -> Result<SampleKind, ParseError> {
    match role {
        SampleRole::Plain => Ok(SampleKind::Plain),
        SampleRole::Total => Ok(SampleKind::Total),
        SampleRole::Created => Ok(SampleKind::Created),
        SampleRole::Count => Ok(SampleKind::Count),
        SampleRole::Sum => Ok(SampleKind::Sum),
        SampleRole::GCount => Ok(SampleKind::GCount),
        SampleRole::GSum => Ok(SampleKind::GSum),
        SampleRole::Bucket => {
            let bound = labels.get("le").ok_or_else(|| ParseError::MalformedLine {
                line,
                reason: "`_bucket` sample without an `le` label".into(),
            })?;
            Ok(SampleKind::Bucket(bucket_bound(bound, line)?))
        }
        SampleRole::Quantile => {
            let bound = labels
                .get("quantile")
                .ok_or_else(|| ParseError::MalformedLine {
                    line,
                    reason: "summary sample without a `quantile` label".into(),
                })?;
            Ok(SampleKind::Quantile(quantile_bound(bound, line)?))
        }
        SampleRole::Info => Ok(SampleKind::Info),
        SampleRole::State => {
            if !labels.contains_key(family_name) {
                return Err(ParseError::MalformedLine {
                    line,
                    reason: format!("stateset samples need a label named `{}`", family_name),
                });
            }
            Ok(SampleKind::State)
        }
    }
}

/// Bucket bounds are finite floats or the literal `+Inf`, never NaN.
fn bucket_bound(value: &str, line: usize) -> Result<f64, ParseError> {
    if value == "+Inf" {
        return Ok(f64::INFINITY);
    }

    match value.parse::<f64>() {
        Ok(bound) if bound.is_finite() => Ok(bound),
        _ => Err(ParseError::MalformedLine {
            line,
            reason: format!("invalid `le` bound `{}`", value),
        }),
    }
}

/// Quantiles MUST be between 0 and 1 inclusive and MUST NOT be NaN.
fn quantile_bound(value: &str, line: usize) -> Result<f64, ParseError> {
    match value.parse::<f64>() {
        Ok(bound) if !bound.is_nan() && (0. ..=1.).contains(&bound) => Ok(bound),
        _ => Err(ParseError::MalformedLine {
            line,
            reason: format!("invalid `quantile` value `{}`", value),
        }),
    }
}

fn check_value(kind: SampleKind, value: f64, line: usize) -> Result<(), ParseError> {
    let violation = match kind {
        SampleKind::Total => {
            (value.is_nan() || value < 0.).then(|| "counter `_total` values must be non-negative")
        }
        SampleKind::Bucket(_) => (value.is_nan() || value.is_infinite() || value < 0.)
            .then(|| "bucket values must be finite and non-negative"),
        SampleKind::Count | SampleKind::GCount => {
            (value.is_nan() || value < 0.).then(|| "count values must be non-negative")
        }
        SampleKind::Sum | SampleKind::GSum => value.is_nan().then(|| "sum values must not be NaN"),
        SampleKind::Quantile(_) => (value < 0.).then(|| "quantile values must not be negative"),
        SampleKind::Info => (value != 1.).then(|| "info sample values must be 1"),
        SampleKind::State => {
            (value != 0. && value != 1.).then(|| "stateset sample values must be 0 or 1")
        }
        SampleKind::Plain | SampleKind::Created => None,
    };

    match violation {
        Some(reason) => Err(ParseError::MalformedLine {
            line,
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Unescapes, drops empty-valued labels, and rejects in-line duplicates.
fn assemble_labels(
    raw: Vec<lexer::RawLabel<'_>>,
    line: usize,
) -> Result<BTreeMap<String, String>, ParseError> {
    let mut labels = BTreeMap::new();

    for label in raw {
        // An empty label value reads the same as an absent label.
        if label.value.is_empty() {
            continue;
        }

        let value = unescape_string(label.value).into_owned();
        if labels.insert(label.name.to_string(), value).is_some() {
            return Err(ParseError::MalformedLine {
                line,
                reason: format!("duplicate label name `{}`", label.name),
            });
        }
    }

    Ok(labels)
}

/// The combined length of the label names and values of an Exemplar's
/// LabelSet MUST NOT exceed 128 UTF-8 characters.
fn assemble_exemplar(
    raw: lexer::RawExemplar<'_>,
    line: usize,
) -> Result<Exemplar, ParseError> {
    let labels = assemble_labels(raw.labels, line)?;

    let width: usize = labels
        .iter()
        .map(|(name, value)| name.chars().count() + value.chars().count())
        .sum();
    if width > 128 {
        debug!(width, line, "oversize exemplar label set");
        return Err(ParseError::MalformedLine {
            line,
            reason: "exemplar label set exceeds 128 characters".into(),
        });
    }

    Ok(Exemplar {
        labels,
        value: raw.value,
        timestamp: raw.timestamp,
    })
}

/// Identity key for duplicate-sample detection: the full sample name plus
/// the normalized label set.
fn sample_key(name: &str, labels: &BTreeMap<String, String>) -> u64 {
    let mut hasher = new_hasher();

    name.hash(&mut hasher);
    for (label, value) in labels {
        label.hash(&mut hasher);
        value.hash(&mut hasher);
    }

    hasher.finish()
}

/// Series key: the label set minus the type's reserved label.
fn group_key(labels: &BTreeMap<String, String>, reserved: &str) -> u64 {
    let mut hasher = new_hasher();

    for (label, value) in labels {
        if label == reserved {
            continue;
        }
        label.hash(&mut hasher);
        value.hash(&mut hasher);
    }

    hasher.finish()
}

#[cfg(feature = "hash_fnv")]
fn new_hasher() -> fnv::FnvHasher {
    fnv::FnvHasher::default()
}

#[cfg(not(feature = "hash_fnv"))]
fn new_hasher() -> DefaultHasher {
    DefaultHasher::new()
}

fn unescape_string(input: &str) -> Cow<'_, str> {
    UNESCAPE_RE.replace_all(input, |caps: &Captures| {
        match caps.get(0).map(|c| c.as_str()) {
            Some(r"\n") => "\n".to_string(),
            Some(r#"\""#) => r#"""#.to_string(),
            Some(r"\\") => r"\".to_string(),
            Some(c) => c.to_string(),
            None => String::new(),
        }
    })
}
