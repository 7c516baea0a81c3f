//! Prints a one-line summary of every family in an exposition document.
//!
//! Reads the document from a file named on the command line, or falls back
//! to a small built-in exposition.  `--json` dumps the parsed model
//! instead, and `--permissive` downgrades bucket-ordering violations to
//! warnings on stderr.

use std::fs;

use anyhow::{anyhow, Context, Result};
use indoc::indoc;
use itertools::Itertools;
use om_exposition::{parse_with, MetricFamily, ParseOptions};

trait Summarize {
    fn summary(&self) -> String;
}

impl Summarize for MetricFamily {
    fn summary(&self) -> String {
        format!(
            "{:<28} {:<14} {:>4} samples  {}",
            self.name,
            self.family_type,
            self.samples.len(),
            self.help.as_deref().unwrap_or("(no help)")
        )
    }
}

fn main() -> Result<()> {
    let mut args = std::env::args();

    let progname = args.next().ok_or(anyhow!("ARGV[0] was not set??"))?;

    let mut path = None;
    let mut options = ParseOptions::default();
    let mut as_json = false;

    for arg in args {
        match arg.as_str() {
            "--help" => {
                println!("Usage: {} [--permissive] [--json] [FILE]", progname);
                return Ok(());
            }
            "--permissive" => options.strict_ordering = false,
            "--json" => as_json = true,
            arg if arg.starts_with('-') => return Err(anyhow!("Unknown argument: {}", arg)),
            arg => path = Some(arg.to_string()),
        }
    }

    let data = match &path {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading {}", path))?,
        None => indoc! {r#"
            # HELP requests Requests served, by verb.
            # TYPE requests counter
            requests_total{verb="get"} 1027 # {trace_id="4ffe"} 1
            requests_total{verb="put"} 33
            # TYPE queue_depth gauge
            queue_depth 7
            # EOF
        "#}
        .to_string(),
    };

    let (set, warnings) = parse_with(&data, &options)?;

    for warning in &warnings {
        eprintln!("warning: line {}: {}", warning.line, warning.message);
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&set)?);
        return Ok(());
    }

    println!("{}", set.iter().map(|family| family.summary()).join("\n"));

    Ok(())
}
