//! Draws the bucket distribution of a histogram as a bar of block glyphs.

use anyhow::{anyhow, Result};
use indoc::indoc;
use itertools::Itertools;
use om_exposition::{parse, MetricType, SampleKind};

const GLYPHS: &[&str] = &[
    "\u{2591}", "\u{2592}", "\u{2593}",
    "\u{25A3}", "\u{25A9}", "\u{25A4}"
];

fn main() -> Result<()> {
    let om_data = indoc! {r#"
        # TYPE resolve_seconds histogram
        # HELP resolve_seconds Time spent resolving queries.
        resolve_seconds_bucket{le="0.5"} 5
        resolve_seconds_bucket{le="1.0"} 7
        resolve_seconds_bucket{le="+Inf"} 15
        resolve_seconds_count 15
        resolve_seconds_sum 2
        # EOF
    "#};

    let mut args = std::env::args();

    let progname = args.next().ok_or(anyhow!("ARGV[0] was not set??"))?;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" => {
                println!("Usage: {} [--print-exposition]", progname);
                return Ok(());
            }
            "--print-exposition" => {
                println!("Exposition:\n\n{}", om_data);
            }
            arg => return Err(anyhow!("Unknown argument: {}", arg)),
        }
    }

    let set = parse(om_data)?;

    let histogram = set
        .iter()
        .find(|family| family.family_type == MetricType::Histogram)
        .ok_or(anyhow!("no histogram in the exposition?"))?;

    let buckets = histogram
        .samples
        .iter()
        .filter_map(|sample| match sample.kind {
            SampleKind::Bucket(bound) => Some((bound, sample.value)),
            _ => None,
        })
        .collect_vec();

    let total = buckets
        .last()
        .map(|(_, count)| count.round() as usize)
        .ok_or(anyhow!("no buckets?"))?;

    let factor = match total {
        total if total < 25 => 2,
        _ => 1,
    };

    print!("Distribution of «{}»: ", histogram.name);
    buckets.iter().zip(GLYPHS).fold(0, |acc, ((_, count), glyph)| {
        let so_far = count.round() as usize;
        print!("{}", glyph.repeat((so_far - acc) * factor));
        so_far
    });
    print!("\t");

    println!(
        "[ {}]",
        buckets
            .iter()
            .zip(GLYPHS.iter().cycle())
            .map(|((bound, _), glyph)| format!("{} ≤ {} ", glyph, bound))
            .join(" ")
    );

    Ok(())
}
