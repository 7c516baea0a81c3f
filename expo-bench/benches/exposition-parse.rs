use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use om_exposition::{parse, parse_with, ParseOptions};

fn wide_gauges(families: usize) -> String {
    let mut out = String::new();
    for at in 0..families {
        out.push_str(&format!("# TYPE gauge_{} gauge\n", at));
        out.push_str(&format!("gauge_{}{{shard=\"{}\"}} {}\n", at, at % 16, at));
    }
    out.push_str("# EOF\n");
    out
}

fn deep_histogram(buckets: usize) -> String {
    let mut out = String::from("# TYPE resolve_seconds histogram\n");
    for at in 0..buckets {
        out.push_str(&format!(
            "resolve_seconds_bucket{{le=\"{}\"}} {}\n",
            at as f64 + 0.5,
            at + 1
        ));
    }
    out.push_str(&format!("resolve_seconds_bucket{{le=\"+Inf\"}} {}\n", buckets + 1));
    out.push_str(&format!("resolve_seconds_count {}\n", buckets + 1));
    out.push_str("resolve_seconds_sum 1234.5\n# EOF\n");
    out
}

fn label_heavy(samples: usize) -> String {
    let mut out = String::from("# TYPE api_requests counter\n");
    for at in 0..samples {
        out.push_str(&format!(
            "api_requests_total{{verb=\"get\",path=\"/api/v{}\",status=\"200\",zone=\"us-east-{}\"}} {} # {{trace_id=\"{:08x}\"}} 1\n",
            at,
            at % 3,
            at,
            at
        ));
    }
    out.push_str("# EOF\n");
    out
}

fn parse_documents(cr: &mut Criterion) {
    let documents = [
        ("wide_gauges", wide_gauges(1000)),
        ("deep_histogram", deep_histogram(500)),
        ("label_heavy", label_heavy(500)),
    ];

    let mut group = cr.benchmark_group("should_pass");
    for (name, data) in documents.iter() {
        group.throughput(Throughput::Bytes(data.len() as u64));

        group.bench_function(BenchmarkId::new(*name, "strict"), |b| {
            b.iter(|| parse(data).expect("parse").len())
        });

        let permissive = ParseOptions {
            strict_ordering: false,
        };
        group.bench_function(BenchmarkId::new(*name, "permissive"), |b| {
            b.iter(|| parse_with(data, &permissive).expect("parse").0.len())
        });
    }
    group.finish();
}

fn error_paths(cr: &mut Criterion) {
    let truncated = wide_gauges(1000).replace("# EOF\n", "");
    let out_of_order = "# TYPE h histogram\n\
        h_bucket{le=\"+Inf\"} 5\n\
        h_bucket{le=\"1\"} 2\n\
        h_count 5\n\
        h_sum 3\n\
        # EOF\n";

    let mut group = cr.benchmark_group("should_fail");
    group.bench_function("missing_eof", |b| b.iter(|| parse(&truncated).is_err()));
    group.bench_function("bucket_order", |b| b.iter(|| parse(out_of_order).is_err()));
    group.finish();
}

criterion_group!(exposition_benches, parse_documents, error_paths);
criterion_main!(exposition_benches);
