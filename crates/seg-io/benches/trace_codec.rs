#![allow(clippy::unwrap_used, missing_docs)]

//! Trace codec and reconstruction throughput
//!
//! ```bash
//! cargo bench -p seg-io --bench trace_codec
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use seg_io::{Reconstruction, Trace};
use seg_model::AnalysisModel;
use seg_test_utils::MockFactory;
use std::fmt::Write;

/// A reader feeding a chain of `stages` thresholds, each with one
/// segmentation
fn pipeline(stages: u32) -> String {
    let mut out = String::from("digraph G {\n");
    out.push_str("0 [label=\"stack\", shape=\"trapezium\", args=\"Spacing=[1,1,1];\"];\n");
    out.push_str("1 [label=\"Reader\", shape=\"invtriangle\", args=\"Path=stack.tif;\"];\n");
    out.push_str("2 [label=\"stack.tif\", shape=\"box\", args=\"Volume=1_0;\"];\n");
    let mut edges = String::from("0 -> 2 [label=\"Stain\"];\n1 -> 2 [label=\"Volume\"];\n");

    let mut upstream = 1;
    for stage in 0..stages {
        let filter = 3 + stage * 2;
        let segmentation = filter + 1;
        writeln!(
            out,
            "{filter} [label=\"Threshold\", shape=\"invtriangle\", args=\"Level={stage};Inputs={upstream}_0;\"];"
        )
        .unwrap();
        writeln!(
            out,
            "{segmentation} [label=\"\", shape=\"ellipse\", args=\"Output=0;Number={};\"];",
            stage + 1
        )
        .unwrap();
        writeln!(edges, "{upstream} -> {filter} [label=\"0-0\"];").unwrap();
        writeln!(edges, "{filter} -> {segmentation} [label=\"CreateLink\"];").unwrap();
        writeln!(edges, "0 -> {segmentation} [label=\"where\"];").unwrap();
        upstream = filter;
    }
    out.push_str(&edges);
    out.push_str("}\n");
    out
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_codec");
    for stages in [10, 100, 500] {
        let raw = pipeline(stages);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse", stages), &raw, |b, raw| {
            b.iter(|| Trace::parse(black_box(raw)).unwrap());
        });

        let trace = Trace::parse(&raw).unwrap();
        group.bench_with_input(BenchmarkId::new("render", stages), &trace, |b, trace| {
            b.iter(|| black_box(trace.render()));
        });
    }
    group.finish();
}

fn bench_reconstruction(c: &mut Criterion) {
    let factory = MockFactory::new();
    let mut group = c.benchmark_group("reconstruction");
    for stages in [10, 100] {
        let trace = Trace::parse(&pipeline(stages)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(stages), &trace, |b, trace| {
            b.iter(|| {
                factory.clear();
                let mut model = AnalysisModel::new();
                Reconstruction::new(&factory).run(&mut model, trace.clone()).unwrap();
                model
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_codec, bench_reconstruction);
criterion_main!(benches);
