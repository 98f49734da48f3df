//! Benchmarks pour le scan de FeatureCollection

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn build_collection(count: usize) -> Vec<u8> {
    let mut doc = br#"{"type":"FeatureCollection","features":["#.to_vec();
    for i in 0..count {
        if i > 0 {
            doc.push(b',');
        }
        doc.extend_from_slice(
            format!(
                r#"{{"type":"Feature","id":{i},"geometry":{{"type":"LineString","coordinates":[[2.35,48.85],[2.36,48.86],[2.37,48.87]]}},"properties":{{"name":"feature \"{i}\"","tags":["a","b"]}}}}"#
            )
            .as_bytes(),
        );
    }
    doc.extend_from_slice(b"]}");
    doc
}

fn bench_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_features");

    for count in [1_000usize, 10_000] {
        let doc = build_collection(count);
        group.throughput(Throughput::Bytes(doc.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &doc, |b, doc| {
            b.iter(|| {
                let features = geostream::split_features(black_box(doc)).unwrap();
                black_box(features.len())
            })
        });
    }

    group.finish();
}

fn bench_reader_decode(c: &mut Criterion) {
    let doc = build_collection(10_000);
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("reader_decode");
    group.throughput(Throughput::Bytes(doc.len() as u64));
    group.bench_function("10000", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut reader = geostream::FeatureReader::new(&doc[..]);
            let mut count = 0usize;
            while let Some(feature) = reader.next_feature().await.unwrap() {
                black_box(feature);
                count += 1;
            }
            count
        })
    });
    group.finish();
}

criterion_group!(benches, bench_split, bench_reader_decode);
criterion_main!(benches);
