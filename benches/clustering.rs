//! Clustering benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use tree_retriever::cluster::reduction::normalized_matrix;
use tree_retriever::cluster::{ClusterItem, Clusterer, GaussianMixture, Pca, RaptorClustering, Selection};
use tree_retriever::config::ClusteringConfig;
use tree_retriever::embedding::HashingEmbeddingModel;

fn items(n: usize) -> Vec<ClusterItem> {
    let model = HashingEmbeddingModel::new(128);
    (0..n)
        .map(|i| ClusterItem {
            id: i,
            embedding: model.embed(&format!("passage {} about subject {} and theme {}", i, i % 7, i % 3)),
            token_count: 12,
        })
        .collect()
}

/// Benchmark a full layer clustering pass
fn bench_layer_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("layer_clustering");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let clusterer = RaptorClustering::new(ClusteringConfig::default());
    for size in [16, 64, 128] {
        let items = items(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &items, |b, items| {
            b.iter(|| black_box(clusterer.cluster(items, Selection::Threshold(0.1)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark the reduction and mixture fit separately
fn bench_reduce_and_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduce_and_fit");

    let items = items(64);
    let rows: Vec<&[f32]> = items.iter().map(|item| item.embedding.as_slice()).collect();
    let data = normalized_matrix(&rows).unwrap();

    group.bench_function("pca_10", |b| {
        b.iter(|| black_box(Pca::new(10).fit_transform(&data)));
    });

    let reduced = Pca::new(10).fit_transform(&data);
    group.bench_function("gmm_bic_sweep_8", |b| {
        b.iter(|| black_box(GaussianMixture::default().fit_by_bic(&reduced, 8).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_layer_clustering, bench_reduce_and_fit);
criterion_main!(benches);
