//! Criterion benchmarks for adsieve.
//!
//! Covers the per-message hot path of a deployment: normalization, TF-IDF
//! transform and the quantized forward pass.

use std::hint::black_box;

use adsieve::analysis::normalizer::normalize;
use adsieve::ml::{ClassifierTrainer, ModelExporter, QuantizedModel, Scorer, Trainer, TrainerConfig};
use adsieve::vectorize::TfIdfVectorizer;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};

/// Generate synthetic chat messages mixing CJK and latin words.
fn generate_messages(count: usize) -> Vec<String> {
    let words = [
        "加微信", "彩金", "充值", "优惠", "会议", "午饭", "天气", "周末", "项目", "文件", "vx",
        "free", "bonus", "lunch", "meeting", "tomorrow", "link", "click",
    ];

    (0..count)
        .map(|i| {
            let len = 4 + i % 8;
            (0..len)
                .map(|j| words[(i * 7 + j * 13) % words.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn bench_normalize(c: &mut Criterion) {
    let messages: Vec<String> = generate_messages(1000)
        .into_iter()
        .enumerate()
        .map(|(i, m)| if i % 3 == 0 { format!("薇信V.X {m}\u{200B}") } else { m })
        .collect();

    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(messages.len() as u64));
    group.bench_function("1000_messages", |b| {
        b.iter(|| {
            for message in &messages {
                black_box(normalize(black_box(message)));
            }
        })
    });
    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let corpus = generate_messages(2000);
    let fitted = TfIdfVectorizer::default().fit(&corpus).unwrap();
    let queries = generate_messages(200);

    let mut group = c.benchmark_group("tfidf");
    group.throughput(Throughput::Elements(queries.len() as u64));
    group.bench_function("transform", |b| {
        b.iter(|| {
            for query in &queries {
                black_box(fitted.transform(black_box(query)));
            }
        })
    });
    group.bench_function("transform_batch", |b| {
        b.iter(|| black_box(fitted.transform_batch(black_box(&queries))))
    });
    group.bench_function("fit_2000", |b| {
        b.iter(|| black_box(TfIdfVectorizer::default().fit(black_box(&corpus)).unwrap()))
    });
    group.finish();
}

fn bench_inference(c: &mut Criterion) {
    let corpus = generate_messages(400);
    let fitted = TfIdfVectorizer::default().fit(&corpus).unwrap();
    let features = fitted.transform_batch(&corpus);
    let labels: Vec<usize> = (0..corpus.len()).map(|i| i % 2).collect();

    let trainer = ClassifierTrainer::new(TrainerConfig {
        epochs: 1,
        ..TrainerConfig::default()
    })
    .unwrap();
    let model = trainer.fit(&features, &labels, 2).unwrap();
    let bytes = ModelExporter::default().export(&model).unwrap();
    let quantized = QuantizedModel::from_bytes(&bytes).unwrap();

    let mut group = c.benchmark_group("inference");
    group.bench_function("float_forward", |b| {
        b.iter(|| black_box(model.predict_proba(black_box(&features[0])).unwrap()))
    });
    group.bench_function("int8_forward", |b| {
        b.iter(|| black_box(quantized.predict_proba(black_box(&features[0])).unwrap()))
    });
    group.bench_function("decode_model", |b| {
        b.iter(|| black_box(QuantizedModel::from_bytes(black_box(&bytes)).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_normalize, bench_transform, bench_inference);
criterion_main!(benches);
