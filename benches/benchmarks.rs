use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hfserve::{BatchRequest, MLTask, PoolingStrategy, RequestHeaders};
use hfserve_engine::postprocess::{classify_sequences, pool_embeddings, softmax, Labels};
use hfserve_engine::test_utils::{encoder_model, fixture_tokenizer, ScriptedBackend};
use hfserve_engine::StopSequenceMatcher;
use hfserve_interfaces::{EncodeOptions, HostTensor};
use std::sync::Arc;

const SENTENCES: [&str; 4] = [
    "the capital of france is paris.",
    "hello my dog is cute",
    "a good movie",
    "new york city is based in the world",
];

fn benchmark_softmax(c: &mut Criterion) {
    let logits: Vec<f32> = (0..32_000).map(|i| (i % 97) as f32 * 0.01).collect();
    c.bench_function("softmax_32k", |b| b.iter(|| softmax(black_box(&logits))));
}

fn benchmark_classification(c: &mut Criterion) {
    let labels = Labels::new((0..8).map(|i| format!("class_{}", i)).collect());
    let logits = HostTensor::f32(
        "logits",
        vec![64, 8],
        (0..64 * 8).map(|i| (i % 13) as f32).collect(),
    )
    .unwrap();
    c.bench_function("classify_64x8", |b| {
        b.iter(|| classify_sequences(black_box(&logits), &labels).unwrap())
    });
}

fn benchmark_pooling(c: &mut Criterion) {
    let tokenizer = fixture_tokenizer();
    let batch = tokenizer
        .encode_batch(
            &SENTENCES,
            &EncodeOptions {
                add_special_tokens: true,
                max_length: Some(512),
            },
        )
        .unwrap();
    let hidden = 384;
    let states = HostTensor::f32(
        "last_hidden_state",
        vec![batch.batch_size(), batch.seq_len, hidden],
        (0..batch.batch_size() * batch.seq_len * hidden)
            .map(|i| (i % 31) as f32 * 0.1)
            .collect(),
    )
    .unwrap();

    let mut group = c.benchmark_group("pool_embeddings");
    group.bench_function("mean", |b| {
        b.iter(|| pool_embeddings(black_box(&states), &batch, PoolingStrategy::Mean).unwrap())
    });
    group.bench_function("cls", |b| {
        b.iter(|| pool_embeddings(black_box(&states), &batch, PoolingStrategy::Cls).unwrap())
    });
    group.finish();
}

fn benchmark_stop_matcher(c: &mut Criterion) {
    let fragments: Vec<String> = (0..256).map(|i| format!(" token{}", i % 17)).collect();
    c.bench_function("stop_matcher_256_fragments", |b| {
        b.iter(|| {
            let mut matcher =
                StopSequenceMatcher::new(vec!["\n\n".to_string(), "###".to_string()]);
            let mut emitted = 0;
            for fragment in &fragments {
                emitted += matcher.push(black_box(fragment)).emit.len();
            }
            emitted + matcher.finish().len()
        })
    });
}

fn benchmark_encoder_predict(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let backend = Arc::new(ScriptedBackend::constant_logits(vec![-1.0, 2.0]));
    let model = encoder_model(
        MLTask::SequenceClassification,
        vec!["negative", "positive"],
        backend,
    )
    .unwrap();
    let request = BatchRequest::new(SENTENCES);
    let headers = RequestHeaders::new();

    c.bench_function("encoder_predict_4", |b| {
        b.to_async(&rt)
            .iter(|| async { model.predict(black_box(&request), &headers).await.unwrap() })
    });
}

criterion_group!(
    benches,
    benchmark_softmax,
    benchmark_classification,
    benchmark_pooling,
    benchmark_stop_matcher,
    benchmark_encoder_predict
);
criterion_main!(benches);
