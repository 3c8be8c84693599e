use std::collections::BTreeMap;

use companion_core::{EntityRecognizer, Language, TrainingExample};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn trained_model() -> Language {
    let examples = vec![
        TrainingExample::new("Paris is nice", vec![(0, 5, "LOC".to_string())]),
        TrainingExample::new(
            "Alice moved from Berlin to Rome",
            vec![
                (0, 5, "PER".to_string()),
                (17, 23, "LOC".to_string()),
                (27, 31, "LOC".to_string()),
            ],
        ),
        TrainingExample::new("Bob works at Acme Corp", vec![(0, 3, "PER".to_string()), (13, 22, "ORG".to_string())]),
    ];

    let mut nlp = Language::blank("en").unwrap();
    let mut ner = EntityRecognizer::new();
    for label in ["LOC", "PER", "ORG"] {
        ner.add_label(label);
    }
    nlp.add_pipe(ner).unwrap();

    nlp.begin_training(&examples, &mut StdRng::seed_from_u64(42))
        .unwrap();
    for _ in 0..20 {
        for example in &examples {
            let mut losses = BTreeMap::new();
            nlp.update(example, 0.2, &mut losses).unwrap();
        }
    }
    nlp
}

fn bench_predict(c: &mut Criterion) {
    let nlp = trained_model();

    let inputs = [
        "Paris is nice",
        "Alice flew from Rome to Paris with Bob",
        "Nothing to find in this rather long sentence about the weather today",
    ];

    c.bench_function("predict_single", |b| {
        b.iter(|| nlp.process(black_box(inputs[0])).entity_map());
    });

    c.bench_function("predict_batch_3", |b| {
        b.iter(|| {
            for input in &inputs {
                let _ = nlp.process(black_box(input)).entity_map();
            }
        });
    });
}

criterion_group!(benches, bench_predict);
criterion_main!(benches);
