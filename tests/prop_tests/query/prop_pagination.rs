use nexus_search::{ConnectorConfig, FieldType, ModelSchema, Record, in_memory};
use proptest::prelude::*;
use serde_json::{Value, json};

fn seqs(rows: &[Record]) -> Vec<i64> {
    rows.iter().map(|r| r.get("seq").and_then(Value::as_i64).unwrap()).collect()
}

/// Loads `n` records and runs each filter against them.
fn run(n: usize, filters: &[Value]) -> Vec<Vec<i64>> {
    let schema = ModelSchema::builder("Row")
        .id("seq", FieldType::Number)
        .field("bucket", FieldType::Number)
        .build()
        .unwrap();
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    rt.block_on(async {
        let c = in_memory(schema, ConnectorConfig::default()).unwrap();
        for i in 0..n {
            c.create(json!({"seq": i, "bucket": i % 3}).as_object().cloned().unwrap()).await.unwrap();
        }
        let mut out = Vec::new();
        for f in filters {
            out.push(seqs(&c.find(&c.filter(f).unwrap()).await.unwrap()));
        }
        out
    })
}

proptest! {
    #![proptest_config(proptest::test_runner::Config {
        failure_persistence: Some(Box::new(proptest::test_runner::FileFailurePersistence::WithSource("proptest-regressions"))),
        cases: 32,
        .. proptest::test_runner::Config::default()
    })]

    #[test]
    fn prop_limit_bounds_result_size(n in 0usize..30, limit in 0usize..40) {
        let out = run(n, &[json!({"limit": limit})]);
        prop_assert_eq!(out[0].len(), n.min(limit));
    }

    #[test]
    fn prop_skip_shifts_the_ordered_results(n in 0usize..30, skip in 0usize..35, desc in any::<bool>()) {
        let order = if desc { "seq DESC" } else { "seq ASC" };
        let out = run(n, &[
            json!({"where": {"bucket": {"lt": 2}}, "order": order}),
            json!({"where": {"bucket": {"lt": 2}}, "order": order, "skip": skip}),
        ]);
        let (all, skipped) = (&out[0], &out[1]);
        prop_assert_eq!(skipped.len(), all.len().saturating_sub(skip));
        for (i, s) in skipped.iter().enumerate() {
            prop_assert_eq!(*s, all[i + skip]);
        }
    }
}
