#![no_main]
use libfuzzer_sys::fuzz_target;
use serde_json::{Value, json};

fuzz_target!(|data: &[u8]| {
    if data.len() > 8192 { return; }
    if let Ok(query) = serde_json::from_slice::<Value>(data) {
        // A few small documents to exercise the evaluator paths
        let docs = [
            json!({"a": 1, "b": 2, "name": "x"}),
            json!({"a": 10, "b": -5, "name": "y", "nested": {"z": 3}}),
            json!({"active": true, "tags": ["p", "q"]}),
        ];
        for (i, d) in docs.iter().enumerate() {
            if let Some(doc) = d.as_object() {
                let _ = nexus_search::query::eval_query(&i.to_string(), doc, &query);
            }
        }
    }
});
