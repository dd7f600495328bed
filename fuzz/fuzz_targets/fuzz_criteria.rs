// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for criteria parsing, compilation and evaluation

#![no_main]

use std::sync::Arc;

use gridsource_engine::{EngineConfig, FilterCompiler, Shape, Value, ValueType};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(criteria) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let shape = Shape::builder("Row")
        .field("id", ValueType::Int64)
        .nullable("score", ValueType::Float64)
        .field("name", ValueType::String)
        .field("when", ValueType::DateTime)
        .field("extra", ValueType::Dynamic)
        .build();

    // Compilation may reject input but must never panic
    let config = EngineConfig::default().with_guard_nulls(true);
    if let Ok(predicate) = FilterCompiler::new(Arc::new(shape), config).compile_json(&criteria) {
        let record = Value::from(serde_json::json!({
            "id": 7, "score": null, "name": "Fuzz", "when": "2024-01-02T03:04:05", "extra": [1, "x"]
        }));
        let _ = predicate.evaluate(&record);
        let _ = predicate.to_string();
    }
});
