// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for reconstructing untrusted backend flat rows

#![no_main]

use std::sync::Arc;

use gridsource_engine::{AggregateKind, EngineConfig, FlatRow, RemoteGroupTransformer, Shape, SummaryInfo, ValueType};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(rows) = serde_json::from_slice::<Vec<FlatRow>>(data) else {
        return;
    };
    let shape = Shape::builder("Row")
        .field("amount", ValueType::Float64)
        .field("qty", ValueType::Int32)
        .build();
    let total = vec![SummaryInfo::new(AggregateKind::Avg, "amount"), SummaryInfo::count()];
    let group = vec![SummaryInfo::new(AggregateKind::Sum, "qty")];

    // Malformed rows surface as errors
    let _ = RemoteGroupTransformer::new(Arc::new(shape), EngineConfig::default()).reconstruct(rows, 2, &total, &group);
});
