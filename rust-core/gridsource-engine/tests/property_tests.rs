// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for criteria compilation and remote grouping

use std::sync::Arc;

use gridsource_engine::{
    compare_values, AggregateKind, CompareOp, CompileError, EngineConfig, FilterCompiler, FlatRow, Group,
    RemoteGroupTransformer, Shape, SummaryInfo, Value, ValueType,
};
use proptest::prelude::*;
use serde_json::json;

fn person_shape() -> Arc<Shape> {
    Arc::new(
        Shape::builder("Person")
            .field("age", ValueType::Int32)
            .field("name", ValueType::String)
            .build(),
    )
}

/// One member per numeric type, paired with whether it holds fractions.
const NUMERIC_MEMBERS: [(&str, ValueType, bool); 4] = [
    ("i32", ValueType::Int32, false),
    ("i64", ValueType::Int64, false),
    ("f32", ValueType::Float32, true),
    ("f64", ValueType::Float64, true),
];

fn numeric_shape() -> Arc<Shape> {
    let builder = NUMERIC_MEMBERS
        .iter()
        .fold(Shape::builder("Reading"), |b, (name, ty, _)| b.field(*name, ty.clone()));
    Arc::new(builder.build())
}

fn numeric_json(n: i64, fractional: bool) -> serde_json::Value {
    if fractional {
        json!(n as f64 / 10.0)
    } else {
        json!(n)
    }
}

#[derive(Debug, Clone)]
enum Clause {
    Age(&'static str, i64),
    Name(&'static str, String),
}

impl Clause {
    fn to_json(&self) -> serde_json::Value {
        match self {
            Clause::Age(op, v) => json!(["age", op, v]),
            Clause::Name(op, v) => json!(["name", op, v]),
        }
    }

    fn holds(&self, age: i64, name: &str) -> bool {
        match self {
            Clause::Age(op, v) => match *op {
                "=" => age == *v,
                "<>" => age != *v,
                "<" => age < *v,
                "<=" => age <= *v,
                ">" => age > *v,
                _ => age >= *v,
            },
            Clause::Name(op, v) => match *op {
                "contains" => name.contains(v.as_str()),
                "notcontains" => !name.contains(v.as_str()),
                "startswith" => name.starts_with(v.as_str()),
                "endswith" => name.ends_with(v.as_str()),
                _ => name == v,
            },
        }
    }
}

/// Generate arbitrary single clauses over age and name
fn arb_clause() -> impl Strategy<Value = Clause> {
    prop_oneof![
        (prop::sample::select(vec!["=", "<>", "<", "<=", ">", ">="]), 0i64..100)
            .prop_map(|(op, v)| Clause::Age(op, v)),
        (
            prop::sample::select(vec!["contains", "notcontains", "startswith", "endswith", "="]),
            "[a-c]{0,2}"
        )
            .prop_map(|(op, v)| Clause::Name(op, v)),
    ]
}

/// Generate flat rows for a given number of grouping levels
fn arb_flat_rows(levels: usize) -> impl Strategy<Value = Vec<FlatRow>> {
    prop::collection::vec(
        (prop::collection::vec("[xyz]", levels), 0i64..50, 1i64..5),
        0..40,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .map(|(keys, amount, count)| {
                let mut values = vec![Value::Null];
                values.extend(keys.into_iter().map(Value::from));
                values.push(Value::Int(amount));
                values.push(Value::Int(count));
                FlatRow::new(values)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn test_single_connector_groups_match_manual_evaluation(
        clauses in prop::collection::vec(arb_clause(), 1..6),
        use_and in any::<bool>(),
        age in 0i64..100,
        name in "[a-c]{0,4}"
    ) {
        let connector = if use_and { "and" } else { "or" };
        let mut items = Vec::new();
        for (i, clause) in clauses.iter().enumerate() {
            if i > 0 {
                items.push(json!(connector));
            }
            items.push(clause.to_json());
        }

        let predicate = FilterCompiler::new(person_shape(), EngineConfig::default())
            .compile_json(&serde_json::Value::Array(items))
            .unwrap();
        let record = Value::from(json!({"age": age, "name": name}));

        let expected = if use_and {
            clauses.iter().all(|c| c.holds(age, &name))
        } else {
            clauses.iter().any(|c| c.holds(age, &name))
        };
        prop_assert_eq!(predicate.evaluate(&record).unwrap(), expected);
    }

    #[test]
    fn test_mixed_connectors_always_rejected(
        clauses in prop::collection::vec(arb_clause(), 3..7),
        flips in prop::collection::vec(any::<bool>(), 2..6)
    ) {
        let connectors: Vec<&str> = (0..clauses.len() - 1)
            .map(|i| if flips[i % flips.len()] { "and" } else { "or" })
            .collect();
        prop_assume!(connectors.contains(&"and") && connectors.contains(&"or"));

        let mut items = vec![clauses[0].to_json()];
        for (clause, connector) in clauses[1..].iter().zip(&connectors) {
            items.push(json!(connector));
            items.push(clause.to_json());
        }

        let result = FilterCompiler::new(person_shape(), EngineConfig::default())
            .compile_json(&serde_json::Value::Array(items));
        prop_assert_eq!(result.unwrap_err(), CompileError::MixedConnectors);
    }

    #[test]
    fn test_unconvertible_literal_is_always_false(
        literal in "[a-z]{1,8}",
        op in prop::sample::select(vec!["=", "<>", "<", ">="]),
        age in any::<i32>()
    ) {
        let predicate = FilterCompiler::new(person_shape(), EngineConfig::default())
            .compile_json(&json!(["age", op, literal]))
            .unwrap();
        prop_assert_eq!(predicate.as_constant(), Some(false));
        let row = Value::from(json!({"age": age}));
        prop_assert!(!predicate.evaluate(&row).unwrap());
    }

    #[test]
    fn test_numeric_members_compare_like_raw_values(
        member in 0..NUMERIC_MEMBERS.len(),
        op in prop::sample::select(vec!["=", "<>", "<", "<=", ">", ">="]),
        literal in -50i64..50,
        stored in -50i64..50,
        as_text in any::<bool>()
    ) {
        let (name, _, fractional) = &NUMERIC_MEMBERS[member];
        let literal = numeric_json(literal, *fractional);
        let stored = numeric_json(stored, *fractional);
        let criteria = if as_text {
            json!([name, op, literal.to_string()])
        } else {
            json!([name, op, literal.clone()])
        };

        let predicate = FilterCompiler::new(numeric_shape(), EngineConfig::default())
            .compile_json(&criteria)
            .unwrap();
        let record = Value::from(json!({ *name: stored.clone() }));

        let compare = CompareOp::from_token(op).unwrap();
        let expected = compare_values(&Value::from(&stored), &Value::from(&literal))
            .is_some_and(|ordering| compare.accepts(ordering));
        prop_assert_eq!(predicate.evaluate(&record).unwrap(), expected);
    }

    #[test]
    fn test_reconstructed_leaves_cover_every_flat_row(
        (levels, rows) in (1usize..4).prop_flat_map(|levels| (Just(levels), arb_flat_rows(levels)))
    ) {
        let shape = Arc::new(
            Shape::builder("Sale")
                .field("amount", ValueType::Int64)
                .build(),
        );
        let group = vec![SummaryInfo::new(AggregateKind::Sum, "amount")];
        let expected_total: i64 = rows.iter().map(|r| r.0.last().and_then(Value::as_i64).unwrap_or(0)).sum();
        let row_count = rows.len();

        let result = RemoteGroupTransformer::new(shape, EngineConfig::default())
            .reconstruct(rows, levels, &[], &group)
            .unwrap();

        let groups = result.groups.unwrap();
        prop_assert_eq!(groups.iter().map(Group::leaf_row_count).sum::<usize>(), row_count);
        prop_assert_eq!(result.total_count, expected_total);
        for g in &groups {
            prop_assert!(g.summary.as_ref().is_some_and(|s| !s[0].is_null()));
        }
    }
}
