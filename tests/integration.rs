//! End-to-end scenarios exercising the builder surface against the compiled
//! evaluator: group-by/aggregate, joins, chunking, try/except, pivot-shaped
//! aggregation, and the filter-vs-where distinction on a reducer.

use convtools::c::*;
use convtools::error::RuntimeErrorKind;
use convtools::expr::JoinHow;
use convtools::value::Value;
use indexmap::indexmap;

fn row(pairs: Vec<(&str, Value)>) -> Value {
    Value::map(pairs.into_iter().map(|(k, v)| (Value::str(k), v)).collect())
}

#[test]
fn group_by_aggregates_first_and_max_per_key() {
    let rows = Value::list(vec![
        row(vec![("a", Value::Int(5)), ("b", Value::str("foo"))]),
        row(vec![("a", Value::Int(10)), ("b", Value::str("foo"))]),
        row(vec![("a", Value::Int(10)), ("b", Value::str("bar"))]),
        row(vec![("a", Value::Int(10)), ("b", Value::str("bar"))]),
        row(vec![("a", Value::Int(20)), ("b", Value::str("bar"))]),
    ]);

    let pipeline = this().group_by(vec![item(["b"])]).aggregate(dict(vec![
        entry(naive("b"), this()),
        entry(naive("a_first"), first(item(["a"]))),
        entry(naive("a_max"), max(item(["a"]))),
    ]));

    let result = pipeline.execute(rows).unwrap();
    let expected = Value::list(vec![
        row(vec![
            ("b", Value::str("foo")),
            ("a_first", Value::Int(5)),
            ("a_max", Value::Int(10)),
        ]),
        row(vec![
            ("b", Value::str("bar")),
            ("a_first", Value::Int(10)),
            ("a_max", Value::Int(20)),
        ]),
    ]);
    assert_eq!(result, expected);
}

#[test]
fn left_join_fills_unmatched_left_rows_with_null_right_and_drops_underage_matches() {
    let left_rows = Value::list(vec![
        row(vec![("id", Value::Int(1)), ("name", Value::str("Alice"))]),
        row(vec![("id", Value::Int(2)), ("name", Value::str("Bob"))]),
        row(vec![("id", Value::Int(3)), ("name", Value::str("Cara"))]),
    ]);
    let right_rows = Value::list(vec![
        row(vec![
            ("ID", Value::str("1")),
            ("age", Value::Int(30)),
            ("country", Value::str("US")),
        ]),
        row(vec![
            ("ID", Value::str("2")),
            ("age", Value::Int(16)),
            ("country", Value::str("CA")),
        ]),
        row(vec![
            ("ID", Value::str("3")),
            ("age", Value::Int(41)),
            ("country", Value::str("FR")),
        ]),
    ]);

    let predicate = and_(vec![
        left()
            .item(vec![naive("id")], None)
            .eq_(right().item(vec![naive("ID")], None).as_type_int()),
        right().item(vec![naive("age")], None).ge_(naive(18)),
    ]);

    let pipeline = join(this(), naive(right_rows), predicate, JoinHow::Left);
    let result = pipeline.execute(left_rows).unwrap();
    let pairs = result.as_list().unwrap();

    assert_eq!(pairs.len(), 3);
    for pair in pairs {
        let Value::Tuple(t) = pair else {
            panic!("expected a (left, right) tuple");
        };
        let Value::Map(left_row) = &t[0] else {
            panic!("expected a left row");
        };
        let name = left_row.get(&Value::str("name")).unwrap();
        match name {
            Value::Str(s) if s.as_ref() == "Bob" => {
                assert_eq!(t[1], Value::Null, "Bob's only age match is under 18");
            }
            Value::Str(s) if s.as_ref() == "Alice" || s.as_ref() == "Cara" => {
                assert_ne!(t[1], Value::Null);
            }
            other => panic!("unexpected left row: {other:?}"),
        }
    }
}

#[test]
fn chunk_by_groups_consecutive_equal_keys() {
    let rows = Value::list(vec![
        Value::tuple(vec![Value::Int(0), Value::Int(0)]),
        Value::tuple(vec![Value::Int(0), Value::Int(0)]),
        Value::tuple(vec![Value::Int(0), Value::Int(1)]),
        Value::tuple(vec![Value::Int(1), Value::Int(1)]),
        Value::tuple(vec![Value::Int(1), Value::Int(1)]),
    ]);

    let pipeline = this()
        .chunk_by(vec![item(vec![0i64])], Some(1000))
        .as_type_list();
    let result = pipeline.execute(rows).unwrap();

    let expected = Value::list(vec![
        Value::list(vec![
            Value::tuple(vec![Value::Int(0), Value::Int(0)]),
            Value::tuple(vec![Value::Int(0), Value::Int(0)]),
        ]),
        Value::list(vec![Value::tuple(vec![Value::Int(0), Value::Int(1)])]),
        Value::list(vec![
            Value::tuple(vec![Value::Int(1), Value::Int(1)]),
            Value::tuple(vec![Value::Int(1), Value::Int(1)]),
        ]),
    ]);
    assert_eq!(result, expected);
}

#[test]
fn try_except_recovers_division_by_zero_and_maps_type_errors_to_none() {
    let rows = Value::list(vec![
        Value::tuple(vec![Value::Int(1), Value::Int(2)]),
        Value::tuple(vec![Value::Int(3), Value::Int(0)]),
        Value::tuple(vec![Value::Int(4), Value::str("abc")]),
    ]);

    let body = item(vec![0i64]).div(item(vec![1i64]));
    let guarded = try_(body)
        .except_(
            RuntimeErrorKind::DivisionByZero,
            Some(this()),
            Some(item(vec![0i64]).eq_(naive(0))),
        )
        .except_(RuntimeErrorKind::TypeMismatch, None, None)
        .finish();

    let pipeline = list_comp(guarded, None);
    let result = pipeline.execute(rows).unwrap();

    let expected = Value::list(vec![
        Value::Float(0.5),
        Value::tuple(vec![Value::Int(3), Value::Int(0)]),
        Value::Null,
    ]);
    assert_eq!(result, expected);
}

#[test]
fn pivot_shaped_aggregation_buckets_revenue_by_year_and_currency() {
    let rows = Value::list(vec![
        row(vec![
            ("year", Value::Int(2023)),
            ("currency", Value::str("USD")),
            ("revenue", Value::Int(100)),
        ]),
        row(vec![
            ("year", Value::Int(2023)),
            ("currency", Value::str("EUR")),
            ("revenue", Value::Int(50)),
        ]),
        row(vec![
            ("year", Value::Int(2024)),
            ("currency", Value::str("USD")),
            ("revenue", Value::Int(75)),
        ]),
    ]);

    let pipeline = this().group_by(vec![item(["year"])]).aggregate(dict(vec![
        entry(naive("year"), this()),
        entry(
            naive("revenue_by_currency"),
            dict_sum(item(["currency"]), item(["revenue"])),
        ),
    ]));

    let result = pipeline.execute(rows).unwrap();
    let expected = Value::list(vec![
        row(vec![
            ("year", Value::Int(2023)),
            (
                "revenue_by_currency",
                Value::map(indexmap! {
                    Value::str("USD") => Value::Int(100),
                    Value::str("EUR") => Value::Int(50),
                }),
            ),
        ]),
        row(vec![
            ("year", Value::Int(2024)),
            (
                "revenue_by_currency",
                Value::map(indexmap! {
                    Value::str("USD") => Value::Int(75),
                }),
            ),
        ]),
    ]);
    assert_eq!(result, expected);
}

#[test]
fn reducer_where_guard_filters_rows_entering_it_not_the_aggregate_result() {
    let rows = Value::list(vec![
        row(vec![("a", Value::Int(5)), ("b", Value::str("foo"))]),
        row(vec![("a", Value::Int(10)), ("b", Value::str("foo"))]),
        row(vec![("a", Value::Int(10)), ("b", Value::str("bar"))]),
        row(vec![("a", Value::Int(10)), ("b", Value::str("bar"))]),
        row(vec![("a", Value::Int(20)), ("b", Value::str("bar"))]),
    ]);

    let pipeline = this().aggregate(dict(vec![
        entry(
            naive("a"),
            array(item(["a"])).where_(item(["b"]).eq_(naive("bar"))),
        ),
        entry(
            naive("b"),
            max_row(item(["a"])).item(vec![naive("b")], Some(naive(Value::Null))),
        ),
    ]));

    let result = pipeline.execute(rows).unwrap();
    let expected = row(vec![
        (
            "a",
            Value::list(vec![Value::Int(10), Value::Int(10), Value::Int(20)]),
        ),
        ("b", Value::str("bar")),
    ]);
    assert_eq!(result, expected);
}

#[test]
fn filter_applies_to_the_aggregate_result_not_to_rows_entering_it() {
    let rows = Value::list(vec![
        row(vec![("a", Value::Int(1)), ("b", Value::str("bar"))]),
        row(vec![("a", Value::Int(2)), ("b", Value::str("bar"))]),
        row(vec![("a", Value::Int(3)), ("b", Value::str("baz"))]),
    ]);

    // `.filter` on the already-aggregated array checks each *element of the
    // result*, distinct from `where=` on the reducer, which instead decides
    // which rows are folded into the array in the first place.
    let whole_array_filtered = this()
        .aggregate(array(item(["a"])))
        .filter(this().gt_(naive(1)));
    let result = whole_array_filtered.execute(rows.clone()).unwrap();
    assert_eq!(result, Value::list(vec![Value::Int(2), Value::Int(3)]));

    let where_filtered =
        this().aggregate(array(item(["a"])).where_(item(["b"]).eq_(naive("bar"))));
    let result = where_filtered.execute(rows).unwrap();
    assert_eq!(result, Value::list(vec![Value::Int(1), Value::Int(2)]));
}

#[test]
fn cumulative_running_sum_over_a_row_sequence() {
    let rows = Value::list(vec![
        Value::Int(0),
        Value::Int(1),
        Value::Int(2),
        Value::Int(3),
        Value::Int(4),
    ]);
    let pipeline = cumulative(this(), naive(0), this().add(prev()), Some("running"));
    let result = pipeline.execute(rows).unwrap();
    let expected = Value::list(vec![
        Value::Int(0),
        Value::Int(1),
        Value::Int(3),
        Value::Int(6),
        Value::Int(10),
    ]);
    assert_eq!(result, expected);
}
