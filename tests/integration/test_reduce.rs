use assert_matches::assert_matches;

use pregel_engine::engine::{AggregatorKind, Error, Reducer, Type, Value};

#[test]
fn test_identity_is_neutral() -> eyre::Result<()> {
    let cases = [
        (AggregatorKind::INT64_SUM, Value::Int(7)),
        (AggregatorKind::INT64_PRODUCT, Value::Int(7)),
        (AggregatorKind::INT64_MIN, Value::Int(7)),
        (AggregatorKind::INT64_MAX, Value::Int(-7)),
        (AggregatorKind::DOUBLE_SUM, Value::from(2.5)),
        (AggregatorKind::DOUBLE_MIN, Value::from(2.5)),
        (AggregatorKind::DOUBLE_MAX, Value::from(-2.5)),
        (AggregatorKind::BOOL_AND, Value::Bool(false)),
        (AggregatorKind::BOOL_OR, Value::Bool(true)),
        (AggregatorKind::TEXT_OVERWRITE, Value::from("x")),
    ];
    for (kind, value) in cases {
        let state = kind.reducer.init(value);
        assert_eq!(
            kind.reducer.combine(kind.identity(), state.clone())?,
            state,
            "{kind}"
        );
        assert_eq!(
            kind.reducer.combine(state.clone(), kind.identity())?,
            state,
            "{kind}"
        );
    }
    Ok(())
}

#[test]
fn test_identity_elements() {
    assert_eq!(AggregatorKind::INT64_SUM.identity(), Value::Int(0));
    assert_eq!(AggregatorKind::INT64_PRODUCT.identity(), Value::Int(1));
    assert_eq!(AggregatorKind::DOUBLE_MIN.identity(), Value::from(f64::INFINITY));
    assert_eq!(
        AggregatorKind::DOUBLE_MAX.identity(),
        Value::from(f64::NEG_INFINITY)
    );
    assert_eq!(AggregatorKind::BOOL_AND.identity(), Value::Bool(true));
    assert_eq!(AggregatorKind::BOOL_OR.identity(), Value::Bool(false));
    assert_eq!(AggregatorKind::INT64_OVERWRITE.identity(), Value::None);
    assert_eq!(
        AggregatorKind::TEXT_APPEND.identity(),
        Value::Tuple(Vec::new().into())
    );
}

#[test]
fn test_min_max() -> eyre::Result<()> {
    assert_eq!(
        Reducer::Min.combine(Value::Int(3), Value::Int(-2))?,
        Value::Int(-2)
    );
    assert_eq!(
        Reducer::Max.combine(Value::from(1.5), Value::from(0.5))?,
        Value::from(1.5)
    );
    Ok(())
}

#[test]
fn test_integer_sum_wraps() -> eyre::Result<()> {
    assert_eq!(
        Reducer::Sum.combine(Value::Int(i64::MAX), Value::Int(1))?,
        Value::Int(i64::MIN)
    );
    Ok(())
}

#[test]
fn test_append_is_order_insensitive() -> eyre::Result<()> {
    let reducer = Reducer::Append;
    let a = reducer.init(Value::Int(3));
    let b = reducer.init(Value::Int(1));
    let c = reducer.init(Value::Int(2));

    let left = reducer.combine(reducer.combine(a.clone(), b.clone())?, c.clone())?;
    let right = reducer.combine(c, reducer.combine(b, a)?)?;
    assert_eq!(left, right);
    assert_eq!(
        left,
        Value::from(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
    Ok(())
}

#[test]
fn test_overwrite_keeps_last_written() -> eyre::Result<()> {
    let reducer = Reducer::Overwrite;
    let state = reducer.combine(Value::None, Value::Int(1))?;
    let state = reducer.combine(state, Value::Int(2))?;
    assert_eq!(state, Value::Int(2));
    assert_eq!(reducer.combine(state, Value::None)?, Value::Int(2));
    Ok(())
}

#[test]
fn test_combine_type_mismatch() {
    let result = Reducer::Sum.combine(Value::Int(1), Value::from(1.0));
    assert_matches!(
        result,
        Err(Error::ReducerTypeMismatch {
            reducer: Reducer::Sum,
            ..
        })
    );
}

#[test]
fn test_unsupported_kind() {
    let kind = AggregatorKind::new(Reducer::And, Type::Int);
    assert_matches!(
        kind.validate(),
        Err(Error::UnsupportedAggregator {
            reducer: Reducer::And,
            element: Type::Int
        })
    );
    assert_eq!(kind.to_string(), "and<int>");
}
