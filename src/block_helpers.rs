use serde_json::{Number, Value};

#[macro_export]
macro_rules! assert_epsilon {
    ($x:expr, $y:expr) => {
        let x = $x; // Make sure we evaluate only once
        let y = $y;
        if !(x - y < 0.000005 && y - x < 0.000005) {
            println!("Expectation: {}, Got: {}", y, x);
            panic!();
        }
    };
}

/// NaN and infinities have no JSON representation, they become null
pub fn f32_to_json(v: f32) -> Value {
    match Number::from_f64(v as f64) {
        Some(n) => Value::Number(n),
        None => Value::Null,
    }
}

/// min, max and mean of a stream of values, as JSON
pub fn stats_to_json<I: Iterator<Item = f32>>(values: I) -> Value {
    let mut count: usize = 0;
    let mut sum: f64 = 0.0;
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for v in values {
        count += 1;
        sum += v as f64;
        min = min.min(v);
        max = max.max(v);
    }
    if count == 0 {
        return Value::Null;
    }
    serde_json::json!({
        "count": count,
        "min": f32_to_json(min),
        "max": f32_to_json(max),
        "mean": f32_to_json((sum / count as f64) as f32),
    })
}
