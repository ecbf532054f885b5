#![allow(dead_code)]

use proptest::prelude::*;

/// Strategy for `(min, max)` pairs with `min <= max`, biased toward small domains
pub fn key_bounds_strategy() -> impl Strategy<Value = (i64, i64)> {
    prop_oneof![
        (-1_000i64..1_000, 0i64..5_000).prop_map(|(min, width)| (min, min + width)),
        (any::<i64>(), any::<i64>()).prop_map(|(a, b)| (a.min(b), a.max(b))),
        Just((i64::MIN, i64::MAX)),
        (0i64..100).prop_map(|offset| (i64::MAX - offset, i64::MAX)),
    ]
}

/// Strategy for grid sizes
pub fn grid_size_strategy() -> impl Strategy<Value = i32> {
    prop_oneof![1i32..16, 16i32..1_000]
}
