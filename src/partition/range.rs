use crate::error::{DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open key range `[lower_bound, upper_bound)` assigned to one worker.
///
/// A range whose domain reaches `i64::MAX` cannot express `max + 1`, so it is
/// stored with `upper_bound == i64::MAX` and `upper_inclusive == true`. Fields are
/// private: a range is immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RangeFields")]
pub struct PartitionKeyRange {
    lower_bound: i64,
    upper_bound: i64,
    upper_inclusive: bool,
    label: String,
}

/// Wire form of a range, checked before it becomes a [`PartitionKeyRange`]
#[derive(Deserialize)]
struct RangeFields {
    lower_bound: i64,
    upper_bound: i64,
    #[serde(default)]
    upper_inclusive: bool,
    label: String,
}

impl TryFrom<RangeFields> for PartitionKeyRange {
    type Error = DispatchError;

    fn try_from(fields: RangeFields) -> DispatchResult<Self> {
        if !fields.upper_inclusive {
            return Self::new(fields.lower_bound, fields.upper_bound, fields.label);
        }
        if fields.upper_bound != i64::MAX {
            return Err(DispatchError::invalid_argument(format!(
                "inclusive range must end at {}, got {}",
                i64::MAX,
                fields.upper_bound
            )));
        }
        Ok(Self::through_max(fields.lower_bound, fields.label))
    }
}

impl PartitionKeyRange {
    /// Create a non-empty half-open range
    pub fn new(lower_bound: i64, upper_bound: i64, label: impl Into<String>) -> DispatchResult<Self> {
        if lower_bound >= upper_bound {
            return Err(DispatchError::invalid_argument(format!(
                "range lower bound {lower_bound} must be below upper bound {upper_bound}"
            )));
        }
        Ok(Self {
            lower_bound,
            upper_bound,
            upper_inclusive: false,
            label: label.into(),
        })
    }

    /// Create a range that includes every key from `lower_bound` through `i64::MAX`
    pub fn through_max(lower_bound: i64, label: impl Into<String>) -> Self {
        Self {
            lower_bound,
            upper_bound: i64::MAX,
            upper_inclusive: true,
            label: label.into(),
        }
    }

    /// Build from widened bounds produced by the partitioner.
    ///
    /// Callers guarantee `lower < upper` and that `lower` fits in an `i64`.
    pub(crate) fn from_wide(lower: i128, upper: i128, label: String) -> Self {
        let lower_bound = lower as i64;
        if upper > i64::MAX as i128 {
            Self::through_max(lower_bound, label)
        } else {
            Self {
                lower_bound,
                upper_bound: upper as i64,
                upper_inclusive: false,
                label,
            }
        }
    }

    pub fn lower_bound(&self) -> i64 {
        self.lower_bound
    }

    /// Exclusive upper bound, unless [`Self::is_upper_inclusive`]
    pub fn upper_bound(&self) -> i64 {
        self.upper_bound
    }

    pub fn is_upper_inclusive(&self) -> bool {
        self.upper_inclusive
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Largest key contained in the range
    pub fn last_key(&self) -> i64 {
        if self.upper_inclusive {
            self.upper_bound
        } else {
            self.upper_bound - 1
        }
    }

    /// Number of keys in the key domain covered by this range
    pub fn key_count(&self) -> u128 {
        (self.last_key() as i128 - self.lower_bound as i128 + 1) as u128
    }

    pub fn contains(&self, key: i64) -> bool {
        key >= self.lower_bound && key <= self.last_key()
    }

    pub fn overlaps(&self, other: &PartitionKeyRange) -> bool {
        self.lower_bound <= other.last_key() && other.lower_bound <= self.last_key()
    }

    /// Same key bounds, ignoring the label
    pub fn same_bounds(&self, other: &PartitionKeyRange) -> bool {
        self.lower_bound == other.lower_bound
            && self.upper_bound == other.upper_bound
            && self.upper_inclusive == other.upper_inclusive
    }
}

impl fmt::Display for PartitionKeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.upper_inclusive { ']' } else { ')' };
        write!(
            f,
            "{}[{}, {}{}",
            self.label, self.lower_bound, self.upper_bound, close
        )
    }
}

/// Verify that no two ranges share a key
pub fn ensure_disjoint(ranges: &[PartitionKeyRange]) -> DispatchResult<()> {
    let mut sorted: Vec<&PartitionKeyRange> = ranges.iter().collect();
    sorted.sort_by_key(|range| range.lower_bound);
    for pair in sorted.windows(2) {
        if pair[0].overlaps(pair[1]) {
            return Err(DispatchError::invalid_argument(format!(
                "ranges {} and {} overlap",
                pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_rejects_empty_range() {
        let malformed = json!({
            "lower_bound": 0,
            "upper_bound": i64::MIN,
            "label": "p0"
        });
        assert!(serde_json::from_value::<PartitionKeyRange>(malformed).is_err());

        let misplaced_inclusive = json!({
            "lower_bound": 0,
            "upper_bound": 10,
            "upper_inclusive": true,
            "label": "p0"
        });
        assert!(serde_json::from_value::<PartitionKeyRange>(misplaced_inclusive).is_err());
    }

    #[test]
    fn test_deserialize_accepts_checked_ranges() {
        let range: PartitionKeyRange = serde_json::from_value(json!({
            "lower_bound": 10,
            "upper_bound": 20,
            "label": "p1"
        }))
        .unwrap();
        assert_eq!(range, PartitionKeyRange::new(10, 20, "p1").unwrap());

        let tail = PartitionKeyRange::through_max(i64::MAX - 5, "p9");
        let decoded: PartitionKeyRange =
            serde_json::from_value(serde_json::to_value(&tail).unwrap()).unwrap();
        assert_eq!(decoded.key_count(), 6);
    }

    #[test]
    fn test_empty_range_rejected() {
        assert!(PartitionKeyRange::new(5, 5, "p").is_err());
        assert!(PartitionKeyRange::new(6, 5, "p").is_err());
    }

    #[test]
    fn test_half_open_containment() {
        let range = PartitionKeyRange::new(250, 500, "partition1").unwrap();
        assert!(range.contains(250));
        assert!(range.contains(499));
        assert!(!range.contains(500));
        assert_eq!(range.key_count(), 250);
        assert_eq!(range.to_string(), "partition1[250, 500)");
    }

    #[test]
    fn test_through_max_includes_max_key() {
        let range = PartitionKeyRange::through_max(i64::MAX - 1, "tail");
        assert!(range.contains(i64::MAX));
        assert_eq!(range.key_count(), 2);
        assert_eq!(range.to_string(), format!("tail[{}, {}]", i64::MAX - 1, i64::MAX));
    }

    #[test]
    fn test_overlap_detection() {
        let a = PartitionKeyRange::new(0, 10, "a").unwrap();
        let b = PartitionKeyRange::new(10, 20, "b").unwrap();
        let c = PartitionKeyRange::new(5, 15, "c").unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(ensure_disjoint(&[b.clone(), a.clone()]).is_ok());
        assert!(ensure_disjoint(&[a, b, c]).is_err());
    }
}
