//! Aggregation functions for distributed data processing.
//!
//! This module provides typed aggregators for computing aggregate values
//! over a named cache. The peer runs the aggregation in two phases (one
//! partial pass per partition, then a merge), so every formula here is
//! associative and commutative.
//!
//! # Example
//!
//! ```ignore
//! use extend_client::query::Aggregators;
//!
//! // Count all entries
//! let count = cache.aggregate(&Aggregators::count()).await?;
//!
//! // Smallest value of the "age" attribute, `None` if the cache is empty
//! let youngest = cache.aggregate(&Aggregators::long_min().with_attribute("age")).await?;
//! ```

use std::fmt::Debug;

use extend_core::serialization::Number;
use extend_core::{AggregatorKind, AggregatorSpec, Data, ExtendError, Result};

/// Trait for aggregators that compute aggregate values over cache entries.
pub trait Aggregator: Debug + Send + Sync {
    /// The output type of this aggregator.
    type Output;

    /// Returns the wire description of this aggregator.
    fn spec(&self) -> AggregatorSpec;

    /// Converts the merged result carried by the response.
    ///
    /// `None` means no entry contributed.
    fn extract(&self, result: Option<Data>) -> Result<Self::Output>;
}

fn spec_of(kind: AggregatorKind, attribute: &Option<String>) -> AggregatorSpec {
    match attribute {
        Some(attribute) => AggregatorSpec::with_attribute(kind, attribute.clone()),
        None => AggregatorSpec::new(kind),
    }
}

fn number_of(kind: AggregatorKind, data: &Data) -> Result<Number> {
    data.as_number()?.ok_or_else(|| {
        ExtendError::AggregationTypeMismatch(format!(
            "{:?} result has non-numeric type id {}",
            kind,
            data.type_id()
        ))
    })
}

// ============================================================================
// Aggregator Implementations
// ============================================================================

/// An aggregator that counts entries.
#[derive(Debug, Clone, Default)]
pub struct CountAggregator {
    attribute: Option<String>,
}

impl CountAggregator {
    /// Creates a new count aggregator that counts all entries.
    pub fn new() -> Self {
        Self { attribute: None }
    }

    /// Counts entries whose value has the named attribute.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

impl Aggregator for CountAggregator {
    type Output = i64;

    fn spec(&self) -> AggregatorSpec {
        spec_of(AggregatorKind::Count, &self.attribute)
    }

    fn extract(&self, result: Option<Data>) -> Result<i64> {
        match result {
            None => Ok(0),
            Some(data) => match number_of(AggregatorKind::Count, &data)? {
                Number::Long(count) => Ok(count),
                Number::Double(v) => Err(ExtendError::AggregationTypeMismatch(format!(
                    "count result must be integral, got {}",
                    v
                ))),
            },
        }
    }
}

/// An aggregator over integral values: minimum, maximum or sum.
///
/// Non-integral values make the aggregation fail with
/// [`ExtendError::AggregationTypeMismatch`].
#[derive(Debug, Clone)]
pub struct LongAggregator {
    kind: AggregatorKind,
    attribute: Option<String>,
}

impl LongAggregator {
    fn new(kind: AggregatorKind) -> Self {
        Self {
            kind,
            attribute: None,
        }
    }

    /// Reads the named attribute of each value instead of the value itself.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

impl Aggregator for LongAggregator {
    type Output = Option<i64>;

    fn spec(&self) -> AggregatorSpec {
        spec_of(self.kind, &self.attribute)
    }

    fn extract(&self, result: Option<Data>) -> Result<Option<i64>> {
        let Some(data) = result else {
            return Ok(None);
        };
        match number_of(self.kind, &data)? {
            Number::Long(v) => Ok(Some(v)),
            Number::Double(v) => Err(ExtendError::AggregationTypeMismatch(format!(
                "{:?} result must be integral, got {}",
                self.kind, v
            ))),
        }
    }
}

/// An aggregator over numeric values widened to `f64`: minimum, maximum or sum.
#[derive(Debug, Clone)]
pub struct DoubleAggregator {
    kind: AggregatorKind,
    attribute: Option<String>,
}

impl DoubleAggregator {
    fn new(kind: AggregatorKind) -> Self {
        Self {
            kind,
            attribute: None,
        }
    }

    /// Reads the named attribute of each value instead of the value itself.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

impl Aggregator for DoubleAggregator {
    type Output = Option<f64>;

    fn spec(&self) -> AggregatorSpec {
        spec_of(self.kind, &self.attribute)
    }

    fn extract(&self, result: Option<Data>) -> Result<Option<f64>> {
        Ok(match result {
            None => None,
            Some(data) => Some(match number_of(self.kind, &data)? {
                Number::Long(v) => v as f64,
                Number::Double(v) => v,
            }),
        })
    }
}

// ============================================================================
// Aggregators Factory
// ============================================================================

/// Factory for creating aggregators.
///
/// Provides convenient static methods for creating all aggregator types.
pub struct Aggregators;

impl Aggregators {
    /// Returns an aggregator that counts all entries.
    pub fn count() -> CountAggregator {
        CountAggregator::new()
    }

    /// Returns an aggregator that finds the minimum integral value.
    pub fn long_min() -> LongAggregator {
        LongAggregator::new(AggregatorKind::LongMin)
    }

    /// Returns an aggregator that finds the maximum integral value.
    pub fn long_max() -> LongAggregator {
        LongAggregator::new(AggregatorKind::LongMax)
    }

    /// Returns an aggregator that sums integral values, wrapping on overflow.
    pub fn long_sum() -> LongAggregator {
        LongAggregator::new(AggregatorKind::LongSum)
    }

    /// Returns an aggregator that finds the minimum numeric value.
    pub fn double_min() -> DoubleAggregator {
        DoubleAggregator::new(AggregatorKind::DoubleMin)
    }

    /// Returns an aggregator that finds the maximum numeric value.
    pub fn double_max() -> DoubleAggregator {
        DoubleAggregator::new(AggregatorKind::DoubleMax)
    }

    /// Returns an aggregator that sums numeric values.
    pub fn double_sum() -> DoubleAggregator {
        DoubleAggregator::new(AggregatorKind::DoubleSum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_aggregator() {
        let agg = Aggregators::count();
        assert_eq!(agg.spec(), AggregatorSpec::new(AggregatorKind::Count));
        assert_eq!(agg.extract(Some(Data::of(&5i64).unwrap())).unwrap(), 5);
        assert_eq!(agg.extract(None).unwrap(), 0);
    }

    #[test]
    fn test_count_aggregator_with_attribute() {
        let agg = Aggregators::count().with_attribute("name");
        assert_eq!(
            agg.spec(),
            AggregatorSpec::with_attribute(AggregatorKind::Count, "name")
        );
    }

    #[test]
    fn test_long_aggregators_specs() {
        assert_eq!(Aggregators::long_min().spec().kind, AggregatorKind::LongMin);
        assert_eq!(Aggregators::long_max().spec().kind, AggregatorKind::LongMax);
        assert_eq!(Aggregators::long_sum().spec().kind, AggregatorKind::LongSum);
        assert_eq!(
            Aggregators::long_min().with_attribute("age").spec().attribute.as_deref(),
            Some("age")
        );
    }

    #[test]
    fn test_long_aggregator_no_result() {
        assert_eq!(Aggregators::long_min().extract(None).unwrap(), None);
    }

    #[test]
    fn test_long_aggregator_rejects_double() {
        let err = Aggregators::long_max()
            .extract(Some(Data::of(&1.5f64).unwrap()))
            .unwrap_err();
        assert!(matches!(err, ExtendError::AggregationTypeMismatch(_)));
    }

    #[test]
    fn test_long_aggregator_rejects_string() {
        let err = Aggregators::long_sum()
            .extract(Some(Data::of("seven").unwrap()))
            .unwrap_err();
        assert!(matches!(err, ExtendError::AggregationTypeMismatch(_)));
    }

    #[test]
    fn test_double_aggregator_widens_long() {
        let agg = Aggregators::double_sum();
        assert_eq!(agg.spec().kind, AggregatorKind::DoubleSum);
        assert_eq!(agg.extract(Some(Data::of(&3i64).unwrap())).unwrap(), Some(3.0));
        assert_eq!(
            agg.extract(Some(Data::of(&2.5f64).unwrap())).unwrap(),
            Some(2.5)
        );
        assert_eq!(agg.extract(None).unwrap(), None);
    }

    #[test]
    fn test_double_min_max_specs() {
        assert_eq!(Aggregators::double_min().spec().kind, AggregatorKind::DoubleMin);
        assert_eq!(Aggregators::double_max().spec().kind, AggregatorKind::DoubleMax);
    }

    #[test]
    fn test_aggregators_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CountAggregator>();
        assert_send_sync::<LongAggregator>();
        assert_send_sync::<DoubleAggregator>();
    }
}
