//! Two-phase aggregation state machine.
//!
//! An aggregation runs in two phases. In the partial phase each partition
//! folds the values it extracted into an accumulator. In the final phase the
//! partial accumulators of every partition are folded into one result with
//! the same combining rule. Every combining rule here is associative and
//! commutative, so the result does not depend on how entries were partitioned
//! or in which order partials arrive.

use crate::error::{ExtendError, Result};
use crate::protocol::{Frame, FrameCursor, Message};
use crate::serialization::{Data, Number};

/// The built-in aggregation formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregatorKind {
    /// Number of matched entries.
    Count,
    /// Minimum of integral values.
    LongMin,
    /// Maximum of integral values.
    LongMax,
    /// Wrapping sum of integral values.
    LongSum,
    /// Minimum of numeric values, widened to `f64`.
    DoubleMin,
    /// Maximum of numeric values, widened to `f64`.
    DoubleMax,
    /// Sum of numeric values, widened to `f64`.
    DoubleSum,
}

impl AggregatorKind {
    /// Returns the wire id of this formula.
    pub fn id(self) -> i32 {
        match self {
            AggregatorKind::Count => 1,
            AggregatorKind::LongMin => 2,
            AggregatorKind::LongMax => 3,
            AggregatorKind::LongSum => 4,
            AggregatorKind::DoubleMin => 5,
            AggregatorKind::DoubleMax => 6,
            AggregatorKind::DoubleSum => 7,
        }
    }

    /// Looks up a formula by its wire id.
    pub fn from_id(id: i32) -> Result<Self> {
        Ok(match id {
            1 => AggregatorKind::Count,
            2 => AggregatorKind::LongMin,
            3 => AggregatorKind::LongMax,
            4 => AggregatorKind::LongSum,
            5 => AggregatorKind::DoubleMin,
            6 => AggregatorKind::DoubleMax,
            7 => AggregatorKind::DoubleSum,
            other => {
                return Err(ExtendError::ProtocolViolation(format!(
                    "unknown aggregator id {}",
                    other
                )))
            }
        })
    }

    fn is_integral(self) -> bool {
        matches!(
            self,
            AggregatorKind::Count
                | AggregatorKind::LongMin
                | AggregatorKind::LongMax
                | AggregatorKind::LongSum
        )
    }
}

/// An aggregation request: a formula plus the attribute it reads.
///
/// Without an attribute the formula reads each entry's value itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregatorSpec {
    /// The combining formula.
    pub kind: AggregatorKind,
    /// Name of the attribute to extract from each value, if any.
    pub attribute: Option<String>,
}

impl AggregatorSpec {
    /// Creates a descriptor reading values directly.
    pub fn new(kind: AggregatorKind) -> Self {
        Self {
            kind,
            attribute: None,
        }
    }

    /// Creates a descriptor reading the named attribute.
    pub fn with_attribute(kind: AggregatorKind, attribute: impl Into<String>) -> Self {
        Self {
            kind,
            attribute: Some(attribute.into()),
        }
    }

    /// Appends this descriptor to a message as two frames.
    pub fn write_frames(&self, message: &mut Message) {
        message.add_frame(Frame::int(self.kind.id()));
        message.add_frame(Frame::nullable_string(self.attribute.as_deref()));
    }

    /// Reads a descriptor written by [`AggregatorSpec::write_frames`].
    pub fn read_frames(cursor: &mut FrameCursor<'_>) -> Result<Self> {
        let kind = AggregatorKind::from_id(cursor.next_frame()?.as_int()?)?;
        let attribute = cursor.next_frame()?.as_nullable_string()?;
        Ok(Self { kind, attribute })
    }
}

/// Running value of one aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accumulator {
    /// No value folded yet; the identity of every combining rule.
    Empty,
    /// An integral running value.
    Long(i64),
    /// A floating-point running value.
    Double(f64),
}

/// Per-partition state of one aggregation.
#[derive(Debug, Clone)]
pub struct AggregationState {
    kind: AggregatorKind,
    accumulator: Accumulator,
    is_final: bool,
}

impl AggregationState {
    /// Creates a state in the partial phase.
    pub fn new(kind: AggregatorKind) -> Self {
        Self {
            kind,
            accumulator: Accumulator::Empty,
            is_final: false,
        }
    }

    /// Resets the accumulator and enters the given phase.
    pub fn init(&mut self, is_final: bool) {
        self.accumulator = Accumulator::Empty;
        self.is_final = is_final;
    }

    /// Returns `true` in the final phase.
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Returns the running accumulator.
    pub fn accumulator(&self) -> Accumulator {
        self.accumulator
    }

    /// Folds one value into the accumulator.
    ///
    /// In the partial phase `value` is an extracted entry value; in the final
    /// phase it is another partition's [`AggregationState::partial_result`].
    pub fn process(&mut self, value: &Data, is_final: bool) -> Result<()> {
        if is_final != self.is_final {
            return Err(ExtendError::ProtocolViolation(format!(
                "{:?} aggregation in the {} phase received a {} value",
                self.kind,
                phase_name(self.is_final),
                phase_name(is_final)
            )));
        }

        let number = if self.kind == AggregatorKind::Count && !is_final {
            Number::Long(1)
        } else {
            self.coerce(value)?
        };
        self.accumulator = combine(self.kind, self.accumulator, number);
        Ok(())
    }

    /// Encodes the accumulator for shipping to the final phase.
    ///
    /// Returns `None` when nothing was folded; such a partition contributes
    /// nothing to the final result.
    pub fn partial_result(&self) -> Option<Data> {
        to_data(self.accumulator)
    }

    /// Returns the final result; `None` means no entry contributed.
    ///
    /// Counting always has a result, zero when nothing matched.
    pub fn result(&self) -> Option<Data> {
        match (self.kind, self.accumulator) {
            (AggregatorKind::Count, Accumulator::Empty) => Some(Number::Long(0).into()),
            (_, accumulator) => to_data(accumulator),
        }
    }

    fn coerce(&self, value: &Data) -> Result<Number> {
        let number = value.as_number()?.ok_or_else(|| {
            ExtendError::AggregationTypeMismatch(format!(
                "{:?} expects a numeric value, got type id {}",
                self.kind,
                value.type_id()
            ))
        })?;

        match (self.kind.is_integral(), number) {
            (true, Number::Double(v)) => Err(ExtendError::AggregationTypeMismatch(format!(
                "{:?} expects an integral value, got {}",
                self.kind, v
            ))),
            (false, Number::Long(v)) => Ok(Number::Double(v as f64)),
            (_, number) => Ok(number),
        }
    }
}

fn phase_name(is_final: bool) -> &'static str {
    if is_final {
        "final"
    } else {
        "partial"
    }
}

fn combine(kind: AggregatorKind, accumulator: Accumulator, number: Number) -> Accumulator {
    use AggregatorKind::*;

    match (accumulator, number) {
        (Accumulator::Empty, Number::Long(v)) => Accumulator::Long(v),
        (Accumulator::Empty, Number::Double(v)) => Accumulator::Double(v),
        (Accumulator::Long(a), Number::Long(b)) => Accumulator::Long(match kind {
            LongMin => a.min(b),
            LongMax => a.max(b),
            _ => a.wrapping_add(b),
        }),
        (Accumulator::Double(a), Number::Double(b)) => Accumulator::Double(match kind {
            DoubleMin => a.min(b),
            DoubleMax => a.max(b),
            _ => a + b,
        }),
        // Coercion keeps one numeric kind per formula, so these are unreachable
        // in practice; widen rather than lose the value.
        (Accumulator::Long(a), Number::Double(b)) => {
            combine(kind, Accumulator::Double(a as f64), Number::Double(b))
        }
        (Accumulator::Double(a), Number::Long(b)) => {
            combine(kind, Accumulator::Double(a), Number::Double(b as f64))
        }
    }
}

fn to_data(accumulator: Accumulator) -> Option<Data> {
    match accumulator {
        Accumulator::Empty => None,
        Accumulator::Long(v) => Some(Number::Long(v).into()),
        Accumulator::Double(v) => Some(Number::Double(v).into()),
    }
}
