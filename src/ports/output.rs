//! Output Port - Operator-Facing Comparison Sink

use crate::domain::comparison::Comparison;

/// Receives every comparison that passes the output gate.
pub trait ComparisonSink: Send + 'static {
  /// Render one comparison. Sinks never fail the aggregator.
  fn emit(&mut self, comparison: &Comparison);
}
