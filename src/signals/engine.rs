//! Classification entry point used by the scan pipeline.

use tracing::trace;

use crate::models::bar::{PriceSeries, SymbolKey};
use crate::models::scan::MatchRecord;
use crate::signals::vcp::{FilterTrace, Rejection, VcpClassifier, VcpFilter};

pub const MIN_BARS: usize = 200;

/// Emits one `trace` event per evaluated filter.
struct TracingTrace<'a> {
    key: &'a SymbolKey,
}

impl FilterTrace for TracingTrace<'_> {
    fn on_filter(&mut self, filter: VcpFilter, passed: bool) {
        trace!(
            symbol = %self.key,
            filter = %filter,
            step = filter.number(),
            passed,
            "vcp filter evaluated"
        );
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SignalEngine {
    classifier: VcpClassifier,
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new(MIN_BARS)
    }
}

impl SignalEngine {
    pub fn new(min_bars: usize) -> Self {
        Self {
            classifier: VcpClassifier::new(min_bars),
        }
    }

    pub fn min_bars(&self) -> usize {
        self.classifier.min_bars()
    }

    /// Classify a series, logging each filter decision at trace level.
    pub fn evaluate(&self, series: &PriceSeries) -> Result<MatchRecord, Rejection> {
        let mut trace = TracingTrace { key: series.key() };
        self.classifier.evaluate(series, &mut trace)
    }
}
