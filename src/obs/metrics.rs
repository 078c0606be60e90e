// self
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_session_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Counts an attempt to end the session at `stage`.
///
/// `applied` is false when the store had already moved on to a newer session and the
/// invalidation was skipped.
pub fn record_invalidation(stage: &'static str, applied: bool) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_session_invalidations_total",
			"stage" => stage,
			"outcome" => if applied { "applied" } else { "skipped" }
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, applied);
	}
}
