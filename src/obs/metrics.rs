// self
use crate::obs::{OperationKind, OperationOutcome};

/// Increments `checklist_gateway_operation_total{operation,outcome}` when `metrics` is enabled.
pub fn record_outcome(kind: OperationKind, outcome: OperationOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"checklist_gateway_operation_total",
			"operation" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Adds the requests parked on a settled renewal to `checklist_gateway_renewal_waiters_total`.
pub fn record_renewal_waiters(waiters: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!("checklist_gateway_renewal_waiters_total").increment(waiters as u64);
	}
	#[cfg(not(feature = "metrics"))]
	{
		let _ = waiters;
	}
}
