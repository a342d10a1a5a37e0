//! Single-flight renewal bookkeeping: the phase flag and the queue of parked requests.
//!
//! The first request to hit an authorization failure while the coordinator is idle becomes
//! the leader and receives a [`RenewalLease`]. Every later request gets a [`RenewalWaiter`]
//! until the leader settles, at which point one outcome is broadcast to all of them and the
//! coordinator returns to idle in the same critical section.

// std
use std::mem;
// crates.io
use futures::channel::oneshot;
// self
use crate::{_prelude::*, auth::TokenSecret, error::RenewalError};

/// Outcome broadcast to every request parked on a renewal.
pub type RenewalOutcome = Result<TokenSecret, RenewalError>;

/// Phase of the renewal state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RenewalPhase {
	/// No renewal is outstanding.
	#[default]
	Idle,
	/// The leader is waiting on the renewal endpoint.
	Renewing,
	/// The leader has an outcome and is applying its side effects before waking waiters.
	Settling,
}

/// Point-in-time view of the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenewalSnapshot {
	/// Current phase.
	pub phase: RenewalPhase,
	/// Requests currently parked on the outstanding renewal.
	pub waiters: usize,
	/// Renewal cycles settled so far.
	pub cycles: u64,
	/// Instant the most recent cycle settled.
	pub last_settled_at: Option<OffsetDateTime>,
}
impl RenewalSnapshot {
	/// Returns `true` while a renewal is outstanding (`Renewing` or `Settling`).
	pub fn renewing(&self) -> bool {
		self.phase != RenewalPhase::Idle
	}
}

/// Ticket handed out by [`RenewalCoordinator::enter`].
#[derive(Debug)]
pub enum RenewalTicket<'a> {
	/// Caller must perform the renewal and settle the lease.
	Lead(RenewalLease<'a>),
	/// Caller must wait for the outstanding renewal.
	Wait(RenewalWaiter),
}

#[derive(Debug, Default)]
struct RenewalState {
	phase: RenewalPhase,
	waiters: Vec<oneshot::Sender<RenewalOutcome>>,
	cycles: u64,
	last_settled_at: Option<OffsetDateTime>,
}

/// Owns the `renewing` flag and the waiter queue for one session.
///
/// The lock is never held across an `.await`; each transition is a single critical section.
#[derive(Debug, Default)]
pub struct RenewalCoordinator {
	state: Mutex<RenewalState>,
}
impl RenewalCoordinator {
	/// Joins the outstanding renewal, or starts one if the coordinator is idle.
	pub fn enter(&self) -> RenewalTicket<'_> {
		let mut state = self.state.lock();

		if state.phase == RenewalPhase::Idle {
			state.phase = RenewalPhase::Renewing;

			return RenewalTicket::Lead(RenewalLease { coordinator: self, settled: false });
		}

		let (sender, receiver) = oneshot::channel();

		state.waiters.push(sender);

		RenewalTicket::Wait(RenewalWaiter(receiver))
	}

	/// Captures the current state.
	pub fn snapshot(&self) -> RenewalSnapshot {
		let state = self.state.lock();

		RenewalSnapshot {
			phase: state.phase,
			waiters: state.waiters.len(),
			cycles: state.cycles,
			last_settled_at: state.last_settled_at,
		}
	}

	fn mark_settling(&self) {
		self.state.lock().phase = RenewalPhase::Settling;
	}

	fn settle(&self, outcome: &RenewalOutcome) -> usize {
		let waiters = {
			let mut state = self.state.lock();

			state.phase = RenewalPhase::Idle;
			state.cycles += 1;
			state.last_settled_at = Some(OffsetDateTime::now_utc());

			mem::take(&mut state.waiters)
		};
		let count = waiters.len();

		for waiter in waiters {
			// A dropped receiver means the caller walked away; nothing to deliver.
			let _ = waiter.send(outcome.clone());
		}

		count
	}
}

/// Exclusive right to perform the outstanding renewal.
///
/// Dropping an unsettled lease settles the queue with [`RenewalError::Abandoned`], so a
/// cancelled leader can never leave the coordinator stuck in `Renewing`.
#[derive(Debug)]
pub struct RenewalLease<'a> {
	coordinator: &'a RenewalCoordinator,
	settled: bool,
}
impl RenewalLease<'_> {
	/// Moves the coordinator into `Settling`; new failures keep queueing.
	pub fn settling(&mut self) {
		self.coordinator.mark_settling();
	}

	/// Broadcasts `outcome` to every waiter and returns the coordinator to idle.
	///
	/// Returns the number of waiters that were queued.
	pub fn settle(mut self, outcome: &RenewalOutcome) -> usize {
		self.settled = true;

		self.coordinator.settle(outcome)
	}
}
impl Drop for RenewalLease<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.coordinator.settle(&Err(RenewalError::Abandoned));
		}
	}
}

/// Parked request awaiting the outcome of someone else's renewal.
#[derive(Debug)]
pub struct RenewalWaiter(oneshot::Receiver<RenewalOutcome>);
impl RenewalWaiter {
	/// Resolves once the leader settles.
	pub async fn wait(self) -> RenewalOutcome {
		match self.0.await {
			Ok(outcome) => outcome,
			Err(oneshot::Canceled) => Err(RenewalError::Abandoned),
		}
	}
}
