//! Navigation collaborator invoked when the session can no longer be recovered.

// self
use crate::obs::event;

/// Performs the hard redirect to the login entry point after credentials are wiped.
///
/// Any `Fn(&str) + Send + Sync` closure is a navigator, which is how UI shells usually wire
/// this in.
pub trait Navigator
where
	Self: Send + Sync,
{
	/// Sends the user to `location`.
	fn redirect(&self, location: &str);
}
impl<F> Navigator for F
where
	F: Fn(&str) + Send + Sync,
{
	fn redirect(&self, location: &str) {
		self(location)
	}
}

/// Navigator for headless sessions; the redirect request is only logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNavigator;
impl Navigator for NullNavigator {
	fn redirect(&self, location: &str) {
		event!(warn, location, "Session ended; no navigator is attached to follow the redirect.");

		#[cfg(not(feature = "tracing"))]
		let _ = location;
	}
}
