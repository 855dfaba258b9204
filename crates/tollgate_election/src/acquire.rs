//! All-or-nothing acquisition of an ordered list of gates.
//!
//! Gates are always taken in the order given and released in the reverse
//! order. A partially acquired set is never handed out: the first gate that
//! cannot be taken rolls back everything taken before it.

use tollgate_core::WaitContext;
use tollgate_error::AdmissionResult;
use tollgate_rate_limit::{RequestLimiter, Reservation};
use tracing::trace;

/// Reservations on a list of gates, held together.
///
/// Dropping the set releases every reservation, last acquired first.
#[derive(Default)]
pub struct HeldGates {
    held: Vec<Box<dyn Reservation>>,
}

impl HeldGates {
    fn push(&mut self, reservation: Box<dyn Reservation>) {
        self.held.push(reservation);
    }

    /// Number of gates held.
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// True when no gate was involved (every gate was unlimited).
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Release every gate now instead of on drop.
    pub fn release(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        while let Some(mut reservation) = self.held.pop() {
            reservation.cancel();
        }
    }
}

impl std::fmt::Debug for HeldGates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeldGates")
            .field("held", &self.held.len())
            .finish()
    }
}

impl Drop for HeldGates {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Take every gate without blocking, or none of them.
///
/// Returns `Ok(None)` as soon as one gate is unavailable, after releasing
/// the gates already taken in reverse order.
///
/// # Errors
///
/// Propagates a gate that can never admit a single request.
pub fn try_acquire_ordered(gates: &[&dyn RequestLimiter]) -> AdmissionResult<Option<HeldGates>> {
    let mut held = HeldGates::default();
    for (index, gate) in gates.iter().enumerate() {
        let reservation = gate.reserve()?;
        if !reservation.is_acquired() {
            trace!(index, "Gate unavailable, rolling back");
            return Ok(None);
        }
        held.push(reservation);
    }
    Ok(Some(held))
}

/// Take every gate in order, waiting on each one as needed.
///
/// # Errors
///
/// Returns the context's error if it finishes before every gate is held;
/// gates taken so far are released in reverse order.
pub async fn acquire_ordered(
    gates: &[&dyn RequestLimiter],
    ctx: &WaitContext,
) -> AdmissionResult<HeldGates> {
    let mut held = HeldGates::default();
    for gate in gates {
        let mut reservation = gate.reserve()?;
        reservation.wait(ctx).await?;
        held.push(reservation);
    }
    Ok(held)
}
