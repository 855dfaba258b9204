//! Composite reservation across every quota of a model.

use std::time::Duration;

use async_trait::async_trait;
use tollgate_core::WaitContext;
use tollgate_error::{AdmissionError, AdmissionErrorKind, AdmissionResult};
use tracing::debug;

use crate::{Reservation, TokenReservation};

/// One member reservation of an [`Admission`].
enum Member {
    Request(&'static str, Box<dyn Reservation>),
    Token(&'static str, Box<dyn TokenReservation>),
}

impl Member {
    fn name(&self) -> &'static str {
        match self {
            Member::Request(name, _) | Member::Token(name, _) => name,
        }
    }

    fn is_acquired(&self) -> bool {
        match self {
            Member::Request(_, r) => r.is_acquired(),
            Member::Token(_, r) => r.is_acquired(),
        }
    }

    fn delay(&self) -> Duration {
        match self {
            Member::Request(_, r) => r.delay(),
            Member::Token(_, r) => r.delay(),
        }
    }

    async fn wait(&mut self, ctx: &WaitContext) -> AdmissionResult<()> {
        match self {
            Member::Request(_, r) => r.wait(ctx).await,
            Member::Token(_, r) => r.wait(ctx).await,
        }
    }

    fn cancel(&mut self) {
        match self {
            Member::Request(_, r) => r.cancel(),
            Member::Token(_, r) => r.cancel(),
        }
    }

    fn settle(&mut self, actual: Option<u64>) {
        match (self, actual) {
            (Member::Request(_, r), _) => r.complete(),
            (Member::Token(_, r), Some(actual)) => r.complete_with_actual(actual),
            (Member::Token(_, r), None) => r.complete(),
        }
    }
}

/// Reservations taken on every configured quota of one model.
///
/// An admission is acquired only when all of its members are. It settles
/// as a unit: completing passes the actual token count to the token quotas
/// and completes the request quotas; cancelling returns everything in the
/// reverse order it was taken. Dropping an unsettled admission cancels it.
pub struct Admission {
    model: String,
    tokens: u64,
    members: Vec<Member>,
    settled: bool,
    /// Whether every member was held at the time of settling.
    granted: bool,
}

impl Admission {
    pub(crate) fn new(model: impl Into<String>, tokens: u64) -> Self {
        Self {
            model: model.into(),
            tokens,
            members: Vec::new(),
            settled: false,
            granted: false,
        }
    }

    pub(crate) fn push_request(&mut self, name: &'static str, reservation: Box<dyn Reservation>) {
        self.members.push(Member::Request(name, reservation));
    }

    pub(crate) fn push_tokens(&mut self, name: &'static str, reservation: Box<dyn TokenReservation>) {
        self.members.push(Member::Token(name, reservation));
    }

    /// Model this admission was made for.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Names of the quotas that still have to clear before the request may
    /// proceed, in reservation order.
    pub fn pending(&self) -> Vec<&'static str> {
        self.members
            .iter()
            .filter(|member| !member.is_acquired())
            .map(Member::name)
            .collect()
    }

    /// Mark the admission settled. Returns false if it already was.
    fn settle(&mut self) -> bool {
        if self.settled {
            return false;
        }
        self.granted = self.members.iter().all(Member::is_acquired);
        self.settled = true;
        true
    }

    fn release_all(&mut self) {
        // Reverse order keeps rollback symmetric with acquisition.
        for member in self.members.iter_mut().rev() {
            member.cancel();
        }
    }
}

impl std::fmt::Debug for Admission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Admission")
            .field("model", &self.model)
            .field("tokens", &self.tokens)
            .field(
                "members",
                &self.members.iter().map(Member::name).collect::<Vec<_>>(),
            )
            .field("settled", &self.settled)
            .finish()
    }
}

#[async_trait]
impl Reservation for Admission {
    fn is_acquired(&self) -> bool {
        !self.settled && self.members.iter().all(Member::is_acquired)
    }

    fn delay(&self) -> Duration {
        self.members
            .iter()
            .map(Member::delay)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    async fn wait(&mut self, ctx: &WaitContext) -> AdmissionResult<()> {
        if self.settled {
            return if self.granted {
                Ok(())
            } else {
                Err(AdmissionError::new(AdmissionErrorKind::ReservationReleased))
            };
        }

        let mut failure = None;
        for member in self.members.iter_mut() {
            if let Err(err) = member.wait(ctx).await {
                debug!(model = %self.model, quota = member.name(), %err, "Admission wait interrupted");
                failure = Some(err);
                break;
            }
        }

        match failure {
            None => Ok(()),
            Some(err) => {
                self.cancel();
                Err(err)
            }
        }
    }

    fn cancel(&mut self) {
        if self.settle() {
            self.release_all();
        }
    }

    fn complete(&mut self) {
        if !self.settle() {
            return;
        }
        for member in self.members.iter_mut() {
            member.settle(None);
        }
    }
}

impl TokenReservation for Admission {
    fn reserved(&self) -> u64 {
        self.tokens
    }

    fn complete_with_actual(&mut self, actual: u64) {
        if !self.settle() {
            return;
        }
        debug!(model = %self.model, estimated = self.tokens, actual, "Settling admission");
        for member in self.members.iter_mut() {
            member.settle(Some(actual));
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.cancel();
    }
}
