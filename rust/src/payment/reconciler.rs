use super::TransactionStatus;
use crate::state::PaymentFailureReason;

/// Input from either producer: the poll loop or the deep-link callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSignal {
    Status(TransactionStatus),
    PollFailuresExhausted,
    TimedOut,
    Callback { result_code: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Completed,
    Failed(PaymentFailureReason),
    /// Inconclusive; the transaction may still settle later.
    TimedOut,
}

/// First terminal signal wins; everything after it is ignored.
#[derive(Debug, Clone)]
pub struct PaymentReconciler {
    transaction_id: String,
    outcome: Option<PaymentOutcome>,
}

impl PaymentReconciler {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            outcome: None,
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn outcome(&self) -> Option<&PaymentOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    /// Returns the outcome only for the signal that settles the payment.
    pub fn offer(&mut self, signal: PaymentSignal) -> Option<PaymentOutcome> {
        if self.outcome.is_some() {
            tracing::debug!(
                transaction_id = %self.transaction_id,
                ?signal,
                "payment already settled; ignoring signal"
            );
            return None;
        }
        let outcome = match signal {
            PaymentSignal::Status(status) if status.is_success() => PaymentOutcome::Completed,
            PaymentSignal::Status(TransactionStatus::Failed) => {
                PaymentOutcome::Failed(PaymentFailureReason::Declined)
            }
            PaymentSignal::Status(_) => return None,
            PaymentSignal::PollFailuresExhausted => {
                PaymentOutcome::Failed(PaymentFailureReason::CouldNotVerify)
            }
            PaymentSignal::TimedOut => PaymentOutcome::TimedOut,
            PaymentSignal::Callback { result_code: 0 } => PaymentOutcome::Completed,
            PaymentSignal::Callback { result_code } => {
                PaymentOutcome::Failed(PaymentFailureReason::CallbackCode { code: result_code })
            }
        };
        self.outcome = Some(outcome.clone());
        Some(outcome)
    }
}
