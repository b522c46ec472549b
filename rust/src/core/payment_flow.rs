// QR payment: initiate, poll, and settle against the deep-link callback.

use tokio::task::JoinHandle;

use super::*;
use crate::payment::{
    parse_payment_callback, poll_transaction, PaymentOutcome, PaymentReconciler, PaymentRequest,
    PaymentSignal, PaymentTicket, PollEvent,
};
use crate::state::{PaymentFailureReason, PaymentPhase, PaymentViewState};

pub(super) struct PaymentFlow {
    token: u64,
    reconciler: Option<PaymentReconciler>,
    init_task: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
}

impl PaymentFlow {
    fn stop_polling(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}

impl Drop for PaymentFlow {
    fn drop(&mut self) {
        if let Some(task) = self.init_task.take() {
            task.abort();
        }
        self.stop_polling();
    }
}

fn outcome_phase(outcome: &PaymentOutcome) -> PaymentPhase {
    match outcome {
        PaymentOutcome::Completed => PaymentPhase::Completed,
        PaymentOutcome::Failed(reason) => PaymentPhase::Failed {
            reason: reason.clone(),
        },
        PaymentOutcome::TimedOut => PaymentPhase::TimedOut,
    }
}

fn outcome_message(outcome: &PaymentOutcome) -> String {
    match outcome {
        PaymentOutcome::Completed => "Payment completed".to_string(),
        PaymentOutcome::Failed(PaymentFailureReason::Declined) => "Payment failed".to_string(),
        PaymentOutcome::Failed(PaymentFailureReason::CouldNotVerify) => {
            "Could not verify the payment status. Check your payment history.".to_string()
        }
        PaymentOutcome::Failed(PaymentFailureReason::CallbackCode { code }) => {
            format!("Payment failed (code {code})")
        }
        PaymentOutcome::TimedOut => {
            "Payment is still pending. Check your payment history later.".to_string()
        }
    }
}

impl AppCore {
    pub(super) fn start_payment(
        &mut self,
        apartment_id: String,
        amount: String,
        description: String,
    ) {
        if self.state.busy.starting_payment {
            return;
        }
        let apartment_id = apartment_id.trim().to_string();
        let amount = amount.trim().to_string();
        if apartment_id.is_empty() || amount.is_empty() {
            self.toast("Enter an apartment and an amount");
            return;
        }

        self.close_payment_flow();
        self.push_screen(Screen::Payment {
            apartment_id: apartment_id.clone(),
        });

        self.payment_token = self.payment_token.wrapping_add(1);
        let flow = self.payment_token;
        let request = PaymentRequest {
            apartment_id: apartment_id.clone(),
            amount,
            description,
        };
        let gateway = self.services.payments.clone();
        let tx = self.core_sender.clone();
        let init_task = self.runtime.spawn(async move {
            let result = gateway.initiate(&request).await.map_err(|e| e.to_string());
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::PaymentInitiated {
                flow,
                result,
            })));
        });

        self.payment = Some(PaymentFlow {
            token: flow,
            reconciler: None,
            init_task: Some(init_task),
            poll_task: None,
        });
        self.state.payment = Some(PaymentViewState {
            apartment_id,
            phase: PaymentPhase::NotStarted,
            transaction_id: None,
            qr_code: None,
            last_status: None,
        });
        self.state.busy.starting_payment = true;
        self.emit_state();
    }

    fn current_payment(&mut self, flow: u64) -> Option<&mut PaymentFlow> {
        self.payment.as_mut().filter(|p| p.token == flow)
    }

    pub(super) fn on_payment_initiated(
        &mut self,
        flow: u64,
        result: Result<PaymentTicket, String>,
    ) {
        let Some(payment) = self.current_payment(flow) else {
            tracing::debug!(flow, "stale payment initiation dropped");
            return;
        };
        payment.init_task = None;
        self.state.busy.starting_payment = false;

        let ticket = match result {
            Ok(ticket) => ticket,
            Err(e) => {
                self.toast(format!("Could not start payment: {e}"));
                return;
            }
        };
        tracing::info!(transaction_id = %ticket.transaction_id, "payment initiated");

        if let Some(view) = self.state.payment.as_mut() {
            view.phase = PaymentPhase::AwaitingQr;
            view.transaction_id = Some(ticket.transaction_id.clone());
            view.qr_code = Some(ticket.qr_code);
        }
        self.emit_state();

        // Polling starts as soon as the code is on screen.
        let gateway = self.services.payments.clone();
        let config = self.config.poll_config();
        let tx = self.core_sender.clone();
        let transaction_id = ticket.transaction_id.clone();
        let poll_task = self.runtime.spawn(async move {
            poll_transaction(gateway, transaction_id, config, move |event| {
                tx.send(CoreMsg::Internal(Box::new(InternalEvent::PaymentPolled {
                    flow,
                    event,
                })))
                .is_ok()
            })
            .await;
        });

        if let Some(payment) = self.current_payment(flow) {
            payment.reconciler = Some(PaymentReconciler::new(ticket.transaction_id));
            payment.poll_task = Some(poll_task);
        }
        if let Some(view) = self.state.payment.as_mut() {
            view.phase = PaymentPhase::Polling;
        }
        self.emit_state();
    }

    pub(super) fn on_payment_polled(&mut self, flow: u64, event: PollEvent) {
        if self.current_payment(flow).is_none() {
            return;
        }
        let signal = match event {
            PollEvent::StatusChanged(status) => {
                if let Some(view) = self.state.payment.as_mut() {
                    view.last_status = Some(status.as_str().to_string());
                }
                PaymentSignal::Status(status)
            }
            PollEvent::GaveUp { failures } => {
                tracing::warn!(failures, "payment status could not be verified");
                PaymentSignal::PollFailuresExhausted
            }
            PollEvent::TimedOut => PaymentSignal::TimedOut,
        };
        if !self.offer_payment_signal(signal) {
            self.emit_state();
        }
    }

    pub(super) fn on_deep_link(&mut self, url: &str) {
        let Some(callback) = parse_payment_callback(url, self.config.deep_link_scheme()) else {
            tracing::debug!(url, "deep link ignored");
            return;
        };
        tracing::info!(result_code = callback.result_code, "payment callback");
        self.offer_payment_signal(PaymentSignal::Callback {
            result_code: callback.result_code,
        });
    }

    /// Feed a signal to the arbiter. Returns `true` when it settled the
    /// payment, in which case the new state has already been emitted.
    fn offer_payment_signal(&mut self, signal: PaymentSignal) -> bool {
        let Some(payment) = self.payment.as_mut() else {
            return false;
        };
        let Some(reconciler) = payment.reconciler.as_mut() else {
            tracing::debug!(?signal, "no transaction yet; signal ignored");
            return false;
        };
        let Some(outcome) = reconciler.offer(signal) else {
            return false;
        };
        tracing::info!(
            transaction_id = %reconciler.transaction_id(),
            ?outcome,
            "payment settled"
        );
        payment.stop_polling();

        if let Some(view) = self.state.payment.as_mut() {
            view.phase = outcome_phase(&outcome);
        }
        self.toast(outcome_message(&outcome));
        true
    }

    /// Stops polling and forgets the transaction so a late callback is ignored.
    pub(super) fn close_payment_flow(&mut self) {
        self.payment_token = self.payment_token.wrapping_add(1);
        self.payment = None;
        self.state.payment = None;
        self.state.busy.starting_payment = false;
    }
}
