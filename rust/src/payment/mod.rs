//! QR-code payments: initiation, status polling and the deep-link callback,
//! reconciled into a single outcome.

mod deep_link;
mod gateway;
mod poller;
mod reconciler;
mod status;

pub use deep_link::{parse_payment_callback, PaymentCallback, PAYMENT_CALLBACK_HOST};
pub use gateway::{PaymentGateway, PaymentRequest, PaymentTicket};
pub use poller::{poll_transaction, PollConfig, PollEvent};
pub use reconciler::{PaymentOutcome, PaymentReconciler, PaymentSignal};
pub use status::TransactionStatus;
