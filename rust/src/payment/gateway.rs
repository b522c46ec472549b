use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TransactionStatus;
use crate::api::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    pub apartment_id: String,
    /// Decimal amount as entered, e.g. `"1500.00"`.
    pub amount: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentTicket {
    #[serde(deserialize_with = "crate::api::de_id")]
    pub transaction_id: String,
    pub qr_code: String,
}

/// Payment backend.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentTicket, ApiError>;

    async fn transaction_status(&self, transaction_id: &str)
        -> Result<TransactionStatus, ApiError>;
}
