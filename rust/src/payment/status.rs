/// Transaction status as reported by the payments endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Success,
    Failed,
    Other(String),
}

impl TransactionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "COMPLETED" => Self::Completed,
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Success)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_success() || matches!(self, Self::Failed)
    }
}
