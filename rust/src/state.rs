use estate_store_profiles::StoreNamespace;

use crate::chat::{ParticipantRole, ReadReceipt};

#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub router: Router,
    pub auth: AuthState,
    pub busy: BusyState,
    pub residents: Vec<ResidentSummary>,
    pub chat: Option<ChatViewState>,
    pub payment: Option<PaymentViewState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            router: Router {
                default_screen: Screen::Login,
                screen_stack: vec![],
            },
            auth: AuthState::LoggedOut,
            busy: BusyState::idle(),
            residents: vec![],
            chat: None,
            payment: None,
            toast: None,
        }
    }
}

/// "In flight" flags for requests the UI should reflect with a spinner.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub logging_in: bool,
    pub loading_residents: bool,
    pub starting_payment: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            logging_in: false,
            loading_residents: false,
            starting_payment: false,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct Router {
    pub default_screen: Screen,
    pub screen_stack: Vec<Screen>,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatNamespace {
    General,
    Locker,
}

impl From<ChatNamespace> for StoreNamespace {
    fn from(ns: ChatNamespace) -> Self {
        match ns {
            ChatNamespace::General => StoreNamespace::General,
            ChatNamespace::Locker => StoreNamespace::Locker,
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq)]
pub enum Screen {
    Login,
    Residents,
    ChatRoom {
        namespace: ChatNamespace,
        admin_id: String,
        resident_id: String,
        context_id: Option<String>,
        /// System note to post once the room is ready. Cleared after it is sent.
        pending_note: Option<String>,
    },
    Payment {
        apartment_id: String,
    },
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    Resident,
}

impl UserRole {
    pub fn from_api(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::Resident
        }
    }
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn {
        user_id: String,
        display_name: String,
        role: UserRole,
    },
}

impl AuthState {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthState::LoggedIn { user_id, .. } => Some(user_id),
            AuthState::LoggedOut => None,
        }
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ResidentSummary {
    pub id: String,
    pub name: String,
    pub apartment_id: Option<String>,
    /// Unread messages from this resident in the general room; admins only.
    pub unread_count: u32,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum ChatPhase {
    Idle,
    /// Terminal: a required id was missing, the store is never contacted.
    Blocked {
        reason: String,
    },
    Initializing,
    Ready,
    Subscribed,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessageView {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub sender_role: ParticipantRole,
    pub timestamp_ms: i64,
    pub is_mine: bool,
    pub receipt: Option<ReadReceipt>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatViewState {
    pub namespace: ChatNamespace,
    pub room_id: Option<String>,
    pub phase: ChatPhase,
    pub messages: Vec<ChatMessageView>,
    pub draft: String,
    pub sending: bool,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum PaymentFailureReason {
    /// The backend reported the transaction as failed.
    Declined,
    /// Status polling failed too many times in a row.
    CouldNotVerify,
    /// The payment app returned a non-zero result code.
    CallbackCode { code: i32 },
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum PaymentPhase {
    NotStarted,
    AwaitingQr,
    Polling,
    Completed,
    Failed { reason: PaymentFailureReason },
    /// Inconclusive; distinct from `Failed`.
    TimedOut,
}

impl PaymentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentPhase::Completed | PaymentPhase::Failed { .. } | PaymentPhase::TimedOut
        )
    }
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct PaymentViewState {
    pub apartment_id: String,
    pub phase: PaymentPhase,
    pub transaction_id: Option<String>,
    pub qr_code: Option<String>,
    pub last_status: Option<String>,
}
