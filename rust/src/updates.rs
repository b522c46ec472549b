use crate::api::LoginResponse;
use crate::chat::{Message, RoomKey};
use crate::payment::{PaymentTicket, PollEvent};
use crate::state::{AppState, ResidentSummary};
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

/// Results of work the actor spawned onto its runtime.
///
/// Every variant carries the token of the session that started the work;
/// the actor drops results whose token is no longer current.
#[derive(Debug)]
pub enum InternalEvent {
    LoginFinished {
        token: u64,
        result: Result<LoginResponse, String>,
    },
    ResidentsLoaded {
        token: u64,
        result: Result<Vec<ResidentSummary>, String>,
    },

    // Chat session
    ChatRoomReady {
        session: u64,
        result: Result<RoomKey, String>,
    },
    ChatSnapshot {
        session: u64,
        result: Result<Vec<Message>, String>,
    },
    ChatSendFinished {
        session: u64,
        is_note: bool,
        result: Result<String, String>,
    },

    // Payments
    PaymentInitiated {
        flow: u64,
        result: Result<PaymentTicket, String>,
    },
    PaymentPolled {
        flow: u64,
        event: PollEvent,
    },
    DeepLinkOpened {
        url: String,
    },
}
