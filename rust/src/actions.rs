use crate::state::{ChatNamespace, Screen};

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Auth
    Login {
        username: String,
        password: String,
    },
    Logout,

    // Navigation
    UpdateScreenStack {
        stack: Vec<Screen>,
    },

    // Directory
    LoadResidents,

    // Chat
    OpenChatRoom {
        namespace: ChatNamespace,
        admin_id: String,
        resident_id: String,
        context_id: Option<String>,
        pending_note: Option<String>,
    },
    SetChatDraft {
        text: String,
    },
    SendChatMessage,
    CloseChatRoom,

    // Payments
    StartPayment {
        apartment_id: String,
        amount: String,
        description: String,
    },
    ClosePayment,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes secrets like passwords).
    pub fn tag(&self) -> &'static str {
        match self {
            // Auth
            AppAction::Login { .. } => "Login",
            AppAction::Logout => "Logout",

            // Navigation
            AppAction::UpdateScreenStack { .. } => "UpdateScreenStack",

            // Directory
            AppAction::LoadResidents => "LoadResidents",

            // Chat
            AppAction::OpenChatRoom { .. } => "OpenChatRoom",
            AppAction::SetChatDraft { .. } => "SetChatDraft",
            AppAction::SendChatMessage => "SendChatMessage",
            AppAction::CloseChatRoom => "CloseChatRoom",

            // Payments
            AppAction::StartPayment { .. } => "StartPayment",
            AppAction::ClosePayment => "ClosePayment",

            // UI
            AppAction::ClearToast => "ClearToast",
        }
    }
}
