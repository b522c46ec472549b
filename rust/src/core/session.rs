// Sign-in lifecycle and the resident directory.

use estate_store_profiles::StoreNamespace;

use super::*;
use crate::api::LoginResponse;
use crate::chat::resolve_room_id;
use crate::credentials::Credentials;
use crate::state::{AuthState, ResidentSummary, UserRole};

impl AppCore {
    /// Resume a cached session without contacting the backend.
    pub(super) fn restore_session(&mut self) {
        let Some(creds) = self.credentials.load() else {
            return;
        };
        tracing::info!(user_id = %creds.user_id, "restoring cached session");
        self.enter_logged_in(creds.user_id, creds.display_name, &creds.role);
        self.load_residents();
    }

    pub(super) fn login(&mut self, username: &str, password: &str) {
        if self.state.busy.logging_in {
            return;
        }
        let username = username.trim().to_string();
        if username.is_empty() || password.is_empty() {
            self.toast("Enter your username and password");
            return;
        }

        self.auth_token = self.auth_token.wrapping_add(1);
        let token = self.auth_token;
        self.set_busy(|b| b.logging_in = true);

        let backend = self.services.backend.clone();
        let tx = self.core_sender.clone();
        let password = password.to_string();
        self.runtime.spawn(async move {
            let result = backend
                .login(&username, &password)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::LoginFinished {
                token,
                result,
            })));
        });
    }

    pub(super) fn on_login_finished(&mut self, token: u64, result: Result<LoginResponse, String>) {
        if token != self.auth_token {
            tracing::debug!(token, "stale login result dropped");
            return;
        }
        self.set_busy(|b| b.logging_in = false);

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                self.toast(format!("Login failed: {e}"));
                return;
            }
        };
        let creds = Credentials {
            token: resp.token,
            user_id: resp.user.id,
            display_name: resp.user.name,
            role: resp.user.role,
        };
        // Every API call reads the token from here, so a session that
        // cannot be cached cannot be used either.
        if let Err(e) = self.credentials.save(&creds) {
            tracing::error!(err = %format!("{e:#}"), "failed to cache credentials");
            self.toast(format!("Login failed: {e}"));
            return;
        }
        tracing::info!(user_id = %creds.user_id, "logged in");
        self.enter_logged_in(creds.user_id, creds.display_name, &creds.role);
        self.load_residents();
    }

    fn enter_logged_in(&mut self, user_id: String, display_name: String, role: &str) {
        self.state.auth = AuthState::LoggedIn {
            user_id,
            display_name,
            role: UserRole::from_api(role),
        };
        self.state.router.default_screen = Screen::Residents;
        self.state.router.screen_stack.clear();
        self.emit_state();
    }

    pub(super) fn logout(&mut self) {
        self.auth_token = self.auth_token.wrapping_add(1);
        self.residents_token = self.residents_token.wrapping_add(1);
        self.close_chat_session();
        self.close_payment_flow();
        if let Err(e) = self.credentials.clear() {
            tracing::warn!(err = %format!("{e:#}"), "failed to remove cached credentials");
        }

        let rev = self.state.rev;
        self.state = AppState::empty();
        self.state.rev = rev;
        self.emit_state();
    }

    pub(super) fn load_residents(&mut self) {
        let AuthState::LoggedIn { user_id, role, .. } = &self.state.auth else {
            return;
        };
        // Unread badges only make sense from the admin's side of each room.
        let admin_id = (*role == UserRole::Admin).then(|| user_id.clone());

        self.residents_token = self.residents_token.wrapping_add(1);
        let token = self.residents_token;
        self.set_busy(|b| b.loading_residents = true);

        let backend = self.services.backend.clone();
        let general = self.chat_service(StoreNamespace::General).ok();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = match backend.list_residents().await {
                Ok(residents) => {
                    let mut out = Vec::with_capacity(residents.len());
                    for r in residents {
                        let unread_count = match (&admin_id, &general) {
                            (Some(admin_id), Some(chat)) => {
                                let room = resolve_room_id(admin_id, &r.id, None);
                                chat.get_unread_count(&room, admin_id)
                                    .await
                                    .unwrap_or_else(|e| {
                                        tracing::debug!(%room, %e, "unread count unavailable");
                                        0
                                    })
                            }
                            _ => 0,
                        };
                        out.push(ResidentSummary {
                            id: r.id,
                            name: r.name,
                            apartment_id: r.apartment_id,
                            unread_count,
                        });
                    }
                    Ok(out)
                }
                Err(e) => Err(e.to_string()),
            };
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ResidentsLoaded {
                token,
                result,
            })));
        });
    }

    pub(super) fn on_residents_loaded(
        &mut self,
        token: u64,
        result: Result<Vec<ResidentSummary>, String>,
    ) {
        if token != self.residents_token {
            return;
        }
        self.state.busy.loading_residents = false;
        match result {
            Ok(residents) => {
                tracing::debug!(count = residents.len(), "residents loaded");
                self.state.residents = residents;
                self.emit_state();
            }
            Err(e) => self.toast(format!("Could not load residents: {e}")),
        }
    }
}
