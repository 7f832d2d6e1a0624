use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use crate::core::config::AuthConfig;
use crate::core::error::StoreError;
use crate::models::id::RecordId;
use crate::models::user::{Role, User, UserStatus};
use crate::stores::kv::{load_record, save_record, KeyValueStore, SESSION_RECORD};
use crate::stores::user_registry::UserRegistry;

const BUILTIN_ADMIN_LOGIN: &str = "admin";
const BUILTIN_ADMIN_PASSWORD: &str = "admin";

/// Which login path the form used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Employee,
    Admin,
}

/// Authentication and the single signed-in user
///
/// All authorization checks go through `current_session()`.
pub struct SessionService {
    users: Arc<UserRegistry>,
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<Arc<User>>>,
    builtin_admin: bool,
}

impl SessionService {
    pub fn new(users: Arc<UserRegistry>, store: Arc<dyn KeyValueStore>, config: &AuthConfig) -> Self {
        Self {
            users,
            store,
            current: RwLock::new(None),
            builtin_admin: config.builtin_admin,
        }
    }

    /// Pick up a session persisted by an earlier run
    pub fn restore(&self) -> Result<Option<Arc<User>>, StoreError> {
        let restored = load_record::<User>(self.store.as_ref(), SESSION_RECORD)?.map(Arc::new);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = restored.clone();

        if let Some(user) = &restored {
            info!(user_id = %user.id, role = %user.role, "Session restored");
        }
        Ok(restored)
    }

    /// Check credentials and start a session
    ///
    /// Returns `false` on any mismatch and keeps the previous session.
    pub fn login(&self, identifier: &str, password: &str, mode: LoginMode) -> bool {
        let matched = self
            .users
            .authenticate(identifier, password)
            .filter(|user| mode == LoginMode::Employee || user.role == Role::Admin)
            .map(|user| session_snapshot(&user))
            .or_else(|| self.builtin_admin_session(identifier, password, mode));

        match matched {
            Some(user) => {
                info!(
                    user_id = %user.id,
                    role = %user.role,
                    admin_mode = mode == LoginMode::Admin,
                    "Login succeeded"
                );
                self.set_session(Some(Arc::new(user)));
                true
            }
            None => {
                warn!(identifier, admin_mode = mode == LoginMode::Admin, "Login failed");
                false
            }
        }
    }

    /// End the session; calling it without a session is fine
    pub fn logout(&self) {
        if let Some(user) = self.current_session() {
            info!(user_id = %user.id, "Logged out");
        }
        self.set_session(None);
    }

    /// Simulated password recovery
    ///
    /// Only reports whether the email is known. Passwords never change here.
    pub fn reset_password(&self, email: &str) -> bool {
        match self.users.find_by_email(email) {
            Some(user) => {
                info!(user_id = %user.id, email = %user.email, "Password reset instructions sent (simulated)");
                true
            }
            None => {
                warn!(email, "Password reset requested for unknown email");
                false
            }
        }
    }

    pub fn current_session(&self) -> Option<Arc<User>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_session().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.current_session()
            .is_some_and(|user| user.role == Role::Admin)
    }

    pub fn can_edit(&self) -> bool {
        UserRegistry::can_edit(self.current_session().as_deref())
    }

    fn builtin_admin_session(&self, identifier: &str, password: &str, mode: LoginMode) -> Option<User> {
        if !self.builtin_admin
            || mode != LoginMode::Admin
            || identifier != BUILTIN_ADMIN_LOGIN
            || password != BUILTIN_ADMIN_PASSWORD
        {
            return None;
        }

        warn!("Builtin admin credentials accepted without a matching account");
        Some(User {
            id: RecordId(0),
            name: "Administrator".to_string(),
            email: String::new(),
            department: String::new(),
            login: Some(BUILTIN_ADMIN_LOGIN.to_string()),
            password: None,
            barcode: None,
            role: Role::Admin,
            status: UserStatus::Active,
            face_id: None,
        })
    }

    fn set_session(&self, user: Option<Arc<User>>) {
        let result = match &user {
            Some(user) => save_record(self.store.as_ref(), SESSION_RECORD, user.as_ref()),
            None => self.store.delete(SESSION_RECORD),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session");
            // Continue anyway - memory is updated
        }

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = user;
    }
}

/// Session copy of an account, without the password
fn session_snapshot(user: &User) -> User {
    User {
        password: None,
        ..user.clone()
    }
}
