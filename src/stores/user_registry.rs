use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::{StoreError, UserError};
use crate::models::id::{IdGenerator, RecordId};
use crate::models::user::{NewUser, Role, User, UserPatch, UserStatus};
use crate::stores::kv::{load_record, save_record, KeyValueStore, USERS_RECORD};
use crate::utils::auth::password_matches;
use crate::validation::fields::{optional_field, require_non_blank};

/// Employee, manager and admin accounts, written through to `users_data`
pub struct UserRegistry {
    users: DashMap<RecordId, Arc<User>>,
    store: Arc<dyn KeyValueStore>,
    ids: IdGenerator,
}

impl UserRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            users: DashMap::new(),
            store,
            ids: IdGenerator::new(),
        }
    }

    /// Replace the in-memory users with the stored list
    ///
    /// Returns `false` when the record has never been written.
    pub fn load(&self) -> Result<bool, StoreError> {
        let Some(raw) = load_record::<Vec<serde_json::Value>>(self.store.as_ref(), USERS_RECORD)?
        else {
            return Ok(false);
        };

        self.users.clear();
        for (position, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<User>(value) {
                Ok(user) => {
                    self.ids.observe(user.id);
                    self.users.insert(user.id, Arc::new(user));
                }
                Err(e) => {
                    warn!(position, error = %e, "Skipping invalid stored user");
                }
            }
        }
        Ok(true)
    }

    /// Create an account; new accounts always start active
    pub fn create(&self, fields: NewUser) -> Result<Arc<User>, UserError> {
        let name = require_non_blank("name", &fields.name)?.to_string();

        let user = Arc::new(User {
            id: self.ids.next_id()?,
            name,
            email: fields.email.trim().to_string(),
            department: fields.department.trim().to_string(),
            login: optional_field(fields.login),
            password: fields.password.filter(|p| !p.is_empty()),
            barcode: optional_field(fields.barcode),
            role: fields.role.unwrap_or(Role::Employee),
            status: UserStatus::Active,
            face_id: optional_field(fields.face_id),
        });

        self.users.insert(user.id, Arc::clone(&user));
        self.write_through();

        info!(user_id = %user.id, name = %user.name, role = %user.role, "User created");
        Ok(user)
    }

    /// Merge supplied fields over an existing account
    ///
    /// Blank values keep what is stored, so an edit form can leave the
    /// password empty.
    pub fn update(&self, id: RecordId, patch: UserPatch) -> Result<Arc<User>, UserError> {
        let name = match patch.name {
            Some(name) => Some(require_non_blank("name", &name)?.to_string()),
            None => None,
        };
        let patch = UserPatch {
            name,
            email: optional_field(patch.email),
            department: optional_field(patch.department),
            login: optional_field(patch.login),
            password: patch.password.filter(|p| !p.is_empty()),
            barcode: optional_field(patch.barcode),
            role: patch.role,
            status: patch.status,
            face_id: optional_field(patch.face_id),
        };

        let updated = {
            let mut entry = self.users.get_mut(&id).ok_or(UserError::NotFound(id))?;
            let mut user = User::clone(entry.value());
            patch.apply_to(&mut user);
            let user = Arc::new(user);
            *entry.value_mut() = Arc::clone(&user);
            user
        };
        self.write_through();

        info!(user_id = %id, role = %updated.role, status = %updated.status, "User updated");
        Ok(updated)
    }

    /// Remove an account; issued keys are not touched
    pub fn delete(&self, id: RecordId) -> Option<Arc<User>> {
        let removed = self.users.remove(&id).map(|(_, user)| user);
        if let Some(user) = &removed {
            self.write_through();
            info!(user_id = %id, name = %user.name, "User deleted");
        }
        removed
    }

    /// Insert a fully formed account, replacing any with the same id
    pub fn insert(&self, user: User) -> Arc<User> {
        self.ids.observe(user.id);
        let user = Arc::new(user);
        self.users.insert(user.id, Arc::clone(&user));
        self.write_through();
        user
    }

    pub fn get(&self, id: RecordId) -> Option<Arc<User>> {
        self.users.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// All accounts in creation order
    pub fn list(&self) -> Vec<Arc<User>> {
        let mut users: Vec<Arc<User>> =
            self.users.iter().map(|entry| Arc::clone(entry.value())).collect();
        users.sort_by_key(|user| user.id);
        users
    }

    pub fn find_by_role(&self, role: Role) -> Vec<Arc<User>> {
        self.find(|user| user.role == role)
    }

    pub fn find_by_status(&self, status: UserStatus) -> Vec<Arc<User>> {
        self.find(|user| user.status == status)
    }

    pub fn find_by_barcode(&self, barcode: &str) -> Option<Arc<User>> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return None;
        }
        self.find(|user| user.barcode.as_deref() == Some(barcode))
            .into_iter()
            .next()
    }

    /// Exact match, the same comparison login uses
    pub fn find_by_email(&self, email: &str) -> Option<Arc<User>> {
        let email = email.trim();
        if email.is_empty() {
            return None;
        }
        self.find(|user| user.email == email)
            .into_iter()
            .next()
    }

    /// Active account whose login or email and password match
    ///
    /// With several matches the oldest account wins.
    pub fn authenticate(&self, identifier: &str, password: &str) -> Option<Arc<User>> {
        if identifier.trim().is_empty() {
            return None;
        }
        self.find(|user| {
            user.answers_to(identifier)
                && password_matches(password, user.password.as_deref())
                && user.is_active()
        })
        .into_iter()
        .next()
    }

    /// Whether the acting user may edit accounts
    pub fn can_edit(actor: Option<&User>) -> bool {
        match actor.map(|user| user.role) {
            Some(Role::Manager | Role::Admin) => true,
            Some(Role::Employee) | None => false,
        }
    }

    /// Write the full user list to the store
    pub fn persist(&self) -> Result<(), StoreError> {
        let users: Vec<User> = self.list().iter().map(|user| (**user).clone()).collect();
        save_record(self.store.as_ref(), USERS_RECORD, &users)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn find<P: Fn(&User) -> bool>(&self, predicate: P) -> Vec<Arc<User>> {
        self.list().into_iter().filter(|user| predicate(user.as_ref())).collect()
    }

    fn write_through(&self) {
        if let Err(e) = self.persist() {
            warn!(error = %e, "Failed to write users to store");
            // Continue anyway - memory is updated
        }
    }
}
