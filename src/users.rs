//! User directory: display names for denormalised order fields
use std::sync::Arc;

use serde::Serialize;

use crate::error::MarketError;
use crate::service::MarketService;
use crate::store::{Record, Store};
use crate::types::Role;
use crate::utils::new_uuid_to_bech32;

/// Resolves a user id to the display name snapshotted onto new records.
pub trait UserDirectory: Send + Sync {
    fn user_name(&self, user_id: &str) -> Result<Option<String>, MarketError>;
}

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
pub struct User {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub role: Role,
}

impl Record for User {
    const TREE: &'static str = "users";
    const ENTITY: &'static str = "User";

    fn key(&self) -> &str {
        &self.id
    }
}

/// sled-backed user directory.
#[derive(Clone)]
pub struct UserStore {
    store: Store,
}

impl UserStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self {
            store: Store::new(instance),
        }
    }

    pub fn register(&self, name: &str, role: Role) -> Result<User, MarketError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MarketError::InvalidInput("user name is required".into()));
        }

        let user = User {
            id: new_uuid_to_bech32("user_")?,
            name: name.to_string(),
            role,
        };
        self.store.save(&user)?;
        Ok(user)
    }

    pub fn get(&self, user_id: &str) -> Result<Option<User>, MarketError> {
        self.store.load(user_id)
    }
}

impl UserDirectory for UserStore {
    fn user_name(&self, user_id: &str) -> Result<Option<String>, MarketError> {
        Ok(self.get(user_id)?.map(|user| user.name))
    }
}

impl MarketService {
    /// Adds a user to the sled-backed directory.
    pub fn register_user(&self, name: &str, role: Role) -> Result<User, MarketError> {
        let user = UserStore::new(self.store.db().clone()).register(name, role)?;
        tracing::info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_users_resolve_to_names() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(sled::open(dir.path().join("users.db")).unwrap());
        let users = UserStore::new(db);

        let user = users.register(" Asha ", Role::Farmer).unwrap();
        assert!(user.id.starts_with("user_1"));
        assert_eq!(users.user_name(&user.id).unwrap().as_deref(), Some("Asha"));
        assert_eq!(users.user_name("user_unknown").unwrap(), None);
        assert!(users.register("", Role::Dealer).is_err());
    }
}
