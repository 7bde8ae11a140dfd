//! Service layer API for marketplace operations
//!
//! [`MarketService`] is the single entry point the HTTP layer and tests talk
//! to. The operations themselves live next to the records they touch
//! (`request`, `acceptance`, `chat`, `order`); this module only wires the
//! shared collaborators together.
use std::sync::Arc;

use crate::error::MarketError;
use crate::lifecycle::OrderLifecycle;
use crate::msp::{MspCatalog, MspStore};
use crate::store::Store;
use crate::users::{UserDirectory, UserStore};

#[derive(Clone)]
pub struct MarketService {
    pub(crate) store: Store,
    pub(crate) lifecycle: OrderLifecycle,
    pub(crate) users: Arc<dyn UserDirectory>,
    pub(crate) msp: Arc<dyn MspCatalog>,
}

impl MarketService {
    /// A service with the standard status flows, backed entirely by
    /// `instance` (users and the MSP catalog included).
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self {
            store: Store::new(instance.clone()),
            lifecycle: OrderLifecycle::default(),
            users: Arc::new(UserStore::new(instance.clone())),
            msp: Arc::new(MspStore::new(instance)),
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: OrderLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = users;
        self
    }

    /// Replaces the MSP catalog. Price floors and the admin MSP operations
    /// both go through it.
    pub fn with_msp(mut self, msp: Arc<dyn MspCatalog>) -> Self {
        self.msp = msp;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn lifecycle(&self) -> &OrderLifecycle {
        &self.lifecycle
    }

    /// Display name to snapshot onto new records.
    pub(crate) fn display_name(&self, user_id: &str) -> Result<String, MarketError> {
        self.users
            .user_name(user_id)?
            .ok_or_else(|| MarketError::not_found("User", user_id))
    }
}
