//! Minimum support price lookup
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::error::MarketError;
use crate::service::MarketService;
use crate::store::{Record, Store};
use crate::types::{Actor, Role};
use crate::utils::normalize_product;

/// Price floor source consulted when a request is created.
pub trait MspLookup: Send + Sync {
    /// The MSP for `product`, if it is listed. Names are matched after
    /// trimming and lower-casing.
    fn msp_price(&self, product: &str) -> Result<Option<f64>, MarketError>;
}

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
pub struct MspEntry {
    #[n(0)]
    pub product: String, // normalised name, also the key
    #[n(1)]
    pub price: f64,
}

impl Record for MspEntry {
    const TREE: &'static str = "msp";
    const ENTITY: &'static str = "MSP entry";

    fn key(&self) -> &str {
        &self.product
    }
}

/// An MSP catalog that can also be administered. The service reads floors
/// and runs admin operations through the same catalog.
pub trait MspCatalog: MspLookup {
    fn upsert(&self, product: &str, price: f64) -> Result<MspEntry, MarketError>;
    fn entry(&self, product: &str) -> Result<Option<MspEntry>, MarketError>;
    /// Every listed product, ordered by name.
    fn entries(&self) -> Result<Vec<MspEntry>, MarketError>;
}

impl MspEntry {
    /// A validated entry keyed by the normalised product name.
    pub fn new(product: &str, price: f64) -> Result<Self, MarketError> {
        let product = normalize_product(product);
        if product.is_empty() {
            return Err(MarketError::InvalidInput("product is required".into()));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(MarketError::InvalidInput(
                "price must be a valid non-negative number".into(),
            ));
        }
        Ok(Self { product, price })
    }
}

/// sled-backed MSP catalog.
#[derive(Clone)]
pub struct MspStore {
    store: Store,
}

impl MspStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self {
            store: Store::new(instance),
        }
    }
}

impl MspCatalog for MspStore {
    fn upsert(&self, product: &str, price: f64) -> Result<MspEntry, MarketError> {
        let entry = MspEntry::new(product, price)?;
        self.store.save(&entry)?;
        Ok(entry)
    }

    fn entry(&self, product: &str) -> Result<Option<MspEntry>, MarketError> {
        self.store.load(&normalize_product(product))
    }

    fn entries(&self) -> Result<Vec<MspEntry>, MarketError> {
        let mut entries = self.store.scan::<MspEntry>(|_| true)?;
        entries.sort_by(|a, b| a.product.cmp(&b.product));
        Ok(entries)
    }
}

impl MspLookup for MspStore {
    fn msp_price(&self, product: &str) -> Result<Option<f64>, MarketError> {
        Ok(self.entry(product)?.map(|e| e.price))
    }
}

// in-memory catalog keyed by normalised product name
impl MspLookup for HashMap<String, f64> {
    fn msp_price(&self, product: &str) -> Result<Option<f64>, MarketError> {
        Ok(self.get(&normalize_product(product)).copied())
    }
}

fn poisoned<T>(_: T) -> MarketError {
    MarketError::Internal("msp catalog lock poisoned".into())
}

impl MspLookup for RwLock<HashMap<String, f64>> {
    fn msp_price(&self, product: &str) -> Result<Option<f64>, MarketError> {
        self.read().map_err(poisoned)?.msp_price(product)
    }
}

impl MspCatalog for RwLock<HashMap<String, f64>> {
    fn upsert(&self, product: &str, price: f64) -> Result<MspEntry, MarketError> {
        let entry = MspEntry::new(product, price)?;
        self.write()
            .map_err(poisoned)?
            .insert(entry.product.clone(), entry.price);
        Ok(entry)
    }

    fn entry(&self, product: &str) -> Result<Option<MspEntry>, MarketError> {
        let product = normalize_product(product);
        let catalog = self.read().map_err(poisoned)?;
        Ok(catalog.get(&product).map(|&price| MspEntry { product, price }))
    }

    fn entries(&self) -> Result<Vec<MspEntry>, MarketError> {
        let catalog = self.read().map_err(poisoned)?;
        let mut entries: Vec<_> = catalog
            .iter()
            .map(|(product, &price)| MspEntry {
                product: product.clone(),
                price,
            })
            .collect();
        entries.sort_by(|a, b| a.product.cmp(&b.product));
        Ok(entries)
    }
}

impl MarketService {
    /// Sets the MSP for a product. Admin only.
    pub fn upsert_msp(&self, product: &str, price: f64, actor: &Actor) -> Result<MspEntry, MarketError> {
        if actor.role != Role::Admin {
            return Err(MarketError::Forbidden("only admin can set MSP".into()));
        }
        let entry = self.msp.upsert(product, price)?;
        tracing::info!(product = %entry.product, price = entry.price, "msp updated");
        Ok(entry)
    }

    pub fn msp_list(&self) -> Result<Vec<MspEntry>, MarketError> {
        self.msp.entries()
    }

    pub fn msp_for(&self, product: &str) -> Result<MspEntry, MarketError> {
        let product = normalize_product(product);
        if product.is_empty() {
            return Err(MarketError::InvalidInput("product is required".into()));
        }
        self.msp
            .entry(&product)?
            .ok_or_else(|| MarketError::not_found(MspEntry::ENTITY, product))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup_is_normalised() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(sled::open(dir.path().join("msp.db")).unwrap());
        let catalog = MspStore::new(db);

        catalog.upsert("  Wheat ", 2585.0).unwrap();
        catalog.upsert("barley", 1980.0).unwrap();

        assert_eq!(catalog.msp_price("WHEAT").unwrap(), Some(2585.0));
        assert_eq!(catalog.msp_price("rice").unwrap(), None);
        let names: Vec<_> = catalog.entries().unwrap().into_iter().map(|e| e.product).collect();
        assert_eq!(names, ["barley", "wheat"]);
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(sled::open(dir.path().join("msp.db")).unwrap());
        let catalog = MspStore::new(db);

        assert!(catalog.upsert(" ", 10.0).is_err());
        assert!(catalog.upsert("wheat", -1.0).is_err());
        assert!(catalog.upsert("wheat", f64::INFINITY).is_err());
    }

    #[test]
    fn only_admin_sets_msp() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(sled::open(dir.path().join("msp.db")).unwrap());
        let service = MarketService::new(db);

        let dealer = Actor::new("dealer_a", Role::Dealer);
        assert!(matches!(
            service.upsert_msp("wheat", 2585.0, &dealer),
            Err(MarketError::Forbidden(_))
        ));

        let admin = Actor::new("admin", Role::Admin);
        service.upsert_msp("wheat", 2585.0, &admin).unwrap();
        assert_eq!(service.msp_for(" Wheat").unwrap().price, 2585.0);
        assert!(matches!(
            service.msp_for("rice"),
            Err(MarketError::NotFound { .. })
        ));
    }

    #[test]
    fn injected_catalog_serves_admin_and_requests() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(sled::open(dir.path().join("msp.db")).unwrap());
        let catalog: Arc<RwLock<HashMap<String, f64>>> = Arc::new(RwLock::new(HashMap::new()));
        let service = MarketService::new(db.clone()).with_msp(catalog.clone());

        let admin = Actor::new("admin", Role::Admin);
        service.upsert_msp("Wheat", 2585.0, &admin).unwrap();

        assert_eq!(catalog.msp_price("wheat").unwrap(), Some(2585.0));
        assert_eq!(service.msp_for("WHEAT").unwrap().price, 2585.0);
        assert_eq!(service.msp_list().unwrap().len(), 1);
        // nothing leaked into the sled catalog
        assert!(MspStore::new(db).entries().unwrap().is_empty());

        let dealer = service.register_user("Dealer", Role::Dealer).unwrap();
        let dealer = Actor::new(dealer.id, Role::Dealer);
        let below_floor = crate::request::RequestDraft::new()
            .set_product("wheat")
            .set_quantity(10)
            .set_price_range(2500.0, 2700.0)
            .set_location("Indore");
        assert!(matches!(
            service.create_request(below_floor, &dealer),
            Err(MarketError::InvalidInput(_))
        ));
    }
}
