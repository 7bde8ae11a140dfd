//! Typed record storage over sled
//!
//! Every record type lives in its own tree, keyed by its id and encoded as
//! CBOR. Mutations that must observe the current stored state go through
//! [`Store::update`], a compare-and-swap loop that reapplies the change until
//! it lands on an unchanged record.
use std::sync::Arc;

use sled::IVec;

use crate::error::MarketError;

/// A persisted entity.
pub trait Record: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    /// Name of the sled tree holding records of this type.
    const TREE: &'static str;
    /// Entity name used in not-found errors.
    const ENTITY: &'static str;

    fn key(&self) -> &str;
}

#[derive(Clone)]
pub struct Store {
    instance: Arc<sled::Db>,
}

impl Store {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    pub fn db(&self) -> &Arc<sled::Db> {
        &self.instance
    }

    fn tree(&self, name: &str) -> Result<sled::Tree, MarketError> {
        Ok(self.instance.open_tree(name)?)
    }

    pub fn load<R: Record>(&self, id: &str) -> Result<Option<R>, MarketError> {
        match self.tree(R::TREE)?.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Like [`Store::load`], but a missing record is a `NotFound` error.
    pub fn fetch<R: Record>(&self, id: &str) -> Result<R, MarketError> {
        self.load(id)?
            .ok_or_else(|| MarketError::not_found(R::ENTITY, id))
    }

    pub fn save<R: Record>(&self, record: &R) -> Result<(), MarketError> {
        let cbor = minicbor::to_vec(record)?;
        self.tree(R::TREE)?.insert(record.key().as_bytes(), cbor)?;
        Ok(())
    }

    /// All records of a type matching `filter`, in key order.
    pub fn scan<R: Record>(&self, filter: impl Fn(&R) -> bool) -> Result<Vec<R>, MarketError> {
        let mut records = Vec::new();
        for entry in self.tree(R::TREE)?.iter() {
            let (_, bytes) = entry?;
            let record: R = minicbor::decode(&bytes)?;
            if filter(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Atomically read, modify and write a record.
    ///
    /// `apply` sees the latest stored version; returning an error aborts the
    /// update without writing. If another writer got in between the read and
    /// the write, the record is re-read and `apply` runs again.
    pub fn update<R, F>(&self, id: &str, mut apply: F) -> Result<R, MarketError>
    where
        R: Record,
        F: FnMut(&mut R) -> Result<(), MarketError>,
    {
        let tree = self.tree(R::TREE)?;
        loop {
            let current = tree
                .get(id.as_bytes())?
                .ok_or_else(|| MarketError::not_found(R::ENTITY, id))?;

            let mut record: R = minicbor::decode(&current)?;
            apply(&mut record)?;
            let next = minicbor::to_vec(&record)?;

            match tree.compare_and_swap(id.as_bytes(), Some(&current), Some(next))? {
                Ok(()) => return Ok(record),
                Err(_) => {
                    tracing::debug!(tree = R::TREE, id, "concurrent write detected, retrying update");
                }
            }
        }
    }

    /// Raw value of an index entry.
    pub fn index_get(&self, index: &str, key: &str) -> Result<Option<String>, MarketError> {
        match self.tree(index)?.get(key.as_bytes())? {
            Some(value) => Ok(Some(ivec_to_string(&value)?)),
            None => Ok(None),
        }
    }

    /// Sets an index entry to `new` (or removes it, for `None`) only if it
    /// currently holds `expected`. Returns whether the swap happened.
    pub fn index_swap(
        &self,
        index: &str,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool, MarketError> {
        let swapped = self.tree(index)?.compare_and_swap(
            key.as_bytes(),
            expected.map(str::as_bytes),
            new.map(str::as_bytes),
        )?;
        Ok(swapped.is_ok())
    }
}

fn ivec_to_string(value: &IVec) -> Result<String, MarketError> {
    String::from_utf8(value.to_vec()).map_err(|e| MarketError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(minicbor::Encode, minicbor::Decode, Debug, PartialEq)]
    struct Counter {
        #[n(0)]
        id: String,
        #[n(1)]
        value: u64,
    }

    impl Record for Counter {
        const TREE: &'static str = "counters";
        const ENTITY: &'static str = "Counter";

        fn key(&self) -> &str {
            &self.id
        }
    }

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("store.db")).unwrap();
        (dir, Store::new(Arc::new(db)))
    }

    #[test]
    fn save_then_load() {
        let (_dir, store) = temp_store();
        let counter = Counter {
            id: "c1".into(),
            value: 7,
        };
        store.save(&counter).unwrap();

        assert_eq!(store.load::<Counter>("c1").unwrap(), Some(counter));
        assert!(store.load::<Counter>("c2").unwrap().is_none());
        assert!(matches!(
            store.fetch::<Counter>("c2"),
            Err(MarketError::NotFound { .. })
        ));
    }

    #[test]
    fn update_applies_and_aborts() {
        let (_dir, store) = temp_store();
        store
            .save(&Counter {
                id: "c1".into(),
                value: 1,
            })
            .unwrap();

        let updated = store
            .update::<Counter, _>("c1", |c| {
                c.value += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.value, 2);

        let aborted = store.update::<Counter, _>("c1", |_| {
            Err(MarketError::Conflict("nope".into()))
        });
        assert!(aborted.is_err());
        assert_eq!(store.fetch::<Counter>("c1").unwrap().value, 2);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let (_dir, store) = temp_store();
        store
            .save(&Counter {
                id: "c1".into(),
                value: 0,
            })
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .update::<Counter, _>("c1", |c| {
                                c.value += 1;
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.fetch::<Counter>("c1").unwrap().value, 100);
    }

    #[test]
    fn index_swap_only_from_expected() {
        let (_dir, store) = temp_store();

        assert!(store.index_swap("slots", "r1", None, Some("o1")).unwrap());
        assert!(!store.index_swap("slots", "r1", None, Some("o2")).unwrap());
        assert!(store.index_swap("slots", "r1", Some("o1"), Some("o2")).unwrap());
        assert_eq!(store.index_get("slots", "r1").unwrap().as_deref(), Some("o2"));

        assert!(store.index_swap("slots", "r1", Some("o2"), None).unwrap());
        assert!(store.index_get("slots", "r1").unwrap().is_none());
    }
}
