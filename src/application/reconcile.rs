//! Merges provider data into the [`CatalogStore`].
//!
//! These are the only writers of an entry's catalog info and purchase fields.
//! Each pass holds the store's write lock for its whole duration.

use super::store::{CatalogStore, StoreInner};
use crate::domain::catalog::CatalogInfo;
use crate::domain::records::{CatalogRecord, PurchaseRecord};
use tracing::debug;

impl CatalogStore {
    /// Sets catalog info on registered entries. Records for unknown ids are ignored.
    pub fn apply_catalog_info(&self, records: &[CatalogRecord]) {
        let mut inner = self.write();
        let mut applied = 0usize;
        for record in records {
            if let Some(entry) = inner.get_mut(&record.id) {
                entry.set_catalog_info(CatalogInfo::from(record));
                applied += 1;
            }
        }
        debug!(received = records.len(), applied, "catalog info reconciled");
    }

    /// Replaces all purchase state with `records`.
    ///
    /// The provider's list is exhaustive: every entry is reset first, so an item
    /// missing from `records` ends up unowned whatever it was before.
    pub fn apply_purchases(&self, records: &[PurchaseRecord]) {
        let mut inner = self.write();
        for entry in inner.entries.iter_mut() {
            entry.clear_purchase();
        }
        apply_records(&mut inner, records);
        debug!(purchases = records.len(), "purchases reconciled");
    }

    /// Applies `records` on top of the current state without resetting anything.
    ///
    /// Used for purchase-update notifications, which only carry the purchases of
    /// the flow that just finished. Unlike [`apply_purchases`](Self::apply_purchases)
    /// this is not a full replacement: entries missing from `records` keep their
    /// state until the next full purchase query.
    pub fn apply_purchase_updates(&self, records: &[PurchaseRecord]) {
        let mut inner = self.write();
        apply_records(&mut inner, records);
        debug!(purchases = records.len(), "purchase updates applied");
    }
}

fn apply_records(inner: &mut StoreInner, records: &[PurchaseRecord]) {
    for record in records {
        for id in &record.ids {
            if let Some(entry) = inner.get_mut(id) {
                entry.apply_purchase(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::CatalogEntry;
    use crate::domain::records::PurchaseState;

    fn store() -> CatalogStore {
        CatalogStore::with_entries([
            CatalogEntry::consumable("coins_100"),
            CatalogEntry::one_time("remove_ads"),
            CatalogEntry::one_time("skin_pack"),
        ])
    }

    fn catalog_record(id: &str, price: &str) -> CatalogRecord {
        CatalogRecord {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: String::new(),
            price: price.to_string(),
            price_amount_micros: 990_000,
            currency: "USD".to_string(),
        }
    }

    fn purchase(ids: &[&str], token: &str, state: PurchaseState, acknowledged: bool) -> PurchaseRecord {
        PurchaseRecord {
            ids: ids.iter().map(|id| id.to_string()).collect(),
            token: token.to_string(),
            state,
            acknowledged,
        }
    }

    #[test]
    fn test_catalog_info_ignores_unknown_ids() {
        let store = store();
        store.apply_catalog_info(&[
            catalog_record("coins_100", "$0.99"),
            catalog_record("mystery", "$9.99"),
        ]);

        assert_eq!(store.get("coins_100").unwrap().price(), Some("$0.99"));
        assert!(!store.get("remove_ads").unwrap().is_loaded());
        assert!(!store.contains("mystery"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_empty_purchase_list_resets_everything() {
        let store = store();
        store.apply_purchases(&[
            purchase(&["coins_100"], "t1", PurchaseState::Purchased, true),
            purchase(&["remove_ads"], "t2", PurchaseState::Pending, false),
        ]);

        store.apply_purchases(&[]);

        for entry in store.snapshot() {
            assert_eq!(entry.purchase_state(), PurchaseState::Unspecified, "{entry}");
            assert_eq!(entry.purchase_token(), None);
            assert!(!entry.is_acknowledged());
        }
    }

    #[test]
    fn test_purchase_list_replaces_previous_state() {
        let store = store();
        store.apply_purchases(&[purchase(&["remove_ads"], "old", PurchaseState::Purchased, true)]);
        store.apply_purchases(&[purchase(&["skin_pack"], "new", PurchaseState::Purchased, false)]);

        let remove_ads = store.get("remove_ads").unwrap();
        assert_eq!(remove_ads.purchase_token(), None);
        assert!(!remove_ads.is_purchased());

        let skin_pack = store.get("skin_pack").unwrap();
        assert_eq!(skin_pack.purchase_token(), Some("new"));
        assert!(skin_pack.is_pending());
    }

    #[test]
    fn test_multi_id_record_applies_to_each_id() {
        let store = store();
        store.apply_purchases(&[purchase(
            &["remove_ads", "skin_pack", "unknown"],
            "bundle",
            PurchaseState::Purchased,
            true,
        )]);

        assert!(store.get("remove_ads").unwrap().is_purchased());
        assert!(store.get("skin_pack").unwrap().is_purchased());
        assert!(!store.get("coins_100").unwrap().is_purchased());
    }

    #[test]
    fn test_updates_do_not_reset_other_entries() {
        let store = store();
        store.apply_purchases(&[purchase(&["remove_ads"], "t1", PurchaseState::Purchased, true)]);
        store.apply_purchase_updates(&[purchase(&["coins_100"], "t2", PurchaseState::Purchased, false)]);

        assert!(store.get("remove_ads").unwrap().is_purchased());
        assert_eq!(store.get("coins_100").unwrap().purchase_token(), Some("t2"));
    }

    #[test]
    fn test_reconciliation_is_idempotent() {
        let store = store();
        let records = [purchase(&["coins_100"], "t1", PurchaseState::Purchased, false)];
        store.apply_purchases(&records);
        let first = store.snapshot();
        store.apply_purchases(&records);
        assert_eq!(store.snapshot(), first);
    }
}
