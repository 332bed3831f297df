use crate::domain::catalog::{CatalogEntry, ItemKind};
use crate::domain::records::{CatalogRecord, PurchaseRecord, PurchaseState};
use crate::error::{AppError, Result};
use serde::Deserialize;
use std::io::Read;

/// One row of the catalog CSV.
///
/// A row describes both sides of an item: the store listing the provider
/// serves, and the entry the engine registers. `owned` rows also seed a
/// purchase on the provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogRow {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub description: String,
    pub price: String,
    pub price_amount_micros: i64,
    pub currency: String,
    pub owned: Option<bool>,
    pub acknowledged: Option<bool>,
}

impl CatalogRow {
    pub fn entry(&self) -> CatalogEntry {
        CatalogEntry::new(self.id.clone(), self.kind)
    }

    pub fn listing(&self) -> CatalogRecord {
        CatalogRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            price: self.price.clone(),
            price_amount_micros: self.price_amount_micros,
            currency: self.currency.clone(),
        }
    }

    /// The seeded purchase for an owned item, tokened `seed-<id>`.
    pub fn purchase(&self) -> Option<PurchaseRecord> {
        self.owned.unwrap_or(false).then(|| PurchaseRecord {
            ids: vec![self.id.clone()],
            token: format!("seed-{}", self.id),
            state: PurchaseState::Purchased,
            acknowledged: self.acknowledged.unwrap_or(false),
        })
    }
}

/// Reads catalog rows from a CSV source.
///
/// Whitespace is trimmed and short rows are accepted; the trailing ownership
/// columns may be left out entirely.
pub struct CatalogReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CatalogReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes rows. A malformed row yields an error and the
    /// iterator moves on to the next one.
    pub fn rows(self) -> impl Iterator<Item = Result<CatalogRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(AppError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "id, kind, title, description, price, price_amount_micros, currency, owned, acknowledged";

    #[test]
    fn test_reader_valid_rows() {
        let data = format!(
            "{HEADER}\ncoins_100, consumable, 100 Coins, A pile, $0.99, 990000, USD, , \n\
             remove_ads, one_time, No Ads, Quiet, $2.99, 2990000, USD, true, false"
        );
        let rows: Vec<Result<CatalogRow>> = CatalogReader::new(data.as_bytes()).rows().collect();

        assert_eq!(rows.len(), 2);
        let coins = rows[0].as_ref().unwrap();
        assert_eq!(coins.kind, ItemKind::Consumable);
        assert_eq!(coins.listing().price, "$0.99");
        assert_eq!(coins.purchase(), None);

        let ads = rows[1].as_ref().unwrap();
        let purchase = ads.purchase().unwrap();
        assert_eq!(purchase.token, "seed-remove_ads");
        assert!(!purchase.acknowledged);
        assert!(ads.entry().is_one_time());
    }

    #[test]
    fn test_reader_ownership_columns_are_optional() {
        let data = format!("{HEADER}\ngems, consumable, Gems, Shiny, $1.99, 1990000, USD");
        let rows: Vec<Result<CatalogRow>> = CatalogReader::new(data.as_bytes()).rows().collect();

        assert_eq!(rows[0].as_ref().unwrap().owned, None);
    }

    #[test]
    fn test_reader_malformed_row() {
        let data = format!("{HEADER}\ngems, subscription, Gems, Shiny, $1.99, 1990000, USD");
        let rows: Vec<Result<CatalogRow>> = CatalogReader::new(data.as_bytes()).rows().collect();

        assert!(matches!(rows[0], Err(AppError::CsvError(_))));
    }
}
