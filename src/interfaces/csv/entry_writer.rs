use crate::domain::catalog::{CatalogEntry, ItemKind};
use crate::domain::records::PurchaseState;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

const HEADER: [&str; 7] = ["id", "kind", "state", "acknowledged", "pending", "price", "token"];

#[derive(Serialize)]
struct EntryRow<'a> {
    id: &'a str,
    kind: ItemKind,
    state: PurchaseState,
    acknowledged: bool,
    pending: bool,
    price: Option<&'a str>,
    token: Option<&'a str>,
}

impl<'a> From<&'a CatalogEntry> for EntryRow<'a> {
    fn from(entry: &'a CatalogEntry) -> Self {
        Self {
            id: entry.id(),
            kind: entry.kind(),
            state: entry.purchase_state(),
            acknowledged: entry.is_acknowledged(),
            pending: entry.is_pending(),
            price: entry.price(),
            token: entry.purchase_token(),
        }
    }
}

/// Writes the final catalog state as CSV. The header is always written, even
/// when there are no entries.
pub struct EntryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> EntryWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    pub fn write_entries<'a, I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a CatalogEntry>,
    {
        self.writer.write_record(HEADER)?;
        for entry in entries {
            self.writer.serialize(EntryRow::from(entry))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::PurchaseRecord;

    fn render(entries: &[CatalogEntry]) -> String {
        let mut buffer = Vec::new();
        EntryWriter::new(&mut buffer).write_entries(entries).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_writes_header_and_rows() {
        let mut owned = CatalogEntry::one_time("remove_ads");
        owned.apply_purchase(&PurchaseRecord {
            ids: vec!["remove_ads".to_string()],
            token: "tok1".to_string(),
            state: PurchaseState::Purchased,
            acknowledged: false,
        });
        let output = render(&[CatalogEntry::consumable("coins_100"), owned]);

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "id,kind,state,acknowledged,pending,price,token");
        assert_eq!(lines[1], "coins_100,consumable,unspecified,false,false,,");
        assert_eq!(lines[2], "remove_ads,one_time,purchased,false,true,,tok1");
    }

    #[test]
    fn test_empty_store_still_writes_header() {
        assert_eq!(render(&[]), "id,kind,state,acknowledged,pending,price,token\n");
    }
}
