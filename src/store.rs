//! Bill persistence.
//!
//! The whole collection lives in one slot (a JSON array) and is rewritten on
//! every mutation. Mutations are applied to a copy first and only committed
//! in memory once the write succeeded, so a failed save leaves both the slot
//! and the in-memory collection untouched.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BillError, Result};
use crate::model::{Bill, BillCollection, BillDraft};

/// File name of the slot inside the data directory.
pub const SLOT_FILE: &str = "bills.json";

/// A single durable key-value entry holding the serialized collection.
pub trait Slot {
    /// `Ok(None)` when nothing was ever written.
    fn read(&self) -> Result<Option<String>>;
    /// Replaces the stored value wholesale.
    fn write(&mut self, value: &str) -> Result<()>;
    /// Keeps a copy of the current value before it gets overwritten with less
    /// than it holds. Slots with nothing worth keeping do nothing.
    fn keep_backup(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSlot { path: path.into() }
    }

    pub fn in_dir(data_root: &Path) -> Self {
        Self::new(data_root.join(SLOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where [`Slot::keep_backup`] copies an unreadable slot file.
    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("json.corrupt")
    }
}

impl Slot for FileSlot {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, value: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // write-then-rename so a crash never leaves half a file behind
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), bytes = value.len(), "bills written");
        Ok(())
    }

    fn keep_backup(&self) -> Result<()> {
        let backup = self.backup_path();
        fs::copy(&self.path, &backup)?;
        warn!(path = %backup.display(), "copy of unreadable bills kept");
        Ok(())
    }
}

/// In-memory slot, handy for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    value: Option<String>,
}

impl MemorySlot {
    pub fn with_value(value: impl Into<String>) -> Self {
        MemorySlot {
            value: Some(value.into()),
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

impl Slot for MemorySlot {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.value.clone())
    }

    fn write(&mut self, value: &str) -> Result<()> {
        self.value = Some(value.to_string());
        Ok(())
    }
}

/// Reads the collection. Never fails: a missing, unreadable or corrupt slot
/// yields an empty collection.
///
/// Records whose bill number has no digits are dropped, and derived fields of
/// the remaining records are recomputed from their inputs. Whenever stored
/// data is dropped the slot is backed up first, since the next save replaces it.
pub fn load<S: Slot>(slot: &S) -> BillCollection {
    let raw = match slot.read() {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("no saved bills yet");
            return BillCollection::new();
        }
        Err(e) => {
            warn!(error = %e, "could not read saved bills, starting empty");
            return BillCollection::new();
        }
    };

    let mut bills: BillCollection = match serde_json::from_str(&raw) {
        Ok(bills) => bills,
        Err(e) => {
            warn!(error = %e, "saved bills are corrupt, starting empty");
            back_up(slot);
            return BillCollection::new();
        }
    };

    let before = bills.len();
    bills.retain(|bill| {
        let numeric = bill.bill_number().is_some();
        if !numeric {
            warn!(id = %bill.id, bill_no = %bill.bill_no, "rejecting bill with non-numeric bill number");
        }
        numeric
    });
    if bills.len() != before {
        back_up(slot);
    }
    for bill in bills.iter_mut() {
        if bill.recompute() {
            debug!(id = %bill.id, "derived fields were stale and have been recomputed");
        }
    }
    bills
}

fn back_up<S: Slot>(slot: &S) {
    if let Err(e) = slot.keep_backup() {
        warn!(error = %e, "could not back up saved bills");
    }
}

/// Writes the whole collection, replacing what was there.
pub fn save<S: Slot>(slot: &mut S, bills: &BillCollection) -> Result<()> {
    let json = serde_json::to_string_pretty(bills)?;
    slot.write(&json)
}

pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// One past the highest bill number in use, or 1 for an empty collection.
pub fn next_bill_number(bills: &BillCollection) -> u64 {
    bills
        .iter()
        .filter_map(Bill::bill_number)
        .max()
        .map_or(1, |highest| highest.saturating_add(1))
}

/// What happened to a saved draft.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Created(Bill),
    Updated(Bill),
    /// The id being edited no longer exists; nothing was written.
    NotFound,
}

/// Owns the canonical collection and the slot it is persisted in.
pub struct BillStore<S: Slot> {
    slot: S,
    bills: BillCollection,
}

impl BillStore<FileSlot> {
    pub fn open_dir(data_root: &Path) -> Self {
        Self::open(FileSlot::in_dir(data_root))
    }
}

impl<S: Slot> BillStore<S> {
    pub fn open(slot: S) -> Self {
        let bills = load(&slot);
        info!(count = bills.len(), "bills loaded");
        BillStore { slot, bills }
    }

    /// Drops the in-memory state and reads the slot again.
    pub fn reload(&mut self) {
        self.bills = load(&self.slot);
    }

    pub fn bills(&self) -> &BillCollection {
        &self.bills
    }

    pub fn list(&self) -> impl Iterator<Item = &Bill> {
        self.bills.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Bill> {
        self.bills.get(id)
    }

    /// Looks a bill up by id, falling back to its bill number.
    pub fn find(&self, reference: &str) -> Option<&Bill> {
        let reference = reference.trim();
        self.bills
            .get(reference)
            .or_else(|| self.bills.find_by_bill_no(reference))
    }

    pub fn slot(&self) -> &S {
        &self.slot
    }

    pub fn next_bill_number(&self) -> u64 {
        next_bill_number(&self.bills)
    }

    /// A fresh draft with the next bill number and the given date.
    pub fn create_draft(&self, today: NaiveDate) -> BillDraft {
        BillDraft::new(self.next_bill_number(), today)
    }

    /// Appends a bill that already carries its id and bill number.
    ///
    /// The bill is validated and its derived fields recomputed before it is
    /// written; an invalid bill is refused and nothing changes.
    pub fn add(&mut self, bill: Bill) -> Result<()> {
        if self.bills.contains(&bill.id) {
            return Err(BillError::Validation(format!(
                "a bill with id {} already exists",
                bill.id
            )));
        }
        let bill = sealed(bill)?;
        self.commit(|bills| {
            bills.add(bill);
            true
        })?;
        Ok(())
    }

    /// Replaces the bill with the same id, keeping its bill number.
    /// Returns false without writing anything when the id is unknown.
    ///
    /// Validated and recomputed like [`BillStore::add`].
    pub fn update(&mut self, mut bill: Bill) -> Result<bool> {
        let Some(existing) = self.bills.get(&bill.id) else {
            debug!(id = %bill.id, "update of unknown bill ignored");
            return Ok(false);
        };
        bill.bill_no = existing.bill_no.clone();
        let bill = sealed(bill)?;
        self.commit(|bills| bills.update(bill))
    }

    /// Deletes by id. Returns false without writing anything when absent.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let removed = self.commit(|bills| bills.remove(id))?;
        if removed {
            info!(id, "bill deleted");
        } else {
            debug!(id, "delete of unknown bill ignored");
        }
        Ok(removed)
    }

    /// Validates a draft and stores it: as a new bill when `id` is `None`,
    /// otherwise as a replacement of the bill with that id.
    ///
    /// Nothing is written when validation fails or the id is unknown.
    pub fn save_draft(&mut self, mut draft: BillDraft, id: Option<&str>) -> Result<SaveOutcome> {
        match id {
            Some(id) => {
                let Some(existing) = self.bills.get(id) else {
                    debug!(id, "edited bill no longer exists");
                    return Ok(SaveOutcome::NotFound);
                };
                draft.bill_no = existing.bill_no.clone();
                let bill = draft.into_bill(id.to_string())?;
                self.commit(|bills| bills.update(bill.clone()))?;
                info!(id, bill_no = %bill.bill_no, "bill updated");
                Ok(SaveOutcome::Updated(bill))
            }
            None => {
                let mut bill = draft.into_bill(generate_id())?;
                if self.bills.find_by_bill_no(&bill.bill_no).is_some() {
                    let next = self.next_bill_number().to_string();
                    warn!(taken = %bill.bill_no, next = %next, "bill number already used, renumbering");
                    bill.bill_no = next;
                }
                self.add(bill.clone())?;
                info!(id = %bill.id, bill_no = %bill.bill_no, "bill created");
                Ok(SaveOutcome::Created(bill))
            }
        }
    }

    fn commit<F>(&mut self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut BillCollection) -> bool,
    {
        let mut next = self.bills.clone();
        if !change(&mut next) {
            return Ok(false);
        }
        save(&mut self.slot, &next)?;
        self.bills = next;
        Ok(true)
    }
}

/// Rebuilds a bill through its draft: validated, every derived field fresh.
fn sealed(bill: Bill) -> Result<Bill> {
    let id = bill.id.clone();
    BillDraft::from_bill(&bill).into_bill(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BillItem;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 2).unwrap()
    }

    fn draft_for(store: &BillStore<MemorySlot>, customer: &str) -> BillDraft {
        let mut draft = store.create_draft(today());
        draft.customer_name = customer.into();
        draft.items[0] = BillItem::new("Dyeing", 10.0, 50.0);
        draft.cgst_percent = "2.5".into();
        draft.sgst_percent = "2.5".into();
        draft
    }

    fn created(outcome: SaveOutcome) -> Bill {
        match outcome {
            SaveOutcome::Created(bill) => bill,
            other => panic!("expected a new bill, got {other:?}"),
        }
    }

    fn with_numbers(numbers: &[&str]) -> BillCollection {
        numbers
            .iter()
            .map(|no| {
                let mut draft = BillDraft::new(1, today());
                draft.customer_name = "C".into();
                draft.items[0].description = "x".into();
                let mut bill = draft.into_bill(generate_id()).unwrap();
                // set after validation so hand-edited numbers can be simulated
                bill.bill_no = no.to_string();
                bill
            })
            .collect()
    }

    #[test]
    fn next_number_for_empty_collection_is_one() {
        assert_eq!(next_bill_number(&BillCollection::new()), 1);
    }

    #[test]
    fn next_number_follows_highest() {
        assert_eq!(next_bill_number(&with_numbers(&["1", "5", "3"])), 6);
        assert_eq!(next_bill_number(&with_numbers(&["INV-009", "12"])), 13);
    }

    #[test]
    fn ids_are_uuid_v4() {
        let id = generate_id();
        let parsed = Uuid::parse_str(&id).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(id, generate_id());
    }

    #[test]
    fn missing_slot_loads_empty() {
        let store = BillStore::open(MemorySlot::default());
        assert!(store.bills().is_empty());
        assert_eq!(store.next_bill_number(), 1);
    }

    #[test]
    fn corrupt_slot_loads_empty() {
        for raw in ["", "not json", "{\"a\":1}", "[{\"id\": 3}]"] {
            let store = BillStore::open(MemorySlot::with_value(raw));
            assert!(store.bills().is_empty(), "raw {raw:?}");
        }
    }

    #[test]
    fn create_then_reload_round_trips() {
        let mut store = BillStore::open(MemorySlot::default());
        let bill = created(store.save_draft(draft_for(&store, "Mehta"), None).unwrap());
        assert_eq!(bill.bill_no, "1");
        assert_eq!(bill.total_amount, "525.00");

        let reopened = BillStore::open(store.slot().clone());
        assert_eq!(reopened.bills().len(), 1);
        assert_eq!(reopened.get(&bill.id), Some(&bill));
    }

    #[test]
    fn numbers_are_not_reused_after_delete() {
        let mut store = BillStore::open(MemorySlot::default());
        let first = created(store.save_draft(draft_for(&store, "A"), None).unwrap());
        let second = created(store.save_draft(draft_for(&store, "B"), None).unwrap());
        assert_eq!(second.bill_no, "2");

        assert!(store.remove(&first.id).unwrap());
        let third = created(store.save_draft(draft_for(&store, "C"), None).unwrap());
        assert_eq!(third.bill_no, "3");
    }

    #[test]
    fn stale_draft_number_is_renumbered() {
        let mut store = BillStore::open(MemorySlot::default());
        let draft_a = draft_for(&store, "A");
        let draft_b = draft_for(&store, "B");
        created(store.save_draft(draft_a, None).unwrap());
        let b = created(store.save_draft(draft_b, None).unwrap());
        assert_eq!(b.bill_no, "2");
    }

    #[test]
    fn update_keeps_size_id_and_number() {
        let mut store = BillStore::open(MemorySlot::default());
        let bill = created(store.save_draft(draft_for(&store, "A"), None).unwrap());
        created(store.save_draft(draft_for(&store, "B"), None).unwrap());

        let mut draft = BillDraft::from_bill(&bill);
        draft.bill_no = "99".into();
        draft.customer_name = "A & Sons".into();
        draft.items[0].quantity = 20.0;
        let outcome = store.save_draft(draft, Some(&bill.id)).unwrap();

        let SaveOutcome::Updated(updated) = outcome else {
            panic!("expected update");
        };
        assert_eq!(store.bills().len(), 2);
        assert_eq!(updated.id, bill.id);
        assert_eq!(updated.bill_no, bill.bill_no);
        assert_eq!(updated.total_amount, "1050.00");
        assert_eq!(store.get(&bill.id).unwrap().customer_name, "A & Sons");
    }

    #[test]
    fn update_of_unknown_id_writes_nothing() {
        let mut store = BillStore::open(MemorySlot::default());
        let bill = created(store.save_draft(draft_for(&store, "A"), None).unwrap());
        let before = store.slot().value().map(str::to_string);

        let outcome = store
            .save_draft(BillDraft::from_bill(&bill), Some("missing"))
            .unwrap();
        assert_eq!(outcome, SaveOutcome::NotFound);

        let mut ghost = bill.clone();
        ghost.id = "missing".into();
        assert!(!store.update(ghost).unwrap());
        assert_eq!(store.bills().len(), 1);
        assert_eq!(store.slot().value().map(str::to_string), before);
    }

    #[test]
    fn invalid_draft_leaves_everything_unchanged() {
        let mut store = BillStore::open(MemorySlot::default());
        let mut draft = draft_for(&store, "");
        draft.customer_name.clear();
        assert!(matches!(
            store.save_draft(draft, None),
            Err(BillError::Validation(_))
        ));
        assert!(store.bills().is_empty());
        assert!(store.slot().value().is_none());
    }

    #[test]
    fn delete_twice_is_same_as_once() {
        let mut store = BillStore::open(MemorySlot::default());
        let a = created(store.save_draft(draft_for(&store, "A"), None).unwrap());
        let b = created(store.save_draft(draft_for(&store, "B"), None).unwrap());

        assert!(store.remove(&a.id).unwrap());
        let after_first = store.bills().clone();
        assert!(!store.remove(&a.id).unwrap());
        assert!(!store.remove("never-existed").unwrap());
        assert_eq!(store.bills(), &after_first);
        assert_eq!(store.list().map(|x| x.id.clone()).collect::<Vec<_>>(), vec![b.id]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut store = BillStore::open(MemorySlot::default());
        let bill = created(store.save_draft(draft_for(&store, "A"), None).unwrap());
        assert!(store.add(bill).is_err());
        assert_eq!(store.bills().len(), 1);
    }

    #[test]
    fn add_refuses_incomplete_bills() {
        let mut store = BillStore::open(MemorySlot::default());
        let mut bill = with_numbers(&["1"]).iter().next().unwrap().clone();
        bill.customer_name.clear();
        bill.items[0].description.clear();
        assert!(matches!(store.add(bill), Err(BillError::Validation(_))));

        let mut bill = with_numbers(&["DRAFT"]).iter().next().unwrap().clone();
        bill.id = generate_id();
        assert!(matches!(store.add(bill), Err(BillError::Validation(_))));

        assert!(store.bills().is_empty());
        assert!(store.slot().value().is_none());
    }

    #[test]
    fn add_recomputes_stale_totals() {
        let mut store = BillStore::open(MemorySlot::default());
        let mut bill = draft_for(&store, "A").into_bill(generate_id()).unwrap();
        bill.total_amount = "999999.00".into();
        bill.items[0].amount = "1.00".into();
        store.add(bill.clone()).unwrap();

        let reopened = BillStore::open(store.slot().clone());
        let stored = reopened.get(&bill.id).unwrap();
        assert_eq!(stored.items[0].amount, "500.00");
        assert_eq!(stored.total_amount, "525.00");
    }

    #[test]
    fn update_recomputes_and_validates() {
        let mut store = BillStore::open(MemorySlot::default());
        let bill = created(store.save_draft(draft_for(&store, "A"), None).unwrap());

        let mut changed = bill.clone();
        changed.items[0].quantity = 20.0;
        assert!(store.update(changed).unwrap());
        let stored = store.get(&bill.id).unwrap();
        assert_eq!(stored.items[0].amount, "1000.00");
        assert_eq!(stored.net_amount, "1000.00");
        assert_eq!(stored.total_amount, "1050.00");

        let before = store.slot().value().map(str::to_string);
        let mut blank = bill.clone();
        blank.customer_name = " ".into();
        assert!(store.update(blank).is_err());
        assert_eq!(store.get(&bill.id).unwrap().customer_name, "A");
        assert_eq!(store.slot().value().map(str::to_string), before);
    }

    #[test]
    fn removed_item_row_stays_removed() {
        let mut store = BillStore::open(MemorySlot::default());
        let mut draft = draft_for(&store, "A");
        draft.add_item();
        draft.items[1] = BillItem::new("Printing", 2.0, 25.0);
        let bill = created(store.save_draft(draft, None).unwrap());
        assert_eq!(bill.net_amount, "550.00");

        let mut edit = BillDraft::from_bill(&bill);
        assert!(edit.remove_item(0));
        store.save_draft(edit, Some(&bill.id)).unwrap();

        let stored = store.get(&bill.id).unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].description, "Printing");
        assert_eq!(stored.net_amount, "50.00");
    }

    #[test]
    fn find_accepts_id_or_number() {
        let mut store = BillStore::open(MemorySlot::default());
        let bill = created(store.save_draft(draft_for(&store, "A"), None).unwrap());
        assert_eq!(store.find(&bill.id).map(|b| &b.id), Some(&bill.id));
        assert_eq!(store.find(" 1 ").map(|b| &b.id), Some(&bill.id));
        assert!(store.find("2").is_none());
    }

    #[test]
    fn non_numeric_bill_numbers_are_rejected_on_load() {
        let bills = with_numbers(&["4", "draft"]);
        let mut slot = MemorySlot::default();
        save(&mut slot, &bills).unwrap();

        let store = BillStore::open(slot);
        assert_eq!(store.bills().len(), 1);
        assert_eq!(store.next_bill_number(), 5);
    }

    #[test]
    fn load_recomputes_stale_derived_fields() {
        let raw = r#"[{
            "id": "legacy",
            "billNo": "12",
            "date": "2023-08-15",
            "customerName": "Old Customer",
            "items": [{"description": "Printing", "quantity": 3, "rate": 40, "amount": "0.00"}],
            "netAmount": "0.00",
            "cgstPercent": "9",
            "sgstPercent": "9",
            "igstPercent": "",
            "totalAmount": "0.00"
        }]"#;
        let store = BillStore::open(MemorySlot::with_value(raw));
        let bill = store.get("legacy").unwrap();
        assert_eq!(bill.items[0].amount, "120.00");
        assert_eq!(bill.net_amount, "120.00");
        assert_eq!(bill.cgst_amount, "10.80");
        assert_eq!(bill.igst_amount, "0.00");
        assert_eq!(bill.total_amount, "141.60");
        assert_eq!(bill.customer_address, "");
    }
}
