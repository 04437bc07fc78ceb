use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::calc::{compute_item_amount, compute_totals, Totals};
use crate::error::{BillError, Result};

fn zero_percent() -> String {
    "0".to_string()
}

fn zero_amount() -> String {
    "0.00".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BillItem {
    pub description: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub rate: f64,
    /// Always `quantity * rate`, refreshed on every recompute.
    #[serde(default = "zero_amount")]
    pub amount: String,
}

impl BillItem {
    pub fn new(description: impl Into<String>, quantity: f64, rate: f64) -> Self {
        BillItem {
            description: description.into(),
            quantity,
            rate,
            amount: compute_item_amount(quantity, rate),
        }
    }

    pub fn empty() -> Self {
        BillItem::new("", 0.0, 0.0)
    }

    /// A row nobody has typed into yet.
    pub fn is_blank(&self) -> bool {
        self.description.trim().is_empty() && self.quantity == 0.0 && self.rate == 0.0
    }
}

/// One stored bill. Field names on disk are camelCase.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: String,
    pub bill_no: String,
    pub date: NaiveDate,
    pub customer_name: String,
    #[serde(default)]
    pub customer_address: String,
    #[serde(default)]
    pub customer_gstin: String,
    #[serde(default)]
    pub customer_state: String,
    #[serde(default)]
    pub state_code: String,
    pub items: Vec<BillItem>,
    #[serde(default = "zero_amount")]
    pub net_amount: String,
    #[serde(default = "zero_percent")]
    pub cgst_percent: String,
    #[serde(default = "zero_amount")]
    pub cgst_amount: String,
    #[serde(default = "zero_percent")]
    pub sgst_percent: String,
    #[serde(default = "zero_amount")]
    pub sgst_amount: String,
    #[serde(default = "zero_percent")]
    pub igst_percent: String,
    #[serde(default = "zero_amount")]
    pub igst_amount: String,
    #[serde(default = "zero_amount")]
    pub total_amount: String,
    #[serde(default)]
    pub amount_in_words: String,
}

impl Bill {
    /// Totals as derived from the current items and percentages.
    pub fn totals(&self) -> Totals {
        compute_totals(
            &self.items,
            &self.cgst_percent,
            &self.sgst_percent,
            &self.igst_percent,
        )
    }

    /// Refreshes every derived field. Returns true if anything changed.
    pub fn recompute(&mut self) -> bool {
        let before = self.clone();
        for item in &mut self.items {
            item.amount = compute_item_amount(item.quantity, item.rate);
        }
        let totals = self.totals();
        self.net_amount = totals.net_amount;
        self.cgst_amount = totals.cgst_amount;
        self.sgst_amount = totals.sgst_amount;
        self.igst_amount = totals.igst_amount;
        self.total_amount = totals.total_amount;
        self.amount_in_words = totals.amount_in_words;
        *self != before
    }

    /// Numeric part of `bill_no`, non-digits stripped.
    pub fn bill_number(&self) -> Option<u64> {
        bill_number_digits(&self.bill_no)
    }
}

static NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\D").unwrap());

pub(crate) fn bill_number_digits(bill_no: &str) -> Option<u64> {
    NON_DIGITS.replace_all(bill_no, "").parse().ok()
}

/// All bills, in insertion order. Serialized as a plain JSON array.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct BillCollection {
    bills: Vec<Bill>,
}

impl BillCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bills.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bill> {
        self.bills.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Bill> {
        self.bills.iter().find(|b| b.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn find_by_bill_no(&self, bill_no: &str) -> Option<&Bill> {
        self.bills.iter().find(|b| b.bill_no == bill_no)
    }

    pub fn add(&mut self, bill: Bill) {
        self.bills.push(bill);
    }

    /// Replaces the bill with the same id. Returns false (and changes
    /// nothing) when no such bill exists.
    pub fn update(&mut self, bill: Bill) -> bool {
        match self.bills.iter_mut().find(|b| b.id == bill.id) {
            Some(slot) => {
                *slot = bill;
                true
            }
            None => false,
        }
    }

    /// Removes the bill with this id. Returns false when it was absent.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.bills.len();
        self.bills.retain(|b| b.id != id);
        self.bills.len() != before
    }

    pub(crate) fn retain<F: FnMut(&Bill) -> bool>(&mut self, keep: F) {
        self.bills.retain(keep);
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Bill> {
        self.bills.iter_mut()
    }
}

impl FromIterator<Bill> for BillCollection {
    fn from_iter<I: IntoIterator<Item = Bill>>(iter: I) -> Self {
        BillCollection {
            bills: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a BillCollection {
    type Item = &'a Bill;
    type IntoIter = std::slice::Iter<'a, Bill>;

    fn into_iter(self) -> Self::IntoIter {
        self.bills.iter()
    }
}

/// Editable working copy of a bill: inputs only.
///
/// Derived fields are produced by [`BillDraft::into_bill`], which is the only
/// way a draft becomes a `Bill`.
#[derive(Debug, Clone, PartialEq)]
pub struct BillDraft {
    pub bill_no: String,
    pub date: NaiveDate,
    pub customer_name: String,
    pub customer_address: String,
    pub customer_gstin: String,
    pub customer_state: String,
    pub state_code: String,
    pub items: Vec<BillItem>,
    pub cgst_percent: String,
    pub sgst_percent: String,
    pub igst_percent: String,
}

impl BillDraft {
    pub fn new(bill_no: u64, date: NaiveDate) -> Self {
        BillDraft {
            bill_no: bill_no.to_string(),
            date,
            customer_name: String::new(),
            customer_address: String::new(),
            customer_gstin: String::new(),
            customer_state: String::new(),
            state_code: String::new(),
            items: vec![BillItem::empty()],
            cgst_percent: zero_percent(),
            sgst_percent: zero_percent(),
            igst_percent: zero_percent(),
        }
    }

    pub fn from_bill(bill: &Bill) -> Self {
        BillDraft {
            bill_no: bill.bill_no.clone(),
            date: bill.date,
            customer_name: bill.customer_name.clone(),
            customer_address: bill.customer_address.clone(),
            customer_gstin: bill.customer_gstin.clone(),
            customer_state: bill.customer_state.clone(),
            state_code: bill.state_code.clone(),
            items: bill.items.clone(),
            cgst_percent: bill.cgst_percent.clone(),
            sgst_percent: bill.sgst_percent.clone(),
            igst_percent: bill.igst_percent.clone(),
        }
    }

    pub fn add_item(&mut self) {
        self.items.push(BillItem::empty());
    }

    /// Removes an item row. The last remaining row cannot be removed.
    pub fn remove_item(&mut self, index: usize) -> bool {
        if self.items.len() <= 1 || index >= self.items.len() {
            return false;
        }
        self.items.remove(index);
        true
    }

    /// Refreshes item amounts and returns the totals the draft would save with.
    pub fn recompute(&mut self) -> Totals {
        for item in &mut self.items {
            item.amount = compute_item_amount(item.quantity, item.rate);
        }
        compute_totals(
            &self.items,
            &self.cgst_percent,
            &self.sgst_percent,
            &self.igst_percent,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.customer_name.trim().is_empty() {
            return Err(BillError::Validation("Please enter customer name".into()));
        }
        if bill_number_digits(&self.bill_no).is_none() {
            return Err(BillError::Validation(format!(
                "Bill number '{}' is not numeric",
                self.bill_no
            )));
        }
        if self.items.is_empty() {
            return Err(BillError::Validation("A bill needs at least one item".into()));
        }
        for (index, item) in self.items.iter().enumerate() {
            let position = index + 1;
            if item.description.trim().is_empty() {
                return Err(BillError::Validation(format!(
                    "Please enter a description for item {position}"
                )));
            }
            if item.quantity < 0.0 || item.rate < 0.0 {
                return Err(BillError::Validation(format!(
                    "Quantity and rate of item {position} cannot be negative"
                )));
            }
        }
        Ok(())
    }

    /// Validates the draft and builds the bill with every derived field set.
    pub fn into_bill(mut self, id: String) -> Result<Bill> {
        self.validate()?;
        let totals = self.recompute();
        Ok(Bill {
            id,
            bill_no: self.bill_no,
            date: self.date,
            customer_name: self.customer_name.trim().to_string(),
            customer_address: self.customer_address,
            customer_gstin: self.customer_gstin,
            customer_state: self.customer_state,
            state_code: self.state_code,
            items: self.items,
            net_amount: totals.net_amount,
            cgst_percent: self.cgst_percent,
            cgst_amount: totals.cgst_amount,
            sgst_percent: self.sgst_percent,
            sgst_amount: totals.sgst_amount,
            igst_percent: self.igst_percent,
            igst_amount: totals.igst_amount,
            total_amount: totals.total_amount,
            amount_in_words: totals.amount_in_words,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    fn filled_draft() -> BillDraft {
        let mut draft = BillDraft::new(7, date());
        draft.customer_name = "  Mehta Textiles ".into();
        draft.items[0] = BillItem::new("Dyeing", 10.0, 50.0);
        draft.cgst_percent = "2.5".into();
        draft.sgst_percent = "2.5".into();
        draft
    }

    #[test]
    fn new_draft_has_one_empty_item() {
        let draft = BillDraft::new(3, date());
        assert_eq!(draft.bill_no, "3");
        assert_eq!(draft.items, vec![BillItem::empty()]);
        assert_eq!(draft.cgst_percent, "0");
    }

    #[test]
    fn last_item_cannot_be_removed() {
        let mut draft = BillDraft::new(1, date());
        assert!(!draft.remove_item(0));
        draft.add_item();
        assert!(draft.remove_item(1));
        assert!(!draft.remove_item(5));
        assert_eq!(draft.items.len(), 1);
        assert!(draft.items[0].is_blank());
        assert!(!BillItem::new("", 1.0, 0.0).is_blank());
    }

    #[test]
    fn validation_requires_customer_and_descriptions() {
        let mut draft = filled_draft();
        draft.customer_name = "   ".into();
        let err = draft.clone().into_bill("x".into()).unwrap_err();
        assert!(matches!(err, BillError::Validation(ref m) if m.contains("customer name")));

        let mut draft = filled_draft();
        draft.add_item();
        let err = draft.validate().unwrap_err();
        assert!(err.to_string().contains("item 2"));

        let mut draft = filled_draft();
        draft.items[0].rate = -1.0;
        assert!(draft.validate().is_err());

        let mut draft = filled_draft();
        draft.bill_no = "draft".into();
        assert!(draft.validate().is_err());
    }

    #[test]
    fn into_bill_derives_everything() {
        let mut draft = filled_draft();
        draft.items[0].amount = "1.00".into();
        let bill = draft.into_bill("abc".into()).unwrap();
        assert_eq!(bill.customer_name, "Mehta Textiles");
        assert_eq!(bill.items[0].amount, "500.00");
        assert_eq!(bill.net_amount, "500.00");
        assert_eq!(bill.total_amount, "525.00");
        assert_eq!(bill.amount_in_words, "Five Hundred and Twenty Five Rupees Only");
    }

    #[test]
    fn recompute_repairs_drifted_fields() {
        let mut bill = filled_draft().into_bill("abc".into()).unwrap();
        assert!(!bill.recompute());
        bill.total_amount = "1.00".into();
        bill.items[0].quantity = 2.0;
        assert!(bill.recompute());
        assert_eq!(bill.items[0].amount, "100.00");
        assert_eq!(bill.total_amount, "105.00");
    }

    #[test]
    fn round_trip_through_draft_keeps_inputs() {
        let bill = filled_draft().into_bill("abc".into()).unwrap();
        let again = BillDraft::from_bill(&bill).into_bill("abc".into()).unwrap();
        assert_eq!(bill, again);
    }

    #[test]
    fn serialized_with_camel_case_names() {
        let bill = filled_draft().into_bill("abc".into()).unwrap();
        let json = serde_json::to_value(&bill).unwrap();
        assert_eq!(json["billNo"], "7");
        assert_eq!(json["date"], "2024-04-01");
        assert_eq!(json["customerGstin"], "");
        assert_eq!(json["items"][0]["amount"], "500.00");
        assert_eq!(json["amountInWords"], "Five Hundred and Twenty Five Rupees Only");
    }

    #[test]
    fn collection_update_and_remove_are_no_ops_when_absent() {
        let bill = filled_draft().into_bill("abc".into()).unwrap();
        let mut bills = BillCollection::new();
        let mut ghost = bill.clone();
        ghost.id = "ghost".into();

        bills.add(bill);
        assert!(!bills.update(ghost));
        assert!(!bills.remove("ghost"));
        assert_eq!(bills.len(), 1);
        assert!(bills.remove("abc"));
        assert!(!bills.remove("abc"));
        assert!(bills.is_empty());
    }
}
