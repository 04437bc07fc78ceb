//! Money arithmetic for bills.
//!
//! Everything here is pure. Quantities and rates arrive as `f64` (that is how
//! they are stored and typed in), percentages arrive as the raw text the user
//! entered, and every monetary result leaves as a two-decimal string.

use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::BillItem;
use crate::words::number_to_words;

/// Derived monetary fields of a bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Totals {
    pub net_amount: String,
    pub cgst_amount: String,
    pub sgst_amount: String,
    pub igst_amount: String,
    pub total_amount: String,
    pub amount_in_words: String,
}

impl Default for Totals {
    fn default() -> Self {
        compute_totals(&[], "0", "0", "0")
    }
}

/// Rounds to paise, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        // -0.001 would otherwise print as "-0.00"
        rounded = Decimal::ZERO;
    }
    rounded
}

/// Two-decimal string used for every monetary field.
pub fn money(value: Decimal) -> String {
    let mut rounded = round_money(value);
    rounded.rescale(2);
    rounded.to_string()
}

/// Converts a stored quantity or rate; NaN and infinities count as zero.
pub fn to_decimal(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Lenient number parsing for typed-in quantities and rates.
pub fn parse_number(text: &str) -> f64 {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

/// Parses a tax percentage. Empty or non-numeric input is zero.
pub fn parse_percent(text: &str) -> Decimal {
    let trimmed = text.trim().trim_end_matches('%').trim_end();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .unwrap_or(Decimal::ZERO)
}

fn line_value(quantity: f64, rate: f64) -> Decimal {
    to_decimal(quantity)
        .checked_mul(to_decimal(rate))
        .unwrap_or_else(|| {
            tracing::warn!(quantity, rate, "line amount overflowed, using zero");
            Decimal::ZERO
        })
}

fn tax_on(net: Decimal, percent: &str) -> Decimal {
    net.checked_mul(parse_percent(percent))
        .map(|v| v / Decimal::ONE_HUNDRED)
        .map(round_money)
        .unwrap_or(Decimal::ZERO)
}

pub fn compute_item_amount(quantity: f64, rate: f64) -> String {
    money(line_value(quantity, rate))
}

/// Derives every computed field of a bill from its items and tax rates.
///
/// The net amount is rebuilt from each item's quantity and rate; the
/// item's stored `amount` string is not read. Each tax is rounded to paise
/// before the total is summed, so the printed total always equals the sum of
/// the printed components.
pub fn compute_totals(
    items: &[BillItem],
    cgst_percent: &str,
    sgst_percent: &str,
    igst_percent: &str,
) -> Totals {
    let net_exact = items
        .iter()
        .map(|item| line_value(item.quantity, item.rate))
        .fold(Decimal::ZERO, |acc, v| acc.checked_add(v).unwrap_or(acc));

    let net = round_money(net_exact);
    let cgst = tax_on(net_exact, cgst_percent);
    let sgst = tax_on(net_exact, sgst_percent);
    let igst = tax_on(net_exact, igst_percent);
    let total = net + cgst + sgst + igst;

    Totals {
        net_amount: money(net),
        cgst_amount: money(cgst),
        sgst_amount: money(sgst),
        igst_amount: money(igst),
        total_amount: money(total),
        amount_in_words: format!("{} Rupees Only", number_to_words(total)),
    }
}
