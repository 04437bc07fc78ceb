//! Print layout and display formatting.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use slug::slugify;
use tera::{Context, Tera};
use tracing::debug;

use crate::error::Result;
use crate::model::Bill;
use crate::settings::BusinessProfile;

// Embedded so printing works without any files next to the binary.
const BILL_TEMPLATE: &str = include_str!("../templates/bill.html.tera");

#[derive(Serialize)]
struct PrintLine {
    sno: usize,
    description: String,
    quantity: String,
    rate: String,
    amount: String,
}

#[derive(Serialize)]
struct PrintContext<'a> {
    business: &'a BusinessProfile,
    bill: &'a Bill,
    date: String,
    lines: Vec<PrintLine>,
    net_amount: String,
    cgst_amount: String,
    sgst_amount: String,
    igst_amount: String,
    total_amount: String,
}

impl<'a> PrintContext<'a> {
    fn new(bill: &'a Bill, business: &'a BusinessProfile) -> Self {
        let lines = bill
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| PrintLine {
                sno: index + 1,
                description: item.description.clone(),
                quantity: format_quantity(item.quantity),
                rate: format!("{:.2}", item.rate),
                amount: format_inr(&item.amount),
            })
            .collect();

        PrintContext {
            business,
            bill,
            date: format_date(bill.date),
            lines,
            net_amount: format_inr(&bill.net_amount),
            cgst_amount: format_inr(&bill.cgst_amount),
            sgst_amount: format_inr(&bill.sgst_amount),
            igst_amount: format_inr(&bill.igst_amount),
            total_amount: format_inr(&bill.total_amount),
        }
    }
}

/// Renders the print-ready HTML page for one bill.
pub fn render_bill(bill: &Bill, business: &BusinessProfile) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template("bill.html", BILL_TEMPLATE)?;
    let context = Context::from_serialize(PrintContext::new(bill, business))?;
    Ok(tera.render("bill.html", &context)?)
}

/// e.g. `12_mehta-textiles.html`
pub fn print_file_name(bill: &Bill) -> String {
    let customer = slugify(&bill.customer_name);
    if customer.is_empty() {
        format!("{}.html", bill.bill_no)
    } else {
        format!("{}_{}.html", bill.bill_no, customer)
    }
}

/// Writes the print page under `<root>/output` and returns its path.
pub fn write_print_file(root: &Path, bill: &Bill, business: &BusinessProfile) -> Result<PathBuf> {
    let output_dir = root.join("output");
    fs::create_dir_all(&output_dir)?;
    let path = output_dir.join(print_file_name(bill));
    fs::write(&path, render_bill(bill, business)?)?;
    debug!(path = %path.display(), "print page written");
    Ok(path)
}

/// `dd/mm/yyyy`, as bills are read in India.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Whole quantities without decimals, fractional ones as typed.
pub fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{quantity:.0}")
    } else {
        quantity.to_string()
    }
}

/// Indian digit grouping for a two-decimal amount: `123456.00` becomes
/// `1,23,456.00`. Strings that are not plain numbers are returned unchanged.
pub fn format_inr(amount: &str) -> String {
    let amount = amount.trim();
    let (sign, unsigned) = match amount.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", amount),
    };
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return amount.to_string();
    }

    let mut grouped = String::new();
    let split = whole.len().saturating_sub(3);
    let (head, tail) = whole.split_at(split);
    let head_chars: Vec<char> = head.chars().collect();
    for (index, c) in head_chars.iter().enumerate() {
        grouped.push(*c);
        let remaining = head_chars.len() - index - 1;
        if remaining > 0 && remaining % 2 == 0 {
            grouped.push(',');
        }
    }
    if !head.is_empty() {
        grouped.push(',');
    }
    grouped.push_str(tail);

    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}
