//! Amount in words, Indian numbering (lakh / thousand / hundred).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::calc::round_money;

const ONES: [&str; 20] = [
    "", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten", "Eleven",
    "Twelve", "Thirteen", "Fourteen", "Fifteen", "Sixteen", "Seventeen", "Eighteen", "Nineteen",
];

const TENS: [&str; 10] = [
    "", "", "Twenty", "Thirty", "Forty", "Fifty", "Sixty", "Seventy", "Eighty", "Ninety",
];

const LAKH: u128 = 100_000;
const THOUSAND: u128 = 1_000;

/// Spells out an amount, e.g. `1234.5` becomes
/// `"One Thousand Two Hundred and Thirty Four and 50/100"`.
///
/// Paise are appended as `and N/100` only when they round to something
/// nonzero. A zero whole part reads "Zero".
pub fn number_to_words(amount: Decimal) -> String {
    let amount = round_money(amount);
    let negative = amount.is_sign_negative();
    let amount = amount.abs();

    let whole = amount.trunc();
    let paise = ((amount - whole) * Decimal::ONE_HUNDRED)
        .round()
        .to_u32()
        .unwrap_or(0);
    let whole = whole.to_u128().unwrap_or(0);

    let mut words = if whole == 0 {
        "Zero".to_string()
    } else {
        whole_words(whole)
    };
    if paise > 0 {
        words.push_str(&format!(" and {paise}/100"));
    }
    if negative {
        words.insert_str(0, "Minus ");
    }
    words
}

fn whole_words(mut n: u128) -> String {
    let mut segments: Vec<String> = Vec::new();

    if n >= LAKH {
        // counts of 100 lakh and up are spelled with the same rules
        segments.push(format!("{} Lakh", whole_words(n / LAKH)));
        n %= LAKH;
    }
    if n >= THOUSAND {
        segments.push(format!("{} Thousand", below_hundred(n / THOUSAND)));
        n %= THOUSAND;
    }
    if n >= 100 {
        segments.push(format!("{} Hundred", ONES[(n / 100) as usize]));
        n %= 100;
    }
    if n > 0 {
        if !segments.is_empty() {
            segments.push("and".to_string());
        }
        segments.push(below_hundred(n));
    }

    segments.join(" ")
}

fn below_hundred(n: u128) -> String {
    let n = n as usize;
    if n < 20 {
        return ONES[n].to_string();
    }
    match n % 10 {
        0 => TENS[n / 10].to_string(),
        unit => format!("{} {}", TENS[n / 10], ONES[unit]),
    }
}
