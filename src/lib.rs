//! gst-bill: GST bills for a small business, kept in a local JSON file.
//!
//! [`calc`] and [`words`] derive every computed amount, [`model`] holds the
//! bill records and the editable draft, and [`store`] persists the whole
//! collection after each change.

pub mod calc;
pub mod error;
pub mod model;
pub mod render;
pub mod settings;
pub mod store;
pub mod words;

pub use calc::{compute_item_amount, compute_totals, Totals};
pub use error::{BillError, Result};
pub use model::{Bill, BillCollection, BillDraft, BillItem};
pub use store::{BillStore, FileSlot, MemorySlot, SaveOutcome, Slot};
pub use words::number_to_words;
