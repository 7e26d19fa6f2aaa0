// workflow/src/billing/mod.rs

pub mod calculator;

pub use calculator::{compute_invoice, InvoiceTotals, PriceBook};
