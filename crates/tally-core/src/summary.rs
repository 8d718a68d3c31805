//! Summary statistics over extracted transactions

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{Transaction, TransactionType};

/// Totals for a set of transactions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub transaction_count: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Signed sums per category; uncategorized transactions are excluded
    pub category_totals: BTreeMap<String, f64>,
    /// Sum of credit amounts
    pub total_income: f64,
    /// Sum of debit amounts with the sign flipped, so spending is positive
    pub total_expenses: f64,
    /// `total_income - total_expenses`
    pub net: f64,
}

impl Summary {
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut summary = Self {
            transaction_count: transactions.len(),
            ..Self::default()
        };

        for tx in transactions {
            summary.start_date = Some(summary.start_date.map_or(tx.date, |d| d.min(tx.date)));
            summary.end_date = Some(summary.end_date.map_or(tx.date, |d| d.max(tx.date)));

            if tx.is_categorized() {
                *summary
                    .category_totals
                    .entry(tx.category.clone())
                    .or_insert(0.0) += tx.amount;
            }

            match tx.transaction_type {
                TransactionType::Credit => summary.total_income += tx.amount,
                TransactionType::Debit => summary.total_expenses -= tx.amount,
            }
        }

        summary.net = summary.total_income - summary.total_expenses;
        summary
    }

    /// Number of transactions without a category
    pub fn uncategorized_count(transactions: &[Transaction]) -> usize {
        transactions.iter().filter(|t| !t.is_categorized()).count()
    }
}
