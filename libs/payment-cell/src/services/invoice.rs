use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use shared_config::PaymentConfig;

use crate::models::{
    InvoiceAmounts, InvoiceStatus, Payment, PaymentError, PaymentMethod, PaymentMethodInfo,
    PaymentStatus, RevenueReport,
};

/// Digits of the per-year sequence in an invoice number.
const SEQUENCE_WIDTH: usize = 5;

const SEQUENCE_MAX: u32 = 99_999;

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// VAT is rounded first so that `total_amount == amount + vat_amount` holds in cents.
pub fn invoice_amounts(amount: f64, vat_rate: f64) -> InvoiceAmounts {
    let amount = round_cents(amount);
    let vat_amount = round_cents(amount * vat_rate);

    InvoiceAmounts {
        amount,
        vat_amount,
        total_amount: round_cents(amount + vat_amount),
    }
}

/// `YYYY` followed by a zero-padded sequence continuing `latest` when it
/// belongs to the same year, otherwise starting at 1. Numbers are never
/// reused, so a full year is an error.
pub fn next_invoice_number(year: i32, latest: Option<&str>) -> Result<String, PaymentError> {
    let prefix = year.to_string();
    let sequence = latest
        .filter(|number| number.len() == prefix.len() + SEQUENCE_WIDTH)
        .and_then(|number| number.strip_prefix(prefix.as_str()))
        .and_then(|tail| tail.parse::<u32>().ok())
        .map_or(1, |last| last + 1);

    if sequence > SEQUENCE_MAX {
        return Err(PaymentError::InvoiceSequenceExhausted(year));
    }
    Ok(format!("{}{:0width$}", prefix, sequence, width = SEQUENCE_WIDTH))
}

pub fn due_date(issued_on: NaiveDate, due_days: i64) -> NaiveDate {
    issued_on + Duration::days(due_days)
}

pub fn invoice_status_for(status: PaymentStatus) -> InvoiceStatus {
    match status {
        PaymentStatus::Pending => InvoiceStatus::Pending,
        PaymentStatus::Completed => InvoiceStatus::Paid,
        PaymentStatus::Failed | PaymentStatus::Refunded => InvoiceStatus::Cancelled,
    }
}

pub fn validate_transition(from: PaymentStatus, to: PaymentStatus) -> Result<(), PaymentError> {
    let allowed = matches!(
        (from, to),
        (PaymentStatus::Pending, PaymentStatus::Completed)
            | (PaymentStatus::Pending, PaymentStatus::Failed)
            | (PaymentStatus::Completed, PaymentStatus::Refunded)
    );

    if allowed {
        Ok(())
    } else {
        Err(PaymentError::InvalidStatusTransition { from, to })
    }
}

pub fn available_methods(config: &PaymentConfig) -> Vec<PaymentMethodInfo> {
    PaymentMethod::ALL
        .into_iter()
        .map(|method| PaymentMethodInfo {
            code: method,
            name: method.label().to_string(),
            enabled: config.is_method_enabled(method.as_str()),
            // Gateway fees are charged outside the clinic
            fees: 0.0,
        })
        .collect()
}

pub fn summarize_revenue(
    payments: &[Payment],
    from: NaiveDate,
    to: NaiveDate,
    currency: &str,
) -> RevenueReport {
    let completed: Vec<&Payment> = payments
        .iter()
        .filter(|p| p.status == PaymentStatus::Completed)
        .collect();

    let mut by_method: BTreeMap<String, f64> = BTreeMap::new();
    for payment in &completed {
        *by_method.entry(payment.method.to_string()).or_insert(0.0) += payment.amount;
    }
    for total in by_method.values_mut() {
        *total = round_cents(*total);
    }

    RevenueReport {
        from,
        to,
        currency: currency.to_string(),
        total: round_cents(completed.iter().map(|p| p.amount).sum()),
        payment_count: completed.len(),
        by_method,
    }
}
