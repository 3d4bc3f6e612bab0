use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use appointment_cell::AppointmentError;
use service_catalog_cell::CatalogError;
use shared_models::error::AppError;

// ==============================================================================
// PAYMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Card,
        PaymentMethod::BankTransfer,
        PaymentMethod::Cash,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentMethod::Card => "Card",
            PaymentMethod::BankTransfer => "Bank transfer",
            PaymentMethod::Cash => "Cash",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == code)
    }

    /// Only cash is settled at the desk; other methods wait for the gateway.
    pub fn settles_immediately(self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }

    pub fn reference_prefix(self) -> Option<&'static str> {
        match self {
            PaymentMethod::Card => None,
            PaymentMethod::BankTransfer => Some("BT"),
            PaymentMethod::Cash => Some("CASH"),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_reference: Option<String>,
    #[serde(default)]
    pub details: Value,
    pub failure_reason: Option<String>,
    pub refund_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// INVOICES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Cancelled,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub number: String,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
    pub amount: f64,
    pub vat_rate: f64,
    pub vat_amount: f64,
    pub total_amount: f64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
}

/// Net amount, VAT and gross total of an invoice, in currency units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvoiceAmounts {
    pub amount: f64,
    pub vat_amount: f64,
    pub total_amount: f64,
}

// ==============================================================================
// REQUESTS AND REPORTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessPaymentRequest {
    pub appointment_id: Uuid,
    pub method: String,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub transaction_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailPaymentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundPaymentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevenueQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// A freshly created payment and the invoice issued for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub invoice: Invoice,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentMethodInfo {
    pub code: PaymentMethod,
    pub name: String,
    pub enabled: bool,
    pub fees: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub currency: String,
    pub total: f64,
    pub payment_count: usize,
    pub by_method: BTreeMap<String, f64>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment not found")]
    NotFound,

    #[error("Invoice not found")]
    InvoiceNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Invalid payment method '{0}'. Allowed methods: card, bank_transfer, cash")]
    InvalidMethod(String),

    #[error("Payment method {0} is currently disabled")]
    MethodDisabled(PaymentMethod),

    #[error("Cancelled appointments cannot be paid")]
    AppointmentCancelled,

    #[error("This appointment already has a payment")]
    AlreadyPaid,

    #[error("Cannot change payment from {from} to {to}")]
    InvalidStatusTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Payment was modified concurrently, please retry")]
    ConcurrentModification,

    #[error("Invoice numbers for {0} are exhausted")]
    InvoiceSequenceExhausted(i32),

    #[error("You do not have permission to access this payment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for PaymentError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => PaymentError::AppointmentNotFound,
            AppointmentError::Unauthorized => PaymentError::Unauthorized,
            other => PaymentError::DatabaseError(other.to_string()),
        }
    }
}

impl From<CatalogError> for PaymentError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::DatabaseError(msg) => PaymentError::DatabaseError(msg),
            other => PaymentError::ValidationError(other.to_string()),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotFound
            | PaymentError::InvoiceNotFound
            | PaymentError::AppointmentNotFound => AppError::NotFound(err.to_string()),
            PaymentError::AlreadyPaid | PaymentError::ConcurrentModification => {
                AppError::Conflict(err.to_string())
            }
            PaymentError::Unauthorized => AppError::Forbidden(err.to_string()),
            PaymentError::ValidationError(msg) => AppError::ValidationError(msg),
            PaymentError::DatabaseError(msg) => AppError::Database(msg),
            PaymentError::InvoiceSequenceExhausted(_) => AppError::Internal(err.to_string()),
            _ => AppError::BadRequest(err.to_string()),
        }
    }
}
