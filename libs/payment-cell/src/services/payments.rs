use chrono::{Datelike, NaiveDate, Utc};
use futures::try_join;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::{AppointmentBookingService, AppointmentStatus};
use service_catalog_cell::CatalogService;
use shared_config::{AppConfig, PaymentConfig};
use shared_database::{day_bounds, db_timestamp, Query, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    ConfirmPaymentRequest, FailPaymentRequest, Invoice, Payment, PaymentError, PaymentMethod,
    PaymentMethodInfo, PaymentReceipt, PaymentStatus, ProcessPaymentRequest, RefundPaymentRequest,
    RevenueReport,
};
use crate::services::invoice::{
    available_methods, due_date, invoice_amounts, invoice_status_for, next_invoice_number,
    round_cents, summarize_revenue, validate_transition,
};

pub struct PaymentService {
    supabase: SupabaseClient,
    appointments: AppointmentBookingService,
    catalog: CatalogService,
    config: PaymentConfig,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            appointments: AppointmentBookingService::new(config),
            catalog: CatalogService::new(config),
            config: config.payments.clone(),
        }
    }

    // ==========================================================================
    // PAYMENT CREATION
    // ==========================================================================

    /// Record a payment for an appointment and issue its invoice.
    #[instrument(skip(self, user, request, auth_token), fields(appointment_id = %request.appointment_id))]
    pub async fn process_payment(
        &self,
        user: &User,
        request: ProcessPaymentRequest,
        auth_token: &str,
    ) -> Result<PaymentReceipt, PaymentError> {
        if !(user.is_admin() || user.is_patient()) {
            return Err(PaymentError::Unauthorized);
        }
        let method = self.resolve_method(&request.method)?;

        let appointment = self
            .appointments
            .get_appointment(user, request.appointment_id, auth_token)
            .await?;
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(PaymentError::AppointmentCancelled);
        }

        let (existing, amount) = try_join!(
            self.active_payment_for(appointment.id, auth_token),
            self.amount_due(appointment.service_id, auth_token)
        )?;
        if existing.is_some() {
            return Err(PaymentError::AlreadyPaid);
        }

        let now = Utc::now();
        let status = if method.settles_immediately() {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Pending
        };
        let reference = method
            .reference_prefix()
            .map(|prefix| format!("{}_{}", prefix, Uuid::new_v4().simple()));

        let body = json!({
            "appointment_id": appointment.id,
            "patient_id": appointment.patient_id,
            "amount": amount,
            "currency": self.config.currency,
            "method": method,
            "status": status,
            "transaction_reference": reference,
            "details": request.details.unwrap_or_else(|| json!({})),
            "completed_at": (status == PaymentStatus::Completed).then(|| db_timestamp(now)),
            "created_at": db_timestamp(now),
            "updated_at": db_timestamp(now),
        });

        let payment: Payment = self
            .supabase
            .insert("payments", body, Some(auth_token))
            .await
            .map_err(|e| {
                error!("Failed to record payment for appointment {}: {}", appointment.id, e);
                map_write_error(e)
            })?;

        let invoice = match self.generate_invoice(&payment, auth_token).await {
            Ok(invoice) => invoice,
            Err(e) => {
                // An invoiceless payment would block every retry as already paid.
                self.discard_payment(payment.id, auth_token).await;
                return Err(e);
            }
        };

        info!(
            payment_id = %payment.id,
            invoice_number = %invoice.number,
            amount = payment.amount,
            method = %payment.method,
            status = %payment.status,
            "Payment processed"
        );
        Ok(PaymentReceipt { payment, invoice })
    }

    pub async fn generate_invoice(
        &self,
        payment: &Payment,
        auth_token: &str,
    ) -> Result<Invoice, PaymentError> {
        let issued_on = Utc::now().date_naive();
        let number = self.next_number(issued_on.year(), auth_token).await?;
        let amounts = invoice_amounts(payment.amount, self.config.vat_rate);

        let body = json!({
            "payment_id": payment.id,
            "number": number,
            "issued_on": issued_on,
            "due_on": due_date(issued_on, self.config.invoice_due_days),
            "amount": amounts.amount,
            "vat_rate": self.config.vat_rate,
            "vat_amount": amounts.vat_amount,
            "total_amount": amounts.total_amount,
            "currency": payment.currency,
            "status": invoice_status_for(payment.status),
            "created_at": db_timestamp(Utc::now()),
        });

        let invoice: Invoice = self
            .supabase
            .insert("invoices", body, Some(auth_token))
            .await
            .map_err(|e| {
                error!("Failed to issue invoice {} for payment {}: {}", number, payment.id, e);
                PaymentError::DatabaseError(e.to_string())
            })?;

        debug!("Issued invoice {} for payment {}", invoice.number, payment.id);
        Ok(invoice)
    }

    // ==========================================================================
    // SETTLEMENT
    // ==========================================================================

    pub async fn confirm_payment(
        &self,
        user: &User,
        payment_id: Uuid,
        request: ConfirmPaymentRequest,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        ensure_admin(user)?;
        let payment = self.fetch(payment_id, auth_token).await?;

        let mut update = Map::new();
        update.insert("completed_at".to_string(), json!(db_timestamp(Utc::now())));
        if let Some(reference) = request.transaction_reference.filter(|r| !r.trim().is_empty()) {
            update.insert("transaction_reference".to_string(), json!(reference));
        }

        self.transition(&payment, PaymentStatus::Completed, update, auth_token)
            .await
    }

    pub async fn fail_payment(
        &self,
        user: &User,
        payment_id: Uuid,
        request: FailPaymentRequest,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        ensure_admin(user)?;
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(PaymentError::ValidationError(
                "A failure reason is required".to_string(),
            ));
        }
        let payment = self.fetch(payment_id, auth_token).await?;

        let mut update = Map::new();
        update.insert("failure_reason".to_string(), json!(reason));

        self.transition(&payment, PaymentStatus::Failed, update, auth_token)
            .await
    }

    pub async fn refund_payment(
        &self,
        user: &User,
        payment_id: Uuid,
        request: RefundPaymentRequest,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        ensure_admin(user)?;
        let payment = self.fetch(payment_id, auth_token).await?;

        let mut update = Map::new();
        update.insert("refund_reason".to_string(), json!(request.reason));
        update.insert("refunded_at".to_string(), json!(db_timestamp(Utc::now())));

        self.transition(&payment, PaymentStatus::Refunded, update, auth_token)
            .await
    }

    // ==========================================================================
    // QUERIES
    // ==========================================================================

    pub async fn get_payment(
        &self,
        user: &User,
        payment_id: Uuid,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        let payment = self.fetch(payment_id, auth_token).await?;
        ensure_can_view(user, payment.patient_id)?;
        Ok(payment)
    }

    pub async fn get_invoice(
        &self,
        user: &User,
        payment_id: Uuid,
        auth_token: &str,
    ) -> Result<Invoice, PaymentError> {
        let payment = self.get_payment(user, payment_id, auth_token).await?;

        let path = Query::table("invoices").eq("payment_id", payment.id).build();
        self.supabase
            .select_one::<Invoice>(&path, Some(auth_token))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?
            .ok_or(PaymentError::InvoiceNotFound)
    }

    pub async fn patient_payments(
        &self,
        user: &User,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Payment>, PaymentError> {
        ensure_can_view(user, patient_id)?;

        let path = Query::table("payments")
            .eq("patient_id", patient_id)
            .order("created_at.desc")
            .build();
        self.supabase
            .select(&path, Some(auth_token))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))
    }

    pub fn payment_methods(&self) -> Vec<PaymentMethodInfo> {
        available_methods(&self.config)
    }

    /// Completed payments settled between `from` and `to`, both inclusive.
    pub async fn revenue(
        &self,
        user: &User,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<RevenueReport, PaymentError> {
        ensure_admin(user)?;
        if from > to {
            return Err(PaymentError::ValidationError(
                "'from' must not be after 'to'".to_string(),
            ));
        }

        let (start, end) = day_bounds(from, to)
            .ok_or_else(|| PaymentError::ValidationError("'to' is out of range".to_string()))?;
        let path = Query::table("payments")
            .eq("status", PaymentStatus::Completed)
            .gte("completed_at", db_timestamp(start))
            .lt("completed_at", db_timestamp(end))
            .build();

        let payments: Vec<Payment> = self
            .supabase
            .select(&path, Some(auth_token))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        debug!("Computing revenue over {} payments", payments.len());
        Ok(summarize_revenue(&payments, from, to, &self.config.currency))
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    fn resolve_method(&self, code: &str) -> Result<PaymentMethod, PaymentError> {
        let method = PaymentMethod::parse(code)
            .ok_or_else(|| PaymentError::InvalidMethod(code.to_string()))?;
        if !self.config.is_method_enabled(method.as_str()) {
            return Err(PaymentError::MethodDisabled(method));
        }
        Ok(method)
    }

    async fn fetch(&self, payment_id: Uuid, auth_token: &str) -> Result<Payment, PaymentError> {
        let path = Query::table("payments").eq("id", payment_id).build();
        self.supabase
            .select_one::<Payment>(&path, Some(auth_token))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?
            .ok_or(PaymentError::NotFound)
    }

    /// Any payment that still counts against the appointment.
    async fn active_payment_for(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Payment>, PaymentError> {
        let path = Query::table("payments")
            .eq("appointment_id", appointment_id)
            .neq("status", PaymentStatus::Failed)
            .limit(1)
            .build();
        self.supabase
            .select_one::<Payment>(&path, Some(auth_token))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))
    }

    async fn amount_due(&self, service_id: Option<Uuid>, auth_token: &str) -> Result<f64, PaymentError> {
        match service_id {
            Some(id) => {
                let service = self.catalog.get_service(id, Some(auth_token)).await?;
                Ok(round_cents(service.price))
            }
            None => Ok(0.0),
        }
    }

    async fn next_number(&self, year: i32, auth_token: &str) -> Result<String, PaymentError> {
        let path = Query::table("invoices")
            .gte("number", format!("{}00000", year))
            .lt("number", format!("{}00000", year + 1))
            .order("number.desc")
            .limit(1)
            .build();

        let latest = self
            .supabase
            .select_one::<Invoice>(&path, Some(auth_token))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        next_invoice_number(year, latest.as_ref().map(|i| i.number.as_str()))
    }

    async fn discard_payment(&self, payment_id: Uuid, auth_token: &str) {
        let path = Query::table("payments").eq("id", payment_id).build();
        match self.supabase.delete(&path, Some(auth_token)).await {
            Ok(()) => warn!("Withdrew payment {} after invoicing failed", payment_id),
            Err(e) => error!("Could not withdraw payment {}: {}", payment_id, e),
        }
    }

    async fn transition(
        &self,
        current: &Payment,
        to: PaymentStatus,
        mut update: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        validate_transition(current.status, to)?;
        update.insert("status".to_string(), json!(to));
        update.insert("updated_at".to_string(), json!(db_timestamp(Utc::now())));

        let path = Query::table("payments")
            .eq("id", current.id)
            .eq("status", current.status)
            .build();

        let rows: Vec<Payment> = self
            .supabase
            .update(&path, Value::Object(update), Some(auth_token))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        let payment = rows
            .into_iter()
            .next()
            .ok_or(PaymentError::ConcurrentModification)?;

        info!("Payment {} moved from {} to {}", current.id, current.status, to);
        self.sync_invoice(&payment, auth_token).await?;
        Ok(payment)
    }

    async fn sync_invoice(&self, payment: &Payment, auth_token: &str) -> Result<(), PaymentError> {
        let status = invoice_status_for(payment.status);
        let path = Query::table("invoices").eq("payment_id", payment.id).build();

        let rows: Vec<Invoice> = self
            .supabase
            .update(&path, json!({ "status": status }), Some(auth_token))
            .await
            .map_err(|e| PaymentError::DatabaseError(e.to_string()))?;

        if rows.is_empty() {
            warn!("Payment {} has no invoice to mark {}", payment.id, status);
        }
        Ok(())
    }
}

fn map_write_error(err: anyhow::Error) -> PaymentError {
    let message = err.to_string();
    if message.starts_with("Conflict:") {
        PaymentError::AlreadyPaid
    } else {
        PaymentError::DatabaseError(message)
    }
}

pub fn ensure_admin(user: &User) -> Result<(), PaymentError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(PaymentError::Unauthorized)
    }
}

/// Admins see every payment; patients only their own.
pub fn ensure_can_view(user: &User, patient_id: Uuid) -> Result<(), PaymentError> {
    if user.is_admin() || (user.is_patient() && user.is_user(patient_id)) {
        Ok(())
    } else {
        Err(PaymentError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::TestUser;

    #[test]
    fn only_admins_settle_payments() {
        assert!(ensure_admin(&TestUser::admin("admin@clinic.test").to_user()).is_ok());
        assert_matches!(
            ensure_admin(&TestUser::doctor("grace@clinic.test").to_user()),
            Err(PaymentError::Unauthorized)
        );
    }

    #[test]
    fn patients_see_only_their_own_payments() {
        let patient = TestUser::patient("ada@clinic.test");
        let own = Uuid::parse_str(&patient.id).unwrap();

        assert!(ensure_can_view(&patient.to_user(), own).is_ok());
        assert_matches!(
            ensure_can_view(&patient.to_user(), Uuid::new_v4()),
            Err(PaymentError::Unauthorized)
        );
        assert_matches!(
            ensure_can_view(&TestUser::doctor("grace@clinic.test").to_user(), own),
            Err(PaymentError::Unauthorized)
        );
    }

    #[test]
    fn unique_violations_mean_the_appointment_is_already_paid() {
        assert_matches!(
            map_write_error(anyhow::anyhow!("Conflict: duplicate key value")),
            PaymentError::AlreadyPaid
        );
        assert_matches!(
            map_write_error(anyhow::anyhow!("Database error: 500")),
            PaymentError::DatabaseError(_)
        );
    }
}
