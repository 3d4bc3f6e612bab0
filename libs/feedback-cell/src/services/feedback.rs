use chrono::Utc;
use futures::try_join;
use serde_json::json;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use appointment_cell::{AppointmentBookingService, AppointmentStatus};
use shared_config::AppConfig;
use shared_database::{day_bounds, db_timestamp, Query, SupabaseClient};
use shared_models::auth::User;

use crate::models::{
    DoctorReviewQuery, Feedback, FeedbackError, FeedbackStats, FeedbackStatus, FeedbackType,
    ModerateReviewRequest, PublishedReview, Review, ReviewStatus, SubmitFeedbackRequest,
    SubmitReviewRequest,
};
use crate::services::rating::{summarize, validate_rating};

/// Pending feedback shown on the stats overview.
const RECENT_FEEDBACK_LIMIT: i64 = 10;

pub struct FeedbackService {
    supabase: SupabaseClient,
    appointments: AppointmentBookingService,
}

impl FeedbackService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            appointments: AppointmentBookingService::new(config),
        }
    }

    // ==========================================================================
    // REVIEWS
    // ==========================================================================

    /// A patient rates one of their completed appointments. The review waits
    /// for moderation before it is published.
    #[instrument(skip(self, user, request, auth_token), fields(appointment_id = %request.appointment_id))]
    pub async fn submit_review(
        &self,
        user: &User,
        request: SubmitReviewRequest,
        auth_token: &str,
    ) -> Result<Review, FeedbackError> {
        validate_rating(request.rating)?;

        let appointment = self
            .appointments
            .get_appointment(user, request.appointment_id, auth_token)
            .await?;
        if !(user.is_patient() && user.is_user(appointment.patient_id)) {
            return Err(FeedbackError::NotYourAppointment);
        }
        if appointment.status != AppointmentStatus::Completed {
            return Err(FeedbackError::AppointmentNotCompleted);
        }

        let existing = Query::table("reviews")
            .eq("appointment_id", appointment.id)
            .limit(1)
            .build();
        let previous: Option<Review> = self
            .supabase
            .select_one(&existing, Some(auth_token))
            .await
            .map_err(|e| FeedbackError::DatabaseError(e.to_string()))?;
        if previous.is_some() {
            return Err(FeedbackError::AlreadyReviewed);
        }

        let now = db_timestamp(Utc::now());
        let comment = request
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let body = json!({
            "appointment_id": appointment.id,
            "patient_id": appointment.patient_id,
            "doctor_id": appointment.doctor_id,
            "rating": request.rating,
            "comment": comment,
            "is_anonymous": request.anonymous,
            "status": ReviewStatus::Pending,
            "created_at": now,
            "updated_at": now,
        });

        let review: Review = self
            .supabase
            .insert("reviews", body, Some(auth_token))
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.starts_with("Conflict:") {
                    FeedbackError::AlreadyReviewed
                } else {
                    error!("Failed to store review for appointment {}: {}", appointment.id, message);
                    FeedbackError::DatabaseError(message)
                }
            })?;

        info!(
            review_id = %review.id,
            doctor_id = %review.doctor_id,
            rating = review.rating,
            "Review submitted, awaiting moderation"
        );
        Ok(review)
    }

    #[instrument(skip(self, user, request, auth_token), fields(moderator = %user.id))]
    pub async fn moderate_review(
        &self,
        user: &User,
        review_id: Uuid,
        request: ModerateReviewRequest,
        auth_token: &str,
    ) -> Result<Review, FeedbackError> {
        ensure_admin(user)?;
        let verdict = ReviewStatus::parse_verdict(&request.status)
            .ok_or_else(|| FeedbackError::InvalidReviewStatus(request.status.clone()))?;
        let current = self.fetch_review(review_id, auth_token).await?;

        let now = db_timestamp(Utc::now());
        let path = Query::table("reviews")
            .eq("id", current.id)
            .eq("status", current.status)
            .build();
        let update = json!({
            "status": verdict,
            "moderation_note": request.note.filter(|n| !n.trim().is_empty()),
            "moderated_at": now,
            "moderated_by": user.id,
            "updated_at": now,
        });

        let rows: Vec<Review> = self
            .supabase
            .update(&path, update, Some(auth_token))
            .await
            .map_err(|e| FeedbackError::DatabaseError(e.to_string()))?;
        let review = rows
            .into_iter()
            .next()
            .ok_or(FeedbackError::ConcurrentModification)?;

        info!(
            review_id = %review.id,
            patient_id = %review.patient_id,
            from = %current.status,
            to = %review.status,
            "Review moderated"
        );
        Ok(review)
    }

    /// Approved reviews of a doctor, newest first.
    pub async fn doctor_reviews(
        &self,
        doctor_id: Uuid,
        query: DoctorReviewQuery,
    ) -> Result<Vec<PublishedReview>, FeedbackError> {
        let mut filter = Query::table("reviews")
            .eq("doctor_id", doctor_id)
            .eq("status", ReviewStatus::Approved);

        if let Some(rating) = query.rating {
            validate_rating(rating)?;
            filter = filter.eq("rating", rating);
        }
        if let Some(from) = query.from {
            let (start, _) = day_bounds(from, from)
                .ok_or_else(|| FeedbackError::ValidationError("'from' is out of range".to_string()))?;
            filter = filter.gte("created_at", db_timestamp(start));
        }
        if let Some(to) = query.to {
            let (_, end) = day_bounds(to, to)
                .ok_or_else(|| FeedbackError::ValidationError("'to' is out of range".to_string()))?;
            filter = filter.lt("created_at", db_timestamp(end));
        }
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(FeedbackError::ValidationError(
                    "'from' must not be after 'to'".to_string(),
                ));
            }
        }

        let reviews: Vec<Review> = self
            .supabase
            .select(&filter.order("created_at.desc").build(), None)
            .await
            .map_err(|e| FeedbackError::DatabaseError(e.to_string()))?;

        Ok(reviews.into_iter().map(PublishedReview::from).collect())
    }

    pub async fn patient_reviews(
        &self,
        user: &User,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Review>, FeedbackError> {
        if !(user.is_admin() || (user.is_patient() && user.is_user(patient_id))) {
            return Err(FeedbackError::Unauthorized);
        }

        let path = Query::table("reviews")
            .eq("patient_id", patient_id)
            .order("created_at.desc")
            .build();
        self.supabase
            .select(&path, Some(auth_token))
            .await
            .map_err(|e| FeedbackError::DatabaseError(e.to_string()))
    }

    /// The moderation queue, oldest first.
    pub async fn pending_reviews(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Review>, FeedbackError> {
        ensure_admin(user)?;

        let path = Query::table("reviews")
            .eq("status", ReviewStatus::Pending)
            .order("created_at.asc")
            .build();
        self.supabase
            .select(&path, Some(auth_token))
            .await
            .map_err(|e| FeedbackError::DatabaseError(e.to_string()))
    }

    // ==========================================================================
    // GENERAL FEEDBACK
    // ==========================================================================

    #[instrument(skip(self, user, request, auth_token), fields(user_id = %user.id))]
    pub async fn submit_feedback(
        &self,
        user: &User,
        request: SubmitFeedbackRequest,
        auth_token: &str,
    ) -> Result<Feedback, FeedbackError> {
        let feedback_type = FeedbackType::parse(&request.feedback_type)
            .ok_or_else(|| FeedbackError::InvalidFeedbackType(request.feedback_type.clone()))?;
        let subject = request.subject.trim();
        let content = request.content.trim();
        if subject.is_empty() || content.is_empty() {
            return Err(FeedbackError::ValidationError(
                "Subject and content are required".to_string(),
            ));
        }

        let body = json!({
            "user_id": user.id,
            "type": feedback_type,
            "subject": subject,
            "content": content,
            "status": FeedbackStatus::Pending,
            "metadata": request.metadata.unwrap_or_else(|| json!({})),
            "created_at": db_timestamp(Utc::now()),
        });

        let feedback: Feedback = self
            .supabase
            .insert("feedback", body, Some(auth_token))
            .await
            .map_err(|e| {
                error!("Failed to store {} feedback: {}", feedback_type, e);
                FeedbackError::DatabaseError(e.to_string())
            })?;

        info!(
            feedback_id = %feedback.id,
            feedback_type = %feedback.feedback_type,
            "Feedback submitted"
        );
        Ok(feedback)
    }

    pub async fn feedback_stats(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<FeedbackStats, FeedbackError> {
        ensure_admin(user)?;

        let approved = Query::table("reviews")
            .eq("status", ReviewStatus::Approved)
            .build();
        let all_feedback = Query::table("feedback").build();
        let recent = Query::table("feedback")
            .eq("status", FeedbackStatus::Pending)
            .order("created_at.desc")
            .limit(RECENT_FEEDBACK_LIMIT)
            .build();

        let (reviews, feedback, recent_feedback) = try_join!(
            self.select::<Review>(&approved, auth_token),
            self.select::<Feedback>(&all_feedback, auth_token),
            self.select::<Feedback>(&recent, auth_token)
        )?;

        debug!(
            "Summarizing {} approved reviews and {} feedback entries",
            reviews.len(),
            feedback.len()
        );
        Ok(summarize(&reviews, &feedback, recent_feedback))
    }

    // ==========================================================================
    // HELPERS
    // ==========================================================================

    async fn fetch_review(&self, review_id: Uuid, auth_token: &str) -> Result<Review, FeedbackError> {
        let path = Query::table("reviews").eq("id", review_id).build();
        self.supabase
            .select_one::<Review>(&path, Some(auth_token))
            .await
            .map_err(|e| FeedbackError::DatabaseError(e.to_string()))?
            .ok_or(FeedbackError::ReviewNotFound)
    }

    async fn select<T>(&self, path: &str, auth_token: &str) -> Result<Vec<T>, FeedbackError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.supabase
            .select(path, Some(auth_token))
            .await
            .map_err(|e| FeedbackError::DatabaseError(e.to_string()))
    }
}

pub fn ensure_admin(user: &User) -> Result<(), FeedbackError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(FeedbackError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::TestUser;

    #[test]
    fn only_admins_moderate() {
        assert!(ensure_admin(&TestUser::admin("admin@clinic.test").to_user()).is_ok());
        assert_matches!(
            ensure_admin(&TestUser::doctor("grace@clinic.test").to_user()),
            Err(FeedbackError::Unauthorized)
        );
    }

    #[test]
    fn pending_is_not_a_verdict() {
        assert_eq!(ReviewStatus::parse_verdict("approved"), Some(ReviewStatus::Approved));
        assert_eq!(ReviewStatus::parse_verdict("rejected"), Some(ReviewStatus::Rejected));
        assert_eq!(ReviewStatus::parse_verdict("pending"), None);
    }
}
