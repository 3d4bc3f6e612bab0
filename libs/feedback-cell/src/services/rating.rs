use std::collections::BTreeMap;

use crate::models::{
    Feedback, FeedbackError, FeedbackStats, FeedbackType, Review, RATING_MAX, RATING_MIN,
};

pub fn validate_rating(rating: i64) -> Result<(), FeedbackError> {
    if (RATING_MIN..=RATING_MAX).contains(&rating) {
        Ok(())
    } else {
        Err(FeedbackError::InvalidRating(rating))
    }
}

/// Mean rating rounded to one decimal; 0.0 when there is nothing to average.
pub fn average_rating(reviews: &[Review]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let sum: i64 = reviews.iter().map(|r| r.rating).sum();
    let mean = sum as f64 / reviews.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// Every rating from 1 to 5 is present, with zero when unused.
pub fn rating_distribution(reviews: &[Review]) -> BTreeMap<i64, usize> {
    let mut distribution: BTreeMap<i64, usize> =
        (RATING_MIN..=RATING_MAX).map(|rating| (rating, 0)).collect();
    for review in reviews {
        if let Some(count) = distribution.get_mut(&review.rating) {
            *count += 1;
        }
    }
    distribution
}

pub fn count_by_type(feedback: &[Feedback]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = FeedbackType::ALL
        .into_iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();
    for item in feedback {
        *counts.entry(item.feedback_type.as_str().to_string()).or_default() += 1;
    }
    counts
}

pub fn summarize(
    approved: &[Review],
    feedback: &[Feedback],
    recent_feedback: Vec<Feedback>,
) -> FeedbackStats {
    FeedbackStats {
        total_reviews: approved.len(),
        average_rating: average_rating(approved),
        rating_distribution: rating_distribution(approved),
        recent_feedback,
        feedback_by_type: count_by_type(feedback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedbackStatus, ReviewStatus};
    use assert_matches::assert_matches;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn review(rating: i64) -> Review {
        Review {
            id: Uuid::new_v4(),
            appointment_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            rating,
            comment: None,
            is_anonymous: false,
            status: ReviewStatus::Approved,
            moderation_note: None,
            moderated_at: None,
            moderated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn feedback(feedback_type: FeedbackType) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            feedback_type,
            subject: "Parking".to_string(),
            content: "Hard to find a spot".to_string(),
            status: FeedbackStatus::Pending,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ratings_outside_one_to_five_are_rejected() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert_matches!(validate_rating(0), Err(FeedbackError::InvalidRating(0)));
        assert_matches!(validate_rating(6), Err(FeedbackError::InvalidRating(6)));
        assert_matches!(validate_rating(-3), Err(FeedbackError::InvalidRating(-3)));
    }

    #[test]
    fn average_is_rounded_to_one_decimal() {
        let reviews = [review(5), review(4), review(4)];
        assert_eq!(average_rating(&reviews), 4.3);
        assert_eq!(average_rating(&[]), 0.0);
    }

    #[test]
    fn distribution_lists_every_rating() {
        let distribution = rating_distribution(&[review(5), review(5), review(2)]);

        assert_eq!(distribution.len(), 5);
        assert_eq!(distribution[&5], 2);
        assert_eq!(distribution[&2], 1);
        assert_eq!(distribution[&1], 0);
    }

    #[test]
    fn feedback_is_counted_per_type() {
        let counts = count_by_type(&[
            feedback(FeedbackType::Website),
            feedback(FeedbackType::Website),
            feedback(FeedbackType::Doctor),
        ]);

        assert_eq!(counts.len(), FeedbackType::ALL.len());
        assert_eq!(counts["website"], 2);
        assert_eq!(counts["doctor"], 1);
        assert_eq!(counts["general"], 0);
    }

    #[test]
    fn stats_count_only_what_they_are_given() {
        let stats = summarize(&[review(3)], &[], Vec::new());

        assert_eq!(stats.total_reviews, 1);
        assert_eq!(stats.average_rating, 3.0);
        assert!(stats.recent_feedback.is_empty());
        assert!(stats.feedback_by_type.values().all(|count| *count == 0));
    }
}
