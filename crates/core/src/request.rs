//! Request DTOs and submission validation.
//!
//! The orchestrator is handed an [`ItineraryRequest`] whose
//! [`PreferenceProfile`] has already been resolved by the caller; profile
//! loading is deliberately not a concern of the submission path.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::JobError;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Largest travel party a single job may plan for.
pub const MAX_GROUP_SIZE: u32 = 40;

/// Longest trip, in days, a single job may plan.
pub const MAX_TRIP_DAYS: i64 = 60;

// ---------------------------------------------------------------------------
// Travel styles
// ---------------------------------------------------------------------------

/// High-end planning: upscale lodging and dining.
pub const STYLE_LUXURY: &str = "luxury";
/// Cost-conscious planning.
pub const STYLE_BUDGET: &str = "budget";
/// The default middle ground.
pub const STYLE_BALANCED: &str = "balanced";

// ---------------------------------------------------------------------------
// Preference profile
// ---------------------------------------------------------------------------

/// A traveler's saved preferences, resolved by the caller before
/// submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceProfile {
    pub id: i64,
    pub interests: Vec<String>,
    /// One of the `STYLE_*` constants; unrecognized values fall back to
    /// balanced behavior.
    pub travel_style: Option<String>,
    /// Upper bound applied to local cost estimates.
    pub budget_ceiling: Option<f64>,
}

// ---------------------------------------------------------------------------
// Itinerary request
// ---------------------------------------------------------------------------

/// The parameters of one generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryRequest {
    pub destination: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub group_size: u32,
    /// Trip budget as entered for this request, if any.
    pub budget: Option<f64>,
    /// Free-form notes; never part of estimate cache keys.
    pub notes: Option<String>,
    /// Must be pre-resolved; submission fails fast when absent.
    pub profile: Option<PreferenceProfile>,
}

impl ItineraryRequest {
    /// Trip length in days, inclusive of both endpoints. At least 1.
    pub fn trip_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days().max(0) + 1
    }

    /// Full validation for `submit()`.
    ///
    /// Checks the primary target field, date ordering and bounds, the
    /// group size, and that the preference profile has been resolved.
    pub fn validate_for_submit(&self) -> Result<(), JobError> {
        self.validate_fields()?;
        if self.profile.is_none() {
            return Err(JobError::InvalidRequest(
                "preference profile must be resolved before submission".into(),
            ));
        }
        Ok(())
    }

    /// Lighter validation for cost estimates: field checks only, since an
    /// estimate may be requested while the form is still incomplete.
    pub fn validate_fields(&self) -> Result<(), JobError> {
        if self.destination.trim().is_empty() {
            return Err(JobError::InvalidRequest(
                "destination must not be empty".into(),
            ));
        }
        if self.end_date < self.start_date {
            return Err(JobError::InvalidRequest(
                "end date must not precede start date".into(),
            ));
        }
        if self.trip_days() > MAX_TRIP_DAYS {
            return Err(JobError::InvalidRequest(format!(
                "trip length exceeds {MAX_TRIP_DAYS} days"
            )));
        }
        if self.group_size == 0 {
            return Err(JobError::InvalidRequest(
                "group size must be at least 1".into(),
            ));
        }
        if self.group_size > MAX_GROUP_SIZE {
            return Err(JobError::InvalidRequest(format!(
                "group size exceeds {MAX_GROUP_SIZE}"
            )));
        }
        if let Some(budget) = self.budget {
            if budget < 0.0 {
                return Err(JobError::InvalidRequest(
                    "budget must be non-negative".into(),
                ));
            }
        }
        Ok(())
    }

    /// The write-once payload stored on the job record.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> PreferenceProfile {
        PreferenceProfile {
            id: 11,
            interests: vec!["food".into(), "history".into()],
            travel_style: Some(STYLE_BALANCED.into()),
            budget_ceiling: Some(5_000.0),
        }
    }

    fn request() -> ItineraryRequest {
        ItineraryRequest {
            destination: "Rome".into(),
            start_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2030, 1, 5).unwrap(),
            group_size: 2,
            budget: Some(3_000.0),
            notes: None,
            profile: Some(profile()),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate_for_submit().is_ok());
    }

    #[test]
    fn empty_destination_rejected() {
        let mut req = request();
        req.destination = "   ".into();
        assert!(matches!(
            req.validate_for_submit(),
            Err(JobError::InvalidRequest(_))
        ));
    }

    #[test]
    fn missing_profile_rejected() {
        let mut req = request();
        req.profile = None;
        let err = req.validate_for_submit().unwrap_err();
        assert!(matches!(err, JobError::InvalidRequest(msg) if msg.contains("profile")));
    }

    #[test]
    fn missing_profile_allowed_for_estimates() {
        let mut req = request();
        req.profile = None;
        assert!(req.validate_fields().is_ok());
    }

    #[test]
    fn reversed_dates_rejected() {
        let mut req = request();
        req.end_date = NaiveDate::from_ymd_opt(2029, 12, 31).unwrap();
        assert!(req.validate_for_submit().is_err());
    }

    #[test]
    fn same_day_trip_is_one_day() {
        let mut req = request();
        req.end_date = req.start_date;
        assert_eq!(req.trip_days(), 1);
        assert!(req.validate_for_submit().is_ok());
    }

    #[test]
    fn overlong_trip_rejected() {
        let mut req = request();
        req.end_date = req.start_date + chrono::Duration::days(MAX_TRIP_DAYS);
        assert!(req.validate_for_submit().is_err());
    }

    #[test]
    fn zero_group_rejected() {
        let mut req = request();
        req.group_size = 0;
        assert!(req.validate_for_submit().is_err());
    }

    #[test]
    fn oversized_group_rejected() {
        let mut req = request();
        req.group_size = MAX_GROUP_SIZE + 1;
        assert!(req.validate_for_submit().is_err());
    }

    #[test]
    fn negative_budget_rejected() {
        let mut req = request();
        req.budget = Some(-1.0);
        assert!(req.validate_for_submit().is_err());
    }

    #[test]
    fn payload_round_trips() {
        let req = request();
        let payload = req.to_payload();
        let back: ItineraryRequest = serde_json::from_value(payload).unwrap();
        assert_eq!(back, req);
    }
}
