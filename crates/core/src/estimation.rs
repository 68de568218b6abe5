//! Cost estimation: cache-key fingerprints and the deterministic local
//! fallback formula.
//!
//! Estimates are advisory, not authoritative. When the backend refuses an
//! estimate (rate limiting), the engine degrades to [`local_estimate`]
//! instead of surfacing an error to the UI.

use sha2::{Digest, Sha256};

use crate::request::{ItineraryRequest, STYLE_BUDGET, STYLE_LUXURY};

// ---------------------------------------------------------------------------
// Formula constants
// ---------------------------------------------------------------------------

/// Baseline cost per traveler per day, in the platform currency.
pub const BASE_COST_PER_TRAVELER_DAY: f64 = 120.0;

/// Multiplier applied for the luxury travel style.
pub const LUXURY_MULTIPLIER: f64 = 2.4;
/// Multiplier applied for the budget travel style.
pub const BUDGET_MULTIPLIER: f64 = 0.65;

/// Surcharge per declared interest (each adds activities to plan around).
pub const INTEREST_SURCHARGE: f64 = 0.05;
/// Cap on the cumulative interest surcharge.
pub const MAX_INTEREST_SURCHARGE: f64 = 0.25;

/// How long a cached estimate stays valid. Short enough to keep debounced
/// form typing honest, long enough to ride out a rate-limit window.
pub const ESTIMATE_TTL_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Local fallback formula
// ---------------------------------------------------------------------------

/// Deterministic local approximation of the trip cost.
///
/// `days * travelers * base`, scaled by the profile's travel style and
/// interest count, then clamped to the profile's budget ceiling when one
/// is set.
pub fn local_estimate(request: &ItineraryRequest) -> f64 {
    let days = request.trip_days() as f64;
    let travelers = request.group_size.max(1) as f64;

    let style_multiplier = match request
        .profile
        .as_ref()
        .and_then(|p| p.travel_style.as_deref())
    {
        Some(STYLE_LUXURY) => LUXURY_MULTIPLIER,
        Some(STYLE_BUDGET) => BUDGET_MULTIPLIER,
        _ => 1.0,
    };

    let interest_surcharge = request
        .profile
        .as_ref()
        .map(|p| (p.interests.len() as f64 * INTEREST_SURCHARGE).min(MAX_INTEREST_SURCHARGE))
        .unwrap_or(0.0);

    let raw = days * travelers * BASE_COST_PER_TRAVELER_DAY * style_multiplier
        * (1.0 + interest_surcharge);

    match request.profile.as_ref().and_then(|p| p.budget_ceiling) {
        Some(ceiling) => raw.min(ceiling),
        None => raw,
    }
}

// ---------------------------------------------------------------------------
// Cache key fingerprint
// ---------------------------------------------------------------------------

/// Stable cache key over the estimate-relevant subset of a request.
///
/// Covers destination (case- and whitespace-insensitive), dates, profile
/// id, budget, and group size. Fields that cannot change an estimate
/// (notes, profile interests) are excluded, so requests differing only in
/// those hash identically.
pub fn estimate_fingerprint(request: &ItineraryRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.destination.trim().to_lowercase().as_bytes());
    hasher.update([0x1f]);
    hasher.update(request.start_date.to_string().as_bytes());
    hasher.update([0x1f]);
    hasher.update(request.end_date.to_string().as_bytes());
    hasher.update([0x1f]);
    let profile_id = request.profile.as_ref().map(|p| p.id).unwrap_or(-1);
    hasher.update(profile_id.to_le_bytes());
    hasher.update([0x1f]);
    // Budgets are compared at cent precision; beyond that a difference
    // cannot move an estimate.
    let budget_cents = request.budget.map(|b| (b * 100.0).round() as i64).unwrap_or(-1);
    hasher.update(budget_cents.to_le_bytes());
    hasher.update([0x1f]);
    hasher.update(request.group_size.to_le_bytes());

    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
