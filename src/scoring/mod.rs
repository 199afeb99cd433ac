//! Weighted Security Scoring
//!
//! Combines per-category results into a single 0-100 score and a
//! four-level verdict.
//!
//! # Scoring Formula
//!
//! ```text
//! Overall = round_half_up( Σ score_c × w_c / Σ w_c )   over present categories
//!
//! Weights (percent):
//!   tool poisoning   35
//!   dependencies     25
//!   static analysis  20
//!   container        10
//!   documentation    10
//! ```
//!
//! Categories that were not evaluated at all are left out of both sums, so
//! the remaining weights are renormalized. Not-applicable results still
//! count with the neutral score they carry.
//!
//! # Verdict Thresholds
//!
//! - `>= 85` verified-secure
//! - `>= 70` conditional
//! - `>= 50` under-review
//! - otherwise not-recommended

mod weighted;

pub use weighted::{
    calculate, recommendations, status_for_score, weight_of, Contribution, ScoreBreakdown,
    CATEGORY_WEIGHTS, STATUS_THRESHOLDS,
};
