//! Quality score.
//!
//! A 0-100 signal built from three independently capped terms:
//! rating (up to 40), log-scaled review count (up to 30) and log-scaled
//! install count (up to 30). Rounded to one decimal place.
//!
//! The `quality_desc` sort evaluates the same formula in SQL.

const RATING_WEIGHT: f64 = 8.0;
const RATING_CAP: f64 = 40.0;
const COUNT_WEIGHT: f64 = 10.0;
const COUNT_CAP: f64 = 30.0;

/// Compute the quality score for an aggregate.
pub fn quality_score(rating: f64, rating_count: i64, installation_count: i64) -> f64 {
    let rating_term = (rating.max(0.0) * RATING_WEIGHT).min(RATING_CAP);
    let review_term = log_term(rating_count);
    let install_term = log_term(installation_count);

    round1(rating_term + review_term + install_term)
}

fn log_term(count: i64) -> f64 {
    let count = count.max(0) as f64;
    ((count + 1.0).log10() * COUNT_WEIGHT).min(COUNT_CAP)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
