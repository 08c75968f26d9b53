//! Progress bar arithmetic.

use crate::backend::OnboardingStatus;

/// Share of `value` in `max` as a percentage clamped to `[0, 100]`.
///
/// A non-positive `max` yields `0`.
#[must_use]
pub fn percentage(value: f64, max: f64) -> f64 {
    if max > 0.0 {
        let ratio = (value / max) * 100.0;
        if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 100.0)
        }
    } else {
        0.0
    }
}

/// Whole-number label for a progress bar, e.g. `"50%"`.
#[must_use]
pub fn label(percent: f64) -> String {
    format!("{}%", percent.round())
}

/// Onboarding progress shown on the dashboard and onboarding pages.
#[must_use]
pub fn onboarding(status: Option<OnboardingStatus>) -> f64 {
    match status {
        Some(OnboardingStatus::Completed) => 100.0,
        Some(OnboardingStatus::InProgress) => 50.0,
        Some(OnboardingStatus::New) | None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_is_zero() {
        assert!(percentage(5.0, 0.0).abs() < f64::EPSILON);
        assert!(percentage(0.0, 0.0).abs() < f64::EPSILON);
        assert!(percentage(-3.0, 0.0).abs() < f64::EPSILON);
        assert!(percentage(3.0, -1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clamps_to_bounds() {
        let cases = [
            (0.0, 10.0, 0.0),
            (5.0, 10.0, 50.0),
            (10.0, 10.0, 100.0),
            (25.0, 10.0, 100.0),
            (-4.0, 10.0, 0.0),
            (1.0, 3.0, 100.0 / 3.0),
        ];
        for (value, max, expected) in cases {
            let got = percentage(value, max);
            assert!(
                (got - expected).abs() < 1e-9,
                "percentage({value}, {max}) = {got}, expected {expected}"
            );
            assert!((0.0..=100.0).contains(&got));
        }
    }

    #[test]
    fn nan_value_is_zero() {
        assert!(percentage(f64::NAN, 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn label_rounds() {
        assert_eq!(label(100.0 / 3.0), "33%");
        assert_eq!(label(50.0), "50%");
        assert_eq!(label(0.0), "0%");
    }

    #[test]
    fn onboarding_steps() {
        assert!(onboarding(None).abs() < f64::EPSILON);
        assert!(onboarding(Some(OnboardingStatus::New)).abs() < f64::EPSILON);
        assert!((onboarding(Some(OnboardingStatus::InProgress)) - 50.0).abs() < f64::EPSILON);
        assert!((onboarding(Some(OnboardingStatus::Completed)) - 100.0).abs() < f64::EPSILON);
    }
}
