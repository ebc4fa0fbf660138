//! Reward scoring for a single rollout.
//!
//! The score rewards structural conformance of the model output: which
//! sections are present, whether deposits were extracted, and whether the
//! income calculation reached a monthly average. Values are not compared
//! against the expected output.

use crate::analysis::{DEPOSITS, MONTHLY_AVERAGE_NET_DEPOSITS, QUALIFIED_INCOME_CALCULATION, REQUIRED_SECTIONS};
use serde_json::Value;

/// Reward for an errored output
pub const ERROR_REWARD: f64 = -1.0;
/// Credit per top-level section present
pub const SECTION_CREDIT: f64 = 0.5;
/// Credit for a non-empty deposits list
pub const DEPOSITS_CREDIT: f64 = 1.0;
/// Credit for a monthly average inside the income calculation
pub const INCOME_CREDIT: f64 = 1.0;
/// Normalization denominator: the largest total the credits above can reach
pub const MAX_REWARD: f64 = 4.5;

/// Score a result mapping. Returns -1.0 for error outputs, otherwise [0, 1].
pub fn calculate_reward(result: &Value, _expected: &Value) -> f64 {
    let Some(fields) = result.as_object() else {
        return 0.0;
    };

    if fields.contains_key("error") {
        return ERROR_REWARD;
    }

    let mut reward = REQUIRED_SECTIONS
        .iter()
        .filter(|section| fields.contains_key(**section))
        .count() as f64
        * SECTION_CREDIT;

    if fields
        .get(DEPOSITS)
        .and_then(Value::as_array)
        .is_some_and(|deposits| !deposits.is_empty())
    {
        reward += DEPOSITS_CREDIT;
    }

    if fields
        .get(QUALIFIED_INCOME_CALCULATION)
        .and_then(Value::as_object)
        .is_some_and(|income| income.contains_key(MONTHLY_AVERAGE_NET_DEPOSITS))
    {
        reward += INCOME_CREDIT;
    }

    (reward / MAX_REWARD).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expected() -> Value {
        json!({})
    }

    #[test]
    fn test_error_key_is_minus_one() {
        assert_eq!(calculate_reward(&json!({"error": "x"}), &expected()), -1.0);
        assert_eq!(
            calculate_reward(
                &json!({"error": null, "analysisSummary": {}, "deposits": [1]}),
                &expected()
            ),
            -1.0
        );
    }

    #[test]
    fn test_complete_result_is_one() {
        let result = json!({
            "analysisSummary": {},
            "qualifiedIncomeCalculation": {"monthlyAverageNetDeposits": 1234.5},
            "deposits": [{"amount": 10.0}],
            "timePeriodAggregates": {},
            "risk": []
        });
        assert_eq!(calculate_reward(&result, &expected()), 1.0);
    }

    #[test]
    fn test_empty_result_is_zero() {
        assert_eq!(calculate_reward(&json!({}), &expected()), 0.0);
        assert_eq!(calculate_reward(&json!({"other": 1}), &expected()), 0.0);
    }

    #[test]
    fn test_partial_credit() {
        let section_only = SECTION_CREDIT / MAX_REWARD;

        // Five sections, empty deposits, no monthly average
        let result = json!({
            "analysisSummary": {},
            "qualifiedIncomeCalculation": {},
            "deposits": [],
            "timePeriodAggregates": {},
            "risk": []
        });
        assert!((calculate_reward(&result, &expected()) - 2.5 / 4.5).abs() < 1e-12);

        // deposits present but not a list gets section credit only
        let result = json!({"deposits": "none"});
        assert!((calculate_reward(&result, &expected()) - section_only).abs() < 1e-12);

        // income section that is not an object earns no nested credit
        let result = json!({"qualifiedIncomeCalculation": "monthlyAverageNetDeposits"});
        assert!((calculate_reward(&result, &expected()) - section_only).abs() < 1e-12);
    }

    #[test]
    fn test_full_typed_analysis_scores_one() {
        let value = crate::analysis::tests::full_analysis_json();
        assert_eq!(calculate_reward(&value, &expected()), 1.0);
    }

    #[test]
    fn test_reward_is_bounded() {
        let samples = [
            json!(null),
            json!([1, 2, 3]),
            json!("text"),
            json!({"deposits": [1, 2]}),
            json!({"raw_output": "x", "error": "Failed to parse as JSON"}),
            crate::analysis::tests::full_analysis_json(),
        ];
        for sample in samples {
            let reward = calculate_reward(&sample, &expected());
            assert!((-1.0..=1.0).contains(&reward), "{sample} -> {reward}");
        }
    }
}
