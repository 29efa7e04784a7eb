//! Policy interpretation strategy
//!
//! Natural-language moderation policies can be converted into structured,
//! independently validated rules by a pluggable interpreter. The decision
//! engine never depends on this path; rules are advisory configuration for
//! operators. The interpreter ships disabled by default.

use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Approve,
    Reject,
    Review,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Minor,
    Adult,
    All,
}

/// A structured, executable policy rule
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    #[validate(length(min = 1, message = "rule name must not be empty"))]
    pub name: String,
    /// Human-readable condition, e.g. "nsfw_score > 0.7"
    #[validate(length(min = 1, message = "rule condition must not be empty"))]
    pub condition: String,
    pub action: PolicyAction,
    #[validate(range(min = 0.0, max = 1.0, message = "threshold must be within [0, 1]"))]
    pub threshold: Option<f64>,
    pub region: Option<String>,
    pub age_group: Option<AgeGroup>,
}

/// Natural-language policy input
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NaturalLanguagePolicy {
    #[validate(length(min = 1, message = "policy text must not be empty"))]
    pub policy_text: String,
    pub region: Option<String>,
    pub context: Option<String>,
}

/// Interpreter output: rules plus a prose explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpretedPolicy {
    pub rules: Vec<PolicyRule>,
    pub explanation: String,
}

impl InterpretedPolicy {
    /// Re-validate every produced rule; interpreter output is never trusted
    /// structurally.
    pub fn validate_rules(&self) -> Result<(), AppError> {
        for rule in &self.rules {
            rule.validate()
                .map_err(|e| AppError::Validation(format!("rule '{}': {}", rule.name, e)))?;
        }
        Ok(())
    }
}

/// Strategy seam for the natural-language interpreter
#[async_trait]
pub trait PolicyInterpreter: Send + Sync {
    async fn interpret(&self, policy: NaturalLanguagePolicy) -> Result<InterpretedPolicy, AppError>;
}

/// Default implementation when no interpreter is deployed
pub struct DisabledInterpreter;

#[async_trait]
impl PolicyInterpreter for DisabledInterpreter {
    async fn interpret(
        &self,
        _policy: NaturalLanguagePolicy,
    ) -> Result<InterpretedPolicy, AppError> {
        Err(AppError::Disabled(
            "Policy interpretation features are disabled".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(threshold: Option<f64>) -> PolicyRule {
        PolicyRule {
            name: "no-gore".to_string(),
            condition: "violence_score > 0.7".to_string(),
            action: PolicyAction::Reject,
            threshold,
            region: None,
            age_group: Some(AgeGroup::All),
        }
    }

    #[test]
    fn test_valid_rule_passes() {
        assert!(rule(Some(0.7)).validate().is_ok());
        assert!(rule(None).validate().is_ok());
    }

    #[test]
    fn test_out_of_range_threshold_fails() {
        assert!(rule(Some(1.5)).validate().is_err());
        assert!(rule(Some(-0.1)).validate().is_err());
    }

    #[test]
    fn test_interpreted_policy_revalidates() {
        let policy = InterpretedPolicy {
            rules: vec![rule(Some(0.5)), rule(Some(2.0))],
            explanation: "test".to_string(),
        };
        assert!(policy.validate_rules().is_err());
    }

    #[tokio::test]
    async fn test_disabled_interpreter_refuses() {
        let interpreter = DisabledInterpreter;
        let err = interpreter
            .interpret(NaturalLanguagePolicy {
                policy_text: "no weapons for minors".to_string(),
                region: None,
                context: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Disabled(_)));
    }
}
