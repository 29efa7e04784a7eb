//! Policy Routes
//!
//! Boundary for the pluggable policy-interpretation strategy. Structural
//! validation is independent of whichever interpreter is deployed; the
//! decision engine itself never reads interpreted policies.

use crate::error::{validation_error, ApiResult};
use crate::models::SuccessResponse;
use crate::policy::{InterpretedPolicy, NaturalLanguagePolicy, PolicyRule};
use crate::state::SharedState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePolicyRequest {
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePolicyResponse {
    pub valid: bool,
    pub rule_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpretPolicyResponse {
    pub policy: InterpretedPolicy,
}

/// Structurally validate a set of policy rules
pub async fn validate_policy(
    Json(payload): Json<ValidatePolicyRequest>,
) -> ApiResult<Json<SuccessResponse<ValidatePolicyResponse>>> {
    for rule in &payload.rules {
        rule.validate()
            .map_err(|e| validation_error(format!("rule '{}': {}", rule.name, e)))?;
    }

    Ok(Json(SuccessResponse::with_data(
        "Policy rules are valid",
        ValidatePolicyResponse {
            valid: true,
            rule_count: payload.rules.len(),
        },
    )))
}

/// Interpret a natural-language policy into structured rules
pub async fn interpret_policy(
    State(state): State<SharedState>,
    Json(payload): Json<NaturalLanguagePolicy>,
) -> ApiResult<Json<SuccessResponse<InterpretPolicyResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let policy = state.policy.interpret(payload).await?;
    // Interpreter output is never trusted structurally.
    policy.validate_rules()?;

    Ok(Json(SuccessResponse::with_data(
        "Policy interpreted",
        InterpretPolicyResponse { policy },
    )))
}
