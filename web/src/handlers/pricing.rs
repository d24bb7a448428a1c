//! Pricing endpoints under `/v1/pricing`.
//!
//! Administrators bound to an organization manage only that organization's
//! rules; administrators without one manage global and organization rules
//! alike.

use crate::error::AppError;
use crate::extractors::{AdminUser, MaybeAuthUser};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use travio_identity::AccessClaims;
use travio_pricing::{CalculatePriceRequest, PriceQuote, Rule, RuleInput, RuleScope};

/// `GET /v1/pricing/rules` query.
#[derive(Debug, Default, Deserialize)]
pub struct RulesQuery {
    /// Restrict to one organization's rules.
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Only global rules.
    #[serde(default)]
    pub global: bool,
    /// Include inactive rules.
    #[serde(default)]
    pub include_inactive: bool,
}

/// Price a trip.
///
/// A request without `organization_id` is priced with the caller's
/// organization rules when the caller has one.
///
/// # Errors
///
/// 400 for a non-positive base price or quantity.
pub async fn calculate(
    State(state): State<AppState>,
    MaybeAuthUser(claims): MaybeAuthUser,
    Json(mut request): Json<CalculatePriceRequest>,
) -> Result<Json<PriceQuote>, AppError> {
    if request.organization_id.is_none() {
        request.organization_id = claims
            .map(|claims| claims.oid)
            .filter(|org| !org.is_empty());
    }
    Ok(Json(state.pricing.calculate(&request)?))
}

/// List rules.
///
/// # Errors
///
/// 403 for non-administrators or for another organization's rules.
pub async fn list_rules(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Query(query): Query<RulesQuery>,
) -> Result<Json<Vec<Rule>>, AppError> {
    let scope = match (admin_organization(&admin), query.organization_id) {
        (Some(own), Some(requested)) if own != requested => {
            return Err(AppError::forbidden("Rules of another organization"));
        }
        (Some(own), _) => RuleScope::Organization(own.to_string()),
        (None, Some(requested)) => RuleScope::Organization(requested),
        (None, None) if query.global => RuleScope::Global,
        (None, None) => RuleScope::All,
    };
    Ok(Json(state.pricing.list_rules(&scope, query.include_inactive).await?))
}

/// Create a rule; it takes effect immediately.
///
/// # Errors
///
/// 400 for a rule that fails validation, 403 outside the caller's
/// organization.
pub async fn create_rule(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(input): Json<RuleInput>,
) -> Result<(StatusCode, Json<Rule>), AppError> {
    let input = scope_input(&admin, input)?;
    let rule = state.pricing.create_rule(input).await?;
    tracing::info!(rule_id = %rule.id, rule = %rule.name, admin = %admin.sub, "Pricing rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

/// Replace a rule.
///
/// # Errors
///
/// 404 for an unknown rule, 400 for a rule that fails validation, 403
/// outside the caller's organization.
pub async fn update_rule(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(input): Json<RuleInput>,
) -> Result<Json<Rule>, AppError> {
    ensure_owned(&state, &admin, &id).await?;
    let input = scope_input(&admin, input)?;
    let rule = state.pricing.update_rule(&id, input).await?;
    tracing::info!(rule_id = %rule.id, admin = %admin.sub, "Pricing rule updated");
    Ok(Json(rule))
}

/// Delete a rule.
///
/// # Errors
///
/// 404 for an unknown rule, 403 outside the caller's organization.
pub async fn delete_rule(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    ensure_owned(&state, &admin, &id).await?;
    state.pricing.delete_rule(&id).await?;
    tracing::info!(rule_id = %id, admin = %admin.sub, "Pricing rule deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn admin_organization(admin: &AccessClaims) -> Option<&str> {
    Some(admin.oid.as_str()).filter(|org| !org.is_empty())
}

/// Pin an organization admin's input to their organization.
fn scope_input(admin: &AccessClaims, mut input: RuleInput) -> Result<RuleInput, AppError> {
    let Some(own) = admin_organization(admin) else {
        return Ok(input);
    };
    match input.organization_id.as_deref() {
        None | Some("") => input.organization_id = Some(own.to_string()),
        Some(requested) if requested != own => {
            return Err(AppError::forbidden("Rules of another organization"));
        }
        Some(_) => {}
    }
    Ok(input)
}

async fn ensure_owned(state: &AppState, admin: &AccessClaims, id: &str) -> Result<(), AppError> {
    let Some(own) = admin_organization(admin) else {
        return Ok(());
    };
    let rule = state.pricing.get_rule(id).await?;
    if rule.is_scoped_to(Some(own)) {
        Ok(())
    } else {
        Err(AppError::forbidden("Rules of another organization"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn admin(oid: &str) -> AccessClaims {
        AccessClaims {
            sub: "admin-1".into(),
            uid: "admin-1".into(),
            oid: oid.into(),
            role: "admin".into(),
            jti: "jti".into(),
            iss: "travio-identity".into(),
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[test]
    fn organization_admins_are_pinned_to_their_organization() {
        let input = RuleInput::new("Night", "hour >= 22", 0.9, 5);
        let pinned = scope_input(&admin("org-a"), input.clone()).unwrap();
        assert_eq!(pinned.organization_id.as_deref(), Some("org-a"));

        let foreign = input.clone().with_organization("org-b");
        assert_eq!(
            scope_input(&admin("org-a"), foreign).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );

        let global = scope_input(&admin(""), input).unwrap();
        assert_eq!(global.organization_id, None);
    }
}
