/// FFLogs endpoints
///
/// `GET /ajax/fflogs/report` serves a cached, loaded or refreshed report;
/// `GET /ajax/fflogs/reports` lists the linked user's recent uploads.
use crate::{
    api::{flag, linked_token, reauthorize, with_reauth},
    auth::AuthContext,
    context::AppContext,
    error::{FetchError, VodSyncError, VodSyncResult},
    fflogs::ReportSummary,
    reports::ReportLookup,
    store::Provider,
};
use axum::{
    extract::{Query, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

/// Set on a report response when a refresh or the encounter-name lookup failed
pub const UPSTREAM_STATUS_HEADER: &str = "x-vodsync-upstream-status";

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/ajax/fflogs/report", get(get_report))
        .route("/ajax/fflogs/reports", get(list_reports))
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub code: Option<String>,
    pub update: Option<String>,
    pub unknown: Option<String>,
}

pub async fn get_report(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<ReportParams>,
) -> VodSyncResult<Response> {
    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| VodSyncError::Validation("No report code provided.".to_string()))?;
    let update = flag(params.update.as_deref());
    let include_unclassified = flag(params.unknown.as_deref());

    let mut auths = ctx.auth_store.get_auth_keys(&auth.user).await?;
    let token = linked_token(&auths, Provider::Fflogs)?;

    let mut lookup = ctx
        .reports
        .find_or_load_report(&code, &token, update, include_unclassified)
        .await?;

    if lookup.error() == Some(FetchError::AuthExpired) {
        let token = reauthorize(&ctx, &mut auths, Provider::Fflogs).await?;
        lookup = ctx
            .reports
            .find_or_load_report(&code, &token, update, include_unclassified)
            .await?;
    }

    report_response(lookup)
}

/// Degraded lookups still serve the report, flagged with the upstream status
fn report_response(lookup: ReportLookup) -> VodSyncResult<Response> {
    let Some(report) = lookup.report() else {
        return Err(VodSyncError::Remote(FetchError::from_status(lookup.status_code())));
    };

    let mut response = Json(report).into_response();
    if let Some(error) = lookup.error() {
        response.headers_mut().insert(
            HeaderName::from_static(UPSTREAM_STATUS_HEADER),
            HeaderValue::from(error.status_code()),
        );
    }
    Ok(response)
}

pub async fn list_reports(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> VodSyncResult<Json<Vec<ReportSummary>>> {
    let mut auths = ctx.auth_store.get_auth_keys(&auth.user).await?;
    let token = linked_token(&auths, Provider::Fflogs)?;

    let uid = match auths.get(Provider::Fflogs).and_then(|a| a.uid) {
        Some(uid) => uid,
        None => {
            let user = match ctx.report_client.get_username(&token).await {
                Some(user) => user,
                None => {
                    let token = reauthorize(&ctx, &mut auths, Provider::Fflogs).await?;
                    ctx.report_client
                        .get_username(&token)
                        .await
                        .ok_or(VodSyncError::Remote(FetchError::AuthExpired))?
                }
            };
            if let Some(mut linked) = auths.get(Provider::Fflogs).cloned() {
                linked.uid = Some(user.id);
                linked.username = Some(user.name);
                auths.set(Provider::Fflogs, linked);
                ctx.auth_store.store_auth_keys(&auths).await?;
            }
            user.id
        }
    };

    let client = ctx.report_client.clone();
    let reports = with_reauth(&ctx, &mut auths, Provider::Fflogs, |token| {
        let client = client.clone();
        async move { client.get_reports_by_user(&token, uid).await }
    })
    .await?;

    Ok(Json(reports))
}
