/// VOD metadata endpoints
use crate::{
    api::with_reauth,
    auth::AuthContext,
    context::AppContext,
    error::{FetchError, VodSyncError, VodSyncResult},
    store::Provider,
    vod::VodInfo,
};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/ajax/twitch/vod", get(twitch_vod))
        .route("/ajax/youtube/vod", get(youtube_vod))
}

#[derive(Debug, Deserialize)]
pub struct VodParams {
    pub id: Option<String>,
}

fn video_id(params: VodParams) -> VodSyncResult<String> {
    params
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| VodSyncError::Validation("No video ID provided".to_string()))
}

fn not_found(error: VodSyncError) -> VodSyncError {
    match error {
        VodSyncError::Remote(FetchError::EmptyResult) => VodSyncError::NotFound("Video not found".to_string()),
        other => other,
    }
}

pub async fn twitch_vod(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<VodParams>,
) -> VodSyncResult<Json<VodInfo>> {
    let id = video_id(params)?;
    let mut auths = ctx.auth_store.get_auth_keys(&auth.user).await?;

    let client = ctx.vod_client.clone();
    let vod = with_reauth(&ctx, &mut auths, Provider::Twitch, |token| {
        let client = client.clone();
        let id = id.clone();
        async move { client.twitch_video(&token, &id).await }
    })
    .await
    .map_err(not_found)?;

    Ok(Json(vod))
}

pub async fn youtube_vod(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<VodParams>,
) -> VodSyncResult<Json<VodInfo>> {
    let id = video_id(params)?;
    let mut auths = ctx.auth_store.get_auth_keys(&auth.user).await?;

    let client = ctx.vod_client.clone();
    let vod = with_reauth(&ctx, &mut auths, Provider::Youtube, |token| {
        let client = client.clone();
        let id = id.clone();
        async move { client.youtube_video(&token, &id).await }
    })
    .await
    .map_err(not_found)?;

    Ok(Json(vod))
}
