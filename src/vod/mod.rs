/// Twitch and YouTube VOD lookups
use crate::{
    config::{TwitchConfig, YouTubeConfig},
    error::{FetchError, FetchResult},
    metrics,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Video metadata returned to the front end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VodInfo {
    pub id: String,
    pub title: String,
    /// Channel or broadcaster name
    pub username: String,
    /// RFC 3339 publish time as reported by the platform
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct TwitchVideo {
    title: String,
    user_name: String,
    created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YouTubeSnippet {
    title: String,
    channel_title: String,
    published_at: String,
}

/// Video metadata client for both platforms
#[derive(Clone)]
pub struct VodClient {
    http_client: reqwest::Client,
    twitch: TwitchConfig,
    youtube: YouTubeConfig,
}

impl VodClient {
    pub fn new(http_client: reqwest::Client, twitch: TwitchConfig, youtube: YouTubeConfig) -> Self {
        Self {
            http_client,
            twitch,
            youtube,
        }
    }

    /// Look up a Twitch VOD by id
    pub async fn twitch_video(&self, token: &str, id: &str) -> FetchResult<VodInfo> {
        let url = format!("{}/videos?id={}", self.twitch.api_url, urlencoding::encode(id));
        let request = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .header("Client-Id", &self.twitch.client_id);

        let body = send("twitch", request).await?;
        parse_twitch_video(id, &body)
    }

    /// Look up a YouTube video by id
    pub async fn youtube_video(&self, token: &str, id: &str) -> FetchResult<VodInfo> {
        let url = format!(
            "{}/videos?part=snippet&id={}",
            self.youtube.api_url,
            urlencoding::encode(id)
        );
        let request = self.http_client.get(&url).bearer_auth(token);

        let body = send("youtube", request).await?;
        parse_youtube_video(id, &body)
    }
}

async fn send(provider: &'static str, request: reqwest::RequestBuilder) -> FetchResult<Value> {
    let response = request.send().await.map_err(|e| {
        warn!(provider, error = %e, "VOD lookup failed");
        let status = if e.is_timeout() { 504 } else { 502 };
        metrics::record_remote_call(provider, "video", status);
        FetchError::Transport(status)
    })?;

    let status = response.status().as_u16();
    metrics::record_remote_call(provider, "video", status);
    if !response.status().is_success() {
        return Err(FetchError::from_status(status));
    }

    response.json().await.map_err(|e| {
        warn!(provider, error = %e, "Unreadable VOD response");
        FetchError::EmptyResult
    })
}

/// First entry of a Helix `videos` response; an empty list means no such video
pub(crate) fn parse_twitch_video(id: &str, body: &Value) -> FetchResult<VodInfo> {
    let first = body
        .get("data")
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .ok_or(FetchError::EmptyResult)?;

    let video: TwitchVideo = serde_json::from_value(first.clone()).map_err(|_| FetchError::EmptyResult)?;
    Ok(VodInfo {
        id: id.to_string(),
        title: video.title,
        username: video.user_name,
        created_at: video.created_at,
    })
}

/// Snippet of the first item in a Data API `videos` response
pub(crate) fn parse_youtube_video(id: &str, body: &Value) -> FetchResult<VodInfo> {
    let snippet = body
        .get("items")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("snippet"))
        .ok_or(FetchError::EmptyResult)?;

    let snippet: YouTubeSnippet =
        serde_json::from_value(snippet.clone()).map_err(|_| FetchError::EmptyResult)?;
    Ok(VodInfo {
        id: id.to_string(),
        title: snippet.title,
        username: snippet.channel_title,
        created_at: snippet.published_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_twitch_video() {
        let body = json!({
            "data": [{
                "id": "1234",
                "user_name": "Streamer",
                "title": "Savage prog",
                "created_at": "2023-11-14T22:00:00Z",
                "duration": "3h2m1s"
            }],
            "pagination": {}
        });

        let vod = parse_twitch_video("1234", &body).unwrap();
        assert_eq!(vod.username, "Streamer");
        assert_eq!(vod.created_at, "2023-11-14T22:00:00Z");

        let empty = json!({"data": [], "pagination": {}});
        assert_eq!(parse_twitch_video("1234", &empty), Err(FetchError::EmptyResult));
    }

    #[test]
    fn test_parse_youtube_video() {
        let body = json!({
            "kind": "youtube#videoListResponse",
            "items": [{
                "id": "dQw4w9WgXcQ",
                "snippet": {
                    "publishedAt": "2023-11-14T22:00:00Z",
                    "title": "Ultimate clear",
                    "channelTitle": "Raider"
                }
            }]
        });

        let vod = parse_youtube_video("dQw4w9WgXcQ", &body).unwrap();
        assert_eq!(vod.title, "Ultimate clear");
        assert_eq!(vod.username, "Raider");

        let empty = json!({"kind": "youtube#videoListResponse", "items": []});
        assert_eq!(parse_youtube_video("x", &empty), Err(FetchError::EmptyResult));
    }
}
