//! Authenticated read client for the Reddit API.
//!
//! Authenticates once at construction (OAuth2 client credentials) and reads
//! the newest submissions per community. The client never retries on its
//! own; every failure is classified and surfaced so the orchestrator can
//! decide.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::models::Submission;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

/// Upstream supplier of submissions, one community per call.
#[async_trait]
pub trait SubmissionSource {
    /// Read the most recent `limit` submissions from `community`.
    async fn fetch(&mut self, community: &str, limit: u32) -> Result<Vec<Submission>>;

    /// Release any upstream resources.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Reddit API client with optional inter-request throttling.
pub struct RedditClient {
    http: Client,
    token: String,
    request_delay: Duration,
    last_request: Option<Instant>,
}

impl RedditClient {
    /// Build the HTTP client and authenticate. Rejected credentials fail
    /// construction with `SourceAuth`.
    pub async fn connect(config: &CollectorConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(&config.reddit_user_agent)
            .timeout(config.source_timeout())
            .build()
            .map_err(|e| CollectorError::source_fatal(format!("http client: {e}")))?;

        let token = authenticate(
            &http,
            &config.reddit_client_id,
            &config.reddit_client_secret,
        )
        .await?;
        info!(user_agent = %config.reddit_user_agent, "source client authenticated");

        Ok(Self {
            http,
            token,
            request_delay: config.request_delay(),
            last_request: None,
        })
    }

    /// Enforce the configured minimum delay between requests.
    async fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            let since = last.elapsed();
            if since < self.request_delay {
                tokio::time::sleep(self.request_delay - since).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

#[async_trait]
impl SubmissionSource for RedditClient {
    async fn fetch(&mut self, community: &str, limit: u32) -> Result<Vec<Submission>> {
        self.throttle().await;

        let url = format!("{API_BASE}/r/{community}/new");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("limit", limit.to_string()), ("raw_json", "1".to_string())])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CollectorError::SourceAuth(format!(
                "r/{community} returned {status}"
            )));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(CollectorError::SourceRateLimit {
                message: format!("r/{community} returned 429"),
                retry_after,
            });
        }
        if status.is_server_error() {
            return Err(CollectorError::SourceTransient(format!(
                "r/{community} returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(CollectorError::source_fatal(format!(
                "r/{community} returned {status}"
            )));
        }

        let body = response.text().await.map_err(classify_transport_error)?;
        let submissions = parse_listing(&body, community)?;
        debug!(community, count = submissions.len(), "fetched listing");

        Ok(submissions)
    }
}

async fn authenticate(http: &Client, client_id: &str, client_secret: &str) -> Result<String> {
    let response = http
        .post(TOKEN_URL)
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(classify_transport_error)?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(CollectorError::SourceAuth(format!(
            "token endpoint returned {status}"
        )));
    }
    if !status.is_success() {
        return Err(CollectorError::SourceTransient(format!(
            "token endpoint returned {status}"
        )));
    }

    #[derive(Deserialize)]
    struct TokenResponse {
        access_token: String,
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| CollectorError::SourceAuth(format!("token response: {e}")))?;

    Ok(token.access_token)
}

fn classify_transport_error(e: reqwest::Error) -> CollectorError {
    if e.is_timeout() || e.is_connect() {
        CollectorError::SourceTransient(e.to_string())
    } else {
        CollectorError::source_fatal(e)
    }
}

// Listing wire format. Fields the upstream omits fall back to zero or
// empty per the client contract.

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: RawSubmission,
}

#[derive(Deserialize)]
struct RawSubmission {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    num_comments: f64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    permalink: String,
}

/// Parse a listing body into submissions, stamping the configured
/// community name. Non-integer timestamps are floored to whole seconds.
fn parse_listing(body: &str, community: &str) -> Result<Vec<Submission>> {
    let listing: Listing = serde_json::from_str(body)
        .map_err(|e| CollectorError::source_fatal(format!("malformed listing: {e}")))?;

    Ok(listing
        .data
        .children
        .into_iter()
        .map(|child| {
            let raw = child.data;
            Submission {
                id: raw.id,
                subreddit: community.to_string(),
                title: raw.title,
                content: raw.selftext,
                score: raw.score as i64,
                num_comments: raw.num_comments.max(0.0) as u32,
                created_utc: raw.created_utc.floor() as i64,
                url: raw.permalink,
            }
        })
        .collect())
}
