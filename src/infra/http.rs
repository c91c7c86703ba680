//! reqwest-backed implementation of [`RewordApi`].

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use reword_api_types::{
    CommunityTemplate, ContentHistoryEntry, ContentId, FavoriteUpdate, FeatureLimits,
    SavedContent, TemplateId, UsageStats,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::application::api::RewordApi;
use crate::cache::FetchError;
use crate::config::ApiSettings;

use super::error::InfraError;

const USAGE_STATS_PATH: &str = "/api/v1/auth/usage-stats";
const FEATURE_LIMITS_PATH: &str = "/api/v1/auth/feature-limits";
const SAVED_CONTENT_PATH: &str = "/api/v1/content/saved";
const CONTENT_HISTORY_PATH: &str = "/api/v1/content/history";
const PUBLIC_TEMPLATES_PATH: &str = "/api/v1/public/templates";

#[derive(Clone, Debug)]
pub struct HttpApiClient {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let base = settings
            .base_url
            .join("/")
            .map_err(|err| InfraError::configuration(format!("invalid api.base_url: {err}")))?;
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            base,
            token: settings.token.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("reword-sync/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, resource: &str, path: &str) -> Result<Url, FetchError> {
        self.base
            .join(path)
            .map_err(|err| FetchError::transport(resource, format!("invalid url: {err}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match self.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, resource: &str, request: RequestBuilder) -> Result<Response, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|err| map_send_error(resource, &err))?;

        let status = response.status();
        if !status.is_success() {
            debug!(resource, status = status.as_u16(), "API request rejected");
            return Err(FetchError::status(resource, status.as_u16()));
        }
        Ok(response)
    }

    async fn get_json<T>(&self, resource: &str, url: Url) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        debug!(resource, url = %url, "Fetching API resource");
        let response = self
            .execute(resource, self.request(Method::GET, url))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| map_send_error(resource, &err))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| FetchError::decode(resource, format!("failed to parse body: {err}")))
    }

    /// List endpoints answer `null` when the user has nothing stored yet.
    async fn get_list<T>(&self, resource: &str, path: &str) -> Result<Vec<T>, FetchError>
    where
        T: DeserializeOwned,
    {
        let url = self.url(resource, path)?;
        let items: Option<Vec<T>> = self.get_json(resource, url).await?;
        Ok(items.unwrap_or_default())
    }
}

#[async_trait]
impl RewordApi for HttpApiClient {
    async fn usage_stats(&self) -> Result<UsageStats, FetchError> {
        let url = self.url("usage-stats", USAGE_STATS_PATH)?;
        self.get_json("usage-stats", url).await
    }

    async fn saved_content(&self) -> Result<Vec<SavedContent>, FetchError> {
        self.get_list("saved-content", SAVED_CONTENT_PATH).await
    }

    async fn content_history(&self) -> Result<Vec<ContentHistoryEntry>, FetchError> {
        self.get_list("content-history", CONTENT_HISTORY_PATH).await
    }

    async fn community_templates(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<CommunityTemplate>, FetchError> {
        let mut url = self.url("community-templates", PUBLIC_TEMPLATES_PATH)?;
        if let Some(category) = category {
            url.query_pairs_mut().append_pair("category", category);
        }
        let templates: Option<Vec<CommunityTemplate>> =
            self.get_json("community-templates", url).await?;
        Ok(templates.unwrap_or_default())
    }

    async fn feature_limits(&self) -> Result<FeatureLimits, FetchError> {
        let url = self.url("feature-limits", FEATURE_LIMITS_PATH)?;
        self.get_json("feature-limits", url).await
    }

    async fn set_favorite(
        &self,
        content_id: ContentId,
        is_favorite: bool,
    ) -> Result<(), FetchError> {
        let url = self.url("saved-content", &format!("{SAVED_CONTENT_PATH}/{content_id}"))?;
        let body = FavoriteUpdate { is_favorite };
        self.execute("saved-content", self.request(Method::PUT, url).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_saved_content(&self, content_id: ContentId) -> Result<(), FetchError> {
        let url = self.url("saved-content", &format!("{SAVED_CONTENT_PATH}/{content_id}"))?;
        self.execute("saved-content", self.request(Method::DELETE, url))
            .await?;
        Ok(())
    }

    async fn record_template_use(&self, template_id: TemplateId) -> Result<(), FetchError> {
        let url = self.url("template-use", &format!("/api/v1/templates/{template_id}/use"))?;
        self.execute("template-use", self.request(Method::POST, url))
            .await?;
        Ok(())
    }
}

fn map_send_error(resource: &str, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::timeout(resource)
    } else if err.is_decode() {
        FetchError::decode(resource, err.to_string())
    } else if let Some(status) = err.status() {
        FetchError::status(resource, status.as_u16())
    } else {
        FetchError::transport(resource, err.to_string())
    }
}
