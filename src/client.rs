//! Thin, typed wrapper around `reqwest` for the checklist HTTP API.
//!
//! [`ApiClient`] exposes one async method per endpoint and returns domain
//! types that have already passed DTO validation, so the stores never see
//! raw JSON. It also implements both gateway traits with
//! [`Dispatch::Concurrent`] and per-checklist item loads.

use std::fmt;

use reqwest::{Method, Url};
use serde_json::{Value, json};

use crate::config::ApiConfig;
use crate::dto::{checklist_from_dto, item_from_dto, map_dto_array};
use crate::error::GatewayError;
use crate::gateway::{ChecklistGateway, ChecklistItemGateway, Dispatch, GatewayFuture, ItemScope};
use crate::model::{Checklist, ChecklistItem};

/// Typed HTTP client for the checklist API.
///
/// Clone is cheap: `reqwest::Client` is internally reference counted.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> Result<(), quicklists::GatewayError> {
/// use quicklists::{ApiClient, ApiConfig};
///
/// let client = ApiClient::new(&ApiConfig::new("http://127.0.0.1:3000"))?;
/// let checklists = client.list_checklists().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl ApiClient {
    /// Build a client for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidBaseUrl`] if the URL does not parse or
    /// cannot carry a path, and [`GatewayError::Http`] if the underlying
    /// client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, GatewayError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| GatewayError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidBaseUrl {
                url: config.base_url.clone(),
                reason: "URL cannot carry a path".to_owned(),
            });
        }
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// Returns the base URL requests are built from.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /checklists`
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport failure, non-2xx status, or an
    /// invalid record.
    pub async fn list_checklists(&self) -> Result<Vec<Checklist>, GatewayError> {
        let body = self.fetch(Method::GET, &["checklists"], None).await?;
        Ok(map_dto_array(&body, checklist_from_dto)?)
    }

    /// `POST /checklists` with `{title}`.
    ///
    /// # Errors
    ///
    /// See [`list_checklists`](Self::list_checklists).
    pub async fn post_checklist(&self, title: &str) -> Result<Checklist, GatewayError> {
        let body = self
            .fetch(Method::POST, &["checklists"], Some(json!({ "title": title })))
            .await?;
        Ok(checklist_from_dto(&body)?)
    }

    /// `PUT /checklists/{id}` with `{title}`.
    ///
    /// # Errors
    ///
    /// See [`list_checklists`](Self::list_checklists).
    pub async fn put_checklist(&self, id: &str, title: &str) -> Result<Checklist, GatewayError> {
        let body = self
            .fetch(Method::PUT, &["checklists", id], Some(json!({ "title": title })))
            .await?;
        Ok(checklist_from_dto(&body)?)
    }

    /// `DELETE /checklists/{id}`
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport failure or non-2xx status.
    pub async fn remove_checklist(&self, id: &str) -> Result<(), GatewayError> {
        self.send(Method::DELETE, &["checklists", id], None).await?;
        Ok(())
    }

    /// `GET /checklists/{id}/items`
    ///
    /// # Errors
    ///
    /// See [`list_checklists`](Self::list_checklists).
    pub async fn list_items(&self, checklist_id: &str) -> Result<Vec<ChecklistItem>, GatewayError> {
        let body = self
            .fetch(Method::GET, &["checklists", checklist_id, "items"], None)
            .await?;
        Ok(map_dto_array(&body, item_from_dto)?)
    }

    /// `POST /checklists/{id}/items` with `{title}`.
    ///
    /// # Errors
    ///
    /// See [`list_checklists`](Self::list_checklists).
    pub async fn post_item(
        &self,
        checklist_id: &str,
        title: &str,
    ) -> Result<ChecklistItem, GatewayError> {
        let body = self
            .fetch(
                Method::POST,
                &["checklists", checklist_id, "items"],
                Some(json!({ "title": title })),
            )
            .await?;
        Ok(item_from_dto(&body)?)
    }

    /// `PUT /items/{id}` with `{title}`.
    ///
    /// # Errors
    ///
    /// See [`list_checklists`](Self::list_checklists).
    pub async fn put_item(&self, id: &str, title: &str) -> Result<ChecklistItem, GatewayError> {
        let body = self
            .fetch(Method::PUT, &["items", id], Some(json!({ "title": title })))
            .await?;
        Ok(item_from_dto(&body)?)
    }

    /// `PATCH /items/{id}/toggle` with `{}`.
    ///
    /// # Errors
    ///
    /// See [`list_checklists`](Self::list_checklists).
    pub async fn patch_toggle(&self, id: &str) -> Result<ChecklistItem, GatewayError> {
        let body = self
            .fetch(Method::PATCH, &["items", id, "toggle"], Some(json!({})))
            .await?;
        Ok(item_from_dto(&body)?)
    }

    /// `DELETE /items/{id}`
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport failure or non-2xx status.
    pub async fn remove_item(&self, id: &str) -> Result<(), GatewayError> {
        self.send(Method::DELETE, &["items", id], None).await?;
        Ok(())
    }

    /// `PATCH /checklists/{id}/reset` with `{}`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] on transport failure or non-2xx status.
    pub async fn patch_reset(&self, checklist_id: &str) -> Result<(), GatewayError> {
        self.send(
            Method::PATCH,
            &["checklists", checklist_id, "reset"],
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    /// Append percent-encoded `segments` to the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidBaseUrl`] if the base cannot carry a
    /// path (rejected in [`new`](Self::new), so unreachable in practice).
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot carry a path".to_owned(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request and parse the JSON response body.
    async fn fetch(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<Value, GatewayError> {
        let response = self.send(method, segments, body).await?;
        Ok(response.json::<Value>().await?)
    }

    /// Send a request, mapping a non-2xx status to [`GatewayError::Status`].
    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = self.endpoint(segments)?;
        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let path = display_path(segments);
            tracing::warn!(%method, %path, status = status.as_u16(), "request rejected");
            return Err(GatewayError::Status {
                method,
                path,
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

/// Render request segments as `/a/b/c` for error messages.
fn display_path(segments: &[&str]) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        path.push_str(segment);
    }
    path
}

impl ChecklistGateway for ApiClient {
    fn dispatch(&self) -> Dispatch {
        Dispatch::Concurrent
    }

    fn load_checklists(&self) -> GatewayFuture<'_, Vec<Checklist>> {
        Box::pin(self.list_checklists())
    }

    fn save_checklists(&self, _checklists: &[Checklist]) -> Result<(), GatewayError> {
        // Every command already persisted its own change.
        Ok(())
    }

    fn create_checklist(&self, checklist: Checklist) -> GatewayFuture<'_, Checklist> {
        Box::pin(async move { self.post_checklist(&checklist.title).await })
    }

    fn update_checklist(&self, checklist: Checklist) -> GatewayFuture<'_, Checklist> {
        Box::pin(async move { self.put_checklist(&checklist.id, &checklist.title).await })
    }

    fn delete_checklist(&self, id: String) -> GatewayFuture<'_, ()> {
        Box::pin(async move { self.remove_checklist(&id).await })
    }
}

impl ChecklistItemGateway for ApiClient {
    fn dispatch(&self) -> Dispatch {
        Dispatch::Concurrent
    }

    fn scope(&self) -> ItemScope {
        ItemScope::PerChecklist
    }

    fn load_items(&self, checklist_id: Option<String>) -> GatewayFuture<'_, Vec<ChecklistItem>> {
        Box::pin(async move {
            match checklist_id {
                Some(id) => self.list_items(&id).await,
                None => Ok(Vec::new()),
            }
        })
    }

    fn save_items(&self, _items: &[ChecklistItem]) -> Result<(), GatewayError> {
        Ok(())
    }

    fn create_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem> {
        Box::pin(async move { self.post_item(&item.checklist_id, &item.title).await })
    }

    fn update_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem> {
        Box::pin(async move { self.put_item(&item.id, &item.title).await })
    }

    fn toggle_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem> {
        // The server flips its own copy; the locally flipped value is unused.
        Box::pin(async move { self.patch_toggle(&item.id).await })
    }

    fn delete_item(&self, id: String) -> GatewayFuture<'_, ()> {
        Box::pin(async move { self.remove_item(&id).await })
    }

    fn reset_items(&self, checklist_id: String) -> GatewayFuture<'_, ()> {
        Box::pin(async move { self.patch_reset(&checklist_id).await })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(&ApiConfig::new(base)).expect("client should build")
    }

    #[test]
    fn endpoint_appends_segments() {
        let url = client("http://localhost:3000")
            .endpoint(&["checklists", "groceries", "items"])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/checklists/groceries/items");
    }

    #[test]
    fn endpoint_keeps_base_path_and_drops_trailing_slash() {
        let url = client("http://localhost:3000/api/")
            .endpoint(&["items", "i-1", "toggle"])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/items/i-1/toggle");
    }

    #[test]
    fn endpoint_percent_encodes_ids() {
        let url = client("http://localhost:3000")
            .endpoint(&["checklists", "a/b c"])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/checklists/a%2Fb%20c");
    }

    #[test]
    fn unparseable_base_url_is_rejected() {
        let err = ApiClient::new(&ApiConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidBaseUrl { .. }), "got: {err:?}");
    }

    #[test]
    fn base_url_without_path_support_is_rejected() {
        let err = ApiClient::new(&ApiConfig::new("mailto:someone@example.com")).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidBaseUrl { .. }), "got: {err:?}");
    }

    #[test]
    fn display_path_joins_segments() {
        assert_eq!(display_path(&["items", "i-1"]), "/items/i-1");
    }

    #[test]
    fn remote_gateway_profile() {
        let client = client("http://localhost:3000");
        assert_eq!(ChecklistGateway::dispatch(&client), Dispatch::Concurrent);
        assert_eq!(client.scope(), ItemScope::PerChecklist);
        assert!(client.save_checklists(&[]).is_ok());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // Port 9 (discard) on loopback is not expected to be listening.
        let client = ApiClient::new(&ApiConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = client.list_checklists().await.unwrap_err();
        assert!(matches!(err, GatewayError::Http(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn unscoped_item_load_is_empty() {
        let items = client("http://127.0.0.1:9")
            .load_items(None)
            .await
            .expect("unscoped load should not touch the network");
        assert!(items.is_empty());
    }
}
