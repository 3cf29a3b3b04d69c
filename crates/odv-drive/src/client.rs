//! Microsoft Graph drive client

use async_trait::async_trait;
use odv_core::{ConflictPolicy, GraphConfig, LinkPermission};
use reqwest::{header, Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};
use url::Url;

use crate::api::{DriveApi, DriveItem, ParentRef};
use crate::auth::{ClientCredentials, TokenProvider};
use crate::error::{DriveError, Result};

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChildList {
    #[serde(default)]
    value: Vec<DriveItem>,
}

#[derive(Debug, Deserialize)]
struct SharingLink {
    link: Option<SharingLinkDetail>,
}

#[derive(Debug, Deserialize)]
struct SharingLinkDetail {
    #[serde(rename = "webUrl")]
    web_url: Option<String>,
}

/// Drive client for one user's OneDrive.
///
/// The drive id is resolved on first use and kept for the lifetime of the
/// client.
pub struct GraphClient {
    http: Client,
    base_url: Url,
    user_email: String,
    tokens: Arc<dyn TokenProvider>,
    drive_id: OnceCell<String>,
    upload_timeout: Duration,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url.as_str())
            .field("user_email", &self.user_email)
            .field("drive_id", &self.drive_id.get())
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    /// Client authenticating with the configured client credentials.
    pub fn new(config: &GraphConfig) -> Result<Self> {
        if !config.is_complete() {
            return Err(DriveError::Config(
                "tenant id, client id, client secret and user email are required".to_string(),
            ));
        }

        let http = Self::http_client()?;
        let tokens = Arc::new(ClientCredentials::new(http.clone(), config));
        Self::with_token_provider(config, http, tokens)
    }

    /// Client using an existing HTTP client and token source.
    pub fn with_token_provider(config: &GraphConfig, http: Client, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))?;
        if base_url.cannot_be_a_base() {
            return Err(DriveError::Config(format!("invalid base url '{}'", config.base_url)));
        }

        Ok(Self {
            http,
            base_url,
            user_email: config.user_email.clone(),
            tokens,
            drive_id: OnceCell::new(),
            upload_timeout: config.upload_timeout(),
        })
    }

    fn http_client() -> Result<Client> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("odv-drive/{}", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(DriveError::Http)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Id of the configured user's drive.
    pub async fn drive_id(&self) -> Result<String> {
        self.drive_id
            .get_or_try_init(|| self.resolve_drive_id())
            .await
            .cloned()
    }

    #[instrument(skip(self), fields(user = %self.user_email))]
    async fn resolve_drive_id(&self) -> Result<String> {
        let user: IdOnly = self
            .send(self.http.get(self.endpoint(&["users", &self.user_email])?))
            .await?;

        let drive: IdOnly = self
            .send(self.http.get(self.endpoint(&["users", &user.id, "drive"])?))
            .await?;

        info!(drive_id = %drive.id, "Drive resolved");
        Ok(drive.id)
    }

    /// Base url extended with path segments, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DriveError::Config(format!("invalid base url '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn children_url(&self, parent: &ParentRef) -> Result<Url> {
        let drive_id = self.drive_id().await?;
        match parent {
            ParentRef::Root => self.endpoint(&["drives", &drive_id, "root", "children"]),
            ParentRef::Item(id) => self.endpoint(&["drives", &drive_id, "items", id, "children"]),
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(request.bearer_auth(token.expose_secret()))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.authorized(request).await?.send().await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| DriveError::InvalidResponse(e.to_string()));
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let error = DriveError::from_response(status, &headers, &body);

        if matches!(error, DriveError::Auth { .. }) {
            // A rejected token is not reused
            self.tokens.invalidate();
        }

        Err(error)
    }
}

/// `$filter` value matching a folder by exact name.
fn folder_name_filter(name: &str) -> String {
    format!("name eq '{}' and folder ne null", name.replace('\'', "''"))
}

#[async_trait]
impl DriveApi for GraphClient {
    #[instrument(skip(self, parent), fields(parent = %parent))]
    async fn find_child_folder(&self, parent: &ParentRef, name: &str) -> Result<Option<DriveItem>> {
        let mut url = self.children_url(parent).await?;
        url.query_pairs_mut().append_pair("$filter", &folder_name_filter(name));

        let list: ChildList = self.send(self.http.get(url)).await?;
        let found = list.value.into_iter().find(|item| item.name.eq_ignore_ascii_case(name));

        debug!(found = found.is_some(), "Child folder lookup");
        Ok(found)
    }

    #[instrument(skip(self, parent), fields(parent = %parent))]
    async fn create_folder(&self, parent: &ParentRef, name: &str, policy: ConflictPolicy) -> Result<DriveItem> {
        let url = self.children_url(parent).await?;
        let body = serde_json::json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": policy.wire_value(),
        });

        let item: DriveItem = self.send(self.http.post(url).json(&body)).await?;
        info!(folder_id = %item.id, "Folder created");
        Ok(item)
    }

    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn upload_content(&self, folder_id: &str, name: &str, content: &[u8]) -> Result<DriveItem> {
        let drive_id = self.drive_id().await?;
        let folder_segment = format!("{folder_id}:");
        let name_segment = format!("{name}:");
        let url = self.endpoint(&["drives", &drive_id, "items", &folder_segment, &name_segment, "content"])?;

        let request = self
            .http
            .put(url)
            .timeout(self.upload_timeout)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(content.to_vec());

        let item: DriveItem = self.send(request).await?;
        info!(item_id = %item.id, size = item.size, "File uploaded");
        Ok(item)
    }

    #[instrument(skip(self))]
    async fn create_share_link(&self, item_id: &str, permission: LinkPermission) -> Result<String> {
        let drive_id = self.drive_id().await?;
        let url = self.endpoint(&["drives", &drive_id, "items", item_id, "createLink"])?;
        let body = serde_json::json!({
            "type": permission.as_str(),
            "scope": "organization",
        });

        let link: SharingLink = self.send(self.http.post(url).json(&body)).await?;
        link.link
            .and_then(|l| l.web_url)
            .ok_or_else(|| DriveError::InvalidResponse("sharing link without webUrl".to_string()))
    }

    async fn check_connection(&self) -> Result<()> {
        self.tokens.access_token().await?;
        self.drive_id().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    fn client(base_url: &str) -> GraphClient {
        let config = GraphConfig::new("tenant", "client", "secret", "odv@example.com").with_base_url(base_url);
        GraphClient::with_token_provider(&config, Client::new(), Arc::new(StaticToken::new("token"))).unwrap()
    }

    #[test]
    fn test_folder_name_filter_escapes_quotes() {
        assert_eq!(folder_name_filter("Audio"), "name eq 'Audio' and folder ne null");
        assert_eq!(
            folder_name_filter("L'Aquila_Srl"),
            "name eq 'L''Aquila_Srl' and folder ne null"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("https://graph.microsoft.com/v1.0/");
        let url = client.endpoint(&["users", "odv@example.com"]).unwrap();
        assert_eq!(url.as_str(), "https://graph.microsoft.com/v1.0/users/odv@example.com");
    }

    #[test]
    fn test_upload_path_segments() {
        let client = client("https://graph.microsoft.com/v1.0");
        let url = client
            .endpoint(&["drives", "d1", "items", "F1:", "verbale odv.docx:", "content"])
            .unwrap();
        assert_eq!(
            url.path(),
            "/v1.0/drives/d1/items/F1:/verbale%20odv.docx:/content"
        );
    }

    #[test]
    fn test_incomplete_config_rejected() {
        let config = GraphConfig::new("tenant", "", "secret", "odv@example.com");
        assert!(matches!(GraphClient::new(&config), Err(DriveError::Config(_))));
    }
}
