//! Document archive on the remote folder store

use chrono::{DateTime, Utc};
use odv_core::{AppConfig, ArchiveConfig, ClientInfo, FileType, LinkPermission, Notifier};
use odv_infra::{RetryPolicy, RetryingClient};
use odv_report::DocxDocument;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::api::DriveApi;
use crate::client::GraphClient;
use crate::error::{DriveError, Result};
use crate::folders::{FolderEnsurer, FolderPathResolver};

/// A file stored in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub web_url: Option<String>,
    pub folder_path: String,
    pub created_at: Option<DateTime<Utc>>,
    pub client: Option<ClientInfo>,
}

/// Archive folder of one file type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderStatus {
    pub file_type: FileType,
    pub path: String,
    /// Whether the folder id is already known to this process
    pub cached: bool,
}

/// Result of a connectivity probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub service: &'static str,
    pub status: &'static str,
    pub checked_at: DateTime<Utc>,
    pub cached_folders: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Stores documents under the archive layout.
///
/// Every remote call goes through the retry engine; terminal failures are
/// reported to the notifier once before they are returned.
pub struct ArchiveService {
    api: Arc<dyn DriveApi>,
    resolver: FolderPathResolver,
    folders: FolderEnsurer,
    retry: RetryingClient,
}

impl ArchiveService {
    pub fn new(api: Arc<dyn DriveApi>, archive: &ArchiveConfig, retry: RetryingClient) -> Self {
        let folders = FolderEnsurer::new(Arc::clone(&api), retry.clone(), archive.conflict_policy);
        Self {
            api,
            resolver: FolderPathResolver::new(archive),
            folders,
            retry,
        }
    }

    /// Service talking to the configured user's OneDrive.
    pub fn from_config(config: &AppConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let client = GraphClient::new(&config.graph)?;
        let retry = RetryingClient::new(RetryPolicy::new((&config.retry).into()), notifier);
        Ok(Self::new(Arc::new(client), &config.archive, retry))
    }

    pub fn resolver(&self) -> &FolderPathResolver {
        &self.resolver
    }

    /// Upload `content` as `filename` into the folder for `file_type` and
    /// the current month.
    pub async fn upload_file(
        &self,
        content: &[u8],
        filename: &str,
        file_type: &FileType,
        client: Option<&ClientInfo>,
    ) -> Result<UploadedFile> {
        self.upload_file_at(content, filename, file_type, client, Utc::now()).await
    }

    #[instrument(skip(self, content, file_type, client), fields(size = content.len(), file_type = %file_type))]
    pub async fn upload_file_at(
        &self,
        content: &[u8],
        filename: &str,
        file_type: &FileType,
        client: Option<&ClientInfo>,
        now: DateTime<Utc>,
    ) -> Result<UploadedFile> {
        let filename = filename.trim();
        if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
            return Err(DriveError::InvalidPath(filename.to_string()));
        }

        let folder_path = self.resolver.resolve(file_type, client, &now);
        let folder_id = self.folders.ensure(&folder_path).await?;

        let api = &self.api;
        let folder = folder_id.as_str();
        let item = self
            .retry
            .execute(&format!("upload {filename}"), DriveError::class, move || {
                api.upload_content(folder, filename, content)
            })
            .await?;

        info!(item_id = %item.id, folder_path = %folder_path, "File archived");

        Ok(UploadedFile {
            id: item.id,
            name: item.name,
            size: item.size,
            web_url: item.web_url,
            folder_path,
            created_at: item.created_at,
            client: client.cloned(),
        })
    }

    /// Upload a file read from disk, named after the file.
    pub async fn upload_path(
        &self,
        path: impl AsRef<std::path::Path>,
        file_type: &FileType,
        client: Option<&ClientInfo>,
    ) -> Result<UploadedFile> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| DriveError::InvalidPath(path.display().to_string()))?;

        let content = tokio::fs::read(path).await?;
        self.upload_file(&content, filename, file_type, client).await
    }

    /// Serialize `document` and upload it as `<base_name>_<timestamp>.docx`.
    pub async fn upload_document(
        &self,
        document: &DocxDocument,
        base_name: &str,
        file_type: &FileType,
        client: Option<&ClientInfo>,
    ) -> Result<UploadedFile> {
        let now = Utc::now();
        let bytes = document.to_bytes()?;
        let filename = timestamped_docx_name(base_name, &now);

        self.upload_file_at(&bytes, &filename, file_type, client, now).await
    }

    #[instrument(skip(self))]
    pub async fn create_share_link(&self, item_id: &str, permission: LinkPermission) -> Result<String> {
        let api = &self.api;
        let url = self
            .retry
            .execute("share link", DriveError::class, move || api.create_share_link(item_id, permission))
            .await?;
        Ok(url)
    }

    /// Resolve `path` to a folder id, creating what is missing.
    pub async fn ensure_folder(&self, path: &str) -> Result<String> {
        self.folders.ensure(path).await
    }

    /// Archive folder of every known file type for `client` at `now`.
    pub fn folder_structure(&self, client: Option<&ClientInfo>, now: DateTime<Utc>) -> Vec<FolderStatus> {
        FileType::KNOWN
            .iter()
            .map(|file_type| {
                let path = self.resolver.resolve(file_type, client, &now);
                FolderStatus {
                    file_type: file_type.clone(),
                    cached: self.folders.cache().contains(&path),
                    path,
                }
            })
            .collect()
    }

    pub fn clear_folder_cache(&self) {
        self.folders.cache().clear();
    }

    /// Cached folder prefixes and their ids.
    pub fn folder_cache_snapshot(&self) -> BTreeMap<String, String> {
        self.folders.cache().snapshot()
    }

    /// Probe credentials and drive access. Never fails; problems are
    /// reported in the result.
    pub async fn health_check(&self) -> HealthReport {
        let outcome = self.api.check_connection().await;
        let cached_folders = self.folders.cache().len();

        match outcome {
            Ok(()) => HealthReport {
                healthy: true,
                service: "OneDrive",
                status: "operational",
                checked_at: Utc::now(),
                cached_folders,
                error: None,
            },
            Err(e) => {
                error!(error = %e, "Remote store health check failed");
                HealthReport {
                    healthy: false,
                    service: "OneDrive",
                    status: "error",
                    checked_at: Utc::now(),
                    cached_folders,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

impl std::fmt::Debug for ArchiveService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveService")
            .field("resolver", &self.resolver)
            .field("folders", &self.folders)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// `<base>_<YYYYmmdd_HHMMSS>.docx`
pub fn timestamped_docx_name(base_name: &str, at: &DateTime<Utc>) -> String {
    format!("{}_{}.docx", base_name.trim(), at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDrive;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use odv_core::NotifyError;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str) -> std::result::Result<(), NotifyError> {
            self.messages.lock().push(message.to_string());
            Ok(())
        }
    }

    fn service(drive: Arc<InMemoryDrive>, notifier: Arc<RecordingNotifier>) -> ArchiveService {
        let retry = RetryingClient::new(RetryPolicy::fixed(2, Duration::from_millis(1)), notifier);
        ArchiveService::new(drive, &ArchiveConfig::default(), retry)
    }

    fn march_15() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 9, 30, 0).unwrap()
    }

    #[tokio::test]
    async fn test_upload_file_into_client_folder() {
        let drive = Arc::new(InMemoryDrive::new());
        let service = service(drive.clone(), Arc::default());
        let client = ClientInfo::new("Studio Rossi & C.", Some(3));

        let uploaded = service
            .upload_file_at(b"RIFF....", "riunione.mp3", &FileType::Audio, Some(&client), march_15())
            .await
            .unwrap();

        assert_eq!(uploaded.folder_path, "Modello231/Studio_Rossi_C/Audio/2025/03-March");
        assert_eq!(uploaded.name, "riunione.mp3");
        assert_eq!(uploaded.size, 8);
        assert_eq!(uploaded.client, Some(client));

        let folder = drive.folder_id(&uploaded.folder_path).unwrap();
        assert_eq!(drive.file_content(&folder, "riunione.mp3"), Some(b"RIFF....".to_vec()));
    }

    #[tokio::test]
    async fn test_folder_structure_reports_cached_paths() {
        let service = service(Arc::new(InMemoryDrive::new()), Arc::default());
        service
            .upload_file_at(b"x", "a.txt", &FileType::Transcript, None, march_15())
            .await
            .unwrap();

        let structure = service.folder_structure(None, march_15());
        let summary: Vec<(&str, bool)> = structure.iter().map(|s| (s.path.as_str(), s.cached)).collect();

        assert_eq!(
            summary,
            vec![
                ("Modello231/Audio/2025/03-March", false),
                ("Modello231/Trascrizioni/2025/03-March", true),
                ("Modello231/Verbali/2025/03-March", false),
                ("Modello231/Documenti/2025/03-March", false),
            ]
        );

        assert_eq!(service.folder_cache_snapshot().len(), 4);
        service.clear_folder_cache();
        assert!(service.folder_cache_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_notifies_once_and_is_not_retried() {
        let drive = Arc::new(InMemoryDrive::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service(drive.clone(), notifier.clone());

        drive.fail_next(DriveError::Auth {
            code: Some("InvalidAuthenticationToken".to_string()),
            message: "Access token has expired".to_string(),
        });

        let err = service
            .upload_file_at(b"x", "a.txt", &FileType::Document, None, march_15())
            .await
            .unwrap_err();

        assert!(matches!(err, DriveError::Auth { .. }));
        assert_eq!(
            *notifier.messages.lock(),
            vec!["OneDrive folder lookup Modello231: Authentication failed: Access token has expired"]
        );
        assert!(drive.created_paths().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_filename_rejected() {
        let service = service(Arc::new(InMemoryDrive::new()), Arc::default());
        let err = service
            .upload_file_at(b"x", "../evil", &FileType::Document, None, march_15())
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_upload_document_name() {
        let drive = Arc::new(InMemoryDrive::new());
        let service = service(drive.clone(), Arc::default());
        let document = DocxDocument::from_paragraphs(&["Verbale"]).unwrap();

        let uploaded = service
            .upload_document(&document, "verbale_odv_7", &FileType::Report, None)
            .await
            .unwrap();

        assert!(uploaded.name.starts_with("verbale_odv_7_"));
        assert!(uploaded.name.ends_with(".docx"));
        // verbale_odv_7_YYYYmmdd_HHMMSS.docx
        assert_eq!(uploaded.name.len(), "verbale_odv_7_".len() + 15 + 5);
    }

    #[test]
    fn test_timestamped_docx_name() {
        assert_eq!(
            timestamped_docx_name("trascrizione", &march_15()),
            "trascrizione_20250315_093000.docx"
        );
    }

    #[tokio::test]
    async fn test_share_link_and_health() {
        let drive = Arc::new(InMemoryDrive::new());
        let service = service(drive.clone(), Arc::default());
        let uploaded = service
            .upload_file_at(b"x", "a.txt", &FileType::Document, None, march_15())
            .await
            .unwrap();

        let link = service.create_share_link(&uploaded.id, LinkPermission::View).await.unwrap();
        assert!(link.contains(&uploaded.id));

        let health = service.health_check().await;
        assert!(health.healthy);
        assert_eq!(health.status, "operational");
        assert_eq!(health.cached_folders, 4);

        drive.fail_next(DriveError::Auth {
            code: None,
            message: "bad secret".to_string(),
        });
        let health = service.health_check().await;
        assert!(!health.healthy);
        assert_eq!(health.status, "error");
        assert_eq!(health.error.as_deref(), Some("Authentication failed: bad secret"));
    }
}
