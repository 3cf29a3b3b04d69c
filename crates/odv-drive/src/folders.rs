//! Archive folder layout and remote folder resolution
//!
//! [`FolderPathResolver`] computes where a document belongs. [`FolderEnsurer`]
//! turns that path into a remote folder id, creating missing segments once
//! and remembering every resolved prefix.

use chrono::{Datelike, Month};
use odv_core::{ArchiveConfig, ClientInfo, ConflictPolicy, FileType};
use odv_infra::{FolderCache, RetryingClient};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::api::{DriveApi, ParentRef};
use crate::error::{DriveError, Result};

/// Computes archive folder paths.
///
/// Layout: `<root>/<client>/<type>/<YYYY>/<MM-Month>`, or without the client
/// segment when no client is given.
#[derive(Debug, Clone)]
pub struct FolderPathResolver {
    root: String,
    unknown_client: String,
}

impl Default for FolderPathResolver {
    fn default() -> Self {
        Self::new(&ArchiveConfig::default())
    }
}

impl FolderPathResolver {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            root: config.root_folder.trim_matches('/').to_string(),
            unknown_client: config.unknown_client_folder.clone(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Folder path for a document of `file_type` stored at `date`.
    pub fn resolve<D: Datelike>(&self, file_type: &FileType, client: Option<&ClientInfo>, date: &D) -> String {
        let mut segments = vec![self.root.clone()];

        if let Some(client) = client {
            let name = sanitize_client_name(&client.name);
            segments.push(if name.is_empty() {
                self.unknown_client.clone()
            } else {
                name
            });
        }

        segments.push(file_type.folder_label().to_string());
        segments.push(format!("{:04}", date.year()));
        segments.push(month_folder(date.month()));

        segments.join("/")
    }
}

/// Keep alphanumerics, spaces, hyphens and underscores, then turn each run
/// of whitespace into a single underscore.
pub fn sanitize_client_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join("_")
}

fn month_folder(month: u32) -> String {
    let name = u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
        .unwrap_or("Unknown");

    format!("{month:02}-{name}")
}

/// Split a folder path into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Resolves folder paths to remote folder ids.
///
/// Every cumulative prefix of a resolved path is cached, so paths that share
/// leading segments reuse the parents already resolved. Concurrent callers
/// for the same prefix wait on a single lookup-or-create.
#[derive(Clone)]
pub struct FolderEnsurer {
    api: Arc<dyn DriveApi>,
    cache: Arc<FolderCache<String>>,
    retry: RetryingClient,
    policy: ConflictPolicy,
}

impl FolderEnsurer {
    pub fn new(api: Arc<dyn DriveApi>, retry: RetryingClient, policy: ConflictPolicy) -> Self {
        Self::with_cache(api, Arc::new(FolderCache::new()), retry, policy)
    }

    pub fn with_cache(
        api: Arc<dyn DriveApi>,
        cache: Arc<FolderCache<String>>,
        retry: RetryingClient,
        policy: ConflictPolicy,
    ) -> Self {
        Self {
            api,
            cache,
            retry,
            policy,
        }
    }

    pub fn cache(&self) -> &Arc<FolderCache<String>> {
        &self.cache
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Id of the folder at `path`, creating missing segments.
    #[instrument(skip(self))]
    pub async fn ensure(&self, path: &str) -> Result<String> {
        let segments = path_segments(path);
        if segments.is_empty() {
            return Err(DriveError::InvalidPath(path.to_string()));
        }

        let mut parent = ParentRef::Root;
        let mut prefix = String::new();

        for segment in segments {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);

            let current = parent.clone();
            let id = self
                .cache
                .get_or_try_init(&prefix, || self.resolve_segment(&current, segment, &prefix))
                .await?;

            parent = ParentRef::Item(id);
        }

        match parent {
            ParentRef::Item(id) => Ok(id),
            ParentRef::Root => Err(DriveError::InvalidPath(path.to_string())),
        }
    }

    /// Look `name` up under `parent` and create it when missing.
    async fn resolve_segment(&self, parent: &ParentRef, name: &str, prefix: &str) -> Result<String> {
        let api = &self.api;

        let existing = self
            .retry
            .execute(&format!("folder lookup {prefix}"), DriveError::class, move || {
                api.find_child_folder(parent, name)
            })
            .await?;

        if let Some(item) = existing {
            debug!(prefix, folder_id = %item.id, "Existing folder found");
            return Ok(item.id);
        }

        let policy = self.policy;
        let created = self
            .retry
            .execute(&format!("folder creation {prefix}"), DriveError::class, move || async move {
                match api.create_folder(parent, name, policy).await {
                    Err(e) if e.is_conflict() && policy == ConflictPolicy::GetExisting => {
                        // Created by someone else between lookup and create
                        api.find_child_folder(parent, name).await?.ok_or_else(|| {
                            DriveError::InvalidResponse(format!("folder '{name}' conflicts but cannot be found"))
                        })
                    }
                    other => other,
                }
            })
            .await?;

        info!(prefix, folder_id = %created.id, "Folder ensured");
        Ok(created.id)
    }
}

impl std::fmt::Debug for FolderEnsurer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderEnsurer")
            .field("policy", &self.policy)
            .field("cached_prefixes", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDrive;
    use chrono::{NaiveDate, TimeZone, Utc};
    use odv_core::NoopNotifier;
    use odv_infra::RetryPolicy;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn retry() -> RetryingClient {
        RetryingClient::new(RetryPolicy::fixed(2, Duration::from_millis(1)), Arc::new(NoopNotifier))
    }

    fn march_15() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
    }

    #[test]
    fn test_resolve_with_client() {
        let resolver = FolderPathResolver::default();
        let client = ClientInfo::new("Studio Rossi & C.", Some(1));

        assert_eq!(
            resolver.resolve(&FileType::Audio, Some(&client), &march_15()),
            "Modello231/Studio_Rossi_C/Audio/2025/03-March"
        );
    }

    #[test]
    fn test_resolve_without_client() {
        let resolver = FolderPathResolver::default();
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();

        assert_eq!(
            resolver.resolve(&FileType::Report, None, &at),
            "Modello231/Verbali/2024/12-December"
        );
        assert_eq!(
            resolver.resolve(&FileType::Other("fattura".into()), None, &at),
            "Modello231/Altri/2024/12-December"
        );
    }

    #[test]
    fn test_resolve_is_pure() {
        let resolver = FolderPathResolver::new(&ArchiveConfig::default().with_root_folder("/Archivio/"));
        let client = ClientInfo::new("Alfa S.p.A.", None);
        let first = resolver.resolve(&FileType::Transcript, Some(&client), &march_15());
        let later_same_month = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let second = resolver.resolve(&FileType::Transcript, Some(&client), &later_same_month);

        assert_eq!(first, "Archivio/Alfa_SpA/Trascrizioni/2025/03-March");
        assert_eq!(first, second);
    }

    #[test]
    fn test_client_name_without_usable_chars() {
        let resolver = FolderPathResolver::default();
        let client = ClientInfo::new("&&..", None);

        assert_eq!(
            resolver.resolve(&FileType::Document, Some(&client), &march_15()),
            "Modello231/Cliente_Sconosciuto/Documenti/2025/03-March"
        );
    }

    #[test]
    fn test_sanitize_client_name() {
        assert_eq!(sanitize_client_name("  Beta   Srl "), "Beta_Srl");
        assert_eq!(sanitize_client_name("Gamma-Uno_Due"), "Gamma-Uno_Due");
        assert_eq!(sanitize_client_name("Società Àlfa"), "Società_Àlfa");
        assert_eq!(sanitize_client_name("a/b\\c"), "abc");
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(path_segments("/A//B/ C /"), vec!["A", "B", "C"]);
        assert!(path_segments(" / ").is_empty());
    }

    #[tokio::test]
    async fn test_shared_prefix_is_created_once() {
        let drive = Arc::new(InMemoryDrive::new());
        let ensurer = FolderEnsurer::new(drive.clone(), retry(), ConflictPolicy::GetExisting);

        let c = ensurer.ensure("A/B/C").await.unwrap();
        let d = ensurer.ensure("A/B/D").await.unwrap();

        assert_ne!(c, d);
        assert_eq!(drive.created_paths(), vec!["A", "A/B", "A/B/C", "A/B/D"]);
        assert_eq!(ensurer.cache().len(), 4);
        assert_eq!(drive.folder_id("A/B/C"), Some(c));
    }

    #[tokio::test]
    async fn test_existing_folders_are_reused() {
        let drive = Arc::new(InMemoryDrive::new());
        drive.seed_folder("Modello231/Audio");
        let ensurer = FolderEnsurer::new(drive.clone(), retry(), ConflictPolicy::GetExisting);

        ensurer.ensure("Modello231/Audio/2025").await.unwrap();

        assert_eq!(drive.created_paths(), vec!["Modello231/Audio/2025"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_create_each_prefix_once() {
        let drive = Arc::new(InMemoryDrive::new().with_latency(Duration::from_millis(5)));
        let ensurer = FolderEnsurer::new(drive.clone(), retry(), ConflictPolicy::GetExisting);

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let ensurer = ensurer.clone();
                tokio::spawn(async move { ensurer.ensure("A/B/C").await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();

        assert_eq!(ids.len(), 1);
        assert_eq!(drive.created_paths(), vec!["A", "A/B", "A/B/C"]);
    }

    #[tokio::test]
    async fn test_conflict_resolves_to_existing_folder() {
        let drive = Arc::new(InMemoryDrive::new());
        // Lookup misses, the folder appears before the create lands
        drive.hide_next_lookup();
        let existing = drive.seed_folder("Modello231");
        let ensurer = FolderEnsurer::new(drive.clone(), retry(), ConflictPolicy::GetExisting);

        let id = ensurer.ensure("Modello231").await.unwrap();

        assert_eq!(id, existing);
        assert!(drive.created_paths().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_and_not_cached() {
        let drive = Arc::new(InMemoryDrive::new());
        drive.fail_next(DriveError::Server {
            status: 503,
            code: None,
            message: "busy".to_string(),
        });
        let ensurer = FolderEnsurer::new(drive.clone(), retry(), ConflictPolicy::GetExisting);

        ensurer.ensure("A").await.unwrap();
        assert_eq!(drive.created_paths(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_failed_segment_leaves_parents_cached() {
        let drive = Arc::new(InMemoryDrive::new());
        let ensurer = FolderEnsurer::new(drive.clone(), retry(), ConflictPolicy::GetExisting);
        ensurer.ensure("A").await.unwrap();

        drive.fail_next(DriveError::Quota {
            code: None,
            message: "full".to_string(),
        });
        let err = ensurer.ensure("A/B").await.unwrap_err();

        assert!(matches!(err, DriveError::Quota { .. }));
        assert!(ensurer.cache().contains("A"));
        assert!(!ensurer.cache().contains("A/B"));
    }

    #[tokio::test]
    async fn test_empty_path_rejected() {
        let ensurer = FolderEnsurer::new(Arc::new(InMemoryDrive::new()), retry(), ConflictPolicy::GetExisting);
        assert!(matches!(ensurer.ensure("//").await, Err(DriveError::InvalidPath(_))));
    }
}
