//! Remote document archive for the ODV back-office
//!
//! - [`GraphClient`]: OneDrive access through Microsoft Graph
//! - [`FolderPathResolver`] and [`FolderEnsurer`]: archive layout and
//!   single-flight folder creation
//! - [`ArchiveService`]: uploads, share links and health checks
//! - [`ReportPipeline`]: generated text to a filled, archived report
//!
//! # Example
//!
//! ```no_run
//! use odv_core::{AppConfig, ClientInfo, FileType, NoopNotifier};
//! use odv_drive::ArchiveService;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let archive = ArchiveService::from_config(&config, Arc::new(NoopNotifier))?;
//!
//!     let client = ClientInfo::new("Studio Rossi", None);
//!     let uploaded = archive
//!         .upload_file(b"...", "riunione.mp3", &FileType::Audio, Some(&client))
//!         .await?;
//!
//!     println!("{}", uploaded.folder_path);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod folders;
pub mod memory;
pub mod pipeline;
pub mod service;

pub use api::{DriveApi, DriveItem, ParentRef};
pub use auth::{ClientCredentials, StaticToken, TokenCache, TokenProvider};
pub use client::GraphClient;
pub use error::{DriveError, Result};
pub use folders::{sanitize_client_name, FolderEnsurer, FolderPathResolver};
pub use memory::InMemoryDrive;
pub use pipeline::{RenderedReport, ReportPipeline};
pub use service::{ArchiveService, FolderStatus, HealthReport, UploadedFile};
