//! Command execution

use anyhow::{Context, Result};
use chrono::Utc;
use odv_core::{AppConfig, ClientInfo, Notifier};
use odv_drive::{ArchiveService, InMemoryDrive, ReportPipeline};
use odv_infra::{RetryPolicy, RetryingClient};
use odv_notify::NotificationHub;
use odv_report::{DocxDocument, MeetingDetails};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::cli::{Args, Command, RenderArgs};

/// Loaded configuration plus the parsed command.
pub struct App {
    args: Args,
    config: AppConfig,
    hub: NotificationHub,
}

impl App {
    pub fn new(args: Args, config: AppConfig) -> Self {
        let hub = NotificationHub::from_config(&config.notify);
        Self { args, config, hub }
    }

    pub async fn run(self) -> Result<()> {
        match &self.args.command {
            Command::Render(render) => self.render(render).await,
            Command::Paths { client } => {
                let archive = self.archive()?;
                let client = client.as_deref().map(|name| ClientInfo::new(name, None));
                print_json(&archive.folder_structure(client.as_ref(), Utc::now()))
            }
            Command::Ensure { path } => {
                let archive = self.archive()?;
                let id = archive
                    .ensure_folder(path)
                    .await
                    .with_context(|| format!("Failed to ensure folder '{path}'"))?;
                print_json(&json!({ "path": path, "id": id }))
            }
            Command::Upload {
                file,
                file_type,
                client,
                share,
            } => {
                let archive = self.archive()?;
                let client = client.as_deref().map(|name| ClientInfo::new(name, None));
                let uploaded = archive
                    .upload_path(file, file_type, client.as_ref())
                    .await
                    .with_context(|| format!("Failed to upload {}", file.display()))?;

                let share_link = match share {
                    Some(permission) => Some(
                        archive
                            .create_share_link(&uploaded.id, *permission)
                            .await
                            .context("Failed to create share link")?,
                    ),
                    None => None,
                };
                print_json(&json!({ "file": uploaded, "share_link": share_link }))
            }
            Command::Health => {
                let report = self.archive()?.health_check().await;
                print_json(&report)?;
                if !report.healthy {
                    anyhow::bail!("Remote store is not reachable");
                }
                Ok(())
            }
        }
    }

    async fn render(&self, args: &RenderArgs) -> Result<()> {
        let template_path = args.template.as_ref().unwrap_or(&self.config.report.template_path);
        let template = DocxDocument::open(template_path)
            .with_context(|| format!("Failed to open template {}", template_path.display()))?;
        let pipeline = ReportPipeline::new(template, self.config.report.substitution_mode);

        let generated = tokio::fs::read_to_string(&args.report)
            .await
            .with_context(|| format!("Failed to read {}", args.report.display()))?;
        let details = meeting_details(args);
        let rendered = pipeline.render(&generated, &details, Utc::now().date_naive())?;

        if args.archive {
            let archive = self.archive()?;
            let client = args.client.as_deref().map(|name| ClientInfo::new(name, None));
            let uploaded = ReportPipeline::archive_rendered(&archive, &rendered, &details, client.as_ref())
                .await
                .context("Failed to archive report")?;
            print_json(&uploaded)?;
        }

        if let Some(out) = &args.out {
            rendered
                .document
                .save(out)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!(out = %out.display(), "Report written");
            print_json(&json!({
                "out": out,
                "sections": rendered.sections,
                "fill": rendered.fill,
            }))?;
        }

        Ok(())
    }

    /// Archive service against OneDrive, or an empty in-memory store in
    /// dry-run mode.
    fn archive(&self) -> Result<ArchiveService> {
        let notifier: Arc<dyn Notifier> = Arc::new(self.hub.clone());

        if self.args.dry_run {
            info!("Dry run, using in-memory archive");
            let retry = RetryingClient::new(RetryPolicy::new((&self.config.retry).into()), notifier);
            return Ok(ArchiveService::new(Arc::new(InMemoryDrive::new()), &self.config.archive, retry));
        }

        ArchiveService::from_config(&self.config, notifier).context("OneDrive is not configured")
    }
}

fn meeting_details(args: &RenderArgs) -> MeetingDetails {
    MeetingDetails {
        verification: args.verification.clone(),
        report_number: args.number,
        location: args.location.clone(),
        meeting_date: args.meeting_date.clone(),
        start_time: args.start_time.clone(),
        end_time: args.end_time.clone(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
