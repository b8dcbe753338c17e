//! Application directory ("drawer") scanning.
//!
//! A scan walks every launchable component the host reports, annotates it
//! with the store's dock flags, and publishes incremental batches so the UI
//! stays responsive during a full rebuild. A newly requested scan cancels the
//! in-flight one; cancellation is cooperative and checked between
//! applications.

use std::sync::Arc;

use log::{error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::icon::{resolve_icon, IconCache};
use crate::model::AppEntry;
use crate::registry::{ComponentRegistry, InstalledComponent};

/// Resolved entries between incremental publishes.
const PUBLISH_EVERY: usize = 5;

#[derive(Debug, Clone)]
pub enum DirectoryUpdate {
    /// Snapshot of everything resolved so far; more is coming.
    Partial(Vec<AppEntry>),
    /// The finished, label-sorted directory.
    Complete(Vec<AppEntry>),
}

pub struct DirectoryScanner {
    db: Database,
    registry: Arc<dyn ComponentRegistry>,
    icons: Arc<IconCache>,
    icon_px: u32,
    cancel_token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl DirectoryScanner {
    pub fn new(
        db: Database,
        registry: Arc<dyn ComponentRegistry>,
        icons: Arc<IconCache>,
        icon_px: u32,
    ) -> Self {
        Self {
            db,
            registry,
            icons,
            icon_px,
            cancel_token: None,
            handle: None,
        }
    }

    /// Start a fresh scan, superseding any in-flight one. Updates arrive on
    /// the given channel; dropping the receiver quietly ends the scan.
    pub fn refresh(&mut self, updates: mpsc::Sender<DirectoryUpdate>) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let token = CancellationToken::new();
        self.handle = Some(tokio::spawn(scan(
            self.db.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.icons),
            self.icon_px,
            token.clone(),
            updates,
        )));
        self.cancel_token = Some(token);
    }

    pub async fn shutdown(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                error!("directory scan task failed to join: {err}");
            }
        }
    }
}

async fn scan(
    db: Database,
    registry: Arc<dyn ComponentRegistry>,
    icons: Arc<IconCache>,
    icon_px: u32,
    token: CancellationToken,
    updates: mpsc::Sender<DirectoryUpdate>,
) {
    let mut components = registry.query_launchable();
    components.sort_by(|a, b| sort_label(a).cmp(&sort_label(b)));

    let mut entries = Vec::with_capacity(components.len());

    for component in components {
        if token.is_cancelled() {
            info!("directory scan superseded, stopping early");
            return;
        }
        if !component.key.is_valid() {
            continue;
        }

        let key = component.key.clone();
        let flags = async {
            let disabled = db.is_disabled(key.clone()).await?;
            let sticky = db.is_sticky(key.clone()).await?;
            anyhow::Ok((disabled, sticky))
        };
        let (disabled, sticky) = match flags.await {
            Ok(flags) => flags,
            Err(err) => {
                error!("failed to read dock flags for {key}: {err:#}");
                return;
            }
        };

        let label = component
            .label
            .unwrap_or_else(|| component.key.class.clone());
        let icon = resolve_icon(&icons, icon_px, &key.cache_key(), component.icon).await;

        entries.push(AppEntry {
            key,
            label,
            icon,
            disabled,
            sticky,
        });

        if entries.len() % PUBLISH_EVERY == 0
            && updates
                .send(DirectoryUpdate::Partial(entries.clone()))
                .await
                .is_err()
        {
            // Receiver gone; the UI no longer wants this scan.
            return;
        }
    }

    if token.is_cancelled() {
        return;
    }

    let _ = updates.send(DirectoryUpdate::Complete(entries)).await;
}

/// Case-insensitive label ordering, falling back to the class name for
/// unlabeled components.
fn sort_label(component: &InstalledComponent) -> (String, String) {
    let label = component
        .label
        .clone()
        .unwrap_or_else(|| component.key.class.clone());
    (label.to_lowercase(), label)
}
