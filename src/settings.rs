use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::model::WidgetLayout;

/// The two durable widget slots: bound identifier and chosen layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSlot {
    pub app_widget_id: i32,
    pub layout: WidgetLayout,
}

impl Default for WidgetSlot {
    fn default() -> Self {
        Self {
            app_widget_id: -1,
            layout: WidgetLayout::FullScreen,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LauncherSettings {
    widget: WidgetSlot,
}

/// Write-through JSON settings file. Reads are served from an in-memory
/// snapshot; every update persists before returning.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<LauncherSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            LauncherSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn widget_slot(&self) -> WidgetSlot {
        self.data.read().unwrap().widget
    }

    pub fn update_widget_slot(&self, slot: WidgetSlot) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            guard.widget = slot;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &LauncherSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
