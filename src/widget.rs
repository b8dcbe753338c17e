//! Lifecycle of the single hosted home-screen widget.
//!
//! The machine owns the host registry handle and the persisted widget slot;
//! externally visible side effects (view creation, permission and configure
//! hand-offs) are emitted as commands for the UI layer to act on.

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use crate::model::{ComponentKey, WidgetLayout};
use crate::registry::{ComponentRegistry, WidgetHost, WidgetProvider};
use crate::settings::{SettingsStore, WidgetSlot};

/// Persisted identifier meaning "no widget bound".
pub const UNBOUND_ID: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetState {
    Unbound,
    AwaitingBindPermission { id: i32, provider: ComponentKey },
    AwaitingConfigure { id: i32 },
    Bound { id: i32 },
}

/// Side effects for the UI layer. The core never touches views itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetCommand {
    RequestBindPermission { id: i32, provider: ComponentKey },
    LaunchConfigure { id: i32, component: ComponentKey },
    ShowWidget { id: i32, provider: WidgetProvider },
    RemoveView,
}

pub struct WidgetLifecycle {
    host: Box<dyn WidgetHost>,
    settings: Arc<SettingsStore>,
    state: WidgetState,
    /// Identifier whose host view is currently attached, for idempotent
    /// show/remove commands.
    shown_id: Option<i32>,
}

impl WidgetLifecycle {
    pub fn new(host: Box<dyn WidgetHost>, settings: Arc<SettingsStore>) -> Self {
        Self {
            host,
            settings,
            state: WidgetState::Unbound,
            shown_id: None,
        }
    }

    pub fn state(&self) -> &WidgetState {
        &self.state
    }

    pub fn layout(&self) -> WidgetLayout {
        self.settings.widget_slot().layout
    }

    /// Installed providers the user may pick from, sorted by label.
    /// Providers whose configure activity is not exported are filtered out;
    /// launching them would be rejected by the OS.
    pub fn available_providers(&self, registry: &dyn ComponentRegistry) -> Vec<WidgetProvider> {
        let mut providers: Vec<_> = registry
            .installed_widget_providers()
            .into_iter()
            .filter(|p| match &p.configure {
                Some(configure) => configure.exported,
                None => true,
            })
            .collect();
        providers.sort_by(|a, b| a.label.cmp(&b.label));
        providers
    }

    /// Start binding a chosen provider: allocate an identifier and try the
    /// implicit bind. Falls back to an explicit permission request when the
    /// host withholds the grant.
    pub fn choose_provider(&mut self, provider: &WidgetProvider) -> Result<Vec<WidgetCommand>> {
        let id = self.host.allocate_id();

        if self.host.bind_if_allowed(id, &provider.provider) {
            self.after_bind(id)
        } else {
            info!("bind for widget {id} requires permission");
            self.state = WidgetState::AwaitingBindPermission {
                id,
                provider: provider.provider.clone(),
            };
            Ok(vec![WidgetCommand::RequestBindPermission {
                id,
                provider: provider.provider.clone(),
            }])
        }
    }

    /// Resume after the host's bind-permission UI returned.
    pub fn bind_permission_result(&mut self, granted: bool) -> Result<Vec<WidgetCommand>> {
        let WidgetState::AwaitingBindPermission { id, .. } = self.state.clone() else {
            return Ok(Vec::new());
        };

        if granted {
            self.after_bind(id)
        } else {
            info!("bind permission denied for widget {id}");
            self.abandon(id);
            Ok(Vec::new())
        }
    }

    /// Resume after the provider's configure activity finished.
    pub fn configure_result(&mut self, ok: bool) -> Result<Vec<WidgetCommand>> {
        let WidgetState::AwaitingConfigure { id } = &self.state else {
            return Ok(Vec::new());
        };
        let id = *id;

        if ok {
            self.complete_bind(id)
        } else {
            info!("configure aborted for widget {id}");
            self.abandon(id);
            Ok(Vec::new())
        }
    }

    /// Explicit removal: release the identifier, clear the persisted slot and
    /// reset the layout to full screen.
    pub fn remove_widget(&mut self) -> Result<Vec<WidgetCommand>> {
        let slot = self.settings.widget_slot();
        if slot.app_widget_id > UNBOUND_ID {
            self.host.delete_id(slot.app_widget_id);
        }
        self.settings.update_widget_slot(WidgetSlot::default())?;
        self.state = WidgetState::Unbound;

        if self.shown_id.take().is_some() {
            Ok(vec![WidgetCommand::RemoveView])
        } else {
            Ok(Vec::new())
        }
    }

    /// Geometry-only update; the identifier and hosted view stay untouched.
    pub fn set_layout(&mut self, layout: WidgetLayout) -> Result<()> {
        let mut slot = self.settings.widget_slot();
        slot.layout = layout;
        self.settings.update_widget_slot(slot)
    }

    /// Re-establish state from the persisted slot after a process restart.
    /// A persisted identifier the registry no longer recognizes resets the
    /// slot and leaves the machine unbound.
    pub fn restore(&mut self) -> Result<Vec<WidgetCommand>> {
        let slot = self.settings.widget_slot();

        if slot.app_widget_id > UNBOUND_ID {
            if self.host.provider_info(slot.app_widget_id).is_some() {
                self.state = WidgetState::Bound {
                    id: slot.app_widget_id,
                };
                return self.show_current();
            }

            warn!(
                "persisted widget {} no longer resolves, resetting slot",
                slot.app_widget_id
            );
            self.settings.update_widget_slot(WidgetSlot::default())?;
        }

        self.state = WidgetState::Unbound;
        Ok(Vec::new())
    }

    /// Emit the view for the bound widget. Idempotent: a second call with an
    /// unchanged identifier emits nothing.
    pub fn show_current(&mut self) -> Result<Vec<WidgetCommand>> {
        let WidgetState::Bound { id } = &self.state else {
            return Ok(Vec::new());
        };
        let id = *id;
        if self.shown_id == Some(id) {
            return Ok(Vec::new());
        }

        match self.host.provider_info(id) {
            Some(provider) => {
                self.shown_id = Some(id);
                Ok(vec![WidgetCommand::ShowWidget { id, provider }])
            }
            None => {
                // The registry invalidated the id out from under us.
                warn!("widget {id} vanished from the host registry");
                self.settings.update_widget_slot(WidgetSlot::default())?;
                self.state = WidgetState::Unbound;

                if self.shown_id.take().is_some() {
                    Ok(vec![WidgetCommand::RemoveView])
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }

    fn after_bind(&mut self, id: i32) -> Result<Vec<WidgetCommand>> {
        let Some(info) = self.host.provider_info(id) else {
            warn!("widget {id} bound but reports no provider, abandoning");
            self.abandon(id);
            return Ok(Vec::new());
        };

        match info.configure {
            Some(configure) if configure.exported => {
                self.state = WidgetState::AwaitingConfigure { id };
                Ok(vec![WidgetCommand::LaunchConfigure {
                    id,
                    component: configure.component,
                }])
            }
            Some(configure) => {
                // Launching a non-exported activity trips an OS security
                // exception; skip the whole setup instead.
                warn!(
                    "configure activity {} is not exported, abandoning widget {id}",
                    configure.component
                );
                self.abandon(id);
                Ok(Vec::new())
            }
            None => self.complete_bind(id),
        }
    }

    fn complete_bind(&mut self, id: i32) -> Result<Vec<WidgetCommand>> {
        let mut commands = Vec::new();

        let slot = self.settings.widget_slot();
        if slot.app_widget_id > UNBOUND_ID && slot.app_widget_id != id {
            self.host.delete_id(slot.app_widget_id);
        }
        if self.shown_id.take().is_some() {
            commands.push(WidgetCommand::RemoveView);
        }

        self.settings.update_widget_slot(WidgetSlot {
            app_widget_id: id,
            layout: slot.layout,
        })?;
        self.state = WidgetState::Bound { id };
        info!("widget {id} bound");

        commands.extend(self.show_current()?);
        Ok(commands)
    }

    fn abandon(&mut self, id: i32) {
        self.host.delete_id(id);
        self.state = WidgetState::Unbound;
    }
}
