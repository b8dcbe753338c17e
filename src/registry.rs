//! Collaborator seams toward the host platform.
//!
//! The core never talks to an OS component registry or widget host directly;
//! it consumes these traits and the embedding front end supplies the real
//! implementations.

use crate::model::ComponentKey;

/// A launchable component as reported by the host platform.
#[derive(Debug, Clone)]
pub struct InstalledComponent {
    pub key: ComponentKey,
    pub label: Option<String>,
    /// Raw encoded icon bytes, decoded lazily by the core.
    pub icon: Option<Vec<u8>>,
    pub exported: bool,
    /// OS-level component enablement, distinct from the dock's disabled flag.
    pub enabled: bool,
}

/// Configuration activity declared by a widget provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureActivity {
    pub component: ComponentKey,
    pub exported: bool,
}

/// An installed widget provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetProvider {
    pub provider: ComponentKey,
    pub label: String,
    pub configure: Option<ConfigureActivity>,
}

/// Read access to the host platform's registry of installed components.
pub trait ComponentRegistry: Send + Sync {
    /// All exported components handling the main/launcher category.
    fn query_launchable(&self) -> Vec<InstalledComponent>;

    /// Resolve one component, or `None` when it is no longer installed.
    fn resolve(&self, key: &ComponentKey) -> Option<InstalledComponent>;

    /// All installed widget providers.
    fn installed_widget_providers(&self) -> Vec<WidgetProvider>;
}

/// The system-owned widget registry the host view surface is driven by.
///
/// Owned exclusively by the foreground component; not required to be `Send`.
pub trait WidgetHost {
    /// Allocate a fresh widget identifier.
    fn allocate_id(&mut self) -> i32;

    /// Try to bind an identifier to a provider without user interaction.
    /// Returns `false` when the host requires an explicit permission grant.
    fn bind_if_allowed(&mut self, id: i32, provider: &ComponentKey) -> bool;

    /// Release an identifier back to the registry.
    fn delete_id(&mut self, id: i32);

    /// Provider currently bound to an identifier, or `None` when the registry
    /// has invalidated it (provider uninstalled, id never bound).
    fn provider_info(&self, id: i32) -> Option<WidgetProvider>;
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;

    /// In-memory component registry whose contents tests mutate mid-flight.
    #[derive(Default)]
    pub struct FakeComponentRegistry {
        components: Mutex<HashMap<ComponentKey, InstalledComponent>>,
        providers: Mutex<Vec<WidgetProvider>>,
    }

    impl FakeComponentRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn install(&self, component: InstalledComponent) {
            self.components
                .lock()
                .unwrap()
                .insert(component.key.clone(), component);
        }

        pub fn install_simple(&self, package: &str, class: &str) -> ComponentKey {
            let key = ComponentKey::new(package, class);
            self.install(InstalledComponent {
                key: key.clone(),
                label: Some(class.to_string()),
                icon: None,
                exported: true,
                enabled: true,
            });
            key
        }

        pub fn uninstall(&self, key: &ComponentKey) {
            self.components.lock().unwrap().remove(key);
        }

        pub fn set_enabled(&self, key: &ComponentKey, enabled: bool) {
            if let Some(component) = self.components.lock().unwrap().get_mut(key) {
                component.enabled = enabled;
            }
        }

        pub fn add_provider(&self, provider: WidgetProvider) {
            self.providers.lock().unwrap().push(provider);
        }
    }

    impl ComponentRegistry for FakeComponentRegistry {
        fn query_launchable(&self) -> Vec<InstalledComponent> {
            self.components
                .lock()
                .unwrap()
                .values()
                .filter(|c| c.exported)
                .cloned()
                .collect()
        }

        fn resolve(&self, key: &ComponentKey) -> Option<InstalledComponent> {
            self.components.lock().unwrap().get(key).cloned()
        }

        fn installed_widget_providers(&self) -> Vec<WidgetProvider> {
            self.providers.lock().unwrap().clone()
        }
    }

    /// Scripted widget host recording every registry interaction.
    pub struct FakeWidgetHost {
        next_id: i32,
        pub grant_binds: bool,
        pub bound: HashMap<i32, WidgetProvider>,
        pub deleted: HashSet<i32>,
        providers: HashMap<ComponentKey, WidgetProvider>,
    }

    impl FakeWidgetHost {
        pub fn new(grant_binds: bool) -> Self {
            Self {
                next_id: 1,
                grant_binds,
                bound: HashMap::new(),
                deleted: HashSet::new(),
                providers: HashMap::new(),
            }
        }

        pub fn register_provider(&mut self, provider: WidgetProvider) {
            self.providers.insert(provider.provider.clone(), provider);
        }

        /// Simulate a persisted id surviving a restart already bound.
        pub fn preload_binding(&mut self, id: i32, provider: WidgetProvider) {
            self.bound.insert(id, provider);
            self.next_id = self.next_id.max(id + 1);
        }
    }

    impl WidgetHost for FakeWidgetHost {
        fn allocate_id(&mut self) -> i32 {
            let id = self.next_id;
            self.next_id += 1;
            id
        }

        fn bind_if_allowed(&mut self, id: i32, provider: &ComponentKey) -> bool {
            if !self.grant_binds {
                return false;
            }
            match self.providers.get(provider) {
                Some(info) => {
                    self.bound.insert(id, info.clone());
                    true
                }
                None => false,
            }
        }

        fn delete_id(&mut self, id: i32) {
            self.bound.remove(&id);
            self.deleted.insert(id);
        }

        fn provider_info(&self, id: i32) -> Option<WidgetProvider> {
            self.bound.get(&id).cloned()
        }
    }

    /// Grant a permission-gated bind after the fact, as the host's permission
    /// UI would.
    impl FakeWidgetHost {
        pub fn force_bind(&mut self, id: i32, provider: &ComponentKey) {
            if let Some(info) = self.providers.get(provider).cloned() {
                self.bound.insert(id, info);
            }
        }
    }
}
