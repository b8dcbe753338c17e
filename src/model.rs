//! Core data types shared across the store, ranking engine and widget host.

use serde::{Deserialize, Serialize};

use crate::icon::Icon;

/// Separator used when deriving a cache key from a component.
const KEY_SEPARATOR: char = '&';

/// Identity of a launchable component: package plus class name.
///
/// Equality is structural on both fields. A key with an empty package or
/// class cannot be resolved and is treated as invalid by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey {
    pub package: String,
    pub class: String,
}

impl ComponentKey {
    pub fn new(package: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class: class.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.package.is_empty() && !self.class.is_empty()
    }

    /// Key under which this component's icon is memoized.
    pub fn cache_key(&self) -> String {
        format!("{}{}{}", self.package, KEY_SEPARATOR, self.class)
    }
}

impl std::fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.package, self.class)
    }
}

/// One persisted row of the usage table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub key: ComponentKey,
    pub usage: i64,
    pub disabled: bool,
    pub sticky: bool,
}

/// A resolved, renderable application entry handed to the UI layer.
///
/// Never persisted; rebuilt by the ranking engine or directory scanner from
/// the store plus the component registry.
#[derive(Debug, Clone)]
pub struct AppEntry {
    pub key: ComponentKey,
    pub label: String,
    pub icon: Icon,
    pub disabled: bool,
    pub sticky: bool,
}

/// Fixed geometry presets for the hosted widget.
///
/// The widget occupies the named region of the available vertical space; the
/// remainder is split across two filler regions above and below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WidgetLayout {
    FullScreen,
    TopQuarter,
    TopThird,
    TopHalf,
    BottomHalf,
    BottomQuarter,
    Centered,
}

impl Default for WidgetLayout {
    fn default() -> Self {
        WidgetLayout::FullScreen
    }
}

/// Smallest available height for which fillers are still computed. Anything
/// below cannot host a second region and degenerates to zero-height fillers.
const MIN_FILLER_SPACE: u32 = 4;

impl WidgetLayout {
    /// Heights of the `(top, bottom)` filler regions for an available
    /// vertical space. `None` or too-small space yields `(0, 0)`.
    pub fn filler_heights(self, available: Option<u32>) -> (u32, u32) {
        let h = match available {
            Some(h) if h >= MIN_FILLER_SPACE => h,
            _ => return (0, 0),
        };

        match self {
            WidgetLayout::FullScreen => (0, 0),
            WidgetLayout::TopQuarter => (0, h * 3 / 4),
            WidgetLayout::TopThird => (0, h * 2 / 3),
            WidgetLayout::TopHalf => (0, h / 2),
            WidgetLayout::BottomHalf => (h / 2, 0),
            WidgetLayout::BottomQuarter => (h * 3 / 4, 0),
            WidgetLayout::Centered => (h / 4, h / 4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_key_equality_is_structural() {
        let a = ComponentKey::new("pkg.a", "Main");
        let b = ComponentKey::new("pkg.a", "Main");
        let c = ComponentKey::new("pkg.a", "Other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_fields_are_invalid() {
        assert!(!ComponentKey::new("", "Main").is_valid());
        assert!(!ComponentKey::new("pkg.a", "").is_valid());
        assert!(ComponentKey::new("pkg.a", "Main").is_valid());
    }

    #[test]
    fn cache_key_joins_package_and_class() {
        let key = ComponentKey::new("pkg.a", "Main");
        assert_eq!(key.cache_key(), "pkg.a&Main");
    }

    #[test]
    fn top_quarter_reserves_three_quarters_below() {
        assert_eq!(WidgetLayout::TopQuarter.filler_heights(Some(400)), (0, 300));
    }

    #[test]
    fn centered_reserves_a_quarter_on_each_side() {
        assert_eq!(WidgetLayout::Centered.filler_heights(Some(400)), (100, 100));
    }

    #[test]
    fn fillers_degenerate_without_space() {
        assert_eq!(WidgetLayout::Centered.filler_heights(None), (0, 0));
        assert_eq!(WidgetLayout::TopHalf.filler_heights(Some(2)), (0, 0));
        assert_eq!(WidgetLayout::FullScreen.filler_heights(Some(800)), (0, 0));
    }
}
