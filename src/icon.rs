//! Icon decoding, scaling and the process-wide icon memo cache.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use image::imageops::FilterType;
use log::{debug, warn};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// Icon edge length in dp before density scaling.
const DEFAULT_ICON_DP: u32 = 60;

/// Cache key reserved for the built-in placeholder icon.
pub const PLACEHOLDER_KEY: &str = "ic_launcher";

/// Share of total memory the icon cache may use.
const CACHE_SHARE: u64 = 3;
const MEBI: u64 = 1024 * 1024;
/// Fallback capacity when total memory cannot be determined.
const DEFAULT_CACHE_SIZE: u64 = CACHE_SHARE * MEBI;

/// A decoded, pre-scaled RGBA icon. Cheap to clone; pixel data is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl Icon {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.pixels
    }

    /// Decoded footprint, used for cache accounting.
    pub fn byte_count(&self) -> usize {
        self.pixels.len()
    }
}

/// Pixel edge length for icons at a given display density.
pub fn icon_px(density: f32) -> u32 {
    ((DEFAULT_ICON_DP as f32) * density).round().max(1.0) as u32
}

/// Decode a raw encoded image and scale it to a fixed square.
pub fn decode_and_scale(raw: &[u8], target_px: u32) -> Result<Icon> {
    let decoded = image::load_from_memory(raw).context("failed to decode icon image")?;
    let scaled = decoded
        .resize_exact(target_px, target_px, FilterType::Nearest)
        .to_rgba8();

    Ok(Icon {
        width: target_px,
        height: target_px,
        pixels: scaled.into_raw().into(),
    })
}

/// Neutral fallback icon for components without a usable image.
pub fn placeholder(target_px: u32) -> Icon {
    let mut pixels = Vec::with_capacity((target_px * target_px * 4) as usize);
    for _ in 0..(target_px * target_px) {
        pixels.extend_from_slice(&[0x80, 0x80, 0x80, 0xff]);
    }

    Icon {
        width: target_px,
        height: target_px,
        pixels: pixels.into(),
    }
}

struct CacheState {
    entries: HashMap<String, Icon>,
    /// Most recently used keys at the front.
    order: VecDeque<String>,
    used_bytes: usize,
    evictions: u64,
    eviction_baseline: u64,
}

/// Bounded, byte-accounted memo cache for decoded icons.
///
/// Capacity is a third of total system memory, with a small fixed floor when
/// that cannot be determined. Internally synchronized; safe to share across
/// background workers.
pub struct IconCache {
    max_bytes: usize,
    state: Mutex<CacheState>,
}

impl IconCache {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::new().with_ram()),
        );

        let mut max = DEFAULT_CACHE_SIZE;
        let total = system.total_memory();
        if total > 0 {
            max = total / CACHE_SHARE;
        }

        debug!("icon cache capacity: {} bytes", max);
        Self::with_capacity(max as usize)
    }

    pub fn with_capacity(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                used_bytes: 0,
                evictions: 0,
                eviction_baseline: 0,
            }),
        }
    }

    /// Look up an icon. Never blocks on I/O; a miss returns `None`.
    pub fn get(&self, key: &str) -> Option<Icon> {
        let mut state = self.lock();

        let icon = state.entries.get(key).cloned()?;
        if let Some(pos) = state.order.iter().position(|k| k == key) {
            let recent = state.order.remove(pos).unwrap_or_else(|| key.to_string());
            state.order.push_front(recent);
        }

        Some(icon)
    }

    /// Memoize an icon. Rejected while the cache has been evicting since the
    /// last `invalidate` (thrash guard under memory pressure, not a strict
    /// capacity check).
    pub fn put(&self, key: &str, icon: Icon) {
        let mut state = self.lock();

        if state.evictions > state.eviction_baseline {
            debug!("icon cache under pressure, not caching {key}");
            return;
        }

        let size = icon.byte_count();
        if size > self.max_bytes {
            warn!("icon for {key} ({size} bytes) exceeds cache capacity, skipping");
            return;
        }

        if let Some(old) = state.entries.insert(key.to_string(), icon) {
            state.used_bytes -= old.byte_count();
            state.order.retain(|k| k != key);
        }
        state.order.push_front(key.to_string());
        state.used_bytes += size;

        while state.used_bytes > self.max_bytes {
            let Some(victim) = state.order.pop_back() else {
                break;
            };
            if let Some(evicted) = state.entries.remove(&victim) {
                state.used_bytes -= evicted.byte_count();
            }
            state.evictions += 1;
        }
    }

    /// Drop all entries and reset the eviction baseline.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        state.used_bytes = 0;
        state.eviction_baseline = state.evictions;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for IconCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve an icon for a cache key: memoized copy if present, otherwise
/// decode-scale-store, otherwise the shared placeholder. Decoding runs on a
/// blocking worker; failures degrade to the placeholder rather than surface.
pub async fn resolve_icon(
    cache: &IconCache,
    target_px: u32,
    key: &str,
    raw: Option<Vec<u8>>,
) -> Icon {
    if let Some(icon) = cache.get(key) {
        return icon;
    }

    if let Some(raw) = raw {
        let decoded =
            tokio::task::spawn_blocking(move || decode_and_scale(&raw, target_px)).await;

        match decoded {
            Ok(Ok(icon)) => {
                cache.put(key, icon.clone());
                return icon;
            }
            Ok(Err(err)) => warn!("failed to decode icon for {key}: {err:#}"),
            Err(err) => warn!("icon decode worker failed for {key}: {err}"),
        }
    }

    fallback_icon(cache, target_px)
}

fn fallback_icon(cache: &IconCache, target_px: u32) -> Icon {
    if let Some(icon) = cache.get(PLACEHOLDER_KEY) {
        return icon;
    }

    let icon = placeholder(target_px);
    cache.put(PLACEHOLDER_KEY, icon.clone());
    icon
}
