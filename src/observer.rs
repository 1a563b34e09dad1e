//! Diagnostics hook injected through configuration.

use std::path::Path;

use crate::theme::ThemeKey;

/// Something worth reporting while packing or loading.
#[derive(Debug)]
pub enum Event<'a> {
    CacheHit {
        key: &'a str,
    },
    CacheMiss {
        key: &'a str,
    },
    Fetching {
        source: &'a str,
    },
    Extracted {
        key: &'a str,
        dir: &'a Path,
        files: usize,
    },
    Loaded {
        key: &'a str,
        animations: usize,
        images: usize,
    },
    /// A theme override was left out of the archive.
    OverrideSkipped {
        key: &'a ThemeKey,
        source: &'a str,
        reason: String,
    },
    Packed {
        archive: &'a Path,
    },
}

pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event<'_>);
}

/// Discards every event. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &Event<'_>) {}
}

/// Forwards events to `tracing`; skipped overrides are warnings, the rest debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &Event<'_>) {
        match event {
            Event::CacheHit { key } => tracing::debug!("cache hit: {key}"),
            Event::CacheMiss { key } => tracing::debug!("cache miss: {key}"),
            Event::Fetching { source } => tracing::debug!("fetching {source}"),
            Event::Extracted { key, dir, files } => {
                tracing::debug!("extracted {files} files for {key} into {}", dir.display());
            }
            Event::Loaded {
                key,
                animations,
                images,
            } => tracing::debug!("loaded {key}: {animations} animations, {images} images"),
            Event::OverrideSkipped {
                key,
                source,
                reason,
            } => tracing::warn!("skipping theme '{key}' from {source}: {reason}"),
            Event::Packed { archive } => tracing::info!("created {}", archive.display()),
        }
    }
}
