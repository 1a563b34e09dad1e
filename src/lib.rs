//! # dotlottie
//!
//! Pack Lottie animation JSON into `.lottie` archives and load them back.
//!
//! A `.lottie` file is a zip container holding `manifest.json`, one JSON
//! document per animation under `animations/` and optional assets under
//! `images/`. Besides the base animation an archive can carry themed
//! variants; the manifest maps each theme key (`light`, `dark` or any custom
//! name) to the animation that should be played for it.
//!
//! ## Features
//!
//! - Pack a local or remote animation plus theme variants into one archive
//! - Load archives from URLs, files, resource bundles or raw bytes
//! - Bounded LRU cache of unpacked archives keyed by source
//! - Async, blocking and callback flavors of every long-running operation
//!
//! ## Example
//!
//! ```no_run
//! use dotlottie::{ArchiveSource, Loader, PackRequest, Packager, ThemeKey, ThemeSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let request = PackRequest::new("wave.json", "out")
//!         .with_theme(ThemeSource::new(ThemeKey::dark(), "wave-night.json"));
//!     let archive = Packager::default().pack(&request).await?;
//!
//!     let handle = Loader::default().load(&ArchiveSource::file(archive)).await?;
//!     println!("{}", handle.animation_path(ThemeKey::DARK).display());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod error;
pub mod handle;
pub mod io;
pub mod layout;
pub mod loader;
pub mod manifest;
pub mod observer;
pub mod packager;
mod task;
pub mod theme;
pub mod zip;

pub use cache::{ArchiveCache, CacheProvider};
pub use cli::Cli;
pub use error::{ErrorKind, LoadError, PackageError};
pub use handle::{ArchiveHandle, ResolvedAnimation};
pub use io::{Fetch, FetchError, HttpFetcher, SourceUri, Transport};
pub use loader::{ArchiveSource, Bundle, Loader, LoaderConfig};
pub use manifest::{AnimationEntry, ColorOverride, Manifest, ManifestError, ThemeOverride};
pub use observer::{Event, NoopObserver, Observer, TracingObserver};
pub use packager::{PackOptions, PackRequest, Packager, PackagerConfig, ThemeSource};
pub use theme::ThemeKey;
