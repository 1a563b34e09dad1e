//! `manifest.json`: the metadata document at the root of every archive.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::theme::ThemeKey;

/// Manifest format version written by the packager.
pub const MANIFEST_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("manifest lists no animations")]
    NoAnimations,
    #[error("animation id must not be empty")]
    EmptyAnimationId,
    #[error("duplicate animation id '{0}'")]
    DuplicateAnimationId(String),
    #[error("animation '{id}': speed must be a positive number, got {speed}")]
    InvalidSpeed { id: String, speed: f32 },
    #[error("{context}: '{color}' is not a #RGB or #RRGGBB color")]
    InvalidColor { context: String, color: String },
    #[error("theme '{0}' does not name an animation")]
    EmptyThemeAnimation(ThemeKey),
}

/// Playback direction, serialized as `1` or `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Direction {
    Forward,
    Reverse,
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::Forward),
            -1 => Ok(Direction::Reverse),
            other => Err(format!("direction must be 1 or -1, got {other}")),
        }
    }
}

impl From<Direction> for i8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    Normal,
    Bounce,
}

/// One animation shipped in the archive. `id` is also the file stem
/// under `animations/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationEntry {
    pub id: String,
    #[serde(rename = "loop")]
    pub loop_animation: bool,
    pub speed: f32,
    pub theme_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PlaybackMode>,
}

impl AnimationEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            loop_animation: true,
            speed: 1.0,
            theme_color: "#ffffff".to_owned(),
            direction: None,
            mode: None,
        }
    }
}

/// A per-layer color substitution. Carried through, never applied here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorOverride {
    pub layer: Vec<String>,
    pub color: String,
}

impl ColorOverride {
    pub fn new(layer: Vec<String>, color: impl Into<String>) -> Self {
        Self {
            layer,
            color: color.into(),
        }
    }

    /// Layer breadcrumb joined with `.`, e.g. `Group.Shape.Fill`.
    pub fn layer_key_path(&self) -> String {
        self.layer.join(".")
    }
}

/// Alternate animation for one theme key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeOverride {
    /// File stem under `animations/`.
    pub animation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_settings: Option<Vec<ColorOverride>>,
}

impl ThemeOverride {
    pub fn new(animation: impl Into<String>) -> Self {
        Self {
            animation: animation.into(),
            color_settings: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub animations: Vec<AnimationEntry>,
    pub version: String,
    pub author: String,
    pub generator: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub themes: BTreeMap<ThemeKey, ThemeOverride>,
}

/// Wire shape accepted on decode. Besides `themes`, archives written by
/// older tools carry `appearance`, a plain theme → animation-stem map.
#[derive(Deserialize)]
struct RawManifest {
    animations: Vec<AnimationEntry>,
    version: String,
    author: String,
    generator: String,
    #[serde(default)]
    themes: Option<BTreeMap<ThemeKey, ThemeOverride>>,
    #[serde(default)]
    appearance: Option<BTreeMap<ThemeKey, String>>,
}

impl Manifest {
    pub fn new(
        animations: Vec<AnimationEntry>,
        author: impl Into<String>,
        generator: impl Into<String>,
    ) -> Self {
        Self {
            animations,
            version: MANIFEST_VERSION.to_owned(),
            author: author.into(),
            generator: generator.into(),
            themes: BTreeMap::new(),
        }
    }

    /// Parse and validate. Unknown fields are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_slice(bytes)?;

        let themes = match (raw.themes, raw.appearance) {
            (Some(themes), _) => themes,
            (None, Some(appearance)) => appearance
                .into_iter()
                .map(|(key, animation)| (key, ThemeOverride::new(animation)))
                .collect(),
            (None, None) => BTreeMap::new(),
        };

        let manifest = Self {
            animations: raw.animations,
            version: raw.version,
            author: raw.author,
            generator: raw.generator,
            themes,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        Self::decode(&fs::read(path)?)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.animations.is_empty() {
            return Err(ManifestError::NoAnimations);
        }

        let mut seen = HashSet::new();
        for entry in &self.animations {
            if entry.id.is_empty() {
                return Err(ManifestError::EmptyAnimationId);
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ManifestError::DuplicateAnimationId(entry.id.clone()));
            }
            if !(entry.speed.is_finite() && entry.speed > 0.0) {
                return Err(ManifestError::InvalidSpeed {
                    id: entry.id.clone(),
                    speed: entry.speed,
                });
            }
            check_color(&entry.theme_color, || format!("animation '{}'", entry.id))?;
        }

        for (key, theme) in &self.themes {
            if theme.animation.is_empty() {
                return Err(ManifestError::EmptyThemeAnimation(key.clone()));
            }
            for setting in theme.color_settings.iter().flatten() {
                check_color(&setting.color, || {
                    format!("theme '{key}' layer '{}'", setting.layer_key_path())
                })?;
            }
        }

        Ok(())
    }

    pub fn animation(&self, id: &str) -> Option<&AnimationEntry> {
        self.animations.iter().find(|a| a.id == id)
    }

    pub fn theme(&self, key: &str) -> Option<&ThemeOverride> {
        self.themes.get(key)
    }

    /// The first listed animation, which is the base one for packaged archives.
    pub fn default_animation(&self) -> Option<&AnimationEntry> {
        self.animations.first()
    }
}

/// `#RGB` or `#RRGGBB`.
pub fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

fn check_color(color: &str, context: impl FnOnce() -> String) -> Result<(), ManifestError> {
    if is_hex_color(color) {
        Ok(())
    } else {
        Err(ManifestError::InvalidColor {
            context: context(),
            color: color.to_owned(),
        })
    }
}
