use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Key selecting a theme/appearance variant.
///
/// `dark` and `light` are reserved, any other string is a custom key.
/// Equality, ordering and hashing follow the underlying string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeKey(String);

impl ThemeKey {
    pub const DARK: &'static str = "dark";
    pub const LIGHT: &'static str = "light";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn dark() -> Self {
        Self::new(Self::DARK)
    }

    pub fn light() -> Self {
        Self::new(Self::LIGHT)
    }

    /// Key the base animation is always registered under.
    pub fn default_key() -> Self {
        Self::light()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_reserved(&self) -> bool {
        self.0 == Self::DARK || self.0 == Self::LIGHT
    }
}

impl From<&str> for ThemeKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ThemeKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl Borrow<str> for ThemeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ThemeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThemeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
