//! Saved avatar texture lookup
//!
//! The avatar editor writes a data-URL image under a fixed key in a small
//! JSON key-value file. Anything missing or undecodable falls back to a flat
//! colour.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::warn;

/// Key the avatar editor stores the texture under
pub const AVATAR_TEXTURE_KEY: &str = "playerAvatarTexture";

/// Flat colour used when no texture is available
pub const DEFAULT_AVATAR_COLOR: &str = "#cccccc";

/// A validated `data:image/...;base64,...` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    raw: String,
    mime: String,
}

impl DataUrl {
    pub fn parse(raw: &str) -> Result<Self, AvatarError> {
        let rest = raw.strip_prefix("data:").ok_or(AvatarError::NotDataUrl)?;
        let (meta, payload) = rest.split_once(',').ok_or(AvatarError::NotDataUrl)?;
        let mime = meta
            .strip_suffix(";base64")
            .ok_or(AvatarError::NotBase64)?;
        if !mime.starts_with("image/") {
            return Err(AvatarError::NotImage(mime.to_string()));
        }
        STANDARD
            .decode(payload)
            .map_err(|_| AvatarError::NotBase64)?;

        Ok(Self {
            raw: raw.to_string(),
            mime: mime.to_string(),
        })
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Decoded image bytes
    pub fn bytes(&self) -> Vec<u8> {
        self.raw
            .split_once(',')
            .and_then(|(_, payload)| STANDARD.decode(payload).ok())
            .unwrap_or_default()
    }
}

/// How a player body is painted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Appearance {
    Texture(DataUrl),
    Color(String),
}

impl Appearance {
    /// Texture when the payload decodes, otherwise the default colour
    pub fn from_texture(texture: Option<&str>) -> Self {
        match texture.map(DataUrl::parse) {
            Some(Ok(url)) => Appearance::Texture(url),
            Some(Err(e)) => {
                warn!(error = %e, "Ignoring undecodable avatar texture");
                Self::default()
            }
            None => Self::default(),
        }
    }

    pub fn texture(&self) -> Option<&DataUrl> {
        match self {
            Appearance::Texture(url) => Some(url),
            Appearance::Color(_) => None,
        }
    }
}

impl Default for Appearance {
    fn default() -> Self {
        Appearance::Color(DEFAULT_AVATAR_COLOR.to_string())
    }
}

/// JSON file key-value store shared with the avatar editor
#[derive(Debug, Clone)]
pub struct AvatarStore {
    path: PathBuf,
}

impl AvatarStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, AvatarError> {
        Ok(self.read_all()?.remove(key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), AvatarError> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        let json = serde_json::to_string_pretty(&entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Appearance for the local player; never fails
    pub fn load_appearance(&self) -> Appearance {
        match self.get(AVATAR_TEXTURE_KEY) {
            Ok(texture) => Appearance::from_texture(texture.as_deref()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Avatar store unreadable");
                Appearance::default()
            }
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>, AvatarError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("Not a data URL")]
    NotDataUrl,

    #[error("Data URL payload is not valid base64")]
    NotBase64,

    #[error("Data URL is not an image: {0}")]
    NotImage(String),

    #[error("Avatar store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Avatar store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
