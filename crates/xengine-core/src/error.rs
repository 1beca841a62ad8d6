//! Error types for the engine

use thiserror::Error;

/// The main error type for engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid map/terrain/config values. Fatal to the load that raised it.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load asset '{path}': {reason}")]
    AssetLoad { path: String, reason: String },

    /// Malformed or truncated binary data
    #[error("Format error: {0}")]
    Format(String),

    #[error("Recursive load of '{0}' while it is still initializing")]
    RecursiveLoad(String),

    #[error("Script error at line {line}: {message}")]
    Script { line: usize, message: String },

    #[error("GPU state error: {0}")]
    GpuState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

impl EngineError {
    /// Wrap any error raised while loading `path` as an asset load failure.
    ///
    /// Errors that already are asset load failures (nested loads) pass through.
    pub fn into_asset_load(self, path: &str) -> Self {
        match self {
            EngineError::AssetLoad { .. } | EngineError::RecursiveLoad(_) => self,
            other => EngineError::AssetLoad {
                path: path.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// True for configuration-class errors (abort the map/level load)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration(_) | EngineError::Script { .. } | EngineError::TomlParse(_)
        )
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::TomlParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_errors_become_asset_load_errors() {
        let err = EngineError::Format("truncated".into()).into_asset_load("tank.xmesh");
        match err {
            EngineError::AssetLoad { path, reason } => {
                assert_eq!(path, "tank.xmesh");
                assert!(reason.contains("truncated"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nested_asset_errors_keep_inner_path() {
        let inner = EngineError::AssetLoad {
            path: "grass.tga".into(),
            reason: "missing".into(),
        };
        match inner.into_asset_load("tank.xmesh") {
            EngineError::AssetLoad { path, .. } => assert_eq!(path, "grass.tga"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
