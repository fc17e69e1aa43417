//! Error types for the sifter library

use std::path::PathBuf;

/// Result type alias for sifter operations
pub type Result<T> = std::result::Result<T, SiftError>;

/// Error type for sifter operations.
///
/// Configuration and compile errors (column names, filter expressions,
/// option values) are fatal and surface before any scanning happens. Errors
/// that occur while scanning or parsing are normally recorded in the run
/// report instead of being returned; the variants below cover the cases where
/// an input as a whole cannot be processed.
#[derive(Debug, thiserror::Error)]
pub enum SiftError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown column name in a column list or directive
    #[error("Bad column name '{0}'")]
    UnknownColumn(String),

    /// Inverse marker used where the column list does not allow one
    #[error("Inverse marker '/' is not allowed in this column list: '{0}'")]
    InverseNotAllowed(String),

    /// Filter expression could not be parsed
    #[error("Bad filter argument: '{0}'")]
    FilterSyntax(String),

    /// Filter expression names an unknown column
    #[error("Bad column name in filter: '{0}'")]
    FilterColumn(String),

    /// Numeric filter literal that is not a base-10 integer
    #[error("Bad numeric value in filter: '{value}': {source}")]
    FilterNumber {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// Regular expression or glob pattern failed to compile
    #[error("Bad pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// AND/OR marker without two operands
    #[error("Filter expression AND/OR op: not enough arguments provided")]
    FilterArity,

    /// Snapshot content that cannot be loaded at all
    #[error("Snapshot error at line {line}: {message}")]
    Snapshot { line: usize, message: String },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    /// Path-related errors
    #[error("Path error at '{path}': {message}")]
    Path { path: PathBuf, message: String },

    /// Hash computation errors
    #[error("Hash computation error for '{path}': {message}")]
    Hash { path: PathBuf, message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Output worker errors
    #[error("Output error: {0}")]
    Output(String),

    /// Generic errors with context
    #[error("Error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl SiftError {
    /// Create a new path error
    pub fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new hash error
    pub fn hash_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Hash {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new snapshot error
    pub fn snapshot_error(line: usize, message: impl Into<String>) -> Self {
        Self::Snapshot {
            line,
            message: message.into(),
        }
    }

    /// Create a new pattern error
    pub fn pattern_error(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            source,
        }
    }

    /// True for errors raised while compiling configuration (column lists,
    /// filters, option values), as opposed to errors reading inputs.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownColumn(_)
                | Self::InverseNotAllowed(_)
                | Self::FilterSyntax(_)
                | Self::FilterColumn(_)
                | Self::FilterNumber { .. }
                | Self::Pattern { .. }
                | Self::FilterArity
                | Self::Config(_)
                | Self::ConfigFile(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SiftError::UnknownColumn("zz".to_string());
        assert_eq!(error.to_string(), "Bad column name 'zz'");

        let error = SiftError::FilterArity;
        assert_eq!(
            error.to_string(),
            "Filter expression AND/OR op: not enough arguments provided"
        );

        let error = SiftError::snapshot_error(3, "No column names were defined before data entries");
        assert_eq!(
            error.to_string(),
            "Snapshot error at line 3: No column names were defined before data entries"
        );
    }

    #[test]
    fn test_config_error_classification() {
        assert!(SiftError::FilterArity.is_config_error());
        assert!(SiftError::FilterSyntax("xx".into()).is_config_error());
        assert!(!SiftError::snapshot_error(1, "x").is_config_error());

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: SiftError = io_error.into();
        assert!(matches!(error, SiftError::Io(_)));
        assert!(!error.is_config_error());
    }
}
