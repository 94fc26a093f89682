//! Error types for bodyik

use thiserror::Error;

/// Main error type for bodyik
#[derive(Error, Debug)]
pub enum IkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Skeleton error: {0}")]
    Skeleton(#[from] SkeletonError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// Skeleton binding errors, raised once when a solver is built
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkeletonError {
    #[error("Missing required joint: {0}")]
    MissingJoint(&'static str),

    #[error("Legs must be fully assigned or fully absent (missing {0})")]
    IncompleteLegs(&'static str),

    #[error("Unknown joint name: {0}")]
    UnknownJoint(String),

    #[error("Bone index {index} out of range for joint {joint}")]
    BoneOutOfRange { joint: &'static str, index: usize },

    #[error("Could not determine the {side} hand's {axis} axis")]
    MissingHandAxis { side: &'static str, axis: &'static str },

    #[error("Pose layout does not match the bound skeleton: {0}")]
    LayoutChanged(String),

    #[error("Non-finite transform on joint {0}")]
    NonFinite(&'static str),
}

/// Result type alias for bodyik operations
pub type Result<T> = std::result::Result<T, IkError>;
