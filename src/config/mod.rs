// Re-export all items from the submodules
mod artifact_types;
mod default_targets;
mod engine_config;

// Re-export artifact types
pub use artifact_types::{
    AcquisitionMethod,
    ArtifactFormat,
    ArtifactKind,
    MethodKind,
};

// Re-export engine config
pub use engine_config::{
    AcquisitionTarget,
    EngineConfig,
    load_or_create_config,
};
