pub mod artifacts;
pub mod markdown;

pub use artifacts::{write_artifacts, ArtifactPaths};
