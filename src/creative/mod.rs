pub mod synthesizer;
pub mod templates;

pub use synthesizer::CreativeSynthesizer;
