//! Per-theme image generation: the client boundary, the orchestrator that
//! fans calls out, and the store that collects their results.

pub mod client;
pub mod gemini;
pub mod orchestrator;
pub mod results;

pub use client::{EchoClient, GenerationClient, GenerationError, SourceImage};
pub use gemini::GeminiClient;
pub use orchestrator::{Orchestrator, PreparedRun, RunReport};
pub use results::{
    EntryState, GenerationEntry, ResultSnapshot, ResultStore, ResultTable, RunToken, Settlement,
};

/// A run was refused before any call was made.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationError {
    /// No photo has been uploaded.
    MissingImage,
    /// No theme is selected.
    EmptySelection,
    /// The subject's gender has not been chosen.
    UndeclaredGender,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::MissingImage => "Vui lòng tải ảnh lên.",
            Self::EmptySelection => "Vui lòng chọn ít nhất một chủ đề.",
            Self::UndeclaredGender => "Vui lòng chọn giới tính.",
        };
        f.write_str(message)
    }
}

impl std::error::Error for ValidationError {}
