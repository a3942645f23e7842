pub mod controller;
pub mod engine;

pub use controller::{ExtractionController, ExtractionPhase, ExtractionProgress};
pub use engine::{OcrEngine, PendingImage, RecognizedText};
