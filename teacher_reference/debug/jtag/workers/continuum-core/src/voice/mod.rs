pub mod orchestrator;
pub mod types;
pub mod tts;
pub mod stt;
pub mod vad;
pub mod call_server;
// pub mod voice_service;  // TODO: Add proto support to continuum-core
pub mod mixer;
pub mod handle;

pub use orchestrator::VoiceOrchestrator;
pub use types::*;
