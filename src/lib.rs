pub mod audio;
pub mod config;
pub mod error;
#[cfg(any(feature = "whisper", feature = "vosk"))]
pub mod models;
pub mod output;
pub mod pipeline;
pub mod segment;
pub mod speaker;
pub mod stt;
pub mod transcript;
