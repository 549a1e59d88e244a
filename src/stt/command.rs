use std::io::{self, Write};
use std::process::Command;

use crate::config::SttConfig;
use crate::error::{ParleyError, Result};
use crate::segment::AudioUnit;

use super::{RecognitionResult, SegmentRecognizer, encode_wav};

/// Replaced with the path of the unit's scratch WAV file.
const AUDIO_PLACEHOLDER: &str = "{audio}";

/// Runs an external recognizer executable once per unit.
///
/// The unit is written to a scratch WAV file that only lives for the
/// duration of the call. Whatever the program prints on stdout is taken as
/// the transcription.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(config: &SttConfig) -> Result<Self> {
        let (program, args) = config.command.split_first().ok_or_else(|| {
            ParleyError::Config("command backend requires stt.command to be set".to_string())
        })?;

        let mut args = args.to_vec();
        if !args.iter().any(|a| a.contains(AUDIO_PLACEHOLDER)) {
            args.push(AUDIO_PLACEHOLDER.to_string());
        }

        Ok(Self {
            program: program.clone(),
            args,
        })
    }

    fn transcribe(&self, unit: &AudioUnit) -> Result<String> {
        let wav_data = encode_wav(&unit.samples)?;

        // Removed on drop, whichever way this function returns.
        let mut scratch = tempfile::Builder::new()
            .prefix("parley-unit-")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| ParleyError::Stt(format!("failed to create scratch WAV: {e}")))?;
        scratch.write_all(&wav_data)?;
        scratch.flush()?;

        let audio_path = scratch.path().to_string_lossy().to_string();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(AUDIO_PLACEHOLDER, &audio_path))
            .collect();

        tracing::debug!("running {} for unit {}", self.program, unit.index);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ParleyError::Stt(format!("recognizer not found: {}", self.program))
                } else {
                    ParleyError::Stt(format!("failed to run {}: {e}", self.program))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ParleyError::Stt(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SegmentRecognizer for CommandEngine {
    fn recognize(&mut self, unit: &AudioUnit) -> RecognitionResult {
        RecognitionResult::from_outcome(self.transcribe(unit))
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn engine(command: &[&str]) -> CommandEngine {
        let config = SttConfig {
            backend: "command".to_string(),
            command: command.iter().map(ToString::to_string).collect(),
            ..SttConfig::default()
        };
        CommandEngine::new(&config).unwrap_or_else(|e| panic!("{e}"))
    }

    fn unit() -> AudioUnit {
        AudioUnit {
            index: 0,
            start_time: 0.0,
            end_time: 0.5,
            samples: vec![0.2; 8000],
        }
    }

    #[test]
    fn stdout_becomes_text_and_scratch_file_is_removed() {
        let mut engine = engine(&["echo", "{audio}"]);
        let result = engine.recognize(&unit());

        let RecognitionResult::Text(path) = &result else {
            panic!("expected text, got {result:?}");
        };
        assert!(path.contains("parley-unit-"));
        assert!(!Path::new(path).exists());
    }

    #[test]
    fn scratch_file_is_removed_when_the_command_fails() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let log = dir.path().join("seen-path");
        let log_arg = log.to_string_lossy().to_string();
        let mut engine = engine(&[
            "sh",
            "-c",
            "echo \"$0\" > \"$1\"; exit 1",
            "{audio}",
            log_arg.as_str(),
        ]);

        let result = engine.recognize(&unit());
        assert!(matches!(result, RecognitionResult::ServiceError(_)));

        let seen = std::fs::read_to_string(&log).unwrap_or_else(|e| panic!("{e}"));
        let scratch = seen.trim();
        assert!(scratch.contains("parley-unit-"));
        assert!(!Path::new(scratch).exists());
    }

    #[test]
    fn scratch_file_holds_the_unit_during_the_call() {
        let mut engine = engine(&["sh", "-c", "test -s \"$0\" && echo present", "{audio}"]);
        assert_eq!(
            engine.recognize(&unit()),
            RecognitionResult::Text("present".to_string())
        );
    }

    #[test]
    fn placeholder_is_appended_when_missing() {
        let engine = engine(&["whisper-cli", "-nt"]);
        assert_eq!(engine.args, vec!["-nt".to_string(), AUDIO_PLACEHOLDER.to_string()]);
    }

    #[test]
    fn silent_output_is_no_speech() {
        let mut engine = engine(&["true"]);
        assert_eq!(engine.recognize(&unit()), RecognitionResult::NoSpeech);
    }

    #[test]
    fn failing_command_is_service_error() {
        let mut engine = engine(&["sh", "-c", "echo quota exceeded >&2; exit 3"]);
        let result = engine.recognize(&unit());
        assert!(matches!(result, RecognitionResult::ServiceError(ref m) if m.contains("quota exceeded")));
    }

    #[test]
    fn missing_program_is_service_error() {
        let mut engine = engine(&["parley-no-such-recognizer"]);
        assert!(matches!(
            engine.recognize(&unit()),
            RecognitionResult::ServiceError(_)
        ));
    }

    #[test]
    fn empty_command_is_config_error() {
        let config = SttConfig::default();
        assert!(matches!(
            CommandEngine::new(&config),
            Err(ParleyError::Config(_))
        ));
    }
}
