use std::fmt::{self, Write as _};

use crate::error::{ParleyError, Result};

const SPEAKER_PREFIX: &str = "Speaker ";
const FAILURE_PREFIX: &str = "Error during transcription: ";

/// One attributed utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerTurn {
    pub speaker: u8,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
}

/// The ordered result of a run. Immutable once assembled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    turns: Vec<SpeakerTurn>,
    failure: Option<String>,
}

/// Assemble turns, in the order given, into a transcript.
#[must_use]
pub fn assemble(turns: Vec<SpeakerTurn>) -> Transcript {
    Transcript {
        turns,
        failure: None,
    }
}

impl Transcript {
    /// Attach the message of a fault that ended the run early.
    #[must_use]
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    #[must_use]
    pub fn turns(&self) -> &[SpeakerTurn] {
        &self.turns
    }

    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.failure.is_none()
    }

    /// Render as `Speaker N: text` blocks separated by blank lines.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            let _ = write!(out, "{SPEAKER_PREFIX}{}: {}\n\n", turn.speaker, turn.text);
        }
        if let Some(message) = &self.failure {
            let _ = writeln!(out, "{FAILURE_PREFIX}{message}");
        }
        out
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Recover `(speaker, text)` pairs from a rendered transcript.
pub fn parse(rendered: &str) -> Result<Vec<(u8, String)>> {
    rendered
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(parse_block)
        .collect()
}

fn parse_block(block: &str) -> Result<(u8, String)> {
    let malformed = || ParleyError::Output(format!("malformed transcript block: {block:?}"));

    let rest = block.strip_prefix(SPEAKER_PREFIX).ok_or_else(malformed)?;
    let (id, text) = rest.split_once(": ").ok_or_else(malformed)?;
    let speaker = id.parse::<u8>().map_err(|_| malformed())?;
    Ok((speaker, text.to_string()))
}
