use crate::config::{SpeakerConfig, SpeakerMode};
use crate::stt::{Capability, RecognizedUnit};
use crate::transcript::SpeakerTurn;

const FIRST_SPEAKER: u8 = 1;

/// Rule used to decide when the speaker changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributionMode {
    /// Flip when the silence since the previous utterance exceeds the threshold.
    Pause { threshold_secs: f64 },
    /// Flip on every utterance after the first.
    Index,
}

impl AttributionMode {
    /// Pick the mode for a run. `auto` trusts timestamps only from backends
    /// that produce their own.
    #[must_use]
    pub fn resolve(config: &SpeakerConfig, capability: Capability) -> Self {
        let pause = Self::Pause {
            threshold_secs: config.pause_threshold_secs,
        };
        match config.mode {
            SpeakerMode::Pause => pause,
            SpeakerMode::Index => Self::Index,
            SpeakerMode::Auto => match capability {
                Capability::TimestampedWhole => pause,
                Capability::BatchSegment | Capability::ChunkedStreaming => Self::Index,
            },
        }
    }
}

/// Two-speaker alternation state machine.
///
/// Units without text never flip the speaker, never produce a turn, and do
/// not move `last_end_time`.
#[derive(Debug, Clone)]
pub struct SpeakerAttribution {
    mode: AttributionMode,
    current_speaker: u8,
    last_end_time: Option<f64>,
    turns: Vec<SpeakerTurn>,
}

impl SpeakerAttribution {
    #[must_use]
    pub const fn new(mode: AttributionMode) -> Self {
        Self {
            mode,
            current_speaker: FIRST_SPEAKER,
            last_end_time: None,
            turns: Vec::new(),
        }
    }

    /// Attribute one unit, returning the emitted turn if it had text.
    pub fn attribute(&mut self, unit: &RecognizedUnit) -> Option<&SpeakerTurn> {
        let text = unit.result.text()?;

        if let Some(last_end) = self.last_end_time {
            let flip = match self.mode {
                AttributionMode::Pause { threshold_secs } => {
                    unit.start_time - last_end > threshold_secs
                }
                AttributionMode::Index => true,
            };
            if flip {
                self.current_speaker = other(self.current_speaker);
            }
        }

        // Turns never move backwards in time.
        let start_time = self
            .turns
            .last()
            .map_or(unit.start_time, |prev| unit.start_time.max(prev.start_time));

        self.last_end_time = Some(unit.end_time);
        self.turns.push(SpeakerTurn {
            speaker: self.current_speaker,
            text: text.to_string(),
            start_time,
            end_time: unit.end_time.max(start_time),
        });
        self.turns.last()
    }

    #[must_use]
    pub const fn mode(&self) -> AttributionMode {
        self.mode
    }

    #[must_use]
    pub const fn current_speaker(&self) -> u8 {
        self.current_speaker
    }

    #[must_use]
    pub fn turns(&self) -> &[SpeakerTurn] {
        &self.turns
    }

    #[must_use]
    pub fn into_turns(self) -> Vec<SpeakerTurn> {
        self.turns
    }
}

const fn other(speaker: u8) -> u8 {
    if speaker == 1 { 2 } else { 1 }
}
