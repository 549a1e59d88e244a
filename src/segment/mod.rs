pub mod silence;
pub mod stream;

/// A contiguous slice of the recording handed to a recognizer exactly once.
#[derive(Debug, Clone)]
pub struct AudioUnit {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub samples: Vec<f32>,
}

impl AudioUnit {
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.end_time - self.start_time
    }
}
