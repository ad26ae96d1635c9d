use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::common::{ColorSample, FrameReference};

/// A frame that never produced a color.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub ordinal: u64,
    pub path: PathBuf,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Default)]
struct Collected {
    samples: Vec<ColorSample>,
    ordinals: HashSet<u64>,
    rejected_duplicates: usize,
    dead_letters: Vec<DeadLetter>,
}

/// Append-only sink for the colors produced by the workers.
#[derive(Default)]
pub struct ResultSet {
    inner: Mutex<Collected>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a result set from colors whose position is their ordinal.
    pub fn from_samples(samples: impl IntoIterator<Item = ColorSample>) -> Self {
        let results = Self::new();
        for sample in samples {
            results.record(sample);
        }
        results
    }

    fn lock(&self) -> MutexGuard<'_, Collected> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keeps the first sample seen for an ordinal. Returns false when the
    /// ordinal was already taken.
    pub fn record(&self, sample: ColorSample) -> bool {
        let mut inner = self.lock();
        if !inner.ordinals.insert(sample.ordinal) {
            inner.rejected_duplicates += 1;
            warn!("Duplicate frame ordinal {}, keeping the first color", sample.ordinal);
            return false;
        }
        inner.samples.push(sample);
        true
    }

    pub fn dead_letter(&self, frame: &FrameReference, attempts: u32, reason: String) {
        self.lock().dead_letters.push(DeadLetter {
            ordinal: frame.ordinal,
            path: frame.path.clone(),
            attempts,
            reason,
        });
    }

    pub fn into_parts(self) -> ResultParts {
        let inner = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut dead_letters = inner.dead_letters;
        dead_letters.sort_by_key(|letter| letter.ordinal);
        ResultParts {
            samples: sort_by_ordinal(inner.samples),
            rejected_duplicates: inner.rejected_duplicates,
            dead_letters,
        }
    }
}

/// Final contents of a [`ResultSet`], samples in ordinal order.
#[derive(Debug, Default)]
pub struct ResultParts {
    pub samples: Vec<ColorSample>,
    pub rejected_duplicates: usize,
    pub dead_letters: Vec<DeadLetter>,
}

pub fn sort_by_ordinal(mut samples: Vec<ColorSample>) -> Vec<ColorSample> {
    samples.sort_by_key(|sample| sample.ordinal);
    samples
}
