// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Labeled time splits for connect observability.

use std::fmt;
use std::time::Instant;

/// Records labeled splits against a start instant.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    label: &'static str,
    start: Instant,
    splits: Vec<(&'static str, Instant)>,
}

impl Stopwatch {
    /// Start a new stopwatch.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
            splits: Vec::new(),
        }
    }

    /// Record a split at the current instant.
    pub fn split(&mut self, name: &'static str) {
        self.splits.push((name, Instant::now()));
    }

    /// Drop all splits and restart the clock.
    pub fn clear(&mut self) {
        self.splits.clear();
        self.start = Instant::now();
    }

    /// Whether any splits have been recorded.
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }
}

impl fmt::Display for Stopwatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.label)?;
        let mut previous = self.start;
        for (name, at) in &self.splits {
            write!(f, " {name} +{}ms", at.duration_since(previous).as_millis())?;
            previous = *at;
        }
        if let Some((_, last)) = self.splits.last() {
            write!(f, " (total {}ms)", last.duration_since(self.start).as_millis())?;
        }
        Ok(())
    }
}
