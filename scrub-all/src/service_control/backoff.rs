// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::time::Duration;

/// Fibonacci delays `1, 1, 2, 3, 5, ...`, ending before the first term that
/// would exceed `cap`.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: u64,
    next: u64,
    cap: u64,
}

impl Backoff {
    pub fn fibonacci(cap: u64) -> Self {
        Self {
            current: 1,
            next: 1,
            cap,
        }
    }

    /// The sequence scaled to wall-clock delays.
    pub fn delays(self, unit: Duration) -> impl Iterator<Item = Duration> {
        self.map(move |steps| unit.saturating_mul(steps as u32))
    }
}

impl Iterator for Backoff {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.current > self.cap {
            return None;
        }
        let term = self.current;
        self.current = self.next;
        self.next = term.saturating_add(self.next);
        Some(term)
    }
}
