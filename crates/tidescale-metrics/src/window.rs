//! Bounded smoothing windows over per-tick peak demand.

use std::collections::VecDeque;

/// FIFO window of the most recent values, never longer than its bound.
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    values: VecDeque<f64>,
    bound: usize,
}

impl HistoryWindow {
    /// Create a window holding at most `bound` values (at least one).
    pub fn new(bound: usize) -> Self {
        let bound = bound.max(1);
        Self {
            values: VecDeque::with_capacity(bound + 1),
            bound,
        }
    }

    /// Append a value, evicting the oldest once the bound is exceeded.
    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.bound {
            self.values.pop_front();
        }
    }

    /// Mean of the held values; `None` until the first push.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Held values, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}

/// One shared window, or two independent windows biased toward scale-up
/// (short) and scale-down (long) decisions.
#[derive(Debug, Clone)]
pub struct Smoothing {
    up: HistoryWindow,
    down: Option<HistoryWindow>,
}

impl Smoothing {
    pub fn single(bound: usize) -> Self {
        Self {
            up: HistoryWindow::new(bound),
            down: None,
        }
    }

    pub fn dual(up_bound: usize, down_bound: usize) -> Self {
        Self {
            up: HistoryWindow::new(up_bound),
            down: Some(HistoryWindow::new(down_bound)),
        }
    }

    pub fn push(&mut self, value: f64) {
        self.up.push(value);
        if let Some(down) = self.down.as_mut() {
            down.push(value);
        }
    }

    pub fn up_mean(&self) -> Option<f64> {
        self.up.mean()
    }

    /// Mean of the scale-down window, or of the shared window when single.
    pub fn down_mean(&self) -> Option<f64> {
        match &self.down {
            Some(down) => down.mean(),
            None => self.up.mean(),
        }
    }

    pub fn is_dual(&self) -> bool {
        self.down.is_some()
    }
}
