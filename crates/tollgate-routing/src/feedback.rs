//! Reward-driven model selection
//!
//! Keeps a sliding window of recent rewards per task and model. Candidates
//! that have never been tried are explored first; after that the candidate
//! with the best mean reward wins. In-memory only.

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::RoutingError;

/// Maximum rewards retained per (task, model) window
const MAX_SAMPLES: usize = 1000;

/// Learning collaborator consulted for every routed request
pub trait ModelSelector: Send + Sync {
    /// Pick one model from a non-empty candidate list
    fn select(&self, task: &str, candidates: &[String]) -> Result<String, RoutingError>;

    /// Report the reward observed for a model on a task
    fn update(&self, task: &str, model: &str, reward: f64);
}

/// Per (task, model) reward window
struct RewardWindow {
    rewards: VecDeque<f64>,
    sum: f64,
}

impl RewardWindow {
    fn new() -> Self {
        Self {
            rewards: VecDeque::with_capacity(16),
            sum: 0.0,
        }
    }

    fn push(&mut self, reward: f64, capacity: usize) {
        // Sliding window: drop oldest when full
        if self.rewards.len() >= capacity
            && let Some(oldest) = self.rewards.pop_front()
        {
            self.sum -= oldest;
        }
        self.rewards.push_back(reward);
        self.sum += reward;
    }

    fn mean(&self) -> Option<f64> {
        if self.rewards.is_empty() {
            return None;
        }
        Some(self.sum / self.rewards.len() as f64)
    }
}

/// Snapshot of a model's observed rewards on one task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardStats {
    /// Mean reward over the window
    pub mean: f64,
    /// Number of rewards in the window
    pub sample_count: usize,
}

/// Greedy selector over windowed mean rewards
pub struct FeedbackSelector {
    windows: DashMap<(String, String), RewardWindow>,
    capacity: usize,
}

impl FeedbackSelector {
    pub fn new() -> Self {
        Self::with_window(MAX_SAMPLES)
    }

    /// Selector keeping at most `capacity` rewards per (task, model)
    pub fn with_window(capacity: usize) -> Self {
        Self {
            windows: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Observed rewards for a model on a task
    pub fn stats(&self, task: &str, model: &str) -> Option<RewardStats> {
        let entry = self.windows.get(&(task.to_owned(), model.to_owned()))?;
        let mean = entry.mean()?;
        Some(RewardStats {
            mean,
            sample_count: entry.rewards.len(),
        })
    }
}

impl Default for FeedbackSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelSelector for FeedbackSelector {
    fn select(&self, task: &str, candidates: &[String]) -> Result<String, RoutingError> {
        let mut best: Option<(&String, f64)> = None;

        for model in candidates {
            let Some(stats) = self.stats(task, model) else {
                tracing::debug!(task, model = %model, "exploring untried model");
                return Ok(model.clone());
            };

            if best.is_none_or(|(_, mean)| stats.mean > mean) {
                best = Some((model, stats.mean));
            }
        }

        best.map(|(model, _)| model.clone())
            .ok_or_else(|| RoutingError::NoCandidates { task: task.to_owned() })
    }

    fn update(&self, task: &str, model: &str, reward: f64) {
        let reward = if reward.is_nan() { 0.0 } else { reward.clamp(0.0, 1.0) };
        self.windows
            .entry((task.to_owned(), model.to_owned()))
            .or_insert_with(RewardWindow::new)
            .push(reward, self.capacity);
    }
}
