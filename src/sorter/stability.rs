//! Waits for a file to stop growing before the sorter touches it.

use std::io;
use std::path::Path;
use std::time::Duration;

/// Result of waiting on a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Two consecutive observations agreed on a non-zero size
    Stable(u64),
    /// The path disappeared while polling
    Vanished,
    /// Attempts ran out before the size settled (or it stayed at zero)
    Unsettled,
}

impl Stability {
    pub fn is_stable(&self) -> bool {
        matches!(self, Stability::Stable(_))
    }
}

/// Polls a file's size until it settles
#[derive(Debug, Clone, Copy)]
pub struct StabilityDetector {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_attempts: 30,
        }
    }
}

impl StabilityDetector {
    pub fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts,
        }
    }

    /// Returns true once the file size is stable and non-zero
    pub async fn await_stable(&self, path: &Path) -> bool {
        self.wait(path).await.is_stable()
    }

    /// Poll `path` until two consecutive observations match
    pub async fn wait(&self, path: &Path) -> Stability {
        let path = path.to_path_buf();
        self.wait_with(move || std::fs::metadata(&path).map(|m| m.len()))
            .await
    }

    /// Poll an arbitrary size probe. A probe error means the file is gone.
    pub async fn wait_with<F>(&self, mut probe: F) -> Stability
    where
        F: FnMut() -> io::Result<u64>,
    {
        let mut previous: Option<u64> = None;

        for attempt in 0..self.max_attempts {
            let size = match probe() {
                Ok(size) => size,
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "File vanished while waiting for it to settle");
                    return Stability::Vanished;
                }
            };

            if size > 0 && previous == Some(size) {
                return Stability::Stable(size);
            }
            previous = Some(size);

            // No point sleeping after the last observation
            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Stability::Unsettled
    }
}
