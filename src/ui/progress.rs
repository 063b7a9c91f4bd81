use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    /// A bar when the list announces its total, a spinner otherwise.
    pub fn create_item_progress(&self, total: Option<usize>) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        match total {
            Some(total) => {
                let pb = self.multi_progress.add(ProgressBar::new(total as u64));
                pb.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>4}/{len:4} students {msg}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
                );
                pb.set_message("Waiting for the list...");
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            }
            None => self.create_spinner("Waiting for the list..."),
        }
    }

    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new_spinner());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {pos} students {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        pb.set_message(message.to_string());
        pb
    }

    pub fn suspend<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if self.enabled {
            self.multi_progress.suspend(f)
        } else {
            f()
        }
    }

    pub fn clear(&self) {
        if self.enabled {
            self.multi_progress.clear().ok();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(true)
    }
}

pub fn update_item_progress(pb: &ProgressBar, index: usize, total: Option<usize>, name: &str) {
    if let Some(total) = total {
        // The footer total can lag behind when rows are added mid-run.
        if index as u64 > pb.length().unwrap_or(0) {
            pb.set_length(index.max(total) as u64);
        }
    }
    pb.set_position(index as u64);
    pb.set_message(name.to_string());
}

pub fn finish_progress_with_summary(pb: &ProgressBar, message: &str, duration: Duration) {
    let final_message = format!("{} (completed in {})", message, format_duration(duration));
    pb.finish_with_message(final_message);
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_manager_creation() {
        assert!(ProgressManager::new(true).is_enabled());
        assert!(!ProgressManager::new(false).is_enabled());
    }

    #[test]
    fn test_disabled_progress_bars() {
        let manager = ProgressManager::new(false);
        assert!(manager.create_item_progress(Some(40)).is_hidden());
        assert!(manager.create_item_progress(None).is_hidden());
        assert!(manager.create_spinner("test").is_hidden());
    }

    #[test]
    fn test_item_progress_grows_past_stale_total() {
        let pb = ProgressBar::hidden();
        pb.set_length(2);
        update_item_progress(&pb, 3, Some(2), "CARLA");
        assert_eq!(pb.position(), 3);
        assert_eq!(pb.length(), Some(3));
        assert_eq!(pb.message(), "CARLA");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
    }
}
