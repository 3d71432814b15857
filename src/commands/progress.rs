//! Progress bars for long flash operations

use indicatif::{ProgressBar, ProgressStyle};
use qspiflash_core::{Phase, UpgradeProgress};

/// Renders each phase of an operation as its own progress bar
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    /// Create a reporter with no bar shown yet
    pub fn new() -> Self {
        Self::default()
    }

    fn style(phase: Phase) -> ProgressStyle {
        let template = match phase {
            Phase::Erase => format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} sectors ({{eta}}) {}",
                phase.name()
            ),
            _ => format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
                phase.name()
            ),
        };
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }
}

impl UpgradeProgress for BarProgress {
    fn start(&mut self, phase: Phase, total: usize) {
        if let Some(old) = self.bar.take() {
            old.abandon();
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(Self::style(phase));
        self.bar = Some(bar);
    }

    fn advance(&mut self, done: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(done as u64);
        }
    }

    fn finish(&mut self, phase: Phase) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message(format!("{} complete", phase.name()));
        }
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        // a failed phase leaves its bar where it stopped
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_lifecycle() {
        let mut progress = BarProgress::new();
        assert!(progress.bar.is_none());
        progress.start(Phase::Erase, 3);
        progress.advance(2);
        assert_eq!(progress.bar.as_ref().map(|b| b.position()), Some(2));
        progress.finish(Phase::Erase);
        assert!(progress.bar.is_none());
    }
}
