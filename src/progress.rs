//! Crawl progress display
//!
//! The crawler only sees the traits; the binary picks the indicatif bar.

use indicatif::{ProgressBar, ProgressStyle};

/// A running progress display over repositories
pub trait ProgressHandle: Send + Sync {
    /// One more repository reached a terminal state
    fn advance(&self, remote_url: &str);
    fn finish(&self);
}

pub trait ProgressReporter: Send + Sync {
    fn start(&self, label: &str, total: u64) -> Box<dyn ProgressHandle>;
}

/// Terminal progress bar on stderr
pub struct BarProgress;

impl ProgressReporter for BarProgress {
    fn start(&self, label: &str, total: u64) -> Box<dyn ProgressHandle> {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "{{spinner:.green}} {}: [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {{elapsed_precise}} {{wide_msg}}",
                    label
                ))
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Box::new(BarHandle(pb))
    }
}

struct BarHandle(ProgressBar);

impl ProgressHandle for BarHandle {
    fn advance(&self, remote_url: &str) {
        self.0.set_message(remote_url.to_string());
        self.0.inc(1);
    }

    fn finish(&self) {
        self.0.finish_and_clear();
    }
}

/// Silent reporter for tests and benches
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn start(&self, _label: &str, _total: u64) -> Box<dyn ProgressHandle> {
        Box::new(NoopHandle)
    }
}

struct NoopHandle;

impl ProgressHandle for NoopHandle {
    fn advance(&self, _remote_url: &str) {}
    fn finish(&self) {}
}

/// Bar when `show` is set, otherwise silent
pub fn reporter(show: bool) -> Box<dyn ProgressReporter> {
    if show {
        Box::new(BarProgress)
    } else {
        Box::new(NoopProgress)
    }
}
