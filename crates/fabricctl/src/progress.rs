//! Terminal spinner for pipeline progress.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

use fabricctl_core::ProgressSink;

/// Spinner on stderr, ticked from the pipeline's own callbacks.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }
}

impl ProgressSink for Spinner {
    fn stage(&mut self, name: &str) {
        self.bar.set_prefix(name.to_owned());
        self.bar.set_message("");
        self.bar.tick();
    }

    fn tick(&mut self, message: &str) {
        self.bar.set_message(message.to_owned());
        self.bar.tick();
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

/// A spinner when stderr is a terminal and output is not silenced.
pub fn sink(quiet: bool) -> Box<dyn ProgressSink> {
    if quiet || !std::io::stderr().is_terminal() {
        Box::new(())
    } else {
        Box::new(Spinner::new())
    }
}
