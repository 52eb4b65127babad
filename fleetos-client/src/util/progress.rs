//! Terminal rendering of image download progress.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::os::{ProgressObserver, ProgressState};

const BAR_TEMPLATE: &str =
    "{msg} [{bar:40.cyan/blue}] {percent:>3}% {bytes}/{total_bytes} ({eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} {bytes} (size unknown)";

enum Display {
    Hidden,
    Spinner(ProgressBar),
    Bar(ProgressBar),
}

/// Shows a byte progress bar when the image size is known and a spinner otherwise.
pub struct TerminalProgress {
    label: String,
    display: Display,
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            label: String::new(),
            display: Display::Hidden,
        }
    }

    fn show_bar(&mut self, received: u64, total: u64) {
        let bar = match std::mem::replace(&mut self.display, Display::Hidden) {
            Display::Bar(bar) => bar,
            previous => {
                if let Display::Spinner(spinner) = previous {
                    spinner.finish_and_clear();
                }
                let bar = ProgressBar::new(total);
                bar.set_style(
                    ProgressStyle::with_template(BAR_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar.set_message(self.label.clone());
                bar
            }
        };
        bar.set_length(total);
        bar.set_position(received);
        self.display = Display::Bar(bar);
    }

    fn show_spinner(&mut self, received: Option<u64>) {
        let display = match std::mem::replace(&mut self.display, Display::Hidden) {
            Display::Hidden => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::with_template(SPINNER_TEMPLATE)
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                spinner.set_message(self.label.clone());
                spinner.enable_steady_tick(Duration::from_millis(120));
                Display::Spinner(spinner)
            }
            // a bar stays a bar once the size was known
            shown => shown,
        };
        if let Display::Spinner(bar) | Display::Bar(bar) = &display {
            match received {
                Some(received) => bar.set_position(received),
                None => bar.tick(),
            }
        }
        self.display = display;
    }
}

impl ProgressObserver for TerminalProgress {
    fn start(&mut self, version: &str) {
        self.label = format!("Downloading {version}");
    }

    fn update(&mut self, state: Option<&ProgressState>) {
        match state {
            Some(ProgressState {
                received,
                total: Some(total),
            }) => self.show_bar(*received, *total),
            Some(state) => self.show_spinner(Some(state.received)),
            None => self.show_spinner(None),
        }
    }

    fn finish(&mut self) {
        match std::mem::replace(&mut self.display, Display::Hidden) {
            Display::Bar(bar) | Display::Spinner(bar) => bar.finish_and_clear(),
            Display::Hidden => {}
        }
    }

    fn abandon(&mut self) {
        match std::mem::replace(&mut self.display, Display::Hidden) {
            Display::Bar(bar) | Display::Spinner(bar) => bar.abandon(),
            Display::Hidden => {}
        }
    }
}
