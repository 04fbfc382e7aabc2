/*
 * Copyright (c) 2022 McSib
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Template of the scrape status row: the tracker supplies the whole line as the message.
const STATUS_TEMPLATE: &str = "{spinner} {msg}";

/// A builder that helps in making a new [ProgressStyle] for use.
pub(crate) struct ProgressStyleBuilder {
    /// The [ProgressStyle] being built.
    progress_style: ProgressStyle,
}

impl ProgressStyleBuilder {
    /// Sets the template of the progress style, keeping the current one if the template is bad.
    ///
    /// # Arguments
    ///
    /// * `msg_template`: The template to use.
    pub(crate) fn template(mut self, msg_template: &str) -> Self {
        match self.progress_style.clone().template(msg_template) {
            Ok(style) => self.progress_style = style,
            Err(err) => warn!("Template error with '{}': {}. Keeping previous style.", msg_template, err),
        }
        self
    }

    /// Sets the characters of the spinner.
    pub(crate) fn tick_chars(mut self, chars: &str) -> Self {
        self.progress_style = self.progress_style.tick_chars(chars);
        self
    }

    pub(crate) fn build(self) -> ProgressStyle {
        self.progress_style
    }
}

impl Default for ProgressStyleBuilder {
    fn default() -> Self {
        Self {
            progress_style: ProgressStyle::default_spinner(),
        }
    }
}

/// A builder that helps in initializing and configuring a new [ProgressBar] for use.
pub(crate) struct ProgressBarBuilder {
    /// The [ProgressBar] to build.
    progress_bar: ProgressBar,
}

impl ProgressBarBuilder {
    /// Creates new instance of the builder.
    ///
    /// # Arguments
    ///
    /// * `len`: Total length of the progress bar.
    pub(crate) fn new(len: u64) -> Self {
        Self {
            progress_bar: ProgressBar::new(len),
        }
    }

    /// Sets the style of the progress bar to the style given.
    pub(crate) fn style(self, progress_style: ProgressStyle) -> Self {
        self.progress_bar.set_style(progress_style);
        self
    }

    /// Sets the draw target (output) of the progress bar to the target given.
    pub(crate) fn draw_target(self, target: ProgressDrawTarget) -> Self {
        self.progress_bar.set_draw_target(target);
        self
    }

    /// Returns the newly built progress bar.
    pub(crate) fn build(self) -> ProgressBar {
        self.progress_bar
    }
}

/// The single status row redrawn in place after every download attempt.
pub(crate) fn status_line() -> ProgressBar {
    let style = ProgressStyleBuilder::default()
        .template(STATUS_TEMPLATE)
        .tick_chars("|/-\\ ")
        .build();

    ProgressBarBuilder::new(0)
        .style(style)
        .draw_target(ProgressDrawTarget::stderr_with_hz(10))
        .build()
}

/// Formats a size in bytes to a human-readable string with appropriate units.
pub(crate) fn format_file_size(size_bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let size = size_bytes as f64;
    if size >= GB {
        format!("{:.2} GB", size / GB)
    } else if size >= MB {
        format!("{:.2} MB", size / MB)
    } else if size >= KB {
        format!("{:.2} KB", size / KB)
    } else {
        format!("{} bytes", size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_template_keeps_style() {
        let style = ProgressStyleBuilder::default().template("{unclosed").build();
        let bar = ProgressBarBuilder::new(1)
            .style(style)
            .draw_target(ProgressDrawTarget::hidden())
            .build();
        bar.set_message("still works");
        assert_eq!(bar.message(), "still works");
    }

    #[test]
    fn test_status_line_carries_message() {
        let bar = status_line();
        bar.set_draw_target(ProgressDrawTarget::hidden());
        bar.set_message("Files: 0/3");
        assert_eq!(bar.message(), "Files: 0/3");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 bytes");
        assert_eq!(format_file_size(1536), "1.50 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
