use std::io::IsTerminal;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use pioguard_installer::{ProgressEvent, ProgressPhase, ProgressReporter};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style(force_plain: bool) -> OutputStyle {
    if force_plain || std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        "info" => "[INFO]",
        _ => "[..]",
    }
}

pub(crate) fn phase_status(phase: ProgressPhase) -> &'static str {
    match phase {
        ProgressPhase::Verifying | ProgressPhase::Installing => "step",
        ProgressPhase::Ready | ProgressPhase::Installed => "ok",
        ProgressPhase::Suspended => "info",
        ProgressPhase::Failed => "err",
    }
}

/// Renders coordinator progress on the terminal.
///
/// A spinner runs while the install operation is in flight in rich mode.
/// Failures always go to stderr and stay on screen.
pub(crate) struct TerminalReporter {
    style: OutputStyle,
    spinner: Mutex<Option<(ProgressBar, Instant)>>,
}

impl TerminalReporter {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self {
            style,
            spinner: Mutex::new(None),
        }
    }

    fn start_spinner(&self, message: &str) -> bool {
        if self.style != OutputStyle::Rich {
            return false;
        }
        let Ok(mut slot) = self.spinner.lock() else {
            return false;
        };
        if let Some((spinner, _)) = slot.as_ref() {
            spinner.set_message(message.to_string());
            return true;
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed}") {
            spinner.set_style(style.tick_chars(".oO@* "));
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        *slot = Some((spinner, Instant::now()));
        true
    }

    fn finish_spinner(&self) -> Option<Duration> {
        let (spinner, started_at) = self.spinner.lock().ok()?.take()?;
        spinner.finish_and_clear();
        Some(started_at.elapsed())
    }
}

impl ProgressReporter for TerminalReporter {
    fn report(&self, event: &ProgressEvent) {
        if event.phase == ProgressPhase::Installing && self.start_spinner(&event.message) {
            return;
        }

        let elapsed = self.finish_spinner();
        let mut line = render_status_line(self.style, phase_status(event.phase), &event.message);
        if let (Some(elapsed), OutputStyle::Rich) = (elapsed, self.style) {
            line.push_str(&format!(" ({})", format_elapsed(elapsed)));
        }

        match event.phase {
            ProgressPhase::Failed => eprintln!("{}", emphasize(self.style, error_style(), &line)),
            ProgressPhase::Suspended => {
                println!("{}", emphasize(self.style, notice_style(), &line))
            }
            _ => println!("{line}"),
        }
    }
}

impl Drop for TerminalReporter {
    fn drop(&mut self) {
        let _ = self.finish_spinner();
    }
}

pub(crate) fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

pub(crate) fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(colorize(section_style(), &format!("== {title} =="))),
    }
}

fn emphasize(style: OutputStyle, accent: Style, text: &str) -> String {
    match style {
        OutputStyle::Plain => text.to_string(),
        OutputStyle::Rich => colorize(accent, text),
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn notice_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightYellow.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
