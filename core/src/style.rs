use colored::{Color, ColoredString, Colorize};
use crossterm::terminal;

use crate::testing::{CandidateFailure, StressSummary, TestCaseResult, Verdict};

#[macro_export]
macro_rules! print_success {
    ($fmt:literal, $($e:tt)*) => {
        use ::colored::Colorize as _;
        println!("{}", format!($fmt, $($e)*).green())
    }
}

pub fn is_truecolor_supported() -> bool {
    let Ok(v) = std::env::var("COLORTERM") else {
        return false
    };
    match v.as_str() {
        "truecolor" | "24bit" => true,
        _ => false,
    }
}

pub trait ColorTheme {
    fn color(&self) -> Color;
}

impl ColorTheme for log::Level {
    fn color(&self) -> Color {
        use log::Level::*;
        match self {
            Error => Color::BrightRed,
            Warn => Color::BrightYellow,
            Info => Color::Cyan,
            Debug => Color::Magenta,
            Trace => Color::Blue,
        }
    }
}

impl ColorTheme for Verdict {
    fn color(&self) -> Color {
        use Verdict::*;
        if !self::is_truecolor_supported() {
            return match self {
                Accepted => Color::Green,
                WrongAnswer | PresentationError => Color::Yellow,
                TimeLimitExceeded | MemoryLimitExceeded => Color::Red,
                RuntimeError => Color::Magenta,
                CheckerFailure => Color::BrightRed,
                Reference => Color::Blue,
            };
        }

        let (r, g, b) = match self {
            Accepted => (30, 180, 40),
            WrongAnswer => (210, 138, 4),
            PresentationError => (190, 160, 20),
            TimeLimitExceeded => (220, 42, 42),
            MemoryLimitExceeded => (200, 70, 30),
            RuntimeError => (171, 40, 200),
            CheckerFailure => (120, 120, 120),
            Reference => (40, 110, 210),
        };
        Color::TrueColor { r, g, b }
    }
}

pub fn verdict_icon(verdict: Verdict) -> ColoredString {
    let fg = if is_truecolor_supported() {
        Color::TrueColor {
            r: 255,
            g: 255,
            b: 255,
        }
    } else {
        Color::BrightBlack
    };
    format!(" {:<4}", verdict.short_code())
        .on_color(verdict.color())
        .bold()
        .color(fg)
}

/// One line per dropped candidate, printed as soon as it fails.
pub fn failure_line(failure: &CandidateFailure) -> String {
    format!(
        "{} {} at test {} (seed {}): {}",
        self::verdict_icon(failure.verdict),
        failure.candidate.bold(),
        failure.test_index,
        failure.seed,
        failure.comment.trim_end().dimmed(),
    )
}

pub fn print_summary(summary: &StressSummary) {
    let bar = "-".repeat(5);
    print!("{} ", bar);

    let num_solutions = summary
        .rows
        .iter()
        .filter(|r| !matches!(r.status, crate::testing::CandidateStatus::Reference { .. }))
        .count();
    let num_failed = summary.failures.len();

    if num_failed == 0 {
        let msg = format!("All {} tests passed ✨", summary.tests_run);
        print!("{}", msg.green());
    } else {
        let summary_msg = if num_failed < num_solutions {
            format!("{}/{} solutions failed 💣", num_failed, num_solutions)
        } else {
            format!("All {} solutions failed 💀", num_solutions)
        };
        let detail_msg = summary
            .failures
            .iter()
            .map(|f| format!("{}{}", self::verdict_icon(f.verdict), f.candidate.bold()))
            .collect::<Vec<String>>()
            .join(", ");
        print!("{} ({})", summary_msg.bright_red(), detail_msg);
    }
    println!(" {}", bar);

    if summary.stopped_early {
        println!(
            "{}",
            format!(
                "Stopped after {} of {} tests: every solution failed",
                summary.tests_run, summary.tests_requested
            )
            .dimmed()
        );
    }

    for r in &summary.rows {
        println!(
            "  {:<12} {} [min {}ms, max {}ms, median {:.1}ms]",
            r.name.bold(),
            r.status,
            r.time_ms.min,
            r.time_ms.max,
            r.time_ms.median,
        );
    }
}

/// Shows the answer next to what the candidate printed, for its first failing test.
pub fn print_failure_detail(failure: &CandidateFailure, result: &TestCaseResult) {
    let output = result
        .candidates
        .iter()
        .find(|r| r.candidate == failure.candidate)
        .and_then(|r| r.output.as_ref());

    let (cols, _) = terminal::size().unwrap_or((40, 40));
    let cols = (cols as usize).max(20);

    const BOLD_LINE: &str = "━";
    const THIN_LINE: &str = "─";

    let bold_bar = BOLD_LINE.repeat(cols).blue().bold();

    let title_color = Color::BrightYellow;
    println!(
        "\n{}: {} test {} (seed {})\n{}",
        failure.candidate.color(title_color).bold(),
        self::verdict_icon(failure.verdict),
        failure.test_index,
        failure.seed,
        bold_bar,
    );

    fn print_sub_title(s: &str, cols: usize) {
        println!(
            "{}{}",
            s.cyan().bold(),
            THIN_LINE.repeat(cols.saturating_sub(s.len() + 1)).bright_black(),
        )
    }

    fn print_lines(bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        let lines: Vec<_> = text.lines().collect();
        if lines.is_empty() {
            println!("{}", "<EMPTY>".magenta().dimmed());
            return;
        }
        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim_end();
            print!("{}", trimmed);

            let num_trailling_whitespace = line.len() - trimmed.len();
            if num_trailling_whitespace > 0 {
                print!(
                    "{}{}",
                    " ".repeat(num_trailling_whitespace).on_red(),
                    "(Trailling whitespace)".bright_red().bold()
                );
            }

            let is_last_line = i + 1 == lines.len();
            if is_last_line && !text.ends_with('\n') {
                print!("{}", " Missing new line ".on_yellow().black().bold());
            }

            println!();
        }
    }

    print_sub_title("[input]", cols);
    let input = crate::report::preview(&result.input, crate::report::PREVIEW_CHARS);
    print!("{}", input);
    if !input.ends_with('\n') {
        println!();
    }

    print_sub_title("[answer]", cols);
    print_lines(&result.answer);

    print_sub_title("[output]", cols);
    match output {
        Some(out) => print_lines(out),
        None => println!("{}", "<NONE>".magenta().dimmed()),
    }

    print_sub_title("[comment]", cols);
    println!("{}", failure.comment.trim_end());

    println!("{}", bold_bar);
}
