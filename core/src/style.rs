use std::io::{self, Write};

use colored::{Color, ColoredString, Colorize};
use crossterm::terminal;

use crate::testing::{GroupOutcome, TestRecord, Verdict};

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
    matches!(v.as_str(), "truecolor" | "24bit")
}

pub trait ColorTheme {
    fn color(&self) -> Color;
}

impl ColorTheme for Verdict {
    fn color(&self) -> Color {
        use Verdict::*;
        if !self::is_truecolor_supported() {
            return match self {
                Ok => Color::Green,
                Fail => Color::Red,
                Skipped => Color::BrightBlack,
            };
        }

        match self {
            Ok => Color::TrueColor {
                r: 30,
                g: 180,
                b: 40,
            },
            Fail => Color::TrueColor {
                r: 220,
                g: 42,
                b: 42,
            },
            Skipped => Color::TrueColor {
                r: 128,
                g: 128,
                b: 128,
            },
        }
    }
}

pub fn verdict_label(verdict: Verdict) -> ColoredString {
    verdict.to_string().color(verdict.color())
}

pub fn print_group_header(name: &str) {
    println!("{}", name.blue().bold());
}

/// `\t<test>: OK`, followed by the failure message if any. Skipped tests are not shown.
pub fn print_test_record(record: &TestRecord) {
    if record.verdict == Verdict::Skipped {
        return;
    }
    print_test_started(&record.name);
    print_test_outcome(record);
}

/// `\t<test>: ` with no newline; [`print_test_outcome`] completes the line.
pub fn print_test_started(name: &str) {
    let mut out = io::stdout().lock();
    let _ = write_test_started(&mut out, name).and_then(|()| out.flush());
}

pub fn print_test_outcome(record: &TestRecord) {
    let _ = write_test_outcome(&mut io::stdout().lock(), record);
}

fn write_test_started(w: &mut impl Write, name: &str) -> io::Result<()> {
    write!(w, "\t{}: ", name)
}

fn write_test_outcome(w: &mut impl Write, record: &TestRecord) -> io::Result<()> {
    writeln!(w, "{}", verdict_label(record.verdict))?;
    if let Some(msg) = &record.message {
        writeln!(w, "{}", msg)?;
    }
    Ok(())
}

pub fn print_group_score(g: &GroupOutcome) {
    if g.weight > 0.0 {
        println!(
            " Passed {}/{} tests, {:.2}/{:.2} points",
            g.passed, g.total, g.points, g.weight
        );
    } else if g.points < 0.0 {
        println!(" Failed, subtracting {:.2} points", g.points.abs());
    }
}

pub fn print_tier_passed(previous: &str, next: &str) {
    println!(
        "Passed {} tests with enough points, doing {} tests",
        previous, next
    );
}

pub fn print_tier_refused(previous: &str, points: f64, required: f64) {
    let msg = format!(
        "Didnt get enough points for the {} tests, aborting.",
        previous
    );
    println!("{}", msg.bright_red());
    println!("Got {:.2} points, need at least {:.1}", points, required);
}

pub fn print_run_summary(points: f64, max_points: f64) {
    let (cols, _) = terminal::size().unwrap_or((40, 40));
    let bar = "━".repeat(cols as usize).blue().bold();

    println!();
    println!("{}", bar);
    let msg = format!(
        "Executed all tests, got {:.2}/{:.2} points in total",
        points, max_points
    );
    if points >= max_points {
        println!("{}", msg.green().bold());
    } else {
        println!("{}", msg.bold());
    }
    println!("{}", bar);
}
