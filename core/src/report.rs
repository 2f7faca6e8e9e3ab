use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::fsutil;
use crate::testing::{round2, GroupOutcome};

/// Ordered per-group points, mirrored line by line into an optional sink.
pub struct RunReport {
    groups: Vec<GroupOutcome>,
    max_points: f64,
    sink: Option<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunReport")
            .field("groups", &self.groups)
            .field("max_points", &self.max_points)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub finished_at: DateTime<Local>,
    pub points: f64,
    pub max_points: f64,
    pub groups: &'a [GroupOutcome],
}

impl RunReport {
    pub fn new(max_points: f64) -> Self {
        Self {
            groups: Vec::new(),
            max_points,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Truncates `path` and appends a line to it for every recorded group.
    pub fn with_output_file(self, path: impl AsRef<Path>) -> fsutil::Result<Self> {
        let file: File = fsutil::create_file(path)?;
        Ok(self.with_sink(file))
    }

    /// Appends `outcome` and flushes its `<group>: <points>` line to the sink.
    pub fn record(&mut self, outcome: GroupOutcome) -> io::Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            let points = if outcome.skipped {
                "0".to_owned()
            } else {
                format_points(outcome.points)
            };
            writeln!(sink, "{}: {}", outcome.name, points)?;
            sink.flush()?;
        }
        self.groups.push(outcome);
        Ok(())
    }

    pub fn groups(&self) -> &[GroupOutcome] {
        &self.groups
    }

    /// Rounded to cents so that sums like `0.33 + 0.67` compare exactly against a gate.
    pub fn points(&self) -> f64 {
        round2(self.groups.iter().map(|g| g.points).sum())
    }

    pub fn max_points(&self) -> f64 {
        self.max_points
    }

    pub fn to_json(&self) -> JsonReport<'_> {
        JsonReport {
            finished_at: Local::now(),
            points: self.points(),
            max_points: self.max_points,
            groups: &self.groups,
        }
    }
}

/// Integral values keep one decimal (`1.0`), others print in shortest form (`0.33`).
pub fn format_points(points: f64) -> String {
    if points.fract() == 0.0 {
        format!("{:.1}", points)
    } else {
        format!("{}", points)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn outcome(name: &str, weight: f64, passed: usize, total: usize, points: f64) -> GroupOutcome {
        GroupOutcome {
            name: name.into(),
            weight,
            passed,
            total,
            points,
            records: Vec::new(),
            skipped: false,
        }
    }

    #[test]
    fn points_are_formatted_like_decimal_literals() {
        assert_eq!(format_points(1.0), "1.0");
        assert_eq!(format_points(0.0), "0.0");
        assert_eq!(format_points(-1.0), "-1.0");
        assert_eq!(format_points(0.33), "0.33");
        assert_eq!(format_points(1.5), "1.5");
    }

    #[test]
    fn sink_gets_one_line_per_group_in_order() {
        let buf = SharedBuf::default();
        let mut report = RunReport::new(3.0).with_sink(buf.clone());

        report.record(outcome("Simple commands", 1.0, 3, 3, 1.0)).unwrap();
        report.record(outcome("Pipes", 1.5, 1, 3, 0.5)).unwrap();
        report.record(outcome("Signals", -1.0, 0, 1, -1.0)).unwrap();
        let mut skipped = outcome("Prompt", 0.5, 0, 4, 0.0);
        skipped.skipped = true;
        report.record(skipped).unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            text,
            "Simple commands: 1.0\nPipes: 0.5\nSignals: -1.0\nPrompt: 0\n"
        );
        assert_eq!(report.points(), 0.5);
        assert_eq!(report.max_points(), 3.0);
        assert_eq!(report.groups().len(), 4);
    }

    #[test]
    fn json_report_has_totals() {
        let mut report = RunReport::new(1.0);
        report.record(outcome("Pipes", 1.0, 1, 1, 1.0)).unwrap();
        let json = serde_json::to_value(report.to_json()).unwrap();
        assert_eq!(json["points"], 1.0);
        assert_eq!(json["max_points"], 1.0);
        assert_eq!(json["groups"][0]["name"], "Pipes");
        assert!(json["finished_at"].is_string());
    }
}
