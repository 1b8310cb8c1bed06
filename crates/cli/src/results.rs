//! Trade result persistence: the running CSV log, the JSON results file,
//! and the printed summary.

use anyhow::{Context, Result};
use batch_trade_core::{TradeResult, TradeStatus};
use chrono::{DateTime, Local};
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Columns of the CSV order log.
pub const CSV_LOG_HEADER: [&str; 11] = [
    "timestamp",
    "exchange",
    "ticker",
    "action",
    "order_type",
    "quantity",
    "price",
    "session",
    "status",
    "message",
    "order_id",
];

// =============================================================================
// CSV Log
// =============================================================================

/// Append-only CSV log of every processed trade.
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `result`, writing the header first if the file is new.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn append(&self, result: &TradeResult) {
        if let Err(e) = self.try_append(result) {
            tracing::error!(path = %self.path.display(), error = %e, "error writing to CSV log");
        }
    }

    fn try_append(&self, result: &TradeResult) -> Result<()> {
        let is_new = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(CSV_LOG_HEADER)?;
        }
        writer.write_record([
            result.timestamp.to_rfc3339(),
            result.exchange.clone(),
            result.ticker.clone(),
            result.action.clone(),
            result.order_type.clone(),
            result.quantity.clone(),
            result.price.map(|p| p.to_string()).unwrap_or_default(),
            result.session.clone(),
            result.status.as_str().to_string(),
            result.message.clone(),
            result.order_id.clone().unwrap_or_default(),
        ])?;
        writer.flush()?;
        Ok(())
    }
}

// =============================================================================
// JSON Results
// =============================================================================

/// Where the results file goes.
///
/// With no name, `trade_results_<YYYYmmdd_HHMMSS>.json` is used. Relative
/// names are placed in `results_dir`; absolute paths are used as is.
#[must_use]
pub fn results_path(output: Option<&Path>, results_dir: &Path, now: DateTime<Local>) -> PathBuf {
    let name = match output {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(format!("trade_results_{}.json", now.format("%Y%m%d_%H%M%S"))),
    };
    if name.is_absolute() {
        name
    } else {
        results_dir.join(name)
    }
}

/// Writes all results as pretty JSON and returns the path written.
///
/// # Errors
/// Returns an error if the directory or file cannot be written.
pub fn save_results(results: &[TradeResult], output: Option<&Path>, results_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(results_dir)
        .with_context(|| format!("failed to create {}", results_dir.display()))?;

    let path = results_path(output, results_dir, Local::now());
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), results)
        .with_context(|| format!("failed to write {}", path.display()))?;

    tracing::info!(path = %path.display(), "results saved");
    Ok(path)
}

// =============================================================================
// Summary
// =============================================================================

/// Batch totals, rendered as the end-of-run report.
#[derive(Debug)]
pub struct Summary<'a> {
    results: &'a [TradeResult],
}

impl<'a> Summary<'a> {
    #[must_use]
    pub fn new(results: &'a [TradeResult]) -> Self {
        Self { results }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn successful(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == TradeStatus::Success)
            .count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.total() - self.successful()
    }

    /// Success percentage; `None` for an empty batch.
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        (self.total() > 0).then(|| self.successful() as f64 / self.total() as f64 * 100.0)
    }
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "\n{rule}")?;
        writeln!(f, "TRADE EXECUTION SUMMARY")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Total Trades: {}", self.total())?;
        writeln!(f, "Successful: {}", self.successful())?;
        writeln!(f, "Failed: {}", self.failed())?;
        match self.success_rate() {
            Some(rate) => writeln!(f, "Success Rate: {rate:.1}%")?,
            None => writeln!(f, "Success Rate: 0%")?,
        }

        writeln!(f, "\nDETAILED RESULTS:")?;
        writeln!(f, "{}", "-".repeat(50))?;
        for (i, result) in self.results.iter().enumerate() {
            writeln!(
                f,
                "{:2}. {} {:10} {:4} {:4} {:6} - {}",
                i + 1,
                pass_fail(result),
                result.exchange,
                result.action.to_uppercase(),
                result.quantity,
                result.ticker,
                result.message
            )?;
        }
        write!(f, "{rule}")
    }
}

/// `PASS` or `FAIL` for console output.
#[must_use]
pub fn pass_fail(result: &TradeResult) -> &'static str {
    if result.is_success() {
        "PASS"
    } else {
        "FAIL"
    }
}
