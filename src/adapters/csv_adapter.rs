//! CSV file data adapter.
//!
//! One file per symbol, `<base>/<SYMBOL>.csv`, with a header row and the
//! columns `timestamp,open,high,low,close,volume`. Timestamps are either
//! `YYYY-MM-DD HH:MM:SS` or a bare `YYYY-MM-DD` (midnight).

use crate::domain::error::FlowError;
use crate::domain::ohlcv::PriceBar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    /// Read every bar of a single CSV file, sorted by timestamp.
    pub fn read_file(path: &Path) -> Result<Vec<PriceBar>, FlowError> {
        let content = fs::read_to_string(path).map_err(|e| FlowError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| FlowError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            // header is line 1
            let line = row + 2;

            let timestamp = parse_timestamp(field(&record, 0, "timestamp", line)?).ok_or_else(
                || FlowError::Data {
                    reason: format!("line {}: invalid timestamp", line),
                },
            )?;

            bars.push(PriceBar {
                timestamp,
                open: number(&record, 1, "open", line)?,
                high: number(&record, 2, "high", line)?,
                low: number(&record, 3, "low", line)?,
                close: number(&record, 4, "close", line)?,
                volume: number(&record, 5, "volume", line)?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        debug!(path = %path.display(), bars = bars.len(), "loaded price bars");
        Ok(bars)
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn field<'r>(
    record: &'r csv::StringRecord,
    index: usize,
    name: &str,
    line: usize,
) -> Result<&'r str, FlowError> {
    record.get(index).ok_or_else(|| FlowError::Data {
        reason: format!("line {}: missing {} column", line, name),
    })
}

fn number(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    line: usize,
) -> Result<f64, FlowError> {
    let raw = field(record, index, name, line)?;
    raw.trim().parse().map_err(|e| FlowError::Data {
        reason: format!("line {}: invalid {} value '{}': {}", line, name, raw, e),
    })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, FlowError> {
        let mut bars = Self::read_file(&self.csv_path(symbol))?;
        bars.retain(|b| {
            let date = b.date();
            start_date.is_none_or(|s| date >= s) && end_date.is_none_or(|e| date <= e)
        });
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FlowError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| FlowError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FlowError::Data {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(symbol) = name_str.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
