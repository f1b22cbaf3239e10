use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Struct-of-Arrays daily close storage.
///
/// Index `i` in `timestamps` and `close` describes one trading day. The
/// backtest core expects the series ascending by timestamp, without
/// duplicates and without non-finite closes; [`PriceSeries::validate`]
/// checks exactly that.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    pub timestamps: Vec<i64>,
    pub close: Vec<f64>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(cap),
            close: Vec::with_capacity(cap),
        }
    }

    /// Build a series from `(timestamp, close)` pairs, kept in the given order.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (i64, f64)>,
    {
        let mut series = Self::new();
        for (ts, close) in points {
            series.push(ts, close);
        }
        series
    }

    /// Daily series starting at the Unix epoch, one close per day.
    pub fn from_closes(closes: &[f64]) -> Self {
        Self::from_points(
            closes
                .iter()
                .enumerate()
                .map(|(i, &c)| (i as i64 * SECONDS_PER_DAY, c)),
        )
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn push(&mut self, ts: i64, close: f64) {
        self.timestamps.push(ts);
        self.close.push(close);
    }

    /// Check the ordering and finiteness invariants the core relies on.
    pub fn validate(&self) -> Result<(), PriceError> {
        if self.is_empty() {
            return Err(PriceError::Empty);
        }
        if self.timestamps.len() != self.close.len() {
            return Err(PriceError::LengthMismatch {
                timestamps: self.timestamps.len(),
                closes: self.close.len(),
            });
        }
        if let Some(index) = self.close.iter().position(|c| !c.is_finite()) {
            return Err(PriceError::NonFinite { index });
        }
        for (i, pair) in self.timestamps.windows(2).enumerate() {
            if pair[1] == pair[0] {
                return Err(PriceError::Duplicate { timestamp: pair[1] });
            }
            if pair[1] < pair[0] {
                return Err(PriceError::NotAscending { index: i + 1 });
            }
        }
        Ok(())
    }

    /// Load daily closes from a CSV file using memory-mapped I/O.
    ///
    /// The first column is the timestamp; the close column is located by its
    /// header name (`close`, falling back to `adj close` / `adj_close`).
    pub fn from_csv(path: &Path) -> Result<Self, PriceError> {
        let file = std::fs::File::open(path)?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }?;
        Self::parse_csv_bytes(&mmap[..])
    }

    /// Parse CSV from raw bytes (testable without files).
    ///
    /// Rows whose close is empty or not a finite number are dropped. The
    /// remaining rows are sorted by timestamp; duplicate timestamps are an
    /// error, an empty result is [`PriceError::Empty`].
    pub fn parse_csv_bytes(data: &[u8]) -> Result<Self, PriceError> {
        if data.trim_ascii().is_empty() {
            return Err(PriceError::Empty);
        }
        let len = data.len();
        let header_end = memchr::memchr(b'\n', data).unwrap_or(len);
        let close_col = Self::close_column(trim_cr(&data[..header_end]))?;

        let mut store = Self::with_capacity(len / 32);
        let mut dropped = 0usize;
        let mut line_no = 1usize;
        let mut pos = header_end + 1;

        while pos < len {
            let line_end = memchr::memchr(b'\n', &data[pos..])
                .map(|i| pos + i)
                .unwrap_or(len);
            let line = trim_cr(&data[pos..line_end]);
            line_no += 1;

            if !line.is_empty() {
                let ts_bytes = field(line, 0).unwrap_or(line);
                let ts = parse_timestamp(ts_bytes).map_err(|message| PriceError::Parse {
                    line: line_no,
                    message,
                })?;
                match field(line, close_col).and_then(parse_close) {
                    Some(close) => store.push(ts, close),
                    None => dropped += 1,
                }
            }

            pos = line_end + 1;
        }

        if dropped > 0 {
            warn!(dropped, "dropped rows without a usable close");
        }
        if store.is_empty() {
            return Err(PriceError::Empty);
        }

        let mut indices: Vec<usize> = (0..store.len()).collect();
        indices.sort_by_key(|&i| store.timestamps[i]);
        let sorted = Self::reorder(&store, &indices);
        sorted.validate()?;

        debug!(rows = sorted.len(), "parsed price csv");
        Ok(sorted)
    }

    fn close_column(header: &[u8]) -> Result<usize, PriceError> {
        let names: Vec<String> = header
            .split(|&b| b == b',')
            .map(|raw| {
                String::from_utf8_lossy(raw)
                    .trim()
                    .trim_matches('"')
                    .to_ascii_lowercase()
                    .replace(' ', "_")
            })
            .collect();

        let idx = names
            .iter()
            .position(|n| n == "close")
            .or_else(|| names.iter().position(|n| n == "adj_close"))
            .ok_or(PriceError::MissingCloseColumn)?;
        if idx == 0 {
            return Err(PriceError::CloseInTimestampColumn);
        }
        Ok(idx)
    }

    fn reorder(store: &PriceSeries, indices: &[usize]) -> PriceSeries {
        let mut result = PriceSeries::with_capacity(indices.len());
        for &i in indices {
            result.push(store.timestamps[i], store.close[i]);
        }
        result
    }

    /// Get a sub-slice view as a new PriceSeries (copies data).
    pub fn slice(&self, start: usize, end: usize) -> PriceSeries {
        let end = end.min(self.len());
        let start = start.min(end);
        PriceSeries {
            timestamps: self.timestamps[start..end].to_vec(),
            close: self.close[start..end].to_vec(),
        }
    }

    /// Restrict to the inclusive date range `[start, end]`; `None` leaves that side open.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PriceSeries {
        let lo = start.map_or(i64::MIN, day_start);
        let hi = end.map_or(i64::MAX, |d| day_start(d) + SECONDS_PER_DAY - 1);
        let first = self.timestamps.partition_point(|&ts| ts < lo);
        let last = self.timestamps.partition_point(|&ts| ts <= hi);
        self.slice(first, last)
    }
}

/// Render a Unix timestamp as a `YYYY-MM-DD` trading date.
pub fn format_day(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn day_start(date: NaiveDate) -> i64 {
    date.signed_duration_since(NaiveDate::default()).num_days() * SECONDS_PER_DAY
}

#[inline]
fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(&b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

/// Return the `idx`-th comma separated field of `line`.
fn field(line: &[u8], idx: usize) -> Option<&[u8]> {
    let mut start = 0;
    for _ in 0..idx {
        start += memchr::memchr(b',', &line[start..])? + 1;
    }
    let end = memchr::memchr(b',', &line[start..])
        .map(|i| start + i)
        .unwrap_or(line.len());
    Some(&line[start..end])
}

fn parse_close(bytes: &[u8]) -> Option<f64> {
    let bytes = bytes.trim_ascii();
    if bytes.is_empty() {
        return None;
    }
    fast_float::parse::<f64, _>(bytes)
        .ok()
        .filter(|c| c.is_finite())
}

/// Parse a timestamp cell to Unix epoch seconds.
///
/// Handles plain dates (`2024-02-08`), RFC 3339 (`2025-11-08T00:00:00Z`,
/// `2024-02-08T00:00:00+00:00`), pandas-style `2024-02-08 00:00:00[-05:00]`
/// and integer Unix seconds.
fn parse_timestamp(bytes: &[u8]) -> Result<i64, String> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| "non-UTF8 timestamp".to_string())?
        .trim()
        .trim_matches('"');

    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<i64>().map_err(|e| e.to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(day_start(date));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc().timestamp());
    }
    Err(format!("unrecognised timestamp: {s}"))
}

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("header has no close column")]
    MissingCloseColumn,
    #[error("close found in the first column, which must hold timestamps")]
    CloseInTimestampColumn,
    #[error("price series is empty")]
    Empty,
    #[error("{timestamps} timestamps but {closes} closes")]
    LengthMismatch { timestamps: usize, closes: usize },
    #[error("non-finite close at index {index}")]
    NonFinite { index: usize },
    #[error("timestamps out of order at index {index}")]
    NotAscending { index: usize },
    #[error("duplicate timestamp {timestamp}")]
    Duplicate { timestamp: i64 },
}
