//! On-disk persistence of the indicator series.
//!
//! The series is a CSV table with `anomaly`, `indicator` and `dateyrmo`
//! columns. The forecast row is the one with an empty anomaly cell.
//!
//! Files written by the older production scripts name the anomaly column
//! `anom` and mark the forecast with a `0` anomaly on the final row; such
//! files are read and written back in that layout. Any other columns (the
//! display dates, `window`, `flag`) are carried through unchanged, and new
//! rows get their customary defaults.
//!
//! Writes go to a temporary file in the target directory which is renamed
//! over the target only after the data has been flushed, so a crash leaves
//! either the old file or the new one, never a truncated mix.

use csv::StringRecord;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{IndicatorError, Result};
use crate::month::YearMonth;
use crate::series::{IndicatorSeries, MonthRecord, INDICATOR_WINDOW};

/// Header names of the series table
pub const ANOMALY_COLUMN: &str = "anomaly";
pub const LEGACY_ANOMALY_COLUMN: &str = "anom";
pub const INDICATOR_COLUMN: &str = "indicator";
pub const MONTH_COLUMN: &str = "dateyrmo";
pub const WINDOW_COLUMN: &str = "window";
pub const FLAG_COLUMN: &str = "flag";

/// Anomaly cell of a forecast row in the legacy layout
const LEGACY_FORECAST_PLACEHOLDER: &str = "0";

/// Column count of the production table (two display dates, anomaly,
/// indicator, window, flag, month); positional defaults apply from here on
const WIDE_LAYOUT_COLUMNS: usize = 6;

/// Two-decimal rendering without a negative zero
pub fn format_value(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{:.2}", rounded)
}

/// Column layout of a series file and the cells the pipeline does not own.
#[derive(Debug, Clone)]
pub struct SeriesLayout {
    columns: Vec<String>,
    anomaly: usize,
    indicator: usize,
    month: usize,
    legacy: bool,
    /// Raw rows keyed by month, the source of carried-through cells
    rows: BTreeMap<YearMonth, StringRecord>,
}

impl Default for SeriesLayout {
    fn default() -> Self {
        Self {
            columns: vec![
                ANOMALY_COLUMN.to_string(),
                INDICATOR_COLUMN.to_string(),
                MONTH_COLUMN.to_string(),
            ],
            anomaly: 0,
            indicator: 1,
            month: 2,
            legacy: false,
            rows: BTreeMap::new(),
        }
    }
}

impl SeriesLayout {
    fn from_headers(path: &Path, headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let (anomaly, legacy) = match (find(ANOMALY_COLUMN), find(LEGACY_ANOMALY_COLUMN)) {
            (Some(index), _) => (index, false),
            (None, Some(index)) => (index, true),
            (None, None) => return Err(missing_column(path, ANOMALY_COLUMN)),
        };
        let indicator = find(INDICATOR_COLUMN).ok_or_else(|| missing_column(path, INDICATOR_COLUMN))?;
        let month = find(MONTH_COLUMN).ok_or_else(|| missing_column(path, MONTH_COLUMN))?;

        Ok(Self {
            columns: headers.iter().map(String::from).collect(),
            anomaly,
            indicator,
            month,
            legacy,
            rows: BTreeMap::new(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the file uses the `anom` header and the `0` forecast placeholder
    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    fn parse_row(&self, row: &StringRecord) -> Result<MonthRecord> {
        let month: YearMonth = row.get(self.month).unwrap_or_default().parse()?;

        let indicator = parse_number(row.get(self.indicator), INDICATOR_COLUMN, month)?
            .ok_or_else(|| IndicatorError::DataQuality {
                month,
                message: "indicator is empty".to_string(),
            })?;

        Ok(match parse_number(row.get(self.anomaly), ANOMALY_COLUMN, month)? {
            Some(anomaly) => MonthRecord::observed(month, anomaly, indicator),
            None => MonthRecord::forecast(month, indicator),
        })
    }

    /// Turn a trailing `0` placeholder row into the forecast it stands for
    fn recover_legacy_forecast(&self, records: &mut [MonthRecord]) {
        if !self.legacy {
            return;
        }
        let Some(last) = records.last_mut() else {
            return;
        };
        // A genuine zero on the final row is refetched as the remote's newest month.
        if !last.is_forecast && last.anomaly == Some(0.0) {
            debug!(month = %last.month, "Reading zero-anomaly final row as the forecast");
            *last = MonthRecord::forecast(last.month, last.indicator);
        }
    }

    /// Cells of one output row, in file column order
    fn render(&self, record: &MonthRecord) -> Vec<String> {
        let carried = self.rows.get(&record.month);
        (0..self.columns.len())
            .map(|index| {
                if index == self.anomaly {
                    match record.anomaly {
                        Some(value) => format_value(value),
                        None if self.legacy => LEGACY_FORECAST_PLACEHOLDER.to_string(),
                        None => String::new(),
                    }
                } else if index == self.indicator {
                    format_value(record.indicator)
                } else if index == self.month {
                    record.month.to_string()
                } else {
                    match carried.and_then(|row| row.get(index)) {
                        Some(cell) => cell.to_string(),
                        None => self.default_cell(index, record.month),
                    }
                }
            })
            .collect()
    }

    /// Value of a carried column on a row the file did not have before
    fn default_cell(&self, index: usize, month: YearMonth) -> String {
        let name = self.columns[index].as_str();
        let wide = self.columns.len() >= WIDE_LAYOUT_COLUMNS;
        if name == WINDOW_COLUMN || (wide && index == 4) {
            INDICATOR_WINDOW.to_string()
        } else if name == FLAG_COLUMN || (wide && index == 5) {
            "0".to_string()
        } else if wide && index == 0 {
            month.first_day().format("%-m/%-d/%Y").to_string()
        } else if wide && index == 1 {
            month.first_day().format("%-m/%d/%y").to_string()
        } else {
            String::new()
        }
    }
}

/// Owner of the series file
#[derive(Debug, Clone)]
pub struct SeriesStore {
    path: PathBuf,
}

impl SeriesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the series, dropping rows that cannot be interpreted
    pub fn load(&self) -> Result<IndicatorSeries> {
        Ok(self.load_with_layout()?.0)
    }

    /// Read the series together with the file layout needed to write it back
    pub fn load_with_layout(&self) -> Result<(IndicatorSeries, SeriesLayout)> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let headers = reader.headers()?.clone();
        let mut layout = SeriesLayout::from_headers(&self.path, &headers)?;

        let mut records = Vec::new();
        let mut dropped = 0usize;
        for (line, row) in reader.records().enumerate() {
            // Header is line 1.
            let line = line + 2;
            let parsed = row
                .map_err(IndicatorError::from)
                .and_then(|row| layout.parse_row(&row).map(|record| (record, row)));
            match parsed {
                Ok((record, row)) => {
                    layout.rows.entry(record.month).or_insert(row);
                    records.push(record);
                }
                Err(e) => {
                    warn!(path = %self.path.display(), line = line, error = %e, "Dropping unreadable series row");
                    dropped += 1;
                }
            }
        }

        records.sort_by_key(|r| r.month);
        layout.recover_legacy_forecast(&mut records);

        let series = IndicatorSeries::from_records(records);
        info!(
            path = %self.path.display(),
            rows = series.len(),
            dropped = dropped,
            legacy = layout.legacy,
            columns = layout.columns.len(),
            "Loaded indicator series"
        );
        Ok((series, layout))
    }

    /// Validate and atomically replace the series file
    pub fn save(&self, series: &IndicatorSeries) -> Result<()> {
        self.save_with_layout(series, &SeriesLayout::default())
    }

    /// Validate and atomically replace the series file, keeping `layout`
    pub fn save_with_layout(&self, series: &IndicatorSeries, layout: &SeriesLayout) -> Result<()> {
        series.validate()?;

        write_atomically(&self.path, |writer| {
            let mut csv_writer = csv::Writer::from_writer(writer);
            csv_writer.write_record(&layout.columns)?;
            for record in series.records() {
                csv_writer.write_record(layout.render(record))?;
            }
            csv_writer.flush()?;
            Ok(())
        })?;

        info!(path = %self.path.display(), rows = series.len(), "Saved indicator series");
        Ok(())
    }
}

fn missing_column(path: &Path, column: &str) -> IndicatorError {
    IndicatorError::Config {
        message: format!("{} has no '{}' column", path.display(), column),
    }
}

fn parse_number(text: Option<&str>, column: &str, month: YearMonth) -> Result<Option<f64>> {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(IndicatorError::DataQuality {
            month,
            message: format!("{} value {:?} is not a number", column, text),
        }),
    }
}

/// Write `path` through a sibling temporary file and an atomic rename.
///
/// Nothing touches `path` unless `write` succeeds and the data is synced.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    write(&mut tmp)?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    debug!(tmp = %tmp.path().display(), target = %path.display(), "Renaming temporary file over target");
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn write_file(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_load_sorts_and_drops_bad_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_file(
            &path,
            "anom,indicator,dateyrmo\n\
             0.30,0.25,2025-02\n\
             0.20,0.20,2025-01\n\
             ,,\n\
             0.10,0.10,N/A\n\
             abc,0.10,2025-03\n\
             ,0.25,2025-03\n",
        );

        let series = SeriesStore::new(&path).load().unwrap();
        let months: Vec<String> = series.records().iter().map(|r| r.month.to_string()).collect();
        assert_eq!(months, vec!["2025-01", "2025-02", "2025-03"]);
        assert_eq!(series.forecast().map(|r| r.month), Some(ym("2025-03")));
        assert_eq!(series.last_observed().map(|r| r.anomaly), Some(Some(0.3)));
    }

    #[test]
    fn test_missing_column_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_file(&path, "anomaly,dateyrmo\n0.1,2025-01\n");
        let err = SeriesStore::new(&path).load().unwrap_err();
        assert!(matches!(err, IndicatorError::Config { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = SeriesStore::new(dir.path().join("nope.csv")).load().unwrap_err();
        assert!(matches!(err, IndicatorError::Csv(_) | IndicatorError::Io(_)));
    }

    #[test]
    fn test_save_round_trip_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.csv");
        let store = SeriesStore::new(&path);

        let mut series = IndicatorSeries::from_records(vec![
            MonthRecord::observed(ym("2025-01"), -0.001, 0.5),
            MonthRecord::observed(ym("2025-02"), 1.0, 0.75),
        ]);
        series.set_forecast(MonthRecord::forecast(ym("2025-03"), 0.5)).unwrap();
        store.save(&series).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "anomaly,indicator,dateyrmo\n0.00,0.50,2025-01\n1.00,0.75,2025-02\n,0.50,2025-03\n"
        );

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.forecast().unwrap().month, ym("2025-03"));
    }

    #[test]
    fn test_invalid_series_is_not_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_file(&path, "anomaly,indicator,dateyrmo\n0.10,0.10,2025-01\n");
        let store = SeriesStore::new(&path);

        let gappy = IndicatorSeries::from_records(vec![
            MonthRecord::observed(ym("2025-01"), 0.1, 0.1),
            MonthRecord::observed(ym("2025-03"), 0.3, 0.2),
        ]);
        let err = store.save(&gappy).unwrap_err();
        assert!(matches!(err, IndicatorError::InvariantViolation { .. }));

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "anomaly,indicator,dateyrmo\n0.10,0.10,2025-01\n");
        // No temporary files left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_legacy_zero_row_is_the_forecast() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_file(
            &path,
            "anom,indicator,dateyrmo\n\
             0.50,0.50,2025-07\n\
             1.00,0.75,2025-08\n\
             0,0.75,2025-09\n",
        );

        let (series, layout) = SeriesStore::new(&path).load_with_layout().unwrap();
        assert!(layout.is_legacy());
        assert_eq!(series.forecast().map(|r| r.month), Some(ym("2025-09")));
        assert_eq!(series.forecast().map(|r| r.indicator), Some(0.75));
        assert_eq!(series.last_observed().map(|r| r.month), Some(ym("2025-08")));
        series.validate().unwrap();
    }

    #[test]
    fn test_zero_anomaly_is_observed_in_current_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_file(&path, "anomaly,indicator,dateyrmo\n0.50,0.50,2025-07\n0.00,0.25,2025-08\n");

        let (series, layout) = SeriesStore::new(&path).load_with_layout().unwrap();
        assert!(!layout.is_legacy());
        assert!(series.forecast().is_none());
        assert_eq!(series.last_observed().map(|r| r.anomaly), Some(Some(0.0)));
    }

    #[test]
    fn test_production_layout_keeps_extra_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loggerhead_indx.csv");
        write_file(
            &path,
            "date,date_short,anom,indicator,window,flag,dateyrmo\n\
             7/1/2025,7/01/25,0.90,0.70,6,0,2025-07\n\
             8/1/2025,8/01/25,1.00,0.75,6,1,2025-08\n\
             9/01/2025,9/1/25,0,0.75,6,0,2025-09\n",
        );
        let store = SeriesStore::new(&path);

        let (mut series, layout) = store.load_with_layout().unwrap();
        assert!(layout.is_legacy());
        assert_eq!(layout.columns()[4..6], ["window", "flag"]);
        assert_eq!(series.last_observed().map(|r| r.month), Some(ym("2025-08")));
        series.remove_forecasts();
        series.insert_observed(MonthRecord::observed(ym("2025-09"), 1.3, 0.88)).unwrap();
        series.set_forecast(MonthRecord::forecast(ym("2025-10"), 0.88)).unwrap();
        store.save_with_layout(&series, &layout).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "date,date_short,anom,indicator,window,flag,dateyrmo\n\
             7/1/2025,7/01/25,0.90,0.70,6,0,2025-07\n\
             8/1/2025,8/01/25,1.00,0.75,6,1,2025-08\n\
             9/01/2025,9/1/25,1.30,0.88,6,0,2025-09\n\
             10/1/2025,10/01/25,0,0.88,6,0,2025-10\n"
        );

        let (reloaded, _) = store.load_with_layout().unwrap();
        assert_eq!(reloaded.forecast().map(|r| r.month), Some(ym("2025-10")));
        assert_eq!(reloaded.last_observed().map(|r| r.anomaly), Some(Some(1.3)));
    }

    #[test]
    fn test_named_extra_columns_get_defaults_on_new_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("series.csv");
        write_file(&path, "anomaly,indicator,window,note,dateyrmo\n0.50,0.50,6,seed,2025-07\n");
        let store = SeriesStore::new(&path);

        let (mut series, layout) = store.load_with_layout().unwrap();
        series.set_forecast(MonthRecord::forecast(ym("2025-08"), 0.5)).unwrap();
        store.save_with_layout(&series, &layout).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "anomaly,indicator,window,note,dateyrmo\n0.50,0.50,6,seed,2025-07\n,0.50,6,,2025-08\n"
        );
    }

    #[test]
    fn test_failed_write_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_file(&path, "original");

        let result = write_atomically(&path, |w| {
            w.write_all(b"partial")?;
            Err(IndicatorError::Config {
                message: "boom".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(0.5), "0.50");
        assert_eq!(format_value(-0.001), "0.00");
        assert_eq!(format_value(-0.126), "-0.13");
    }
}
