use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::{Bar, Error, Result};

/// Row layout of a bar CSV file. Extra columns (volume etc.) are ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: chrono::DateTime<chrono::Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

/// Load bars from a CSV file with a `timestamp,open,high,low,close` header.
pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let file = File::open(path)?;
    let bars = read_bars(file)?;
    info!(path = %path.display(), bars = bars.len(), "Loaded bars");
    Ok(bars)
}

/// Parse bars from any CSV source. Timestamps are RFC 3339; rows must be in
/// non-decreasing timestamp order.
pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut record = csv::StringRecord::new();
    let mut bars: Vec<Bar> = Vec::new();
    while rdr.read_record(&mut record)? {
        let line = record.position().map_or(0, |p| p.line());
        let row: CsvRow = record.deserialize(Some(&headers))?;
        let bar = Bar {
            timestamp: row.timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
        };
        validate_bar(&bar, line)?;

        if let Some(prev) = bars.last() {
            if bar.timestamp < prev.timestamp {
                return Err(Error::InvalidData(format!(
                    "line {line}: timestamp {} is earlier than previous bar {}",
                    bar.timestamp, prev.timestamp
                )));
            }
        }
        bars.push(bar);
    }

    debug!(bars = bars.len(), "Parsed bar CSV");
    Ok(bars)
}

fn validate_bar(bar: &Bar, line: u64) -> Result<()> {
    let prices = [bar.open, bar.high, bar.low, bar.close];
    if prices.iter().any(|p| !p.is_finite()) {
        return Err(Error::InvalidData(format!("line {line}: non-finite price")));
    }
    if bar.high < bar.low {
        return Err(Error::InvalidData(format!(
            "line {line}: high {} below low {}",
            bar.high, bar.low
        )));
    }
    Ok(())
}
