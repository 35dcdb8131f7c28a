use common::{Bar, Error, Result};

/// Average True Range.
///
/// True range is the largest of `high − low`, `|high − prev close|` and
/// `|low − prev close|`; the first bar of a series has no previous close and
/// uses `high − low`. The ATR is the simple average of the last `length`
/// true ranges, so it is defined from the `length`-th bar onwards.
#[derive(Debug, Clone)]
pub struct AtrIndicator {
    pub length: usize,
}

impl AtrIndicator {
    pub fn new(length: usize) -> Self {
        assert!(length >= 1, "ATR length must be >= 1");
        Self { length }
    }

    /// ATR at the last bar of `bars` (oldest first).
    /// Returns `InsufficientHistory` while fewer than `length` bars exist.
    pub fn compute(&self, bars: &[Bar]) -> Result<f64> {
        if bars.len() < self.length {
            return Err(Error::insufficient(self.length, bars.len()));
        }

        let start = bars.len() - self.length;
        let sum: f64 = (start..bars.len()).map(|i| true_range_at(bars, i)).sum();
        Ok(sum / self.length as f64)
    }

    /// ATR for every bar, `None` during warm-up. Same length as `bars`.
    pub fn series(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(bars.len());
        let mut window_sum = 0.0;

        for i in 0..bars.len() {
            window_sum += true_range_at(bars, i);
            if i >= self.length {
                window_sum -= true_range_at(bars, i - self.length);
            }
            out.push((i + 1 >= self.length).then(|| window_sum / self.length as f64));
        }
        out
    }
}

/// True range of `bar` given the previous bar's close, if any.
pub fn true_range(bar: &Bar, prev_close: Option<f64>) -> f64 {
    let range = bar.high - bar.low;
    match prev_close {
        Some(pc) => range.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        None => range,
    }
}

fn true_range_at(bars: &[Bar], i: usize) -> f64 {
    let prev_close = i.checked_sub(1).map(|p| bars[p].close);
    true_range(&bars[i], prev_close)
}
