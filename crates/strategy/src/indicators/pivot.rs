use common::{Bar, Extreme, Pivot};

/// Check whether the bar at `index` is a confirmed pivot.
///
/// A pivot-low's low is ≤ every low in `[index - left_bars, index + right_bars]`;
/// a pivot-high's high is ≥ every high in that range. A bar tying the window
/// extreme still qualifies. Returns `None` until `right_bars` bars exist after
/// `index`, or when the left side of the window would run off the series.
pub fn confirmed_pivot(
    bars: &[Bar],
    index: usize,
    left_bars: usize,
    right_bars: usize,
    kind: Extreme,
) -> Option<Pivot> {
    if index < left_bars || index + right_bars >= bars.len() {
        return None;
    }

    let price = bars[index].price(kind);
    let window = &bars[index - left_bars..=index + right_bars];
    let is_extreme = match kind {
        Extreme::Low => window.iter().all(|b| price <= b.low),
        Extreme::High => window.iter().all(|b| price >= b.high),
    };

    is_extreme.then_some(Pivot { index, price, kind })
}

/// Most recent pivot confirmed on or before the last bar of `bars`.
///
/// Scans backwards from the newest confirmable candidate, so the cost grows
/// with the distance to the last pivot. Streaming callers should prefer
/// [`PivotTracker`].
pub fn latest_pivot(
    bars: &[Bar],
    left_bars: usize,
    right_bars: usize,
    kind: Extreme,
) -> Option<Pivot> {
    let newest = bars.len().checked_sub(right_bars + 1)?;
    (left_bars..=newest)
        .rev()
        .find_map(|i| confirmed_pivot(bars, i, left_bars, right_bars, kind))
}

/// Remembers the latest confirmed pivot-low and pivot-high of a growing
/// series.
///
/// Call [`PivotTracker::update`] exactly once after each bar is appended;
/// every call checks the single candidate that the new bar confirms.
#[derive(Debug, Clone)]
pub struct PivotTracker {
    pub left_bars: usize,
    pub right_bars: usize,
    last_low: Option<Pivot>,
    last_high: Option<Pivot>,
}

impl PivotTracker {
    pub fn new(left_bars: usize, right_bars: usize) -> Self {
        Self {
            left_bars,
            right_bars,
            last_low: None,
            last_high: None,
        }
    }

    pub fn update(&mut self, bars: &[Bar]) {
        let Some(candidate) = bars.len().checked_sub(self.right_bars + 1) else {
            return;
        };

        let (left, right) = (self.left_bars, self.right_bars);
        if let Some(p) = confirmed_pivot(bars, candidate, left, right, Extreme::Low) {
            self.last_low = Some(p);
        }
        if let Some(p) = confirmed_pivot(bars, candidate, left, right, Extreme::High) {
            self.last_high = Some(p);
        }
    }

    pub fn latest(&self, kind: Extreme) -> Option<Pivot> {
        match kind {
            Extreme::Low => self.last_low,
            Extreme::High => self.last_high,
        }
    }
}
