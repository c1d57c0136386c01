use crate::application::portfolio::Portfolio;
use chrono::NaiveDate;

/// One contiguous span of negative drawdown, bounded by zero-drawdown
/// peaks. `recovery` is None when the span is still open at series end.
#[derive(Debug, Clone)]
pub struct DrawdownPeriod {
    pub start: NaiveDate,
    pub bottom: NaiveDate,
    pub recovery: Option<NaiveDate>,
    pub depth: f64,
    pub time_to_recovery: Option<i64>,
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LongestDrawdown {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub duration: i64,
}

/// Drawdown series from daily returns: distance of the cumulative
/// return path from its running peak.
pub fn drawdown_series(returns: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    let mut out = Vec::with_capacity(returns.len());
    let mut cumulative = 1.0;
    let mut peak = f64::MIN;
    for &(date, ret) in returns {
        cumulative *= 1.0 + ret;
        peak = peak.max(cumulative);
        out.push((date, cumulative / peak - 1.0));
    }
    out
}

pub fn max_drawdown(drawdowns: &[(NaiveDate, f64)]) -> f64 {
    drawdowns.iter().map(|(_, d)| *d).fold(0.0, f64::min)
}

/// Mean of the strictly negative drawdown values.
pub fn average_drawdown(drawdowns: &[(NaiveDate, f64)]) -> f64 {
    let negative: Vec<f64> = drawdowns
        .iter()
        .map(|(_, d)| *d)
        .filter(|d| *d < 0.0)
        .collect();
    if negative.is_empty() {
        return 0.0;
    }
    negative.iter().sum::<f64>() / negative.len() as f64
}

/// Split the drawdown series into recovery periods. Tracks the running
/// bottom inside each span; a return to zero closes it.
pub fn drawdown_periods(drawdowns: &[(NaiveDate, f64)]) -> Vec<DrawdownPeriod> {
    let mut periods = Vec::new();
    let mut open: Option<(NaiveDate, NaiveDate, f64)> = None; // (start, bottom_date, bottom)

    let mut last_date = None;
    for &(date, dd) in drawdowns {
        last_date = Some(date);
        match &mut open {
            None if dd < 0.0 => open = Some((date, date, dd)),
            Some((start, bottom_date, bottom)) => {
                if dd < *bottom {
                    *bottom = dd;
                    *bottom_date = date;
                }
                if dd == 0.0 {
                    periods.push(DrawdownPeriod {
                        start: *start,
                        bottom: *bottom_date,
                        recovery: Some(date),
                        depth: *bottom,
                        time_to_recovery: Some((date - *bottom_date).num_days()),
                        duration: (date - *start).num_days(),
                    });
                    open = None;
                }
            }
            None => {}
        }
    }

    if let (Some((start, bottom_date, bottom)), Some(end)) = (open, last_date) {
        periods.push(DrawdownPeriod {
            start,
            bottom: bottom_date,
            recovery: None,
            depth: bottom,
            time_to_recovery: None,
            duration: (end - start).num_days(),
        });
    }

    periods
}

/// The widest gap between two consecutive zero-drawdown peaks.
pub fn longest_drawdown(drawdowns: &[(NaiveDate, f64)]) -> Option<LongestDrawdown> {
    let peaks: Vec<NaiveDate> = drawdowns
        .iter()
        .filter(|(_, d)| *d == 0.0)
        .map(|(date, _)| *date)
        .collect();

    peaks
        .windows(2)
        .map(|pair| LongestDrawdown {
            start: pair[0],
            end: pair[1],
            duration: (pair[1] - pair[0]).num_days(),
        })
        .max_by_key(|span| span.duration)
}

fn significant<'a>(
    periods: &'a [DrawdownPeriod],
    min_duration: i64,
    min_depth: f64,
) -> impl Iterator<Item = &'a DrawdownPeriod> {
    periods
        .iter()
        .filter(move |p| p.duration >= min_duration && p.depth.abs() >= min_depth.abs())
}

/// Mean days from bottom to recovery over significant, closed spans.
pub fn time_to_recovery(periods: &[DrawdownPeriod], min_duration: i64, min_depth: f64) -> f64 {
    let recoveries: Vec<f64> = significant(periods, min_duration, min_depth)
        .filter_map(|p| p.time_to_recovery)
        .map(|d| d as f64)
        .collect();
    if recoveries.is_empty() {
        return f64::NAN;
    }
    recoveries.iter().sum::<f64>() / recoveries.len() as f64
}

/// Mean span length over significant drawdowns.
pub fn average_drawdown_duration(
    periods: &[DrawdownPeriod],
    min_duration: i64,
    min_depth: f64,
) -> f64 {
    let durations: Vec<f64> = significant(periods, min_duration, min_depth)
        .map(|p| p.duration as f64)
        .collect();
    if durations.is_empty() {
        return f64::NAN;
    }
    durations.iter().sum::<f64>() / durations.len() as f64
}

impl Portfolio {
    pub fn drawdowns(&self) -> Vec<(NaiveDate, f64)> {
        drawdown_series(&self.returns())
    }

    pub fn max_drawdown(&self) -> f64 {
        max_drawdown(&self.drawdowns())
    }

    pub fn average_drawdown(&self) -> f64 {
        average_drawdown(&self.drawdowns())
    }

    pub fn calmar_ratio(&self) -> f64 {
        let max_dd = self.max_drawdown();
        if max_dd == 0.0 {
            return 0.0;
        }
        self.annualized_return() / max_dd.abs()
    }
}
