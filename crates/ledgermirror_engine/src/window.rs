//! Time window planning for change queries.
//!
//! The change endpoints refuse arbitrarily long ranges, so a range
//! `[from, to)` is split into contiguous windows no longer than a fixed span.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Maximum span of one change query accepted by the API.
pub const MAX_WINDOW_DAYS: i64 = 31;

/// A half-open time interval `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Inclusive start.
    pub from: DateTime<Utc>,
    /// Exclusive end.
    pub to: DateTime<Utc>,
}

impl Window {
    /// Length of the window.
    pub fn span(&self) -> Duration {
        self.to - self.from
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from.to_rfc3339(), self.to.to_rfc3339())
    }
}

/// Lazy, forward-only sequence of windows covering a range.
#[derive(Debug, Clone)]
pub struct WindowPlan {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    max_span: Duration,
}

impl Iterator for WindowPlan {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.cursor >= self.end {
            return None;
        }
        let to = match self.cursor.checked_add_signed(self.max_span) {
            Some(to) if to < self.end => to,
            _ => self.end,
        };
        let window = Window {
            from: self.cursor,
            to,
        };
        self.cursor = to;
        Some(window)
    }
}

/// Plans the windows covering `[from, to)`, each at most `max_span` long.
///
/// The last window ends exactly at `to`. An empty or inverted range, or a
/// non-positive span, yields no windows.
pub fn plan(from: DateTime<Utc>, to: DateTime<Utc>, max_span: Duration) -> WindowPlan {
    let end = if max_span <= Duration::zero() { from } else { to };
    WindowPlan {
        cursor: from,
        end,
        max_span,
    }
}

/// The default maximum span as a [`Duration`].
pub fn max_window_span() -> Duration {
    Duration::days(MAX_WINDOW_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn sixty_five_days_make_three_windows() {
        let from = at(1);
        let to = from + Duration::days(65);

        let windows: Vec<Window> = plan(from, to, max_window_span()).collect();

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].to, from + Duration::days(31));
        assert_eq!(windows[1].to, from + Duration::days(62));
        assert_eq!(windows[2].to, to);
        assert_eq!(windows[0].from, from);
        assert_eq!(windows[1].from, windows[0].to);
        assert_eq!(windows[2].from, windows[1].to);
    }

    #[test]
    fn empty_range_plans_nothing() {
        assert_eq!(plan(at(5), at(5), max_window_span()).count(), 0);
        assert_eq!(plan(at(9), at(5), max_window_span()).count(), 0);
    }

    #[test]
    fn short_range_is_single_window() {
        let windows: Vec<Window> = plan(at(1), at(3), max_window_span()).collect();
        assert_eq!(windows, vec![Window { from: at(1), to: at(3) }]);
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let from = at(1);
        let to = from + Duration::days(62);
        let windows: Vec<Window> = plan(from, to, max_window_span()).collect();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].to, to);
    }

    #[test]
    fn non_positive_span_plans_nothing() {
        assert_eq!(plan(at(1), at(20), Duration::zero()).count(), 0);
        assert_eq!(plan(at(1), at(20), Duration::days(-1)).count(), 0);
    }

    proptest! {
        #[test]
        fn windows_are_contiguous_and_bounded(
            start in 0i64..1_000_000,
            len in 0i64..20_000_000,
            span in 1i64..5_000_000,
        ) {
            let from = Utc.timestamp_opt(1_600_000_000 + start, 0).unwrap();
            let to = from + Duration::seconds(len);
            let max_span = Duration::seconds(span);

            let windows: Vec<Window> = plan(from, to, max_span).collect();

            if len == 0 {
                prop_assert!(windows.is_empty());
            } else {
                prop_assert_eq!(windows[0].from, from);
                prop_assert_eq!(windows[windows.len() - 1].to, to);
                for pair in windows.windows(2) {
                    prop_assert_eq!(pair[0].to, pair[1].from);
                }
                for window in &windows {
                    prop_assert!(window.span() <= max_span);
                    prop_assert!(window.span() > Duration::zero());
                }
            }
        }
    }
}
