//! Session expiry/renewal timing (§4.6 "Session expiry").

use serde::{Deserialize, Serialize};

/// Fractions of the `[start, end]` window at which the renew affordance and
/// the precise countdown appear. See SPEC_FULL.md §12 for why these values
/// (any monotonic schedule in `(start, end]` satisfies the spec's tests).
const BUTTON_FRACTION: f64 = 0.70;
const COUNTDOWN_FRACTION: f64 = 0.90;
const NOTIFICATION_FRACTIONS: [f64; 3] = [0.75, 0.90, 0.99];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryTimes {
    pub start: i64,
    pub end: i64,
    pub button_time: i64,
    pub countdown_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryInfo {
    pub times: ExpiryTimes,
    pub notification_times: Vec<i64>,
}

impl ExpiryInfo {
    /// Builds an `ExpiryInfo` from a session window, maintaining
    /// `start < button_time < countdown_time < end` and keeping every
    /// notification time inside `(start, end]`.
    ///
    /// `button_time`/`countdown_time` are picked as distinct indices into the
    /// integer points strictly between `start` and `end`, not as two
    /// fractions independently clamped into the same range — clamping two
    /// already-close fractions can otherwise send both to the same point.
    /// That requires at least 3 s between `start` and `end` (two distinct
    /// interior seconds); real session lifetimes are always far longer, but
    /// shorter windows fall back to a best-effort (non-strict) placement
    /// instead of panicking.
    pub fn from_window(start: i64, end: i64) -> Self {
        let interior = (end - start - 1).max(0);
        let (button_time, countdown_time) = if interior >= 2 {
            let last_idx = interior - 1;
            let button_idx = (((last_idx as f64) * BUTTON_FRACTION) as i64).clamp(0, last_idx - 1);
            let countdown_idx = (((last_idx as f64) * COUNTDOWN_FRACTION) as i64)
                .max(button_idx + 1)
                .min(last_idx);
            (start + 1 + button_idx, start + 1 + countdown_idx)
        } else if interior == 1 {
            (start + 1, start + 1)
        } else {
            (start, start)
        };

        let span = (end - start).max(1) as f64;
        let notification_times = NOTIFICATION_FRACTIONS
            .iter()
            .map(|f| start + (span * f) as i64)
            .map(|t| t.clamp(start + 1, end.max(start + 1)))
            .collect();

        ExpiryInfo {
            times: ExpiryTimes {
                start,
                end,
                button_time,
                countdown_time,
            },
            notification_times,
        }
    }

    pub fn should_show_renew_button(&self, now: i64) -> bool {
        now >= self.times.button_time
    }

    pub fn should_show_countdown(&self, now: i64) -> bool {
        now >= self.times.countdown_time
    }
}
