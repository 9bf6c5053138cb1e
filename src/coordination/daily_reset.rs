use chrono::NaiveDate;
use std::sync::Mutex;

/// Fires once per calendar date boundary. The first observed date only
/// anchors the gate.
#[derive(Debug, Default)]
pub struct DailyResetGate {
    last: Mutex<Option<NaiveDate>>,
}

impl DailyResetGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True exactly once for each date later than the last one seen
    pub fn check(&self, today: NaiveDate) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            None => {
                *last = Some(today);
                false
            }
            Some(prev) if today > prev => {
                *last = Some(today);
                true
            }
            Some(_) => false,
        }
    }

    pub fn anchored_date(&self) -> Option<NaiveDate> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}
