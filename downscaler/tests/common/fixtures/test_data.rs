//! Common test data and helpers

use chrono::{DateTime, TimeZone, Utc};
use std::future::Future;
use std::time::Duration;

/// Poll interval short enough to keep scenario tests fast
pub const TEST_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long a scenario may take before a test gives up
pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

/// UTC instant; 2024-06-03 is a Monday
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .expect("valid test instant")
}

/// Tuesday 2024-06-04 at the given time
pub fn tuesday(hour: u32, minute: u32) -> DateTime<Utc> {
    utc(2024, 6, 4, hour, minute)
}

/// Wednesday 2024-06-05 at the given time
pub fn wednesday(hour: u32, minute: u32) -> DateTime<Utc> {
    utc(2024, 6, 5, hour, minute)
}

/// Saturday 2024-06-08 at the given time
pub fn saturday(hour: u32, minute: u32) -> DateTime<Utc> {
    utc(2024, 6, 8, hour, minute)
}

/// Re-evaluate `condition` until it holds or [`TEST_DEADLINE`] passes
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + TEST_DEADLINE;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(TEST_POLL_INTERVAL).await;
    }
    false
}
