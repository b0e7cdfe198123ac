//! Time handling for the scheduler: window/recurrence parsing and the clock
//!
//! Tasks never call `Utc::now()` directly; they ask a [`Clock`] so that the
//! whole downscale/upscale cycle can be driven from tests.

pub mod clock;
pub mod window;

pub use clock::{Clock, FixedClock, SystemClock};
pub use window::{is_recurrence_date, is_recurrence_day, parse_recurrence, parse_window, Window};
