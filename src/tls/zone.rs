//! UTC timestamp rendering
//!
//! Expiry timestamps are printed with the C library's `%c %z` so they follow
//! the process locale, but always in UTC. The process timezone is forced to
//! GMT for the duration of the rendering and put back afterwards.

use std::env;
use std::ffi::OsString;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

/// Serialises every change to `TZ` made by this crate
static ZONE_LOCK: Mutex<()> = Mutex::new(());

const TIMESTAMP_FORMAT: &[u8] = b"%c %z\0";

/// `%c` in the C locale, used when the C library cannot render the instant
const FALLBACK_FORMAT: &str = "%a %b %e %H:%M:%S %Y %z";

extern "C" {
    fn tzset();
}

/// Process timezone forced to GMT until dropped
///
/// The previous `TZ` value, or its absence, is restored on drop.
pub struct UtcZone {
    saved: Option<OsString>,
    _lock: MutexGuard<'static, ()>,
}

impl UtcZone {
    pub fn enter() -> Self {
        let lock = ZONE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let saved = env::var_os("TZ");
        env::set_var("TZ", "GMT");
        unsafe { tzset() };

        UtcZone { saved, _lock: lock }
    }
}

impl Drop for UtcZone {
    fn drop(&mut self) {
        match self.saved.take() {
            Some(tz) => env::set_var("TZ", tz),
            None => env::remove_var("TZ"),
        }
        unsafe { tzset() };
    }
}

/// Render `instant` as `"<locale date and time> +0000"`
pub fn render_utc(instant: &DateTime<Utc>) -> String {
    let _zone = UtcZone::enter();
    render_local(instant.timestamp())
        .unwrap_or_else(|| instant.format(FALLBACK_FORMAT).to_string())
}

fn render_local(seconds: i64) -> Option<String> {
    let time = libc::time_t::try_from(seconds).ok()?;

    // SAFETY: `tm` is plain data and fully written by localtime_r on success
    let mut tm: libc::tm = unsafe { mem::zeroed() };
    if unsafe { libc::localtime_r(&time, &mut tm) }.is_null() {
        return None;
    }

    let mut buf = [0u8; 64];
    // SAFETY: the format is NUL terminated and strftime never writes past `buf.len()`
    let written = unsafe {
        libc::strftime(
            buf.as_mut_ptr().cast::<libc::c_char>(),
            buf.len(),
            TIMESTAMP_FORMAT.as_ptr().cast::<libc::c_char>(),
            &tm,
        )
    };
    if written == 0 {
        return None;
    }

    Some(String::from_utf8_lossy(&buf[..written]).into_owned())
}
