//! OSC time tags
//!
//! A time tag is a 64-bit NTP fixed point number: the high 32 bits count
//! seconds since 1900-01-01T00:00:00Z, the low 32 bits are a binary fraction
//! of a second. The raw value `1` means "immediately".
//!
//! Only NTP era 0 is handled: seconds wrap at 2^32 (February 2036).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// 64-bit NTP time tag
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timetag(u64);

impl Timetag {
    /// The reserved "execute immediately" value
    pub const IMMEDIATE: Timetag = Timetag(1);

    /// Latest time representable in era 0
    pub const MAX: Timetag = Timetag(u64::MAX);

    /// Wrap a raw wire value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Build a time tag from NTP seconds and fraction
    pub const fn from_parts(seconds: u32, fraction: u32) -> Self {
        Self(((seconds as u64) << 32) | fraction as u64)
    }

    /// Raw wire value
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Seconds since 1900-01-01
    pub const fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Fractional second in units of 1/2^32 s
    pub const fn fraction(self) -> u32 {
        self.0 as u32
    }

    /// True for the reserved values 0 and 1, which are never converted to
    /// wall-clock time
    pub const fn is_immediate(self) -> bool {
        self.0 <= Self::IMMEDIATE.0
    }

    /// Current wall-clock time as a time tag
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Time tag `delay` from now. Delays past the end of NTP era 0
    /// saturate to the latest representable time.
    pub fn after(delay: Duration) -> Self {
        match SystemTime::now().checked_add(delay) {
            Some(at) => Self::from_system_time(at),
            None => Self::MAX,
        }
    }

    /// Convert a wall-clock instant. Times before 1900 saturate to zero,
    /// times after early 2036 (end of era 0) to [`Timetag::MAX`].
    pub fn from_system_time(time: SystemTime) -> Self {
        let offset_nanos = NTP_UNIX_OFFSET as u128 * NANOS_PER_SEC;
        let ntp_nanos = match time.duration_since(UNIX_EPOCH) {
            Ok(since) => offset_nanos + since.as_nanos(),
            Err(before) => offset_nanos.saturating_sub(before.duration().as_nanos()),
        };

        let Ok(seconds) = u32::try_from(ntp_nanos / NANOS_PER_SEC) else {
            return Self::MAX;
        };
        let sub_nanos = ntp_nanos % NANOS_PER_SEC;
        // Round the fraction up so converting back truncates to the same nanosecond
        let fraction = ((sub_nanos << 32) + NANOS_PER_SEC - 1) / NANOS_PER_SEC;

        Self::from_parts(seconds, fraction as u32)
    }

    /// Convert to wall-clock time. Returns `None` for the reserved values
    /// (`<= 1`) and for instants the platform clock cannot represent.
    pub fn to_system_time(self) -> Option<SystemTime> {
        if self.is_immediate() {
            return None;
        }

        let seconds = self.seconds() as u64;
        let nanos = ((self.fraction() as u128 * NANOS_PER_SEC) >> 32) as u64;
        let sub = Duration::from_nanos(nanos);

        if seconds >= NTP_UNIX_OFFSET {
            UNIX_EPOCH.checked_add(Duration::from_secs(seconds - NTP_UNIX_OFFSET) + sub)
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(NTP_UNIX_OFFSET - seconds))?
                .checked_add(sub)
        }
    }

    /// Time remaining until this tag is due. Zero for immediate tags and for
    /// tags that are already in the past.
    pub fn expires_in(self) -> Duration {
        if self.is_immediate() {
            return Duration::ZERO;
        }

        self.to_system_time()
            .and_then(|due| due.duration_since(SystemTime::now()).ok())
            .unwrap_or(Duration::ZERO)
    }
}

impl From<u64> for Timetag {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<Timetag> for u64 {
    fn from(tag: Timetag) -> Self {
        tag.0
    }
}

impl From<SystemTime> for Timetag {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

impl fmt::Display for Timetag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
