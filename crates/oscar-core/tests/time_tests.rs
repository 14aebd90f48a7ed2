//! Time tag tests

use oscar_core::time::NTP_UNIX_OFFSET;
use oscar_core::Timetag;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[test]
fn test_timetag_now() {
    let tag = Timetag::now();
    assert!(!tag.is_immediate());
    assert!(tag.seconds() as u64 > NTP_UNIX_OFFSET);
}

#[test]
fn test_immediate() {
    assert!(Timetag::IMMEDIATE.is_immediate());
    assert_eq!(Timetag::IMMEDIATE.as_u64(), 1);
    assert_eq!(Timetag::IMMEDIATE.expires_in(), Duration::ZERO);
}

#[test]
fn test_raw_conversions() {
    let tag = Timetag::from(0x0000_0001_8000_0000u64);
    assert_eq!(tag.seconds(), 1);
    assert_eq!(tag.fraction(), 0x8000_0000);
    assert_eq!(u64::from(tag), 0x0000_0001_8000_0000);
    assert_eq!(tag.to_string(), "6442450944");
}

#[test]
fn test_system_time_roundtrip() {
    let time = UNIX_EPOCH + Duration::new(1_234_567_890, 987_654_321);
    let tag = Timetag::from(time);
    assert_eq!(tag.seconds() as u64, 1_234_567_890 + NTP_UNIX_OFFSET);
    assert_eq!(tag.to_system_time(), Some(time));
}

#[test]
fn test_ordering_follows_wall_clock() {
    let earlier = Timetag::from_system_time(SystemTime::now());
    let later = Timetag::after(Duration::from_secs(5));
    assert!(earlier < later);
}

#[test]
fn test_expires_in() {
    let tag = Timetag::after(Duration::from_millis(500));
    let remaining = tag.expires_in();
    assert!(remaining > Duration::from_millis(400));
    assert!(remaining <= Duration::from_millis(500));

    let past = Timetag::from_parts(NTP_UNIX_OFFSET as u32, 0);
    assert_eq!(past.expires_in(), Duration::ZERO);
}

#[test]
fn test_serde_is_raw_value() {
    let json = serde_json::to_string(&Timetag::from_parts(2, 0)).unwrap();
    assert_eq!(json, "8589934592");
}
