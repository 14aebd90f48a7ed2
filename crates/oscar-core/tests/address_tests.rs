//! Address parsing and pattern matching tests

use oscar_core::address::{is_pattern, segment_count};
use oscar_core::{Address, AddressError, Message, Pattern, PatternError};

#[test]
fn test_address_parse() {
    let addr = Address::parse("/mixer/layer/0/opacity").unwrap();
    assert_eq!(addr.as_str(), "/mixer/layer/0/opacity");
    assert_eq!(addr.segment_count(), 4);
    assert_eq!(
        addr.segments().collect::<Vec<_>>(),
        vec!["mixer", "layer", "0", "opacity"]
    );
}

#[test]
fn test_address_rejects_pattern_syntax() {
    let result = Address::parse("/mixer/*/gain");
    assert_eq!(
        result,
        Err(AddressError::ReservedCharacter {
            address: "/mixer/*/gain".to_string(),
            character: '*'
        })
    );
}

#[test]
fn test_address_try_from() {
    let addr: Address = "/a/b".try_into().unwrap();
    assert_eq!(addr.to_string(), "/a/b");
    assert!(Address::try_from("a/b").is_err());
}

#[test]
fn test_segment_count() {
    assert_eq!(segment_count("/"), 1);
    assert_eq!(segment_count("/a"), 1);
    assert_eq!(segment_count("/a/b/c"), 3);
    assert_eq!(segment_count("/a/"), 2);
}

#[test]
fn test_is_pattern() {
    assert!(is_pattern("/a/*"));
    assert!(is_pattern("/a/[12]"));
    assert!(is_pattern("/{x,y}"));
    assert!(!is_pattern("/plain/address"));
}

#[test]
fn test_exact_pattern() {
    let pattern = Pattern::compile("/osc").unwrap();
    assert!(pattern.is_literal());
    assert!(pattern.matches("/osc"));
    assert!(!pattern.matches("/osc2"));
    assert!(!pattern.matches("/os"));
}

#[test]
fn test_brace_with_empty_alternative() {
    let pattern = Pattern::compile("/os{c,}").unwrap();
    assert!(pattern.matches("/osc"));
    assert!(pattern.matches("/os"));
}

#[test]
fn test_combined_wildcards() {
    let pattern = Pattern::compile("/mixer/{1,2}/[a-z]*/?").unwrap();
    assert_eq!(pattern.segment_count(), 4);

    assert!(pattern.matches("/mixer/1/gain/x"));
    assert!(pattern.matches("/mixer/2/pan/7"));
    assert!(!pattern.matches("/mixer/3/gain/x"));
    assert!(!pattern.matches("/mixer/1/Gain/x"));
    assert!(!pattern.matches("/mixer/1/gain/xy"));
}

#[test]
fn test_segment_gating() {
    let pattern = Pattern::compile("/a/*").unwrap();
    assert!(pattern.matches("/a/deep"));
    assert!(!pattern.matches("/a/deep/er"));
    assert!(!pattern.matches("/a"));
}

#[test]
fn test_matches_address() {
    let pattern = Pattern::compile("/track/[!0-4]").unwrap();
    let five = Address::parse("/track/5").unwrap();
    let one = Address::parse("/track/1").unwrap();
    assert!(pattern.matches_address(&five));
    assert!(!pattern.matches_address(&one));
}

#[test]
fn test_message_matches() {
    let msg = Message::new("/synth/*/freq");
    assert!(msg.matches("/synth/1/freq"));
    assert!(!msg.matches("/synth/1/amp"));

    let broken = Message::new("/synth/[1");
    assert!(!broken.matches("/synth/1"));
}

#[test]
fn test_pattern_errors() {
    assert!(matches!(
        Pattern::compile("synth"),
        Err(PatternError::MissingLeadingSlash(_))
    ));
    assert!(matches!(
        Pattern::compile("/synth/{a,b"),
        Err(PatternError::Unbalanced { .. })
    ));
}
