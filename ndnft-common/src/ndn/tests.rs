//! Unit tests for the NDN packet implementation

use super::*;

#[test]
fn name_creation() {
    let name = Name::from_string("/test/data/1");

    assert_eq!(name.len(), 3);
    assert_eq!(name.get(0).unwrap().as_bytes().as_ref(), b"test");
    assert_eq!(name.get(1).unwrap().as_bytes().as_ref(), b"data");
    assert_eq!(name.get(2).unwrap().as_bytes().as_ref(), b"1");

    assert_eq!(name.to_string(), "/test/data/1");
}

#[test]
fn name_compare() {
    let name1 = Name::from_string("/a/b/c");
    let name2 = Name::from_string("/a/b/c");
    let name3 = Name::from_string("/a/b/d");
    let name4 = Name::from_string("/a/b");

    assert_eq!(name1, name2);
    assert_ne!(name1, name3);
    assert_ne!(name1, name4);

    assert!(name4.is_prefix_of(&name1));
    assert!(!name1.is_prefix_of(&name4));
    assert!(!name3.is_prefix_of(&name1));
}

#[test]
fn name_tlv_roundtrip_with_conventions() {
    let mut name = Name::from_string("/files/report.bin");
    name.push(NameComponent::version(1_700_000_000_000));
    name.push(NameComponent::segment(42));

    let decoded = Name::from_tlv(&name.to_tlv()).unwrap();
    assert_eq!(decoded, name);
    assert!(decoded.last().unwrap().is_segment());
    assert_eq!(decoded.last().unwrap().as_number().unwrap(), 42);
    assert_eq!(decoded.get(3).unwrap().as_number().unwrap(), 1_700_000_000_000);
}

#[test]
fn metadata_keyword_component() {
    let mut name = Name::from_string("/files/a");
    name.push(NameComponent::keyword(METADATA_KEYWORD));

    assert!(name.last().unwrap().is_metadata_keyword());
    assert!(!name.get(0).unwrap().is_metadata_keyword());
}

#[test]
fn interest_wire_roundtrip() {
    let name = Name::from_string("/test/interest");
    let interest = Interest::new(name.clone())
        .with_can_be_prefix(true)
        .with_must_be_fresh(true)
        .with_nonce(42)
        .with_lifetime(4000);

    let wire = interest.to_wire();
    assert_eq!(packet_type(&wire), Some(tlv::TLV_INTEREST));

    let parsed = Interest::from_wire(&wire).unwrap();
    assert_eq!(parsed.name, name);
    assert!(parsed.can_be_prefix);
    assert!(parsed.must_be_fresh);
    assert_eq!(parsed.nonce, 42);
    assert_eq!(parsed.lifetime_ms, 4000);
}

#[test]
fn interest_flags_absent_by_default() {
    let interest = Interest::new(Name::from_string("/plain"));
    let parsed = Interest::from_wire(&interest.to_wire()).unwrap();

    assert!(!parsed.can_be_prefix);
    assert!(!parsed.must_be_fresh);
}

#[test]
fn data_wire_roundtrip() {
    let name = Name::from_string("/test/data");
    let content = Bytes::from_static(b"Hello, NDN!");
    let mut data = Data::new(name.clone(), content.clone())
        .with_content_type(ContentType::Blob)
        .with_freshness(10000)
        .with_final_block_id(NameComponent::segment(7));
    data.sign_digest();

    let wire = data.to_wire();
    assert_eq!(packet_type(&wire), Some(tlv::TLV_DATA));

    let parsed = Data::from_wire(&wire).unwrap();
    assert_eq!(parsed.name, name);
    assert_eq!(parsed.content, content);
    assert_eq!(parsed.content_type, ContentType::Blob);
    assert_eq!(parsed.freshness_ms, 10000);
    assert_eq!(parsed.final_block_id_segment(), Some(7));
    assert!(parsed.verify_digest());
}

#[test]
fn digest_detects_tampering() {
    let mut data = Data::new(Name::from_string("/x"), Bytes::from_static(b"abc"));
    data.sign_digest();
    assert!(data.verify_digest());

    data.content = Bytes::from_static(b"abd");
    assert!(!data.verify_digest());
}

#[test]
fn nack_reason_codes() {
    for reason in [
        NackReason::Congestion,
        NackReason::Duplicate,
        NackReason::NoRoute,
        NackReason::Other(200),
    ] {
        assert_eq!(NackReason::from_code(reason.code()), reason);
    }
}
