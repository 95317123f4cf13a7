//! Tests for page encoding

use super::page::*;
use crate::error::ErrorKind;

#[test]
fn test_encode_decode_round_trip() {
    let page = Page::new(7, PageType::VectorLeaf, 42, b"hello pages", 4096).unwrap();
    let bytes = page.encode(4096);
    assert_eq!(bytes.len(), 4096);

    let decoded = Page::decode(&bytes).unwrap();
    assert_eq!(decoded.id, 7);
    assert_eq!(decoded.page_type, PageType::VectorLeaf);
    assert_eq!(decoded.seq, 42);
    assert_eq!(decoded.data(), b"hello pages");
}

#[test]
fn test_payload_capacity() {
    assert_eq!(payload_capacity(4096), 4096 - PAGE_HEADER_SIZE);
    // A 64 KiB page payload still fits the u16 size_in_use field.
    assert!(payload_capacity(65536) <= usize::from(u16::MAX));
}

#[test]
fn test_oversized_payload_rejected() {
    let data = vec![0u8; 4096];
    let err = Page::new(1, PageType::Metadata, 0, &data, 4096).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_full_payload_accepted() {
    let data = vec![0xAB; payload_capacity(512)];
    let page = Page::new(1, PageType::Overflow, 1, &data, 512).unwrap();
    let decoded = Page::decode(&page.encode(512)).unwrap();
    assert_eq!(decoded.data(), data.as_slice());
}

#[test]
fn test_corrupted_payload_detected() {
    let page = Page::new(3, PageType::IndexNode, 9, b"payload", 512).unwrap();
    let mut bytes = page.encode(512);
    bytes[100] ^= 0x01;

    let err = Page::decode(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexCorruption);
}

#[test]
fn test_corrupted_header_detected() {
    let page = Page::new(3, PageType::IndexNode, 9, b"payload", 512).unwrap();
    let mut bytes = page.encode(512);
    bytes[0] ^= 0x01; // flip a bit in the id field

    let err = Page::decode(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexCorruption);
}

#[test]
fn test_unknown_type_tag_rejected() {
    let page = Page::new(3, PageType::Metadata, 9, b"x", 512).unwrap();
    let mut bytes = page.encode(512);
    bytes[4] = 99;

    assert!(Page::decode(&bytes).is_err());
}

#[test]
fn test_file_header_round_trip() {
    let header = FileHeader {
        schema_version: SCHEMA_VERSION,
        page_size: 4096,
        free_list_root: 1,
    };
    let bytes = header.encode();
    assert_eq!(&bytes[0..4], FILE_MAGIC);

    let decoded = FileHeader::decode(&bytes).unwrap();
    assert_eq!(decoded, header);
}

#[test]
fn test_file_header_bad_magic() {
    let header = FileHeader {
        schema_version: 1,
        page_size: 4096,
        free_list_root: 1,
    };
    let mut bytes = header.encode();
    bytes[0] = b'X';

    let err = FileHeader::decode(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexCorruption);
}

#[test]
fn test_file_header_implausible_page_size() {
    let header = FileHeader {
        schema_version: 1,
        page_size: 4096,
        free_list_root: 1,
    };
    let mut bytes = header.encode();
    // Rewrite page_size to a non-power-of-two and fix the CRC.
    bytes[6..10].copy_from_slice(&5000u32.to_le_bytes());
    let crc = crate::util::crc32(&bytes[0..14]);
    bytes[14..18].copy_from_slice(&crc.to_le_bytes());

    let err = FileHeader::decode(&bytes).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IndexCorruption);
}
