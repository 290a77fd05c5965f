use durable_bloom_rs::{
    BloomConfigBuilder, BloomError, BloomFilter, TRAILER_LEN,
};
use std::io::Cursor;

fn build_filter(estimated_elements: u64, fpr: f64) -> BloomFilter {
    let config = BloomConfigBuilder::default()
        .estimated_elements(estimated_elements)
        .false_positive_rate(fpr)
        .build()
        .expect("Failed to build test config");
    BloomFilter::new(config).expect("Failed to create test filter")
}

fn populated_filter() -> (BloomFilter, Vec<Vec<u8>>, Vec<Vec<u8>>) {
    let mut filter = build_filter(1000, 0.01);
    let present: Vec<Vec<u8>> = (0..100)
        .map(|i| format!("present_{i:04}").into_bytes())
        .collect();
    let absent: Vec<Vec<u8>> = (0..100)
        .map(|i| format!("absent_{i:04}").into_bytes())
        .collect();
    for item in &present {
        filter.add(item).unwrap();
    }
    (filter, present, absent)
}

#[test]
fn test_binary_roundtrip_through_buffer() {
    let (filter, present, absent) = populated_filter();

    let mut buf = Vec::new();
    filter.export_to(&mut buf).unwrap();
    assert_eq!(buf.len(), filter.export_size());

    let loaded = BloomFilter::from_bytes(&buf, None).unwrap();
    assert_eq!(loaded.params(), filter.params());
    assert_eq!(loaded.elements_added(), filter.elements_added());
    assert_eq!(
        loaded.estimate_elements().unwrap(),
        filter.estimate_elements().unwrap()
    );
    for item in present.iter().chain(&absent) {
        assert_eq!(
            loaded.check(item).unwrap(),
            filter.check(item).unwrap(),
            "Membership changed across roundtrip for {:?}",
            String::from_utf8_lossy(item)
        );
    }
}

#[test]
fn test_binary_roundtrip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.blm");
    let (filter, present, _) = populated_filter();

    filter.export_file(&path).unwrap();
    assert_eq!(
        std::fs::metadata(&path).unwrap().len() as usize,
        filter.export_size()
    );

    let loaded = BloomFilter::from_file(&path, None).unwrap();
    for item in &present {
        assert!(loaded.check(item).unwrap());
    }
    assert_eq!(loaded.elements_added(), 100);
}

#[test]
fn test_binary_roundtrip_through_reader() {
    let (filter, present, _) = populated_filter();
    let mut buf = Vec::new();
    filter.export_to(&mut buf).unwrap();

    let loaded =
        BloomFilter::from_reader(&mut Cursor::new(buf), None).unwrap();
    for item in &present {
        assert!(loaded.check(item).unwrap());
    }
}

#[test]
fn test_hex_roundtrip() {
    let (filter, present, absent) = populated_filter();

    let encoded = filter.export_hex().unwrap();
    assert_eq!(encoded.len(), filter.export_size() * 2);
    assert!(encoded.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(encoded, encoded.to_lowercase());

    let loaded = BloomFilter::from_hex(&encoded, None).unwrap();
    assert_eq!(loaded.params(), filter.params());
    assert_eq!(loaded.elements_added(), filter.elements_added());
    for item in present.iter().chain(&absent) {
        assert_eq!(loaded.check(item).unwrap(), filter.check(item).unwrap());
    }
}

#[test]
fn test_hex_and_binary_agree() {
    let (filter, present, _) = populated_filter();

    let mut binary = Vec::new();
    filter.export_to(&mut binary).unwrap();
    let from_binary = BloomFilter::from_bytes(&binary, None).unwrap();
    let from_hex =
        BloomFilter::from_hex(&filter.export_hex().unwrap(), None).unwrap();

    assert_eq!(from_binary.params(), from_hex.params());
    assert_eq!(from_binary.elements_added(), from_hex.elements_added());
    for item in &present {
        assert_eq!(
            from_binary.check(item).unwrap(),
            from_hex.check(item).unwrap()
        );
    }
}

// Exact wire vectors for an empty 10-element / 5% filter: 8 array bytes,
// then the trailer. Binary trailer is little-endian, hex trailer is
// big-endian; 0.05f32 is 0x3d4ccccd.
#[test]
fn test_known_binary_image() {
    let mut image = vec![0u8; 8];
    image.extend_from_slice(&[0x0a, 0, 0, 0, 0, 0, 0, 0]);
    image.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0]);
    image.extend_from_slice(&[0xcd, 0xcc, 0x4c, 0x3d]);

    let loaded = BloomFilter::from_bytes(&image, None).unwrap();
    assert_eq!(loaded.estimated_elements(), 10);
    assert_eq!(loaded.elements_added(), 0);
    assert_eq!(loaded.number_bits(), 63);
    assert_eq!(loaded.number_hashes(), 4);

    // And a fresh filter writes exactly those bytes back.
    let filter = build_filter(10, 0.05);
    let mut buf = Vec::new();
    filter.export_to(&mut buf).unwrap();
    assert_eq!(buf, image);
}

#[test]
fn test_known_hex_image() {
    let image = format!(
        "{}{}{}{}",
        "0000000000000000",  // bit array
        "000000000000000a",  // estimated elements, big-endian
        "0000000000000000",  // elements added
        "3d4ccccd"           // 0.05f32, big-endian
    );

    let loaded = BloomFilter::from_hex(&image, None).unwrap();
    assert_eq!(loaded.estimated_elements(), 10);
    assert_eq!(loaded.number_bits(), 63);
    assert_eq!(loaded.number_hashes(), 4);

    assert_eq!(build_filter(10, 0.05).export_hex().unwrap(), image);
}

#[test]
fn test_load_rejects_truncated_data() {
    assert!(matches!(
        BloomFilter::from_bytes(&[0u8; TRAILER_LEN - 1], None),
        Err(BloomError::CorruptData(_))
    ));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.blm");
    std::fs::write(&path, [0u8; 5]).unwrap();
    assert!(matches!(
        BloomFilter::from_file(&path, None),
        Err(BloomError::CorruptData(_))
    ));
}

#[test]
fn test_load_rejects_length_mismatch() {
    let (filter, _, _) = populated_filter();
    let mut buf = Vec::new();
    filter.export_to(&mut buf).unwrap();
    buf.insert(0, 0xff);
    assert!(matches!(
        BloomFilter::from_bytes(&buf, None),
        Err(BloomError::CorruptData(_))
    ));
}

#[test]
fn test_load_rejects_malformed_hex() {
    assert!(matches!(
        BloomFilter::from_hex("zz not hex", None),
        Err(BloomError::CorruptData(_))
    ));
    // Valid hex digits, odd length
    assert!(matches!(
        BloomFilter::from_hex("abc", None),
        Err(BloomError::CorruptData(_))
    ));
    // Valid hex, shorter than the trailer
    assert!(matches!(
        BloomFilter::from_hex("abcd", None),
        Err(BloomError::CorruptData(_))
    ));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does_not_exist.blm");
    assert!(matches!(
        BloomFilter::from_file(&path, None),
        Err(BloomError::Io(_))
    ));
}
