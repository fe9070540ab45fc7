//! Container decoding through the public API.

mod common;

use android_collector::backup::{decode_backup, encode_backup, BackupEntry, EncodeOptions, HeaderLayout};
use android_collector::error::DecodeError;
use common::{container, sms_db};
use proptest::prelude::*;

fn entries(items: &[(&str, &[u8])]) -> Vec<BackupEntry> {
    items
        .iter()
        .map(|(path, data)| BackupEntry { path: path.to_string(), data: data.to_vec() })
        .collect()
}

#[test]
fn test_decodes_database_entries_in_archive_order() {
    let sms = sms_db(&[("+15550100", 1_696_514_400_000, "hello", 1)]);
    let data = container(
        &[
            ("apps/com.android.providers.telephony/_manifest", b"manifest".to_vec()),
            ("apps/com.android.providers.telephony/db/mmssms.db", sms.clone()),
            ("apps/com.android.providers.telephony/db/mmssms.db-journal", vec![0u8; 10]),
        ],
        true,
    );

    let decoded = decode_backup(&data).unwrap();
    assert!(decoded.header.compressed);
    assert_eq!(decoded.header.layout, HeaderLayout::Binary);
    assert!(decoded.error.is_none());
    let paths: Vec<&str> = decoded.entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "apps/com.android.providers.telephony/_manifest",
            "apps/com.android.providers.telephony/db/mmssms.db",
            "apps/com.android.providers.telephony/db/mmssms.db-journal",
        ]
    );
    assert_eq!(decoded.entries[1].data, sms);
}

#[test]
fn test_truncated_stream_keeps_earlier_entries() {
    let first = vec![1u8; 700];
    let second = vec![2u8; 4000];
    let data = container(&[("a/first.db", first.clone()), ("a/second.db", second)], false);

    // Cut halfway through the second entry's data
    let cut = 32 + 512 + 1024 + 512 + 2000;
    let decoded = decode_backup(&data[..cut]).unwrap();

    assert_eq!(decoded.entries.len(), 1);
    assert_eq!(decoded.entries[0].data, first);
    assert_eq!(
        decoded.error,
        Some(DecodeError::Truncated { path: "a/second.db".to_string() })
    );
}

#[test]
fn test_stream_cut_at_entry_boundary_is_reported() {
    let data = container(&[("a/one.db", vec![1u8; 512]), ("a/two.db", vec![2u8; 512])], false);

    let decoded = decode_backup(&data[..32 + 512 + 512]).unwrap();
    assert_eq!(decoded.entries.len(), 1);
    assert!(matches!(decoded.error, Some(DecodeError::Truncated { .. })));
}

#[test]
fn test_device_written_text_header() {
    let items = entries(&[("apps/com.android.chrome/f/app_chrome/Default/History", b"SQLite format 3\0")]);
    let options = EncodeOptions { version: 3, compressed: false, layout: HeaderLayout::Text };
    let data = encode_backup(&items, options).unwrap();

    let decoded = decode_backup(&data).unwrap();
    assert_eq!(decoded.header.version, 3);
    assert_eq!(decoded.header.layout, HeaderLayout::Text);
    assert_eq!(decoded.entries, items);
}

#[test]
fn test_rejects_foreign_and_encrypted_files() {
    assert_eq!(decode_backup(b"PK\x03\x04 not a backup at all, just a zip file").unwrap_err(), DecodeError::InvalidMagic);
    assert!(matches!(decode_backup(b"ANDROID BACKUP\n5\n1\nAES-256\n"), Err(DecodeError::Encrypted(_))));
    assert!(decode_backup(b"ANDROID").is_err());
}

fn arb_entries() -> impl Strategy<Value = Vec<BackupEntry>> {
    prop::collection::vec(
        ("[a-z]{1,8}(/[a-z0-9_]{1,8}){0,3}", prop::collection::vec(any::<u8>(), 0..2048)),
        0..6,
    )
    .prop_map(|items| {
        items
            .into_iter()
            .map(|(path, data)| BackupEntry { path, data })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_container_round_trip(items in arb_entries(), compressed in any::<bool>()) {
        let options = EncodeOptions { compressed, ..EncodeOptions::default() };
        let data = encode_backup(&items, options).unwrap();
        let decoded = decode_backup(&data).unwrap();
        prop_assert!(decoded.error.is_none());
        prop_assert_eq!(decoded.entries, items);
    }

    #[test]
    fn prop_truncation_never_yields_wrong_entries(
        items in arb_entries(),
        compressed in any::<bool>(),
        fraction in 0.0f64..1.0,
    ) {
        let options = EncodeOptions { compressed, ..EncodeOptions::default() };
        let data = encode_backup(&items, options).unwrap();
        let cut = (data.len() as f64 * fraction) as usize;

        // A cut inside the header is an outright error
        if let Ok(decoded) = decode_backup(&data[..cut]) {
            prop_assert!(decoded.error.is_some(), "cut at {} of {} decoded cleanly", cut, data.len());
            prop_assert!(decoded.entries.len() <= items.len());
            prop_assert_eq!(&decoded.entries[..], &items[..decoded.entries.len()]);
        }
    }

    #[test]
    fn prop_cut_near_the_end_is_reported(
        items in arb_entries(),
        compressed in any::<bool>(),
        missing in 1usize..1100,
    ) {
        let options = EncodeOptions { compressed, ..EncodeOptions::default() };
        let data = encode_backup(&items, options).unwrap();
        let cut = data.len().saturating_sub(missing).max(32);
        prop_assume!(cut < data.len());

        let decoded = decode_backup(&data[..cut]).unwrap();
        prop_assert!(decoded.error.is_some(), "cut at {} of {} decoded cleanly", cut, data.len());
        prop_assert_eq!(&decoded.entries[..], &items[..decoded.entries.len()]);
    }
}
