//! End-to-end decode tests against built archives.

mod common;

use common::{Codec, Entry, FolderPlan, Plan, assemble, build, simple_archive};
use sjuz_archive::{SjuzError, decompress};

#[test]
fn copy_single_file() {
    let data = simple_archive(Codec::Copy, &[("hello.txt", b"hello world")]);
    let archive = decompress(&data).unwrap();

    assert_eq!(archive.files.len(), 1);
    assert_eq!(archive.files[0].name, "hello.txt");
    assert_eq!(archive.files[0].data, b"hello world");
    assert!(archive.files[0].crc_ok);
    assert_eq!(archive.id.len(), 8);
}

#[test]
fn lzma_single_file() {
    let payload: Vec<u8> = b"An archive is a directory of files, flattened. "
        .iter()
        .copied()
        .cycle()
        .take(10_000)
        .collect();

    let data = simple_archive(Codec::Lzma, &[("big.txt", &payload)]);
    let archive = decompress(&data).unwrap();

    assert_eq!(archive.files.len(), 1);
    assert_eq!(archive.files[0].data, payload);
    assert!(archive.files[0].crc_ok);
}

#[test]
fn lzma2_single_file() {
    let payload = vec![0x42u8; 5000];
    let data = simple_archive(Codec::Lzma2, &[("b.bin", &payload)]);
    let archive = decompress(&data).unwrap();

    assert_eq!(archive.files[0].data, payload);
    assert!(archive.files[0].crc_ok);
}

#[test]
fn lzma_delta_chain() {
    // A rising waveform: delta-filtered it is nearly constant.
    let payload: Vec<u8> = (0..4096u32).map(|i| (i / 16) as u8).collect();

    let data = simple_archive(Codec::LzmaDelta(1), &[("wave.raw", &payload)]);
    let archive = decompress(&data).unwrap();

    assert_eq!(archive.files[0].data, payload);
    assert!(archive.files[0].crc_ok);
}

#[test]
fn multiple_files_preserve_order_and_bytes() {
    let a = b"alpha".to_vec();
    let b: Vec<u8> = (0..2000u32).map(|i| (i % 256) as u8).collect();
    let c = b"gamma gamma gamma".to_vec();

    let plan = Plan::new(
        vec![
            Entry::Data("a.txt", a.clone()),
            Entry::Data("b.bin", b.clone()),
            Entry::Data("c.txt", c.clone()),
        ],
        vec![
            FolderPlan {
                codec: Codec::Lzma,
                num_files: 2,
            },
            FolderPlan {
                codec: Codec::Copy,
                num_files: 1,
            },
        ],
    );

    let archive = decompress(&build(&plan)).unwrap();

    assert_eq!(archive.files.len(), 3);
    assert_eq!(archive.files[0].name, "a.txt");
    assert_eq!(archive.files[0].data, a);
    assert_eq!(archive.files[1].name, "b.bin");
    assert_eq!(archive.files[1].data, b);
    assert_eq!(archive.files[2].name, "c.txt");
    assert_eq!(archive.files[2].data, c);
    assert!(archive.files.iter().all(|f| f.crc_ok));
}

#[test]
fn compressed_header_two_folders_three_files() {
    // The metadata block itself is LZMA-packed; folder one holds a single
    // file, folder two splits into two substreams.
    let one = b"first file, its own folder".to_vec();
    let two: Vec<u8> = b"second ".iter().copied().cycle().take(700).collect();
    let three = b"third, sharing the folder with the second".to_vec();

    let mut plan = Plan::new(
        vec![
            Entry::Data("one.txt", one.clone()),
            Entry::Data("two.txt", two.clone()),
            Entry::Data("three.txt", three.clone()),
        ],
        vec![
            FolderPlan {
                codec: Codec::Lzma,
                num_files: 1,
            },
            FolderPlan {
                codec: Codec::Lzma,
                num_files: 2,
            },
        ],
    );
    plan.encode_header = true;

    let archive = decompress(&build(&plan)).unwrap();

    assert_eq!(archive.files.len(), 3);
    assert_eq!(archive.files[0].name, "one.txt");
    assert_eq!(archive.files[0].data, one);
    assert_eq!(archive.files[1].name, "two.txt");
    assert_eq!(archive.files[1].data, two);
    assert_eq!(archive.files[2].name, "three.txt");
    assert_eq!(archive.files[2].data, three);
    assert!(archive.files.iter().all(|f| f.crc_ok));
}

#[test]
fn empty_archive_no_metadata() {
    // A signature header declaring a zero-sized metadata block.
    let data = assemble(&[], &[]);
    let archive = decompress(&data).unwrap();

    assert!(archive.files.is_empty());
    assert_eq!(archive.id.len(), 8);
}

#[test]
fn empty_file_table() {
    let plan = Plan::new(vec![], vec![]);
    let archive = decompress(&build(&plan)).unwrap();
    assert!(archive.files.is_empty());
}

#[test]
fn directories_and_anti_items_omitted_empty_files_kept() {
    let plan = Plan::new(
        vec![
            Entry::Dir("docs"),
            Entry::Data("docs/readme", b"read me".to_vec()),
            Entry::Empty("docs/empty.txt"),
            Entry::Anti("docs/deleted.txt"),
        ],
        vec![FolderPlan {
            codec: Codec::Copy,
            num_files: 1,
        }],
    );

    let archive = decompress(&build(&plan)).unwrap();

    assert_eq!(archive.files.len(), 2);
    assert_eq!(archive.files[0].name, "docs/readme");
    assert_eq!(archive.files[0].data, b"read me");
    assert_eq!(archive.files[1].name, "docs/empty.txt");
    assert!(archive.files[1].data.is_empty());
    assert!(archive.files[1].crc_ok);
}

#[test]
fn decode_is_idempotent() {
    let data = simple_archive(
        Codec::Lzma,
        &[("x", b"same bytes in"), ("y", b"same bytes out")],
    );

    let first = decompress(&data).unwrap();
    let second = decompress(&data).unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.files, second.files);
}

#[test]
fn id_is_content_derived() {
    let a = simple_archive(Codec::Copy, &[("f", b"contents a")]);
    let b = simple_archive(Codec::Copy, &[("f", b"contents b")]);

    assert_ne!(
        decompress(&a).unwrap().id,
        decompress(&b).unwrap().id
    );
}

#[test]
fn truncation_at_every_offset_fails_loudly() {
    let data = simple_archive(Codec::Copy, &[("t.txt", b"truncate me")]);

    for cut in 0..data.len() {
        let result = decompress(&data[..cut]);
        match result {
            Err(SjuzError::Truncated { .. } | SjuzError::HeaderCorrupt { .. }) => {}
            other => panic!("cut at {cut}: expected a truncation error, got {other:?}"),
        }
    }
}

#[test]
fn payload_bit_flips_detected_with_copy_codec() {
    let data = simple_archive(Codec::Copy, &[("f.txt", b"every byte matters here")]);
    let payload_len = b"every byte matters here".len();

    // The packed payload sits right after the 32-byte signature header.
    for byte in 0..payload_len {
        for bit in 0..8 {
            let mut corrupt = data.clone();
            corrupt[32 + byte] ^= 1 << bit;

            match decompress(&corrupt) {
                Ok(archive) => {
                    assert!(
                        !archive.files[0].crc_ok,
                        "flip at byte {byte} bit {bit} went unnoticed"
                    );
                }
                Err(_) => {}
            }
        }
    }
}

#[test]
fn payload_bit_flips_never_silent_with_lzma() {
    let payload: Vec<u8> = b"lzma payload ".iter().copied().cycle().take(400).collect();
    let data = simple_archive(Codec::Lzma, &[("f.bin", &payload)]);

    // Flip a bit in each byte of the packed region (everything between the
    // signature header and the metadata block is packed payload here).
    let meta_len = {
        let tail = &data[20..28];
        u64::from_le_bytes(tail.try_into().unwrap()) as usize
    };
    let packed_end = data.len() - meta_len;

    for offset in (32..packed_end).step_by(7) {
        let mut corrupt = data.clone();
        corrupt[offset] ^= 0x10;

        match decompress(&corrupt) {
            // Either the decoder notices...
            Err(_) => {}
            Ok(archive) => {
                let file = &archive.files[0];
                // ...or the checksum flags the file, or the flipped bit was
                // in a region the decoder never consumed and the output is
                // still byte-exact. Wrong bytes with a clean flag would be
                // a silent failure.
                assert!(
                    !file.crc_ok || file.data == payload,
                    "silent corruption at offset {offset}"
                );
            }
        }
    }
}

#[test]
fn metadata_bit_flip_is_header_corrupt() {
    let data = simple_archive(Codec::Copy, &[("m.txt", b"metadata guarded")]);

    // Flip a bit in the metadata block (the tail of the file).
    let mut corrupt = data.clone();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0x01;

    assert!(matches!(
        decompress(&corrupt),
        Err(SjuzError::HeaderCorrupt { .. })
    ));
}

#[test]
fn unknown_file_section_is_skipped() {
    let mut plan = Plan::new(
        vec![Entry::Data("still-works.txt", b"forward compatible".to_vec())],
        vec![FolderPlan {
            codec: Codec::Copy,
            num_files: 1,
        }],
    );
    plan.extra_files_section = Some((0x7E, vec![0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02]));

    let archive = decompress(&build(&plan)).unwrap();
    assert_eq!(archive.files[0].data, b"forward compatible");
}

#[test]
fn unsupported_codec_names_the_method() {
    let plan = Plan::new(
        vec![Entry::Data("enc.bin", b"opaque".to_vec())],
        vec![FolderPlan {
            codec: Codec::Raw(vec![0x06, 0xF1, 0x07, 0x01]),
            num_files: 1,
        }],
    );

    match decompress(&build(&plan)) {
        Err(SjuzError::UnsupportedCodec { method }) => {
            assert_eq!(method, "06 f1 07 01");
        }
        other => panic!("expected UnsupportedCodec, got {other:?}"),
    }
}

#[test]
fn substream_crcs_verified_per_file() {
    let plan = Plan::new(
        vec![
            Entry::Data("first", vec![1, 2, 3, 4, 5]),
            Entry::Data("second", vec![6, 7, 8, 9]),
        ],
        vec![FolderPlan {
            codec: Codec::Copy,
            num_files: 2,
        }],
    );
    let data = build(&plan);

    let archive = decompress(&data).unwrap();
    assert!(archive.files.iter().all(|f| f.crc_ok));

    // Corrupt only the second file's bytes within the shared folder.
    let mut corrupt = data.clone();
    corrupt[32 + 6] ^= 0xFF;
    let archive = decompress(&corrupt).unwrap();

    // The first file's own digest still verifies; the second one's fails,
    // and its (wrong) bytes are returned rather than dropped.
    assert!(archive.files[0].crc_ok);
    assert!(!archive.files[1].crc_ok);
    assert_eq!(archive.files[1].data, vec![6, 7 ^ 0xFF, 8, 9]);
}

#[test]
fn crcs_absent_means_unverified_not_failed() {
    let mut plan = Plan::new(
        vec![Entry::Data("nocrc.txt", b"trust me".to_vec())],
        vec![FolderPlan {
            codec: Codec::Copy,
            num_files: 1,
        }],
    );
    plan.crcs = false;

    let archive = decompress(&build(&plan)).unwrap();
    assert!(archive.files[0].crc_ok);
    assert_eq!(archive.files[0].data, b"trust me");
}

#[test]
fn garbage_input_is_rejected() {
    assert!(decompress(b"not a sevenz archive at all").is_err());
    assert!(decompress(&[]).is_err());
}
