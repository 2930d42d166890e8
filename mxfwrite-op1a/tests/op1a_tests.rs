//! End-to-end OP-1a writing tests.
//!
//! These drive a full prepare / write-samples / complete cycle into an
//! in-memory file and check the resulting byte layout: partitions, the
//! Random Index Pack and the index table segments.

use mxfwrite_core::Rational;
use mxfwrite_format::ul::labels;
use mxfwrite_format::{EssenceConfig, EssenceType, IndexEntry};
use mxfwrite_op1a::{Op1aClip, Op1aClipConfig};
use std::collections::HashMap;
use std::io::Cursor;

const INDEX_TABLE_SEGMENT_KEY: [u8; 16] = [
    0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x10, 0x01,
    0x00,
];

/// Parse a BER length at `pos`, returning (length, encoded size).
fn parse_ber(bytes: &[u8], pos: usize) -> (u64, usize) {
    let first = bytes[pos];
    if first < 0x80 {
        return (first as u64, 1);
    }
    let count = (first & 0x7F) as usize;
    let mut length = 0u64;
    for i in 0..count {
        length = (length << 8) | bytes[pos + 1 + i] as u64;
    }
    (length, 1 + count)
}

/// Collect the local items of every index table segment in the file.
fn parse_index_segments(bytes: &[u8]) -> Vec<HashMap<u16, Vec<u8>>> {
    let mut segments = Vec::new();
    let mut pos = 0;
    while pos + 16 <= bytes.len() {
        if bytes[pos..pos + 16] == INDEX_TABLE_SEGMENT_KEY {
            let (length, llen) = parse_ber(bytes, pos + 16);
            let mut items = HashMap::new();
            let mut item_pos = pos + 16 + llen;
            let end = item_pos + length as usize;
            while item_pos + 4 <= end {
                let tag = u16::from_be_bytes([bytes[item_pos], bytes[item_pos + 1]]);
                let item_len =
                    u16::from_be_bytes([bytes[item_pos + 2], bytes[item_pos + 3]]) as usize;
                items.insert(
                    tag,
                    bytes[item_pos + 4..item_pos + 4 + item_len].to_vec(),
                );
                item_pos += 4 + item_len;
            }
            segments.push(items);
            pos = end;
        } else {
            pos += 1;
        }
    }
    segments
}

fn u32_item(items: &HashMap<u16, Vec<u8>>, tag: u16) -> u32 {
    u32::from_be_bytes(items[&tag][..4].try_into().unwrap())
}

fn i64_item(items: &HashMap<u16, Vec<u8>>, tag: u16) -> i64 {
    i64::from_be_bytes(items[&tag][..8].try_into().unwrap())
}

#[test]
fn test_single_pcm_track_one_second() {
    let config = Op1aClipConfig::new(Rational::FPS_25);
    let mut clip = Op1aClip::new(Cursor::new(Vec::new()), config);
    let track = clip.add_track(EssenceConfig::pcm(1, 16)).unwrap();
    clip.prepare_write().unwrap();

    let samples = vec![0u8; 2 * 48_000];
    clip.write_samples(track, &samples, 48_000).unwrap();
    clip.complete_write().unwrap();

    // CBE index: one segment with a 2-byte edit unit and 48000 edit units
    let cbe = clip.cbe_index().unwrap();
    assert_eq!(cbe.edit_unit_byte_count(), 2);
    assert_eq!(cbe.duration(), 48_000);
    assert_eq!(clip.container_size(), 96_000);

    let offsets: Vec<u64> = clip.partitions().iter().map(|p| p.this_partition).collect();
    let bytes = clip.into_inner().into_inner();

    // the clip-wrapped KLV length was patched to the full essence size
    let pcm_key_pos = bytes
        .windows(16)
        .position(|window| window[0..13] == [0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x16])
        .unwrap();
    let (klv_len, _) = parse_ber(&bytes, pcm_key_pos + 16);
    assert_eq!(klv_len, 96_000);

    // header, index, body and footer partitions all carry closed keys
    assert_eq!(offsets.len(), 4);
    for &offset in &offsets {
        assert_eq!(bytes[offset as usize + 14], 0x04);
    }

    // rewritten CBE segment in the file shows the final duration
    let segments = parse_index_segments(&bytes);
    assert_eq!(segments.len(), 1);
    assert_eq!(u32_item(&segments[0], 0x3F05), 2);
    assert_eq!(i64_item(&segments[0], 0x3F0D), 48_000);
}

#[test]
fn test_frame_wrapped_dv25_hundred_frames() {
    let config = Op1aClipConfig::new(Rational::FPS_25);
    let mut clip = Op1aClip::new(Cursor::new(Vec::new()), config);
    let track = clip
        .add_track(EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25))
        .unwrap();
    clip.prepare_write().unwrap();

    let frame = vec![0u8; 144_000];
    for _ in 0..100 {
        clip.write_samples(track, &frame, 1).unwrap();
    }
    clip.complete_write().unwrap();

    assert_eq!(clip.edit_units_written(), 100);

    // material package timeline sequence runs 100 frames at 25/1
    let hm = clip.header_metadata();
    let material = hm.package(clip.material_package_id().unwrap()).unwrap();
    let mut found_picture_track = false;
    for &track_id in &material.tracks {
        let track = hm.track(track_id).unwrap();
        let sequence = hm.sequence(track.sequence.unwrap()).unwrap();
        assert_eq!(sequence.duration, 100);
        if labels::is_picture_ddef(&sequence.data_definition) {
            assert_eq!(track.edit_rate, Rational::FPS_25);
            found_picture_track = true;
        }
    }
    assert!(found_picture_track);

    // CBE index with KL + frame bytes per edit unit
    let bytes = clip.into_inner().into_inner();
    let segments = parse_index_segments(&bytes);
    assert_eq!(segments.len(), 1);
    assert_eq!(u32_item(&segments[0], 0x3F05), 16 + 4 + 144_000);
    assert_eq!(i64_item(&segments[0], 0x3F0D), 100);
}

#[test]
fn test_mpeg2_long_gop_temporal_offsets() {
    // temporal offsets of a coded-order IBBP structure: 2, -1, -1, 2, ...
    let expected: Vec<i8> = (0..13).map(|i| if i % 3 == 0 { 2 } else { -1 }).collect();

    let config = Op1aClipConfig::new(Rational::FPS_25);
    let mut clip = Op1aClip::new(Cursor::new(Vec::new()), config);
    let track = clip
        .add_track(EssenceConfig::new(
            EssenceType::Mpeg2lg422pHl,
            Rational::FPS_25,
        ))
        .unwrap();
    clip.prepare_write().unwrap();

    for position in 0..13i64 {
        let key_frame = position % 12 == 0;
        let flags = if key_frame { 0x80 } else { 0x00 };
        clip.add_index_entry(
            track,
            position,
            IndexEntry::new(0, 0, flags, key_frame),
        )
        .unwrap();

        let frame = vec![0u8; if key_frame { 65_000 } else { 30_000 }];
        clip.write_samples(track, &frame, 1).unwrap();

        // the reordering of a coded picture is known once the next anchor
        // frame arrives
        if position >= 2 {
            let patched = position - 2;
            clip.update_index_entry(track, patched, expected[patched as usize])
                .unwrap();
        }
    }
    // trailing offsets of the final frames
    clip.update_index_entry(track, 11, expected[11]).unwrap();
    clip.update_index_entry(track, 12, expected[12]).unwrap();

    clip.complete_write().unwrap();

    let bytes = clip.into_inner().into_inner();
    let segments = parse_index_segments(&bytes);
    assert_eq!(segments.len(), 1);
    assert_eq!(i64_item(&segments[0], 0x3F0D), 13);

    let entry_array = &segments[0][&0x3F0A];
    let count = u32::from_be_bytes(entry_array[0..4].try_into().unwrap());
    let entry_size = u32::from_be_bytes(entry_array[4..8].try_into().unwrap());
    assert_eq!(count, 13);
    assert_eq!(entry_size, 11);

    let offsets: Vec<i8> = (0..13)
        .map(|i| entry_array[8 + i * entry_size as usize] as i8)
        .collect();
    assert_eq!(offsets, expected);
}

#[test]
fn test_video_and_audio_interleave() {
    let config = Op1aClipConfig::new(Rational::FPS_25);
    let mut clip = Op1aClip::new(Cursor::new(Vec::new()), config);

    // audio registered first: element order still puts the picture first
    let audio = clip.add_track(EssenceConfig::pcm(1, 16)).unwrap();
    let video = clip
        .add_track(EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25))
        .unwrap();
    clip.prepare_write().unwrap();

    let frame = vec![0u8; 144_000];
    let audio_block = vec![0u8; 1920 * 2];
    for _ in 0..5 {
        clip.write_samples(audio, &audio_block, 1920).unwrap();
        clip.write_samples(video, &frame, 1).unwrap();
    }
    clip.complete_write().unwrap();

    assert_eq!(clip.edit_units_written(), 5);

    let hm = clip.header_metadata();
    let file_package = hm.package(clip.file_package_id().unwrap()).unwrap();

    // audio track runs at 48 kHz with 5 frames worth of samples
    let mut audio_checked = false;
    for &track_set in &file_package.tracks {
        let track = hm.track(track_set).unwrap();
        if track.track_id == 2001 {
            assert_eq!(track.edit_rate, Rational::SR_48K);
            let sequence = hm.sequence(track.sequence.unwrap()).unwrap();
            assert_eq!(sequence.duration, 5 * 1920);
            audio_checked = true;
        }
    }
    assert!(audio_checked);

    // multiple descriptor wraps one sub-descriptor per stream
    let descriptor_id = file_package.descriptor.unwrap();
    match hm.descriptor(descriptor_id).unwrap() {
        mxfwrite_format::metadata::Descriptor::Multiple(multiple) => {
            assert_eq!(multiple.sub_descriptors.len(), 2);
        }
        other => panic!("expected a multiple descriptor, got {:?}", other),
    }

    // the first essence KLV after the body partition is the picture element
    let bytes = clip.into_inner().into_inner();
    let body_offset = clip_body_offset(&bytes);
    assert_eq!(bytes[body_offset + 12], 0x18);
}

/// Offset of the first KLV after the essence body partition pack.
fn clip_body_offset(bytes: &[u8]) -> usize {
    let mut pos = 0;
    while pos + 16 <= bytes.len() {
        // body partition pack key with body SID set
        if bytes[pos..pos + 13]
            == [0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01]
            && bytes[pos + 13] == 0x03
        {
            let (length, llen) = parse_ber(bytes, pos + 16);
            let value_start = pos + 16 + llen;
            let body_sid = u32::from_be_bytes(
                bytes[value_start + 60..value_start + 64].try_into().unwrap(),
            );
            if body_sid != 0 {
                return value_start + length as usize;
            }
            pos = value_start + length as usize;
        } else {
            pos += 1;
        }
    }
    panic!("no essence body partition found");
}
