//! End-to-end AS-02 bundle tests.

use mxfwrite_core::Rational;
use mxfwrite_as02::{As02Bundle, As02Clip, FileRole, MicScope, MicType};
use mxfwrite_format::{EssenceConfig, EssenceType};
use md5::Digest;
use tempfile::tempdir;

#[test]
fn test_bundle_one_picture_two_sound() {
    let dir = tempdir().unwrap();
    let bundle = As02Bundle::open_new(dir.path().join("newsitem"), true).unwrap();
    let mut clip = As02Clip::new(bundle, Rational::FPS_25);

    let video = clip
        .create_track(EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25))
        .unwrap();
    let audio_left = clip.create_track(EssenceConfig::pcm(1, 16)).unwrap();
    let audio_right = clip.create_track(EssenceConfig::pcm(1, 16)).unwrap();

    clip.track_mut(audio_left)
        .unwrap()
        .set_mic_type(MicType::Md5);
    clip.track_mut(audio_left)
        .unwrap()
        .set_mic_scope(MicScope::EssenceOnly);

    clip.prepare_write().unwrap();

    let frame = vec![0u8; 144_000];
    let audio_block = vec![0x5Au8; 1920 * 2];
    for _ in 0..25 {
        clip.write_samples(video, &frame, 1).unwrap();
        clip.write_samples(audio_left, &audio_block, 1920).unwrap();
        clip.write_samples(audio_right, &audio_block, 1920).unwrap();
    }
    clip.complete_write().unwrap();
    clip.finalize_bundle().unwrap();

    // on-disk layout
    let root = clip.bundle().root().to_path_buf();
    assert!(root.join("manifest.xml").is_file());
    assert!(root.join("shim.xml").is_file());
    assert!(root.join("newsitem.mxf").is_file());
    assert!(root.join("media/newsitem_v0.mxf").is_file());
    assert!(root.join("media/newsitem_a0.mxf").is_file());
    assert!(root.join("media/newsitem_a1.mxf").is_file());

    // manifest roles and ids
    let manifest = &clip.bundle().manifest;
    let primary = manifest.find("newsitem.mxf").unwrap();
    assert_eq!(primary.role, FileRole::PrimaryVersion);
    assert!(primary.id.is_some());

    for (uri, track_index) in [
        ("media/newsitem_v0.mxf", video),
        ("media/newsitem_a0.mxf", audio_left),
        ("media/newsitem_a1.mxf", audio_right),
    ] {
        let entry = manifest.find(uri).unwrap();
        assert_eq!(entry.role, FileRole::EssenceComponent);
        assert_eq!(
            entry.id.unwrap(),
            clip.track(track_index).unwrap().file_package_uid()
        );
        assert!(entry.size > 0);
    }

    assert!(manifest.find("shim.xml").is_some());
    assert!(manifest.find("manifest.xml").is_some());

    // essence-only MD5 covers exactly the written sample bytes
    let mut expected = md5::Md5::new();
    for _ in 0..25 {
        expected.update(&audio_block);
    }
    let expected: String = expected
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();
    let entry = manifest.find("media/newsitem_a0.mxf").unwrap();
    assert_eq!(entry.mic.as_deref(), Some(expected.as_str()));

    // component files start with a closed complete header partition key
    let bytes = std::fs::read(root.join("media/newsitem_a0.mxf")).unwrap();
    assert_eq!(&bytes[0..4], &[0x06, 0x0E, 0x2B, 0x34]);
    assert_eq!(bytes[13], 0x02);
    assert_eq!(bytes[14], 0x04);

    assert_eq!(clip.duration(), 25);
}

#[test]
fn test_entire_file_mic_computed_at_finalize() {
    let dir = tempdir().unwrap();
    let bundle = As02Bundle::open_new(dir.path().join("pkg"), true).unwrap();
    let mut clip = As02Clip::new(bundle, Rational::FPS_25);

    let audio = clip.create_track(EssenceConfig::pcm(1, 16)).unwrap();
    clip.track_mut(audio).unwrap().set_mic_type(MicType::Sha1);
    clip.track_mut(audio)
        .unwrap()
        .set_mic_scope(MicScope::EntireFile);

    clip.prepare_write().unwrap();
    clip.write_samples(audio, &[0u8; 9600], 4800).unwrap();
    clip.complete_write().unwrap();
    clip.finalize_bundle().unwrap();

    // the digest covers the finished file, computed by re-reading it
    let entry = clip.bundle().manifest.find("media/pkg_a0.mxf").unwrap();
    let mic = entry.mic.as_deref().unwrap();
    assert_eq!(mic.len(), 40);

    let bytes = std::fs::read(clip.bundle().root().join("media/pkg_a0.mxf")).unwrap();
    let mut hasher = sha1::Sha1::new();
    hasher.update(&bytes);
    let expected: String = hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect();
    assert_eq!(mic, expected);
}

#[test]
fn test_track_count_and_create_after_prepare_rejected() {
    let dir = tempdir().unwrap();
    let bundle = As02Bundle::open_new(dir.path().join("pkg2"), true).unwrap();
    let mut clip = As02Clip::new(bundle, Rational::FPS_25);

    clip.create_track(EssenceConfig::pcm(1, 16)).unwrap();
    assert_eq!(clip.track_count(), 1);
    clip.prepare_write().unwrap();

    assert!(clip.create_track(EssenceConfig::pcm(1, 16)).is_err());
}
