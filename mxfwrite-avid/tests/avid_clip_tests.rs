//! End-to-end Avid clip tests.

use mxfwrite_avid::{AvidClip, AvidLocator, AvidRgbColor};
use mxfwrite_core::{Rational, Timecode};
use mxfwrite_format::metadata::MetadataSet;
use mxfwrite_format::ul::labels;
use mxfwrite_format::{EssenceConfig, EssenceType, MxfError};
use tempfile::tempdir;

fn prefix(dir: &tempfile::TempDir) -> String {
    dir.path().join("clip").to_str().unwrap().to_string()
}

#[test]
fn test_tape_source_with_offset_timecode() {
    let dir = tempdir().unwrap();
    let mut clip = AvidClip::new(Rational::FPS_25, prefix(&dir)).unwrap();
    clip.set_clip_name("offset clip");

    // tape starts at 01:00:00:00, the clip at 01:00:05:00
    let tape = clip.create_default_tape_source("tape01", 1, 1);
    clip.set_source_start_timecode(
        &tape,
        Timecode::from_components(25, false, 1, 0, 0, 0).unwrap(),
    )
    .unwrap();
    clip.set_start_timecode(Timecode::from_components(25, false, 1, 0, 5, 0).unwrap());

    let video = clip
        .create_track(EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25))
        .unwrap();
    let audio = clip.create_track(EssenceConfig::pcm(1, 16)).unwrap();

    let video_refs = clip.picture_source_references(&tape);
    let audio_refs = clip.sound_source_references(&tape);
    assert_eq!(video_refs.len(), 1);
    assert_eq!(audio_refs.len(), 1);
    assert_eq!(video_refs[0].1, 1);
    assert_eq!(audio_refs[0].1, 2);

    clip.track_mut(video)
        .unwrap()
        .set_source_ref(video_refs[0].0, video_refs[0].1);
    clip.track_mut(audio)
        .unwrap()
        .set_source_ref(audio_refs[0].0, audio_refs[0].1);

    clip.prepare_write().unwrap();

    let frame = vec![0u8; 144_000];
    let audio_block = vec![0u8; 1920 * 2];
    for _ in 0..25 {
        clip.write_samples(video, &frame, 1).unwrap();
        clip.write_samples(audio, &audio_block, 1920).unwrap();
    }
    clip.complete_write().unwrap();

    // video file source package: 5 seconds at 25 fps after the tape start
    let track = clip.track(video).unwrap();
    let hm = track.header_metadata().unwrap();
    let file_package = hm.package(track.file_source_package_id().unwrap()).unwrap();
    let mut checked = false;
    for &track_set in &file_package.tracks {
        let timeline = hm.track(track_set).unwrap();
        let sequence = hm.sequence(timeline.sequence.unwrap()).unwrap();
        if !labels::is_picture_ddef(&sequence.data_definition) {
            continue;
        }
        let clip_ref = hm.source_clip(sequence.components[0]).unwrap();
        assert_eq!(clip_ref.start_position, 125);
        assert_eq!(clip_ref.duration, 25);
        checked = true;
    }
    assert!(checked);

    // audio file source package: the same offset at 48 kHz
    let track = clip.track(audio).unwrap();
    let hm = track.header_metadata().unwrap();
    let file_package = hm.package(track.file_source_package_id().unwrap()).unwrap();
    let mut checked = false;
    for &track_set in &file_package.tracks {
        let timeline = hm.track(track_set).unwrap();
        let sequence = hm.sequence(timeline.sequence.unwrap()).unwrap();
        if !labels::is_sound_ddef(&sequence.data_definition) {
            continue;
        }
        let clip_ref = hm.source_clip(sequence.components[0]).unwrap();
        assert_eq!(clip_ref.start_position, 125 * 1920);
        checked = true;
    }
    assert!(checked);

    // the per-track files exist with the expected names
    assert!(dir.path().join("clip_v1.mxf").is_file());
    assert!(dir.path().join("clip_a1.mxf").is_file());
    assert_eq!(clip.duration(), 25);
}

#[test]
fn test_locator_overflow_rejected() {
    let dir = tempdir().unwrap();
    let mut clip = AvidClip::new(Rational::FPS_25, prefix(&dir)).unwrap();

    for position in 0..4095 {
        clip.add_locator(AvidLocator {
            position,
            color: AvidRgbColor::Red,
            comment: None,
        })
        .unwrap();
    }
    assert_eq!(clip.locator_count(), 4095);

    let overflow = clip.add_locator(AvidLocator {
        position: 4095,
        color: AvidRgbColor::Red,
        comment: None,
    });
    assert!(matches!(overflow, Err(MxfError::FormatLimit(_))));
    assert_eq!(clip.locator_count(), 4095);
}

#[test]
fn test_locators_and_comments_in_material_package() {
    let dir = tempdir().unwrap();
    let mut clip = AvidClip::new(Rational::FPS_25, prefix(&dir)).unwrap();
    clip.set_project_name("project x");
    clip.set_clip_name("marked clip");
    clip.set_user_comment("Descript", "with markers");
    clip.add_locator(AvidLocator {
        position: 10,
        color: AvidRgbColor::Red,
        comment: Some("first marker".to_string()),
    })
    .unwrap();
    clip.add_locator(AvidLocator {
        position: 20,
        color: AvidRgbColor::Green,
        comment: None,
    })
    .unwrap();

    let video = clip
        .create_track(EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25))
        .unwrap();
    clip.prepare_write().unwrap();
    clip.write_samples(video, &vec![0u8; 144_000], 1).unwrap();
    clip.complete_write().unwrap();

    let track = clip.track(video).unwrap();
    let hm = track.header_metadata().unwrap();
    let material = hm.package(track.material_package_id().unwrap()).unwrap();

    assert_eq!(material.app_code, Some(7));
    assert_eq!(material.convert_frame_rate, Some(false));
    assert_eq!(material.user_comments.len(), 1);
    assert_eq!(material.attributes.len(), 1);

    // the DM event track carries one segment per locator, referencing the
    // picture track
    let mut found_event_track = false;
    for &track_set in &material.tracks {
        let MetadataSet::EventTrack(event_track) = hm.get(track_set) else {
            continue;
        };
        assert_eq!(event_track.track_id, 1000);
        let sequence = hm.sequence(event_track.sequence.unwrap()).unwrap();
        assert_eq!(sequence.components.len(), 2);

        let MetadataSet::DmSegment(first) = hm.get(sequence.components[0]) else {
            panic!("expected a DM segment");
        };
        assert_eq!(first.event_start_position, 10);
        assert_eq!(first.comment.as_deref(), Some("first marker"));
        let color = first.marker_color.unwrap();
        assert_eq!((color.red, color.green, color.blue), (41471, 12134, 6564));
        assert_eq!(first.track_ids, vec![1]);

        found_event_track = true;
    }
    assert!(found_event_track);
}

#[test]
fn test_import_source_durations_set_at_complete() {
    let dir = tempdir().unwrap();
    let mut clip = AvidClip::new(Rational::FPS_25, prefix(&dir)).unwrap();

    let import = clip.create_default_import_source("file:///media/source.mov", "source", 1, 0);
    let refs = clip.picture_source_references(&import);

    let video = clip
        .create_track(EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25))
        .unwrap();
    clip.track_mut(video)
        .unwrap()
        .set_source_ref(refs[0].0, refs[0].1);

    clip.prepare_write().unwrap();
    for _ in 0..10 {
        clip.write_samples(video, &vec![0u8; 144_000], 1).unwrap();
    }
    clip.complete_write().unwrap();

    let track = clip.track(video).unwrap();
    let hm = track.header_metadata().unwrap();
    let import_package_id = hm.find_package_by_umid(&import).unwrap();
    let import_package = hm.package(import_package_id).unwrap();

    // the import track duration followed the written essence
    let timeline = hm.track(import_package.tracks[0]).unwrap();
    let sequence = hm.sequence(timeline.sequence.unwrap()).unwrap();
    assert_eq!(sequence.duration, 10);

    // the import descriptor carries the source URI
    let descriptor_id = import_package.descriptor.unwrap();
    match hm.descriptor(descriptor_id).unwrap() {
        mxfwrite_format::metadata::Descriptor::Import(import_descriptor) => {
            let locator = import_descriptor.locators[0];
            let MetadataSet::NetworkLocator(network) = hm.get(locator) else {
                panic!("expected a network locator");
            };
            assert_eq!(network.url, "file:///media/source.mov");
        }
        other => panic!("expected an import descriptor, got {:?}", other),
    }
}

#[test]
fn test_unsupported_frame_rate_rejected() {
    assert!(AvidClip::new(Rational::new(24, 1), "x").is_err());
    assert!(AvidClip::new(Rational::FPS_2997, "x").is_ok());
}

#[test]
fn test_negative_tape_offset_leaves_start_position_zero() {
    let dir = tempdir().unwrap();
    let mut clip = AvidClip::new(Rational::FPS_25, prefix(&dir)).unwrap();

    // tape starts after the clip: the start position would be negative
    let tape = clip.create_default_tape_source("tape01", 1, 0);
    clip.set_source_start_timecode(
        &tape,
        Timecode::from_components(25, false, 2, 0, 0, 0).unwrap(),
    )
    .unwrap();
    clip.set_start_timecode(Timecode::from_components(25, false, 1, 0, 0, 0).unwrap());

    let video = clip
        .create_track(EssenceConfig::new(EssenceType::IecDv25, Rational::FPS_25))
        .unwrap();
    let refs = clip.picture_source_references(&tape);
    clip.track_mut(video)
        .unwrap()
        .set_source_ref(refs[0].0, refs[0].1);

    clip.prepare_write().unwrap();
    clip.write_samples(video, &vec![0u8; 144_000], 1).unwrap();
    clip.complete_write().unwrap();

    let track = clip.track(video).unwrap();
    let hm = track.header_metadata().unwrap();
    let file_package = hm.package(track.file_source_package_id().unwrap()).unwrap();
    for &track_set in &file_package.tracks {
        let timeline = hm.track(track_set).unwrap();
        let sequence = hm.sequence(timeline.sequence.unwrap()).unwrap();
        if labels::is_picture_ddef(&sequence.data_definition) {
            let clip_ref = hm.source_clip(sequence.components[0]).unwrap();
            assert_eq!(clip_ref.start_position, 0);
        }
    }
}
