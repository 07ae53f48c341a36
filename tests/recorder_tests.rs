// Integration tests for call recording
//
// These verify that captured frames are split into time-based chunks and
// saved to disk as WAV files.

use clinic_console::audio::{AudioFrame, CallRecorder, RecorderConfig};
use tempfile::TempDir;

fn frame_at(timestamp_ms: u64, samples: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![0i16; samples],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms,
    }
}

#[test]
fn test_recording_creates_single_chunk() {
    let temp_dir = TempDir::new().unwrap();

    let config = RecorderConfig {
        chunk_duration_secs: 10,
        output_dir: temp_dir.path().to_path_buf(),
        call_id: "test-call".to_string(),
    };

    let mut recorder = CallRecorder::new(config).unwrap();

    // 5 seconds of audio in 100ms frames: fits in one 10s chunk.
    for i in 0..50u64 {
        recorder.write_frame(&frame_at(i * 100, 1600)).unwrap();
    }

    let chunks = recorder.finish().unwrap();

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].sample_count, 50 * 1600);
    assert!(chunks[0].file_path.exists());
    assert!(chunks[0]
        .file_path
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("test-call-chunk-000"));
}

#[test]
fn test_recording_rotates_chunks() {
    let temp_dir = TempDir::new().unwrap();

    let config = RecorderConfig {
        chunk_duration_secs: 1,
        output_dir: temp_dir.path().to_path_buf(),
        call_id: "rotating".to_string(),
    };

    let mut recorder = CallRecorder::new(config).unwrap();

    // 2.5 seconds in 100ms frames with 1s chunks: expect 3 files.
    for i in 0..25u64 {
        recorder.write_frame(&frame_at(i * 100, 1600)).unwrap();
    }

    let chunks = recorder.finish().unwrap();

    assert_eq!(chunks.len(), 3);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i);
        assert!(chunk.file_path.exists());
        assert_eq!(chunk.sample_rate, 16000);
        assert_eq!(chunk.channels, 1);
    }

    // Chunks cover contiguous, non-overlapping time ranges.
    assert!(chunks[0].end_ms <= chunks[1].start_ms);
    assert!(chunks[1].end_ms <= chunks[2].start_ms);
}

#[test]
fn test_chunks_are_valid_wav_files() {
    let temp_dir = TempDir::new().unwrap();

    let config = RecorderConfig {
        chunk_duration_secs: 10,
        output_dir: temp_dir.path().to_path_buf(),
        call_id: "wav-check".to_string(),
    };

    let mut recorder = CallRecorder::new(config).unwrap();
    recorder.write_frame(&frame_at(0, 1600)).unwrap();
    recorder.write_frame(&frame_at(100, 1600)).unwrap();
    let chunks = recorder.finish().unwrap();

    let reader = hound::WavReader::open(&chunks[0].file_path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 16000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len(), 3200);
}

#[test]
fn test_finish_without_frames_yields_no_chunks() {
    let temp_dir = TempDir::new().unwrap();

    let recorder = CallRecorder::new(RecorderConfig::new(
        "empty".to_string(),
        temp_dir.path().to_path_buf(),
    ))
    .unwrap();

    let chunks = recorder.finish().unwrap();
    assert!(chunks.is_empty());
}
