//! Audio helper tests
//!
//! Exercises sample conversion without requiring audio hardware

use std::io::Cursor;

use aural::audio::{SAMPLE_RATE, rms, samples_to_wav};

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

#[test]
fn test_samples_to_wav_header() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // WAV should have reasonable size
    assert!(wav_data.len() > 44); // WAV header is 44 bytes
}

#[test]
fn test_wav_roundtrip() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    // Read WAV back
    let cursor = Cursor::new(wav_data);
    let mut reader = hound::WavReader::new(cursor).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    // Read samples back
    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples.len(), original_samples.len());
    assert_eq!(read_samples[0], 0);
    assert_eq!(read_samples[3], 32767);
    assert_eq!(read_samples[4], -32767);
}

#[test]
fn test_wav_clamps_out_of_range_samples() {
    let wav_data = samples_to_wav(&[2.0, -2.0], SAMPLE_RATE).unwrap();

    let cursor = Cursor::new(wav_data);
    let mut reader = hound::WavReader::new(cursor).unwrap();
    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();

    assert_eq!(read_samples, vec![32767, -32768]);
}

#[test]
fn test_empty_samples_make_a_valid_wav() {
    let wav_data = samples_to_wav(&[], SAMPLE_RATE).unwrap();

    let cursor = Cursor::new(wav_data);
    let reader = hound::WavReader::new(cursor).unwrap();
    assert_eq!(reader.len(), 0);
}

#[test]
fn test_rms_of_silence_is_zero() {
    assert_eq!(rms(&generate_silence(0.1)), 0.0);
    assert_eq!(rms(&[]), 0.0);
}

#[test]
fn test_rms_tracks_amplitude() {
    // RMS of a sine wave is amplitude over sqrt(2)
    let quiet = rms(&generate_sine_samples(440.0, 0.5, 0.1));
    let loud = rms(&generate_sine_samples(440.0, 0.5, 0.8));

    assert!((quiet - 0.1 / std::f32::consts::SQRT_2).abs() < 0.01);
    assert!((loud - 0.8 / std::f32::consts::SQRT_2).abs() < 0.01);
    assert!(loud > quiet);
}
