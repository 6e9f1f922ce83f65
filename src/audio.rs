use std::io::{Cursor, Read};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tracing::warn;

use crate::error::{Result, TelopError, TimingWarning};

pub fn wav_bytes_duration_seconds(bytes: &[u8]) -> Result<f64> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    Ok(reader_duration(&reader))
}

fn reader_duration<R: Read>(reader: &WavReader<R>) -> f64 {
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    frames / spec.sample_rate as f64
}

/// Joins WAV clips end to end into one WAV carrying the first clip's format.
///
/// Clips already in that format are copied sample for sample. A clip with a
/// different rate or channel count is converted first, so every clip keeps
/// its own duration in the joined track. A different sample encoding is
/// rejected.
pub fn concat_wav(clips: &[Vec<u8>]) -> Result<(Vec<u8>, Vec<TimingWarning>)> {
    let first = clips
        .first()
        .ok_or_else(|| TelopError::input("no audio clips to concatenate"))?;
    if clips.len() == 1 {
        return Ok((first.clone(), Vec::new()));
    }

    let spec = WavReader::new(Cursor::new(first.as_slice()))?.spec();
    let mut warnings = Vec::new();
    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut out, spec)?;
        for (i, clip) in clips.iter().enumerate() {
            let mut reader = WavReader::new(Cursor::new(clip.as_slice()))?;
            let clip_spec = reader.spec();
            if clip_spec.sample_format != spec.sample_format
                || clip_spec.bits_per_sample != spec.bits_per_sample
            {
                return Err(TelopError::input(format!(
                    "audio clip {} is {:?}/{} bit, expected {:?}/{} bit",
                    i + 1,
                    clip_spec.sample_format,
                    clip_spec.bits_per_sample,
                    spec.sample_format,
                    spec.bits_per_sample
                )));
            }
            if clip_spec.sample_rate == spec.sample_rate && clip_spec.channels == spec.channels {
                copy_samples(&mut reader, &mut writer, spec)?;
                continue;
            }

            let w = TimingWarning::WavFormatMismatch {
                clip: i + 1,
                detail: format!(
                    "converted from {} Hz x{} to {} Hz x{}",
                    clip_spec.sample_rate, clip_spec.channels, spec.sample_rate, spec.channels
                ),
            };
            warn!("{}", w);
            warnings.push(w);

            let samples = read_interleaved(&mut reader)?;
            let samples = remix(&samples, clip_spec.channels, spec.channels);
            let samples = resample(&samples, spec.channels, clip_spec.sample_rate, spec.sample_rate);
            write_interleaved(&mut writer, spec, &samples)?;
        }
        writer.finalize()?;
    }
    Ok((out.into_inner(), warnings))
}

fn copy_samples<R, W>(reader: &mut WavReader<R>, writer: &mut WavWriter<W>, spec: WavSpec) -> Result<()>
where
    R: Read,
    W: std::io::Write + std::io::Seek,
{
    match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => {
            for s in reader.samples::<f32>() {
                writer.write_sample(s?)?;
            }
        }
        (SampleFormat::Int, 8) => {
            for s in reader.samples::<i8>() {
                writer.write_sample(s?)?;
            }
        }
        (SampleFormat::Int, 16) => {
            for s in reader.samples::<i16>() {
                writer.write_sample(s?)?;
            }
        }
        (SampleFormat::Int, _) => {
            for s in reader.samples::<i32>() {
                writer.write_sample(s?)?;
            }
        }
    }
    Ok(())
}

/// Samples in their native scale, interleaved.
fn read_interleaved<R: Read>(reader: &mut WavReader<R>) -> Result<Vec<f64>> {
    let samples = match reader.spec().sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => reader
            .samples::<i32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(samples)
}

/// Mono is duplicated across outputs; anything down to mono is averaged.
/// Otherwise output channel `c` takes input channel `c`, or the last one.
fn remix(samples: &[f64], from: u16, to: u16) -> Vec<f64> {
    let (from, to) = (from.max(1) as usize, to.max(1) as usize);
    if from == to {
        return samples.to_vec();
    }
    let mut out = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f64>() / from as f64);
        } else {
            out.extend((0..to).map(|c| frame[c.min(from - 1)]));
        }
    }
    out
}

/// Linear interpolation per channel. The frame count scales with the rate
/// ratio, rounded to the nearest frame.
fn resample(samples: &[f64], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f64> {
    let channels = channels.max(1) as usize;
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let frames = samples.len() / channels;
    let out_frames =
        ((frames as u64 * to_rate as u64 + from_rate as u64 / 2) / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;

    let mut out = Vec::with_capacity(out_frames * channels);
    for j in 0..out_frames {
        let pos = j as f64 * step;
        let i = (pos.floor() as usize).min(frames - 1);
        let next = (i + 1).min(frames - 1);
        let frac = pos - i as f64;
        for c in 0..channels {
            let a = samples[i * channels + c];
            let b = samples[next * channels + c];
            out.push(a + (b - a) * frac);
        }
    }
    out
}

fn write_interleaved<W>(writer: &mut WavWriter<W>, spec: WavSpec, samples: &[f64]) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    match spec.sample_format {
        SampleFormat::Float => {
            for &s in samples {
                writer.write_sample(s as f32)?;
            }
        }
        SampleFormat::Int => {
            let max = ((1i64 << (spec.bits_per_sample.clamp(8, 32) - 1)) - 1) as f64;
            let min = -max - 1.0;
            for &s in samples {
                let v = s.round().clamp(min, max);
                match spec.bits_per_sample {
                    8 => writer.write_sample(v as i8)?,
                    16 => writer.write_sample(v as i16)?,
                    _ => writer.write_sample(v as i32)?,
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn sine_wav(seconds: f64, sample_rate: u32, channels: u16) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut out = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut out, spec).unwrap();
        let frames = (seconds * sample_rate as f64).round() as u32;
        for n in 0..frames {
            let t = n as f64 / sample_rate as f64;
            let v = ((t * 440.0 * std::f64::consts::TAU).sin() * 8000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_comes_from_the_header() {
        let wav = sine_wav(1.2, 24000, 2);
        assert!((wav_bytes_duration_seconds(&wav).unwrap() - 1.2).abs() < 1e-6);
        assert!(wav_bytes_duration_seconds(b"RIFF").is_err());
    }

    #[test]
    fn concatenation_sums_durations() {
        let clips = vec![sine_wav(1.2, 24000, 1), sine_wav(2.0, 24000, 1)];
        let (joined, warnings) = concat_wav(&clips).unwrap();
        assert!(warnings.is_empty());
        assert!((wav_bytes_duration_seconds(&joined).unwrap() - 3.2).abs() < 1e-6);
    }

    fn joined_matches_timeline(clips: &[Vec<u8>]) -> Vec<u8> {
        let timeline: f64 = clips
            .iter()
            .map(|c| wav_bytes_duration_seconds(c).unwrap())
            .sum();
        let (joined, warnings) = concat_wav(clips).unwrap();
        assert_eq!(warnings.len(), 1);
        let joined_duration = wav_bytes_duration_seconds(&joined).unwrap();
        assert!(
            (joined_duration - timeline).abs() < 1e-4,
            "joined {}s, timeline {}s",
            joined_duration,
            timeline
        );
        joined
    }

    #[test]
    fn other_rates_are_resampled_to_the_first_clip() {
        let joined = joined_matches_timeline(&[sine_wav(1.0, 24000, 1), sine_wav(1.0, 48000, 1)]);
        let spec = WavReader::new(Cursor::new(joined.as_slice())).unwrap().spec();
        assert_eq!(spec.sample_rate, 24000);
        assert_eq!(spec.channels, 1);
    }

    #[test]
    fn other_channel_layouts_are_remixed_to_the_first_clip() {
        let joined = joined_matches_timeline(&[sine_wav(1.0, 24000, 1), sine_wav(1.0, 24000, 2)]);
        assert_eq!(WavReader::new(Cursor::new(joined.as_slice())).unwrap().spec().channels, 1);

        let joined = joined_matches_timeline(&[sine_wav(0.5, 48000, 2), sine_wav(1.5, 24000, 1)]);
        let spec = WavReader::new(Cursor::new(joined.as_slice())).unwrap().spec();
        assert_eq!((spec.sample_rate, spec.channels), (48000, 2));
    }

    #[test]
    fn mixed_bit_depths_are_rejected() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut float = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut float, spec).unwrap();
            writer.write_sample(0.0f32).unwrap();
            writer.finalize().unwrap();
        }
        let err = concat_wav(&[sine_wav(0.1, 24000, 1), float.into_inner()]).unwrap_err();
        assert!(matches!(err, TelopError::Input(_)));
    }

    #[test]
    fn remix_averages_down_and_duplicates_up() {
        assert_eq!(remix(&[1.0, 3.0, -2.0, 2.0], 2, 1), vec![2.0, 0.0]);
        assert_eq!(remix(&[5.0, 7.0], 1, 2), vec![5.0, 5.0, 7.0, 7.0]);
    }

    #[test]
    fn empty_clip_list_is_rejected() {
        assert!(concat_wav(&[]).is_err());
    }
}
