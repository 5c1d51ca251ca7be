//! PCM decoding for audio analysis.

use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::command::{check_ffmpeg, create_ffmpeg_command};
use crate::error::{MediaError, MediaResult};

/// Decode up to `max_secs` of `input` to mono f32 samples at `sample_rate`.
pub async fn decode_mono_pcm(
    input: &Path,
    sample_rate: u32,
    max_secs: Option<f64>,
) -> MediaResult<Vec<f32>> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }
    check_ffmpeg()?;

    let temp_audio = NamedTempFile::new()?;
    extract_pcm(input, temp_audio.path(), sample_rate, max_secs).await?;

    let samples = load_samples(temp_audio.path()).await?;
    if samples.is_empty() {
        return Err(MediaError::NoAudioData(input.to_path_buf()));
    }

    debug!(
        input = %input.display(),
        samples = samples.len(),
        seconds = format!("{:.1}", samples.len() as f64 / sample_rate as f64),
        "Decoded PCM"
    );

    Ok(samples)
}

async fn extract_pcm(
    input: &Path,
    output: &Path,
    sample_rate: u32,
    max_secs: Option<f64>,
) -> MediaResult<()> {
    let mut cmd = create_ffmpeg_command();
    cmd.arg("-i").arg(input);
    if let Some(secs) = max_secs.filter(|s| *s > 0.0) {
        cmd.args(["-t", &format!("{:.3}", secs)]);
    }
    cmd.args([
        "-vn",
        "-ar",
        &sample_rate.to_string(),
        "-ac",
        "1",
        "-f",
        "f32le",
        "-y",
    ])
    .arg(output)
    .stdout(std::process::Stdio::null())
    .stderr(std::process::Stdio::piped());

    let out = cmd.output().await?;
    if !out.status.success() {
        return Err(MediaError::ffmpeg_failed(
            format!("PCM extraction failed for {}", input.display()),
            Some(String::from_utf8_lossy(&out.stderr).to_string()),
            out.status.code(),
        ));
    }

    Ok(())
}

async fn load_samples(path: &Path) -> MediaResult<Vec<f32>> {
    let bytes = tokio::fs::read(path).await?;
    Ok(samples_from_le_bytes(&bytes))
}

/// Convert little-endian f32 bytes to samples; a trailing partial sample is dropped.
fn samples_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_from_le_bytes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        bytes.push(0xff);

        assert_eq!(samples_from_le_bytes(&bytes), vec![0.5, -1.0]);
    }

    #[tokio::test]
    async fn test_missing_input() {
        let result = decode_mono_pcm(Path::new("/nonexistent/track.mp3"), 22050, None).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
