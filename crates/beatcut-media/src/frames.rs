//! Streaming RGB frame decoding through FFmpeg rawvideo output.

use std::path::Path;
use std::process::Stdio;

use image::RgbImage;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout};
use tracing::{debug, warn};

use crate::command::{check_ffmpeg, create_ffmpeg_command};
use crate::error::{MediaError, MediaResult};

/// Reads downscaled RGB24 frames from a video one at a time.
///
/// Frames arrive at the source frame rate, so the n-th frame sits at
/// `n / fps` seconds from the read start.
pub struct FrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    frames_read: usize,
}

impl FrameReader {
    /// Open the whole video.
    pub async fn open(path: &Path, width: u32, height: u32) -> MediaResult<Self> {
        Self::spawn(path, None, width, height).await
    }

    /// Open `[start, start + duration)` seconds of the video.
    pub async fn open_range(
        path: &Path,
        start: f64,
        duration: f64,
        width: u32,
        height: u32,
    ) -> MediaResult<Self> {
        Self::spawn(path, Some((start.max(0.0), duration.max(0.0))), width, height).await
    }

    async fn spawn(
        path: &Path,
        range: Option<(f64, f64)>,
        width: u32,
        height: u32,
    ) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        check_ffmpeg()?;

        if width == 0 || height == 0 {
            return Err(MediaError::invalid_media("frame size must be non-zero"));
        }

        let mut cmd = create_ffmpeg_command();
        if let Some((start, duration)) = range {
            cmd.args(["-ss", &format!("{:.3}", start), "-t", &format!("{:.3}", duration)]);
        }
        cmd.arg("-i")
            .arg(path)
            .args([
                "-an",
                "-sn",
                "-vf",
                &format!("scale={}:{}", width, height),
                "-pix_fmt",
                "rgb24",
                "-f",
                "rawvideo",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        debug!(path = %path.display(), ?range, "Spawning FFmpeg frame decoder");

        let mut child = cmd
            .spawn()
            .map_err(|e| MediaError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            MediaError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None)
        })?;

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            width,
            height,
            frames_read: 0,
        })
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Number of frames returned so far.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Read the next frame, or `None` at end of stream.
    pub async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let mut buf = vec![0u8; self.frame_len()];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        self.frames_read += 1;
        RgbImage::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| MediaError::invalid_media("decoded frame has wrong size"))
    }

    /// Wait for the decoder to exit.
    ///
    /// A failing decoder that produced no frames is an error; a failure after
    /// some frames were read is logged and tolerated.
    pub async fn finish(mut self) -> MediaResult<usize> {
        let status = self.child.wait().await?;
        if !status.success() {
            if self.frames_read == 0 {
                return Err(MediaError::ffmpeg_failed(
                    "FFmpeg could not decode any frames",
                    None,
                    status.code(),
                ));
            }
            warn!(
                frames = self.frames_read,
                code = ?status.code(),
                "FFmpeg frame decoder exited with non-zero status"
            );
        }
        Ok(self.frames_read)
    }

    /// Stop decoding early.
    pub async fn close(mut self) -> MediaResult<usize> {
        if let Err(e) = self.child.kill().await {
            debug!("Frame decoder already exited: {}", e);
        }
        Ok(self.frames_read)
    }
}
