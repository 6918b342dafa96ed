//! Thin wrappers around the `ffmpeg` and `ffprobe` executables.
//!
//! Frames cross the process boundary as packed `rgb24` over stdin/stdout, so no
//! native libav bindings are needed.

use std::{
    ffi::OsString,
    io::{self, Read, Write},
    path::Path,
    process::{Child, ChildStdin, Command, Stdio},
};

use image::RgbImage;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DepthVideoError, Result};

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f32>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

fn spawn_error(tool: &str, err: io::Error) -> DepthVideoError {
    if err.kind() == io::ErrorKind::NotFound {
        DepthVideoError::Media(format!("`{tool}` executable not found on PATH"))
    } else {
        DepthVideoError::Media(format!("failed to launch `{tool}`: {err}"))
    }
}

/// Parses an ffprobe rational such as `30000/1001`. `0/0` means unknown.
pub(crate) fn parse_frame_rate(raw: &str) -> Option<f32> {
    let (num, den) = match raw.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (raw.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some((num / den) as f32)
}

pub fn probe(path: &Path) -> Result<VideoInfo> {
    let output = Command::new(FFPROBE)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|err| spawn_error(FFPROBE, err))?;

    if !output.status.success() {
        return Err(DepthVideoError::Media(format!(
            "ffprobe failed on `{}`: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|err| DepthVideoError::Media(format!("unreadable ffprobe output: {err}")))?;
    let stream = parsed.streams.into_iter().next().ok_or_else(|| {
        DepthVideoError::InvalidInput(format!("`{}` has no video stream", path.display()))
    })?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(DepthVideoError::InvalidInput(format!(
            "`{}` reports no frame size",
            path.display()
        )));
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate));

    Ok(VideoInfo { width, height, fps })
}

/// Fills `buf` from `reader`. Returns `false` on a clean end of stream.
fn read_frame(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated raw video frame",
                ));
            }
            Ok(read) => filled += read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}

/// Decoder arguments. Rotation metadata is ignored so frames keep the probed
/// `width x height` layout.
fn decode_args(path: &Path, max_frames: Option<usize>) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(
        ["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24"]
            .into_iter()
            .map(OsString::from),
    );
    if let Some(limit) = max_frames {
        args.push("-frames:v".into());
        args.push(limit.to_string().into());
    }
    args.push("pipe:1".into());
    args
}

/// Decodes up to `max_frames` frames of the first video stream as RGB.
pub fn decode_frames(
    path: &Path,
    info: &VideoInfo,
    max_frames: Option<usize>,
) -> Result<Vec<RgbImage>> {
    let mut command = Command::new(FFMPEG);
    command
        .args(decode_args(path, max_frames))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(path = %path.display(), ?max_frames, "spawning ffmpeg decoder");
    let mut child = command.spawn().map_err(|err| spawn_error(FFMPEG, err))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| DepthVideoError::Media("ffmpeg stdout unavailable".to_string()))?;

    let frame_len = info.width as usize * info.height as usize * 3;
    let mut frames = Vec::new();
    let mut buf = vec![0u8; frame_len];

    loop {
        if max_frames.is_some_and(|limit| frames.len() >= limit) {
            break;
        }
        match read_frame(&mut stdout, &mut buf) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DepthVideoError::io(path, err));
            }
        }
        let frame = RgbImage::from_raw(info.width, info.height, buf.clone()).ok_or_else(|| {
            DepthVideoError::Media("decoded frame does not match probed size".to_string())
        })?;
        frames.push(frame);
    }

    drop(stdout);
    finish_child(FFMPEG, child)?;
    Ok(frames)
}

fn finish_child(tool: &str, child: Child) -> Result<()> {
    let output = child
        .wait_with_output()
        .map_err(|err| DepthVideoError::Media(format!("failed to wait for `{tool}`: {err}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(DepthVideoError::Media(format!(
            "`{tool}` exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Streams RGB frames into an H.264 MP4 file.
pub struct VideoEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
}

impl VideoEncoder {
    pub fn spawn(path: &Path, width: u32, height: u32, fps: f32) -> Result<Self> {
        if width % 2 != 0 || height % 2 != 0 {
            return Err(DepthVideoError::InvalidInput(format!(
                "yuv420p output needs even dimensions, got {width}x{height}"
            )));
        }

        let mut child = Command::new(FFMPEG)
            .args(["-v", "error", "-y", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s"])
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(format!("{fps}"))
            .args([
                "-i",
                "pipe:0",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
                "-f",
                "mp4",
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(FFMPEG, err))?;

        let stdin = child.stdin.take();
        Ok(Self {
            child: Some(child),
            stdin,
            width,
            height,
        })
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(DepthVideoError::InvalidInput(format!(
                "frame {}x{} does not match encoder size {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DepthVideoError::Media("encoder already finished".to_string()))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|err| DepthVideoError::Media(format!("ffmpeg encoder pipe closed: {err}")))
    }

    pub fn finish(mut self) -> Result<()> {
        drop(self.stdin.take());
        let child = self
            .child
            .take()
            .ok_or_else(|| DepthVideoError::Media("encoder already finished".to_string()))?;
        finish_child(FFMPEG, child)
    }
}

impl Drop for VideoEncoder {
    // An encoder dropped before `finish` is aborted, not flushed.
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            drop(self.stdin.take());
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
