//! Argument construction for the external muxer.
//!
//! Pure functions only: nothing here touches the filesystem or spawns a
//! process, so the filter graph can be checked token by token.

use std::path::Path;

use crate::models::config::MuxSettings;

/// Audio filter chain: resample with drift compensation and a zeroed first
/// timestamp, then band-pass between the configured edges.
pub fn audio_filter_chain(policy: &MuxSettings) -> String {
    format!(
        "aresample={}:async=1000:min_hard_comp=0.100:first_pts=0,highpass=f={},lowpass=f={}",
        policy.sample_rate, policy.highpass_hz, policy.lowpass_hz
    )
}

/// Arguments muxing `video` (stream-copied) with `audio` (re-encoded) into
/// `output`, trimmed to the shorter stream.
pub fn build_mux_args(video: &Path, audio: &Path, output: &Path, policy: &MuxSettings) -> Vec<String> {
    let queue = policy.thread_queue_size.to_string();
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-thread_queue_size".into(),
        queue.clone(),
        "-i".into(),
        path_arg(video),
        "-thread_queue_size".into(),
        queue,
        "-i".into(),
        path_arg(audio),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
    ];
    push_audio_encoding(&mut args, policy);
    args.push("-shortest".into());
    push_container_flags(&mut args, output, policy);
    args.push(path_arg(output));
    args
}

/// Arguments encoding `audio` alone into `output`.
pub fn build_audio_only_args(audio: &Path, output: &Path, policy: &MuxSettings) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-i".into(),
        path_arg(audio),
        "-vn".into(),
    ];
    push_audio_encoding(&mut args, policy);
    push_container_flags(&mut args, output, policy);
    args.push(path_arg(output));
    args
}

fn push_audio_encoding(args: &mut Vec<String>, policy: &MuxSettings) {
    args.extend([
        "-c:a".into(),
        policy.audio_codec.clone(),
        "-b:a".into(),
        policy.audio_bitrate.clone(),
        "-ar".into(),
        policy.sample_rate.to_string(),
        "-ac".into(),
        policy.channels.to_string(),
        "-af".into(),
        audio_filter_chain(policy),
    ]);
}

fn push_container_flags(args: &mut Vec<String>, output: &Path, policy: &MuxSettings) {
    if policy.faststart && is_isobmff(output) {
        args.push("-movflags".into());
        args.push("+faststart".into());
    }
}

fn is_isobmff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "mp4" | "mov" | "m4a"))
        .unwrap_or(false)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
