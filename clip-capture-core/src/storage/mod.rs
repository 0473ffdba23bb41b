pub mod ffmpeg_sink;
pub mod metadata;
pub mod wav_writer;
