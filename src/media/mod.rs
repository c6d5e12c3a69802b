//! Media composition primitives used by dub assembly (spec §4.1 C1 / §4.8 C8):
//! ffmpeg filtergraph construction and final audio/video muxing.

pub mod filtergraph;
pub mod mux;

pub use filtergraph::{atempo_filter_chain, build_mix_filtergraph, ClipPlacement};
pub use mux::{mux_audio_onto_video, render_mixed_audio};
