//! Unit tests exercising `Core` end to end: instruction programs are
//! assembled into RAM and stepped through the real pipeline, with
//! assertions against committed register/state and `Statistics`.

mod alu;
mod branch;
mod cache_config;
mod decode_property;
mod traps;
