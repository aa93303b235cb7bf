//! opsbot - chat ops bot for cloud VMs and release rotations
//!
//! Messages are parsed into a registered command plus `--key=value`
//! parameters, then dispatched to handlers over pluggable cloud and
//! rota backends. The console front end is in `main.rs`.

pub mod cloud;
pub mod commands;
pub mod config;
pub mod display;
pub mod interp;
pub mod ops;
pub mod params;
pub mod paths;
pub mod registry;
pub mod rota;
pub mod state;
