//! `tm-server` — process wiring for the `toolmesh` binary.

pub mod bootstrap;
pub mod cli;
