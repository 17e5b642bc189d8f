//! Purpose: Schema-driven decoder for the Skiff binary row-streaming format.
//! Exports: `api` (schema model, format, decoder, scan capability, errors), `impl_scan_row!`.
//! Role: Library backing the `skiff` CLI and embedding applications.
//! Invariants: Decoding is pull-based, single-threaded and never surfaces a partial row.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
mod core;
