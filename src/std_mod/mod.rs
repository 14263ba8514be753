//! Host-provided natives registered into the global table at VM startup
//! (spec.md §6). A real embedding would grow this into a small standard
//! library; today it holds just `clock`.

pub mod time;
