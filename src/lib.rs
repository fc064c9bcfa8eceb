// Library root
// -----------
// Client library for the TensorFlow Deploy management service. The `tfd`
// binary (`main.rs`) is a thin clap front end over these modules.
//
// Module responsibilities:
// - `api`: HTTP calls against the service (`Service`) and the
//   identity-bound `Cursor` with one method per remote operation.
// - `identity`: team/project/name/label validation.
// - `archive`, `hash`, `validate`: packing, digesting and checking model
//   and module artifacts before upload.
// - `listing`: decoding list responses into printable tables.
// - `readme`: README.md generation for artifacts.
// - `ui`: confirmation prompts and spinners.
// - `config`: persisted defaults for the CLI.
// - `cli`: argument parsing and command dispatch.
// - `error`: raised errors and returned operation failures.
pub mod api;
pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod identity;
pub mod listing;
pub mod readme;
pub mod ui;
pub mod validate;

pub use api::{Cursor, CursorBuilder, Service};
pub use error::{Error, Failure, FailureKind, Outcome, Result};
pub use identity::Identity;
pub use listing::{ListFilter, Listing};
