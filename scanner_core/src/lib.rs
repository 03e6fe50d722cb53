#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Control engine for GL843-class scanner ASICs (hardware-agnostic).
//!
//! All device access goes through `scanner_traits::Transport`; all waiting
//! goes through `scanner_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Registers**: ordered register sets and the GL843 map (`register`, `gl843`)
//! - **Motion**: acceleration profiles and slope tables (`motor`, `slope`)
//! - **Geometry**: optical window and transfer sizes (`optical`)
//! - **Sessions**: scan parameters to register programming (`session`)
//! - **Calibration**: LED, AFE offset/gain, shading, reference search
//! - **Sequencer**: boot, start/stop, carriage moves, data reads
//!
//! A [`Device`] holds the live register snapshot and per-device state;
//! [`Gl843`] exposes the operations as a [`CommandSet`].

pub mod afe;
pub mod calibration;
pub mod command_set;
pub mod config;
pub mod device;
pub mod error;
pub mod gamma;
pub mod gl843;
pub mod image;
pub mod mocks;
pub mod model;
pub mod motor;
pub mod optical;
pub mod poll;
pub mod register;
pub mod search;
pub mod sensor;
pub mod sequencer;
pub mod session;
pub mod shading;
pub mod slope;
pub mod status;
pub mod transport_error;
pub mod util;

pub use afe::{Frontend, FrontendType};
pub use calibration::CalibrationKind;
pub use command_set::{CommandSet, Gl843};
pub use config::EngineCfg;
pub use device::{Device, ScannerState, StartOffset};
pub use error::{Result, ScanError};
pub use model::ModelDescriptor;
pub use register::{Register, RegisterSet};
pub use session::{ScanFlags, ScanMode, ScanParams, ScanSession, SessionPlan};
