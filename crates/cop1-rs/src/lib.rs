#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' is used for dynamic allocation (frame payloads, queues, effect lists)
extern crate alloc;

// --- Foundation Modules ---
pub mod types;
pub mod hal;
pub mod codec;

// --- Wire Words and Frames ---
pub mod clcw;
pub mod frame;

// --- FOP-1 Procedures ---
pub mod config;
pub mod fop;

// --- Top-level Exports ---
pub use clcw::{Clcw, CopInEffect};
pub use codec::Codec;
pub use config::{FopConfig, TimeoutType};
pub use fop::{AlertCode, FopOutput, TransferStatus};
pub use fop::directives::{DirectiveTag, FopDirective};
pub use fop::machine::FopMachine;
pub use fop::states::FopState;
pub use frame::TcTransferFrame;
pub use hal::{Cop1Error, FopObserver, FrameSink, FramerBackchannel};
pub use types::{FrameType, SequenceNumber, VcId};
