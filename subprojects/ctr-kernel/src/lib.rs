//! # ctr-kernel
//!
//! The kernel-object side of the emulated microkernel: reference-counted kernel objects, the
//! per-process handle tables that name them, and the process/thread aggregates the IPC layer
//! translates between.
//!
//! ## Ownership model
//!
//! ```text
//! ┌──────────────┐  create_process / create_thread / create_*  ┌──────────────────┐
//! │    Kernel    │────────────────────────────────────────────▶│   ObjectArena    │
//! └──────────────┘                                              │ ObjectId → (obj, │
//!        │                                                      │          refs)   │
//!        ▼                                                      └──────────────────┘
//! ┌──────────────┐   owns    ┌──────────────┐  ObjectRef            ▲
//! │   Process    │──────────▶│ HandleTable  │───────────────────────┘
//! │ (pid, memory)│           │ Handle → ref │
//! └──────────────┘           └──────────────┘
//! ```
//!
//! Handle tables hold [`ObjectRef`]s (an arena id plus one counted reference); objects are
//! destroyed when the last reference is dropped.
//!
//! ## References
//! - [3dbrew: Kernel objects](https://www.3dbrew.org/wiki/KObject)
//! - [3dbrew: Handles](https://www.3dbrew.org/wiki/Handles)

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arena;
pub mod handle;
pub mod handle_table;
pub mod kernel;
pub mod memory;
pub mod object;
pub mod process;
pub mod result;
pub mod thread;

pub use self::{
    arena::{ObjectArena, ObjectRef},
    handle::{Handle, PseudoHandle},
    handle_table::{HandleTable, HandleTableError},
    kernel::Kernel,
    memory::{AddressSpace, MemoryError, VAddr},
    object::{KernelObject, ObjectId, ObjectKind},
    process::Process,
    result::{ResultCode, ToRawResultCode},
    thread::Thread,
};
