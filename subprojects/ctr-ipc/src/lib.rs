//! # ctr-ipc
//!
//! The IPC marshalling layer of the emulated kernel: the command buffer layout, the descriptor
//! encoding, the translator that moves a command between two processes, and the parser/builder
//! pair service handlers use to read requests and write replies.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Service handlers           │  RequestParser / RequestBuilder
//! ├─────────────────────────────┤
//! │  Command buffer             │  Header + normal words + translate region
//! ├─────────────────────────────┤
//! │  Translator                 │  Handle transfer, CallingPid, buffer pass-through
//! ├─────────────────────────────┤
//! │  ctr-kernel                 │  Handle tables, objects, process memory
//! └─────────────────────────────┘
//! ```
//!
//! A round trip is driven by [`send_sync_request`]: the client's buffer is translated into the
//! server thread, the handler runs on the server's buffer, and the reply is translated back.
//!
//! # References
//!
//! - [3dbrew: IPC](https://www.3dbrew.org/wiki/IPC)

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod builder;
pub mod command_buffer;
pub mod descriptor;
pub mod header;
pub mod param;
pub mod parser;
pub mod request;
pub mod translate;

pub use self::{
    builder::RequestBuilder,
    command_buffer::{COMMAND_BUFFER_LENGTH, CommandBuffer},
    descriptor::{
        Descriptor, MappedBuffer, MappedBufferPermission, StaticBuffer, UnsupportedDescriptor,
    },
    header::Header,
    param::CommandParam,
    parser::RequestParser,
    request::{RequestContext, SyncRequestHandler, send_sync_request},
    translate::{TranslateError, translate},
};
