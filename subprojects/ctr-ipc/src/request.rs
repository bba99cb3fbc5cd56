//! Synchronous request round trip.
//!
//! ```text
//! client cmdbuf ──translate──▶ server cmdbuf ──▶ handler ──▶ server cmdbuf ──translate──▶ client cmdbuf
//! ```
//!
//! The reply takes the same translation path as the request, so handles and `CallingPid` slots
//! in a reply are rewritten from the server's point of view.

use alloc::sync::Arc;

use ctr_kernel::{process::Process, thread::Thread};

use crate::{
    command_buffer::CommandBuffer,
    translate::{TranslateError, translate},
};

/// The threads taking part in a request.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// The thread that sent the request.
    pub caller: &'a Thread,
    /// The thread servicing the request.
    pub server: &'a Thread,
}

impl RequestContext<'_> {
    /// Process of the calling thread. Mapped buffers refer to its address space.
    #[inline]
    pub fn caller_process(&self) -> &Arc<Process> {
        self.caller.owner_process()
    }

    #[inline]
    pub fn server_process(&self) -> &Arc<Process> {
        self.server.owner_process()
    }
}

/// A service command dispatcher.
///
/// The handler receives the server thread's command buffer holding the translated request and
/// replaces it with the reply, using [`RequestParser`](crate::RequestParser) and
/// [`RequestBuilder`](crate::RequestBuilder) only.
pub trait SyncRequestHandler {
    fn handle_sync_request(&mut self, ctx: &RequestContext<'_>, buf: &mut CommandBuffer);
}

impl<F> SyncRequestHandler for F
where
    F: FnMut(&RequestContext<'_>, &mut CommandBuffer),
{
    fn handle_sync_request(&mut self, ctx: &RequestContext<'_>, buf: &mut CommandBuffer) {
        self(ctx, buf)
    }
}

/// Sends the request in `client`'s command buffer to `server` and delivers the reply.
///
/// # Errors
///
/// Fails if either translation pass fails. A failing request translation returns before the
/// handler runs; a failing reply translation leaves the client's command buffer unchanged.
pub fn send_sync_request<H>(
    client: &Thread,
    server: &Thread,
    handler: &mut H,
) -> Result<(), TranslateError>
where
    H: SyncRequestHandler + ?Sized,
{
    translate(
        client,
        server,
        client.command_buffer_address(),
        server.command_buffer_address(),
    )?;

    let mut buf = CommandBuffer::read_from(server)?;
    log::debug!(
        "Thread {} -> thread {}: command {:#06X}",
        client.thread_id(),
        server.thread_id(),
        buf.header().command_id()
    );

    let ctx = RequestContext {
        caller: client,
        server,
    };
    handler.handle_sync_request(&ctx, &mut buf);
    buf.write_to(server)?;

    translate(
        server,
        client,
        server.command_buffer_address(),
        client.command_buffer_address(),
    )
}
