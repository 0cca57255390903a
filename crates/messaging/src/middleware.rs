//! The middleware chain.

use corebus_core::Context;

use crate::error::BusError;
use crate::message::Message;

/// One link of the built chain: call it to run the rest of the chain
/// (middlewares still ahead, then the transport) for this message.
pub type ChainFn<'a> = dyn Fn(&Context, &mut Message) -> Result<(), BusError> + 'a;

/// An interceptor placed in front of the transport.
///
/// A middleware may inspect or mutate the message (including its metadata),
/// short-circuit the chain by returning an error without calling `next`, or
/// forward to the rest of the chain via `next` and then inspect/transform
/// the result. The bus snapshots the registered middleware list at the
/// instant of each `publish` call (see [`crate::MessageBus::publish`]) so a
/// concurrent `use` registration never affects an in-flight publish.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: &Context, message: &mut Message, next: &ChainFn<'_>) -> Result<(), BusError>;
}

/// Fold a middleware snapshot and a terminal function into one callable
/// chain. Snapshot is `[mw1, mw2, ...]` in registration order; the built
/// chain invokes `mw1`, which is responsible for calling `next` to reach
/// `mw2`, and so on, terminating in `tail`.
pub(crate) fn build_chain<'a>(
    middlewares: &[std::sync::Arc<dyn Middleware>],
    tail: Box<ChainFn<'a>>,
) -> Box<ChainFn<'a>> {
    let mut chain = tail;
    for mw in middlewares.iter().rev() {
        let mw = std::sync::Arc::clone(mw);
        let inner = chain;
        chain = Box::new(move |ctx: &Context, msg: &mut Message| mw.handle(ctx, msg, &*inner));
    }
    chain
}
