//! Dedicated-thread hosting for a non-cooperative operator (`5 Concurrency &
//! Resource Model`: "Non-cooperative operators each own a dedicated blocking thread
//! and may block indefinitely"). The loop shape — `select!` between real input and a
//! stop signal, logging and returning on either branch — mirrors how this codebase's
//! dedicated-thread consumers are driven elsewhere.

use weir_channel::{select, Receiver};
use weir_core::context::Context;
use weir_core::inbox::Inbox;
use weir_core::item::Edge;
use weir_core::outbox::Outbox;
use weir_core::processor::Processor;

/// Runs `processor` on the calling thread until `stop_rx` fires or `input_rx` is
/// disconnected, handing every item it emits on ordinal 0 to `output_tx`. Intended to
/// be spawned onto its own `std::thread`; the processor's outbox never refuses an
/// offer (`Outbox::non_cooperative`), so `process` never needs to retry.
pub fn host<P>(
    mut processor: P,
    context: Context,
    input_rx: Receiver<Edge<P::In>>,
    output_tx: weir_channel::Sender<Edge<P::Out>>,
    stop_rx: Receiver<()>,
) where
    P: Processor,
    P::Out: Clone,
{
    let mut outbox = Outbox::non_cooperative(1);
    if let Err(err) = processor.init(&mut outbox, context.clone()) {
        log::error!(target: context.logger.target(), "init failed: {err}");
        return;
    }

    let mut inbox = Inbox::new();
    loop {
        select! {
            recv(input_rx) -> msg => match msg {
                Ok(item) => {
                    inbox.push(item);
                    if let Err(err) = processor.process(0, &mut inbox, &mut outbox) {
                        log::error!(target: context.logger.target(), "process failed: {err}");
                        return;
                    }
                    for item in outbox.drain_ordinal(0) {
                        if output_tx.send(item).is_err() {
                            return;
                        }
                    }
                }
                Err(_) => {
                    log::debug!(target: context.logger.target(), "input channel closed, stopping");
                    return;
                }
            },
            recv(stop_rx) -> _ => {
                log::info!(target: context.logger.target(), "received stop signal, exiting");
                return;
            }
        }
    }
}
