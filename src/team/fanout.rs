//! Broadcast a run to several subscribers.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{RunItem, RunStream};

/// Forward every item of `stream` to `subscribers` capacity-1 channels.
///
/// Each subscriber sees all items in order. The forwarding task waits on the
/// slowest subscriber before pulling the next item, so the scheduler never
/// runs more than one message ahead of any of them. Dropped subscribers are
/// skipped. Once all are gone, `cancel` (the run's token) is cancelled and
/// the run is drained to its end, so the sandbox is stopped normally.
pub fn fan_out(
    mut stream: RunStream,
    subscribers: usize,
    cancel: CancellationToken,
) -> (Vec<ReceiverStream<RunItem>>, JoinHandle<()>) {
    let (senders, receivers): (Vec<_>, Vec<_>) = (0..subscribers)
        .map(|_| {
            let (tx, rx) = mpsc::channel(1);
            (tx, ReceiverStream::new(rx))
        })
        .unzip();

    let handle = tokio::spawn(async move {
        let mut senders: Vec<mpsc::Sender<RunItem>> = senders;
        if senders.is_empty() {
            cancel.cancel();
        }
        loop {
            // `None` means every subscriber went away while the run was busy.
            let next = if senders.is_empty() {
                Some(stream.next().await)
            } else {
                let abandoned = futures::future::join_all(senders.iter().map(|s| s.closed()));
                tokio::select! {
                    item = stream.next() => Some(item),
                    _ = abandoned => None,
                }
            };

            let item = match next {
                Some(Some(item)) => item,
                Some(None) => break,
                None => {
                    senders.clear();
                    debug!("every subscriber dropped; cancelling the run");
                    cancel.cancel();
                    continue;
                }
            };
            if senders.is_empty() {
                continue;
            }

            let mut open = Vec::with_capacity(senders.len());
            for sender in senders {
                if sender.send(item.clone()).await.is_ok() {
                    open.push(sender);
                }
            }
            senders = open;
            if senders.is_empty() {
                debug!("every subscriber dropped; cancelling the run");
                cancel.cancel();
            }
        }
    });

    (receivers, handle)
}
