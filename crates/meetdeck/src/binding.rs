use crossbeam_channel::Sender;
use hubsock::{HubConnection, HubEvent, HubEventKind, HubTransport, ListenerId};
use tracing::trace;

use crate::NotificationStore;

/// Hub listeners that forward pushed events to a [`NotificationStore`].
///
/// Events are queued and applied on the store's next `poll`. Once the store
/// is gone, sends fail and the event is dropped.
#[derive(Debug)]
pub struct HubBinding {
    listeners: Vec<ListenerId>,
}

impl HubBinding {
    pub fn attach<T: HubTransport>(hub: &mut HubConnection<T>, store: &mut NotificationStore) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        store.set_event_source(Some(rx));

        let listeners = HubEventKind::ALL
            .iter()
            .map(|kind| hub.on(*kind, forward(tx.clone())))
            .collect();

        Self { listeners }
    }

    pub fn detach<T: HubTransport>(self, hub: &mut HubConnection<T>) {
        for id in self.listeners {
            hub.off(id);
        }
    }
}

fn forward(tx: Sender<HubEvent>) -> impl FnMut(&HubEvent) + 'static {
    move |ev| {
        if tx.send(ev.clone()).is_err() {
            trace!("store gone, dropping {:?}", ev.kind());
        }
    }
}
