use osdk_wire::{ChangeFeed, ObjectChange};

use std::{
	collections::BTreeSet,
	pin::Pin,
	sync::Arc,
	task::{Context, Poll},
};

use futures::Stream;
use tokio::{
	sync::{broadcast::error::RecvError, mpsc},
	task::JoinHandle,
};
use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectUpdate {
	/// An object of the subscribed type was added, updated or removed.
	Change(ObjectChange),
	/// The subscription fell behind the change feed and `missed` changes were dropped. Cached
	/// state derived from earlier updates should be reloaded.
	OutOfDate { missed: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
	/// Properties kept on changed objects. Empty keeps every property.
	pub properties: Vec<String>,
	/// Overrides the configured subscription buffer.
	pub buffer: Option<usize>,
}

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
	fn drop(&mut self) {
		self.0.abort();
	}
}

/// A stream of updates for one object set. Dropping it stops reading the change feed.
#[derive(Debug)]
pub struct ObjectUpdates {
	rx: mpsc::Receiver<ObjectUpdate>,
	_forwarder: TaskGuard,
}

impl ObjectUpdates {
	pub(crate) fn spawn(
		feed: &Arc<dyn ChangeFeed>,
		object_types: BTreeSet<String>,
		options: SubscribeOptions,
		buffer: usize,
	) -> Self {
		let mut changes = feed.changes();
		let (tx, rx) = mpsc::channel(buffer.max(1));

		let forwarder = tokio::spawn(async move {
			loop {
				let update = match changes.recv().await {
					Ok(mut change) => {
						if !object_types.contains(&change.object_type) {
							continue;
						}
						if !options.properties.is_empty() {
							if let Some(object) = &mut change.object {
								object
									.properties
									.retain(|name, _| options.properties.contains(name));
							}
						}
						ObjectUpdate::Change(change)
					}
					Err(RecvError::Lagged(missed)) => {
						warn!(missed, "subscription lagged behind the change feed");
						ObjectUpdate::OutOfDate { missed }
					}
					Err(RecvError::Closed) => break,
				};

				if tx.send(update).await.is_err() {
					break;
				}
			}

			trace!("subscription forwarder stopped");
		});

		Self {
			rx,
			_forwarder: TaskGuard(forwarder),
		}
	}

	/// The next update, or `None` once the change feed has closed.
	pub async fn recv(&mut self) -> Option<ObjectUpdate> {
		self.rx.recv().await
	}
}

impl Stream for ObjectUpdates {
	type Item = ObjectUpdate;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.get_mut().rx.poll_recv(cx)
	}
}

/// Handle returned by [`ObjectSet::subscribe`](crate::ObjectSet::subscribe). The listener stops
/// being called once the handle is unsubscribed or dropped.
#[derive(Debug)]
pub struct ObjectSetSubscription {
	_listener: TaskGuard,
}

impl ObjectSetSubscription {
	pub(crate) fn spawn(
		mut updates: ObjectUpdates,
		mut listener: impl FnMut(ObjectUpdate) + Send + 'static,
	) -> Self {
		let task = tokio::spawn(async move {
			while let Some(update) = updates.recv().await {
				listener(update);
			}
		});

		Self {
			_listener: TaskGuard(task),
		}
	}

	pub fn unsubscribe(self) {
		drop(self);
	}
}
