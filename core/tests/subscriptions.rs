mod helpers;

use osdk_core::{
	wire::{ObjectChange, ObjectState, TransactionEdit},
	Error, FetchPageArgs, ObjectUpdate, SubscribeOptions,
};
use osdk_faux_foundry::fixtures::{EMPLOYEE, FOO_INTERFACE, OFFICE};

use std::{collections::BTreeMap, time::Duration};

use futures::StreamExt;
use serde_json::json;
use tokio::{sync::mpsc, time::timeout};

use helpers::{client, client_without_feed, full_names, rename_employee};

fn touch_office() -> TransactionEdit {
	TransactionEdit::ModifyObject {
		object_type: OFFICE.to_string(),
		primary_key: json!("NYC"),
		properties: BTreeMap::from([("capacity".to_string(), json!(120))]),
	}
}

fn employee_change(primary_key: i64) -> ObjectChange {
	ObjectChange {
		object_type: EMPLOYEE.to_string(),
		primary_key: json!(primary_key),
		state: ObjectState::Updated,
		object: None,
	}
}

#[tokio::test]
async fn updates_only_carry_the_set_type() {
	let (client, foundry) = client();
	let mut updates = client
		.object_set(EMPLOYEE)
		.unwrap()
		.updates(SubscribeOptions::default())
		.unwrap();

	foundry.apply(&[touch_office(), rename_employee(50031, "Janet Doe")]).unwrap();

	let Some(ObjectUpdate::Change(change)) = updates.recv().await else {
		panic!("expected an object change");
	};
	assert_eq!(change.object_type, EMPLOYEE);
	assert_eq!(change.primary_key, json!(50031));
	assert_eq!(change.state, ObjectState::Updated);
	assert_eq!(
		change.object.and_then(|object| object.properties.get("fullName").cloned()),
		Some(json!("Janet Doe"))
	);
}

#[tokio::test]
async fn updates_project_requested_properties() {
	let (client, foundry) = client();
	let mut updates = client
		.object_set(EMPLOYEE)
		.unwrap()
		.updates(SubscribeOptions {
			properties: vec!["fullName".to_string()],
			buffer: None,
		})
		.unwrap();

	foundry.apply(&[rename_employee(50030, "Johnny Doe")]).unwrap();

	let Some(ObjectUpdate::Change(change)) = updates.next().await else {
		panic!("expected an object change");
	};
	let object = change.object.unwrap();
	assert_eq!(object.properties.keys().collect::<Vec<_>>(), ["fullName"]);
}

#[tokio::test]
async fn interface_updates_cover_implementing_types() {
	let (client, foundry) = client();
	let mut updates = client
		.interface_set(FOO_INTERFACE)
		.unwrap()
		.updates(SubscribeOptions::default())
		.unwrap();

	foundry.apply(&[touch_office()]).unwrap();
	foundry.emit(employee_change(50032));

	assert_eq!(
		updates.recv().await,
		Some(ObjectUpdate::Change(employee_change(50032)))
	);
}

#[tokio::test]
async fn lagging_subscribers_are_told_they_are_out_of_date() {
	let (client, foundry) = client();
	let mut updates = client
		.object_set(EMPLOYEE)
		.unwrap()
		.updates(SubscribeOptions::default())
		.unwrap();

	// The faux change feed keeps the latest 256 changes.
	for _ in 0..300 {
		foundry.emit(employee_change(50030));
	}

	assert_eq!(
		updates.recv().await,
		Some(ObjectUpdate::OutOfDate { missed: 44 })
	);
	assert_eq!(
		updates.recv().await,
		Some(ObjectUpdate::Change(employee_change(50030)))
	);
}

#[tokio::test]
async fn listeners_stop_after_unsubscribe() {
	let (client, foundry) = client();
	let (tx, mut rx) = mpsc::unbounded_channel();

	let subscription = client
		.object_set(EMPLOYEE)
		.unwrap()
		.subscribe(
			move |update| {
				let _ = tx.send(update);
			},
			SubscribeOptions::default(),
		)
		.unwrap();

	foundry.emit(employee_change(50033));
	assert_eq!(
		rx.recv().await,
		Some(ObjectUpdate::Change(employee_change(50033)))
	);

	subscription.unsubscribe();
	foundry.emit(employee_change(50030));

	// The listener, and the sender it owns, are gone.
	assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn subscriptions_need_a_change_feed() {
	let (client, _) = client_without_feed();
	let employees = client.object_set(EMPLOYEE).unwrap();

	assert!(matches!(
		employees.updates(SubscribeOptions::default()),
		Err(Error::SubscriptionsUnavailable)
	));
	assert!(matches!(
		employees.subscribe(|_| {}, SubscribeOptions::default()),
		Err(Error::SubscriptionsUnavailable)
	));
	assert!(matches!(
		client.spawn_change_watcher(),
		Err(Error::SubscriptionsUnavailable)
	));
}

#[tokio::test]
async fn change_watcher_revalidates_cached_pages() {
	let (client, foundry) = client();
	let watcher = client.spawn_change_watcher().unwrap();
	let employees = client.object_set(EMPLOYEE).unwrap();

	employees.fetch_page(FetchPageArgs::default()).await.unwrap();
	assert_eq!(foundry.load_calls(), 1);

	// Applied behind the client's back, only the change feed reports it.
	foundry.apply(&[rename_employee(50030, "Johnny Doe")]).unwrap();

	timeout(Duration::from_secs(5), async {
		while foundry.load_calls() < 2 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();

	let page = employees.fetch_page(FetchPageArgs::default()).await.unwrap();
	assert_eq!(full_names(&page.data)[0], "Johnny Doe");
	assert_eq!(foundry.load_calls(), 2);

	watcher.abort();
}
