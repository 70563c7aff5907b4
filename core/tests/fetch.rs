mod helpers;

use osdk_core::{
	wire::{BackendError, SortDirection, WhereClause},
	AggregateOptions, DerivedAggregation, Error, FetchPageArgs, Metric,
};
use osdk_faux_foundry::{
	fixtures::{EMPLOYEE, FOO_INTERFACE, OFFICE},
	rid_for,
};

use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use serde_json::{json, Value};

use helpers::{client, full_names, primary_keys};

#[tokio::test]
async fn fetches_filtered_page_with_selection_and_order() {
	let (client, foundry) = client();

	let page = client
		.object_set(EMPLOYEE)
		.unwrap()
		.where_(WhereClause::eq("class", "Red"))
		.fetch_page(
			FetchPageArgs::default()
				.select(["fullName"])
				.order_by("fullName", SortDirection::Desc),
		)
		.await
		.unwrap();

	assert_eq!(full_names(&page.data), ["John Doe", "Jack Smith"]);
	assert_eq!(page.total_count, 2);
	assert!(page.next_page_token.is_none());
	assert!(page.data.iter().all(|object| object.property("class").is_none()));

	let requests = foundry.load_requests();
	assert_eq!(requests[0].select, ["fullName"]);
}

#[tokio::test]
async fn pivots_to_linked_objects() {
	let (client, _) = client();

	let page = client
		.object_set(EMPLOYEE)
		.unwrap()
		.where_(WhereClause::eq("class", "Red"))
		.pivot_to("officeLink")
		.unwrap()
		.fetch_page(FetchPageArgs::default())
		.await
		.unwrap();

	assert_eq!(primary_keys(&page.data), [json!("NYC")]);
	assert!(page.data.iter().all(|object| object.api_name == OFFICE));
}

#[tokio::test]
async fn rejects_unknown_properties_before_calling_the_backend() {
	let (client, foundry) = client();
	let employees = client.object_set(EMPLOYEE).unwrap();

	let unknown_filter = employees
		.where_(WhereClause::eq("nickname", "JD"))
		.fetch_page(FetchPageArgs::default())
		.await;
	assert!(matches!(unknown_filter, Err(Error::PropertyNotFound { .. })));

	let unknown_select = employees
		.fetch_page(FetchPageArgs::default().select(["nickname"]))
		.await;
	assert!(matches!(unknown_select, Err(Error::PropertyNotFound { .. })));

	assert!(matches!(
		employees.pivot_to("manager"),
		Err(Error::LinkNotFound { .. })
	));
	assert!(matches!(
		client.object_set("Spaceship"),
		Err(Error::ObjectTypeNotFound(_))
	));

	assert_eq!(foundry.load_calls(), 0);
}

#[tokio::test]
async fn async_iter_fetches_pages_lazily() {
	let (client, foundry) = client();
	let employees = client.object_set(EMPLOYEE).unwrap();

	let all = employees
		.async_iter(FetchPageArgs::default().page_size(1))
		.try_collect::<Vec<_>>()
		.await
		.unwrap();
	assert_eq!(
		primary_keys(&all),
		[json!(50030), json!(50031), json!(50032), json!(50033)]
	);
	assert_eq!(foundry.load_calls(), 4);

	let first = employees
		.async_iter(FetchPageArgs::default().page_size(2))
		.take(1)
		.try_collect::<Vec<_>>()
		.await
		.unwrap();
	assert_eq!(primary_keys(&first), [json!(50030)]);
	assert_eq!(foundry.load_calls(), 5);
}

#[tokio::test]
async fn fetch_one_by_primary_key() {
	let (client, _) = client();
	let employees = client.object_set(EMPLOYEE).unwrap();

	let jane = employees.fetch_one(50031).await.unwrap();
	assert_eq!(jane.property("fullName"), Some(&json!("Jane Doe")));

	let red_jane = employees
		.where_(WhereClause::eq("class", "Red"))
		.fetch_one(50031)
		.await;
	assert!(matches!(red_jane, Err(Error::ObjectNotFound { .. })));

	let missing = employees.fetch_one(99999).await;
	assert_eq!(
		missing,
		Err(Error::ObjectNotFound {
			object_type: EMPLOYEE.to_string(),
			primary_key: "99999".to_string(),
		})
	);

	let interface = client.interface_set(FOO_INTERFACE).unwrap().fetch_one(50031).await;
	assert!(matches!(interface, Err(Error::NotAnObjectType(_))));
}

#[tokio::test]
async fn derived_properties_are_returned_and_filterable() {
	let (client, _) = client();

	let employees = client
		.object_set(EMPLOYEE)
		.unwrap()
		.with_property("leadName", |builder| {
			builder.pivot_to("lead")?.select_property("fullName")
		})
		.unwrap()
		.with_property("peepCount", |builder| {
			builder.pivot_to("peeps")?.aggregate(DerivedAggregation::Count)
		})
		.unwrap();

	let jane = employees.fetch_one(50031).await.unwrap();
	assert_eq!(jane.property("leadName"), Some(&json!("John Doe")));
	assert_eq!(jane.property("peepCount"), Some(&json!(1)));

	let leads = employees
		.where_(WhereClause::gt("peepCount", 0))
		.fetch_page(FetchPageArgs::default())
		.await
		.unwrap();
	assert_eq!(primary_keys(&leads.data), [json!(50030), json!(50031)]);
}

#[tokio::test]
async fn derived_property_builder_checks_links_and_types() {
	let (client, _) = client();
	let employees = client.object_set(EMPLOYEE).unwrap();

	assert!(matches!(
		employees.with_property("x", |builder| builder.pivot_to("nowhere")?.select_property("name")),
		Err(Error::LinkNotFound { .. })
	));
	assert!(matches!(
		employees.with_property("x", |builder| builder.select_property("nickname")),
		Err(Error::PropertyNotFound { .. })
	));
	assert!(matches!(
		employees.with_property("x", |builder| builder.pivot_to("peeps")?.select_property("fullName")),
		Err(Error::InvalidDerivedProperty(_))
	));
	assert!(matches!(
		employees.with_property("x", |builder| builder.select_property("fullName")?.add(1)),
		Err(Error::InvalidDerivedProperty(_))
	));
}

#[tokio::test]
async fn aggregates_grouped_and_ungrouped() {
	let (client, foundry) = client();
	let employees = client.object_set(EMPLOYEE).unwrap();

	let by_class = employees
		.aggregate(
			AggregateOptions::new()
				.select("$count")
				.unwrap()
				.select("salary:max")
				.unwrap()
				.group_by_exact("class", None),
		)
		.await
		.unwrap();

	let red = by_class
		.rows
		.iter()
		.find(|row| row.group.get("class") == Some(&json!("Red")))
		.unwrap();
	assert_eq!(red.metric("$count"), Some(&json!(2)));
	assert_eq!(red.metric("salary:max"), Some(&json!(100_000)));
	assert_eq!(by_class.rows.len(), 2);

	let totals = employees
		.aggregate(
			AggregateOptions::new()
				.metric(Metric::Count)
				.select("salary:sum")
				.unwrap(),
		)
		.await
		.unwrap();
	assert_eq!(totals.metric("$count"), Some(&json!(4)));
	assert_eq!(
		totals.metric("salary:sum").and_then(Value::as_f64),
		Some(310_000.0)
	);

	assert_eq!(foundry.aggregate_calls(), 2);
}

#[tokio::test]
async fn invalid_aggregations_are_rejected_locally() {
	let (client, foundry) = client();
	let employees = client.object_set(EMPLOYEE).unwrap();

	assert!(matches!(
		employees.aggregate(AggregateOptions::new()).await,
		Err(Error::InvalidAggregation(_))
	));
	assert!(matches!(
		employees
			.aggregate(AggregateOptions::new().select("fullName:sum").unwrap())
			.await,
		Err(Error::InvalidAggregation(_))
	));
	assert!(matches!(
		employees
			.aggregate(AggregateOptions::new().select("nickname:max").unwrap())
			.await,
		Err(Error::PropertyNotFound { .. })
	));
	assert!(matches!(
		employees
			.aggregate(AggregateOptions::new().select("salary:collectList").unwrap())
			.await,
		Err(Error::InvalidAggregation(_))
	));
	assert!("salary:median".parse::<Metric>().is_err());

	assert_eq!(foundry.aggregate_calls(), 0);
}

#[tokio::test]
async fn with_errors_variants_return_errors_as_values() {
	let (client, _) = client();
	let employees = client.object_set(EMPLOYEE).unwrap();

	let found = employees.fetch_one_with_errors(50030).await;
	assert!(found.is_ok());
	assert_eq!(
		found.value().and_then(|object| object.property("fullName")),
		Some(&json!("John Doe"))
	);

	let missing = employees.fetch_one_with_errors(1).await;
	assert!(matches!(missing.error(), Some(Error::ObjectNotFound { .. })));
	assert!(missing.into_result().is_err());

	let page = employees
		.fetch_page_with_errors(FetchPageArgs::default().select(["nickname"]))
		.await;
	assert!(matches!(page.error(), Some(Error::PropertyNotFound { .. })));

	let aggregation = employees
		.aggregate_with_errors(AggregateOptions::new().metric(Metric::Count))
		.await;
	assert_eq!(
		aggregation.value().and_then(|result| result.metric("$count")),
		Some(&json!(4))
	);
}

#[tokio::test(start_paused = true)]
async fn backend_failures_surface_and_recover_after_the_dedupe_window() {
	let (client, foundry) = client();
	let employees = client.object_set(EMPLOYEE).unwrap();
	let error = BackendError::new(503, "ServiceUnavailable", "try again");
	foundry.fail_next_load(error.clone());

	let failed = employees.fetch_page(FetchPageArgs::default()).await;
	assert_eq!(failed, Err(Error::Backend(error.clone())));

	// Within the window the stored failure is returned without a new call.
	let repeated = employees.fetch_page(FetchPageArgs::default()).await;
	assert_eq!(repeated, Err(Error::Backend(error)));
	assert_eq!(foundry.load_calls(), 1);

	tokio::time::advance(Duration::from_millis(2001)).await;

	let page = employees.fetch_page(FetchPageArgs::default()).await.unwrap();
	assert_eq!(page.data.len(), 4);
	assert_eq!(foundry.load_calls(), 2);
}

#[tokio::test]
async fn static_sets_bypass_the_cache() {
	let (client, foundry) = client();
	let rids = [rid_for(EMPLOYEE, &json!(50032)), rid_for(EMPLOYEE, &json!(50030))];
	let picked = client.static_set(EMPLOYEE, rids).unwrap();

	for _ in 0..2 {
		let page = picked.fetch_page(FetchPageArgs::default()).await.unwrap();
		assert_eq!(page.data.len(), 2);
	}

	assert_eq!(foundry.load_calls(), 2);
	assert!(client.cache().is_empty());
}
