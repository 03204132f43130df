//! List fetching: coalescing, buffer reuse, ordering and failure handling.

mod helpers;

use helpers::*;
use http::Method;
use std::time::Duration;
use tourdesk::cache::PaginationParams;
use tourdesk::error::StoreError;
use tourdesk::resources::{Tour, TourStatus};
use tourdesk::store::{FetchOptions, ResourceStore};

fn pending(page: u32, limit: u32) -> PaginationParams {
    PaginationParams::new(page, limit).with_filter("status", "pending")
}

#[tokio::test]
async fn identical_fetches_share_one_request() {
    let mock = MockTransport::new();
    let (settings, _clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    let params = pending(1, 20);
    let gate = mock.on_gated(
        Method::GET,
        &list_target::<Tour>(&params),
        ok(docs_page(tours(0..20, "pending"), 45, 1, 20)),
    );

    let release = async {
        mock.wait_for_calls(1).await;
        assert!(store.is_loading(&params));
        tokio::task::yield_now().await;
        gate.notify_one();
    };
    let (a, b, ()) = tokio::join!(
        store.fetch_list(params.clone(), FetchOptions::default()),
        store.fetch_list(params.clone(), FetchOptions::default()),
        release,
    );

    assert_eq!(mock.call_count(), 1);
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);
    assert_eq!(a.items.len(), 20);
    assert!(!store.is_loading(&params));
}

#[tokio::test]
async fn coalesced_callers_share_failures() {
    let mock = MockTransport::new();
    let (settings, _clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    let params = pending(1, 20);
    let gate = mock.on_gated(Method::GET, &list_target::<Tour>(&params), server_error("boom"));

    let release = async {
        mock.wait_for_calls(1).await;
        tokio::task::yield_now().await;
        gate.notify_one();
    };
    let (a, b, ()) = tokio::join!(
        store.fetch_list(params.clone(), FetchOptions::default()),
        store.fetch_list(params.clone(), FetchOptions::default()),
        release,
    );
    assert_eq!(mock.call_count(), 1);
    assert_eq!(a, b);
    assert!(a.is_err());
}

#[tokio::test]
async fn smaller_page_is_served_from_buffer() {
    let mock = MockTransport::new();
    let (settings, _clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    mock.on(
        Method::GET,
        &list_target::<Tour>(&pending(1, 20)),
        ok(docs_page(tours(0..20, "pending"), 45, 1, 20)),
    );

    store.fetch_list(pending(1, 20), FetchOptions::default()).await.unwrap();
    let first_ten = store.fetch_list(pending(1, 10), FetchOptions::default()).await.unwrap();
    assert_eq!(mock.call_count(), 1);
    let ids: Vec<&str> = first_ten.items.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, (0..10).map(|i| format!("t{i}")).collect::<Vec<_>>());
    assert_eq!(first_ten.total, 45);

    let second_ten = store.fetch_list(pending(2, 10), FetchOptions::default()).await.unwrap();
    assert_eq!(second_ten.items[0].id, "t10");
    assert_eq!(mock.call_count(), 1);

    // Positions 20..30 were never fetched.
    let hole = store.fetch_list(pending(3, 10), FetchOptions::default()).await;
    assert!(hole.is_err());
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn capped_page_size_does_not_shift_ranks() {
    let mock = MockTransport::new();
    let (settings, _clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    // The server caps limit at 10, so page 2 holds ranks 10..19.
    mock.on(Method::GET, &list_target::<Tour>(&pending(2, 20)), ok(docs_page(tours(10..20, "pending"), 45, 2, 10)));
    mock.on(Method::GET, &list_target::<Tour>(&pending(3, 10)), ok(docs_page(tours(20..30, "pending"), 45, 3, 10)));

    store.fetch_list(pending(2, 20), FetchOptions::default()).await.unwrap();
    let third = store.fetch_list(pending(3, 10), FetchOptions::default()).await.unwrap();
    assert_eq!(mock.call_count(), 2);
    assert_eq!(third.items[0].id, "t20");

    // Ranks 10..19 are reusable under the page the server actually served.
    let second = store.fetch_list(pending(2, 10), FetchOptions::default()).await.unwrap();
    assert_eq!(mock.call_count(), 2);
    assert_eq!(second.items[0].id, "t10");
}

#[tokio::test]
async fn expired_buffer_goes_back_to_network() {
    let mock = MockTransport::new();
    let (settings, clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    let params = pending(1, 20);
    mock.on(
        Method::GET,
        &list_target::<Tour>(&params),
        ok(docs_page(tours(0..20, "pending"), 20, 1, 20)),
    );

    store.fetch_list(params.clone(), FetchOptions::default()).await.unwrap();
    clock.advance(Duration::from_secs(4 * 60));
    store.fetch_list(params.clone(), FetchOptions::default()).await.unwrap();
    assert_eq!(mock.call_count(), 1);

    clock.advance(Duration::from_secs(2 * 60));
    store.fetch_list(params.clone(), FetchOptions::default()).await.unwrap();
    assert_eq!(mock.call_count(), 2);

    store.fetch_list(params, FetchOptions::force()).await.unwrap();
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test]
async fn late_response_is_cached_but_not_shown() {
    let mock = MockTransport::new();
    let (settings, _clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    let x = PaginationParams::new(1, 20).with_search("x");
    let y = PaginationParams::new(1, 20).with_search("y");
    let gate_x = mock.on_gated(
        Method::GET,
        &list_target::<Tour>(&x),
        ok(items_page(vec![tour("tx", "approved")], 1, 1, 20)),
    );
    mock.on(
        Method::GET,
        &list_target::<Tour>(&y),
        ok(items_page(vec![tour("ty", "approved")], 1, 1, 20)),
    );

    let later = async {
        mock.wait_for_calls(1).await;
        let b = store.fetch_list(y.clone(), FetchOptions::default()).await;
        gate_x.notify_one();
        b
    };
    let (a, b) = tokio::join!(store.fetch_list(x.clone(), FetchOptions::default()), later);
    assert_eq!(a.unwrap().items[0].id, "tx");
    assert_eq!(b.unwrap().items[0].id, "ty");

    let view = store.current_list().await;
    assert_eq!(view.query, Some(y));
    assert_eq!(view.page.unwrap().items[0].id, "ty");
    assert!(!view.loading);

    let cached_x = store.with_cache(|c| c.list.get_stale(&x)).await;
    assert_eq!(cached_x.unwrap().items[0].id, "tx");
}

#[tokio::test]
async fn replacing_fetch_aborts_the_previous_one() {
    let mock = MockTransport::new();
    let (settings, _clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    let slow = PaginationParams::new(1, 20).with_search("lim");
    let fast = PaginationParams::new(1, 20).with_search("lima");
    let _never = mock.on_gated(
        Method::GET,
        &list_target::<Tour>(&slow),
        ok(items_page(vec![tour("t1", "approved")], 1, 1, 20)),
    );
    mock.on(
        Method::GET,
        &list_target::<Tour>(&fast),
        ok(items_page(vec![tour("t2", "approved")], 1, 1, 20)),
    );

    let second = async {
        mock.wait_for_calls(1).await;
        store.fetch_list(fast.clone(), FetchOptions::replacing()).await
    };
    let (first, second) = tokio::join!(store.fetch_list(slow.clone(), FetchOptions::default()), second);

    assert_eq!(first, Err(StoreError::Cancelled));
    assert_eq!(second.unwrap().items[0].id, "t2");
    assert!(!store.is_loading(&slow));
    assert!(store.with_cache(|c| c.list.get_stale(&slow)).await.is_none());
    assert_eq!(store.current_list().await.page.unwrap().items[0].id, "t2");
}

#[tokio::test]
async fn failed_refresh_keeps_cached_page_visible() {
    let mock = MockTransport::new();
    let (settings, _clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    let params = pending(1, 20);
    let target = list_target::<Tour>(&params);
    mock.on(Method::GET, &target, ok(docs_page(tours(0..3, "pending"), 3, 1, 20)));
    mock.on(Method::GET, &target, server_error("database unavailable"));

    store.fetch_list(params.clone(), FetchOptions::default()).await.unwrap();
    let err = store.fetch_list(params.clone(), FetchOptions::force()).await.unwrap_err();
    assert_eq!(err.user_message(), "database unavailable");

    let view = store.current_list().await;
    assert_eq!(view.page.unwrap().items.len(), 3);
    assert_eq!(view.error.as_deref(), Some("database unavailable"));
    assert_eq!(store.list_error(&params).as_deref(), Some("database unavailable"));
}

#[tokio::test]
async fn approval_drops_status_views_and_patches_the_rest() {
    let mock = MockTransport::new();
    let (settings, _clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    let queue = pending(1, 20);
    let all = PaginationParams::new(1, 20);
    mock.on(Method::GET, &list_target::<Tour>(&queue), ok(docs_page(tours(0..2, "pending"), 2, 1, 20)));
    mock.on(Method::GET, &list_target::<Tour>(&all), ok(docs_page(tours(0..2, "pending"), 2, 1, 20)));
    mock.on(
        Method::PATCH,
        &action_target::<Tour>("t0", "approve"),
        ok(serde_json::json!({ "success": true, "data": tour("t0", "approved") })),
    );

    store.fetch_list(queue.clone(), FetchOptions::default()).await.unwrap();
    store.fetch_list(all.clone(), FetchOptions::default()).await.unwrap();

    let approved = store.approve("t0").await.unwrap().unwrap();
    assert_eq!(approved.status, TourStatus::Approved);

    let (queue_cached, all_page) = store
        .with_cache(|c| (c.list.contains_key(&queue.canonical_key()), c.list.get_stale(&all)))
        .await;
    assert!(!queue_cached);
    assert_eq!(all_page.unwrap().items[0].status, TourStatus::Approved);

    // Refetching the queue goes to the network again.
    store.fetch_list(queue, FetchOptions::default()).await.unwrap();
    assert_eq!(mock.call_count(), 4);
}

#[tokio::test]
async fn detail_fetches_are_cached_and_coalesced() {
    let mock = MockTransport::new();
    let (settings, _clock) = settings();
    let store: ResourceStore<Tour> = ResourceStore::new(mock.clone(), settings);
    let gate = mock.on_gated(
        Method::GET,
        &detail_target::<Tour>("t9"),
        ok(serde_json::json!({ "data": tour("t9", "pending") })),
    );

    let release = async {
        mock.wait_for_calls(1).await;
        tokio::task::yield_now().await;
        gate.notify_one();
    };
    let (a, b, ()) = tokio::join!(
        store.fetch_detail("t9", FetchOptions::default()),
        store.fetch_detail("t9", FetchOptions::default()),
        release,
    );
    assert_eq!(a.unwrap(), b.unwrap());
    store.fetch_detail("t9", FetchOptions::default()).await.unwrap();
    assert_eq!(mock.call_count(), 1);

    let missing = store.fetch_detail("nope", FetchOptions::default()).await;
    assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    assert!(store.detail_error("nope").is_some());
}
