use integration_tests::{check, trace_init, unused_address};
use tonic_pool::{Pool, Selector, TonicTransport};

#[tokio::test]
async fn selection_succeeds_but_calls_fail() {
    trace_init();

    let down = unused_address().await;
    let pool = Pool::new([down], TonicTransport::new()).unwrap();

    let first = pool.select().await.unwrap();
    let second = pool.select().await.unwrap();
    assert_eq!(first, second);

    assert!(check(&first).await.is_err());

    pool.close().await;
    assert!(pool.select().await.unwrap_err().is_closed());
}

#[tokio::test]
async fn single_address_selector_passes_through() {
    trace_init();

    let down = unused_address().await;
    let selector = Selector::new([down], TonicTransport::new()).unwrap();
    assert!(matches!(selector, Selector::Single(_)));

    let connection = selector.select().await.unwrap();
    assert!(check(&connection).await.is_err());

    selector.close().await;
    selector.close().await;
    assert!(selector.select().await.unwrap_err().is_closed());
}

#[test]
fn malformed_address_fails_construction() {
    let err = Pool::new(["not a valid address"], TonicTransport::new()).unwrap_err();
    assert!(err.is_invalid_address());

    let err = Pool::new(Vec::<String>::new(), TonicTransport::new()).unwrap_err();
    assert!(err.is_empty_addresses());
}
