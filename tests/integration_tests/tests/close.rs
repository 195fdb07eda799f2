use std::time::Duration;

use integration_tests::{check, trace_init, Backend};
use tonic_pool::{Pool, Selector, TonicTransport};

#[tokio::test]
async fn closing_the_pool_fails_calls_on_held_connections() {
    trace_init();

    let backend = Backend::spawn().await;
    let pool = Pool::builder()
        .ready_timeout(Duration::from_secs(1))
        .pool([backend.address()], TonicTransport::new())
        .unwrap();

    let connection = pool.select().await.unwrap();
    check(&connection).await.unwrap();

    pool.close().await;
    assert!(check(&connection).await.is_err());
    assert_eq!(backend.requests(), 1);

    backend.stop().await;
}

#[tokio::test]
async fn closing_a_single_address_selector_fails_calls_on_held_connections() {
    trace_init();

    let backend = Backend::spawn().await;
    let selector = Selector::new([backend.address()], TonicTransport::new()).unwrap();
    assert!(matches!(selector, Selector::Single(_)));

    let connection = selector.select().await.unwrap();
    check(&connection).await.unwrap();

    selector.close().await;
    assert!(check(&connection).await.is_err());
    assert!(selector.select().await.unwrap_err().is_closed());
    assert_eq!(backend.requests(), 1);

    backend.stop().await;
}
