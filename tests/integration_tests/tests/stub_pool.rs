use std::time::Duration;

use integration_tests::{check_with, trace_init, Backend};
use tonic_health::pb::health_client::HealthClient;
use tonic_pool::{Pool, Select, Selector, StubPool, TonicTransport};

#[tokio::test]
async fn stubs_rotate_with_their_connections() {
    trace_init();

    let a = Backend::spawn().await;
    let b = Backend::spawn().await;

    let pool: StubPool<_, _> = Pool::builder()
        .ready_timeout(Duration::from_secs(1))
        .stub_pool([a.address(), b.address()], TonicTransport::new(), |connection| {
            HealthClient::new(connection.channel())
        })
        .unwrap();

    for _ in 0..4 {
        let mut client = pool.select().await.unwrap();
        check_with(&mut client).await.unwrap();
    }
    assert_eq!(a.requests(), 2);
    assert_eq!(b.requests(), 2);

    pool.close().await;
    assert!(pool.select().await.is_err());

    a.stop().await;
    b.stop().await;
}

async fn call_n<S>(selector: &S, n: usize)
where
    S: Select<Handle = HealthClient<tonic::transport::Channel>>,
{
    for _ in 0..n {
        let mut client = selector.select().await.unwrap();
        check_with(&mut client).await.unwrap();
    }
}

#[tokio::test]
async fn selector_serves_both_shapes() {
    trace_init();

    let a = Backend::spawn().await;
    let b = Backend::spawn().await;
    let bind = |connection: &tonic_pool::TonicConnection| HealthClient::new(connection.channel());

    let single = Selector::with_stub([a.address()], TonicTransport::new(), bind).unwrap();
    assert!(matches!(single, Selector::Single(_)));
    call_n(&single, 2).await;
    assert_eq!(a.requests(), 2);

    let pool =
        Selector::with_stub([a.address(), b.address()], TonicTransport::new(), bind).unwrap();
    assert!(matches!(pool, Selector::Pool(_)));
    call_n(&pool, 4).await;
    assert_eq!(a.requests() + b.requests(), 6);
    assert_eq!(b.requests(), 2);

    Select::close(&single).await;
    Select::close(&pool).await;

    a.stop().await;
    b.stop().await;
}
