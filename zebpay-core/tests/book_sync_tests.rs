// End-to-end market data path: raw frames through the normalizer into the
// per-pair synchronizer, queried through the book container.

use rust_decimal_macros::dec;

use zebpay_common::book::BookSide;
use zebpay_core::exchange::book_sync::BookSynchronizer;
use zebpay_core::exchange::normalizer::{normalize_frame, snapshot_from_rest};
use zebpay_core::exchange::types::{CanonicalMessage, RestBookSnapshot};

fn tracked_pairs() -> Vec<String> {
    vec!["BTC-AUD".to_string()]
}

fn rest_snapshot(json: &str) -> RestBookSnapshot {
    serde_json::from_str(json).unwrap()
}

async fn apply_frame(sync: &BookSynchronizer, raw: &str) -> bool {
    match normalize_frame(raw).unwrap() {
        CanonicalMessage::Diff(diff) => sync.apply_diff(&diff).await.unwrap(),
        other => panic!("expected diff frame, got {other:?}"),
    }
}

#[tokio::test]
async fn snapshot_then_diff_sequence_matches_expected_book() {
    let (sync, _resync) = BookSynchronizer::new(&tracked_pairs());

    let raw = rest_snapshot(
        r#"{"t":1000,"bids":[{"price":"100","size":"5"}],"asks":[{"price":"101","size":"3"}]}"#,
    );
    let snapshot = snapshot_from_rest("BTC-AUD", raw, 999).unwrap();
    sync.apply_snapshot(&snapshot).await.unwrap();

    // bid level deleted, ask level resized
    assert!(
        apply_frame(
            &sync,
            r#"{"type":"l2orderbook","data":{"m":"BTC-AUD","t":1001,"b":[["100","0"]],"a":[]}}"#,
        )
        .await
    );
    assert!(
        apply_frame(
            &sync,
            r#"{"type":"l2orderbook","data":{"m":"BTC-AUD","t":1002,"b":[],"a":[["101","2"]]}}"#,
        )
        .await
    );

    let (bid, ask) = sync
        .with_book("BTC-AUD", |book| (book.best_bid(), book.best_ask()))
        .await
        .unwrap();
    assert_eq!(bid, None);
    assert_eq!(ask, Some((dec!(101), dec!(2))));
}

#[tokio::test]
async fn stale_and_redelivered_diffs_converge() {
    let (sync, _resync) = BookSynchronizer::new(&tracked_pairs());
    let raw = rest_snapshot(r#"{"t":2000,"bids":[{"price":"100","size":"5"}],"asks":[]}"#);
    sync.apply_snapshot(&snapshot_from_rest("BTC-AUD", raw, 0).unwrap())
        .await
        .unwrap();

    let newer = r#"{"type":"l2orderbook","data":{"m":"BTC-AUD","t":2005,"b":[["99","7"]],"a":[]}}"#;
    assert!(apply_frame(&sync, newer).await);
    // redelivery of the same token applies idempotently
    assert!(apply_frame(&sync, newer).await);
    // strictly older token is dropped
    let older = r#"{"type":"l2orderbook","data":{"m":"BTC-AUD","t":1999,"b":[["98","9"]],"a":[]}}"#;
    assert!(!apply_frame(&sync, older).await);

    let levels = sync
        .with_book("BTC-AUD", |book| {
            book.bid_levels().collect::<Vec<_>>()
        })
        .await
        .unwrap();
    assert_eq!(levels, vec![(dec!(100), dec!(5)), (dec!(99), dec!(7))]);
}

#[tokio::test]
async fn depth_query_walks_outward() {
    let (sync, _resync) = BookSynchronizer::new(&tracked_pairs());
    let raw = rest_snapshot(
        r#"{"t":3000,"bids":[],"asks":[
            {"price":"101","size":"2"},
            {"price":"102","size":"3"},
            {"price":"103","size":"10"}]}"#,
    );
    sync.apply_snapshot(&snapshot_from_rest("BTC-AUD", raw, 0).unwrap())
        .await
        .unwrap();

    let price = sync
        .with_book("BTC-AUD", |book| book.price_for_volume(BookSide::Ask, dec!(4)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(price, dec!(102));

    let overflow = sync
        .with_book("BTC-AUD", |book| book.price_for_volume(BookSide::Ask, dec!(50)))
        .await
        .unwrap();
    assert!(overflow.is_err());
}

#[tokio::test]
async fn diff_before_snapshot_requests_one_resync() {
    let (sync, mut resync) = BookSynchronizer::new(&tracked_pairs());
    let diff = r#"{"type":"l2orderbook","data":{"m":"BTC-AUD","t":10,"b":[["1","1"]],"a":[]}}"#;
    assert!(!apply_frame(&sync, diff).await);
    assert!(!apply_frame(&sync, diff).await);

    assert_eq!(resync.recv().await.unwrap(), "BTC-AUD");
    assert!(resync.try_recv().is_err());
}

#[tokio::test]
async fn untracked_pair_diff_is_invariant_violation() {
    let (sync, _resync) = BookSynchronizer::new(&tracked_pairs());
    let raw = r#"{"type":"l2orderbook","data":{"m":"ETH-USD","t":10,"b":[],"a":[]}}"#;
    match normalize_frame(raw).unwrap() {
        CanonicalMessage::Diff(diff) => {
            assert!(sync.apply_diff(&diff).await.is_err());
        }
        other => panic!("expected diff frame, got {other:?}"),
    }
}
