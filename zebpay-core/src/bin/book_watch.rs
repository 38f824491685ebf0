// zebpay-core/src/bin/book_watch.rs
// Smoke tool: start the public-data side of the connector and print the
// top of book for each tracked pair once a second.

use std::time::Duration;

use anyhow::Result;
use zebpay_core::config::{ConnectorConfig, Credentials, Domain};
use zebpay_core::exchange::ZebpayExchange;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let mut config = ConnectorConfig::load()
        .unwrap_or_else(|_| ConnectorConfig::new(Domain::Prod, "in", vec!["BTC-AUD".to_string()]));
    if config.trading_pairs.is_empty() {
        config.trading_pairs = vec!["BTC-AUD".to_string()];
    }
    // Public market data only; no credentials needed for watching books.
    config.trading_required = false;

    let exchange = ZebpayExchange::new(config.clone(), Credentials::default())?;
    exchange.start().await?;
    println!("watching {} pair(s), ctrl-c to quit", config.trading_pairs.len());

    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        for pair in &config.trading_pairs {
            let quote = exchange
                .with_order_book(pair, |book| (book.best_bid(), book.best_ask()))
                .await?;
            match quote {
                (Some((bid, bid_size)), Some((ask, ask_size))) => {
                    println!("{pair}: {bid} x {bid_size} / {ask} x {ask_size}");
                }
                _ => println!("{pair}: book not ready yet"),
            }
        }
    }
}
