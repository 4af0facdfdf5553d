//! Pattern walkthrough (`freelancie demo`).
//!
//! Exercises the payment Factory and notification Strategy without a
//! database or server.

use anyhow::Result;
use tokio::sync::broadcast;

use freelancie::config::LoggingSection;
use freelancie::logging::init_logging;
use freelancie::market::models::{NotificationChannel, PaymentType};
use freelancie::market::notify::{MessageSender, NotificationStrategyFactory};
use freelancie::market::payments::PaymentProcessorFactory;

pub async fn cmd_demo(amount: f64, verbose: bool) -> Result<()> {
    // Email, SMS and push delivery show up only as log records on stderr.
    let _guard = init_logging(&LoggingSection::default(), verbose)?;

    println!();
    println!("Payment processors");
    println!("==================");
    for kind in PaymentType::ALL {
        let receipt = PaymentProcessorFactory::create(kind).process(amount);
        println!("  {:<13} {}  [{}]", kind.as_str(), receipt.message, receipt.transaction_id);
    }

    println!();
    println!("Notification channels");
    println!("=====================");
    let (ws_tx, _rx) = broadcast::channel(16);
    let mut sender = MessageSender::empty();
    for channel in NotificationChannel::ALL {
        sender.set_strategy(NotificationStrategyFactory::create(channel, &ws_tx));
        let receipt = sender
            .send("user@example.com", "Test notification message")
            .await?;
        println!(
            "  {:<6} -> {} at {}",
            receipt.method.as_str(),
            receipt.recipient,
            receipt.timestamp
        );
    }
    println!();

    Ok(())
}
