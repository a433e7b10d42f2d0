//! End-to-end charge-aware sell flow against the mock broker.

use rustgtt::application::sell::{SellRequest, SellScheduler};
use rustgtt::domain::charges::profit_with_charges;
use rustgtt::domain::types::{HoldingLot, SellOutcome, Side};
use rustgtt::infrastructure::mock::{MemorySink, MockBrokerClient, ScriptedConfirmation};
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn sell_plan_covers_charges_and_places_one_gtt() {
    let broker = Arc::new(MockBrokerClient::new(true));
    broker
        .set_holdings(vec![
            HoldingLot { quantity: 300, average_price: dec!(295) },
            HoldingLot { quantity: 200, average_price: dec!(307.50) },
        ])
        .await;
    let gate = Arc::new(ScriptedConfirmation::answering(true));
    let sink = Arc::new(MemorySink::new());
    let scheduler = SellScheduler::new(broker.clone(), gate.clone(), sink.clone());

    let summary = scheduler
        .sell(SellRequest {
            symbol: "ntpc".into(),
            target_net_profit_percent: dec!(2),
            quantity: None,
        })
        .await
        .unwrap();

    assert_eq!(summary.symbol, "NTPC");
    assert_eq!(summary.status, SellOutcome::Placed);
    assert_eq!(summary.quantity, 500);
    // (300*295 + 200*307.50) / 500 = 300.00
    assert_eq!(summary.average_buy_price, dec!(300.00));
    // Net 2% after charges needs a hair more than gross 2% at this size.
    assert!(summary.sell_price > dec!(306));
    assert!(summary.sell_price < dec!(307));
    assert!(summary.trigger_price > summary.sell_price);

    // The placed order matches the plan.
    let gtts = broker.gtt_orders_placed().await;
    assert_eq!(gtts.len(), 1);
    assert_eq!(gtts[0].side, Side::Sell);
    assert_eq!(gtts[0].symbol, "NTPC");
    assert_eq!(gtts[0].price, summary.sell_price);
    assert_eq!(gtts[0].trigger_price, summary.trigger_price);

    // The reported profit really nets the target after charges.
    let check = profit_with_charges(dec!(300.00), summary.sell_price, 500);
    assert!((check.net_profit_percent - dec!(2)).abs() <= dec!(0.11));
    assert_eq!(summary.profit.net_profit, check.net_profit);

    // Prompt showed the breakdown, and the artifact was written.
    assert!(gate.prompts().await[0].contains("Total charges"));
    assert_eq!(sink.sell_summaries().await.len(), 1);
}

#[tokio::test]
async fn declined_sell_keeps_calculated_artifact() {
    let broker = Arc::new(MockBrokerClient::new(true));
    broker
        .set_holdings(vec![HoldingLot { quantity: 5, average_price: dec!(100) }])
        .await;
    let gate = Arc::new(ScriptedConfirmation::answering(false));
    let sink = Arc::new(MemorySink::new());
    let scheduler = SellScheduler::new(broker.clone(), gate, sink.clone());

    let summary = scheduler
        .sell(SellRequest {
            symbol: "ITC".into(),
            target_net_profit_percent: dec!(2),
            quantity: None,
        })
        .await
        .unwrap();

    assert_eq!(summary.status, SellOutcome::Calculated);
    assert!(broker.gtt_orders_placed().await.is_empty());

    let saved = sink.sell_summaries().await;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].status, SellOutcome::Calculated);
    assert!(saved[0].trigger_id.is_none());
}
