// Change feed simulation with in-memory backends
//
// Runs the full ping pipeline against a scripted transport: a subscription
// is seeded, two pings arrive, the second redelivers an already-processed
// payload, and the printed batches show the dedup and cursor advance.
//
// Run with: cargo run --example feed_simulation

use gridhook_core::{
    memory::{InMemorySubscriptionStore, StaticTransport},
    PingPipeline, Subscription, SubscriptionStore, TriggerConfig,
};
use serde_json::json;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("gridhook_core=debug")
        .init();

    let transport = StaticTransport::new();
    let store = InMemorySubscriptionStore::new();

    let subscription = Subscription::new(
        "appDemo",
        TriggerConfig::new("tblOrders").with_previous_values(),
        "achDemo",
        None,
        None,
    );
    let subscription_id = subscription.id;
    store.seed(subscription).await;

    let pipeline = PingPipeline::new(transport.clone(), store.clone());

    let ping = json!({
        "base": {"id": "appDemo"},
        "webhook": {"id": "achDemo"},
        "timestamp": "2024-03-01T12:00:00.000Z"
    });

    // First ping: two payloads from the start of the log
    transport
        .push_response(json!({"payloads": [
            {
                "cursor": 1,
                "timestamp": "2024-03-01T11:59:58.000Z",
                "changedTablesById": {
                    "tblOrders": {
                        "changedRecordsById": {
                            "recA": {
                                "current": {"cellValuesByFieldId": {"fldStatus": "shipped"}},
                                "previous": {"cellValuesByFieldId": {"fldStatus": "packed"}}
                            }
                        }
                    }
                }
            },
            {
                "cursor": 2,
                "timestamp": "2024-03-01T11:59:59.000Z",
                "changedTablesById": {
                    "tblOrders": {
                        "changedMetadata": {
                            "current": {"name": "Orders 2024"},
                            "previous": {"name": "Orders"}
                        }
                    }
                }
            }
        ]}))
        .await;

    let first = pipeline.handle_ping(ping.clone()).await;
    println!("first ping  -> {} event(s)", first.events().len());
    for event in first.events() {
        println!("  {}", serde_json::to_string(event).unwrap());
    }

    // Second ping: the service redelivers cursor 2 alongside a new payload
    transport
        .push_response(json!({"payloads": [
            {
                "cursor": 2,
                "timestamp": "2024-03-01T11:59:59.000Z",
                "changedTablesById": {}
            },
            {
                "cursor": 3,
                "timestamp": "2024-03-01T12:00:05.000Z",
                "changedTablesById": {
                    "tblOrders": {
                        "changedRecordsById": {
                            "recA": {
                                "current": {"cellValuesByFieldId": {"fldStatus": "delivered"}},
                                "previous": {"cellValuesByFieldId": {"fldStatus": "shipped"}}
                            }
                        }
                    }
                }
            }
        ]}))
        .await;

    let second = pipeline.handle_ping(ping).await;
    println!("second ping -> {} event(s)", second.events().len());
    for event in second.events() {
        println!("  {}", serde_json::to_string(event).unwrap());
    }

    let stored = store.get(subscription_id).await.unwrap().unwrap();
    println!("cursor high-water mark: {}", stored.last_cursor);
}
