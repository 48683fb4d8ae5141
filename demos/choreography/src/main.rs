//! Demo: the full booking choreography inside one process.
//!
//! Simulates the identity service by publishing guest/host facts, then walks
//! a booking through its whole life: dinner created, reservation made,
//! dinner started and completed, notifications dispatched and swept.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tablehop_choreography::Marketplace;
use tablehop_core::bus::publish_fact;
use tablehop_core::environment::{Clock, SystemClock};
use tablehop_core::fact::{GuestCreated, GuestId, HostCreated, HostId};
use tablehop_dinner::NewDinner;
use tablehop_notification::DispatchConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tablehop_runtime::metrics::register_consumer_metrics();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let config = DispatchConfig::from_env();
    let market = Marketplace::start(clock.clone(), &config);

    // The identity service announces its accounts.
    publish_fact(
        market.bus.as_ref(),
        &HostCreated {
            id: HostId(1),
            name: "Amina".to_string(),
            email: "amina@example.com".to_string(),
        },
    )
    .await?;
    publish_fact(
        market.bus.as_ref(),
        &GuestCreated {
            id: GuestId(5),
            name: "Nora".to_string(),
            email: "nora@example.com".to_string(),
        },
    )
    .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A host books a dinner that is already due to start.
    let now = clock.now();
    let dinner = market
        .dinners
        .create(NewDinner {
            host_id: 1,
            menu_id: 1,
            name: "Tagine Night".to_string(),
            description: "Slow-cooked lamb with preserved lemon".to_string(),
            price: 35.0,
            start_time: now - ChronoDuration::minutes(5),
            end_time: now + ChronoDuration::hours(3),
            address: "1 Rue Atlas, Marrakesh, MK, 40000, Morocco".to_string(),
            cuisine_type: "Moroccan".to_string(),
            max_guest_count: 8,
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A guest reserves a seat; the confirmation email goes out inline.
    let reservation = market
        .reservations
        .create_reservation(dinner.id(), GuestId(5))
        .await?;
    info!(reservation_id = %reservation.id, "seat reserved");
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The dinner starts; reserved guests get an in-app note via the sweep.
    market.dinners.start(dinner.id()).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let swept = market.notifications.process_pending().await?;
    info!(swept, "swept pending notifications");

    market.dinners.complete(dinner.id()).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    market.notifications.process_pending().await?;

    let audit = market.notification_store.all().await;
    info!(total = audit.len(), "notification audit trail");
    for n in &audit {
        info!(
            subject = %n.subject,
            email = %n.email,
            channel = n.channel.as_str(),
            status = n.status.as_str(),
            "notification"
        );
    }

    market.shutdown().await;
    Ok(())
}
