use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, Responder, get, middleware, web};
use std::sync::Arc;

use smart_power_consumer::{
    api,
    config::Settings,
    integrations::{DeviceSwitch, DryRunSwitch, HomeAssistantClient, LogPlanStateListener, PlanStateListener},
    services::{
        clock::SystemClock,
        power_consumers_service::PowerConsumersService,
        price_sources::build_price_source,
        price_sync::start_price_sync,
        price_window::PriceWindowService,
        scheduler::SwitchActionsScheduler,
    },
};

#[get("/")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "Smart Power Consumer",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let (device_switch, listener): (Arc<dyn DeviceSwitch>, Arc<dyn PlanStateListener>) =
        match &settings.home_assistant {
            Some(ha) => {
                let client = Arc::new(
                    HomeAssistantClient::new(ha.base_url.clone(), ha.token.clone())
                        .with_notify_service(ha.notify_service.clone()),
                );
                log::info!("Switching devices through Home Assistant at {}", ha.base_url);
                (client.clone() as Arc<dyn DeviceSwitch>, client as Arc<dyn PlanStateListener>)
            }
            None => {
                log::warn!("HA_BASE_URL is not set, device switching runs in dry-run mode");
                (Arc::new(DryRunSwitch) as Arc<dyn DeviceSwitch>, Arc::new(LogPlanStateListener) as Arc<dyn PlanStateListener>)
            }
        };

    let price_source = build_price_source(settings.tariff, settings.time_zone, settings.flat_price);
    let price_window = Arc::new(PriceWindowService::new(price_source.clone(), settings.time_zone));
    let scheduler = SwitchActionsScheduler::new(
        device_switch,
        listener,
        Arc::new(SystemClock),
        settings.switch_action_threshold,
    );
    let service = web::Data::new(PowerConsumersService::new(
        &settings.power_consumers,
        settings.plan_history_size,
        price_window,
        scheduler,
    ));

    let _price_sync = match start_price_sync(price_source, &settings.price_sync_cron).await {
        Ok(sched) => Some(sched),
        Err(e) => {
            log::error!("Failed to start price sync job: {}", e);
            None
        }
    };

    log::info!(
        "Starting Smart Power Consumer at http://{}:{} ({:?} tariff, {})",
        settings.bind_address,
        settings.port,
        settings.tariff,
        settings.time_zone
    );
    for power_consumer in &settings.power_consumers {
        log::info!("Power consumer: {} ({})", power_consumer.name, power_consumer.device_id);
    }

    HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(middleware::NormalizePath::trim())
            .app_data(service.clone())
            .service(health_check)
            .configure(api::config)
    })
    .bind((settings.bind_address.as_str(), settings.port))?
    .run()
    .await
}
