use std::io;
use std::sync::Arc;

use dotenvy::dotenv;
use payment_reconciler::application::{CheckoutService, OrderService, ReconciliationService};
use payment_reconciler::config::AppConfig;
use payment_reconciler::gateway::GatewayClient;
use payment_reconciler::infrastructure::DieselOrderRepository;
use payment_reconciler::{build_server, create_pool, run_migrations, AppState};

fn startup_error(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(startup_error)?;

    let pool = create_pool(&config.database_url).map_err(startup_error)?;
    run_migrations(&pool).map_err(startup_error)?;

    let repo = Arc::new(DieselOrderRepository::new(pool));
    let gateway = Arc::new(GatewayClient::new(config.gateway.clone()).map_err(startup_error)?);
    log::info!("Payment gateway at {}", config.gateway.base_url);

    let mut checkout = CheckoutService::new(repo.clone(), gateway.clone(), config.urls.clone());
    match config.gateway.ipn_id.clone() {
        Some(ipn_id) => {
            log::info!("Using preconfigured notification id for {}", config.urls.ipn_url);
            checkout = checkout.with_notification_id(ipn_id);
        }
        None => match checkout.provision_notification_channel().await {
            Ok(ipn_id) => {
                log::info!("Registered {} with the gateway as {ipn_id}", config.urls.ipn_url)
            }
            Err(e) => {
                log::warn!("Notification channel not registered at start-up, will retry: {e}")
            }
        },
    }

    let state = AppState::from_services(
        OrderService::new(repo.clone()),
        checkout,
        ReconciliationService::new(repo, gateway),
        config.urls.clone(),
    );

    log::info!("Starting server at http://{}:{}", config.host, config.port);

    build_server(state, &config.host, config.port)?.await
}
