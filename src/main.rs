mod api;
mod criteria;
mod normalize;
mod outbound;
mod reconcile;
mod settings;
mod store;
mod web;

use std::{process::exit, time::Duration};

use clap::Parser;
use tracing::{error, info};

use crate::{outbound::Backend, settings::{Args, Settings}, store::Store};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = match Settings::from_file(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Problem while loading the configuration file. {e}");
            exit(1);
        }
    };

    let backend = match Backend::new(&settings.backend.url, settings.backend.token.clone()) {
        Ok(backend) => backend,
        Err(e) => {
            eprintln!("Problem while building the backend client. {e}");
            exit(1);
        }
    };

    let store = Store::new();
    if let Err(e) = outbound::refresh(&backend, &store).await {
        // Serve with an empty snapshot; the fetch loop keeps retrying.
        error!("Initial segment fetch failed. {e:#}");
    }

    tokio::spawn(outbound::fetch_periodically(
        backend.clone(),
        store.clone(),
        Duration::from_secs(settings.backend.fetch_period_secs),
        Duration::from_secs(settings.backend.retry_secs),
    ));

    let schema = api::schema(store, backend);
    info!(address = %settings.web.address, "serving segment dashboard");
    web::serve(schema, settings.web.address).await;
}
