use clap::Parser;
use fetch_subtitles::{Config, SubtitleService, hydrate_from_env, serve};
use log::{error, info};
use std::process;
use std::sync::Arc;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();

    // Cold start: make the cookie secret available to yt-dlp
    hydrate_from_env(config.cookies_text().as_deref(), &config.cookies_path);

    // Blocking HTTP clients must be built outside the async runtime
    let service = match SubtitleService::from_config(&config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to set up subtitle service: {}", e);
            process::exit(1);
        }
    };

    info!(
        "Default format {}, bucket {}, signed URLs {}",
        config.default_format(),
        config.bucket().as_deref().unwrap_or("<none>"),
        if config.signer_email().is_some() { "on" } else { "off" }
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            process::exit(1);
        }
    };

    // The service must be dropped outside the runtime
    let result = runtime.block_on(serve(&config.bind_address(), Arc::clone(&service)));
    drop(runtime);

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
