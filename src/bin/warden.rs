use clap::Parser;
use tracing::{debug, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

use traffic_warden::{
    clock::SystemClock,
    config::read_config_file,
    gateway::AliyunGateway,
    notify::{NoopNotifier, Notifier, TelegramNotifier},
    orchestrator::Orchestrator,
    state::StateStore,
    util::get_config_path,
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, default_value_t = get_config_path())]
    file: String,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("traffic_warden", LevelFilter::TRACE),
        ("warden", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    // config is the only fatal input; everything past this point is
    // logged and tolerated
    let config = read_config_file(&args.file)?;

    let gateway = AliyunGateway::new();
    let notifier: Box<dyn Notifier> = match &config.telegram {
        Some(telegram) => Box::new(TelegramNotifier::new(telegram)),
        None => {
            debug!("no telegram credentials configured, notifications disabled");
            Box::new(NoopNotifier)
        }
    };
    let clock = SystemClock;
    let store = StateStore::new(config.state_file.clone());

    let orchestrator = Orchestrator::new(&gateway, notifier.as_ref(), &clock);
    orchestrator.run(&config, &store).await;

    Ok(())
}
