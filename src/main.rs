use clap::Parser;

use boxwall::config::AppConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Stint and pit-stop tracker for iRacing endurance races", long_about = None)]
struct Args {
    /// iRacing display name of the local driver, used for swap detection
    #[arg(short, long)]
    user: Option<String>,

    /// Backend endpoint; records are logged locally when omitted
    #[arg(short, long)]
    api_url: Option<String>,

    /// Telemetry polling rate in Hz
    #[arg(long)]
    hz: Option<u32>,
}

fn main() {
    colog::init();

    let args = Args::parse();
    let config = AppConfig::from_local_file().unwrap_or_default();
    let user_name = args.user.unwrap_or(config.user_name);
    let hz = args.hz.unwrap_or(config.tick_hz);
    if user_name.is_empty() {
        eprintln!("No driver name configured; pass --user or set it in the config file");
        std::process::exit(1);
    }
    if args.api_url.or(config.api_url).is_some() {
        log::warn!("No HTTP backend is wired up yet, records will be logged locally");
    }

    run(&user_name, hz);
}

#[cfg(windows)]
fn run(user_name: &str, hz: u32) {
    use boxwall::telemetry::source::IRacingSource;
    use boxwall::{DryRunClient, Engine};

    let source = IRacingSource::new().expect("Could not initialize the iRacing client");
    let mut engine = Engine::start(
        Box::new(source),
        Box::new(DryRunClient::new()),
        user_name,
        hz,
    );

    let stop = engine.stop_handle();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
    })
    .expect("Could not set Ctrl-C handler");

    while engine.is_running() {
        std::thread::sleep(std::time::Duration::from_millis(250));
    }
    engine.stop();
}

#[cfg(not(windows))]
fn run(_user_name: &str, _hz: u32) {
    eprintln!("boxwall reads iRacing shared memory and only runs on Windows");
    std::process::exit(1);
}
