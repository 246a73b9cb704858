mod config;
mod keypad;
mod lcd;
mod menu;

use anyhow::Context;
use tagpay_shared::{SimulatedTag, TagSession};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::keypad::StreamKeys;
use crate::lcd::ConsoleLcd;
use crate::menu::Kiosk;

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't tear up the LCD frame on stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tagpay_kiosk=info,tagpay_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();

    let tag = SimulatedTag::open(&config.tag_image)
        .with_context(|| format!("opening tag image {}", config.tag_image.display()))?;
    info!(
        "Simulated tag {} backed by {}",
        tag.uid(),
        config.tag_image.display()
    );

    let session = TagSession::new(tag, config.session.clone());
    let lcd = ConsoleLcd::new(std::io::stdout());
    let keys = StreamKeys::new(std::io::stdin().lock());

    let mut kiosk = Kiosk::new(session, lcd, keys, config.message_hold);
    kiosk.run()?;

    info!("Kiosk stopped");
    Ok(())
}
