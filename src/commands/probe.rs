use anyhow::Result;

use siphon::config::Config;
use siphon::models::StrategyKind;
use siphon::strategy::{self, HttpTransport};

pub async fn probe(config: Config, url: String) -> Result<()> {
    let transport = HttpTransport::new(&config.engine)?;
    let timeout = config.engine.fetch_timeout(StrategyKind::Static);

    let kind = strategy::probe(&transport, &url, timeout).await;
    println!("{url} -> {kind}");
    Ok(())
}
