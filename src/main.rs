//! Loads a document into a headless editing surface and prints the
//! engine's cleaned-up HTML.
//!
//! Usage: `quill [document.html]`

use anyhow::{Context, Result};
use quill_config::QuillConfig;

#[cfg(feature = "cdp")]
fn run(config: QuillConfig, html: Option<String>) -> Result<()> {
    use futures::FutureExt;
    use quill_bridge::{CdpTransport, DirectoryStager, FocusArbiter, LifecycleState, SurfaceBuilder};
    use std::time::{Duration, Instant};

    let transport = CdpTransport::launch(&config.cdp, &config.bridge.message_handler)
        .context("launching the engine")?;
    let mut builder = SurfaceBuilder::new(FocusArbiter::new()).with_config(&config);
    if let Some(html) = &html {
        builder = builder.with_initial_html(html);
    }
    let mut surface = builder.build(transport);
    surface.start(&mut DirectoryStager::new())?;

    let deadline = Instant::now() + Duration::from_millis(config.bridge.ready_timeout_ms);
    while !surface.is_ready() {
        if surface.lifecycle_state() == LifecycleState::Failed || Instant::now() >= deadline {
            anyhow::bail!("surface stopped in state {}", surface.lifecycle_state());
        }
        surface.pump_blocking(Duration::from_millis(50));
    }
    log::info!("surface {} ready at {:?}", surface.id(), surface.base_url());

    let mut html = surface.get_html(true, true);
    let output = loop {
        if let Some(result) = (&mut html).now_or_never() {
            break result?;
        }
        if Instant::now() >= deadline + Duration::from_secs(5) {
            anyhow::bail!("timed out waiting for the document");
        }
        surface.pump_blocking(Duration::from_millis(50));
    };
    println!("{}", output);

    surface.tear_down();
    Ok(())
}

#[cfg(not(feature = "cdp"))]
fn run(_config: QuillConfig, _html: Option<String>) -> Result<()> {
    anyhow::bail!("no engine backend compiled in; rebuild with `--features cdp`")
}

fn main() -> Result<()> {
    env_logger::init();

    let config = QuillConfig::load();
    let html = match std::env::args().nth(1) {
        Some(path) => Some(
            std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?,
        ),
        None => None,
    };

    log::info!(
        "staging {} from {}",
        config.resources.base_document,
        config.resources.root_dir.display()
    );
    run(config, html)
}
