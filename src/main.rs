use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init();

    let cfg = fractal_studio::config::Config::parse();
    if cfg.list_devices {
        fractal_studio::audio::list_devices()?;
        return Ok(());
    }

    fractal_studio::app::run(cfg)
}
