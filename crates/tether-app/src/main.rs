// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;
mod renderer;

use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tether_core::init_tracing;
use tether_platform::Platform;
use tether_vk::{frame, selector, AshInstance, Bootstrap, Connection, Criteria};
use tracing::{error, info};

use config::{Config, DEFAULT_PATH, VALIDATION_ENV};
use renderer::Renderer;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file
    #[arg(long, default_value = DEFAULT_PATH)]
    config: PathBuf,

    /// Force the validation layer on
    #[arg(long, conflicts_with = "no_validation")]
    validation: bool,

    /// Force the validation layer off
    #[arg(long)]
    no_validation: bool,

    /// Print every physical device and whether it qualifies, then exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = Config::load(&args.config);
    cfg.apply_env(env::var(VALIDATION_ENV).ok().as_deref());
    if args.validation {
        cfg.vulkan.validation = true;
    }
    if args.no_validation {
        cfg.vulkan.validation = false;
    }
    let settings = cfg.to_settings();
    info!(
        "validation = {}",
        settings
            .validation
            .map_or_else(|| "off".to_owned(), |level| format!("{level:?}"))
    );

    let mut platform = Platform::new(&cfg.app.title, cfg.app.width, cfg.app.height)?;

    if args.list_devices {
        // SAFETY: `platform` outlives the connection.
        let connection =
            unsafe { Connection::open(&platform, &settings) }.context("vulkan connection")?;
        return list_devices(&connection, &settings.criteria);
    }

    // SAFETY: `platform` is declared first and so outlives every handle
    // created from its window.
    let gpu = unsafe { Bootstrap::run(&platform, &settings) }.context("vulkan bootstrap")?;

    let pool = frame::command_pool(gpu.device(), gpu.queue().family())?;
    let mut renderer = Renderer::new(&gpu, &pool, &cfg.render, platform.inner_size())?;

    let result = run(&mut platform, &mut renderer);
    if let Err(e) = renderer.wait_idle() {
        error!("wait idle on exit: {e}");
    }
    info!("shutting down");
    result
}

fn run(platform: &mut Platform, renderer: &mut Renderer<'_>) -> Result<()> {
    let mut paused = false;
    loop {
        // Nothing to draw into while minimised, so block instead of spinning.
        let events = if paused { platform.wait() } else { platform.poll() };
        if events.close_requested {
            info!("close requested");
            return Ok(());
        }
        if let Some((width, height)) = events.resized {
            let now_paused = width == 0 || height == 0;
            if paused != now_paused {
                info!("resized to {width}x{height} (paused={now_paused})");
            }
            paused = now_paused;
            renderer.invalidate();
        }
        if !paused {
            renderer.frame(platform.inner_size())?;
        }
    }
}

/// Every device with its verdict; nothing is selected or created.
fn list_devices(connection: &Connection<AshInstance>, criteria: &Criteria) -> Result<()> {
    for device in connection.devices()? {
        let verdict = match device.verdict(criteria) {
            Ok(()) => "ok".to_owned(),
            Err(rejection) => rejection.to_string(),
        };
        println!(
            "{} [{}]: {verdict}",
            device.name(),
            selector::device_type_name(device.device_type())
        );
        for (index, family) in device.queue_families().iter().enumerate() {
            println!(
                "  queue family {index}: {} x{}",
                selector::describe_queue_flags(family.queue_flags),
                family.queue_count
            );
        }
    }
    Ok(())
}
