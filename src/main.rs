use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bevy::{
    log::LogPlugin,
    prelude::{App, AppExit, EventWriter, PluginGroup, Res, Resource, Update, Window},
    window::WindowPlugin,
};

use galton_board::{board::GaltonPlugin, config::BoardConfig, tuning::TuningPlugin};

#[derive(Clone, Resource)]
struct AllowExitFlag(Arc<AtomicBool>);

fn exit_when_flagged(flag: Res<AllowExitFlag>, mut exit: EventWriter<AppExit>) {
    if flag.0.load(Ordering::SeqCst) {
        exit.write(AppExit::Success);
    }
}

fn main() -> ExitCode {
    let config = match BoardConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("galton-board: {}", e);
            return ExitCode::from(2);
        }
    };
    let debug_render = std::env::var("DEBUG_RENDER").ok().is_some();
    let seed: Option<u64> = std::env::var("GALTON_SEED").ok().and_then(|s| s.parse().ok());
    let tuning_addr: Option<SocketAddr> = match std::env::var("TUNING_ADDR").ok() {
        Some(raw) => match raw.parse() {
            Ok(addr) => Some(addr),
            Err(e) => {
                eprintln!("galton-board: TUNING_ADDR {:?}: {}", raw, e);
                return ExitCode::from(2);
            }
        },
        None => None,
    };

    let mut plugin = match GaltonPlugin::new(config.clone()) {
        Ok(plugin) => plugin.with_debug_render(debug_render),
        Err(e) => {
            eprintln!("galton-board: {}", e);
            return ExitCode::from(2);
        }
    };
    if let Some(seed) = seed {
        plugin = plugin.with_seed(seed);
    }

    let mut app = App::new();
    app.add_plugins(
        bevy::DefaultPlugins
            .set(LogPlugin { level: bevy::log::Level::INFO, filter: "wgpu=error,naga=warn".into(), ..Default::default() })
            .set(WindowPlugin {
                primary_window: Some(Window {
                    title: "Galton board".into(),
                    resolution: (config.layout.canvas_width, config.layout.canvas_height).into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
    );
    app.add_plugins(plugin);
    if let Some(addr) = tuning_addr {
        app.add_plugins(TuningPlugin { addr });
    }

    // Ctrl+C requests a clean shutdown so teardown can log the final histogram
    let exit_flag = Arc::new(AtomicBool::new(false));
    app.insert_resource(AllowExitFlag(exit_flag.clone()));
    {
        let f2 = exit_flag;
        let _ = ctrlc::set_handler(move || {
            eprintln!("[diag] SIGINT received, requesting shutdown...");
            f2.store(true, Ordering::SeqCst);
        });
    }
    app.add_systems(Update, exit_when_flagged);

    match app.run() {
        AppExit::Success => ExitCode::SUCCESS,
        AppExit::Error(code) => ExitCode::from(code.get()),
    }
}
