//! Interactive demo: `windtrail [wind.json] [options.json]`.
//!
//! Without a wind file a synthetic pair of vortices over the North Atlantic
//! is shown. Drag to pan, scroll to zoom.

mod window;

use windtrail::prelude::*;
use winit::event_loop::{ControlFlow, EventLoop};

fn vortex_field() -> WindData {
    let bounds = Rectangle::new(-80.0, 10.0, 0.0, 60.0);
    let centers = [(Vec2::new(-55.0, 35.0), 1.0), (Vec2::new(-25.0, 40.0), -0.7)];
    WindData::from_fn(161, 101, bounds, |lon, lat| {
        let p = Vec2::new(lon, lat);
        centers.iter().fold(Vec2::new(4.0, 0.0), |wind, &(center, strength)| {
            let d = p - center;
            let falloff = (-d.length_squared() / 200.0).exp();
            wind + d.perp() * strength * falloff * 2.0
        })
    })
}

fn load(path: &str) -> Result<String, Box<dyn std::error::Error>> {
    std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path, e).into())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let data = match args.next() {
        Some(path) => WindData::from_json(&load(&path)?)?,
        None => vortex_field(),
    };
    let options = match args.next() {
        Some(path) => RenderOptions::from_json(&load(&path)?)?,
        None => RenderOptions { use_viewer_bounds: true, ..RenderOptions::default() },
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = window::App::new(data, options);
    event_loop.run_app(&mut app)?;
    Ok(())
}
