//! Synthetic render-loop workload
//!
//! Drives a small, fully deterministic application through a
//! [`ManualClock`]: an `App.render` frame boundary that steps physics and
//! draws a scene (which itself runs collision physics), a loader whose
//! fetches finish in a timer continuation, and an input listener whose
//! waits are never attributed. Used by the CLI `demo` command, the
//! benchmarks and the integration tests.

use crate::clock::ManualClock;
use crate::config::ProfilerConfig;
use crate::context::ContinuationKind;
use crate::error::Result;
use crate::event_loop::EventLoop;
use crate::profiler::Profiler;
use crate::tracked::{Trackable, Tracked};
use tracing::info;

pub struct App;
impl Trackable for App {
    const CLASS_NAME: &'static str = "App";
    const METHODS: &'static [&'static str] = &["render"];
}

pub struct Scene {
    pub draws: u64,
}
impl Trackable for Scene {
    const CLASS_NAME: &'static str = "Scene";
    const METHODS: &'static [&'static str] = &["draw"];
}

pub struct Physics {
    pub steps: u64,
}
impl Trackable for Physics {
    const CLASS_NAME: &'static str = "Physics";
    const METHODS: &'static [&'static str] = &["step", "collide"];
}

pub struct Loader;
impl Trackable for Loader {
    const CLASS_NAME: &'static str = "Loader";
    const METHODS: &'static [&'static str] = &["fetch"];
}

pub struct Input;
impl Trackable for Input {
    const CLASS_NAME: &'static str = "Input";
    const METHODS: &'static [&'static str] = &["listen"];
}

/// Every how many frames the loader fetches
pub const FETCH_EVERY: usize = 4;

/// Run `frames` render frames and return the profiler holding the results
///
/// Every frame is closed before returning, so the history holds the empty
/// frame that precedes the first boundary plus one frame per render.
pub fn run(config: ProfilerConfig, frames: usize) -> Result<Profiler> {
    let clock = ManualClock::new();
    let profiler = Profiler::new(config, clock.clone())?;
    profiler.track::<Scene>(None)?;
    profiler.track::<Physics>(None)?;
    profiler.track::<Loader>(None)?;
    profiler.track::<Input>(None)?;
    profiler.define_frame_boundary::<App>("render")?;

    let event_loop = EventLoop::new();
    let mut app = Tracked::new(&profiler, App);
    let mut scene = Tracked::new(&profiler, Scene { draws: 0 });
    let mut physics = Tracked::new(&profiler, Physics { steps: 0 });
    let mut loader = Tracked::new(&profiler, Loader);
    let mut input = Tracked::new(&profiler, Input);

    input.invoke("listen", |_, scope| {
        clock.advance(0.5);
        let waiting = clock.clone();
        event_loop.add_listener("frame", scope.defer(ContinuationKind::Listener), move |_| {
            waiting.advance(0.25);
        });
    });

    for frame in 0..frames {
        app.invoke("render", |_, _| {
            clock.advance(1.0);
            physics.invoke("step", |p, _| {
                p.steps += 1;
                clock.advance(3.0 + (frame % 3) as f64);
            });
            scene.invoke_with_args("draw", 1, |s, _| {
                s.draws += 1;
                clock.advance(2.0);
                physics.invoke("collide", |_, _| clock.advance(1.5));
                clock.advance(2.0);
            });
            if frame % FETCH_EVERY == 0 {
                loader.invoke("fetch", |_, scope| {
                    clock.advance(0.5);
                    let parsing = clock.clone();
                    event_loop.set_timeout(1, scope.defer(ContinuationKind::Timer), move |_| {
                        parsing.advance(11.0);
                    });
                });
            }
        });
        event_loop.emit("frame");
        event_loop.run_until_idle();
        clock.advance(2.0);
    }

    event_loop.remove_listeners("frame");
    profiler.close_frame()?;
    info!(
        frames,
        draws = scene.get().draws,
        steps = physics.get().steps,
        "demo workload finished"
    );
    Ok(profiler)
}
