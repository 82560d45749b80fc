//! # Tessera Soak Test
//!
//! Drives the instance renderer on the headless backend for many frames
//! while a second thread plays the GPU, retiring each submission after a
//! fixed latency. Instances are spawned, moved and despawned at random every
//! frame, so compaction, overflow, growth and fence waits all get exercised.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=tessera_rendering=debug tessera_soak --frames 2000 --seed 7
//! ```

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tessera_core::{
    FieldId, FieldValue, InstanceRecord, InstanceSlot, LightRecord, MeshDesc, MeshId, StoreError,
};
use tessera_rendering::{
    GpuTimeline, HeadlessBackend, InstanceRenderer, RenderResult, TesseraConfig,
    DEFAULT_HEADLESS_ALIGNMENT,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Options {
    frames: u64,
    seed: u64,
    meshes: u32,
    max_instances: u32,
    gpu_latency_us: u64,
    config: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            frames: 1000,
            seed: 0x5EED,
            meshes: 24,
            max_instances: 512,
            gpu_latency_us: 500,
            config: None,
        }
    }
}

fn parse_args() -> Option<Options> {
    let args: Vec<String> = std::env::args().collect();
    let mut options = Options::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match args[i].as_str() {
            "--frames" | "-f" => {
                options.frames = value.and_then(|v| v.parse().ok()).unwrap_or(options.frames);
                i += 1;
            }
            "--seed" | "-s" => {
                options.seed = value.and_then(|v| v.parse().ok()).unwrap_or(options.seed);
                i += 1;
            }
            "--meshes" | "-m" => {
                options.meshes = value.and_then(|v| v.parse().ok()).unwrap_or(options.meshes);
                i += 1;
            }
            "--max-instances" => {
                options.max_instances = value
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(options.max_instances);
                i += 1;
            }
            "--gpu-latency-us" => {
                options.gpu_latency_us = value
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(options.gpu_latency_us);
                i += 1;
            }
            "--config" | "-c" => {
                options.config = value.cloned();
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: tessera_soak [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -f, --frames <N>           Frames to run (default: 1000)");
                println!("  -s, --seed <SEED>          RNG seed (default: 24301)");
                println!("  -m, --meshes <N>           Meshes to register (default: 24)");
                println!("      --max-instances <N>    Capacity per mesh (default: 512)");
                println!("      --gpu-latency-us <US>  Simulated GPU frame time (default: 500)");
                println!("  -c, --config <PATH>        TOML renderer config");
                println!("  -h, --help                 Show this help");
                return None;
            }
            other => tracing::warn!(argument = other, "ignoring unknown argument"),
        }
        i += 1;
    }
    Some(options)
}

/// Simulated GPU: retires every submission it is told about after `latency`.
fn gpu_thread(timeline: &GpuTimeline, submissions: &Receiver<u64>, latency: Duration) -> u64 {
    let mut retired = 0;
    for serial in submissions {
        thread::sleep(latency);
        timeline.retire_through(serial);
        retired += 1;
    }
    timeline.retire_all();
    retired
}

fn translation(x: f32, y: f32, z: f32) -> [f32; 16] {
    let mut m = tessera_core::IDENTITY;
    m[12] = x;
    m[13] = y;
    m[14] = z;
    m
}

struct Scene {
    meshes: Vec<(MeshId, Vec<InstanceSlot>)>,
    refused: u64,
    spawned: u64,
    despawned: u64,
}

impl Scene {
    fn churn(&mut self, renderer: &mut InstanceRenderer<HeadlessBackend>, rng: &mut ChaCha8Rng) {
        for (mesh, owners) in &mut self.meshes {
            let Some(store) = renderer.registry_mut().get_mut(*mesh) else {
                continue;
            };

            for _ in 0..rng.gen_range(0..24) {
                let slot = InstanceSlot::new();
                match store.acquire(&slot) {
                    Ok(index) => {
                        let x = rng.gen_range(-500.0..500.0);
                        let z = rng.gen_range(-500.0..500.0);
                        let written = if store.desc().layout.same_as(&tessera_core::LIGHT_LAYOUT) {
                            store.write_record(
                                index,
                                &LightRecord {
                                    intensity: rng.gen_range(0.5..4.0),
                                    world: translation(x, 8.0, z),
                                    ..LightRecord::default()
                                },
                            )
                        } else {
                            store.write_record(
                                index,
                                &InstanceRecord::new(
                                    translation(x, 0.0, z),
                                    translation(-x, 0.0, -z),
                                    tessera_core::IDENTITY,
                                )
                                .with_color([rng.gen(), rng.gen(), rng.gen(), 1.0]),
                            )
                        };
                        if let Err(err) = written {
                            tracing::error!(%err, mesh = %mesh, "record write failed");
                        }
                        owners.push(slot);
                        self.spawned += 1;
                    }
                    Err(StoreError::CapacityExceeded { .. }) => self.refused += 1,
                    Err(err) => tracing::error!(%err, mesh = %mesh, "acquire failed"),
                }
            }

            for _ in 0..rng.gen_range(0..24) {
                if owners.is_empty() {
                    break;
                }
                let victim = owners.swap_remove(rng.gen_range(0..owners.len()));
                store.release_slot(&victim);
                self.despawned += 1;
            }

            if let Some(owner) = owners.first() {
                if let Some(index) = owner.index() {
                    if let Err(err) = store.set_field(index, FieldId::Selected, FieldValue::U32(1)) {
                        tracing::error!(%err, mesh = %mesh, "select failed");
                    }
                }
            }
        }
    }
}

fn run(options: &Options) -> RenderResult<()> {
    let config = match &options.config {
        Some(path) => TesseraConfig::load(path)?,
        None => TesseraConfig::default(),
    };

    let timeline = GpuTimeline::manual();
    let backend = HeadlessBackend::with_timeline(DEFAULT_HEADLESS_ALIGNMENT, Arc::clone(&timeline));
    let mut renderer = InstanceRenderer::new(backend, &config)?;

    let mut scene = Scene {
        meshes: Vec::new(),
        refused: 0,
        spawned: 0,
        despawned: 0,
    };
    for m in 0..options.meshes {
        let desc = if m % 4 == 3 {
            MeshDesc::lights(format!("lights{m}"), options.max_instances)
        } else {
            MeshDesc::instances(format!("props{m}"), options.max_instances)
        };
        scene.meshes.push((renderer.registry_mut().register(desc), Vec::new()));
    }

    let (submit, submissions) = crossbeam_channel::bounded::<u64>(64);
    let gpu = {
        let timeline = Arc::clone(&timeline);
        let latency = Duration::from_micros(options.gpu_latency_us);
        thread::spawn(move || gpu_thread(&timeline, &submissions, latency))
    };

    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
    let started = Instant::now();
    let mut max_attempts = 0;

    for frame in 0..options.frames {
        scene.churn(&mut renderer, &mut rng);

        let stats = renderer.prepare_frame()?;
        max_attempts = max_attempts.max(stats.fence_wait_attempts);
        for (mesh, _) in &scene.meshes {
            // one draw per mesh; each draw rebinds the shared binding point
            let _ = renderer.bind_mesh(*mesh);
        }
        renderer.finish_frame()?;

        if submit.send(timeline.submitted()).is_err() {
            tracing::error!(frame, "gpu thread exited early");
            break;
        }
        renderer.backend_mut().take_events();

        if frame % 100 == 0 {
            let consistent = renderer
                .registry()
                .iter()
                .all(tessera_core::MeshInstanceStore::links_consistent);
            tracing::info!(
                frame,
                instances = renderer.registry().total_instances(),
                capacity = stats.atlas_capacity,
                utilization = stats.utilization(),
                consistent,
                "soak progress"
            );
        }
    }

    drop(submit);
    let retired = gpu.join().unwrap_or_else(|_| {
        tracing::error!("gpu thread panicked");
        0
    });

    let totals = renderer.stats();
    let elapsed = started.elapsed();
    let backend = renderer.shutdown();
    tracing::info!(
        frames = totals.frames,
        retired,
        overflow_frames = totals.overflow_frames,
        growth_events = totals.growth_events,
        fence_retries = totals.fence_retries,
        max_attempts,
        peak_bytes = totals.peak_bytes_uploaded,
        spawned = scene.spawned,
        despawned = scene.despawned,
        refused = scene.refused,
        leaked_buffers = backend.live_buffers(),
        elapsed_ms = elapsed.as_millis() as u64,
        "soak finished"
    );
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera_soak=info,tessera_rendering=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(options) = parse_args() else {
        return;
    };
    if let Err(err) = run(&options) {
        tracing::error!(%err, "soak failed");
        std::process::exit(1);
    }
}
