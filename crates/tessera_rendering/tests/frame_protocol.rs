//! # Frame Protocol Tests
//!
//! End-to-end checks of the per-frame upload protocol on the headless
//! backend:
//!
//! 1. Atlas segments are aligned and packed with no gaps
//! 2. Growth is scheduled from demand and applied before the next sweep
//! 3. Ring slots are used round-robin and never written before their fence
//!    has signaled
//!
//! Run with: cargo test -p tessera_rendering --test frame_protocol

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tessera_core::{
    FieldId, FieldValue, InstanceSlot, MeshDesc, MeshId, MeshRegistry, INSTANCE_BINDING,
};
use tessera_rendering::{
    BackendEvent, FenceStatus, FenceWaitConfig, FrameAtlas, GpuTimeline, HeadlessBackend,
    InstanceRenderer, TesseraConfig,
};

/// Adds `count` instances to `mesh`, returning their owner slots.
fn spawn(registry: &mut MeshRegistry, mesh: MeshId, count: usize) -> Vec<InstanceSlot> {
    let store = registry.get_mut(mesh).unwrap();
    (0..count)
        .map(|i| {
            let slot = InstanceSlot::new();
            let index = store.acquire(&slot).unwrap();
            store
                .set_field(index, FieldId::Color, FieldValue::Vec4([i as f32; 4]))
                .unwrap();
            slot
        })
        .collect()
}

#[test]
fn aligned_sizes_sum_to_final_offset() {
    let mut rng = ChaCha8Rng::seed_from_u64(0xA71A5);

    for round in 0..50 {
        let alignment = [16u64, 64, 256][round % 3];
        let capacity = if round % 2 == 0 { 1 << 20 } else { 8 * 1024 };
        let mut registry = MeshRegistry::new();
        let mut owners = Vec::new();

        for m in 0..rng.gen_range(1..12) {
            let desc = if rng.gen_bool(0.5) {
                MeshDesc::instances(format!("mesh{m}"), 40)
            } else {
                MeshDesc::lights(format!("light{m}"), 40)
            };
            let mesh = registry.register(desc);
            let count = rng.gen_range(0..40);
            owners.extend(spawn(&mut registry, mesh, count));
        }

        let mut atlas = FrameAtlas::new(capacity, alignment);
        let report = atlas.assemble(&registry).unwrap();

        let mut expected_offset = 0;
        for segment in atlas.segments() {
            assert_eq!(segment.range.offset, expected_offset);
            assert_eq!(segment.range.offset % alignment, 0);
            assert_eq!(segment.range.size % alignment, 0);

            let store = registry.get(segment.mesh).unwrap();
            let records = store.instance_bytes();
            let start = segment.range.offset as usize;
            assert_eq!(&atlas.bytes()[start..start + records.len()], records);
            expected_offset += segment.range.size;
        }
        assert_eq!(expected_offset, report.used_bytes);
        assert_eq!(report.used_bytes, atlas.used());
        assert!(report.used_bytes <= capacity);
        assert_eq!(
            report.placed + report.skipped,
            registry.iter_active().count() as u32
        );
    }
}

#[test]
fn scenario_c_growth_applies_before_next_sweep() {
    let config = TesseraConfig {
        initial_atlas_capacity: 1_000_000,
        alignment: Some(16),
        ..TesseraConfig::default()
    };
    let mut renderer = InstanceRenderer::new(HeadlessBackend::default(), &config).unwrap();
    let mesh = renderer
        .registry_mut()
        .register(MeshDesc::instances("forest", 4000));
    // 3300 × 288 = 950,400 bytes
    let _trees = spawn(renderer.registry_mut(), mesh, 3300);

    let first = renderer.prepare_frame().unwrap();
    assert_eq!(first.bytes_uploaded, 950_400);
    assert_eq!(first.atlas_capacity, 1_000_000);
    assert_eq!(first.grown_to, None);
    assert_eq!(renderer.pending_growth(), Some(1_250_000));
    renderer.finish_frame().unwrap();

    renderer.backend_mut().take_events();
    let second = renderer.prepare_frame().unwrap();
    assert_eq!(second.grown_to, Some(1_250_000));
    assert_eq!(second.atlas_capacity, 1_250_000);
    assert_eq!(renderer.atlas_capacity(), 1_250_000);
    assert_eq!(renderer.pending_growth(), None);

    let recreated = renderer
        .backend()
        .events()
        .iter()
        .filter(|event| matches!(event, BackendEvent::BufferCreated { size: 1_250_000, persistent: true, .. }))
        .count();
    assert_eq!(recreated, 3);
    assert_eq!(renderer.backend().live_buffers(), 3);
    renderer.finish_frame().unwrap();
    assert_eq!(renderer.stats().growth_events, 1);
}

#[test]
fn overflowing_mesh_eventually_fits() {
    let config = TesseraConfig {
        initial_atlas_capacity: 1024,
        ..TesseraConfig::default()
    };
    let mut renderer = InstanceRenderer::new(HeadlessBackend::new(256), &config).unwrap();
    let big = renderer.registry_mut().register(MeshDesc::instances("big", 8));
    let small = renderer.registry_mut().register(MeshDesc::instances("small", 8));
    let _big = spawn(renderer.registry_mut(), big, 4);
    let _small = spawn(renderer.registry_mut(), small, 1);

    let mut frames = 0;
    loop {
        let stats = renderer.prepare_frame().unwrap();
        renderer.finish_frame().unwrap();
        frames += 1;
        if !stats.overflowed() {
            break;
        }
        assert!(frames < 10, "mesh still skipped after {frames} frames");
    }

    renderer.prepare_frame().unwrap();
    assert!(renderer.segment(big).is_some());
    assert!(renderer.segment(small).is_some());
    assert!(renderer.stats().overflow_frames > 0);
    renderer.finish_frame().unwrap();
}

/// Index of the first event matching `pred`.
fn position(events: &[BackendEvent], pred: impl Fn(&BackendEvent) -> bool) -> Option<usize> {
    events.iter().position(pred)
}

#[test]
fn scenario_d_slots_wait_for_their_fence() {
    let timeline = GpuTimeline::manual();
    let backend = HeadlessBackend::with_timeline(256, Arc::clone(&timeline));
    let config = TesseraConfig {
        initial_atlas_capacity: 4096,
        ..TesseraConfig::default()
    };
    let mut renderer = InstanceRenderer::new(backend, &config).unwrap();
    let mesh = renderer.registry_mut().register(MeshDesc::instances("props", 4));
    let _props = spawn(renderer.registry_mut(), mesh, 2);

    for frame in 0..9u64 {
        renderer.backend_mut().take_events();

        let gpu = (frame >= 3).then(|| {
            let timeline = Arc::clone(&timeline);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                timeline.retire_next()
            })
        });

        let stats = renderer.prepare_frame().unwrap();
        assert_eq!(stats.frame, frame);
        assert_eq!(stats.slot, (frame % 3) as usize);

        let events = renderer.backend().events();
        let slot_buffer = frame % 3;
        let mapped = position(events, |event| {
            matches!(event, BackendEvent::Mapped { buffer, .. } if *buffer == slot_buffer)
        })
        .expect("atlas uploaded into the frame's slot");

        if frame >= 3 {
            // the fence recorded when this slot was last written, frame - 3
            let serial = frame - 2;
            let signaled = position(events, |event| {
                *event
                    == BackendEvent::FenceWaited {
                        serial,
                        status: FenceStatus::Signaled,
                    }
            })
            .expect("previous fence observed signaled");
            assert!(signaled < mapped);
            assert!(timeline.completed() >= serial);
            assert!(stats.fence_wait_attempts >= 1);
        } else {
            assert_eq!(stats.fence_wait_attempts, 0);
        }

        let bound = renderer.bind_mesh(mesh).expect("props drawn every frame");
        assert_eq!(
            renderer.backend().binding(INSTANCE_BINDING),
            Some((slot_buffer, bound))
        );
        renderer.finish_frame().unwrap();
        if let Some(gpu) = gpu {
            assert!(gpu.join().unwrap());
        }
    }
}

#[test]
fn stalled_fence_is_retried_until_signaled() {
    let timeline = GpuTimeline::manual();
    let backend = HeadlessBackend::with_timeline(256, Arc::clone(&timeline));
    let config = TesseraConfig {
        ring_slots: 1,
        fence: FenceWaitConfig {
            attempt_timeout_ns: 200_000,
            warn_every_attempts: 4,
        },
        ..TesseraConfig::default()
    };
    let mut renderer = InstanceRenderer::new(backend, &config).unwrap();
    renderer.prepare_frame().unwrap();
    renderer.finish_frame().unwrap();

    let gpu = {
        let timeline = Arc::clone(&timeline);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            timeline.fail_next_waits(2);
            thread::sleep(Duration::from_millis(5));
            timeline.retire_all();
        })
    };
    let stats = renderer.prepare_frame().unwrap();
    gpu.join().unwrap();

    assert!(stats.stalled());
    assert_eq!(timeline.pending(), 0);
    assert_eq!(
        renderer.stats().fence_retries,
        u64::from(stats.fence_wait_attempts - 1)
    );
    renderer.finish_frame().unwrap();
}
