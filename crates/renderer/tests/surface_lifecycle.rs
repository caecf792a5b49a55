//! Release and re-acquire of surface-dependent resources.

mod support;

use streak_renderer::{FrameOutcome, FramePipeline};

use support::*;

fn destroyed(log: &Log) -> Vec<Res> {
    log.events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Destroyed(r) => Some(r),
            _ => None,
        })
        .collect()
}

fn created(log: &Log) -> Vec<Res> {
    log.events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Created(r) => Some(r),
            _ => None,
        })
        .collect()
}

#[test]
fn test_resize_releases_in_reverse_dependency_order() {
    let mut p = pipeline(3, extent(640, 480));
    p.render_one_frame(&constants()).unwrap();
    p.gpu().log().clear();

    p.on_resize(extent(800, 600)).unwrap();

    let log = p.gpu().log();
    assert_eq!(
        destroyed(log),
        [
            Res::Pipeline,
            Res::Layout,
            Res::Target(0),
            Res::Target(1),
            Res::Target(2),
            Res::Depth,
            Res::Depth,
            Res::Depth,
            Res::Ring,
        ]
    );
    assert_eq!(
        created(log),
        [
            Res::Ring,
            Res::Depth,
            Res::Depth,
            Res::Depth,
            Res::Target(0),
            Res::Target(1),
            Res::Target(2),
            Res::Layout,
            Res::Pipeline,
        ]
    );

    let events = log.events();
    let last_destroyed = events
        .iter()
        .rposition(|e| matches!(e, Event::Destroyed(_)))
        .unwrap();
    let first_created = events
        .iter()
        .position(|e| matches!(e, Event::Created(_)))
        .unwrap();
    let wait = events.iter().position(|e| *e == Event::WaitIdle).unwrap();
    assert!(wait < last_destroyed);
    assert!(last_destroyed < first_created);
}

#[test]
fn test_resize_leaves_nothing_in_flight() {
    let mut p = pipeline(3, extent(640, 480));
    for _ in 0..2 {
        p.render_one_frame(&constants()).unwrap();
    }
    assert_eq!(p.gpu().in_flight(), 2);

    p.on_resize(extent(800, 600)).unwrap();
    assert_eq!(p.gpu().in_flight(), 0);
}

#[test]
fn test_next_frame_uses_new_extent() {
    let mut p = pipeline(2, extent(1280, 720));
    p.render_one_frame(&constants()).unwrap();

    p.on_resize(extent(800, 600)).unwrap();
    assert_eq!(p.extent(), Some(extent(800, 600)));

    p.gpu().log().clear();
    p.render_one_frame(&constants()).unwrap();

    let submits = p.gpu().log().submits();
    let ops = &submits[0].1;
    assert!(ops.contains(&Op::Viewport(extent(800, 600))));
    assert!(ops.contains(&Op::BeginRendering(extent(800, 600))));
    assert!(!ops.contains(&Op::Viewport(extent(1280, 720))));
}

#[test]
fn test_surface_dictated_extent_wins() {
    let gpu = FakeGpu::new(2);
    gpu.controls().surface_extent = Some(extent(1024, 768));
    let encoder = FakeEncoder::new(gpu.log());
    let p = FramePipeline::new(gpu, Box::new(encoder), config(), extent(640, 480)).unwrap();

    assert_eq!(p.extent(), Some(extent(1024, 768)));
}

#[test]
fn test_zero_extent_skips_until_restored() {
    let mut p = pipeline(2, extent(640, 480));

    p.on_resize(extent(0, 0)).unwrap();
    assert_eq!(p.extent(), None);
    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::Skipped
    );
    assert!(p.gpu().log().submits().is_empty());

    p.on_resize(extent(640, 480)).unwrap();
    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::Presented
    );
}

#[test]
fn test_minimized_surface_recovers_on_its_own() {
    let mut p = pipeline(2, extent(640, 480));
    p.gpu().controls().surface_extent = Some(extent(0, 0));
    p.on_resize(extent(640, 480)).unwrap();

    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::Skipped
    );

    p.gpu().controls().surface_extent = None;
    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::SurfaceRecreated
    );
    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::Presented
    );
}

#[test]
fn test_ring_size_change_rebuilds_slots() {
    let mut p = pipeline(2, extent(640, 480));
    p.render_one_frame(&constants()).unwrap();
    assert_eq!(p.slot_count(), 2);

    p.gpu().controls().image_count = 3;
    p.on_resize(extent(640, 480)).unwrap();
    assert_eq!(p.slot_count(), 3);

    for _ in 0..9 {
        assert_eq!(
            p.render_one_frame(&constants()).unwrap(),
            FrameOutcome::Presented
        );
    }
    assert!(p.gpu().max_in_flight() <= 3);
    assert!(p.gpu().violations().is_empty());
}
