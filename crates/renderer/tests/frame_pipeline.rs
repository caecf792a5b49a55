//! Frame loop ordering and bounded in-flight work.

mod support;

use streak_renderer::FrameOutcome;
use streak_renderer::gpu::{AcquireStatus, PresentStatus};
use streak_rhi::vk;

use support::*;

#[test]
fn test_frames_in_flight_never_exceed_ring_size() {
    let mut p = pipeline(3, extent(640, 480));

    for _ in 0..20 {
        assert_eq!(
            p.render_one_frame(&constants()).unwrap(),
            FrameOutcome::Presented
        );
    }

    assert_eq!(p.slot_count(), 3);
    assert_eq!(p.gpu().max_in_flight(), 3);
    assert!(p.gpu().violations().is_empty(), "{:?}", p.gpu().violations());
}

#[test]
fn test_slot_reuse_waits_for_its_previous_frame() {
    let mut p = pipeline(2, extent(640, 480));
    for _ in 0..3 {
        p.render_one_frame(&constants()).unwrap();
    }

    let events = p.gpu().log().events();
    let submit_positions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::Submit { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(submit_positions.len(), 3);

    // The third frame reuses the first slot, so the first fence completes
    // between the second and third submissions
    let completed_before_third = events[..submit_positions[2]]
        .iter()
        .filter(|e| matches!(e, Event::FenceCompleted(_)))
        .count();
    assert_eq!(completed_before_third, 1);

    let submits = p.gpu().log().submits();
    assert_eq!(submits[0].0, submits[2].0);
    assert_ne!(submits[0].0, submits[1].0);
}

#[test]
fn test_command_list_without_capture() {
    let mut p = pipeline(2, extent(640, 480));
    p.render_one_frame(&constants()).unwrap();

    let submits = p.gpu().log().submits();
    let ops = &submits[0].1;
    let size = extent(640, 480);

    assert_eq!(ops.first(), Some(&Op::Begin));
    assert_eq!(ops.last(), Some(&Op::End));
    assert!(matches!(&ops[1], Op::Barrier(b) if b.len() == 2));
    assert_eq!(
        ops[2..9],
        [
            Op::BeginRendering(size),
            Op::BindPipeline,
            Op::BindDescriptorSet,
            Op::PushConstants(80),
            Op::Viewport(size),
            Op::Draw(PARTICLES),
            Op::EndRendering,
        ]
    );

    let Op::Barrier(tail) = &ops[ops.len() - 2] else {
        panic!("expected a present barrier, got {:?}", ops);
    };
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(tail[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    assert!(!ops.iter().any(|op| matches!(op, Op::Blit { .. } | Op::Copy { .. })));
}

#[test]
fn test_present_follows_submit() {
    let mut p = pipeline(2, extent(640, 480));
    p.render_one_frame(&constants()).unwrap();

    let log = p.gpu().log();
    let acquire = log.position(|e| matches!(e, Event::Acquire(_))).unwrap();
    let submit = log.position(|e| matches!(e, Event::Submit { .. })).unwrap();
    let present = log.position(|e| matches!(e, Event::Present(_))).unwrap();
    assert!(acquire < submit && submit < present);
}

#[test]
fn test_stop_refuses_further_frames() {
    let mut p = pipeline(2, extent(640, 480));
    p.render_one_frame(&constants()).unwrap();
    p.stop();

    assert!(p.is_stopped());
    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::Stopped
    );
    assert_eq!(p.gpu().log().submits().len(), 1);
}

#[test]
fn test_out_of_date_acquire_recreates_without_submitting() {
    let mut p = pipeline(2, extent(640, 480));
    p.gpu()
        .controls()
        .acquire_script
        .push_back(AcquireStatus::OutOfDate);
    p.gpu().log().clear();

    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::SurfaceRecreated
    );

    let log = p.gpu().log();
    assert!(log.submits().is_empty());
    let destroyed = log
        .position(|e| *e == Event::Destroyed(Res::Ring))
        .unwrap();
    let created = log.position(|e| *e == Event::Created(Res::Ring)).unwrap();
    assert!(destroyed < created);

    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::Presented
    );
}

#[test]
fn test_suboptimal_present_recreates_after_presenting() {
    let mut p = pipeline(2, extent(640, 480));
    p.gpu()
        .controls()
        .present_script
        .push_back(PresentStatus::Suboptimal);

    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::SurfaceRecreated
    );

    let log = p.gpu().log();
    let present = log.position(|e| matches!(e, Event::Present(_))).unwrap();
    let destroyed = log
        .position(|e| *e == Event::Destroyed(Res::Ring))
        .unwrap();
    assert!(present < destroyed);
    assert!(p.gpu().violations().is_empty());
}

#[test]
fn test_suboptimal_acquire_still_renders_the_frame() {
    let mut p = pipeline(2, extent(640, 480));
    p.gpu()
        .controls()
        .acquire_script
        .push_back(AcquireStatus::Ready {
            index: 1,
            suboptimal: true,
        });

    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::SurfaceRecreated
    );
    assert_eq!(p.gpu().log().count(&Event::Present(1)), 1);
}

#[test]
fn test_drop_waits_then_releases() {
    let p = pipeline(2, extent(640, 480));
    let log = p.gpu().log().clone();
    let mut p = p;
    p.render_one_frame(&constants()).unwrap();
    log.clear();

    drop(p);

    let wait = log.position(|e| *e == Event::WaitIdle).unwrap();
    let pipeline = log
        .position(|e| *e == Event::Destroyed(Res::Pipeline))
        .unwrap();
    let ring = log.position(|e| *e == Event::Destroyed(Res::Ring)).unwrap();
    assert!(wait < pipeline && pipeline < ring);
}

#[test]
fn test_unknown_image_index_replaces_consumed_ordering_pair() {
    let mut p = pipeline(2, extent(640, 480));
    p.gpu()
        .controls()
        .acquire_script
        .push_back(AcquireStatus::Ready {
            index: 7,
            suboptimal: false,
        });

    assert_eq!(
        p.render_one_frame(&constants()).unwrap(),
        FrameOutcome::SurfaceRecreated
    );
    assert!(p.gpu().log().submits().is_empty());

    for _ in 0..4 {
        assert_eq!(
            p.render_one_frame(&constants()).unwrap(),
            FrameOutcome::Presented
        );
    }
    assert!(p.gpu().violations().is_empty(), "{:?}", p.gpu().violations());
}
