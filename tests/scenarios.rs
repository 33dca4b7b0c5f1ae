//! End-to-end kernel scenarios.
//!
//! Each test drives the public surface the way an embedder would: open a
//! region, spawn work, run the scheduler under a budget, and check the
//! resulting events, outcomes, traces, and snapshots.

use lockstep::test_logging::init_test_logging;
use lockstep::{
    Budget, CancelKind, Handle, HandleKind, Kernel, Outcome, RegionState, ReplayResult,
    SchedEventKind, Status, TaskState,
};

fn sched_events(kernel: &Kernel) -> Vec<lockstep::SchedEvent> {
    (0..lockstep::SCHED_RING_CAPACITY)
        .map_while(|i| kernel.scheduler_event_get(i))
        .collect()
}

#[test]
fn skeleton_noop() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let region = kernel.region_open().expect("open");
    let task = kernel.task_spawn(region, |_cx| Status::Ok).expect("spawn");

    kernel
        .scheduler_run(region, &mut Budget::INFINITE)
        .expect("run");

    let events = sched_events(&kernel);
    assert_eq!(events.len(), 3);
    assert_eq!(
        (events[0].kind, events[0].sequence, events[0].round),
        (SchedEventKind::Poll, 0, 0)
    );
    assert_eq!(
        (events[1].kind, events[1].sequence, events[1].round),
        (SchedEventKind::Complete, 1, 0)
    );
    assert_eq!(
        (events[2].kind, events[2].sequence, events[2].round),
        (SchedEventKind::Quiescent, 2, 0)
    );
    assert_eq!(kernel.task_get_state(task), Ok(TaskState::Completed));
    assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Ok));
}

#[test]
fn countdown_three_pendings_then_ok() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let region = kernel.region_open().expect("open");
    let task = kernel
        .task_spawn_captured(region, 3u32, |remaining, _cx| {
            if *remaining == 0 {
                Status::Ok
            } else {
                *remaining -= 1;
                Status::Pending
            }
        })
        .expect("spawn");

    kernel
        .scheduler_run(region, &mut Budget::INFINITE)
        .expect("run");

    let events = sched_events(&kernel);
    let polls: Vec<_> = events
        .iter()
        .filter(|e| e.kind == SchedEventKind::Poll)
        .collect();
    assert_eq!(polls.len(), 4);
    for (round, poll) in polls.iter().enumerate() {
        assert_eq!(poll.round, round as u32);
    }
    assert_eq!(events[4].kind, SchedEventKind::Complete);
    assert_eq!(events[4].sequence, 4);
    assert_eq!(events[5].kind, SchedEventKind::Quiescent);
    assert_eq!(events[5].sequence, 5);
    assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Ok));
}

#[test]
fn budget_exhaustion_and_resume() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let region = kernel.region_open().expect("open");
    let task = kernel
        .task_spawn(region, |_cx| Status::Pending)
        .expect("spawn");

    let mut budget = Budget::new().with_poll_quota(3);
    assert_eq!(
        kernel.scheduler_run(region, &mut budget),
        Err(Status::PollBudgetExhausted)
    );

    let events = sched_events(&kernel);
    let polls = events
        .iter()
        .filter(|e| e.kind == SchedEventKind::Poll)
        .count();
    assert_eq!(polls, 3);
    assert_eq!(events.last().expect("event").kind, SchedEventKind::Budget);
    assert_ne!(kernel.task_get_state(task), Ok(TaskState::Completed));

    // A subsequent run continues from the current round.
    let mut budget = Budget::new().with_poll_quota(1);
    assert_eq!(
        kernel.scheduler_run(region, &mut budget),
        Err(Status::PollBudgetExhausted)
    );
    let events = sched_events(&kernel);
    let resumed = events
        .iter()
        .find(|e| e.sequence == 4)
        .expect("resumed poll");
    assert_eq!(resumed.kind, SchedEventKind::Poll);
    assert_eq!(resumed.round, 3);
}

#[test]
fn cooperative_cancel() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let region = kernel.region_open().expect("open");
    let task = kernel
        .task_spawn(region, |cx| {
            if cx.checkpoint().cancelled {
                Status::Ok
            } else {
                Status::Pending
            }
        })
        .expect("spawn");

    let mut one_poll = Budget::new().with_poll_quota(1);
    let _ = kernel.scheduler_run(region, &mut one_poll);
    assert_eq!(kernel.task_get_state(task), Ok(TaskState::Running));

    kernel.task_cancel(task, CancelKind::User).expect("cancel");
    kernel
        .scheduler_run(region, &mut Budget::INFINITE)
        .expect("run");

    assert_eq!(kernel.task_get_state(task), Ok(TaskState::Completed));
    assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Cancelled));
    let events = sched_events(&kernel);
    let n = events.len();
    assert_eq!(events[n - 2].kind, SchedEventKind::Complete);
    assert_eq!(events[n - 1].kind, SchedEventKind::Quiescent);
}

#[test]
fn deadline_miss_with_stubborn_task() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let region = kernel.region_open().expect("open");
    let task = kernel
        .task_spawn(region, |cx| {
            let _ = cx.checkpoint();
            Status::Pending
        })
        .expect("spawn");

    let mut one_poll = Budget::new().with_poll_quota(1);
    let _ = kernel.scheduler_run(region, &mut one_poll);

    kernel
        .task_cancel(task, CancelKind::Shutdown)
        .expect("cancel");
    kernel
        .scheduler_run(region, &mut Budget::new().with_poll_quota(200))
        .expect("run");

    let events = sched_events(&kernel);
    let forced = events
        .iter()
        .find(|e| e.kind == SchedEventKind::CancelForced)
        .expect("forced completion");
    assert_eq!(forced.task, task.to_bits());
    // Forced within the shutdown cleanup budget of 50 polls after the
    // cancel (sequence 0..=1 belong to the pre-cancel run).
    let polls_after_cancel = events
        .iter()
        .filter(|e| e.kind == SchedEventKind::Poll && e.sequence >= 2)
        .count();
    assert!(polls_after_cancel <= 50, "{polls_after_cancel} polls");
    assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Cancelled));
}

#[test]
fn cancel_storm_sixteen_tasks() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let region = kernel.region_open().expect("open");
    let mut tasks = Vec::new();
    for _ in 0..16 {
        tasks.push(
            kernel
                .task_spawn(region, |cx| {
                    if cx.checkpoint().cancelled {
                        Status::Ok
                    } else {
                        Status::Pending
                    }
                })
                .expect("spawn"),
        );
    }

    let moved = kernel
        .cancel_propagate(region, CancelKind::Shutdown)
        .expect("propagate");
    assert_eq!(moved, 16);

    kernel
        .scheduler_run(region, &mut Budget::new().with_poll_quota(1024))
        .expect("run");
    for task in tasks {
        assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Cancelled));
    }
    kernel.quiescence_check(region).expect("quiescent");
}

/// The canonical deterministic scenario used by the replay tests.
fn run_scenario_a(kernel: &mut Kernel) {
    let region = kernel.region_open().expect("open");
    kernel
        .task_spawn_captured(region, 2u32, |remaining, _cx| {
            if *remaining == 0 {
                Status::Ok
            } else {
                *remaining -= 1;
                Status::Pending
            }
        })
        .expect("spawn");
    kernel.task_spawn(region, |_cx| Status::Ok).expect("spawn");
    kernel
        .region_drain(region, &mut Budget::INFINITE)
        .expect("drain");
}

fn run_scenario_b(kernel: &mut Kernel) {
    let region = kernel.region_open().expect("open");
    kernel.task_spawn(region, |_cx| Status::Ok).expect("spawn");
    kernel
        .region_drain(region, &mut Budget::INFINITE)
        .expect("drain");
}

#[test]
fn replay_continuity() {
    init_test_logging();
    let mut kernel = Kernel::new();
    run_scenario_a(&mut kernel);
    let export = kernel.trace_export_binary();
    assert_eq!(kernel.trace_continuity_check(&export), Ok(()));

    // Reset, install the artifact as the reference, and reproduce the run.
    kernel.reset();
    kernel.trace_import_binary(&export).expect("import");
    run_scenario_a(&mut kernel);
    let report = kernel.replay_verify();
    assert_eq!(report.result, ReplayResult::Match);

    // A different scenario diverges from the artifact.
    kernel.reset();
    run_scenario_b(&mut kernel);
    assert_eq!(
        kernel.trace_continuity_check(&export),
        Err(Status::ReplayMismatch)
    );
}

#[test]
fn two_identical_runs_have_identical_evidence() {
    init_test_logging();
    let mut first = Kernel::new();
    let mut second = Kernel::new();
    run_scenario_a(&mut first);
    run_scenario_a(&mut second);

    assert_eq!(first.trace_event_count(), second.trace_event_count());
    assert_eq!(first.scheduler_event_count(), second.scheduler_event_count());
    assert_eq!(first.trace_digest(), second.trace_digest());
    assert_eq!(first.trace_export_binary(), second.trace_export_binary());
}

#[test]
fn stale_handle_across_slot_recycle() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let first = kernel.region_open().expect("open");
    kernel
        .region_drain(first, &mut Budget::INFINITE)
        .expect("drain");

    let second = kernel.region_open().expect("open");
    assert_eq!(first.slot(), second.slot(), "slot is reused");

    // Every mutating operation distinguishes stale from missing.
    assert_eq!(kernel.region_close(first), Err(Status::StaleHandle));
    assert_eq!(kernel.region_poison(first), Err(Status::StaleHandle));
    assert_eq!(
        kernel.region_drain(first, &mut Budget::INFINITE),
        Err(Status::StaleHandle)
    );
    assert_eq!(
        kernel.task_spawn(first, |_cx| Status::Ok).err(),
        Some(Status::StaleHandle)
    );
    assert_eq!(kernel.obligation_reserve(first), Err(Status::StaleHandle));
}

#[test]
fn crafted_handle_with_wrong_tag_is_not_found() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let region = kernel.region_open().expect("open");
    let task = kernel
        .task_spawn(region, |_cx| Status::Pending)
        .expect("spawn");

    // Correct slot and generation, wrong type tag.
    let crafted_region = Handle::pack(
        HandleKind::CancelWitness,
        0xffff,
        region.slot(),
        region.generation(),
    );
    assert_eq!(kernel.region_get_state(crafted_region), Err(Status::NotFound));
    assert_eq!(kernel.region_is_poisoned(crafted_region), Err(Status::NotFound));
    assert_eq!(kernel.region_close(crafted_region), Err(Status::NotFound));

    let crafted_task = Handle::pack(HandleKind::Obligation, 0xffff, task.slot(), task.generation());
    assert_eq!(kernel.task_get_state(crafted_task), Err(Status::NotFound));
    assert_eq!(kernel.task_get_outcome(crafted_task), Err(Status::NotFound));
    assert_eq!(
        kernel.task_cancel(crafted_task, CancelKind::User),
        Err(Status::NotFound)
    );
    assert_eq!(kernel.obligation_get_state(crafted_task), Err(Status::NotFound));
}

#[test]
fn poison_containment_isolates_regions() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let poisoned = kernel.region_open().expect("open");
    let healthy = kernel.region_open().expect("open");

    kernel.region_poison(poisoned).expect("poison");
    assert_eq!(
        kernel.task_spawn(poisoned, |_cx| Status::Ok).err(),
        Some(Status::RegionPoisoned)
    );
    assert_eq!(kernel.region_close(poisoned), Err(Status::RegionPoisoned));
    assert_eq!(
        kernel.obligation_reserve(poisoned),
        Err(Status::RegionPoisoned)
    );
    // Read-only queries survive.
    assert_eq!(kernel.region_get_state(poisoned), Ok(RegionState::Open));
    assert_eq!(kernel.region_is_poisoned(poisoned), Ok(true));

    // Other regions are unaffected.
    let task = kernel.task_spawn(healthy, |_cx| Status::Ok).expect("spawn");
    kernel
        .scheduler_run(healthy, &mut Budget::INFINITE)
        .expect("run");
    assert_eq!(kernel.task_get_outcome(task), Ok(Outcome::Ok));
}

#[test]
fn snapshot_digest_stability() {
    init_test_logging();
    let mut first = Kernel::new();
    let mut second = Kernel::new();
    run_scenario_a(&mut first);
    run_scenario_a(&mut second);

    let a = first.snapshot_capture();
    let b = second.snapshot_capture();
    assert_eq!(a, b, "equivalent runs produce byte-identical snapshots");
    assert_eq!(Kernel::snapshot_digest(&a), Kernel::snapshot_digest(&b));

    // A divergent run produces a different digest.
    let mut third = Kernel::new();
    run_scenario_b(&mut third);
    assert_ne!(
        Kernel::snapshot_digest(&first.snapshot_capture()),
        Kernel::snapshot_digest(&third.snapshot_capture())
    );
}

#[test]
fn snapshot_reflects_kernel_state() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let region = kernel.region_open().expect("open");
    let _task = kernel.task_spawn(region, |_cx| Status::Ok).expect("spawn");
    let obligation = kernel.obligation_reserve(region).expect("reserve");
    kernel.obligation_commit(obligation).expect("commit");
    kernel
        .scheduler_run(region, &mut Budget::INFINITE)
        .expect("run");

    let doc = kernel.snapshot_capture();
    let value: serde_json::Value = serde_json::from_str(&doc).expect("valid json");
    assert_eq!(value["regions"][0]["state"], "open");
    assert_eq!(value["regions"][0]["poisoned"], false);
    assert_eq!(value["tasks"][0]["state"], "completed");
    assert_eq!(value["tasks"][0]["outcome"], "ok");
    assert_eq!(value["obligations"][0]["state"], "committed");
    assert_eq!(value["scheduler"]["event_count"], 3);
    assert_eq!(value["trace"]["digest"], kernel.trace_digest());
}

#[test]
fn deterministic_hooks_give_identical_entropy_streams() {
    init_test_logging();
    use lockstep::{DetEntropy, GhostReactor, Hooks, LogicalClock, RuntimeConfig};
    use std::sync::Arc;

    let build = || {
        let mut kernel =
            Kernel::with_config(RuntimeConfig::default().with_deterministic(true));
        let mut hooks = Hooks::init();
        hooks.logical_clock = Some(Arc::new(LogicalClock::new(0, 100)));
        hooks.reactor = Some(Arc::new(GhostReactor));
        hooks.entropy = Some(Arc::new(DetEntropy::new(0xfeed)));
        hooks.deterministic_seeded_prng = true;
        kernel.set_hooks(hooks).expect("hooks");
        kernel
    };

    let mut first = build();
    let mut second = build();
    for _ in 0..16 {
        assert_eq!(
            first.runtime_random_u64().expect("entropy"),
            second.runtime_random_u64().expect("entropy")
        );
        assert_eq!(
            first.runtime_now_ns().expect("clock"),
            second.runtime_now_ns().expect("clock")
        );
    }
    assert_eq!(first.hindsight_digest(), second.hindsight_digest());
    assert_eq!(first.trace_digest(), second.trace_digest());
}

#[test]
fn drain_joins_task_outcomes_and_blocks_reopened_work() {
    init_test_logging();
    let mut kernel = Kernel::new();
    let region = kernel.region_open().expect("open");
    kernel.task_spawn(region, |_cx| Status::Ok).expect("spawn");
    kernel
        .region_drain(region, &mut Budget::INFINITE)
        .expect("drain");
    assert_eq!(kernel.region_get_state(region), Ok(RegionState::Closed));
    // A closed region admits nothing.
    assert_eq!(
        kernel.task_spawn(region, |_cx| Status::Ok).err(),
        Some(Status::RegionClosed)
    );
}
