//! Coordinator Module Tests
//!
//! ## Test Scopes
//! - **Fleet lifecycle**: registration, argument validation, seeding, restarts.
//! - **Assignment**: mutual exclusion, scan pointer monotonicity, bounds.
//! - **Release**: idempotent completion, NotFound/Empty outcomes.
//! - **Stop**: flag, `Halt` delivery, parked members and their return on clear.
//! - **Cooldown**: absorbing duplicate triggers, resume delivery, abort on stop.
//! - **Mailboxes**: backoff delivery to a mailbox that opens late.

#[cfg(test)]
mod tests {
    use crate::config::FleetConfig;
    use crate::coordinator::mailbox::{DeliveryError, Mailboxes};
    use crate::coordinator::types::*;
    use crate::coordinator::{CooldownPhase, Coordinator};
    use crate::events::{EventBus, EventLevel};
    use crate::store::{MemoryStore, PersistentStore};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn coordinator_with(config: FleetConfig) -> Arc<Coordinator> {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new());
        Coordinator::new(store, config, EventBus::new())
    }

    fn coordinator() -> Arc<Coordinator> {
        coordinator_with(FleetConfig::default())
    }

    async fn assigned(coordinator: &Coordinator, worker: &WorkerId) -> ItemId {
        match coordinator.request_work(worker).await.unwrap() {
            Assignment::Assigned(item) => item,
            Assignment::Done => panic!("{} got Done", worker),
        }
    }

    // ============================================================
    // TEST 1: Fleet lifecycle
    // ============================================================

    #[tokio::test]
    async fn test_start_fleet_registers_initializing_workers() {
        // ARRANGE
        let coordinator = coordinator();

        // ACT
        let records = coordinator
            .start_fleet(3, ItemId(1), Some(ItemId(10)), Vec::new())
            .await
            .unwrap();

        // ASSERT
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, WorkerId("worker-1".to_string()));
        assert!(records.iter().all(|r| r.status == WorkerStatus::Initializing));

        let contexts: HashSet<_> = records.iter().map(|r| r.context.clone()).collect();
        assert_eq!(contexts.len(), 3, "every worker gets its own context");

        let registry = coordinator.registry().await.unwrap();
        assert_eq!(registry.scan_pointer, ItemId(1));
        assert_eq!(registry.workers.len(), 3);
        assert!(!coordinator.flags().await.unwrap().stop_requested);
    }

    #[tokio::test]
    async fn test_start_fleet_rejects_bad_arguments() {
        let coordinator = coordinator();

        assert!(coordinator.start_fleet(0, ItemId(1), None, Vec::new()).await.is_err());
        assert!(coordinator.start_fleet(1, ItemId(0), None, Vec::new()).await.is_err());
        assert!(
            coordinator
                .start_fleet(1, ItemId(5), Some(ItemId(4)), Vec::new())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_start_fleet_seeds_completed_set() {
        // ARRANGE
        let coordinator = coordinator();
        let seed = vec![(ItemId(1), Some("item-1".to_string())), (ItemId(2), None)];

        // ACT
        let records = coordinator
            .start_fleet(1, ItemId(1), Some(ItemId(5)), seed)
            .await
            .unwrap();
        let first = assigned(&coordinator, &records[0].id).await;

        // ASSERT: seeded ids are never handed out
        assert_eq!(first, ItemId(3));
        let registry = coordinator.registry().await.unwrap();
        assert_eq!(registry.item_status(ItemId(1)), ItemStatus::Completed);
        assert_eq!(
            registry.completed[&ItemId(1)].output_ref.as_deref(),
            Some("item-1")
        );
    }

    #[tokio::test]
    async fn test_start_fleet_over_live_fleet_halts_old_workers() {
        // ARRANGE
        let coordinator = coordinator();
        let old = coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let mut old_mailbox = coordinator.open_mailbox(&old[0].id);
        assigned(&coordinator, &old[0].id).await;

        // ACT
        let new = coordinator
            .start_fleet(2, ItemId(1), None, Vec::new())
            .await
            .unwrap();

        // ASSERT
        assert_eq!(old_mailbox.recv().await, Some(Directive::Halt));
        let registry = coordinator.registry().await.unwrap();
        assert!(registry.locks.is_empty());
        assert_eq!(registry.workers.len(), 2);
        assert!(registry.worker_by_context(&old[0].context).is_none());
        assert!(registry.worker_by_context(&new[1].context).is_some());
        assert!(!coordinator.flags().await.unwrap().stop_requested);
    }

    #[tokio::test]
    async fn test_get_assignment_finds_worker_by_context() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(2, ItemId(1), None, Vec::new())
            .await
            .unwrap();

        // ACT
        let found = coordinator.get_assignment(&records[1].context).await.unwrap();
        let unknown = coordinator.get_assignment(&ContextId::new()).await.unwrap();

        // ASSERT
        assert_eq!(found.map(|r| r.id), Some(records[1].id.clone()));
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_worker_lifecycle_hooks() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(2, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let (first, second) = (&records[0].id, &records[1].id);

        // ACT
        coordinator.acknowledge_init(first).await.unwrap();
        let item = assigned(&coordinator, second).await;
        let _mailbox = coordinator.open_mailbox(second);
        coordinator.report_fatal(second, "login rejected").await.unwrap();
        coordinator.retire_worker(first).await.unwrap();

        // ASSERT
        let registry = coordinator.registry().await.unwrap();
        assert!(!registry.workers.contains_key(first));
        assert_eq!(registry.workers[second].status, WorkerStatus::Failed);
        assert_eq!(registry.locks[&item].holder, *second, "fatal keeps the lock");
        assert!(!coordinator.mailboxes.is_open(second));

        let errors: Vec<_> = coordinator
            .events()
            .recent()
            .into_iter()
            .filter(|e| e.level == EventLevel::Error)
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("login rejected"));
    }

    // ============================================================
    // TEST 2: Assignment
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_never_share_an_id() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(4, ItemId(1), Some(ItemId(40)), Vec::new())
            .await
            .unwrap();

        // ACT: every worker grabs ids as fast as it can
        let mut tasks = Vec::new();
        for record in records {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                while let Assignment::Assigned(item) =
                    coordinator.request_work(&record.id).await.unwrap()
                {
                    mine.push(item);
                }
                mine
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }

        // ASSERT
        let distinct: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 40);
        assert_eq!(distinct.len(), 40, "an id was handed out twice");
    }

    #[tokio::test]
    async fn test_scan_pointer_never_moves_backwards() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(2, ItemId(1), Some(ItemId(20)), Vec::new())
            .await
            .unwrap();
        let (a, b) = (&records[0].id, &records[1].id);

        // ACT / ASSERT
        let mut last = coordinator.registry().await.unwrap().scan_pointer;
        for round in 0..6 {
            let worker = if round % 2 == 0 { a } else { b };
            let item = assigned(&coordinator, worker).await;
            if round % 3 == 0 {
                coordinator.release_not_found(worker, item).await.unwrap();
            }

            let pointer = coordinator.registry().await.unwrap().scan_pointer;
            assert!(pointer >= last);
            assert_eq!(Some(pointer), item.next());
            last = pointer;
        }
    }

    #[tokio::test]
    async fn test_request_work_hands_out_ids_in_order() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(2, ItemId(1), Some(ItemId(3)), Vec::new())
            .await
            .unwrap();
        let (a, b) = (&records[0].id, &records[1].id);
        assert_eq!(assigned(&coordinator, a).await, ItemId(1));

        // ACT
        let for_b = assigned(&coordinator, b).await;
        let for_a = assigned(&coordinator, a).await;

        // ASSERT
        assert_eq!(for_b, ItemId(2));
        assert_eq!(for_a, ItemId(3));
        assert_eq!(coordinator.request_work(b).await.unwrap(), Assignment::Done);
    }

    #[tokio::test]
    async fn test_request_work_done_past_max_id() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(1, ItemId(4), Some(ItemId(5)), Vec::new())
            .await
            .unwrap();
        let worker = &records[0].id;

        // ACT
        let first = assigned(&coordinator, worker).await;
        let second = assigned(&coordinator, worker).await;
        let third = coordinator.request_work(worker).await.unwrap();

        // ASSERT
        assert_eq!((first, second), (ItemId(4), ItemId(5)));
        assert_eq!(third, Assignment::Done);
        let registry = coordinator.registry().await.unwrap();
        assert_eq!(registry.workers[worker].status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_request_work_respects_probe_limit() {
        // ARRANGE: everything ahead of the pointer is already done
        let config = FleetConfig {
            probe_limit: 5,
            ..Default::default()
        };
        let coordinator = coordinator_with(config);
        let seed = (1..=10).map(|id| (ItemId(id), None)).collect();
        let records = coordinator
            .start_fleet(1, ItemId(1), None, seed)
            .await
            .unwrap();

        // ACT
        let answer = coordinator.request_work(&records[0].id).await.unwrap();

        // ASSERT
        assert_eq!(answer, Assignment::Done);
    }

    #[tokio::test]
    async fn test_request_work_at_end_of_id_space() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(1, ItemId(u64::MAX - 1), None, Vec::new())
            .await
            .unwrap();
        let worker = &records[0].id;

        // ACT
        let first = assigned(&coordinator, worker).await;
        coordinator
            .complete_work(worker, first, Outcome::Success, None)
            .await
            .unwrap();
        let last = assigned(&coordinator, worker).await;
        coordinator
            .complete_work(worker, last, Outcome::Success, None)
            .await
            .unwrap();
        let exhausted = coordinator.request_work(worker).await.unwrap();

        // ASSERT
        assert_eq!((first, last), (ItemId(u64::MAX - 1), ItemId(u64::MAX)));
        assert_eq!(exhausted, Assignment::Done);
        let registry = coordinator.registry().await.unwrap();
        assert_eq!(registry.scan_pointer, ItemId(u64::MAX));
    }

    #[tokio::test]
    async fn test_request_work_with_max_id_at_end_of_id_space() {
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(1, ItemId(u64::MAX), Some(ItemId(u64::MAX)), Vec::new())
            .await
            .unwrap();
        let worker = &records[0].id;

        let item = assigned(&coordinator, worker).await;
        coordinator.release_not_found(worker, item).await.unwrap();

        assert_eq!(item, ItemId(u64::MAX));
        assert_eq!(coordinator.request_work(worker).await.unwrap(), Assignment::Done);
    }

    #[tokio::test]
    async fn test_request_work_from_unknown_worker_is_done() {
        let coordinator = coordinator();
        coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();

        let answer = coordinator
            .request_work(&WorkerId("worker-99".to_string()))
            .await
            .unwrap();

        assert_eq!(answer, Assignment::Done);
    }

    // ============================================================
    // TEST 3: Release
    // ============================================================

    #[tokio::test]
    async fn test_complete_work_is_idempotent() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let worker = &records[0].id;
        let item = assigned(&coordinator, worker).await;

        // ACT
        for _ in 0..3 {
            coordinator
                .complete_work(worker, item, Outcome::Success, Some("item-1".to_string()))
                .await
                .unwrap();
        }

        // ASSERT
        let registry = coordinator.registry().await.unwrap();
        assert_eq!(registry.completed.len(), 1);
        assert!(registry.locks.is_empty());
        assert_eq!(registry.workers[worker].status, WorkerStatus::Idle);
        assert_eq!(registry.item_status(item), ItemStatus::Completed);
    }

    #[tokio::test]
    async fn test_release_outcomes_free_without_completing() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let worker = &records[0].id;
        let missing = assigned(&coordinator, worker).await;
        let empty = assigned(&coordinator, worker).await;

        // ACT
        coordinator.release_not_found(worker, missing).await.unwrap();
        coordinator.release_empty(worker, empty).await.unwrap();

        // ASSERT
        let registry = coordinator.registry().await.unwrap();
        assert!(registry.completed.is_empty());
        assert!(registry.locks.is_empty());
        assert_eq!(registry.item_status(missing), ItemStatus::NotFound);
        assert_eq!(registry.item_status(empty), ItemStatus::Empty);

        let snapshot = coordinator.snapshot().await.unwrap();
        assert_eq!(snapshot.not_found, vec![missing]);
        assert_eq!(snapshot.empty, vec![empty]);
    }

    #[tokio::test]
    async fn test_complete_work_ignores_item_locked_by_another_worker() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(2, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let (holder, intruder) = (&records[0].id, &records[1].id);
        let item = assigned(&coordinator, holder).await;

        // ACT
        coordinator
            .complete_work(intruder, item, Outcome::Success, None)
            .await
            .unwrap();

        // ASSERT
        let registry = coordinator.registry().await.unwrap();
        assert_eq!(registry.locks[&item].holder, *holder);
        assert!(registry.completed.is_empty());
    }

    // ============================================================
    // TEST 4: Stop
    // ============================================================

    #[tokio::test]
    async fn test_broadcast_stop_halts_and_parks_workers() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(2, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let mut mailbox = coordinator.open_mailbox(&records[0].id);
        let item = assigned(&coordinator, &records[0].id).await;

        // ACT
        coordinator.broadcast_stop().await.unwrap();
        coordinator.broadcast_stop().await.unwrap();

        // ASSERT
        assert_eq!(mailbox.recv().await, Some(Directive::Halt));
        assert_eq!(mailbox.recv().await, None, "mailbox closed after stop");

        let registry = coordinator.registry().await.unwrap();
        assert_eq!(registry.workers.len(), 2);
        assert!(
            registry
                .workers
                .values()
                .all(|record| record.status == WorkerStatus::Stopped)
        );
        assert_eq!(registry.workers[&records[0].id].current_item, Some(item));
        assert_eq!(registry.locks[&item].holder, records[0].id);
        assert!(coordinator.flags().await.unwrap().stop_requested);
        assert_eq!(
            coordinator.request_work(&records[1].id).await.unwrap(),
            Assignment::Done
        );
    }

    #[tokio::test]
    async fn test_clear_stop_brings_parked_workers_back() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(2, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let (holder, idle) = (&records[0].id, &records[1].id);
        let item = assigned(&coordinator, holder).await;
        coordinator.broadcast_stop().await.unwrap();

        // ACT
        coordinator.clear_stop().await.unwrap();
        let next = coordinator.request_work(idle).await.unwrap();

        // ASSERT
        let record = coordinator
            .get_assignment(&records[0].context)
            .await
            .unwrap()
            .expect("stopped worker is still a member");
        assert_eq!(record.status, WorkerStatus::Working);
        assert_eq!(record.current_item, Some(item));
        assert_eq!(next, Assignment::Assigned(ItemId(2)), "the held item stays locked");
    }

    #[tokio::test]
    async fn test_start_fleet_after_stop_replaces_parked_workers() {
        // ARRANGE
        let coordinator = coordinator();
        let old = coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        assigned(&coordinator, &old[0].id).await;
        coordinator.broadcast_stop().await.unwrap();

        // ACT
        coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();

        // ASSERT
        let registry = coordinator.registry().await.unwrap();
        assert!(registry.worker_by_context(&old[0].context).is_none());
        assert!(registry.locks.is_empty());
        let errors = coordinator
            .events()
            .recent()
            .into_iter()
            .filter(|e| e.level == EventLevel::Error)
            .count();
        assert_eq!(errors, 0, "a stopped fleet is not a live one");
    }

    #[tokio::test]
    async fn test_clear_stop_resets_flags() {
        let coordinator = coordinator();
        coordinator.broadcast_stop().await.unwrap();
        let stopped = coordinator.flags().await.unwrap();

        coordinator.clear_stop().await.unwrap();
        let cleared = coordinator.flags().await.unwrap();

        assert!(stopped.stop_requested);
        assert!(!cleared.stop_requested);
        assert!(cleared.version > stopped.version);
    }

    // ============================================================
    // TEST 5: Cooldown
    // ============================================================

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_pauses_and_resumes_every_worker() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(2, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let mut first = coordinator.open_mailbox(&records[0].id);
        let mut second = coordinator.open_mailbox(&records[1].id);

        // ACT
        let started = coordinator.request_cooldown(&records[0].id).await.unwrap();
        let absorbed = coordinator.request_cooldown(&records[1].id).await.unwrap();
        let flags_during = coordinator.flags().await.unwrap();

        tokio::time::sleep(coordinator.config().cooldown() + Duration::from_secs(5)).await;

        // ASSERT
        assert!(started);
        assert!(!absorbed, "a second trigger joins the running cooldown");
        assert!(flags_during.frozen);
        assert!(flags_during.cooldown_until.is_some());

        for mailbox in [&mut first, &mut second] {
            assert_eq!(mailbox.recv().await, Some(Directive::Suspend));
            assert_eq!(mailbox.recv().await, Some(Directive::Resume));
        }

        let flags_after = coordinator.flags().await.unwrap();
        assert!(!flags_after.frozen);
        assert_eq!(flags_after.cooldown_until, None);
        assert_eq!(coordinator.cooldown_phase(), CooldownPhase::Normal);

        let history = coordinator.cooldown_history();
        assert_eq!(history.len(), 1);
        let window = &history[0];
        assert_eq!(window.triggered_by, records[0].id);
        assert_eq!(window.resumed_workers, 2);
        let resumed_at = window.resumed_at.unwrap();
        assert!(resumed_at - window.paused_at >= coordinator.config().cooldown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_cooldown_aborts_resume() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let _mailbox = coordinator.open_mailbox(&records[0].id);
        coordinator.request_cooldown(&records[0].id).await.unwrap();

        // ACT
        tokio::time::sleep(Duration::from_secs(10)).await;
        coordinator.broadcast_stop().await.unwrap();
        tokio::time::sleep(coordinator.config().cooldown()).await;

        // ASSERT
        let history = coordinator.cooldown_history();
        assert!(history[0].aborted);
        assert!(history[0].resumed_at.is_none());
        assert!(coordinator.flags().await.unwrap().stop_requested);
        assert_eq!(coordinator.cooldown_phase(), CooldownPhase::Normal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_ignored_while_stopped() {
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        coordinator.broadcast_stop().await.unwrap();

        let started = coordinator.request_cooldown(&records[0].id).await.unwrap();

        assert!(!started);
        assert!(!coordinator.flags().await.unwrap().frozen);
        assert!(coordinator.cooldown_history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_of_replaced_fleet_leaves_new_window_alone() {
        // ARRANGE: a cooldown is waiting when a new fleet replaces the old one
        let coordinator = coordinator();
        let old = coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        coordinator.request_cooldown(&old[0].id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let new = coordinator
            .start_fleet(1, ItemId(1), None, Vec::new())
            .await
            .unwrap();

        // ACT: the new fleet is throttled before the old waiter wakes up
        let started = coordinator.request_cooldown(&new[0].id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        // ASSERT
        assert!(started);
        let history = coordinator.cooldown_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].triggered_by, new[0].id);
        assert!(!history[0].aborted);
        assert!(matches!(
            coordinator.cooldown_phase(),
            CooldownPhase::Waiting { .. }
        ));
        assert!(coordinator.flags().await.unwrap().frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_failed_workers() {
        // ARRANGE
        let coordinator = coordinator();
        let records = coordinator
            .start_fleet(2, ItemId(1), None, Vec::new())
            .await
            .unwrap();
        let _healthy = coordinator.open_mailbox(&records[0].id);
        coordinator.report_fatal(&records[1].id, "broken").await.unwrap();

        // ACT
        coordinator.request_cooldown(&records[0].id).await.unwrap();
        tokio::time::sleep(coordinator.config().cooldown() * 2).await;

        // ASSERT
        assert_eq!(coordinator.cooldown_history()[0].resumed_workers, 1);
    }

    // ============================================================
    // TEST 6: Mailboxes
    // ============================================================

    #[tokio::test]
    async fn test_send_to_unknown_mailbox_fails() {
        let mailboxes = Mailboxes::new();
        let worker = WorkerId::from_slot(0);

        let result = mailboxes.send(&worker, Directive::Resume);

        assert_eq!(result, Err(DeliveryError::NotRegistered(worker)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_with_backoff_waits_for_late_mailbox() {
        // ARRANGE
        let mailboxes = Arc::new(Mailboxes::new());
        let worker = WorkerId::from_slot(0);

        let opener = {
            let mailboxes = mailboxes.clone();
            let worker = worker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                mailboxes.open(&worker)
            })
        };

        // ACT
        let delivered = mailboxes
            .deliver_with_backoff(&worker, Directive::Resume, 5, Duration::from_millis(500))
            .await;

        // ASSERT
        assert_eq!(delivered, Ok(()));
        let mut receiver = opener.await.unwrap();
        assert_eq!(receiver.recv().await, Some(Directive::Resume));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deliver_with_backoff_gives_up() {
        let mailboxes = Mailboxes::new();
        let worker = WorkerId::from_slot(3);

        let delivered = mailboxes
            .deliver_with_backoff(&worker, Directive::Resume, 3, Duration::from_millis(100))
            .await;

        assert!(delivered.is_err());
    }
}
