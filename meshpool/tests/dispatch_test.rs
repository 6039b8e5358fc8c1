//! Job dispatch: input-order results, failure isolation, panic
//! containment, cancellation, and fatal-error handling.


use std::sync::Arc;
use std::time::Duration;

use meshpool::{AddInstanceOptions, CancelToken, JobError, PoolError, SlotStatus};

use test_helpers::*;

#[tokio::test]
async fn results_come_back_in_input_order() {
    let (pool, _launcher) = pool_of(2).await;

    // later jobs finish sooner, so completion order is scrambled
    let jobs = (0..10)
        .map(|i| slow_job(Duration::from_millis(2 * (10 - i as u64)), i))
        .collect();
    let outcomes = pool.run(jobs).await.unwrap();

    assert_eq!(outcomes.len(), 10);
    for (position, outcome) in outcomes.into_iter().enumerate() {
        assert_eq!(tag_of(outcome), position);
    }

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn one_failure_never_aborts_siblings() {
    let (pool, _launcher) = pool_of(2).await;

    let jobs = (0..10)
        .map(|i| {
            if i == 3 {
                failing_job("solver diverged")
            } else {
                ok_job(i)
            }
        })
        .collect();
    let outcomes = pool.run(jobs).await.unwrap();

    for (position, outcome) in outcomes.into_iter().enumerate() {
        if position == 3 {
            assert!(
                matches!(outcome.error(), Some(JobError::Failed(reason)) if reason == "solver diverged")
            );
        } else {
            assert_eq!(tag_of(outcome), position);
        }
    }

    // a captured failure leaves the slot dispatchable
    for (_, status) in pool.snapshot_status() {
        assert_eq!(status, SlotStatus::Free);
    }

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn panicking_job_is_contained() {
    let (pool, _launcher) = pool_of(2).await;

    let outcomes = pool
        .run(vec![panicking_job(), ok_job(1)])
        .await
        .unwrap();
    assert!(matches!(
        outcomes[0].error(),
        Some(JobError::Failed(reason)) if reason == "job panicked"
    ));
    assert_eq!(tag_of(outcomes.into_iter().nth(1).unwrap()), 1);

    // the pool survives and keeps dispatching
    let again = pool.run(vec![ok_job(7)]).await.unwrap();
    assert_eq!(tag_of(again.into_iter().next().unwrap()), 7);

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn empty_input_yields_empty_output() {
    let (pool, _launcher) = pool_of(2).await;
    let outcomes = pool.run(Vec::new()).await.unwrap();
    assert!(outcomes.is_empty());
    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn run_batch_maps_inputs_to_solver_outputs() {
    let (pool, launcher) = pool_of(2).await;

    let inputs = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let outcomes = pool.run_batch(inputs).await.unwrap();

    let outputs: Vec<String> = outcomes
        .into_iter()
        .map(|outcome| {
            *outcome
                .into_output()
                .expect("batch entry failed")
                .downcast::<String>()
                .unwrap()
        })
        .collect();
    assert_eq!(outputs, vec!["ok: a", "ok: b", "ok: c"]);

    let total: usize = launcher
        .all_instances()
        .iter()
        .map(|instance| instance.submission_count())
        .sum();
    assert_eq!(total, 3);

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn cancellation_drops_queued_jobs_but_not_in_flight_ones() {
    let (pool, _launcher) = pool_of(2).await;
    let pool = Arc::new(pool);

    let jobs = (0..6).map(|i| slow_job(Duration::from_millis(200), i)).collect();
    let cancel = CancelToken::new();

    let runner = {
        let pool = pool.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { pool.run_with_cancel(jobs, cancel).await })
    };

    // both slots are busy with jobs 0 and 1 by now
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    assert!(cancel.is_cancelled());

    let outcomes = runner.await.unwrap().unwrap();
    assert_eq!(outcomes.len(), 6);
    let mut outcomes = outcomes.into_iter();
    assert_eq!(tag_of(outcomes.next().unwrap()), 0);
    assert_eq!(tag_of(outcomes.next().unwrap()), 1);
    for outcome in outcomes {
        assert!(outcome.is_cancelled());
    }

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn transport_failure_marks_the_slot_dead() {
    let mut config = test_config(2);
    config.auto_heal = false;
    let (pool, launcher) = pool_with_config(config).await;

    for instance in launcher.all_instances() {
        instance.die_silently();
    }
    let outcomes = pool.run(vec![submit_job("anything")]).await.unwrap();
    assert!(matches!(
        outcomes[0].error(),
        Some(JobError::Transport(_))
    ));

    let dead = pool
        .snapshot_status()
        .into_iter()
        .filter(|(_, status)| *status == SlotStatus::Dead)
        .count();
    assert!(dead >= 1);

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn dispatch_with_no_dispatchable_instance_is_refused() {
    let mut config = test_config(2);
    config.auto_heal = false;
    let (pool, launcher) = pool_with_config(config).await;

    for instance in launcher.all_instances() {
        instance.die_silently();
    }
    pool.check_health_now().await;
    assert_eq!(pool.len(), 0);

    let err = pool.run(vec![ok_job(0)]).await.unwrap_err();
    assert!(matches!(err, PoolError::NoInstances));

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn force_removal_mid_flight_reports_cancelled() {
    let (pool, _launcher) = pool_of(2).await;
    let pool = Arc::new(pool);

    // dispatch scans slots in order, so job 0 lands on slot 0
    let jobs = vec![
        slow_job(Duration::from_millis(300), 0),
        slow_job(Duration::from_millis(300), 1),
    ];
    let runner = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.run(jobs).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    pool.remove_instance(0, true).await.unwrap();

    let outcomes = runner.await.unwrap().unwrap();
    assert!(outcomes[0].is_cancelled());
    assert_eq!(tag_of(outcomes.into_iter().nth(1).unwrap()), 1);
    assert_eq!(pool.len(), 1);

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn pool_grows_while_a_run_is_in_flight() {
    let (pool, _launcher) = pool_of(2).await;
    let pool = Arc::new(pool);

    let jobs = (0..12).map(|i| slow_job(Duration::from_millis(20), i)).collect();
    let runner = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.run(jobs).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    pool.add_instance(AddInstanceOptions::default()).await.unwrap();
    pool.add_instance(AddInstanceOptions::default()).await.unwrap();
    assert_eq!(pool.len(), 4);

    let outcomes = runner.await.unwrap().unwrap();
    for (position, outcome) in outcomes.into_iter().enumerate() {
        assert_eq!(tag_of(outcome), position);
    }
    pool.wait_quiescent(Duration::from_secs(1)).await.unwrap();

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn per_job_timeout_is_enforced() {
    let mut config = test_config(2);
    config.job_timeout = Some(Duration::from_millis(30));
    config.auto_heal = false;
    let (pool, _launcher) = pool_with_config(config).await;

    let outcomes = pool
        .run(vec![slow_job(Duration::from_secs(5), 0), ok_job(1)])
        .await
        .unwrap();
    assert!(matches!(
        outcomes[0].error(),
        Some(JobError::Timeout(_))
    ));
    assert_eq!(tag_of(outcomes.into_iter().nth(1).unwrap()), 1);

    // a timed-out slot is presumed wedged
    assert_eq!(pool.snapshot_status()[0].1, SlotStatus::Dead);

    pool.shutdown().await.unwrap();
}
