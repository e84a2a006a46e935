mod support;

use std::time::Duration;

use campaign_core::{Campaign, DataSource, GuideInput, ScenarioStatus, StoreAction};
use chrono::Utc;
use sync_runtime::{
    Event, GuideEvent, RemoteError, RuntimeError, SyncEvent, Topic,
};
use tokio::time::timeout;
use uuid::Uuid;

use support::{Call, ScriptedRemote, fixture, runtime};

fn start(scenario: &str) -> GuideInput {
    GuideInput::StartScenario {
        scenario: scenario.into(),
    }
}

fn decision(scenario: &str, step: &str) -> GuideInput {
    GuideInput::Decision {
        scenario: Some(scenario.into()),
        step: step.into(),
        decision: true,
    }
}

#[tokio::test]
async fn local_campaign_writes_stay_on_device() {
    let remote = ScriptedRemote::new();
    let fx = fixture(0);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();

    for input in [
        start("the_gathering"),
        decision("the_gathering", "lita_joined"),
        start("the_midnight_masks"),
    ] {
        let pending = handle.set_input(input).await.expect("set input");
        assert_eq!(pending.source(), DataSource::Local);
        assert!(pending.is_settled());
    }

    let state = handle.guide_state().unwrap();
    assert_eq!(
        state.scenario_order,
        vec!["the_gathering".to_string(), "the_midnight_masks".to_string()]
    );
    assert_eq!(
        state.scenarios["the_gathering"].status,
        ScenarioStatus::Completed
    );
    assert!(remote.calls().is_empty());
}

/// Undo removes the newest input of a scenario and everything after it.
#[tokio::test]
async fn undo_truncates_from_the_newest_input_of_the_scenario() {
    let remote = ScriptedRemote::new();
    let fx = fixture(0);
    let runtime = runtime(fx.state, remote, true);
    let handle = runtime.campaign(fx.campaign).unwrap();
    let mut guide_rx = handle.subscribe(Topic::Guide);

    handle.set_input(start("s1")).await.unwrap();
    handle.set_input(decision("s1", "a")).await.unwrap();
    handle.set_input(start("s2")).await.unwrap();

    handle.undo("s1").await.unwrap();
    let state = handle.guide_state().unwrap();
    assert_eq!(state.scenario_order, vec!["s1".to_string()]);
    assert!(state.answer(Some("s1"), "a").is_none());
    assert_eq!(state.scenarios["s1"].status, ScenarioStatus::Active);

    // s2 has no effective input left, so this is a no-op.
    handle.undo("s2").await.unwrap();
    assert_eq!(handle.guide_state().unwrap(), state);

    let mut undone = Vec::new();
    while let Ok(event) = guide_rx.try_recv() {
        if let Event::Guide(GuideEvent::InputsUndone { removed, .. }) = event {
            undone.push(removed);
        }
    }
    assert_eq!(undone, vec![2]);
}

#[tokio::test]
async fn reset_clears_only_that_scenario() {
    let remote = ScriptedRemote::new();
    let fx = fixture(0);
    let runtime = runtime(fx.state, remote, false);
    let handle = runtime.campaign(fx.campaign).unwrap();

    handle.set_input(start("s1")).await.unwrap();
    handle.set_input(decision("s1", "a")).await.unwrap();
    handle.set_input(start("s2")).await.unwrap();
    handle.set_input(decision("s2", "b")).await.unwrap();

    handle.reset_scenario("s1").await.unwrap();
    let state = handle.guide_state().unwrap();
    assert!(!state.scenarios.contains_key("s1"));
    assert!(state.answer(Some("s2"), "b").is_some());
}

#[tokio::test]
async fn counter_achievements_clamp() {
    let remote = ScriptedRemote::new();
    let fx = fixture(0);
    let runtime = runtime(fx.state, remote, false);
    let handle = runtime.campaign(fx.campaign).unwrap();

    for _ in 0..5 {
        handle.inc_achievement("relics", Some(3)).await.unwrap();
    }
    assert_eq!(handle.guide_state().unwrap().achievements.count("relics"), 3);

    for _ in 0..5 {
        handle.dec_achievement("relics").await.unwrap();
    }
    assert_eq!(handle.guide_state().unwrap().achievements.count("relics"), 0);

    handle.set_binary_achievement("met_lita", true).await.unwrap();
    assert!(handle.guide_state().unwrap().achievements.is_set("met_lita"));
}

#[tokio::test]
async fn promoted_campaign_writes_go_to_the_server() {
    let remote = ScriptedRemote::new();
    let fx = fixture(0);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();
    handle.promote().await.unwrap().acknowledged().await.unwrap();

    let pending = handle.set_input(start("s1")).await.unwrap();
    assert_eq!(pending.source(), DataSource::Remote);
    // Optimistic state is readable before the server answers.
    assert_eq!(
        handle.guide_state().unwrap().active_scenario(),
        Some("s1")
    );
    pending.acknowledged().await.expect("server accepts input");
    assert_eq!(remote.calls().last(), Some(&Call::SetInput));

    handle
        .undo("s1")
        .await
        .unwrap()
        .acknowledged()
        .await
        .expect("server removes input");
    match remote.calls().last() {
        Some(Call::RemoveInputs(ids)) => assert_eq!(ids.len(), 1),
        other => panic!("expected RemoveInputs, got {other:?}"),
    }
    assert!(handle.guide_state().unwrap().scenarios.is_empty());

    handle
        .inc_achievement("relics", None)
        .await
        .unwrap()
        .acknowledged()
        .await
        .unwrap();
    assert_eq!(
        remote.calls().last(),
        Some(&Call::Achievement("relics".into()))
    );
    assert_eq!(handle.guide_state().unwrap().achievements.count("relics"), 1);
}

#[tokio::test]
async fn rejected_input_rolls_back() {
    let remote = ScriptedRemote::new();
    let fx = fixture(0);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();
    handle.promote().await.unwrap().acknowledged().await.unwrap();
    let mut sync_rx = runtime.subscribe(Topic::Sync);

    remote.reject_inputs();
    let err = handle
        .set_input(start("s1"))
        .await
        .unwrap()
        .acknowledged()
        .await
        .expect_err("server rejects input");
    assert!(matches!(
        err,
        RuntimeError::Remote(RemoteError::Rejected { .. })
    ));
    assert!(handle.guide_state().unwrap().scenarios.is_empty());

    let rolled_back = std::iter::from_fn(|| sync_rx.try_recv().ok())
        .any(|event| matches!(event, Event::Sync(SyncEvent::MutationRolledBack { .. })));
    assert!(rolled_back);
}

/// Signing out flips a promoted campaign back to the device copy.
#[tokio::test]
async fn signed_out_writes_use_the_device_log() {
    let remote = ScriptedRemote::new();
    let fx = fixture(0);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();
    handle.promote().await.unwrap().acknowledged().await.unwrap();
    let calls = remote.calls().len();

    runtime.sign_out().unwrap();
    let pending = handle.set_input(start("offline")).await.unwrap();
    assert_eq!(pending.source(), DataSource::Local);
    assert_eq!(remote.calls().len(), calls);
    assert_eq!(
        handle.guide_state().unwrap().active_scenario(),
        Some("offline")
    );
}

/// Entries the server never assigned ids to cannot be removed remotely.
#[tokio::test]
async fn undo_of_unmapped_entries_fails_loudly() {
    let remote = ScriptedRemote::new();
    remote.short_guide_ids(1);
    let fx = fixture(0);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();
    handle.set_input(start("s1")).await.unwrap();
    handle.set_input(decision("s1", "lita_joined")).await.unwrap();
    handle.promote().await.unwrap().acknowledged().await.unwrap();
    let calls = remote.calls().len();

    let err = handle.undo("s1").await.expect_err("entry has no server id");
    assert!(matches!(err, RuntimeError::UnsyncedGuideEntry { seq: 1 }));
    let err = handle
        .reset_scenario("s1")
        .await
        .expect_err("entry has no server id");
    assert!(matches!(err, RuntimeError::UnsyncedGuideEntry { .. }));

    assert_eq!(remote.calls().len(), calls);
    let state = handle.guide_state().unwrap();
    assert!(state.answer(Some("s1"), "lita_joined").is_some());
}

/// A stalled server call for one campaign does not hold up another campaign.
#[tokio::test]
async fn campaigns_sync_independently() {
    let remote = ScriptedRemote::new();
    let mut fx = fixture(0);
    let other = Campaign::new_guided(Uuid::new_v4(), "The Dunwich Legacy", "dwl", Utc::now());
    let other_uuid = other.uuid();
    fx.state.apply(&StoreAction::NewCampaign {
        campaign: other,
        now: Utc::now(),
    });
    let runtime = runtime(fx.state, remote.clone(), true);
    let stalled = runtime.campaign(fx.campaign).unwrap();
    let free = runtime.campaign(other_uuid).unwrap();
    stalled.promote().await.unwrap().acknowledged().await.unwrap();
    free.promote().await.unwrap().acknowledged().await.unwrap();

    remote.hold(fx.campaign);
    let waiting = stalled.set_input(start("s1")).await.unwrap();
    assert_eq!(stalled.guide_state().unwrap().active_scenario(), Some("s1"));

    let pending = free.set_input(start("s2")).await.unwrap();
    timeout(Duration::from_secs(5), pending.acknowledged())
        .await
        .expect("other campaign must not wait")
        .expect("server accepts input");
    let set_inputs = |calls: Vec<Call>| calls.iter().filter(|c| **c == Call::SetInput).count();
    assert_eq!(set_inputs(remote.calls()), 1);

    remote.release(fx.campaign);
    waiting.acknowledged().await.expect("released call completes");
    assert_eq!(set_inputs(remote.calls()), 2);
}
