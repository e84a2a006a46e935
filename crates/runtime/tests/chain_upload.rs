mod support;

use std::time::Duration;

use campaign_core::{
    DataSource, Deck, DeckContent, DeckId, LineageError, LocalState, StoreAction,
};
use chrono::Utc;
use sync_runtime::{Event, MutationKind, RuntimeError, SyncEvent, Topic};
use tokio::time::timeout;
use uuid::Uuid;

use support::{Call, ScriptedRemote, fixture, runtime};

/// Promotion uploads the campaign, then the deck chain oldest first.
#[tokio::test]
async fn promotion_uploads_chain_in_order() {
    let remote = ScriptedRemote::new();
    let fx = fixture(3);
    let runtime = runtime(fx.state, remote.clone(), true);
    let mut sync_rx = runtime.subscribe(Topic::Sync);

    let handle = runtime.campaign(fx.campaign).expect("campaign should exist");
    let promotion = handle
        .promote()
        .await
        .expect("promotion should queue")
        .promoted()
        .await
        .expect("promotion should succeed");
    assert_eq!(promotion.campaigns.len(), 1);
    assert_eq!(promotion.uploads.len(), 1);
    let server_id = promotion.campaigns[0].server_id;
    promotion
        .acknowledged()
        .await
        .expect("chain upload should succeed");

    let [d1, d2, d3] = [fx.chain[0].id, fx.chain[1].id, fx.chain[2].id];
    assert_eq!(
        remote.calls(),
        vec![
            Call::CreateCampaign(fx.campaign),
            Call::UploadCampaign {
                campaign: fx.campaign,
                entries: 0
            },
            Call::CreateBaseDeck(d1),
            Call::CreateNextDeck {
                deck: d2,
                previous: d1
            },
            Call::CreateNextDeck {
                deck: d3,
                previous: d2
            },
        ]
    );

    let mut progress = Vec::new();
    while let Ok(event) = sync_rx.try_recv() {
        match event {
            Event::Sync(SyncEvent::MutationAcknowledged { .. }) => {}
            Event::Sync(event) => progress.push(event),
            other => panic!("unexpected event on sync topic: {other:?}"),
        }
    }
    assert!(matches!(progress[0], SyncEvent::CampaignPromoted { .. }));
    assert!(matches!(progress[1], SyncEvent::UploadStarted { total: 3, .. }));
    for (i, event) in progress[2..5].iter().enumerate() {
        match event {
            SyncEvent::DeckUploaded { step, total, .. } => {
                assert_eq!(*step, i + 1);
                assert_eq!(*total, 3);
            }
            other => panic!("expected DeckUploaded, got {other:?}"),
        }
    }
    assert!(matches!(
        progress[5],
        SyncEvent::UploadFinished { uploaded: 3, .. }
    ));

    let snapshot = runtime.snapshot().expect("snapshot");
    let promoted = snapshot.campaign(&fx.campaign).expect("campaign");
    assert_eq!(promoted.id.server_id, Some(server_id));
    assert!(!snapshot.sync.is_uploading(&fx.campaign, "01001"));

    let head = handle.deck(d3).expect("read").expect("deck");
    assert_eq!(head.source, DataSource::Remote);
    assert_eq!(head.scenario_count, 2);
    let history = handle.deck_history(d3).expect("history");
    let ids: Vec<_> = history.iter().map(|d| d.id.key()).collect();
    assert_eq!(ids, vec![d1.key(), d2.key(), d3.key()]);
}

/// A failing step stops the chain; earlier steps stay and a rerun resumes.
#[tokio::test]
async fn partial_upload_resumes_from_failed_step() {
    let remote = ScriptedRemote::new();
    remote.fail_deck_create_after(1);
    let fx = fixture(3);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();

    let promotion = handle
        .promote()
        .await
        .expect("promotion should queue")
        .promoted()
        .await
        .expect("promotion should succeed");
    let server_id = promotion.campaigns[0].server_id;
    let err = promotion
        .acknowledged()
        .await
        .expect_err("second create should fail");
    match err {
        RuntimeError::PartialUpload {
            uploaded,
            failed_at,
            ..
        } => {
            assert_eq!(uploaded, 1);
            assert_eq!(failed_at, fx.chain[1].id);
        }
        other => panic!("expected PartialUpload, got {other:?}"),
    }

    let remote_decks = runtime.cache().deck_cache(server_id).unwrap();
    assert_eq!(remote_decks.len(), 1);
    assert!(remote_decks.contains(&fx.chain[0].key()));
    assert_eq!(
        remote_decks.get(&fx.chain[0].key()).and_then(|d| d.next),
        None
    );

    remote.heal();
    handle
        .upload_deck_chain(fx.chain[2].id)
        .await
        .expect("resume should queue")
        .acknowledged()
        .await
        .expect("resume should succeed");

    let calls = remote.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        &[
            Call::CreateNextDeck {
                deck: fx.chain[1].id,
                previous: fx.chain[0].id
            },
            Call::CreateNextDeck {
                deck: fx.chain[2].id,
                previous: fx.chain[1].id
            },
        ]
    );
    assert_eq!(runtime.cache().deck_cache(server_id).unwrap().len(), 3);
}

#[tokio::test]
async fn promotion_requires_a_user() {
    let remote = ScriptedRemote::new();
    let fx = fixture(1);
    let runtime = runtime(fx.state, remote.clone(), false);
    let handle = runtime.campaign(fx.campaign).unwrap();

    let err = handle
        .promote()
        .await
        .expect("promotion should queue")
        .promoted()
        .await
        .expect_err("signed out");
    assert!(matches!(err, RuntimeError::AuthenticationRequired));
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn promoting_twice_returns_existing_ids() {
    let remote = ScriptedRemote::new();
    let fx = fixture(2);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();

    let first = handle.promote().await.unwrap().promoted().await.unwrap();
    let ids = first.campaigns.clone();
    first.acknowledged().await.unwrap();
    let calls = remote.calls().len();

    let second = handle.promote().await.unwrap().promoted().await.unwrap();
    assert_eq!(second.campaigns, ids);
    assert!(second.uploads.is_empty());
    assert_eq!(remote.calls().len(), calls);
}

#[tokio::test]
async fn linked_campaign_promotes_parent_and_both_halves() {
    let remote = ScriptedRemote::new();
    let (parent, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut state = LocalState::default();
    state.apply(&StoreAction::NewLinkedCampaign {
        uuid: parent,
        uuid_a: a,
        uuid_b: b,
        name: "Dream-Eaters".into(),
        cycle_code: "tde".into(),
        cycle_code_a: "tdea".into(),
        cycle_code_b: "tdeb".into(),
        now: Utc::now(),
    });
    let runtime = runtime(state, remote.clone(), true);

    let promotion = runtime
        .campaign(parent)
        .unwrap()
        .promote()
        .await
        .unwrap()
        .promoted()
        .await
        .unwrap();
    let promoted: Vec<_> = promotion.campaigns.iter().map(|c| c.uuid).collect();
    assert_eq!(promoted, vec![parent, a, b]);

    let calls = remote.calls();
    assert_eq!(calls[0], Call::CreateLinkedCampaign(parent));
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, Call::UploadCampaign { .. }))
            .count(),
        3
    );

    let snapshot = runtime.snapshot().unwrap();
    for uuid in [parent, a, b] {
        assert!(snapshot.campaign(&uuid).unwrap().id.is_promoted());
    }
}

#[tokio::test]
async fn deck_edits_follow_campaign_authority() {
    let remote = ScriptedRemote::new();
    let fx = fixture(3);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();
    handle.promote().await.unwrap().acknowledged().await.unwrap();
    let before = remote.calls().len();

    let unchanged = handle.update_deck(fx.chain[2].clone()).await.unwrap();
    assert!(unchanged.is_settled());
    assert_eq!(remote.calls().len(), before);

    let mut edited = fx.chain[2].clone();
    edited.content.slots.insert("01030".into(), 1);
    handle
        .update_deck(edited.clone())
        .await
        .unwrap()
        .acknowledged()
        .await
        .unwrap();
    assert_eq!(remote.calls().last(), Some(&Call::UpdateDeck(edited.id)));
    let read = handle.deck(edited.id).unwrap().unwrap();
    assert_eq!(read.content, edited.content);

    handle
        .delete_deck(fx.chain[2].id, true)
        .await
        .unwrap()
        .acknowledged()
        .await
        .unwrap();
    assert_eq!(
        remote.calls().last(),
        Some(&Call::DeleteDeck {
            deck: fx.chain[2].id,
            all_versions: true
        })
    );
    assert!(runtime.snapshot().unwrap().decks.is_empty());
}

/// Promotion is queued on the worker; the caller does not wait for the server.
#[tokio::test]
async fn promotion_does_not_block_the_caller() {
    let remote = ScriptedRemote::new();
    let fx = fixture(1);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();

    remote.hold(fx.campaign);
    let pending = timeout(Duration::from_secs(5), handle.promote())
        .await
        .expect("promote must return while the server is stalled")
        .expect("promotion should queue");
    assert!(remote.calls().is_empty());

    remote.release(fx.campaign);
    let promotion = pending.promoted().await.expect("promotion should succeed");
    assert_eq!(promotion.campaigns.len(), 1);
    promotion.acknowledged().await.expect("chain upload should succeed");
    assert_eq!(
        remote.calls().last(),
        Some(&Call::CreateBaseDeck(fx.chain[0].id))
    );
}

/// Saving a version whose predecessors never reached the server uploads the
/// whole chain instead of an unlinked base.
#[tokio::test]
async fn saving_after_failed_upload_sends_missing_predecessors() {
    let remote = ScriptedRemote::new();
    remote.fail_deck_create_after(0);
    let fx = fixture(2);
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();

    let promotion = handle.promote().await.unwrap().promoted().await.unwrap();
    let server_id = promotion.campaigns[0].server_id;
    promotion
        .acknowledged()
        .await
        .expect_err("first create should fail");
    assert!(runtime.cache().deck_cache(server_id).unwrap().is_empty());

    remote.heal();
    let content = DeckContent {
        name: "Roland v2".into(),
        xp: Some(2),
        ..DeckContent::default()
    };
    let upgraded = fx.chain[1].upgrade(DeckId::new_local(), content, Utc::now());
    let pending = handle.update_deck(upgraded.clone()).await.unwrap();
    assert_eq!(pending.kind(), Some(MutationKind::CreateBaseDeck));
    pending.acknowledged().await.expect("chain upload should succeed");

    let [d0, d1, d2] = [fx.chain[0].id, fx.chain[1].id, upgraded.id];
    let calls = remote.calls();
    assert_eq!(
        &calls[calls.len() - 3..],
        &[
            Call::CreateBaseDeck(d0),
            Call::CreateNextDeck {
                deck: d1,
                previous: d0
            },
            Call::CreateNextDeck {
                deck: d2,
                previous: d1
            },
        ]
    );
    let remote_decks = runtime.cache().deck_cache(server_id).unwrap();
    assert_eq!(remote_decks.get(&d0.key()).and_then(|d| d.next), Some(d1.key()));
    assert_eq!(remote_decks.get(&d1.key()).and_then(|d| d.next), Some(d2.key()));

    let orphan = Deck {
        previous: Some(DeckId::new_local()),
        ..Deck::new(DeckId::new_local(), "01001", DeckContent::default(), Utc::now())
    };
    let err = handle
        .update_deck(orphan.clone())
        .await
        .expect_err("previous version is unknown");
    assert!(matches!(
        err,
        RuntimeError::IdentityMismatch(LineageError::MissingPrevious { .. })
    ));
    assert!(!runtime.snapshot().unwrap().decks.contains(&orphan.key()));
}

/// Chains of different investigators go up one after another, and later
/// mutations of the campaign wait behind them.
#[tokio::test]
async fn investigator_chains_upload_in_campaign_order() {
    let remote = ScriptedRemote::new();
    let mut fx = fixture(2);
    let now = Utc::now();
    let base = Deck::new(
        DeckId::new_local(),
        "02001",
        DeckContent {
            name: "Zoey v0".into(),
            ..DeckContent::default()
        },
        now,
    );
    let next = base.upgrade(
        DeckId::new_local(),
        DeckContent {
            name: "Zoey v1".into(),
            ..DeckContent::default()
        },
        now,
    );
    for deck in [&base, &next] {
        fx.state.apply(&StoreAction::UpsertDeck {
            deck: deck.clone(),
            is_write: true,
            now,
        });
    }
    fx.state.apply(&StoreAction::AddInvestigator {
        campaign: fx.campaign,
        investigator: "02001".into(),
        deck: Some(next.id),
        now,
    });
    let runtime = runtime(fx.state, remote.clone(), true);
    let handle = runtime.campaign(fx.campaign).unwrap();

    let promotion = handle.promote().await.unwrap().promoted().await.unwrap();
    assert_eq!(promotion.uploads.len(), 2);
    let mut edited = fx.chain[1].clone();
    edited.content.slots.insert("01030".into(), 1);
    let update = handle.update_deck(edited.clone()).await.unwrap();
    promotion.acknowledged().await.expect("both chains upload");
    update.acknowledged().await.expect("update follows the uploads");

    let [r0, r1] = [fx.chain[0].id, fx.chain[1].id];
    assert_eq!(
        remote.calls()[2..],
        [
            Call::CreateBaseDeck(r0),
            Call::CreateNextDeck {
                deck: r1,
                previous: r0
            },
            Call::CreateBaseDeck(base.id),
            Call::CreateNextDeck {
                deck: next.id,
                previous: base.id
            },
            Call::UpdateDeck(edited.id),
        ]
    );
}
