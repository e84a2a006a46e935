//! Chooses which replica is authoritative for a read.
//!
//! The resolver is pure selection. It never merges the two replicas; callers
//! read the whole entity from the returned source. An entity can switch
//! sources at the moment its upload is acknowledged, which is why callers
//! re-resolve on every read instead of caching the answer.
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::identity::{CampaignId, DeckId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DataSource {
    Local,
    Remote,
}

/// Entity kinds the policy is applied to. The policy is identical for all of
/// them; the kind is carried for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Campaign,
    Deck,
    DeckHistory,
    GuideState,
    ChaosBagResults,
}

/// The signed-in account, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: Option<UserId>,
}

impl Session {
    pub fn signed_in(user: UserId) -> Self {
        Self { user: Some(user) }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }
}

/// Everything the policy looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection<'a> {
    pub kind: EntityKind,
    /// The identity carries a server id (campaign promoted, deck mirrored).
    pub affiliated: bool,
    /// The device store holds the entity.
    pub local_present: bool,
    /// The remote cache holds the entity.
    pub remote_present: bool,
    /// Owner recorded for the entity, locally or remotely.
    pub owner: Option<UserId>,
    pub session: &'a Session,
}

impl<'a> Selection<'a> {
    pub fn campaign(id: &CampaignId, session: &'a Session) -> Self {
        Self {
            kind: EntityKind::Campaign,
            affiliated: id.is_promoted(),
            local_present: false,
            remote_present: false,
            owner: None,
            session,
        }
    }

    /// Selection for anything owned by a campaign (guide state, chaos bag, history).
    pub fn campaign_scoped(kind: EntityKind, id: &CampaignId, session: &'a Session) -> Self {
        Self {
            kind,
            ..Self::campaign(id, session)
        }
    }

    /// A deck is affiliated when either its own id or its campaign carries a server id.
    pub fn deck(id: &DeckId, campaign: &CampaignId, session: &'a Session) -> Self {
        Self {
            kind: EntityKind::Deck,
            affiliated: id.server().is_some() || campaign.is_promoted(),
            ..Self::campaign(campaign, session)
        }
    }

    pub fn with_local(mut self, present: bool) -> Self {
        self.local_present = present;
        self
    }

    pub fn with_remote(mut self, present: bool) -> Self {
        self.remote_present = present;
        self
    }

    pub fn with_owner(mut self, owner: Option<UserId>) -> Self {
        self.owner = owner;
        self
    }
}

/// Resolves the authoritative source. Deterministic and side-effect free.
pub fn resolve(selection: &Selection<'_>) -> DataSource {
    if !selection.affiliated {
        return DataSource::Local;
    }
    let Some(user) = selection.session.user() else {
        return DataSource::Local;
    };
    let owned_or_unknown = selection.owner.as_ref().is_none_or(|owner| owner == user);
    if selection.local_present && !selection.remote_present && owned_or_unknown {
        return DataSource::Local;
    }
    DataSource::Remote
}

/// True when writes for `campaign` go through the remote mutation API.
///
/// This is the campaign-level decision with nothing locally pending, and
/// every guide-log writer is selected with it.
pub fn is_server_authoritative(campaign: &CampaignId, session: &Session) -> bool {
    resolve(&Selection::campaign(campaign, session)) == DataSource::Remote
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::identity::ServerId;

    fn user(id: &str) -> Session {
        Session::signed_in(UserId::new(id))
    }

    #[test]
    fn unaffiliated_entities_are_always_local() {
        let campaign = CampaignId::new_local();
        for session in [Session::signed_out(), user("u1")] {
            assert_eq!(
                resolve(&Selection::campaign(&campaign, &session)),
                DataSource::Local
            );
        }
    }

    #[test]
    fn signed_out_degrades_to_local() {
        let campaign = CampaignId::new_local().promoted(ServerId(3));
        let session = Session::signed_out();
        assert_eq!(
            resolve(&Selection::campaign(&campaign, &session)),
            DataSource::Local
        );
        assert!(!is_server_authoritative(&campaign, &session));
    }

    #[test]
    fn not_yet_uploaded_local_copy_wins() {
        let campaign = CampaignId::new_local().promoted(ServerId(3));
        let deck = DeckId::new_local();
        let session = user("u1");

        let selection = Selection::deck(&deck, &campaign, &session).with_local(true);
        assert_eq!(resolve(&selection), DataSource::Local);
    }

    #[test]
    fn remote_wins_once_known_remotely() {
        let campaign = CampaignId::new_local().promoted(ServerId(3));
        let deck = DeckId::new_local();
        let session = user("u1");

        for owner in [None, Some(UserId::new("u1")), Some(UserId::new("u2"))] {
            let selection = Selection::deck(&deck, &campaign, &session)
                .with_local(true)
                .with_remote(true)
                .with_owner(owner);
            assert_eq!(resolve(&selection), DataSource::Remote);
        }
    }

    #[test]
    fn local_copy_of_someone_elses_deck_defers_to_remote() {
        let campaign = CampaignId::new_local().promoted(ServerId(3));
        let deck = DeckId::new_local();
        let session = user("u1");

        let selection = Selection::deck(&deck, &campaign, &session)
            .with_local(true)
            .with_owner(Some(UserId::new("u2")));
        assert_eq!(resolve(&selection), DataSource::Remote);

        let mine = selection.with_owner(Some(UserId::new("u1")));
        assert_eq!(resolve(&mine), DataSource::Local);
    }

    #[test]
    fn remote_without_local_copy_is_remote() {
        let campaign = CampaignId::new_local().promoted(ServerId(3));
        let session = user("u1");
        assert!(is_server_authoritative(&campaign, &session));
    }

    #[test]
    fn resolution_is_repeatable_for_every_kind() {
        let campaign = CampaignId::new_local().promoted(ServerId(8));
        let session = user("u1");
        for kind in EntityKind::iter() {
            let selection = Selection::campaign_scoped(kind, &campaign, &session).with_local(true);
            assert_eq!(resolve(&selection), resolve(&selection.clone()));
        }
    }
}
