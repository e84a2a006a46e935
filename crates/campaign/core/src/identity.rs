//! Typed identities for decks, campaigns, and server rows.
//!
//! A deck is born either on the device (`Local`) or imported from the legacy
//! deck site (`Legacy`). Once mirrored to the server it additionally carries a
//! [`ServerRef`]. The three shapes are modelled as one sum type so every
//! consumer matches exhaustively instead of probing optional fields.
//!
//! Identities are immutable value objects; copy them freely.
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, ErrorSeverity};

/// Row identifier assigned by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub i64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stand-in for a server id that has not been acknowledged yet.
///
/// Minted once per optimistic operation. Pending identities live only in the
/// remote cache and are never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingId(Uuid);

impl PendingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for PendingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PendingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pending:{}", self.0)
    }
}

/// Reference to a server row, either acknowledged or still in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServerRef {
    Assigned(ServerId),
    Pending(PendingId),
}

impl ServerRef {
    pub fn pending() -> Self {
        Self::Pending(PendingId::new())
    }

    pub const fn assigned(&self) -> Option<ServerId> {
        match self {
            Self::Assigned(id) => Some(*id),
            Self::Pending(_) => None,
        }
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl From<ServerId> for ServerRef {
    fn from(id: ServerId) -> Self {
        Self::Assigned(id)
    }
}

impl fmt::Display for ServerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assigned(id) => id.fmt(f),
            Self::Pending(id) => id.fmt(f),
        }
    }
}

/// Authenticated account identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable key of a deck regardless of its server affiliation.
///
/// Every identity-keyed upsert uses this key, so a deck keeps its slot in
/// every index across the moment its server id is assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeckKey {
    Local(Uuid),
    ArkhamDb(u64),
}

impl fmt::Display for DeckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(uuid) => write!(f, "local:{uuid}"),
            Self::ArkhamDb(id) => write!(f, "arkhamdb:{id}"),
        }
    }
}

/// Where a deck was first created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeckOrigin {
    Local {
        uuid: Uuid,
    },
    Legacy {
        arkhamdb_id: u64,
        arkhamdb_user: Option<u64>,
    },
}

impl DeckOrigin {
    pub const fn key(&self) -> DeckKey {
        match self {
            Self::Local { uuid } => DeckKey::Local(*uuid),
            Self::Legacy { arkhamdb_id, .. } => DeckKey::ArkhamDb(*arkhamdb_id),
        }
    }

    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}

/// Deck identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DeckAddress", into = "DeckAddress")]
pub enum DeckId {
    /// Exists only on this device.
    Local { uuid: Uuid },
    /// Imported from the legacy deck site and not mirrored to the server.
    Legacy {
        arkhamdb_id: u64,
        arkhamdb_user: Option<u64>,
    },
    /// Mirrored to the server; `origin` keeps the original identity.
    Server { origin: DeckOrigin, server: ServerRef },
}

impl DeckId {
    pub const fn local(uuid: Uuid) -> Self {
        Self::Local { uuid }
    }

    pub fn new_local() -> Self {
        Self::Local {
            uuid: Uuid::new_v4(),
        }
    }

    pub const fn legacy(arkhamdb_id: u64, arkhamdb_user: Option<u64>) -> Self {
        Self::Legacy {
            arkhamdb_id,
            arkhamdb_user,
        }
    }

    pub const fn origin(&self) -> DeckOrigin {
        match self {
            Self::Local { uuid } => DeckOrigin::Local { uuid: *uuid },
            Self::Legacy {
                arkhamdb_id,
                arkhamdb_user,
            } => DeckOrigin::Legacy {
                arkhamdb_id: *arkhamdb_id,
                arkhamdb_user: *arkhamdb_user,
            },
            Self::Server { origin, .. } => *origin,
        }
    }

    pub const fn key(&self) -> DeckKey {
        self.origin().key()
    }

    pub const fn server(&self) -> Option<ServerRef> {
        match self {
            Self::Server { server, .. } => Some(*server),
            Self::Local { .. } | Self::Legacy { .. } => None,
        }
    }

    /// True when the deck was created on the device, mirrored or not.
    pub const fn is_local_origin(&self) -> bool {
        self.origin().is_local()
    }

    /// Returns the same deck affiliated with `server`.
    pub const fn with_server(&self, server: ServerRef) -> Self {
        Self::Server {
            origin: self.origin(),
            server,
        }
    }

    /// Returns the same deck with its server affiliation dropped.
    pub const fn without_server(&self) -> Self {
        match self.origin() {
            DeckOrigin::Local { uuid } => Self::Local { uuid },
            DeckOrigin::Legacy {
                arkhamdb_id,
                arkhamdb_user,
            } => Self::Legacy {
                arkhamdb_id,
                arkhamdb_user,
            },
        }
    }

    /// Two ids name the same deck when their origin keys match.
    pub fn same_deck(&self, other: &DeckId) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { .. } | Self::Legacy { .. } => self.key().fmt(f),
            Self::Server { server, .. } => write!(f, "{} ({})", self.key(), server),
        }
    }
}

/// Wire form of a deck identity: `{local_uuid}` or `{arkhamdb_id[, arkhamdb_user]}`
/// plus an optional numeric server id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arkhamdb_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arkhamdb_user: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
}

impl From<DeckId> for DeckAddress {
    fn from(id: DeckId) -> Self {
        let server_id = id.server().and_then(|s| s.assigned()).map(|s| s.0);
        match id.origin() {
            DeckOrigin::Local { uuid } => Self {
                local_uuid: Some(uuid),
                server_id,
                ..Self::default()
            },
            DeckOrigin::Legacy {
                arkhamdb_id,
                arkhamdb_user,
            } => Self {
                arkhamdb_id: Some(arkhamdb_id),
                arkhamdb_user,
                server_id,
                ..Self::default()
            },
        }
    }
}

impl TryFrom<DeckAddress> for DeckId {
    type Error = IdentityError;

    fn try_from(address: DeckAddress) -> Result<Self, Self::Error> {
        let origin = match (address.local_uuid, address.arkhamdb_id) {
            (Some(uuid), None) => {
                if address.arkhamdb_user.is_some() {
                    return Err(IdentityError::ConflictingOrigin);
                }
                DeckOrigin::Local { uuid }
            }
            (None, Some(arkhamdb_id)) => DeckOrigin::Legacy {
                arkhamdb_id,
                arkhamdb_user: address.arkhamdb_user,
            },
            (Some(_), Some(_)) => return Err(IdentityError::ConflictingOrigin),
            (None, None) => return Err(IdentityError::MissingOrigin),
        };

        let id = match origin {
            DeckOrigin::Local { uuid } => DeckId::Local { uuid },
            DeckOrigin::Legacy {
                arkhamdb_id,
                arkhamdb_user,
            } => DeckId::Legacy {
                arkhamdb_id,
                arkhamdb_user,
            },
        };
        Ok(match address.server_id {
            Some(server_id) => id.with_server(ServerRef::Assigned(ServerId(server_id))),
            None => id,
        })
    }
}

/// Campaign identity. Local-only until promoted, after which `server_id` is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<ServerId>,
}

impl CampaignId {
    pub const fn local(uuid: Uuid) -> Self {
        Self {
            uuid,
            server_id: None,
        }
    }

    pub fn new_local() -> Self {
        Self::local(Uuid::new_v4())
    }

    pub const fn is_promoted(&self) -> bool {
        self.server_id.is_some()
    }

    pub const fn uploaded(&self) -> Option<UploadedCampaignId> {
        match self.server_id {
            Some(server_id) => Some(UploadedCampaignId {
                uuid: self.uuid,
                server_id,
            }),
            None => None,
        }
    }

    pub const fn promoted(&self, server_id: ServerId) -> Self {
        Self {
            uuid: self.uuid,
            server_id: Some(server_id),
        }
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.server_id {
            Some(server_id) => write!(f, "campaign:{} ({})", self.uuid, server_id),
            None => write!(f, "campaign:{}", self.uuid),
        }
    }
}

/// A campaign that has been promoted to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadedCampaignId {
    pub uuid: Uuid,
    pub server_id: ServerId,
}

impl From<UploadedCampaignId> for CampaignId {
    fn from(id: UploadedCampaignId) -> Self {
        CampaignId {
            uuid: id.uuid,
            server_id: Some(id.server_id),
        }
    }
}

/// Errors raised while decoding identities from their wire form.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("deck address has neither a local uuid nor an arkhamdb id")]
    MissingOrigin,

    #[error("deck address mixes local and arkhamdb identity fields")]
    ConflictingOrigin,
}

impl CoreError for IdentityError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingOrigin => "IDENTITY_MISSING_ORIGIN",
            Self::ConflictingOrigin => "IDENTITY_CONFLICTING_ORIGIN",
        }
    }
}
