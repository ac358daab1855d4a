use engine_core::ManagerError;
use persistence::PersistenceError;

use crate::catalog::CatalogError;

/// A rejected player request. The `Display` text is what the player reads
/// in the failure notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("You are not logged in.")]
    NoPlayer,

    #[error("You are not in an agency.")]
    NoAgency,

    #[error("That agency does not exist.")]
    AgencyNotFound,

    #[error("That agency is private; you need an invite.")]
    AgencyPrivate,

    #[error("You are already in that agency.")]
    AlreadyMember,

    #[error("That player is already in your agency.")]
    TargetAlreadyMember,

    #[error("An agency with that name already exists.")]
    NameTaken,

    #[error("Agency names must be 1 to 32 printable characters.")]
    InvalidName,

    #[error("Unknown building type {0}.")]
    UnknownBuilding(u16),

    #[error("Your agency already has that building on this planet.")]
    DuplicateBuilding,

    #[error("Your agency has no such building on this planet.")]
    BuildingMissing,

    #[error("That building is still under construction.")]
    UnderConstruction,

    #[error("That building is already at level {0}.")]
    MaxLevel(u16),

    #[error("Upgrades go one level at a time.")]
    BadUpgradeLevel,

    #[error("Not enough funds: need {need}, have {have}.")]
    InsufficientFunds { need: i64, have: i64 },

    #[error("Not enough resources on this planet.")]
    InsufficientResources,

    #[error("Unknown recipe {0}.")]
    UnknownRecipe(String),

    #[error("That recipe cannot be crafted in this building.")]
    WrongFacility,

    #[error("Unknown resource {0}.")]
    UnknownResource(u16),

    #[error("Unknown component {0}.")]
    UnknownComponent(u16),

    #[error("Component {0} is not attached to a compatible neighbour.")]
    BadSnap(usize),

    #[error("A vessel needs at least one component.")]
    EmptyVessel,

    #[error("Your agency has no base on that planet.")]
    NoBase,

    #[error("That planet is not in your current system.")]
    PlanetNotFound,

    #[error("Your agency has not discovered that planet.")]
    PlanetNotDiscovered,

    #[error("That vessel does not exist.")]
    VesselNotFound,

    #[error("That vessel is already controlled.")]
    VesselControlled,

    #[error("You are not controlling that vessel.")]
    NotController,

    #[error("Unknown quest {0}.")]
    QuestNotFound(u32),

    #[error("That quest is not completed yet.")]
    QuestNotCompleted,

    #[error("That quest reward was already claimed.")]
    QuestClaimed,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("The server could not complete that request.")]
    Internal,
}

/// Fatal conditions while bringing the server up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start the tick thread: {0}")]
    TickThread(#[source] std::io::Error),
}

pub type GameResult<T> = Result<T, GameError>;
