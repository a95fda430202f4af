use thiserror::Error;

pub type BattleResult<T> = Result<T, BattleError>;

#[derive(Error, Debug)]
pub enum BattleError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("room already has two entries")]
    RoomFull,

    #[error("voting in this room is closed")]
    RoomClosed,

    #[error("voting is not active in this room")]
    VotingNotActive,

    #[error("entry not found")]
    EntryNotFound,

    #[error("you have already voted in this battle")]
    AlreadyVoted,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("image store error: {0}")]
    ImageStore(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("room {0} is too contended, try again")]
    Contention(String),
}

impl BattleError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Faults of the substrate rather than rejections by the rules.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::ImageStore(_) | Self::Serialization(_) | Self::Contention(_)
        )
    }

    pub fn code(&self) -> &'static str {
        use BattleError::*;
        match self {
            InvalidArgument(_) => "invalid_argument",
            RoomFull => "room_full",
            RoomClosed => "room_closed",
            VotingNotActive => "voting_not_active",
            EntryNotFound => "entry_not_found",
            AlreadyVoted => "already_voted",
            Storage(_) | ImageStore(_) | Serialization(_) | Contention(_) => "infrastructure",
        }
    }
}
