//! Error kinds surfaced by the archive and share-group operations.
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl ShareError {
    /// Whether the message may be shown to the user as is.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, ShareError::Store(_))
    }

    pub fn user_message(&self) -> String {
        if self.is_user_facing() {
            self.to_string()
        } else {
            "发生了错误".into()
        }
    }
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("archive unavailable: {0}")]
    ArchiveUnavailable(StoreError),
    #[error("archiver error: {message}")]
    Archiver { message: String, public: bool },
    #[error(transparent)]
    Share(#[from] ShareError),
    #[error("gateway error: {0:#}")]
    Gateway(anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BotError {
    pub fn user_message(&self) -> String {
        match self {
            BotError::InvalidInput(message) => message.clone(),
            BotError::ArchiveUnavailable(_) => "存档不可用".into(),
            BotError::Archiver {
                message,
                public: true,
            } => message.clone(),
            BotError::Share(err) => err.user_message(),
            _ => "发生了错误".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_public_messages_reach_users() {
        let err = BotError::Archiver {
            message: "原文已被删除".into(),
            public: true,
        };
        assert_eq!(err.user_message(), "原文已被删除");
        let err = BotError::Archiver {
            message: "token expired for upstream".into(),
            public: false,
        };
        assert_eq!(err.user_message(), "发生了错误");
        let err = BotError::from(ShareError::Conflict("已经在其他分享组中"));
        assert_eq!(err.user_message(), "已经在其他分享组中");
        let err = BotError::from(ShareError::Store(StoreError::NotAMap));
        assert_eq!(err.user_message(), "发生了错误");
        let err = BotError::InvalidInput("一次只能输入一个地址".into());
        assert_eq!(err.user_message(), "一次只能输入一个地址");
        let err = BotError::ArchiveUnavailable(StoreError::NotAMap);
        assert_eq!(err.user_message(), "存档不可用");
    }
}
