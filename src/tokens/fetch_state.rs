//! Loading / success / error state of a fetched value.

use crate::wallet::error::WalletError;

/// State of one fetched entity. Exactly one variant holds at a time.
///
/// `Loading` may keep the last successful value so it stays visible while a
/// refresh is in flight. An error never carries data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState<T> {
    Loading { data: Option<T> },
    Success { data: T },
    Error { cause: WalletError },
}

impl<T> FetchState<T> {
    /// Loading with nothing to show.
    pub fn loading() -> Self {
        FetchState::Loading { data: None }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchState::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FetchState::Error { .. })
    }

    /// Current or last known data.
    pub fn data(&self) -> Option<&T> {
        match self {
            FetchState::Loading { data } => data.as_ref(),
            FetchState::Success { data } => Some(data),
            FetchState::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&WalletError> {
        match self {
            FetchState::Error { cause } => Some(cause),
            _ => None,
        }
    }
}

impl<T: Clone> FetchState<T> {
    /// Move into `Loading`, keeping whatever data was visible.
    pub fn revalidating(previous: Option<&FetchState<T>>) -> Self {
        FetchState::Loading {
            data: previous.and_then(|state| state.data().cloned()),
        }
    }
}

impl<T> From<Result<T, WalletError>> for FetchState<T> {
    fn from(result: Result<T, WalletError>) -> Self {
        match result {
            Ok(data) => FetchState::Success { data },
            Err(cause) => FetchState::Error { cause },
        }
    }
}
