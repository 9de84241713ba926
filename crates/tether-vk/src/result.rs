// SPDX-License-Identifier: CEPL-1.0
//! Status normalisation for native calls.
//!
//! Every `vk::Result` produced by the driver goes through [`check`] or
//! [`VkResultExt::or_fail`]; nothing else turns a status code into an
//! [`Error`].
use ash::vk;
use thiserror::Error;

use crate::bootstrap::Stage;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{what} failed: {code}")]
    Native { what: &'static str, code: vk::Result },
    #[error("cannot create {what}: parent not initialized")]
    ParentNotInitialized { what: &'static str },
    #[error("{what} handle is empty")]
    Empty { what: &'static str },
    #[error("failed to find suitable physical device")]
    NoSuitableDevice,
    #[error("no queue family supports both graphics and presentation")]
    NoQueueFamily,
    #[error("could not load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
    #[error("application name contains an interior NUL byte")]
    InvalidAppName,
    #[error("bootstrap failed at {stage} stage: {source}")]
    Bootstrap {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// The raw status code, if this failure came from the driver.
    pub fn code(&self) -> Option<vk::Result> {
        match self {
            Error::Native { code, .. } => Some(*code),
            Error::Bootstrap { source, .. } => source.code(),
            _ => None,
        }
    }

    pub(crate) fn at(self, stage: Stage) -> Self {
        Error::Bootstrap {
            stage,
            source: Box::new(self),
        }
    }
}

/// Pass on `SUCCESS`, fail with `what` and the code otherwise.
pub fn check(what: &'static str, code: vk::Result) -> Result<()> {
    if code == vk::Result::SUCCESS {
        Ok(())
    } else {
        Err(Error::Native { what, code })
    }
}

pub trait VkResultExt<T> {
    fn or_fail(self, what: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn or_fail(self, what: &'static str) -> Result<T> {
        self.map_err(|code| Error::Native { what, code })
    }
}
