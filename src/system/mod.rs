pub mod traits;

#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks;

pub use traits::{MixerInterface, NotificationSinkInterface};

#[cfg(any(test, feature = "test-mocks"))]
pub use mocks::{MockMixer, MockNotificationSink};
